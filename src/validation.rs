//! Validation for user-supplied CLI arguments.

use anyhow::{bail, Result};
use regex::Regex;

/// Shortest job id prefix accepted on the command line.
pub const MIN_JOB_REF_LENGTH: usize = 4;

/// Maximum allowed length for job names.
pub const MAX_JOB_NAME_LENGTH: usize = 200;

/// A job reference is a full UUID or a prefix of one.
pub fn validate_job_ref(reference: &str) -> Result<()> {
    if reference.len() < MIN_JOB_REF_LENGTH {
        bail!("Job reference '{reference}' is too short (min {MIN_JOB_REF_LENGTH} characters)");
    }
    let re = Regex::new(r"^[0-9a-fA-F]{1,8}(-[0-9a-fA-F]{0,12}){0,4}$")?;
    if reference.len() > 36 || !re.is_match(reference) {
        bail!("Job reference '{reference}' is not a job id or id prefix");
    }
    Ok(())
}

pub fn validate_job_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Job name cannot be empty");
    }
    if name.len() > MAX_JOB_NAME_LENGTH {
        bail!(
            "Job name too long: {} characters (max {})",
            name.len(),
            MAX_JOB_NAME_LENGTH
        );
    }
    Ok(())
}

/// Dictionary sync patterns are matched against file names only.
pub fn validate_dictionary_pattern(pattern: &str) -> Result<()> {
    if pattern.contains('/') || pattern.contains("..") {
        bail!("Pattern '{pattern}' must match file names, not paths");
    }
    if let Err(e) = glob::Pattern::new(pattern) {
        bail!("Invalid pattern '{pattern}': {e}");
    }
    Ok(())
}

/// A batch target given as `ESSID` or `ESSID@BSSID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub essid: String,
    pub bssid: Option<String>,
}

pub fn parse_target(value: &str) -> Result<TargetSpec> {
    let bssid_re = Regex::new(r"^([0-9a-fA-F]{2}[:-]?){5}[0-9a-fA-F]{2}$")?;
    let (essid, bssid) = match value.rsplit_once('@') {
        Some((essid, bssid)) if bssid_re.is_match(bssid) => (essid, Some(bssid.to_string())),
        _ => (value, None),
    };
    if essid.is_empty() {
        bail!("Target '{value}' has no ESSID");
    }
    if essid.len() > 32 {
        bail!("ESSID '{essid}' is longer than 32 bytes");
    }
    Ok(TargetSpec {
        essid: essid.to_string(),
        bssid,
    })
}

pub fn clap_target_parser(s: &str) -> Result<TargetSpec, String> {
    parse_target(s).map_err(|e| e.to_string())
}

/// Clap value parser for job references.
pub fn clap_job_ref_validator(s: &str) -> Result<String, String> {
    validate_job_ref(s).map_err(|e| e.to_string())?;
    Ok(s.to_lowercase())
}

pub fn clap_job_name_validator(s: &str) -> Result<String, String> {
    validate_job_name(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

pub fn clap_pattern_validator(s: &str) -> Result<String, String> {
    validate_dictionary_pattern(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}
