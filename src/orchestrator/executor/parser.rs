//! Line parser for hashcat `--status` output.
//!
//! The status block arrives one `Key.....: value` line at a time. Speed and
//! estimated time are remembered and emitted together with the next
//! `Progress` line, so a [`ToolEvent::Progress`] always carries the whole
//! percent/speed/ETA triplet.

use std::io::{BufRead, Cursor, Lines};

use crate::models::Credential;

/// Session status as printed on the `Status` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Initializing,
    Autotuning,
    Selftest,
    Running,
    Paused,
    Exhausted,
    Cracked,
    Aborted,
    Quit,
    Error,
    Other(String),
}

impl ToolStatus {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "initializing" => ToolStatus::Initializing,
            "autotuning" => ToolStatus::Autotuning,
            "selftest" => ToolStatus::Selftest,
            "running" => ToolStatus::Running,
            "paused" => ToolStatus::Paused,
            "exhausted" => ToolStatus::Exhausted,
            "cracked" => ToolStatus::Cracked,
            "aborted" | "aborted (checkpoint)" | "aborted (runtime)" | "aborted (finish)" => {
                ToolStatus::Aborted
            }
            "quit" => ToolStatus::Quit,
            "error" => ToolStatus::Error,
            _ => ToolStatus::Other(value.to_string()),
        }
    }

    /// The tool is done with this dictionary.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolStatus::Exhausted
                | ToolStatus::Cracked
                | ToolStatus::Aborted
                | ToolStatus::Quit
                | ToolStatus::Error
        )
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolStatus::Initializing => write!(f, "Initializing"),
            ToolStatus::Autotuning => write!(f, "Autotuning"),
            ToolStatus::Selftest => write!(f, "Selftest"),
            ToolStatus::Running => write!(f, "Running"),
            ToolStatus::Paused => write!(f, "Paused"),
            ToolStatus::Exhausted => write!(f, "Exhausted"),
            ToolStatus::Cracked => write!(f, "Cracked"),
            ToolStatus::Aborted => write!(f, "Aborted"),
            ToolStatus::Quit => write!(f, "Quit"),
            ToolStatus::Error => write!(f, "Error"),
            ToolStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Progress(ProgressUpdate),
    Cracked(Credential),
    Status(ToolStatus),
}

/// Stateful single-line parser.
#[derive(Debug, Default)]
pub struct LineParser {
    speed: Option<String>,
    eta: Option<String>,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> Option<ToolEvent> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some((key, value)) = status_field(trimmed) {
            return match key {
                "Status" => Some(ToolEvent::Status(ToolStatus::parse(value))),
                "Progress" => {
                    let percent = parse_percent(value)?;
                    Some(ToolEvent::Progress(ProgressUpdate {
                        percent,
                        speed: self.speed.clone(),
                        eta: self.eta.clone(),
                    }))
                }
                "Time.Estimated" => {
                    self.eta = Some(parse_eta(value));
                    None
                }
                k if k.starts_with("Speed.#") => {
                    self.speed = parse_speed(value);
                    None
                }
                _ => None,
            };
        }

        parse_cracked(trimmed).map(ToolEvent::Cracked)
    }
}

/// Lazy event iterator over any buffered reader. Unreadable lines end the
/// stream.
pub struct EventStream<R: BufRead> {
    lines: Lines<R>,
    parser: LineParser,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            parser: LineParser::new(),
        }
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = ToolEvent;

    fn next(&mut self) -> Option<ToolEvent> {
        loop {
            let line = self.lines.next()?.ok()?;
            if let Some(event) = self.parser.feed(&line) {
                return Some(event);
            }
        }
    }
}

/// Parse a complete transcript from the start.
pub fn parse_transcript(transcript: &str) -> Vec<ToolEvent> {
    EventStream::new(Cursor::new(transcript.as_bytes())).collect()
}

/// Split `Key.......: value`. The dots padding the key are dropped.
fn status_field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    if !key.ends_with("..") {
        return None;
    }
    let key = key.trim_end_matches('.').trim();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key, value.trim()))
}

/// `12/100 (12.00%)` -> 12.0
fn parse_percent(value: &str) -> Option<f64> {
    let start = value.find('(')? + 1;
    let end = value[start..].find('%')? + start;
    let percent = value[start..end].trim().parse::<f64>().ok()?;
    Some(percent.clamp(0.0, 100.0))
}

/// `  1234.5 kH/s (12.34ms) @ Accel:...` -> `1234.5 kH/s`
fn parse_speed(value: &str) -> Option<String> {
    let mut parts = value.split_whitespace();
    let number = parts.next()?;
    number.parse::<f64>().ok()?;
    let unit = parts.next().unwrap_or("H/s");
    Some(format!("{number} {unit}"))
}

/// `Sat Jan  6 10:00:00 2024 (1 hour, 2 mins)` -> `1 hour, 2 mins`
fn parse_eta(value: &str) -> String {
    if let (Some(start), Some(end)) = (value.rfind('('), value.rfind(')')) {
        if start < end {
            return value[start + 1..end].trim().to_string();
        }
    }
    value.to_string()
}

/// Recognize a cracked-hash line in either mode 22000 output format.
pub fn parse_cracked(line: &str) -> Option<Credential> {
    if line.starts_with("WPA*") {
        return parse_wpa_line(line);
    }
    parse_legacy_line(line)
}

/// `WPA*02*<mic>*<mac_ap>*<mac_sta>*<essid_hex>*...:<password>`
fn parse_wpa_line(line: &str) -> Option<Credential> {
    let (hash, password) = line.split_once(':')?;
    if password.is_empty() {
        return None;
    }
    let fields: Vec<&str> = hash.split('*').collect();
    if fields.len() < 6 || !fields[1].starts_with('0') {
        return None;
    }
    let bssid = Some(fields[3]).filter(|mac| is_mac(mac)).map(str::to_lowercase);
    let essid = hex::decode(fields[5])
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .filter(|essid| !essid.is_empty());

    Some(Credential {
        hash: hash.to_string(),
        essid,
        bssid,
        password: password.to_string(),
    })
}

/// `<mic>:<mac_ap>:<mac_sta>:<essid>:<password>`
fn parse_legacy_line(line: &str) -> Option<Credential> {
    let parts: Vec<&str> = line.splitn(5, ':').collect();
    if parts.len() != 5 {
        return None;
    }
    let (mic, mac_ap, mac_sta, essid, password) = (parts[0], parts[1], parts[2], parts[3], parts[4]);
    let mic_ok = mic.len() == 32 && mic.chars().all(|c| c.is_ascii_hexdigit());
    if !mic_ok || !is_mac(mac_ap) || !is_mac(mac_sta) || password.is_empty() {
        return None;
    }

    Some(Credential {
        hash: format!("{mic}:{mac_ap}:{mac_sta}:{essid}"),
        essid: Some(essid.to_string()).filter(|e| !e.is_empty()),
        bssid: Some(mac_ap.to_lowercase()),
        password: password.to_string(),
    })
}

fn is_mac(value: &str) -> bool {
    value.len() == 12 && value.chars().all(|c| c.is_ascii_hexdigit())
}
