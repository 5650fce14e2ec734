use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A recovered secret as reported by the cracking tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The tool's hash line (everything left of the password)
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
    pub password: String,
}

impl Credential {
    /// Stable key for write-once result storage.
    pub fn credential_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Human label for logs: ESSID if known, else BSSID, else a hash prefix.
    pub fn label(&self) -> String {
        if let Some(essid) = &self.essid {
            return essid.clone();
        }
        if let Some(bssid) = &self.bssid {
            return bssid.clone();
        }
        self.hash.chars().take(12).collect()
    }
}

/// A cracked credential persisted against a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrackResult {
    pub job_id: Uuid,
    pub credential_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
    pub password: String,
    pub cracked_at: DateTime<Utc>,
}

impl CrackResult {
    pub fn from_credential(job_id: Uuid, credential: &Credential, at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            credential_hash: credential.credential_hash(),
            essid: credential.essid.clone(),
            bssid: credential.bssid.clone(),
            password: credential.password.clone(),
            cracked_at: at,
        }
    }
}
