//! Block payload shapes and the receipts returned to callers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use vitae_chain::{ChainInfo, LoadOutcome};
use vitae_core::ResumeRecord;

/// `data` of a `resume` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeEnvelope {
    pub encrypted_resume: Map<String, Value>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// SHA-256 of the canonical JSON of the plaintext record
    pub data_hash: String,
}

/// `data` of a `job_description` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptionEnvelope {
    pub encrypted_jd: Map<String, Value>,
    #[serde(default)]
    pub company: Option<String>,
    pub data_hash: String,
}

/// `data` of a `credentials` block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEnvelope {
    pub username: String,
    pub password_hash: String,
    /// Each value encrypted independently as its JSON text
    #[serde(default)]
    pub user_data: BTreeMap<String, String>,
}

/// Where a record landed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreReceipt {
    pub block_index: u64,
    pub block_hash: String,
    pub timestamp: f64,
    pub data_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialReceipt {
    pub block_index: u64,
    pub block_hash: String,
    pub username: String,
}

/// Result of a successful credential check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    pub username: String,
    pub block_index: u64,
    pub user_data: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserResume {
    pub block_index: u64,
    pub timestamp: f64,
    pub resume: ResumeRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    #[serde(flatten)]
    pub chain: ChainInfo,
    pub load_outcome: LoadOutcome,
    pub resume_count: usize,
    pub job_description_count: usize,
    pub credential_count: usize,
}
