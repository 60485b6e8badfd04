//! vitae-storage: domain records on the ledger
//!
//! Records are field-encrypted before they enter a block, so even a plaintext
//! snapshot or an export never shows resume text, skills, or user data.
//! Identifying metadata (`user_id`, `company`, `username`) stays readable for
//! lookups and search.

pub mod envelope;
pub mod storage;

pub use envelope::{
    AuthenticatedUser, CredentialEnvelope, CredentialReceipt, JobDescriptionEnvelope,
    ResumeEnvelope, StorageStats, StoreReceipt, UserResume,
};
pub use storage::SecureStorage;
