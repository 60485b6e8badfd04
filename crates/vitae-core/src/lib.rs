pub mod canonical;
pub mod config;
pub mod error;
pub mod types;

pub use canonical::{canonical_json, sha256_hex};
pub use error::{VitaeError, VitaeResult};
pub use types::{JobDescriptionRecord, RecordKind, ResumeRecord, SensitiveRecord, SkillMap, Skills};
