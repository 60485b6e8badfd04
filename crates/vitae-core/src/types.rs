use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{VitaeError, VitaeResult};

/// Skill category → skills found in that category
pub type SkillMap = BTreeMap<String, Vec<String>>;

/// Kind of record carried in a block payload's `type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Genesis,
    Resume,
    JobDescription,
    Credentials,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Genesis,
        RecordKind::Resume,
        RecordKind::JobDescription,
        RecordKind::Credentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Genesis => "genesis",
            RecordKind::Resume => "resume",
            RecordKind::JobDescription => "job_description",
            RecordKind::Credentials => "credentials",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown record type: {s}"))
    }
}

/// Schema of a domain record stored with field-level encryption.
///
/// `SENSITIVE_FIELDS` are replaced by tokens before the record enters a block;
/// everything else stays in plaintext so it remains searchable.
/// `COMPOSITE_FIELDS` is the subset holding maps or lists, which are
/// re-parsed from JSON text after decryption.
pub trait SensitiveRecord: Serialize + DeserializeOwned {
    const KIND: RecordKind;
    const SENSITIVE_FIELDS: &'static [&'static str];
    const COMPOSITE_FIELDS: &'static [&'static str];

    /// Reject values that cannot survive a JSON round trip.
    fn validate(&self) -> VitaeResult<()> {
        Ok(())
    }
}

/// JSON has no NaN or infinity; serde_json would store them as `null`.
fn check_embedding(kind: RecordKind, embedding: &[f64]) -> VitaeResult<()> {
    match embedding.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(VitaeError::InvalidRecord(format!(
            "{kind} embedding[{i}] is {}",
            embedding[i]
        ))),
        None => Ok(()),
    }
}

/// A parsed resume as produced by the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub text: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub skills: SkillMap,
    #[serde(default)]
    pub extraction_method: Option<String>,
    /// Embedding vector in portable form
    #[serde(default)]
    pub embedding: Vec<f64>,
    /// Non-sensitive pipeline output (scores, names, flags)
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ResumeRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_path: None,
            skills: SkillMap::new(),
            extraction_method: None,
            embedding: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Convert any numeric vector (f32 model output, integer counts) to the
    /// plain `f64` list stored in the ledger.
    pub fn with_embedding<I, N>(mut self, embedding: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<f64>,
    {
        self.embedding = embedding.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skills(mut self, skills: SkillMap) -> Self {
        self.skills = skills;
        self
    }
}

impl SensitiveRecord for ResumeRecord {
    const KIND: RecordKind = RecordKind::Resume;
    const SENSITIVE_FIELDS: &'static [&'static str] =
        &["text", "file_path", "skills", "extraction_method"];
    const COMPOSITE_FIELDS: &'static [&'static str] = &["skills"];

    fn validate(&self) -> VitaeResult<()> {
        check_embedding(Self::KIND, &self.embedding)
    }
}

/// Skills attached to a job description: either grouped by category or a flat list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Skills {
    Categorized(SkillMap),
    Flat(Vec<String>),
}

impl Default for Skills {
    fn default() -> Self {
        Skills::Flat(Vec::new())
    }
}

/// A job description as produced by the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptionRecord {
    pub text: String,
    #[serde(default)]
    pub skills: Skills,
    #[serde(default)]
    pub embedding: Vec<f64>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl JobDescriptionRecord {
    pub fn new(text: impl Into<String>, skills: Skills) -> Self {
        Self {
            text: text.into(),
            skills,
            embedding: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_embedding<I, N>(mut self, embedding: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<f64>,
    {
        self.embedding = embedding.into_iter().map(Into::into).collect();
        self
    }
}

impl SensitiveRecord for JobDescriptionRecord {
    const KIND: RecordKind = RecordKind::JobDescription;
    const SENSITIVE_FIELDS: &'static [&'static str] = &["text", "skills"];
    const COMPOSITE_FIELDS: &'static [&'static str] = &["skills"];

    fn validate(&self) -> VitaeResult<()> {
        check_embedding(Self::KIND, &self.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_kind_roundtrip() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("user_credentials".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_resume_metadata_is_flattened() {
        let value = json!({
            "text": "Senior developer",
            "skills": {"languages": ["Rust", "Python"]},
            "name": "Jane Doe",
            "match_score": 0.95
        });
        let resume: ResumeRecord = serde_json::from_value(value).unwrap();

        assert_eq!(resume.file_path, None);
        assert_eq!(resume.skills["languages"], vec!["Rust", "Python"]);
        assert_eq!(resume.metadata["name"], "Jane Doe");
        assert_eq!(resume.metadata["match_score"], 0.95);

        let back = serde_json::to_value(&resume).unwrap();
        assert_eq!(back["name"], "Jane Doe");
        assert_eq!(back["text"], "Senior developer");
    }

    #[test]
    fn test_with_embedding_normalizes_f32() {
        let resume = ResumeRecord::new("x").with_embedding([0.5f32, 0.25f32]);
        assert_eq!(resume.embedding, vec![0.5, 0.25]);
    }

    #[test]
    fn test_non_finite_embedding_rejected() {
        let resume = ResumeRecord::new("x").with_embedding([0.5f32, f32::NAN]);
        let err = resume.validate().unwrap_err();
        assert!(matches!(err, VitaeError::InvalidRecord(ref m) if m.contains("embedding[1]")));

        let job = JobDescriptionRecord::new("t", Skills::default())
            .with_embedding([f64::INFINITY]);
        assert!(job.validate().is_err());

        assert!(ResumeRecord::new("x").with_embedding([0.5f32]).validate().is_ok());
    }

    #[test]
    fn test_job_skills_accept_list_or_map() {
        let flat: JobDescriptionRecord =
            serde_json::from_value(json!({"text": "t", "skills": ["Go", "SQL"]})).unwrap();
        assert_eq!(flat.skills, Skills::Flat(vec!["Go".into(), "SQL".into()]));

        let grouped: JobDescriptionRecord =
            serde_json::from_value(json!({"text": "t", "skills": {"db": ["SQL"]}})).unwrap();
        assert!(matches!(grouped.skills, Skills::Categorized(_)));
    }
}
