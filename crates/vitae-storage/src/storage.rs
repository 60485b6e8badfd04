//! `SecureStorage`: store and retrieve domain records through the ledger

use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use vitae_chain::{Block, Ledger, LoadOutcome};
use vitae_core::config::VitaeConfig;
use vitae_core::{
    JobDescriptionRecord, RecordKind, ResumeRecord, SensitiveRecord, VitaeError, VitaeResult,
};
use vitae_crypto::CipherSuite;

use crate::envelope::{
    AuthenticatedUser, CredentialEnvelope, CredentialReceipt, JobDescriptionEnvelope,
    ResumeEnvelope, StorageStats, StoreReceipt, UserResume,
};

pub struct SecureStorage {
    ledger: Ledger,
    cipher: Arc<CipherSuite>,
}

impl SecureStorage {
    /// Wrap an opened ledger. `cipher` encrypts record fields; the ledger may
    /// hold the same suite for at-rest encryption.
    pub fn new(ledger: Ledger, cipher: Arc<CipherSuite>) -> Self {
        Self { ledger, cipher }
    }

    /// Resolve the master secret, open the ledger, and wire both together.
    pub fn open(config: &VitaeConfig) -> VitaeResult<Self> {
        let (suite, generated) = CipherSuite::from_config(&config.crypto)?;
        let cipher = Arc::new(suite);
        let ledger = Ledger::from_config(
            &config.ledger,
            Some(Arc::clone(&cipher)),
            config.crypto.encrypt_at_rest,
        )?;
        tracing::info!(
            blocks = ledger.len(),
            ephemeral_key = generated,
            "secure storage ready"
        );
        Ok(Self::new(ledger, cipher))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Whether opening found, created, or had to replace the ledger.
    pub fn load_outcome(&self) -> &LoadOutcome {
        self.ledger.load_outcome()
    }

    pub fn cipher(&self) -> &CipherSuite {
        &self.cipher
    }

    // ── Resumes ────────────────────────────────────────────────────────────

    pub fn store_resume(
        &mut self,
        resume: &ResumeRecord,
        user_id: Option<&str>,
    ) -> VitaeResult<StoreReceipt> {
        let (encrypted_resume, data_hash) = self.seal_record(resume)?;
        let envelope = ResumeEnvelope {
            encrypted_resume,
            user_id: user_id.map(str::to_string),
            data_hash,
        };
        let receipt = self.append(&envelope, RecordKind::Resume, envelope.data_hash.clone())?;
        tracing::info!(index = receipt.block_index, "resume stored");
        Ok(receipt)
    }

    /// The resume at `index`, or None if that block is missing or not a resume.
    pub fn retrieve_resume(&self, index: u64) -> VitaeResult<Option<ResumeRecord>> {
        let Some(block) = self.block_of_kind(index, RecordKind::Resume) else {
            return Ok(None);
        };
        let envelope: ResumeEnvelope = envelope_of(block)?;
        let resume = self.open_record(&envelope.encrypted_resume)?;
        tracing::info!(index, "resume retrieved");
        Ok(Some(resume))
    }

    /// Every resume stored for `user_id`, in chain order.
    pub fn get_user_records(&self, user_id: &str) -> VitaeResult<Vec<UserResume>> {
        let mut candidates = Vec::new();
        for block in self.ledger.get_by_type(RecordKind::Resume.as_str()) {
            let envelope: ResumeEnvelope = envelope_of(block)?;
            if envelope.user_id.as_deref() == Some(user_id) {
                candidates.push((block.index(), block.timestamp(), envelope));
            }
        }

        let resumes = candidates
            .par_iter()
            .map(|(block_index, timestamp, envelope)| -> VitaeResult<UserResume> {
                Ok(UserResume {
                    block_index: *block_index,
                    timestamp: *timestamp,
                    resume: self.open_record(&envelope.encrypted_resume)?,
                })
            })
            .collect::<VitaeResult<Vec<_>>>()?;

        tracing::info!(user_id, count = resumes.len(), "user resumes retrieved");
        Ok(resumes)
    }

    // ── Job descriptions ───────────────────────────────────────────────────

    pub fn store_job_description(
        &mut self,
        job: &JobDescriptionRecord,
        company: Option<&str>,
    ) -> VitaeResult<StoreReceipt> {
        let (encrypted_jd, data_hash) = self.seal_record(job)?;
        let envelope = JobDescriptionEnvelope {
            encrypted_jd,
            company: company.map(str::to_string),
            data_hash,
        };
        let receipt =
            self.append(&envelope, RecordKind::JobDescription, envelope.data_hash.clone())?;
        tracing::info!(index = receipt.block_index, "job description stored");
        Ok(receipt)
    }

    pub fn retrieve_job_description(&self, index: u64) -> VitaeResult<Option<JobDescriptionRecord>> {
        let Some(block) = self.block_of_kind(index, RecordKind::JobDescription) else {
            return Ok(None);
        };
        let envelope: JobDescriptionEnvelope = envelope_of(block)?;
        let job = self.open_record(&envelope.encrypted_jd)?;
        tracing::info!(index, "job description retrieved");
        Ok(Some(job))
    }

    // ── Credentials ────────────────────────────────────────────────────────

    /// Record a user. Only a salted hash of `password` is stored; each
    /// `user_data` value is encrypted on its own.
    pub fn store_credentials(
        &mut self,
        username: &str,
        password: &str,
        user_data: Option<&BTreeMap<String, Value>>,
    ) -> VitaeResult<CredentialReceipt> {
        let envelope = CredentialEnvelope {
            username: username.to_string(),
            password_hash: self.cipher.hash_password(password),
            user_data: match user_data {
                Some(values) => self.cipher.encrypt_values(values)?,
                None => BTreeMap::new(),
            },
        };
        let block = self
            .ledger
            .append(serde_json::to_value(&envelope)?, RecordKind::Credentials.as_str())?;
        tracing::info!(index = block.index(), username, "credentials stored");
        Ok(CredentialReceipt {
            block_index: block.index(),
            block_hash: block.hash().to_string(),
            username: username.to_string(),
        })
    }

    /// Check a password against the first credentials block for `username`.
    ///
    /// Unknown users and wrong passwords both yield `None`.
    pub fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> VitaeResult<Option<AuthenticatedUser>> {
        for block in self.ledger.get_by_type(RecordKind::Credentials.as_str()) {
            let envelope: CredentialEnvelope = envelope_of(block)?;
            if envelope.username != username {
                continue;
            }

            if !self.cipher.verify_password(password, &envelope.password_hash) {
                tracing::warn!(username, "invalid password");
                return Ok(None);
            }

            let user_data = self.cipher.decrypt_values(&envelope.user_data)?;
            tracing::info!(username, index = block.index(), "credentials verified");
            return Ok(Some(AuthenticatedUser {
                username: envelope.username,
                block_index: block.index(),
                user_data,
            }));
        }

        tracing::warn!(username, "user not found");
        Ok(None)
    }

    // ── Chain-level queries ────────────────────────────────────────────────

    pub fn verify_integrity(&self) -> bool {
        let valid = self.ledger.validate();
        if valid {
            tracing::info!(blocks = self.ledger.len(), "ledger integrity verified");
        } else {
            tracing::error!("ledger integrity check failed");
        }
        valid
    }

    pub fn get_stats(&self) -> StorageStats {
        StorageStats {
            chain: self.ledger.info(),
            load_outcome: self.ledger.load_outcome().clone(),
            resume_count: self.count(RecordKind::Resume),
            job_description_count: self.count(RecordKind::JobDescription),
            credential_count: self.count(RecordKind::Credentials),
        }
    }

    /// Case-insensitive search over block payloads. Encrypted fields only
    /// match on their token text, so in practice this finds metadata.
    pub fn search(&self, term: &str, record_type: Option<&str>) -> Vec<&Block> {
        self.ledger.search(term, record_type)
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    /// Field-encrypt `record` and hash its plaintext form.
    fn seal_record<R: SensitiveRecord>(&self, record: &R) -> VitaeResult<(Map<String, Value>, String)> {
        record.validate()?;
        let fields = match serde_json::to_value(record)? {
            Value::Object(fields) => fields,
            _ => {
                return Err(VitaeError::Serialization(serde::ser::Error::custom(format!(
                    "{} record does not serialize to an object",
                    R::KIND
                ))))
            }
        };
        let encrypted = self.cipher.encrypt_fields(&fields, R::SENSITIVE_FIELDS)?;
        let data_hash = self.cipher.data_hash(record)?;
        Ok((encrypted, data_hash))
    }

    fn open_record<R: SensitiveRecord>(&self, fields: &Map<String, Value>) -> VitaeResult<R> {
        let decrypted =
            self.cipher
                .decrypt_fields(fields, R::SENSITIVE_FIELDS, R::COMPOSITE_FIELDS)?;
        Ok(serde_json::from_value(Value::Object(decrypted))?)
    }

    fn append<E: serde::Serialize>(
        &mut self,
        envelope: &E,
        kind: RecordKind,
        data_hash: String,
    ) -> VitaeResult<StoreReceipt> {
        let block = self
            .ledger
            .append(serde_json::to_value(envelope)?, kind.as_str())?;
        Ok(StoreReceipt {
            block_index: block.index(),
            block_hash: block.hash().to_string(),
            timestamp: block.timestamp(),
            data_hash,
        })
    }

    fn block_of_kind(&self, index: u64, kind: RecordKind) -> Option<&Block> {
        match self.ledger.get_by_index(index) {
            Some(block) if block.record_type() == kind.as_str() => Some(block),
            _ => {
                tracing::warn!(index, record_type = %kind, "record not found");
                None
            }
        }
    }

    fn count(&self, kind: RecordKind) -> usize {
        self.ledger.get_by_type(kind.as_str()).len()
    }
}

impl std::fmt::Debug for SecureStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStorage")
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

fn envelope_of<E: DeserializeOwned>(block: &Block) -> VitaeResult<E> {
    Ok(serde_json::from_value(block.payload().data.clone())?)
}
