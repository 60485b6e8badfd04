//! `CipherSuite`: one derived key, every encryption operation the ledger needs

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use vitae_core::config::CryptoConfig;
use vitae_core::{canonical, VitaeResult};

use crate::kdf::{derive_key, KdfParams, MasterSecret};
use crate::keys::TokenKeys;
use crate::{fields, password, token};

/// Holds the operating keys derived from a master secret.
///
/// Immutable after construction, so a single instance can be shared across
/// threads (`Arc<CipherSuite>`) without coordination.
#[derive(Debug)]
pub struct CipherSuite {
    keys: TokenKeys,
}

impl CipherSuite {
    /// Derive the operating keys from `secret`.
    pub fn new(secret: &SecretString, params: &KdfParams) -> VitaeResult<Self> {
        let derived = derive_key(secret, params);
        Ok(Self {
            keys: TokenKeys::expand(&derived)?,
        })
    }

    /// Build from configuration, resolving the master secret from
    /// `crypto.master_key`, then the `crypto.master_key_env` variable.
    ///
    /// When neither is set a fresh secret is generated. Data written with it
    /// is unreadable after restart unless the operator saves the secret, so
    /// this is logged loudly. Returns the suite and whether the secret was generated.
    pub fn from_config(config: &CryptoConfig) -> VitaeResult<(Self, bool)> {
        let params = KdfParams {
            iterations: config.kdf_iterations,
        };

        if let Some(secret) = &config.master_key {
            return Ok((Self::new(secret, &params)?, false));
        }

        if let Ok(value) = std::env::var(&config.master_key_env) {
            if !value.is_empty() {
                let secret = SecretString::from(value);
                return Ok((Self::new(&secret, &params)?, false));
            }
        }

        let secret = MasterSecret::generate();
        let preview: String = secret.expose_secret().chars().take(6).collect();
        tracing::warn!(
            "no master key configured; generated a new one ({preview}...). Data stored with it cannot be read after restart"
        );
        tracing::warn!(
            "persist a key under [crypto].master_key or ${} (see `vitae keygen`)",
            config.master_key_env
        );
        Ok((Self::new(&secret, &params)?, true))
    }

    pub fn encrypt_text(&self, plaintext: &str) -> VitaeResult<String> {
        token::encrypt_text(&self.keys, plaintext)
    }

    pub fn decrypt_text(&self, token: &str) -> VitaeResult<String> {
        token::decrypt_text(&self.keys, token)
    }

    pub fn token_timestamp(&self, token: &str) -> VitaeResult<u64> {
        token::token_timestamp(&self.keys, token)
    }

    pub fn hash_password(&self, password: &str) -> String {
        password::hash_password(password)
    }

    pub fn verify_password(&self, password: &str, expected: &str) -> bool {
        password::verify_password(password, expected)
    }

    pub fn encrypt_fields(
        &self,
        record: &Map<String, Value>,
        sensitive: &[&str],
    ) -> VitaeResult<Map<String, Value>> {
        fields::encrypt_fields(&self.keys, record, sensitive)
    }

    pub fn decrypt_fields(
        &self,
        record: &Map<String, Value>,
        sensitive: &[&str],
        composite: &[&str],
    ) -> VitaeResult<Map<String, Value>> {
        fields::decrypt_fields(&self.keys, record, sensitive, composite)
    }

    pub fn encrypt_values(
        &self,
        values: &BTreeMap<String, Value>,
    ) -> VitaeResult<BTreeMap<String, String>> {
        fields::encrypt_values(&self.keys, values)
    }

    pub fn decrypt_values(
        &self,
        tokens: &BTreeMap<String, String>,
    ) -> VitaeResult<BTreeMap<String, Value>> {
        fields::decrypt_values(&self.keys, tokens)
    }

    /// SHA-256 of the canonical JSON form of `value`, for tamper-evidence of raw records.
    pub fn data_hash<T: serde::Serialize + ?Sized>(&self, value: &T) -> VitaeResult<String> {
        canonical::digest_canonical(value)
    }
}
