use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{VitaeError, VitaeResult};

/// Longest difficulty that can be satisfied: a SHA-256 digest has 64 hex digits.
pub const MAX_DIFFICULTY: usize = 64;

/// Top-level configuration (loaded from vitae.toml)
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitaeConfig {
    pub ledger: LedgerConfig,
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger snapshot file (default: data/blockchain.json)
    pub path: PathBuf,
    /// Leading zero hex digits required of every sealed block hash (default: 4)
    pub difficulty: usize,
}

/// Encryption configuration
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Master secret. Never written back out by `config show`.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub master_key: Option<SecretString>,
    /// Environment variable consulted when `master_key` is unset
    pub master_key_env: String,
    /// PBKDF2-HMAC-SHA256 iteration count (default: 100000)
    pub kdf_iterations: u32,
    /// Encrypt whole block payloads in the snapshot file (default: true)
    pub encrypt_at_rest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(SecretString::from))
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/blockchain.json"),
            difficulty: 4,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            master_key_env: "VITAE_MASTER_KEY".into(),
            kdf_iterations: 100_000,
            encrypt_at_rest: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl VitaeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> VitaeResult<Self> {
        let config: VitaeConfig =
            toml::from_str(content).map_err(|e| VitaeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file at `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> VitaeResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| VitaeError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> VitaeResult<()> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(VitaeError::Config(format!(
                "ledger.difficulty {} exceeds the maximum of {MAX_DIFFICULTY}",
                self.ledger.difficulty
            )));
        }
        if self.crypto.kdf_iterations == 0 {
            return Err(VitaeError::Config("crypto.kdf_iterations must be non-zero".into()));
        }
        match self.logging.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(VitaeError::Config(format!(
                "logging.format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}
