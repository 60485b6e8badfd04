//! The ledger: owns the chain, seals and appends blocks, persists snapshots.
//!
//! Single writer: every mutation takes `&mut self` and rewrites the whole
//! snapshot file atomically. Loading fails closed; [`Ledger::open`] turns a
//! failed load into a logged reset to a fresh genesis chain, keeping the
//! rejected file next to the ledger as `<file>.corrupt` (or `.corrupt.N` when
//! earlier quarantined files exist; none is ever overwritten).

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use vitae_core::config::{LedgerConfig, MAX_DIFFICULTY};
use vitae_core::{VitaeError, VitaeResult};
use vitae_crypto::CipherSuite;

use crate::block::{Block, Payload, GENESIS_PREVIOUS_HASH};
use crate::snapshot;

/// How the in-memory chain was obtained on open/reload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// No snapshot existed; a genesis block was created
    Created,
    /// The snapshot loaded and validated
    Loaded { blocks: usize },
    /// The snapshot was rejected and replaced by a fresh genesis chain.
    /// `quarantined` is where the rejected file was moved, if the move succeeded.
    Recovered {
        reason: String,
        quarantined: Option<PathBuf>,
    },
}

impl LoadOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, LoadOutcome::Recovered { .. })
    }
}

/// Summary of the chain for status displays
#[derive(Debug, Clone, Serialize)]
pub struct ChainInfo {
    pub total_blocks: usize,
    pub is_valid: bool,
    pub latest_block_hash: String,
    pub genesis_block_hash: String,
    pub difficulty: usize,
    pub chain_file: String,
}

pub struct Ledger {
    path: PathBuf,
    difficulty: usize,
    /// Decrypts encrypted snapshots; also encrypts on write when `encrypt_at_rest`
    cipher: Option<Arc<CipherSuite>>,
    encrypt_at_rest: bool,
    chain: Vec<Block>,
    load_outcome: LoadOutcome,
}

impl Ledger {
    /// Open the ledger at `path`, creating a genesis block if no snapshot exists.
    ///
    /// With a cipher, payloads are encrypted in the snapshot file.
    ///
    /// Opening may write to disk even when the caller only reads: a snapshot
    /// that fails to load (wrong or missing key, tampered block, bad JSON) is
    /// renamed to a quarantine file and replaced by a new genesis-only
    /// snapshot. Check [`Ledger::load_outcome`] to find out.
    pub fn open(
        path: impl Into<PathBuf>,
        difficulty: usize,
        cipher: Option<Arc<CipherSuite>>,
    ) -> VitaeResult<Self> {
        let encrypt_at_rest = cipher.is_some();
        Self::open_with(path.into(), difficulty, cipher, encrypt_at_rest)
    }

    /// Open from configuration. `encrypt_at_rest` only controls writes: an
    /// existing encrypted snapshot is still readable if a cipher is given.
    pub fn from_config(
        config: &LedgerConfig,
        cipher: Option<Arc<CipherSuite>>,
        encrypt_at_rest: bool,
    ) -> VitaeResult<Self> {
        Self::open_with(
            config.path.clone(),
            config.difficulty,
            cipher.clone(),
            encrypt_at_rest && cipher.is_some(),
        )
    }

    fn open_with(
        path: PathBuf,
        difficulty: usize,
        cipher: Option<Arc<CipherSuite>>,
        encrypt_at_rest: bool,
    ) -> VitaeResult<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(VitaeError::Config(format!(
                "difficulty {difficulty} exceeds the maximum of {MAX_DIFFICULTY}"
            )));
        }

        let mut ledger = Self {
            path,
            difficulty,
            cipher,
            encrypt_at_rest,
            chain: Vec::new(),
            load_outcome: LoadOutcome::Created,
        };
        ledger.reload()?;

        tracing::info!(
            blocks = ledger.chain.len(),
            path = %ledger.path.display(),
            encrypt_at_rest = ledger.encrypt_at_rest,
            "ledger initialized"
        );
        Ok(ledger)
    }

    /// Re-read the snapshot from disk, replacing the in-memory chain.
    ///
    /// Any load failure (unreadable file, bad JSON, missing key, failed
    /// decryption, broken hash chain) discards the chain and starts over from
    /// a new genesis block. Errors are returned only if that new chain cannot
    /// be written. The outcome is also kept in [`Ledger::load_outcome`].
    pub fn reload(&mut self) -> VitaeResult<LoadOutcome> {
        let outcome = self.load()?;
        self.load_outcome = outcome.clone();
        Ok(outcome)
    }

    fn load(&mut self) -> VitaeResult<LoadOutcome> {
        if !self.path.exists() {
            self.create_genesis()?;
            return Ok(LoadOutcome::Created);
        }

        match self.read_snapshot() {
            Ok(chain) => {
                self.chain = chain;
                tracing::info!(
                    blocks = self.chain.len(),
                    path = %self.path.display(),
                    "ledger loaded"
                );
                Ok(LoadOutcome::Loaded {
                    blocks: self.chain.len(),
                })
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    tamper = e.is_tamper(),
                    "failed to load ledger; reinitializing with a fresh genesis block"
                );
                self.chain.clear();
                let quarantined = self.quarantine();
                self.create_genesis()?;
                Ok(LoadOutcome::Recovered {
                    reason: e.to_string(),
                    quarantined,
                })
            }
        }
    }

    /// Strict load: decode and validate the snapshot without touching `self`.
    pub fn read_snapshot(&self) -> VitaeResult<Vec<Block>> {
        let records = snapshot::read_records(&self.path)?;
        let chain = records
            .into_iter()
            .map(|record| snapshot::decode_record(record, self.cipher.as_deref()))
            .collect::<VitaeResult<Vec<_>>>()?;
        verify_chain(&chain)?;
        Ok(chain)
    }

    /// Seal a new block holding `data` tagged as `record_type`, append it,
    /// and persist the chain. On a failed write the append is rolled back.
    pub fn append(&mut self, data: Value, record_type: &str) -> VitaeResult<Block> {
        let previous_hash = self
            .latest()
            .map(|b| b.hash().to_string())
            .ok_or_else(|| VitaeError::Integrity {
                index: 0,
                reason: "chain has no genesis block".into(),
            })?;

        let mut block = Block::new(
            self.chain.len() as u64,
            now_secs(),
            Payload::new(record_type, data),
            previous_hash,
        );
        block.seal(self.difficulty);

        self.chain.push(block.clone());
        if let Err(e) = self.save() {
            self.chain.pop();
            tracing::error!(index = block.index(), error = %e, "failed to persist block; append rolled back");
            return Err(e);
        }

        tracing::info!(
            index = block.index(),
            record_type,
            hash = %block.hash(),
            "block appended"
        );
        Ok(block)
    }

    /// True if every block hashes correctly and links to its predecessor.
    /// The first violation is logged at error level.
    pub fn validate(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "ledger validation failed");
                false
            }
        }
    }

    /// [`Ledger::validate`] as a `Result` naming the first offending block.
    pub fn verify(&self) -> VitaeResult<()> {
        verify_chain(&self.chain)
    }

    pub fn get_by_index(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.chain.get(i))
    }

    pub fn get_by_type(&self, record_type: &str) -> Vec<&Block> {
        self.chain
            .iter()
            .filter(|b| b.record_type() == record_type)
            .collect()
    }

    /// Case-insensitive substring search over each block's serialized payload.
    pub fn search(&self, term: &str, record_type: Option<&str>) -> Vec<&Block> {
        let needle = term.to_lowercase();
        self.chain
            .iter()
            .filter(|b| record_type.map_or(true, |t| b.record_type() == t))
            .filter(|b| b.payload().to_value().to_string().to_lowercase().contains(&needle))
            .collect()
    }

    pub fn latest(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn genesis(&self) -> Option<&Block> {
        self.chain.first()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Result of the most recent open or reload.
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    pub fn info(&self) -> ChainInfo {
        ChainInfo {
            total_blocks: self.chain.len(),
            is_valid: self.validate(),
            latest_block_hash: self.latest().map(|b| b.hash().to_string()).unwrap_or_default(),
            genesis_block_hash: self.genesis().map(|b| b.hash().to_string()).unwrap_or_default(),
            difficulty: self.difficulty,
            chain_file: self.path.display().to_string(),
        }
    }

    /// Write the chain with plaintext payloads to `output`.
    pub fn export(&self, output: &Path) -> VitaeResult<()> {
        let records: Vec<_> = self.chain.iter().map(Block::to_record).collect();
        let json = serde_json::to_string_pretty(&records)?;
        snapshot::atomic_write(output, json.as_bytes())?;
        tracing::info!(path = %output.display(), blocks = records.len(), "ledger exported");
        Ok(())
    }

    /// Persist the whole chain as one atomic snapshot.
    fn save(&self) -> VitaeResult<()> {
        let cipher = if self.encrypt_at_rest {
            self.cipher.as_deref()
        } else {
            None
        };
        let records: Vec<_> = self
            .chain
            .iter()
            .map(|block| snapshot::encode_block(block, cipher))
            .collect();
        let json = serde_json::to_string_pretty(&records)?;
        snapshot::atomic_write(&self.path, json.as_bytes())?;

        tracing::debug!(
            path = %self.path.display(),
            blocks = records.len(),
            encrypted = cipher.is_some(),
            "ledger saved"
        );
        Ok(())
    }

    fn create_genesis(&mut self) -> VitaeResult<()> {
        let mut genesis = Block::new(0, now_secs(), Payload::genesis(), GENESIS_PREVIOUS_HASH);
        genesis.seal(self.difficulty);
        self.chain = vec![genesis];
        if let Err(e) = self.save() {
            self.chain.clear();
            return Err(e);
        }
        tracing::info!(hash = %self.chain[0].hash(), "genesis block created");
        Ok(())
    }

    /// Move a rejected snapshot aside under a fresh name.
    fn quarantine(&self) -> Option<PathBuf> {
        let target = snapshot::quarantine_path(&self.path);
        match std::fs::rename(&self.path, &target) {
            Ok(()) => {
                tracing::warn!(path = %target.display(), "rejected ledger snapshot preserved");
                Some(target)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not preserve rejected ledger snapshot");
                None
            }
        }
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.path)
            .field("difficulty", &self.difficulty)
            .field("encrypt_at_rest", &self.encrypt_at_rest)
            .field("blocks", &self.chain.len())
            .finish()
    }
}

/// Check genesis, positions, hashes and linkage; report the first violation.
pub fn verify_chain(chain: &[Block]) -> VitaeResult<()> {
    let genesis = chain.first().ok_or_else(|| VitaeError::Integrity {
        index: 0,
        reason: "chain is empty".into(),
    })?;
    if genesis.previous_hash() != GENESIS_PREVIOUS_HASH {
        return Err(VitaeError::Integrity {
            index: 0,
            reason: format!("genesis previous_hash is {:?}", genesis.previous_hash()),
        });
    }

    for (position, block) in chain.iter().enumerate() {
        let index = block.index();
        if index != position as u64 {
            return Err(VitaeError::Integrity {
                index: position as u64,
                reason: format!("block at position {position} claims index {index}"),
            });
        }
        if block.hash() != block.calculate_hash() {
            return Err(VitaeError::Integrity {
                index,
                reason: "stored hash does not match block contents".into(),
            });
        }
        if position > 0 && block.previous_hash() != chain[position - 1].hash() {
            return Err(VitaeError::Integrity {
                index,
                reason: "previous_hash does not match predecessor".into(),
            });
        }
    }
    Ok(())
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
