//! Snapshot file I/O: atomic writes and at-rest payload encryption
//!
//! A snapshot is a JSON array of [`BlockRecord`]s. Writes go to a sibling
//! `.tmp` file which is fsynced and then renamed over the target, so readers
//! only ever see the previous or the new complete snapshot.

use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use vitae_core::{VitaeError, VitaeResult};
use vitae_crypto::CipherSuite;

use crate::block::{Block, BlockRecord};

/// Key of the marker object that replaces an encrypted payload
pub const ENCRYPTED_MARKER: &str = "_encrypted";

/// Write `contents` to `path` atomically (write temp, fsync, rename).
pub fn atomic_write(path: &Path, contents: &[u8]) -> VitaeResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling(path, "tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// `<path>.<suffix>` next to `path`
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger".into());
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// First free quarantine name for `path`: `<file>.corrupt`, then
/// `<file>.corrupt.1`, `<file>.corrupt.2`, ... Existing files are never reused.
pub fn quarantine_path(path: &Path) -> PathBuf {
    let first = sibling(path, "corrupt");
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| sibling(path, &format!("corrupt.{n}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Read the raw records of a snapshot without interpreting them.
pub fn read_records(path: &Path) -> VitaeResult<Vec<BlockRecord>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn is_encrypted(record: &BlockRecord) -> bool {
    record
        .data
        .get(ENCRYPTED_MARKER)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Storage form of `block`. With a cipher the payload is replaced by a token;
/// if encryption fails the block is written in plaintext and a warning logged.
pub fn encode_block(block: &Block, cipher: Option<&CipherSuite>) -> BlockRecord {
    let mut record = block.to_record();
    let Some(cipher) = cipher else {
        return record;
    };

    match cipher.encrypt_text(&record.data.to_string()) {
        Ok(token) => {
            record.data = json!({ ENCRYPTED_MARKER: true });
            record.data_encrypted = Some(token);
        }
        Err(e) => {
            tracing::warn!(
                index = block.index(),
                error = %e,
                "failed to encrypt block for storage; writing it unencrypted"
            );
        }
    }
    record
}

/// Turn a stored record back into a block, decrypting the payload if it
/// carries the encrypted marker. Fails closed when no cipher is available or
/// the token is missing or does not authenticate.
pub fn decode_record(mut record: BlockRecord, cipher: Option<&CipherSuite>) -> VitaeResult<Block> {
    if is_encrypted(&record) {
        let index = record.index;
        let cipher = cipher.ok_or(VitaeError::MissingKey { index })?;
        let token = record
            .data_encrypted
            .take()
            .ok_or(VitaeError::MissingKey { index })?;
        let text = cipher
            .decrypt_text(&token)
            .map_err(|e| VitaeError::Decryption(format!("block {index}: {e}")))?;
        record.data = serde_json::from_str(&text)?;
    }
    Block::from_record(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Payload;
    use secrecy::SecretString;
    use tempfile::TempDir;
    use vitae_crypto::KdfParams;

    fn cipher(secret: &str) -> CipherSuite {
        CipherSuite::new(&SecretString::from(secret), &KdfParams { iterations: 1_000 }).unwrap()
    }

    fn block() -> Block {
        let mut block = Block::new(
            0,
            1.5,
            Payload::new("general", json!({"note": "confidential"})),
            "0",
        );
        block.seal(1);
        block
    }

    #[test]
    fn test_atomic_write_replaces_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/chain.json");

        atomic_write(&path, b"[1]").unwrap();
        atomic_write(&path, b"[2]").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[2]");
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn test_sibling_appends_suffix() {
        assert_eq!(
            sibling(Path::new("/data/blockchain.json"), "corrupt"),
            PathBuf::from("/data/blockchain.json.corrupt")
        );
    }

    #[test]
    fn test_quarantine_path_skips_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chain.json");

        assert_eq!(quarantine_path(&path), tmp.path().join("chain.json.corrupt"));
        fs::write(tmp.path().join("chain.json.corrupt"), "a").unwrap();
        assert_eq!(quarantine_path(&path), tmp.path().join("chain.json.corrupt.1"));
        fs::write(tmp.path().join("chain.json.corrupt.1"), "b").unwrap();
        assert_eq!(quarantine_path(&path), tmp.path().join("chain.json.corrupt.2"));
    }

    #[test]
    fn test_encrypted_record_hides_payload() {
        let cipher = cipher("k");
        let record = encode_block(&block(), Some(&cipher));

        assert!(is_encrypted(&record));
        let text = serde_json::to_string(&record).unwrap();
        assert!(!text.contains("confidential"));
        assert!(text.contains("data_encrypted"));
    }

    #[test]
    fn test_encode_decode_keeps_hash() {
        let cipher = cipher("k");
        let original = block();

        let decoded = decode_record(encode_block(&original, Some(&cipher)), Some(&cipher)).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.calculate_hash(), original.hash());
    }

    #[test]
    fn test_plain_record_without_cipher() {
        let original = block();
        let record = encode_block(&original, None);
        assert!(!is_encrypted(&record));
        assert_eq!(decode_record(record, None).unwrap(), original);
    }

    #[test]
    fn test_missing_cipher_fails_closed() {
        let record = encode_block(&block(), Some(&cipher("k")));
        let err = decode_record(record, None).unwrap_err();
        assert!(matches!(err, VitaeError::MissingKey { index: 0 }));
    }

    #[test]
    fn test_missing_token_fails_closed() {
        let cipher = cipher("k");
        let mut record = encode_block(&block(), Some(&cipher));
        record.data_encrypted = None;
        let err = decode_record(record, Some(&cipher)).unwrap_err();
        assert!(matches!(err, VitaeError::MissingKey { index: 0 }));
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let record = encode_block(&block(), Some(&cipher("writer")));
        let err = decode_record(record, Some(&cipher("reader"))).unwrap_err();
        assert!(matches!(err, VitaeError::Decryption(_)));
    }
}
