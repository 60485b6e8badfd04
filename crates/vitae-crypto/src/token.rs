//! Authenticated text tokens: XChaCha20 encrypt-then-MAC with HMAC-SHA256
//!
//! Token format (binary, then base64url without padding):
//! ```text
//! [1 byte: version][8 bytes: unix seconds, BE][24 bytes: random IV][N bytes: ciphertext][32 bytes: HMAC-SHA256 tag]
//! tag = HMAC(mac_key, version || timestamp || IV || ciphertext)
//! ```
//!
//! The tag is verified in constant time before the keystream is applied, so a
//! tampered or foreign token never yields partial plaintext.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{Key, XChaCha20, XNonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use vitae_core::{VitaeError, VitaeResult};

use crate::keys::TokenKeys;
use crate::{IV_SIZE, TAG_SIZE, TOKEN_VERSION};

type HmacSha256 = Hmac<Sha256>;

const HEADER_SIZE: usize = 1 + 8 + IV_SIZE;

/// Encrypt `plaintext` into a token. Two calls never produce the same token.
pub fn encrypt_text(keys: &TokenKeys, plaintext: &str) -> VitaeResult<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut blob = Vec::with_capacity(HEADER_SIZE + plaintext.len() + TAG_SIZE);
    blob.push(TOKEN_VERSION);
    blob.extend_from_slice(&timestamp.to_be_bytes());
    blob.extend_from_slice(&iv);

    let body_start = blob.len();
    blob.extend_from_slice(plaintext.as_bytes());
    let mut cipher = XChaCha20::new(Key::from_slice(keys.enc_key()), XNonce::from_slice(&iv));
    cipher.apply_keystream(&mut blob[body_start..]);

    let tag = compute_tag(keys, &blob)?;
    blob.extend_from_slice(&tag);

    Ok(URL_SAFE_NO_PAD.encode(blob))
}

/// Verify and decrypt a token produced by [`encrypt_text`].
pub fn decrypt_text(keys: &TokenKeys, token: &str) -> VitaeResult<String> {
    let blob = decode(token)?;
    let (signed, tag) = blob.split_at(blob.len() - TAG_SIZE);

    let mut mac = new_mac(keys)?;
    mac.update(signed);
    mac.verify_slice(tag).map_err(|_| {
        VitaeError::Decryption(
            "token authentication failed: wrong key or tampered data".into(),
        )
    })?;

    let iv = &signed[9..HEADER_SIZE];
    let mut body = signed[HEADER_SIZE..].to_vec();
    let mut cipher = XChaCha20::new(Key::from_slice(keys.enc_key()), XNonce::from_slice(iv));
    cipher.apply_keystream(&mut body);

    String::from_utf8(body)
        .map_err(|e| VitaeError::Decryption(format!("decrypted token is not UTF-8: {e}")))
}

/// Creation time (unix seconds) recorded in a token, after verifying it.
pub fn token_timestamp(keys: &TokenKeys, token: &str) -> VitaeResult<u64> {
    decrypt_text(keys, token)?;
    let blob = decode(token)?;
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&blob[1..9]);
    Ok(u64::from_be_bytes(ts))
}

/// Base64-decode and check the fixed-size framing and version byte.
fn decode(token: &str) -> VitaeResult<Vec<u8>> {
    let blob = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|e| VitaeError::Decryption(format!("malformed token: {e}")))?;

    if blob.len() < HEADER_SIZE + TAG_SIZE {
        return Err(VitaeError::Decryption(format!(
            "token too short: {} bytes (minimum {})",
            blob.len(),
            HEADER_SIZE + TAG_SIZE
        )));
    }
    if blob[0] != TOKEN_VERSION {
        return Err(VitaeError::Decryption(format!(
            "unsupported token version: {:#04x}",
            blob[0]
        )));
    }
    Ok(blob)
}

fn new_mac(keys: &TokenKeys) -> VitaeResult<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(keys.mac_key())
        .map_err(|e| anyhow::anyhow!("HMAC key setup failed: {e}").into())
}

fn compute_tag(keys: &TokenKeys, signed: &[u8]) -> VitaeResult<[u8; TAG_SIZE]> {
    let mut mac = new_mac(keys)?;
    mac.update(signed);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::DerivedKey;
    use crate::KEY_SIZE;
    use proptest::prelude::*;

    fn test_keys(seed: u8) -> TokenKeys {
        TokenKeys::expand(&DerivedKey::from_bytes([seed; KEY_SIZE])).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let keys = test_keys(42);
        let token = encrypt_text(&keys, "hello, encrypted world!").unwrap();
        assert_eq!(decrypt_text(&keys, &token).unwrap(), "hello, encrypted world!");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let keys = test_keys(42);
        let token = encrypt_text(&keys, "").unwrap();
        assert_eq!(decrypt_text(&keys, &token).unwrap(), "");
    }

    #[test]
    fn test_encryption_is_probabilistic() {
        let keys = test_keys(42);
        let a = encrypt_text(&keys, "same input").unwrap();
        let b = encrypt_text(&keys, "same input").unwrap();
        assert_ne!(a, b, "random IV must make tokens differ");
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let token = encrypt_text(&test_keys(1), "secret data").unwrap();
        let result = decrypt_text(&test_keys(2), &token);
        assert!(matches!(result, Err(VitaeError::Decryption(_))));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let keys = test_keys(42);
        let token = encrypt_text(&keys, "secret data").unwrap();
        let mut blob = URL_SAFE_NO_PAD.decode(&token).unwrap();
        // Flip a byte in the ciphertext (after the header)
        blob[HEADER_SIZE] ^= 0xFF;
        let tampered = URL_SAFE_NO_PAD.encode(blob);

        assert!(matches!(
            decrypt_text(&keys, &tampered),
            Err(VitaeError::Decryption(_))
        ));
    }

    #[test]
    fn test_tampered_timestamp() {
        let keys = test_keys(42);
        let token = encrypt_text(&keys, "secret data").unwrap();
        let mut blob = URL_SAFE_NO_PAD.decode(&token).unwrap();
        blob[4] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(blob);

        assert!(decrypt_text(&keys, &tampered).is_err(), "timestamp is authenticated");
    }

    #[test]
    fn test_malformed_tokens() {
        let keys = test_keys(42);
        assert!(decrypt_text(&keys, "not base64 at all!!").is_err());
        assert!(decrypt_text(&keys, "").is_err());
        assert!(decrypt_text(&keys, &URL_SAFE_NO_PAD.encode([TOKEN_VERSION; 10])).is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let keys = test_keys(42);
        let token = encrypt_text(&keys, "x").unwrap();
        let mut blob = URL_SAFE_NO_PAD.decode(&token).unwrap();
        blob[0] = 0x80;
        let err = decrypt_text(&keys, &URL_SAFE_NO_PAD.encode(blob)).unwrap_err();
        assert!(err.to_string().contains("unsupported token version"));
    }

    #[test]
    fn test_token_size() {
        let keys = test_keys(42);
        let token = encrypt_text(&keys, &"a".repeat(100)).unwrap();
        let blob = URL_SAFE_NO_PAD.decode(&token).unwrap();

        // version (1) + timestamp (8) + iv (24) + plaintext (100) + tag (32)
        assert_eq!(blob.len(), 1 + 8 + 24 + 100 + 32);
    }

    #[test]
    fn test_token_timestamp_is_recent() {
        let keys = test_keys(42);
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let token = encrypt_text(&keys, "x").unwrap();
        let ts = token_timestamp(&keys, &token).unwrap();
        assert!(ts >= before && ts <= before + 5);
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary_utf8(s in "\\PC*") {
            let keys = test_keys(9);
            let token = encrypt_text(&keys, &s).unwrap();
            prop_assert_eq!(decrypt_text(&keys, &token).unwrap(), s);
        }

        #[test]
        fn any_single_bit_flip_is_rejected(pos in 0usize..64, bit in 0u8..8) {
            let keys = test_keys(9);
            let token = encrypt_text(&keys, "tamper target with some length").unwrap();
            let mut blob = URL_SAFE_NO_PAD.decode(&token).unwrap();
            let idx = pos % blob.len();
            blob[idx] ^= 1 << bit;
            prop_assert!(decrypt_text(&keys, &URL_SAFE_NO_PAD.encode(blob)).is_err());
        }
    }
}
