//! Key derivation: PBKDF2-HMAC-SHA256 master secret → derived key

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// Application-wide PBKDF2 salt.
///
/// Fixed so that the same master secret re-derives the same key on every
/// start. This makes the salt public across deployments; see DESIGN.md.
pub const KDF_SALT: &[u8] = b"vitae_secure_resume_ledger_salt";

/// A 256-bit key derived from the master secret.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Iteration count (default: 100000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 100_000,
        }
    }
}

/// Operator-held master secret.
pub struct MasterSecret;

impl MasterSecret {
    /// Generate a fresh random secret: 32 bytes, base64url without padding.
    pub fn generate() -> SecretString {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        let encoded = URL_SAFE_NO_PAD.encode(bytes);
        bytes.zeroize();
        SecretString::from(encoded)
    }
}

/// Derive the 256-bit operating key from a master secret.
///
/// Deterministic: the same secret and iteration count always yield the same key.
pub fn derive_key(secret: &SecretString, params: &KdfParams) -> DerivedKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        secret.expose_secret().as_bytes(),
        KDF_SALT,
        params.iterations,
        &mut key,
    );
    DerivedKey::from_bytes(key)
}
