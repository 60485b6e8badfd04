//! Key hierarchy: derived key → token encryption and authentication subkeys

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use vitae_core::VitaeResult;

use crate::kdf::DerivedKey;
use crate::KEY_SIZE;

/// The two subkeys used by the token format. Zeroized on drop.
#[derive(Clone)]
pub struct TokenKeys {
    enc: [u8; KEY_SIZE],
    mac: [u8; KEY_SIZE],
}

impl TokenKeys {
    /// Expand both subkeys from the derived key via HKDF-SHA256.
    pub fn expand(derived: &DerivedKey) -> VitaeResult<Self> {
        Ok(Self {
            enc: hkdf_derive(derived.as_bytes(), b"vitae-token-enc")?,
            mac: hkdf_derive(derived.as_bytes(), b"vitae-token-mac")?,
        })
    }

    pub fn enc_key(&self) -> &[u8; KEY_SIZE] {
        &self.enc
    }

    pub fn mac_key(&self) -> &[u8; KEY_SIZE] {
        &self.mac
    }
}

impl Drop for TokenKeys {
    fn drop(&mut self) {
        self.enc.zeroize();
        self.mac.zeroize();
    }
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("enc", &"[REDACTED]")
            .field("mac", &"[REDACTED]")
            .finish()
    }
}

/// HKDF-SHA256 key derivation with a domain-specific info string.
fn hkdf_derive(ikm: &[u8; KEY_SIZE], info: &[u8]) -> VitaeResult<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subkeys_differ() {
        let keys = TokenKeys::expand(&DerivedKey::from_bytes([42u8; KEY_SIZE])).unwrap();
        assert_ne!(
            keys.enc_key(),
            keys.mac_key(),
            "different domains must produce different keys"
        );
    }

    #[test]
    fn test_expand_deterministic() {
        let a = TokenKeys::expand(&DerivedKey::from_bytes([7u8; KEY_SIZE])).unwrap();
        let b = TokenKeys::expand(&DerivedKey::from_bytes([7u8; KEY_SIZE])).unwrap();
        assert_eq!(a.enc_key(), b.enc_key());
        assert_eq!(a.mac_key(), b.mac_key());
    }

    #[test]
    fn test_different_derived_keys() {
        let a = TokenKeys::expand(&DerivedKey::from_bytes([1u8; KEY_SIZE])).unwrap();
        let b = TokenKeys::expand(&DerivedKey::from_bytes([2u8; KEY_SIZE])).unwrap();
        assert_ne!(a.enc_key(), b.enc_key());
    }
}
