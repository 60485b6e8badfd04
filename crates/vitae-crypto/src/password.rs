//! One-way password digests

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use vitae_core::sha256_hex;

/// Application salt appended to every password before hashing.
pub const PASSWORD_SALT: &[u8] = b"vitae_credentials_salt_v1";

/// Hex SHA-256 of `password || PASSWORD_SALT`. Deterministic and irreversible.
pub fn hash_password(password: &str) -> String {
    let mut salted = Vec::with_capacity(password.len() + PASSWORD_SALT.len());
    salted.extend_from_slice(password.as_bytes());
    salted.extend_from_slice(PASSWORD_SALT);
    let digest = sha256_hex(&salted);
    salted.zeroize();
    digest
}

/// Recompute the digest of `password` and compare it with `expected` in constant time.
pub fn verify_password(password: &str, expected: &str) -> bool {
    hash_password(password)
        .as_bytes()
        .ct_eq(expected.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_password("secret"), hash_password("secret"));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let digest = hash_password("secret");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_salt_is_applied() {
        assert_ne!(hash_password("secret"), sha256_hex(b"secret"));
    }

    #[test]
    fn test_verify() {
        let stored = hash_password("secret");
        assert!(verify_password("secret", &stored));
        assert!(!verify_password("wrong", &stored));
        assert!(!verify_password("secret", "not-a-digest"));
    }

    proptest! {
        #[test]
        fn distinct_passwords_do_not_verify(a in ".{0,32}", b in ".{0,32}") {
            prop_assume!(a != b);
            prop_assert!(!verify_password(&b, &hash_password(&a)));
        }
    }
}
