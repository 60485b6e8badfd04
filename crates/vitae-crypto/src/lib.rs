//! vitae-crypto: field-level encryption for ledger records
//!
//! Key hierarchy:
//! ```text
//! Master Secret (operator supplied, or generated once)
//!   └── Derived Key (PBKDF2-HMAC-SHA256, fixed application salt, 100k iterations)
//!       ├── Token Encryption Key (HKDF, info="vitae-token-enc")  → XChaCha20
//!       └── Token MAC Key       (HKDF, info="vitae-token-mac")  → HMAC-SHA256
//! ```
//!
//! Tokens are encrypt-then-MAC: the tag covers version, timestamp, IV and
//! ciphertext, and is checked before any decryption happens.

pub mod fields;
pub mod kdf;
pub mod keys;
pub mod password;
pub mod suite;
pub mod token;

pub use kdf::{derive_key, DerivedKey, KdfParams, MasterSecret};
pub use keys::TokenKeys;
pub use password::{hash_password, verify_password};
pub use suite::CipherSuite;
pub use token::{decrypt_text, encrypt_text, token_timestamp};

/// Size of every symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20 IV (192-bit)
pub const IV_SIZE: usize = 24;

/// Size of an HMAC-SHA256 tag
pub const TAG_SIZE: usize = 32;

/// Current token format version
pub const TOKEN_VERSION: u8 = 0x01;
