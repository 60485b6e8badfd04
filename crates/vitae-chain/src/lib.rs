//! vitae-chain: single-writer, append-only hash chain
//!
//! Every block commits to its predecessor's hash and carries a proof-of-work
//! nonce. The whole chain is persisted as one JSON snapshot after each append;
//! when a `CipherSuite` is configured each block's payload is stored as an
//! authenticated token. Hashes are always computed over the plaintext payload,
//! so at-rest encryption never affects them.

pub mod block;
pub mod ledger;
pub mod snapshot;

pub use block::{Block, BlockRecord, Payload, GENESIS_MESSAGE, GENESIS_PREVIOUS_HASH};
pub use ledger::{ChainInfo, Ledger, LoadOutcome};
