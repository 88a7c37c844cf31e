//! # Account Module: Records, Balances & Keys
//!
//! ```text
//! record.rs : AccountRecord, Balance snapshot, SecretSeed
//! keys.rs   : Ed25519 keypair generation and StrKey encoding
//! ```
//!
//! A record is the locally cached view of one slot's remote state. It is
//! created once with an empty balance list and afterwards only ever has its
//! balances replaced. The public key never changes.

pub mod keys;
pub mod record;

pub use keys::{KeyError, StellarKeypair};
pub use record::{AccountRecord, Balance, SecretSeed};
