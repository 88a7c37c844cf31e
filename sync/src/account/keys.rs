//! # Key Management
//!
//! Ed25519 keypair generation and StrKey encoding for Stellar accounts.
//!
//! Stellar never shows raw key bytes to humans. A public key becomes a
//! `G...` account ID and a secret becomes an `S...` seed, both produced by
//! the StrKey scheme:
//!
//! ```text
//! base32( version_byte || payload(32) || crc16_xmodem(version_byte || payload) [LE] )
//! ```
//!
//! The result is always 56 characters. The checksum catches typos; it is not
//! a security feature.
//!
//! Key bytes are never logged. Keep it that way.

use crc::{Crc, CRC_16_XMODEM};
use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::record::SecretSeed;

/// Version byte for account IDs (`G...`).
const VERSION_ACCOUNT_ID: u8 = 6 << 3;

/// Version byte for secret seeds (`S...`).
const VERSION_SEED: u8 = 18 << 3;

/// version (1) + key (32) + checksum (2).
const STRKEY_RAW_LENGTH: usize = 35;

/// 35 bytes is exactly 56 base32 characters, so there is never padding.
const STRKEY_ENCODED_LENGTH: usize = 56;

/// Errors from decoding StrKey strings.
///
/// Deliberately terse. Echoing back parts of a malformed secret in an error
/// message is exactly how secrets end up in logs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("strkey has wrong length")]
    InvalidLength,

    #[error("strkey contains characters outside the base32 alphabet")]
    InvalidEncoding,

    #[error("strkey has unexpected version byte")]
    InvalidVersion,

    #[error("strkey checksum mismatch")]
    InvalidChecksum,

    #[error("public key bytes are not a valid Ed25519 point")]
    InvalidPublicKey,
}

// ---------------------------------------------------------------------------
// StellarKeypair
// ---------------------------------------------------------------------------

/// An Ed25519 keypair for one Stellar account.
///
/// Does not implement `Serialize`. The only way secret material leaves this
/// type is [`secret_seed`](Self::secret_seed), which is what the create flow
/// hands to the record.
pub struct StellarKeypair {
    signing_key: SigningKey,
}

impl StellarKeypair {
    /// A fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Tests and recovery only.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuilds a keypair from an `S...` seed.
    pub fn from_secret_seed(seed: &SecretSeed) -> Result<Self, KeyError> {
        let bytes = decode_strkey(VERSION_SEED, seed.expose())?;
        Ok(Self::from_seed(&bytes))
    }

    /// The `G...` account ID.
    pub fn account_id(&self) -> String {
        encode_strkey(VERSION_ACCOUNT_ID, self.signing_key.verifying_key().as_bytes())
    }

    /// The `S...` secret seed.
    pub fn secret_seed(&self) -> SecretSeed {
        SecretSeed::new(encode_strkey(VERSION_SEED, &self.signing_key.to_bytes()))
    }
}

/// Validates a `G...` account ID and returns the raw public key bytes.
pub fn decode_account_id(account_id: &str) -> Result<[u8; 32], KeyError> {
    let bytes = decode_strkey(VERSION_ACCOUNT_ID, account_id)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// StrKey
// ---------------------------------------------------------------------------

/// CRC-16/XMODEM: polynomial 0x1021, initial value 0, no reflection.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

fn encode_strkey(version: u8, payload: &[u8; 32]) -> String {
    let mut raw = Vec::with_capacity(STRKEY_RAW_LENGTH);
    raw.push(version);
    raw.extend_from_slice(payload);
    let checksum = CRC16.checksum(&raw);
    raw.extend_from_slice(&checksum.to_le_bytes());
    BASE32_NOPAD.encode(&raw)
}

fn decode_strkey(version: u8, encoded: &str) -> Result<[u8; 32], KeyError> {
    if encoded.len() != STRKEY_ENCODED_LENGTH {
        return Err(KeyError::InvalidLength);
    }
    let raw = BASE32_NOPAD
        .decode(encoded.as_bytes())
        .map_err(|_| KeyError::InvalidEncoding)?;
    if raw.len() != STRKEY_RAW_LENGTH {
        return Err(KeyError::InvalidLength);
    }
    if raw[0] != version {
        return Err(KeyError::InvalidVersion);
    }

    let (body, checksum) = raw.split_at(STRKEY_RAW_LENGTH - 2);
    if checksum != CRC16.checksum(body).to_le_bytes() {
        return Err(KeyError::InvalidChecksum);
    }

    let mut payload = [0u8; 32];
    payload.copy_from_slice(&body[1..]);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_key_encodes_to_known_account_id() {
        let encoded = encode_strkey(VERSION_ACCOUNT_ID, &[0u8; 32]);
        assert_eq!(
            encoded,
            "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF"
        );
    }

    #[test]
    fn zero_seed_encodes_to_known_secret() {
        let encoded = encode_strkey(VERSION_SEED, &[0u8; 32]);
        assert_eq!(
            encoded,
            "SAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSU2"
        );
    }

    #[test]
    fn sequential_bytes_encode_to_known_account_id() {
        let mut payload = [0u8; 32];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(
            encode_strkey(VERSION_ACCOUNT_ID, &payload),
            "GAAACAQDAQCQMBYIBEFAWDANBYHRAEISCMKBKFQXDAMRUGY4DUPB7JZX"
        );
    }

    #[test]
    fn generated_keypair_has_stellar_shaped_keys() {
        let kp = StellarKeypair::generate();
        let account_id = kp.account_id();
        let seed = kp.secret_seed();

        assert!(account_id.starts_with('G'));
        assert!(seed.expose().starts_with('S'));
        assert_eq!(account_id.len(), STRKEY_ENCODED_LENGTH);
        assert_eq!(seed.expose().len(), STRKEY_ENCODED_LENGTH);
        assert!(decode_account_id(&account_id).is_ok());
    }

    #[test]
    fn secret_seed_restores_the_same_account() {
        let kp = StellarKeypair::from_seed(&[7u8; 32]);
        let restored = StellarKeypair::from_secret_seed(&kp.secret_seed()).unwrap();
        assert_eq!(restored.account_id(), kp.account_id());
    }

    #[test]
    fn two_generated_keypairs_differ() {
        let a = StellarKeypair::generate();
        let b = StellarKeypair::generate();
        assert_ne!(a.account_id(), b.account_id());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut id = StellarKeypair::from_seed(&[1u8; 32]).account_id();
        // Flip the final character to another alphabet member.
        let last = id.pop().unwrap();
        id.push(if last == 'A' { 'B' } else { 'A' });
        assert_eq!(decode_account_id(&id), Err(KeyError::InvalidChecksum));
    }

    #[test]
    fn seed_is_not_accepted_as_account_id() {
        let seed = StellarKeypair::from_seed(&[2u8; 32]).secret_seed();
        assert_eq!(
            decode_account_id(seed.expose()),
            Err(KeyError::InvalidVersion)
        );
    }

    #[test]
    fn checksum_matches_xmodem_check_value() {
        assert_eq!(CRC16.checksum(b"123456789"), 0x31C3);
    }

    #[test]
    fn account_id_round_trips_through_decode() {
        let kp = StellarKeypair::from_seed(&[9u8; 32]);
        let decoded = decode_account_id(&kp.account_id()).unwrap();
        assert_eq!(&decoded, kp.signing_key.verifying_key().as_bytes());
    }

    #[test]
    fn malformed_strings_are_rejected() {
        assert_eq!(decode_account_id("GABC"), Err(KeyError::InvalidLength));
        let lowercase = "g".repeat(STRKEY_ENCODED_LENGTH);
        assert_eq!(decode_account_id(&lowercase), Err(KeyError::InvalidEncoding));
    }
}
