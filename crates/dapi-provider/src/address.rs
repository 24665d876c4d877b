//! Account address derivation from secp256r1 public keys.
//!
//! An account address is the hash of the single-signature verification
//! program built around a compressed P-256 public key:
//!
//! 1. Build the program `0x21 || compressed_key (33 bytes) || 0xAC`
//! 2. Hash it with SHA-256, then RIPEMD-160, giving the 20-byte address
//! 3. For display, base58 encode `0x17 || address || checksum`, where the
//!    checksum is the first 4 bytes of SHA-256(SHA-256(`0x17 || address`))
//!
//! # Example
//!
//! ```
//! use dapi_provider::Address;
//!
//! let addr: Address = "AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF".parse().unwrap();
//! assert_eq!(addr.to_base58(), "AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF");
//! ```

use core::fmt;
use core::str::FromStr;

use p256::ecdsa::VerifyingKey;
use ripemd::Ripemd160;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Version byte prepended before base58 encoding.
pub const ADDRESS_VERSION: u8 = 0x17;

/// `PUSHBYTES33` opcode preceding the public key in the program.
const PUSH_BYTES_33: u8 = 0x21;

/// `CHECKSIG` opcode terminating the program.
const CHECKSIG: u8 = 0xAC;

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; Address::BYTE_LEN]);

impl Address {
    /// The length of an address in bytes.
    pub const BYTE_LEN: usize = 20;

    /// Creates a new address from a 20-byte array.
    #[must_use]
    pub const fn new(bytes: [u8; Self::BYTE_LEN]) -> Self {
        Self(bytes)
    }

    /// Derives the address of a P-256 public key.
    ///
    /// # Arguments
    ///
    /// * `public_key` - A reference to a P-256 verifying key
    ///
    /// # Example
    ///
    /// ```
    /// use dapi_provider::Address;
    /// use p256::ecdsa::SigningKey;
    ///
    /// let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
    /// let address = Address::from_public_key(key.verifying_key());
    /// assert_eq!(address.to_base58(), "AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF");
    /// ```
    #[must_use]
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let compressed = public_key.to_encoded_point(true);

        let mut program = Vec::with_capacity(35);
        program.push(PUSH_BYTES_33);
        program.extend_from_slice(compressed.as_bytes());
        program.push(CHECKSIG);

        let hash = Ripemd160::digest(Sha256::digest(&program));
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes.copy_from_slice(&hash);

        Self::new(bytes)
    }

    /// Returns the address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::BYTE_LEN] {
        &self.0
    }

    /// Returns the address as 40 lowercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses an address from 40 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedAccount`] if the input is not 20 hex encoded
    /// bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let mut bytes = [0u8; Self::BYTE_LEN];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| Error::MalformedAccount(format!("{hex_str}: {e}")))?;
        Ok(Self::new(bytes))
    }

    /// Encodes the address in its base58check display form.
    #[must_use]
    pub fn to_base58(&self) -> String {
        let mut data = Vec::with_capacity(1 + Self::BYTE_LEN + 4);
        data.push(ADDRESS_VERSION);
        data.extend_from_slice(&self.0);
        let checksum = checksum(&data);
        data.extend_from_slice(&checksum);

        bs58::encode(data).into_string()
    }

    /// Parses an address from its base58check display form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedAccount`] if the string is not base58, has
    /// the wrong length or version byte, or fails the checksum.
    pub fn from_base58(s: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedAccount(format!("{s}: {reason}"));

        let data = bs58::decode(s)
            .into_vec()
            .map_err(|e| malformed(&e.to_string()))?;
        if data.len() != 1 + Self::BYTE_LEN + 4 {
            return Err(malformed("wrong length"));
        }

        let (payload, check) = data.split_at(1 + Self::BYTE_LEN);
        if payload[0] != ADDRESS_VERSION {
            return Err(malformed("wrong version byte"));
        }
        if checksum(payload) != check {
            return Err(malformed("checksum mismatch"));
        }

        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes.copy_from_slice(&payload[1..]);
        Ok(Self::new(bytes))
    }
}

/// First 4 bytes of double SHA-256.
fn checksum(data: &[u8]) -> [u8; 4] {
    let hash = Sha256::digest(Sha256::digest(data));
    [hash[0], hash[1], hash[2], hash[3]]
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base58(s)
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self::new(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(de::Error::custom)
    }
}
