//! Cryptographic utilities for secp256r1 (P-256) ECDSA.
//!
//! This module provides the key and signature helpers shared by the
//! in-memory signer, the hardware signer and the verifier:
//!
//! - Public key parsing and compression (SEC1)
//! - Private key parsing
//! - `SHA256withECDSA` signing and verification over raw message bytes
//!
//! # Example
//!
//! ```
//! use dapi_provider::crypto::{sign_message, verify_message};
//! use p256::ecdsa::SigningKey;
//!
//! let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
//! let sig = sign_message(&key, b"hello");
//! assert!(verify_message(key.verifying_key(), b"hello", &sig));
//! ```

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature as P256Signature, SigningKey, VerifyingKey};

use crate::error::{Error, Result};
use crate::signature::Signature;

/// Length of a compressed SEC1 public key in bytes.
pub const COMPRESSED_KEY_LEN: usize = 33;

/// Length of an uncompressed SEC1 public key in bytes.
pub const UNCOMPRESSED_KEY_LEN: usize = 65;

/// Checks that `s` is a non-empty string of hex digits (either case).
///
/// This is the check applied to message hashes before any decoding.
///
/// # Example
///
/// ```
/// use dapi_provider::crypto::is_hex;
///
/// assert!(is_hex("DEADbeef"));
/// assert!(!is_hex(""));
/// assert!(!is_hex("0xdeadbeef"));
/// ```
#[must_use]
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decodes a hex message hash into the bytes that get signed.
///
/// # Errors
///
/// Returns [`Error::MalformedMessage`] if `s` is not [hex](is_hex) or has an
/// odd number of digits.
pub fn decode_message_hash(s: &str) -> Result<Vec<u8>> {
    if !is_hex(s) {
        return Err(Error::MalformedMessage);
    }
    hex::decode(s).map_err(|_| Error::MalformedMessage)
}

/// Parses a hex encoded SEC1 public key (compressed or uncompressed).
///
/// # Errors
///
/// Returns [`Error::InvalidPublicKey`] if the input is not hex or not a point
/// on the curve.
pub fn parse_public_key(hex_str: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(hex_str).map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
    public_key_from_sec1(&bytes)
}

/// Parses SEC1 public key bytes (compressed or uncompressed).
///
/// # Errors
///
/// Returns [`Error::InvalidPublicKey`] if the bytes are not a valid point.
pub fn public_key_from_sec1(bytes: &[u8]) -> Result<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(bytes).map_err(|_| {
        Error::InvalidPublicKey(format!("not a valid SEC1 point ({} bytes)", bytes.len()))
    })
}

/// Encodes a public key in compressed SEC1 form as 66 lowercase hex characters.
///
/// # Example
///
/// ```
/// use dapi_provider::crypto::compress_public_key;
/// use p256::ecdsa::SigningKey;
///
/// let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
/// let hex = compress_public_key(key.verifying_key());
/// assert_eq!(hex.len(), 66);
/// ```
#[must_use]
pub fn compress_public_key(public_key: &VerifyingKey) -> String {
    hex::encode(public_key.to_encoded_point(true).as_bytes())
}

/// Parses a hex encoded 32-byte P-256 private key.
///
/// # Errors
///
/// Returns [`Error::HexDecodeFailed`] for bad hex, or
/// [`Error::InvalidArguments`] if the scalar is not a valid private key.
pub fn parse_private_key(hex_str: &str) -> Result<SigningKey> {
    let bytes = hex::decode(hex_str)?;
    SigningKey::from_slice(&bytes)
        .map_err(|_| Error::InvalidArguments("not a valid P-256 private key".to_string()))
}

/// Signs `message` with SHA-256 and ECDSA over P-256.
///
/// The message is hashed internally; pass the raw bytes.
#[must_use]
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Signature {
    let sig: P256Signature = key.sign(message);
    Signature::from(sig)
}

/// Verifies a `SHA256withECDSA` signature over `message`.
///
/// # Returns
///
/// [`true`](bool) if the signature is valid, [`false`](bool) otherwise,
/// including when the scalars are out of range.
#[must_use]
pub fn verify_message(public_key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    signature
        .to_p256()
        .is_ok_and(|sig| public_key.verify(message, &sig).is_ok())
}
