//! P-256 ECDSA signature in the fixed-width `r || s` wire form.
//!
//! This module provides the [`Signature`] type returned by every signing path
//! of the crate, and [`assemble_signature`], which decomposes the DER encoded
//! signature produced by the hardware device into two 32-byte scalars.
//!
//! # Signature Format
//!
//! - `r`: 32-byte big-endian scalar
//! - `s`: 32-byte big-endian scalar
//!
//! There is no recovery byte. The hex form is 128 characters. When parsing, a
//! 130 character form whose first byte is the `SHA256withECDSA` scheme tag
//! (`01`) is also accepted.
//!
//! # Example
//!
//! ```
//! use dapi_provider::Signature;
//!
//! let sig = Signature::new([1u8; 32], [2u8; 32]);
//! assert_eq!(sig.to_hex().len(), 128);
//! assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
//! ```

use core::fmt;

use p256::ecdsa::Signature as P256Signature;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{Error, ProtocolError, Result};

/// Scheme tag for `SHA256withECDSA` that may prefix a serialized signature.
pub const SCHEME_SHA256_ECDSA: u8 = 0x01;

/// A P-256 ECDSA signature as two 32-byte scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    /// The R component of the signature (32 bytes).
    r: [u8; 32],

    /// The S component of the signature (32 bytes).
    s: [u8; 32],
}

impl Signature {
    /// The length of a serialized signature in bytes.
    pub const BYTE_LEN: usize = 64;

    /// Creates a new signature from raw components.
    ///
    /// # Arguments
    ///
    /// * `r` - The R component as a 32-byte big-endian array
    /// * `s` - The S component as a 32-byte big-endian array
    #[must_use]
    pub const fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Self { r, s }
    }

    /// Creates a signature from `r || s`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if the slice is not 64 bytes, or 65
    /// bytes starting with the `SHA256withECDSA` scheme tag.
    ///
    /// # Example
    ///
    /// ```
    /// use dapi_provider::Signature;
    ///
    /// let sig = Signature::from_bytes(&[0u8; 64]).unwrap();
    /// assert_eq!(sig.r(), &[0u8; 32]);
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = match bytes {
            [SCHEME_SHA256_ECDSA, rest @ ..] if rest.len() == Self::BYTE_LEN => rest,
            _ => bytes,
        };

        let Ok(bytes) = <&[u8; Self::BYTE_LEN]>::try_from(bytes) else {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        };

        let (r, s) = bytes.split_at(32);
        let mut sig = Self::new([0u8; 32], [0u8; 32]);
        sig.r.copy_from_slice(r);
        sig.s.copy_from_slice(s);
        Ok(sig)
    }

    /// Serializes the signature to a 64-byte array containing `r || s`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes
    }

    /// Returns the R component of the signature.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component of the signature.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Encodes the signature as 128 lowercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parses a signature from a hex string.
    ///
    /// # Arguments
    ///
    /// * `hex_str` - 128 hex characters, or 130 with a leading `01` scheme tag
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] if the hex string is invalid, or
    /// [`Error::InvalidSignature`] if the decoded length is wrong.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)?;
        Self::from_bytes(&bytes)
    }

    /// Converts to the `p256` signature type used for verification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if either scalar is zero or not
    /// below the curve order.
    pub fn to_p256(&self) -> Result<P256Signature> {
        P256Signature::from_scalars(self.r, self.s)
            .map_err(|e| Error::InvalidSignature(e.to_string()))
    }

    /// Encodes the signature as an ASN.1 DER `SEQUENCE { r, s }`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if the scalars are out of range.
    ///
    /// # Example
    ///
    /// ```
    /// use dapi_provider::Signature;
    /// use dapi_provider::signature::assemble_signature;
    ///
    /// let sig = Signature::new([0x11; 32], [0x22; 32]);
    /// let der = sig.to_der().unwrap();
    /// assert_eq!(assemble_signature(&der).unwrap(), sig);
    /// ```
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_p256()?.to_der().as_bytes().to_vec())
    }
}

impl From<P256Signature> for Signature {
    fn from(sig: P256Signature) -> Self {
        let (r, s) = sig.split_bytes();
        let mut out = Self::new([0u8; 32], [0u8; 32]);
        out.r.copy_from_slice(&r);
        out.s.copy_from_slice(&s);
        out
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Decomposes a DER encoded signature returned by the device.
///
/// The layout walked is `30 L 02 Lr r 02 Ls s`: skip the two outer bytes and
/// the `r` tag, read the length-prefixed `r`, skip the `s` tag, then read the
/// length-prefixed `s`. Tag values are not checked. Each integer is
/// normalized to 32 bytes by left-padding with zeros or by keeping its
/// lowest-order 32 bytes when longer (the DER sign byte).
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedSignature`] if the input ends before a
/// declared field does.
///
/// # Example
///
/// ```
/// use dapi_provider::signature::assemble_signature;
///
/// // r = 0x01, s = 0x02
/// let der = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
/// let sig = assemble_signature(&der).unwrap();
///
/// assert_eq!(sig.r()[31], 0x01);
/// assert_eq!(sig.s()[31], 0x02);
/// assert!(sig.r()[..31].iter().all(|&b| b == 0));
/// ```
pub fn assemble_signature(der: &[u8]) -> core::result::Result<Signature, ProtocolError> {
    let mut reader = DerReader { bytes: der, pos: 0 };

    reader.skip(2, "missing sequence header")?;
    reader.skip(1, "missing r tag")?;
    let r = reader.integer("missing r length", "truncated r")?;
    reader.skip(1, "missing s tag")?;
    let s = reader.integer("missing s length", "truncated s")?;

    Ok(Signature::new(r, s))
}

/// Cursor over a DER signature.
struct DerReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn skip(&mut self, n: usize, what: &'static str) -> core::result::Result<(), ProtocolError> {
        self.take(n, what).map(|_| ())
    }

    fn take(&mut self, n: usize, what: &'static str) -> core::result::Result<&'a [u8], ProtocolError> {
        let field = self
            .bytes
            .get(self.pos..self.pos + n)
            .ok_or(ProtocolError::MalformedSignature(what))?;
        self.pos += n;
        Ok(field)
    }

    fn integer(
        &mut self,
        len_err: &'static str,
        value_err: &'static str,
    ) -> core::result::Result<[u8; 32], ProtocolError> {
        let len = usize::from(self.take(1, len_err)?[0]);
        let value = self.take(len, value_err)?;
        Ok(normalize_scalar(value))
    }
}

/// Left-pads to 32 bytes, or keeps the lowest-order 32 bytes.
fn normalize_scalar(value: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    if value.len() >= 32 {
        out.copy_from_slice(&value[value.len() - 32..]);
    } else {
        out[32 - value.len()..].copy_from_slice(value);
    }
    out
}
