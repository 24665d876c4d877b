//! BIP-44 style derivation path encoding.
//!
//! The device derives keys at `m/44'/coin'/0'/0/account`, where `coin` is
//! either the native coin type or, in compatibility mode, the coin type of
//! the legacy network the same device application also serves.
//!
//! ```text
//! | purpose  | coin     | account' | change   | index    |
//! |----------|----------|----------|----------|----------|
//! | 8000002C | 80000400 | 80000000 | 00000000 | 0000000N |
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Hardened purpose field, `44'`.
const PURPOSE: u32 = 0x8000_002C;

/// Hardened native coin type, `1024'`.
const COIN_NATIVE: u32 = 0x8000_0400;

/// Hardened compatibility coin type, `888'`.
const COIN_COMPAT: u32 = 0x8000_0378;

/// Hardened account field, `0'`.
const ACCOUNT: u32 = 0x8000_0000;

/// External chain, `0`.
const CHANGE: u32 = 0x0000_0000;

/// A derivation path selecting one key on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath {
    index: u32,
    compatible: bool,
}

impl DerivationPath {
    /// Encoded length in bytes.
    pub const BYTE_LEN: usize = 20;

    /// Creates a path for the given account index.
    ///
    /// # Arguments
    ///
    /// * `index` - Account index, last path component
    /// * `compatible` - Use the compatibility coin type
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AccountIndexOverflow`] if `index` does not fit
    /// in 4 bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use dapi_provider::ledger::DerivationPath;
    ///
    /// let path = DerivationPath::new(1, true).unwrap();
    /// assert_eq!(path.to_hex(), "8000002C80000378800000000000000000000001");
    /// ```
    pub fn new(index: u64, compatible: bool) -> Result<Self, ProtocolError> {
        let index = u32::try_from(index).map_err(|_| ProtocolError::AccountIndexOverflow(index))?;
        Ok(Self { index, compatible })
    }

    /// Returns the account index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns whether the compatibility coin type is used.
    #[must_use]
    pub const fn is_compatible(&self) -> bool {
        self.compatible
    }

    const fn coin(&self) -> u32 {
        if self.compatible { COIN_COMPAT } else { COIN_NATIVE }
    }

    const fn components(&self) -> [u32; 5] {
        [PURPOSE, self.coin(), ACCOUNT, CHANGE, self.index]
    }

    /// Serializes the path as five big-endian `u32`s.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut out = [0u8; Self::BYTE_LEN];
        for (chunk, component) in out.chunks_exact_mut(4).zip(self.components()) {
            chunk.copy_from_slice(&component.to_be_bytes());
        }
        out
    }

    /// Serializes the path as 40 uppercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in self.components() {
            write!(f, "{component:08X}")?;
        }
        Ok(())
    }
}

/// Serde form of a hardware account selection.
///
/// # Example
///
/// ```
/// use dapi_provider::ledger::{DerivationPath, LedgerConfig};
///
/// let config: LedgerConfig = serde_json::from_str(r#"{ "accountIndex": 3 }"#).unwrap();
/// let path = DerivationPath::try_from(config).unwrap();
/// assert_eq!(path.index(), 3);
/// assert!(!path.is_compatible());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerConfig {
    /// Account index, last path component.
    pub account_index: u64,

    /// Use the compatibility coin type.
    pub neo_compatible: bool,
}

impl TryFrom<LedgerConfig> for DerivationPath {
    type Error = ProtocolError;

    fn try_from(config: LedgerConfig) -> Result<Self, Self::Error> {
        Self::new(config.account_index, config.neo_compatible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_native_account_zero() {
        let path = DerivationPath::new(0, false).unwrap();
        assert_eq!(path.to_hex(), "8000002C80000400800000000000000000000000");
    }

    #[test]
    fn path_compat_account_one() {
        let path = DerivationPath::new(1, true).unwrap();
        let hex = path.to_hex();

        assert_eq!(&hex[8..16], "80000378");
        assert_eq!(&hex[32..], "00000001");
    }

    #[test]
    fn path_bytes_match_hex() {
        let path = DerivationPath::new(0xDEAD_BEEF, false).unwrap();

        assert_eq!(hex::encode_upper(path.to_bytes()), path.to_hex());
        assert_eq!(&path.to_hex()[32..], "DEADBEEF");
    }

    #[test]
    fn path_max_index() {
        let path = DerivationPath::new(u64::from(u32::MAX), false).unwrap();
        assert_eq!(&path.to_hex()[32..], "FFFFFFFF");
    }

    #[test]
    fn path_rejects_oversized_index() {
        let index = u64::from(u32::MAX) + 1;
        assert_eq!(
            DerivationPath::new(index, false),
            Err(ProtocolError::AccountIndexOverflow(index))
        );
    }

    #[test]
    fn config_defaults() {
        let config: LedgerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LedgerConfig::default());

        let path = DerivationPath::try_from(config).unwrap();
        assert_eq!(path, DerivationPath::default());
    }

    #[test]
    fn config_compat() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{ "accountIndex": 7, "neoCompatible": true }"#).unwrap();
        let path = DerivationPath::try_from(config).unwrap();

        assert_eq!(path.index(), 7);
        assert!(path.is_compatible());
    }
}
