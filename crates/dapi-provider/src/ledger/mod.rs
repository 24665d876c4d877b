//! Hardware signing device protocol.
//!
//! This module talks to a Ledger-style signing device over APDUs. It
//! supports:
//!
//! - Public key and address retrieval for a derivation path
//! - Chunked signing of arbitrary payloads
//!
//! # Architecture
//!
//! ```text
//! LedgerLink ──▶ HardwareSession ──▶ dyn DeviceTransport ──▶ device
//!     │               │
//!     │               └── apdu: framing, status words
//!     ├── path: derivation path encoding
//!     └── signature::assemble_signature: DER → r || s
//! ```
//!
//! - [`apdu`]: APDU command/response types, chunk planning
//! - [`path`]: derivation path encoding
//! - [`session`]: session lifecycle and the transport traits
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use dapi_provider::ledger::{DerivationPath, HidEnumerator, LedgerLink};
//!
//! let link = LedgerLink::new(Arc::new(HidEnumerator::new()));
//! let path = DerivationPath::new(0, false)?;
//!
//! let public_key = link.get_public_key(path).await?;
//! let signature = link.get_signature(b"hello", path).await?;
//! ```

pub mod apdu;
pub mod path;
pub mod session;

#[cfg(feature = "hid")]
pub mod hid;

#[cfg(test)]
pub(crate) mod mock;

use core::fmt;
use std::sync::Arc;

use p256::ecdsa::VerifyingKey;
use tokio::sync::Mutex;
use tracing::debug;

pub use apdu::{ApduAnswer, ApduCommand, ApduHeader};
#[cfg(feature = "hid")]
pub use hid::HidEnumerator;
pub use path::{DerivationPath, LedgerConfig};
pub use session::{
    DeviceDescriptor, DeviceEnumerator, DeviceTransport, HardwareSession, SessionState,
};

use crate::address::Address;
use crate::crypto::{UNCOMPRESSED_KEY_LEN, public_key_from_sec1};
use crate::error::{ProtocolError, Result};
use crate::signature::{Signature, assemble_signature};

/// Instruction headers.
mod ins {
    use super::ApduHeader;

    /// `GET PUBLIC KEY`.
    pub(super) const GET_PUBLIC_KEY: ApduHeader = ApduHeader::new(0x80, 0x04, 0x00, 0x00);

    /// `SIGN`, `P1` is set per chunk.
    pub(super) const SIGN: ApduHeader = ApduHeader::new(0x80, 0x02, 0x00, 0x00);
}

/// High-level operations against the hardware device.
///
/// Every operation opens its own [`HardwareSession`] and closes it on every
/// exit path. Operations on clones of the same link are serialized.
#[derive(Clone)]
pub struct LedgerLink {
    enumerator: Arc<dyn DeviceEnumerator>,
    lock: Arc<Mutex<()>>,
}

impl fmt::Debug for LedgerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerLink").finish_non_exhaustive()
    }
}

impl LedgerLink {
    /// Creates a link that reaches devices through `enumerator`.
    #[must_use]
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        Self {
            enumerator,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Reads the public key at `path`.
    ///
    /// # Errors
    ///
    /// - any session or device error
    /// - [`ProtocolError::ShortResponse`] if fewer than 65 bytes come back
    /// - [`Error::InvalidPublicKey`](crate::Error::InvalidPublicKey) if the
    ///   bytes are not a curve point
    pub async fn get_public_key(&self, path: DerivationPath) -> Result<VerifyingKey> {
        let _guard = self.lock.lock().await;
        self.public_key_session(path).await
    }

    /// Reads the account address at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`get_public_key`](Self::get_public_key).
    pub async fn get_address(&self, path: DerivationPath) -> Result<Address> {
        let public_key = self.get_public_key(path).await?;
        Ok(Address::from_public_key(&public_key))
    }

    /// Signs `data` with the key at `path`.
    ///
    /// # Errors
    ///
    /// See [`get_signature_hex`](Self::get_signature_hex).
    pub async fn get_signature(&self, data: &[u8], path: DerivationPath) -> Result<Signature> {
        self.get_signature_hex(&hex::encode(data), path).await
    }

    /// Signs hex encoded data with the key at `path`.
    ///
    /// The payload `data_hex || path` is sent in chunks of at most 510 hex
    /// characters, strictly in order; only the final answer carries the
    /// signature. Every chunk is decoded before the device is opened, so a
    /// bad payload never leaves the device holding a partial message.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidPayload`] if `data_hex` is not hex
    /// - [`ProtocolError::InvalidChunk`] if a chunk is not byte aligned
    /// - [`ProtocolError::MissingSignature`] if the final answer is empty
    /// - [`ProtocolError::MalformedSignature`] if the DER is truncated
    /// - any session or device error
    pub async fn get_signature_hex(
        &self,
        data_hex: &str,
        path: DerivationPath,
    ) -> Result<Signature> {
        let commands = Self::sign_commands(data_hex, path)?;

        let _guard = self.lock.lock().await;
        self.signature_session(&commands).await
    }

    /// Reads the public key at `path`, then signs hex encoded data with it.
    ///
    /// Both device sessions run while this link is held, so no other
    /// operation can reach the device in between.
    ///
    /// # Errors
    ///
    /// Same as [`get_public_key`](Self::get_public_key) and
    /// [`get_signature_hex`](Self::get_signature_hex).
    pub async fn sign_with_key(
        &self,
        data_hex: &str,
        path: DerivationPath,
    ) -> Result<(VerifyingKey, Signature)> {
        let commands = Self::sign_commands(data_hex, path)?;

        let _guard = self.lock.lock().await;
        let public_key = self.public_key_session(path).await?;
        let signature = self.signature_session(&commands).await?;
        Ok((public_key, signature))
    }

    fn sign_commands(data_hex: &str, path: DerivationPath) -> Result<Vec<ApduCommand>> {
        let payload = format!("{data_hex}{path}");
        let chunks = apdu::plan_chunks(ins::SIGN, &payload)?;

        let mut commands = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            commands.push(chunk.to_command(index)?);
        }
        Ok(commands)
    }

    async fn public_key_session(&self, path: DerivationPath) -> Result<VerifyingKey> {
        let mut session = HardwareSession::new();
        session.open(self.enumerator.as_ref()).await?;

        let result = Self::read_public_key(&mut session, path).await;
        session.close();
        result
    }

    async fn signature_session(&self, commands: &[ApduCommand]) -> Result<Signature> {
        let mut session = HardwareSession::new();
        session.open(self.enumerator.as_ref()).await?;

        let mut last = Vec::new();
        for command in commands {
            match session.send(command, &[apdu::status::OK]).await {
                Ok(data) => last = data,
                Err(e) => {
                    session.close();
                    return Err(e);
                }
            }
        }
        session.close();
        debug!(chunks = commands.len(), "signature received");

        if last.is_empty() {
            return Err(ProtocolError::MissingSignature.into());
        }
        Ok(assemble_signature(&last)?)
    }

    async fn read_public_key(
        session: &mut HardwareSession,
        path: DerivationPath,
    ) -> Result<VerifyingKey> {
        let command = ApduCommand::new(ins::GET_PUBLIC_KEY, path.to_bytes().to_vec());
        let data = session.send(&command, &[apdu::status::OK]).await?;

        let key = data
            .get(..UNCOMPRESSED_KEY_LEN)
            .ok_or(ProtocolError::ShortResponse {
                expected: UNCOMPRESSED_KEY_LEN,
                actual: data.len(),
            })?;
        public_key_from_sec1(key)
    }
}
