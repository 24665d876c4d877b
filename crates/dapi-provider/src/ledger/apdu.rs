//! APDU (Application Protocol Data Unit) command and response types.
//!
//! This module provides the command framing used to talk to the hardware
//! signer: header parsing and validation, payload chunking, and status word
//! checks.
//!
//! # APDU Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data |
//! |-----|-----|----|----|----|----- |
//! | 1B  | 1B  | 1B | 1B | 1B | Var  |
//! ```
//!
//! Headers are usually written as 8 hex characters, e.g. `80040000` for
//! `CLA=0x80 INS=0x04 P1=0x00 P2=0x00`.
//!
//! Responses are the answer data followed by the 2-byte status word.
//!
//! # Chunking
//!
//! The device accepts at most 255 payload bytes per command. Longer payloads
//! are split into chunks of at most [`MAX_CHUNK_HEX`] hex characters by
//! [`plan_chunks`]; every chunk but the last carries `P1 = 0x00`, the last
//! carries `P1 = 0x80`.
//!
//! Framing on the wire is left to the transport; commands and answers here
//! carry the header, data and status word as separate fields.
//!
//! # Example
//!
//! ```
//! use dapi_provider::ledger::apdu::{ApduCommand, ApduHeader};
//!
//! let header: ApduHeader = "80040000".parse().unwrap();
//! let apdu = ApduCommand::new(header, vec![0x80, 0x00, 0x00, 0x2C]);
//!
//! assert_eq!(apdu.header().ins, 0x04);
//! assert_eq!(apdu.data().len(), 4);
//! ```

use core::fmt;
use core::str::FromStr;

use crate::error::{DeviceError, ProtocolError};

/// Maximum number of hex characters carried by one command (255 bytes).
pub const MAX_CHUNK_HEX: usize = 510;

/// Status words returned by the device.
pub mod status {
    /// Success.
    pub const OK: u16 = 0x9000;

    /// The message does not fit in the device buffer.
    pub const MESSAGE_TOO_BIG: u16 = 0x6D08;

    /// The signing application is not open on the device.
    pub const APP_CLOSED: u16 = 0x6E00;

    /// The user rejected the request on the device.
    pub const TX_DENIED: u16 = 0x6985;

    /// The device could not parse the payload.
    pub const TX_PARSE_ERROR: u16 = 0x6D07;
}

/// The 4-byte header of an APDU command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApduHeader {
    /// Class byte.
    pub cla: u8,

    /// Instruction byte.
    pub ins: u8,

    /// Parameter 1.
    pub p1: u8,

    /// Parameter 2.
    pub p2: u8,
}

impl ApduHeader {
    /// Creates a header from its four fields.
    #[must_use]
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self { cla, ins, p1, p2 }
    }

    /// Returns a copy of this header with a different `P1`.
    #[must_use]
    pub const fn with_p1(self, p1: u8) -> Self {
        Self { p1, ..self }
    }
}

impl FromStr for ApduHeader {
    type Err = ProtocolError;

    /// Parses a header written as exactly 8 hex characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProtocolError::MalformedHeader(s.to_string()));
        }

        let mut fields = [0u8; 4];
        hex::decode_to_slice(s, &mut fields)
            .map_err(|_| ProtocolError::MalformedHeader(s.to_string()))?;
        let [cla, ins, p1, p2] = fields;

        Ok(Self::new(cla, ins, p1, p2))
    }
}

impl fmt::Display for ApduHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}{:02X}{:02X}{:02X}",
            self.cla, self.ins, self.p1, self.p2
        )
    }
}

/// An APDU command: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    /// Command header.
    header: ApduHeader,

    /// Command data.
    data: Vec<u8>,
}

impl ApduCommand {
    /// Creates a new APDU command.
    #[must_use]
    pub const fn new(header: ApduHeader, data: Vec<u8>) -> Self {
        Self { header, data }
    }

    /// Returns the command header.
    #[must_use]
    pub const fn header(&self) -> ApduHeader {
        self.header
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// An APDU response from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduAnswer {
    /// Response data.
    data: Vec<u8>,

    /// Status word.
    status_word: u16,
}

impl ApduAnswer {
    /// Creates an answer from its data and status word.
    #[must_use]
    pub const fn new(data: Vec<u8>, status_word: u16) -> Self {
        Self { data, status_word }
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the answer and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the status word.
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        self.status_word
    }

    /// Checks the status word against the accepted set.
    ///
    /// # Errors
    ///
    /// Returns the translated [`DeviceError`] if the status word is not in
    /// `accepted`.
    pub fn check(&self, accepted: &[u16]) -> Result<(), DeviceError> {
        if accepted.contains(&self.status_word) {
            Ok(())
        } else {
            Err(DeviceError::from_status(self.status_word))
        }
    }
}

/// One planned transmission of a chunked payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Header for this chunk, with `P1` set for its position.
    pub header: ApduHeader,

    /// The hex characters carried by this chunk.
    pub data_hex: &'a str,
}

impl Chunk<'_> {
    /// Decodes the chunk into the command that carries it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidChunk`] if the chunk holds an odd
    /// number of hex characters.
    pub fn to_command(&self, index: usize) -> Result<ApduCommand, ProtocolError> {
        let data = hex::decode(self.data_hex).map_err(|_| ProtocolError::InvalidChunk { index })?;
        Ok(ApduCommand::new(self.header, data))
    }
}

/// `P1` value of every chunk but the last.
pub const P1_MORE: u8 = 0x00;

/// `P1` value of the last chunk.
pub const P1_LAST: u8 = 0x80;

/// Splits a hex payload into chunks of at most [`MAX_CHUNK_HEX`] characters.
///
/// Each chunk gets `base` as its header, with `P1` replaced by [`P1_LAST`]
/// on the final chunk and [`P1_MORE`] on all others.
///
/// # Errors
///
/// - [`ProtocolError::EmptyPayload`] if `payload_hex` is empty
/// - [`ProtocolError::InvalidPayload`] if it contains non-hex characters
///
/// # Example
///
/// ```
/// use dapi_provider::ledger::apdu::{ApduHeader, plan_chunks};
///
/// let payload = "ab".repeat(300);
/// let chunks = plan_chunks(ApduHeader::new(0x80, 0x02, 0x00, 0x00), &payload).unwrap();
///
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[0].header.p1, 0x00);
/// assert_eq!(chunks[1].header.p1, 0x80);
/// ```
pub fn plan_chunks(base: ApduHeader, payload_hex: &str) -> Result<Vec<Chunk<'_>>, ProtocolError> {
    if payload_hex.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    if !payload_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::InvalidPayload);
    }

    // All-ASCII at this point, so byte offsets are char boundaries.
    let total = payload_hex.len().div_ceil(MAX_CHUNK_HEX);
    let chunks = (0..total)
        .map(|i| {
            let start = i * MAX_CHUNK_HEX;
            let end = (start + MAX_CHUNK_HEX).min(payload_hex.len());
            let p1 = if i + 1 == total { P1_LAST } else { P1_MORE };
            Chunk {
                header: base.with_p1(p1),
                data_hex: &payload_hex[start..end],
            }
        })
        .collect();

    Ok(chunks)
}
