//! Error types for the dApi provider engine.
//!
//! This module provides the crate-wide error type [`enum@Error`] together with
//! two layer-specific enums:
//!
//! - [`DeviceError`]: failures reported by (or about) the hardware device,
//!   including the translated status words
//! - [`ProtocolError`]: violations of the command protocol detected on the
//!   host side (bad headers, bad chunking, malformed signature responses)
//!
//! # Error Categories
//!
//! Every error belongs to exactly one [`ErrorKind`] so calling code can branch
//! on it, e.g. prompt for an account on [`ErrorKind::Handler`] but tell the
//! user to plug in the device on [`ErrorKind::Device`].
//!
//! # Example
//!
//! ```
//! use dapi_provider::error::{DeviceError, Error, ErrorKind};
//!
//! let err: Error = DeviceError::from_status(0x6985).into();
//! assert_eq!(err.kind(), ErrorKind::Device);
//! assert!(matches!(err, Error::Device(DeviceError::TransactionDenied)));
//! ```

use core::result::Result as CoreResult;
use hex::FromHexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The main error type for the provider engine.
///
/// Handler failures are surfaced to the caller of
/// [`ProviderEngine::send_async`](crate::engine::ProviderEngine::send_async)
/// exactly as the handler produced them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Dispatch Errors
    // =========================================================================
    /// The engine was never started or has been stopped.
    #[error("provider engine is not running")]
    EngineNotRunning,

    /// The method identifier is not of the form `component.method`.
    #[error("unsupported method identifier: {0:?}")]
    UnsupportedMethod(String),

    /// No provider in the chain handles the requested method.
    #[error("requested method {0} is not handled by any provider")]
    MethodNotHandled(String),

    // =========================================================================
    // Handler Errors
    // =========================================================================
    /// No account is available to the provider.
    #[error("no account available")]
    NoAccount,

    /// An account address argument could not be parsed.
    #[error("malformed account: {0}")]
    MalformedAccount(String),

    /// The asset argument is neither a native asset nor a token contract.
    #[error("malformed asset: {0}")]
    MalformedAsset(String),

    /// A message hash argument is not hex encoded.
    #[error("malformed message: message hash must be hex encoded")]
    MalformedMessage,

    /// The handler arguments do not match the method's expected shape.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The public key is invalid or malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature is invalid or malformed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The chain did not accept a submitted transaction.
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    /// The chain client failed to answer a query.
    #[error("chain client error: {0}")]
    Client(String),

    /// A provider hook refused to let the call proceed.
    #[error("rejected by hook: {0}")]
    Rejected(String),

    // =========================================================================
    // Device & Protocol Errors
    // =========================================================================
    /// The hardware device failed or reported a failure status word.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The device exchange violated the command protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    /// Failed to parse hex data.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    JsonError(String),
}

/// Coarse classification of an [`enum@Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The engine or the request itself is misconfigured.
    Configuration,
    /// The provider chain was exhausted without a match.
    NotHandled,
    /// A provider's own domain failure.
    Handler,
    /// A device failure or mapped status word.
    Device,
    /// A host-side protocol violation.
    Protocol,
}

impl Error {
    /// Returns the category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EngineNotRunning | Self::UnsupportedMethod(_) => ErrorKind::Configuration,
            Self::MethodNotHandled(_) => ErrorKind::NotHandled,
            Self::Device(_) => ErrorKind::Device,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::NoAccount
            | Self::MalformedAccount(_)
            | Self::MalformedAsset(_)
            | Self::MalformedMessage
            | Self::InvalidArguments(_)
            | Self::InvalidPublicKey(_)
            | Self::InvalidSignature(_)
            | Self::TransactionRejected(_)
            | Self::Client(_)
            | Self::Rejected(_)
            | Self::HexDecodeFailed(_)
            | Self::JsonError(_) => ErrorKind::Handler,
        }
    }
}

/// Errors reported by, or about, the hardware signing device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DeviceError {
    /// The platform cannot provide the device transport.
    #[error("hardware device transport is not supported on this platform")]
    Unsupported,

    /// No device is attached.
    #[error("no hardware device found")]
    NotFound,

    /// The enumerated device could not be opened.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The transport failed while exchanging a command.
    #[error("device transport failed: {0}")]
    Transport(String),

    /// Status word `0x6D08`.
    #[error("message too large for the device")]
    MessageTooLarge,

    /// Status word `0x6E00`.
    #[error("device application is closed")]
    ApplicationClosed,

    /// Status word `0x6985`.
    #[error("transaction denied on the device")]
    TransactionDenied,

    /// Status word `0x6D07`.
    #[error("device could not parse the transaction")]
    TransactionParse,

    /// Any status word without a dedicated meaning.
    #[error("unexpected status word: {0:#06x}")]
    Status(u16),
}

impl DeviceError {
    /// Translates a status word that was not accepted for a command.
    ///
    /// The four named failure codes map to their dedicated variants; every
    /// other code, success included, is carried verbatim in
    /// [`DeviceError::Status`].
    #[must_use]
    pub const fn from_status(code: u16) -> Self {
        match code {
            0x6D08 => Self::MessageTooLarge,
            0x6E00 => Self::ApplicationClosed,
            0x6985 => Self::TransactionDenied,
            0x6D07 => Self::TransactionParse,
            other => Self::Status(other),
        }
    }
}

/// Host-side violations of the device command protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A command header is not exactly 8 hex characters.
    #[error("command header must be 4 bytes (8 hex characters), got {0:?}")]
    MalformedHeader(String),

    /// A command payload is not hex encoded.
    #[error("command payload is not hex encoded")]
    InvalidPayload,

    /// There is nothing to send.
    #[error("command payload is empty")]
    EmptyPayload,

    /// A chunk does not contain a whole number of bytes.
    #[error("chunk {index} is not byte aligned")]
    InvalidChunk {
        /// Position of the offending chunk.
        index: usize,
    },

    /// The account index does not fit in 4 bytes.
    #[error("account index {0} does not fit in 4 bytes")]
    AccountIndexOverflow(u64),

    /// A response is shorter than the protocol requires.
    #[error("response too short: expected at least {expected} bytes, got {actual}")]
    ShortResponse {
        /// Minimum number of bytes.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// The device answered the final chunk with a bare success status word.
    #[error("device returned no signature after the final chunk")]
    MissingSignature,

    /// The DER signature response is truncated.
    #[error("malformed DER signature: {0}")]
    MalformedSignature(&'static str),

    /// A command was issued on a session that is not open.
    #[error("device session is not open")]
    SessionNotOpen,

    /// A session was opened twice.
    #[error("device session has already been used")]
    SessionReused,
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Error::HexDecodeFailed(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Error::JsonError(err.to_string())
    }
}

/// A specialized [`Result`] type for provider engine operations.
pub type Result<T> = CoreResult<T, Error>;
