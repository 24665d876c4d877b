//! Device sessions and the transport abstraction below them.
//!
//! A [`HardwareSession`] owns at most one open device handle for the
//! duration of one logical operation:
//!
//! ```text
//!   Idle ──open()──▶ Opened ──close()/drop──▶ Closed
//!     │                                          ▲
//!     └──────────── open() fails ────────────────┘
//! ```
//!
//! Sessions are never reused. Platform access goes through the
//! [`DeviceEnumerator`] and [`DeviceTransport`] traits so the same protocol
//! code runs against real hardware (see `HidEnumerator` behind the `hid`
//! feature) and against scripted devices in tests.

use core::fmt;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::apdu::{ApduAnswer, ApduCommand, ApduHeader};
use crate::error::{DeviceError, ProtocolError, Result};

/// An attached device as reported by a [`DeviceEnumerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Platform path used to open the device.
    pub path: String,
}

/// Discovers and opens devices.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    /// Whether this platform can reach devices at all.
    async fn is_supported(&self) -> bool;

    /// Lists the attached devices.
    ///
    /// # Errors
    ///
    /// Returns an error if enumeration itself fails.
    async fn list(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Opens an exclusive handle to `device`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::OpenFailed`] if the device cannot be opened.
    async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn DeviceTransport>>;
}

/// An open device handle exchanging APDUs.
#[async_trait]
pub trait DeviceTransport: Send {
    /// Sends one command and returns the raw answer, whatever its status word.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Transport`] if the exchange fails.
    async fn exchange(&mut self, command: &ApduCommand) -> Result<ApduAnswer>;
}

/// Lifecycle state of a [`HardwareSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet opened.
    Idle,
    /// Holds an open device handle.
    Opened,
    /// Finished; the handle has been released.
    Closed,
}

/// A single-use session with the hardware device.
pub struct HardwareSession {
    state: SessionState,
    transport: Option<Box<dyn DeviceTransport>>,
}

impl fmt::Debug for HardwareSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for HardwareSession {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareSession {
    /// Creates an idle session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
            transport: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Opens the first attached device.
    ///
    /// On any failure the session ends up [`SessionState::Closed`].
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::SessionReused`] if the session is not idle
    /// - [`DeviceError::Unsupported`] if the platform has no device transport
    /// - [`DeviceError::NotFound`] if no device is attached
    /// - whatever the enumerator reports when opening fails
    pub async fn open(&mut self, enumerator: &dyn DeviceEnumerator) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(ProtocolError::SessionReused.into());
        }

        match Self::acquire(enumerator).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = SessionState::Opened;
                debug!("device session opened");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                debug!(error = %e, "device session failed to open");
                Err(e)
            }
        }
    }

    async fn acquire(enumerator: &dyn DeviceEnumerator) -> Result<Box<dyn DeviceTransport>> {
        if !enumerator.is_supported().await {
            return Err(DeviceError::Unsupported.into());
        }

        let devices = enumerator.list().await?;
        let device = devices.first().ok_or(DeviceError::NotFound)?;
        trace!(path = %device.path, count = devices.len(), "opening first device");

        enumerator.open(device).await
    }

    /// Releases the device handle. Calling it again, or on an idle session,
    /// does nothing.
    pub fn close(&mut self) {
        if self.state == SessionState::Opened {
            self.transport = None;
            self.state = SessionState::Closed;
            debug!("device session closed");
        }
    }

    /// Sends a command and checks its status word against `accepted`.
    ///
    /// # Returns
    ///
    /// The response data, without the status word.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::SessionNotOpen`] if the session is not open
    /// - the [`DeviceError`] mapped from the status word if it is not accepted
    pub async fn send(&mut self, command: &ApduCommand, accepted: &[u16]) -> Result<Vec<u8>> {
        let transport = match (self.state, self.transport.as_mut()) {
            (SessionState::Opened, Some(transport)) => transport,
            _ => return Err(ProtocolError::SessionNotOpen.into()),
        };

        trace!(
            header = %command.header(),
            len = command.data().len(),
            "sending command"
        );
        let answer = transport.exchange(command).await?;

        if let Err(e) = answer.check(accepted) {
            warn!(
                header = %command.header(),
                status = format_args!("{:#06x}", answer.status_word()),
                "device rejected command"
            );
            return Err(e.into());
        }

        Ok(answer.into_data())
    }

    /// Sends a command given as a hex header and a hex payload.
    ///
    /// The header is validated before anything reaches the device.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::MalformedHeader`] if `header` is not 8 hex characters
    /// - [`ProtocolError::InvalidPayload`] if `payload_hex` is not hex
    /// - anything [`send`](Self::send) returns
    pub async fn send_hex(
        &mut self,
        header: &str,
        payload_hex: &str,
        accepted: &[u16],
    ) -> Result<Vec<u8>> {
        let header: ApduHeader = header.parse()?;
        let data = hex::decode(payload_hex).map_err(|_| ProtocolError::InvalidPayload)?;

        self.send(&ApduCommand::new(header, data), accepted).await
    }
}

impl Drop for HardwareSession {
    fn drop(&mut self) {
        self.close();
    }
}
