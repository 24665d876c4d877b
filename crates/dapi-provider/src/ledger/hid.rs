//! USB HID transport for native device communication.
//!
//! This module provides a [`DeviceEnumerator`] implementation on top of
//! `hidapi` and `ledger-transport-hid`, which works on macOS, Linux and
//! Windows.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use dapi_provider::ledger::{DerivationPath, HidEnumerator, LedgerLink};
//!
//! let link = LedgerLink::new(Arc::new(HidEnumerator::new()));
//! let address = link.get_address(DerivationPath::default()).await?;
//! ```

use core::fmt;

use async_trait::async_trait;
use hidapi::HidApi;
use ledger_apdu::APDUCommand;
use ledger_transport_hid::TransportNativeHID;

use super::apdu::{ApduAnswer, ApduCommand};
use super::session::{DeviceDescriptor, DeviceEnumerator, DeviceTransport};
use crate::error::{DeviceError, Result};

/// Enumerates devices attached over USB HID.
#[derive(Debug, Clone, Copy, Default)]
pub struct HidEnumerator;

impl HidEnumerator {
    /// Creates a new enumerator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn api() -> Result<HidApi> {
        HidApi::new().map_err(|_| DeviceError::Unsupported.into())
    }
}

#[async_trait]
impl DeviceEnumerator for HidEnumerator {
    async fn is_supported(&self) -> bool {
        Self::api().is_ok()
    }

    async fn list(&self) -> Result<Vec<DeviceDescriptor>> {
        let api = Self::api()?;

        Ok(TransportNativeHID::list_ledgers(&api)
            .map(|info| DeviceDescriptor {
                path: info.path().to_string_lossy().into_owned(),
            })
            .collect())
    }

    async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn DeviceTransport>> {
        let api = Self::api()?;

        // Re-enumerate so the handle is opened from a live `DeviceInfo`.
        let info = TransportNativeHID::list_ledgers(&api)
            .find(|info| info.path().to_string_lossy() == device.path)
            .ok_or(DeviceError::NotFound)?;

        let transport = TransportNativeHID::open_device(&api, info)
            .map_err(|e| DeviceError::OpenFailed(format!("{}: {e}", device.path)))?;

        Ok(Box::new(HidTransport(transport)))
    }
}

/// An open HID handle.
struct HidTransport(TransportNativeHID);

impl fmt::Debug for HidTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl DeviceTransport for HidTransport {
    async fn exchange(&mut self, command: &ApduCommand) -> Result<ApduAnswer> {
        let header = command.header();
        let answer = self
            .0
            .exchange(&APDUCommand {
                cla: header.cla,
                ins: header.ins,
                p1: header.p1,
                p2: header.p2,
                data: command.data(),
            })
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        Ok(ApduAnswer::new(answer.data().to_vec(), answer.retcode()))
    }
}
