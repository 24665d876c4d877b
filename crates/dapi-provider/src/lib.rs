//! dApi Provider Engine
//!
//! This crate routes dApi requests (`asset.getAccount`,
//! `message.signMessage`, `network.getBlockHeight`, ...) through a chain of
//! providers, and implements the providers a wallet needs, including one
//! backed by a Ledger hardware signing device.
//!
//! # Overview
//!
//! A request names a component and a method. The [`ProviderEngine`] asks each
//! provider in turn whether it handles that method and commits to the first
//! one that does. Providers differ only in where their answers come from:
//!
//! - **Wallet**: callbacks supplied by the embedding application
//! - **Ledger**: keys held on a hardware device, reached over APDUs
//! - **Private key**: an in-memory P-256 key, with transaction submission
//! - **Network**: read-only chain queries through a node client
//! - **Verifier**: `SHA256withECDSA` signature checks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ProviderEngine                          │
//! │           component.method → first matching provider         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Wallet   │   Ledger    │ Private key │ Network  │ Verifier │
//! ├───────────┴─────────────┴─────────────┴──────────┴──────────┤
//! │                   Hardware device protocol                   │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────────────┐ │
//! │  │  Path   │  │  APDU   │  │ Session │  │    Transport    │ │
//! │  │ Encode  │  │ Chunks  │  │         │  │   Abstraction   │ │
//! │  └─────────┘  └─────────┘  └─────────┘  └─────────────────┘ │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Transport Layer (USB HID)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dapi_provider::provider::{VerifierProvider, WalletHooks, WalletProvider, handler};
//! use dapi_provider::{ProviderEngine, ProviderInfo};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let wallet = WalletProvider::new(WalletHooks {
//!     get_account: Some(handler(|_| async {
//!         Ok(json!("AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF"))
//!     })),
//!     ..WalletHooks::default()
//! });
//!
//! let mut engine = ProviderEngine::new(Some(ProviderInfo::new("example", "0.1.0")));
//! engine.add_provider(Arc::new(wallet));
//! engine.add_provider(Arc::new(VerifierProvider::new()));
//! engine.start();
//!
//! let account = engine.send_async("asset.getAccount", json!(null)).await.unwrap();
//! assert_eq!(account, "AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF");
//! # }
//! ```
//!
//! ## Address Derivation
//!
//! ```rust
//! use dapi_provider::Address;
//! use p256::ecdsa::SigningKey;
//!
//! let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
//! let address = Address::from_public_key(key.verifying_key());
//! assert_eq!(address.to_string(), "AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF");
//! ```
//!
//! # Hardware Device
//!
//! The device layer is transport-agnostic. Implement
//! [`ledger::DeviceEnumerator`] for your platform, or enable the `hid`
//! feature for [`ledger::HidEnumerator`] (desktop USB HID).
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use dapi_provider::ledger::{HidEnumerator, LedgerConfig, LedgerLink};
//! use dapi_provider::provider::LedgerProvider;
//!
//! let link = LedgerLink::new(Arc::new(HidEnumerator::new()));
//! let provider = LedgerProvider::from_config(link, LedgerConfig::default())?;
//! engine.add_provider(Arc::new(provider));
//! ```
//!
//! # Feature Flags
//!
//! - `hid`: USB HID device transport via `hidapi` and `ledger-transport-hid`
//!
//! # Security Considerations
//!
//! - Hardware keys never leave the device; every signature needs the
//!   device's confirmation
//! - Hardware sessions are serialized, one at a time per [`ledger::LedgerLink`]
//! - Private keys loaded through [`provider::KeySource`] are never logged

// Modules
pub mod address;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod provider;
pub mod signature;

// Re-exports for convenience
pub use address::Address;
pub use engine::{ProviderEngine, ProviderInfo};
pub use error::{Error, ErrorKind, Result};
pub use provider::{Component, Provider, SignatureData};
pub use signature::Signature;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use tracing_subscriber as _;
