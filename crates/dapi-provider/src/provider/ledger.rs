//! Hardware-backed signing provider.
//!
//! Answers account and message-signing requests with keys held on the
//! hardware device, reached through a [`LedgerLink`]. The derivation path is
//! resolved on every request by a [`PathSelector`], so applications can
//! switch accounts without rebuilding the provider.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use dapi_provider::ledger::{HidEnumerator, LedgerConfig, LedgerLink};
//! use dapi_provider::provider::LedgerProvider;
//!
//! let link = LedgerLink::new(Arc::new(HidEnumerator::new()));
//! let provider = LedgerProvider::from_config(link, LedgerConfig::default())?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{
    CapabilityTable, Component, Handler, Provider, SignatureData, handler, parse_args, to_value,
};
use crate::crypto::{compress_public_key, decode_message_hash};
use crate::error::Result;
use crate::ledger::{DerivationPath, LedgerConfig, LedgerLink};

/// Resolves the derivation path for a request.
#[async_trait]
pub trait PathSelector: Send + Sync {
    /// Returns the path to use.
    ///
    /// # Errors
    ///
    /// Implementations may fail, e.g. when the user cancels account
    /// selection.
    async fn select(&self) -> Result<DerivationPath>;
}

#[async_trait]
impl PathSelector for DerivationPath {
    async fn select(&self) -> Result<DerivationPath> {
        Ok(*self)
    }
}

#[derive(Debug, Deserialize)]
struct SignMessageArgs {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignMessageHashArgs {
    message_hash: String,
}

struct Inner {
    link: LedgerLink,
    selector: Arc<dyn PathSelector>,
}

impl Inner {
    async fn get_account(&self) -> Result<Value> {
        let path = self.selector.select().await?;
        let address = self.link.get_address(path).await?;
        debug!(%address, index = path.index(), "read hardware account");
        Ok(Value::String(address.to_base58()))
    }

    async fn get_public_key(&self) -> Result<Value> {
        let path = self.selector.select().await?;
        let public_key = self.link.get_public_key(path).await?;
        Ok(Value::String(compress_public_key(&public_key)))
    }

    async fn sign_hex(&self, data_hex: &str) -> Result<Value> {
        let path = self.selector.select().await?;
        let (public_key, signature) = self.link.sign_with_key(data_hex, path).await?;

        to_value(&SignatureData {
            public_key: compress_public_key(&public_key),
            data: signature.to_hex(),
        })
    }
}

/// A provider signing on the hardware device.
#[derive(Debug, Clone)]
pub struct LedgerProvider {
    table: CapabilityTable,
}

impl LedgerProvider {
    /// Creates the provider.
    ///
    /// # Arguments
    ///
    /// * `link` - Device access
    /// * `selector` - Derivation path source, e.g. a fixed [`DerivationPath`]
    #[must_use]
    pub fn new(link: LedgerLink, selector: Arc<dyn PathSelector>) -> Self {
        let inner = Arc::new(Inner { link, selector });
        let mut table = CapabilityTable::new();

        let i = Arc::clone(&inner);
        table.insert(
            Component::Asset,
            "getAccount",
            handler(move |_| {
                let i = Arc::clone(&i);
                async move { i.get_account().await }
            }),
        );

        let i = Arc::clone(&inner);
        table.insert(
            Component::Asset,
            "getPublicKey",
            handler(move |_| {
                let i = Arc::clone(&i);
                async move { i.get_public_key().await }
            }),
        );

        let i = Arc::clone(&inner);
        table.insert(
            Component::Message,
            "signMessage",
            handler(move |args| {
                let i = Arc::clone(&i);
                async move {
                    let args: SignMessageArgs = parse_args(args)?;
                    i.sign_hex(&hex::encode(args.message.as_bytes())).await
                }
            }),
        );

        let i = inner;
        table.insert(
            Component::Message,
            "signMessageHash",
            handler(move |args| {
                let i = Arc::clone(&i);
                async move {
                    let args: SignMessageHashArgs = parse_args(args)?;
                    // The device decodes the hex itself; only check it is whole bytes.
                    decode_message_hash(&args.message_hash)?;
                    i.sign_hex(&args.message_hash).await
                }
            }),
        );

        Self { table }
    }

    /// Creates the provider for a fixed account.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AccountIndexOverflow`](crate::error::ProtocolError::AccountIndexOverflow)
    /// if the configured index does not fit in 4 bytes.
    pub fn from_config(link: LedgerLink, config: LedgerConfig) -> Result<Self> {
        let path = DerivationPath::try_from(config)?;
        Ok(Self::new(link, Arc::new(path)))
    }

    /// Adds or replaces a single handler.
    #[must_use]
    pub fn with_handler(mut self, component: Component, method: &str, h: Handler) -> Self {
        self.table.insert(component, method, h);
        self
    }
}

impl Provider for LedgerProvider {
    fn name(&self) -> &str {
        "ledger"
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.table
    }
}
