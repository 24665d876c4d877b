//! Providers and their capability tables.
//!
//! A provider is a named, sparse table of handlers keyed by
//! `component → method`. The [`ProviderEngine`](crate::engine::ProviderEngine)
//! walks its providers in order and hands each request to the first one
//! whose table contains the requested method.
//!
//! # Provider Variants
//!
//! - [`wallet`]: callbacks supplied by the embedding application
//! - [`ledger`]: signing on the hardware device
//! - [`private_key`]: signing with an in-memory key, transaction submission
//! - [`network`]: read-only chain queries
//! - [`verifier`]: signature verification
//!
//! # Example
//!
//! ```
//! use dapi_provider::provider::{CapabilityTable, Component, handler};
//! use serde_json::json;
//!
//! let mut table = CapabilityTable::new();
//! table.insert(
//!     Component::Asset,
//!     "getAccount",
//!     handler(|_| async { Ok(json!("AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF")) }),
//! );
//!
//! assert!(table.contains(Component::Asset, "getAccount"));
//! assert!(!table.contains(Component::Asset, "getPublicKey"));
//! ```

pub mod ledger;
pub mod network;
pub mod private_key;
pub mod verifier;
pub mod wallet;

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::str::FromStr;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub use ledger::{LedgerProvider, PathSelector};
pub use network::{
    ChainClient, ChainQuery, ClientFlavor, HeightOrHash, NetworkConfig, NetworkProvider,
    NetworkType,
};
pub use private_key::{
    Asset, Deployment, Fee, Invocation, KeyLoader, KeySource, NoHooks, PrivateKeyConfig,
    PrivateKeyProvider, SignerHooks, TransactionBuilder, Transfer, UnsignedTransaction,
};
pub use verifier::VerifierProvider;
pub use wallet::{WalletHooks, WalletProvider};

/// The future returned by a [`Handler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// An async capability taking the request arguments.
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Wraps an async closure into a [`Handler`].
///
/// # Example
///
/// ```
/// use dapi_provider::provider::handler;
/// use serde_json::{Value, json};
///
/// let h = handler(|args: Value| async move { Ok(json!({ "echo": args })) });
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Deserializes handler arguments into their typed form.
///
/// A missing argument object (`null`) is treated as `{}` so methods whose
/// fields are all optional can be called without arguments.
///
/// # Errors
///
/// Returns [`Error::InvalidArguments`] if `args` does not have the expected
/// shape.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| Error::InvalidArguments(e.to_string()))
}

/// The dApi component namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Component {
    /// Accounts and transfers.
    Asset,
    /// Identities.
    Identity,
    /// Message signing and verification.
    Message,
    /// Chain queries.
    Network,
    /// Provider metadata.
    Provider,
    /// Contract invocation and deployment.
    SmartContract,
}

impl Component {
    /// Every component, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Asset,
        Self::Identity,
        Self::Message,
        Self::Network,
        Self::Provider,
        Self::SmartContract,
    ];

    /// Returns the wire name of the component.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Identity => "identity",
            Self::Message => "message",
            Self::Network => "network",
            Self::Provider => "provider",
            Self::SmartContract => "smartContract",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnsupportedMethod(s.to_string()))
    }
}

/// A sparse `component → method → handler` table.
///
/// Absence of an entry means the provider does not handle that method.
#[derive(Clone, Default)]
pub struct CapabilityTable {
    entries: BTreeMap<Component, BTreeMap<String, Handler>>,
}

impl fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.methods().map(|(c, m)| format!("{c}.{m}")))
            .finish()
    }
}

impl CapabilityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a handler, returning the one it replaced.
    pub fn insert(
        &mut self,
        component: Component,
        method: impl Into<String>,
        handler: Handler,
    ) -> Option<Handler> {
        self.entries
            .entry(component)
            .or_default()
            .insert(method.into(), handler)
    }

    /// Removes a handler, returning it.
    pub fn remove(&mut self, component: Component, method: &str) -> Option<Handler> {
        self.entries.get_mut(&component)?.remove(method)
    }

    /// Looks up a handler.
    #[must_use]
    pub fn get(&self, component: Component, method: &str) -> Option<&Handler> {
        self.entries.get(&component)?.get(method)
    }

    /// Whether the table handles `component.method`.
    #[must_use]
    pub fn contains(&self, component: Component, method: &str) -> bool {
        self.get(component, method).is_some()
    }

    /// Iterates over all handled `(component, method)` pairs.
    pub fn methods(&self) -> impl Iterator<Item = (Component, &str)> {
        self.entries
            .iter()
            .flat_map(|(c, methods)| methods.keys().map(move |m| (*c, m.as_str())))
    }

    /// Number of handled methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether no method is handled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A capability holder in the engine's chain.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A short name used in logs.
    fn name(&self) -> &str;

    /// The handlers this provider offers.
    fn capabilities(&self) -> &CapabilityTable;

    /// Post-processes a successful handler result before it reaches the
    /// caller.
    ///
    /// # Errors
    ///
    /// Implementations may reject the result.
    async fn after_call(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// A signature together with the public key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureData {
    /// Compressed public key, hex.
    pub public_key: String,

    /// Signature `r || s`, hex.
    pub data: String,
}

/// Serializes a handler result.
pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn component_names() {
        for component in Component::ALL {
            assert_eq!(component.as_str().parse::<Component>().unwrap(), component);
            assert_eq!(
                serde_json::to_value(component).unwrap(),
                json!(component.as_str())
            );
        }
        assert!("wallet".parse::<Component>().is_err());
        assert!("Asset".parse::<Component>().is_err());
    }

    #[tokio::test]
    async fn table_insert_get_remove() {
        let mut table = CapabilityTable::new();
        assert!(table.is_empty());

        let previous = table.insert(Component::Asset, "getAccount", handler(|_| async { Ok(json!(1)) }));
        assert!(previous.is_none());
        let previous = table.insert(Component::Asset, "getAccount", handler(|_| async { Ok(json!(2)) }));
        assert!(previous.is_some());

        let h = table.get(Component::Asset, "getAccount").unwrap();
        assert_eq!(h(Value::Null).await.unwrap(), json!(2));
        assert!(table.get(Component::Message, "getAccount").is_none());
        assert_eq!(table.len(), 1);

        assert!(table.remove(Component::Asset, "getAccount").is_some());
        assert!(!table.contains(Component::Asset, "getAccount"));
    }

    #[test]
    fn table_debug_lists_methods() {
        let mut table = CapabilityTable::new();
        table.insert(Component::Message, "signMessage", handler(|_| async { Ok(Value::Null) }));
        table.insert(Component::Asset, "getAccount", handler(|_| async { Ok(Value::Null) }));

        assert_eq!(
            format!("{table:?}"),
            r#"["asset.getAccount", "message.signMessage"]"#
        );
    }

    #[test]
    fn parse_args_typed() {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Args {
            message_hash: String,
        }

        let args: Args = parse_args(json!({ "messageHash": "abcd" })).unwrap();
        assert_eq!(args.message_hash, "abcd");

        let err = parse_args::<Args>(json!({ "message": "abcd" })).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));

        let err = parse_args::<Args>(Value::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn signature_data_camel_case() {
        let data = SignatureData {
            public_key: "02ab".to_string(),
            data: "cd".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({ "publicKey": "02ab", "data": "cd" })
        );
    }
}
