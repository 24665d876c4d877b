//! The provider engine.
//!
//! Requests are identified as `component.method`. The engine walks its
//! providers in insertion order and commits to the first whose
//! [`CapabilityTable`](crate::provider::CapabilityTable) handles the method:
//! that provider's handler runs, its result goes through the provider's
//! [`after_call`](Provider::after_call), and the call resolves. Later
//! providers are never consulted, even when the handler fails.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use dapi_provider::engine::{ProviderEngine, ProviderInfo};
//! use dapi_provider::provider::{VerifierProvider, WalletHooks, WalletProvider};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut engine = ProviderEngine::new(Some(ProviderInfo::new("my-wallet", "1.0.0")));
//! engine.add_provider(Arc::new(WalletProvider::new(WalletHooks::default())));
//! engine.add_provider(Arc::new(VerifierProvider::new()));
//! engine.start();
//!
//! let info = engine.send_async("provider.getProvider", json!(null)).await.unwrap();
//! assert_eq!(info["name"], "my-wallet");
//! # }
//! ```

use core::fmt;
use core::str::FromStr;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::provider::{Component, Provider, to_value};

/// Metadata returned by `provider.getProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderInfo {
    /// Wallet name.
    pub name: String,

    /// Wallet version.
    pub version: String,

    /// Supported dApi protocol versions.
    pub compatibility: Vec<String>,
}

impl ProviderInfo {
    /// Creates metadata without compatibility entries.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            compatibility: Vec::new(),
        }
    }

    /// Adds a supported protocol version.
    #[must_use]
    pub fn with_compatibility(mut self, version: impl Into<String>) -> Self {
        self.compatibility.push(version.into());
        self
    }
}

/// A parsed `component.method` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Request<'a> {
    component: &'a str,
    method: &'a str,
}

impl<'a> Request<'a> {
    fn parse(identifier: &'a str) -> Result<Self> {
        let mut parts = identifier.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(component), Some(method), None)
                if !component.is_empty() && !method.is_empty() =>
            {
                Ok(Self { component, method })
            }
            _ => Err(Error::UnsupportedMethod(identifier.to_string())),
        }
    }
}

/// Dispatches requests through a chain of providers.
pub struct ProviderEngine {
    info: Option<ProviderInfo>,
    providers: Vec<Arc<dyn Provider>>,
    running: AtomicBool,
}

impl fmt::Debug for ProviderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEngine")
            .field("info", &self.info)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for ProviderEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProviderEngine {
    /// Creates a stopped engine with no providers.
    ///
    /// With `info` set, `provider.getProvider` is answered by the engine
    /// itself.
    #[must_use]
    pub fn new(info: Option<ProviderInfo>) -> Self {
        Self {
            info,
            providers: Vec::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Appends a provider to the end of the chain.
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) {
        debug!(
            provider = provider.name(),
            position = self.providers.len(),
            methods = provider.capabilities().len(),
            "provider added"
        );
        self.providers.push(provider);
    }

    /// The providers, in dispatch order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// The configured metadata.
    #[must_use]
    pub const fn info(&self) -> Option<&ProviderInfo> {
        self.info.as_ref()
    }

    /// Starts accepting requests.
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
        debug!(providers = self.providers.len(), "engine started");
    }

    /// Stops accepting requests. Calls already dispatched complete.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        debug!("engine stopped");
    }

    /// Whether the engine accepts requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Dispatches a request.
    ///
    /// # Arguments
    ///
    /// * `method` - Identifier of the form `component.method`
    /// * `args` - Handler arguments, `null` when the method takes none
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineNotRunning`] before [`start`](Self::start),
    /// [`Error::UnsupportedMethod`] for identifiers without exactly one `.`,
    /// [`Error::MethodNotHandled`] when no provider handles the method, and
    /// otherwise whatever the committed provider returned.
    pub async fn send_async(&self, method: &str, args: Value) -> Result<Value> {
        if !self.is_running() {
            return Err(Error::EngineNotRunning);
        }
        let request = Request::parse(method)?;

        if request.component == Component::Provider.as_str()
            && request.method == "getProvider"
            && let Some(info) = &self.info
        {
            debug!(method, "answered by engine");
            return to_value(info);
        }

        // unknown components are valid identifiers that no provider handles
        let Ok(component) = Component::from_str(request.component) else {
            debug!(method, "unknown component");
            return Err(Error::MethodNotHandled(method.to_string()));
        };

        for (position, provider) in self.providers.iter().enumerate() {
            let Some(handler) = provider.capabilities().get(component, request.method) else {
                trace!(method, provider = provider.name(), position, "skipped");
                continue;
            };

            debug!(method, provider = provider.name(), position, "dispatching");
            let value = handler(args).await?;
            return provider.after_call(value).await;
        }

        debug!(method, "not handled");
        Err(Error::MethodNotHandled(method.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::{CapabilityTable, handler};

    struct Fixed {
        name: &'static str,
        table: CapabilityTable,
        calls: Arc<AtomicUsize>,
        wrap: bool,
    }

    impl Fixed {
        fn new(name: &'static str, methods: &[(Component, &str)], result: Result<Value>) -> Self {
            let calls = Arc::new(AtomicUsize::new(0));
            let shared = Arc::new(result.map_err(|e| e.to_string()));
            let mut table = CapabilityTable::new();
            for (component, method) in methods {
                let calls = Arc::clone(&calls);
                let shared = Arc::clone(&shared);
                table.insert(
                    *component,
                    *method,
                    handler(move |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let result = (*shared).clone().map_err(Error::Rejected);
                        async move { result }
                    }),
                );
            }
            Self {
                name,
                table,
                calls,
                wrap: false,
            }
        }

        fn wrapping(mut self) -> Self {
            self.wrap = true;
            self
        }
    }

    #[async_trait]
    impl Provider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> &CapabilityTable {
            &self.table
        }

        async fn after_call(&self, value: Value) -> Result<Value> {
            if self.wrap {
                Ok(json!({ "wrapped": value }))
            } else {
                Ok(value)
            }
        }
    }

    fn started(providers: Vec<Arc<dyn Provider>>, info: Option<ProviderInfo>) -> ProviderEngine {
        let mut engine = ProviderEngine::new(info);
        for provider in providers {
            engine.add_provider(provider);
        }
        engine.start();
        engine
    }

    #[tokio::test]
    async fn requires_running_engine() {
        let engine = ProviderEngine::default();
        let err = engine.send_async("asset.getAccount", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::EngineNotRunning));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        engine.start();
        assert!(engine.is_running());
        engine.stop();
        let err = engine.send_async("asset.getAccount", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::EngineNotRunning));
    }

    #[test]
    fn request_identifiers() {
        assert_eq!(
            Request::parse("asset.getAccount").unwrap(),
            Request {
                component: "asset",
                method: "getAccount"
            }
        );
        for bad in ["asset", "asset.", ".getAccount", "a.b.c", "", "."] {
            assert!(matches!(
                Request::parse(bad),
                Err(Error::UnsupportedMethod(_))
            ));
        }
    }

    #[tokio::test]
    async fn first_match_wins() {
        let first = Arc::new(Fixed::new("first", &[(Component::Asset, "send")], Ok(json!(1))));
        let second = Arc::new(Fixed::new(
            "second",
            &[(Component::Asset, "getAccount"), (Component::Asset, "send")],
            Ok(json!(2)),
        ));
        let engine = started(vec![first.clone(), second.clone()], None);

        assert_eq!(engine.send_async("asset.send", Value::Null).await.unwrap(), json!(1));
        assert_eq!(
            engine.send_async("asset.getAccount", Value::Null).await.unwrap(),
            json!(2)
        );
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_handler_is_final() {
        let first = Arc::new(Fixed::new(
            "first",
            &[(Component::Asset, "getAccount")],
            Err(Error::NoAccount),
        ));
        let second = Arc::new(Fixed::new(
            "second",
            &[(Component::Asset, "getAccount")],
            Ok(json!("fallback")),
        ));
        let engine = started(vec![first, second.clone()], None);

        let err = engine.send_async("asset.getAccount", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn after_call_of_committed_provider() {
        let first = Arc::new(
            Fixed::new("first", &[(Component::Network, "getBlockHeight")], Ok(json!(7)))
                .wrapping(),
        );
        let engine = started(vec![first], None);

        assert_eq!(
            engine.send_async("network.getBlockHeight", Value::Null).await.unwrap(),
            json!({ "wrapped": 7 })
        );
    }

    #[tokio::test]
    async fn chain_exhausted() {
        let first = Arc::new(Fixed::new("first", &[(Component::Asset, "send")], Ok(json!(1))));
        let engine = started(vec![first], None);

        let err = engine.send_async("message.signMessage", Value::Null).await.unwrap_err();
        assert!(matches!(&err, Error::MethodNotHandled(m) if m == "message.signMessage"));
        assert_eq!(err.kind(), ErrorKind::NotHandled);

        let err = engine.send_async("wallet.getAccount", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::MethodNotHandled(_)));
    }

    #[tokio::test]
    async fn get_provider_metadata() {
        let info = ProviderInfo::new("wallet", "0.2.0").with_compatibility("OEP-6");
        let shadowed = Arc::new(Fixed::new(
            "shadowed",
            &[(Component::Provider, "getProvider")],
            Ok(json!("from provider")),
        ));
        let engine = started(vec![shadowed.clone()], Some(info));

        let value = engine.send_async("provider.getProvider", Value::Null).await.unwrap();
        assert_eq!(
            value,
            json!({ "name": "wallet", "version": "0.2.0", "compatibility": ["OEP-6"] })
        );
        assert_eq!(shadowed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_provider_without_metadata_goes_through_chain() {
        let engine = started(vec![], None);
        let err = engine.send_async("provider.getProvider", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::MethodNotHandled(_)));

        let answering = Arc::new(Fixed::new(
            "answering",
            &[(Component::Provider, "getProvider")],
            Ok(json!("from provider")),
        ));
        let engine = started(vec![answering], None);
        assert_eq!(
            engine.send_async("provider.getProvider", Value::Null).await.unwrap(),
            json!("from provider")
        );
    }
}
