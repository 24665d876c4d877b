//! Callback-driven wallet provider.
//!
//! The embedding application supplies the capabilities it has as
//! [`Handler`]s. Account lookups are always answered: when no callback is
//! configured, or the callback comes back empty (`null`, `false`, `""`),
//! the call fails with [`Error::NoAccount`]. Every other method is handled
//! only if a callback was given.

use serde_json::Value;

use super::{CapabilityTable, Component, Handler, Provider, handler};
use crate::error::{Error, Result};

/// Optional callbacks for a [`WalletProvider`].
#[derive(Clone, Default)]
pub struct WalletHooks {
    /// `asset.getAccount`
    pub get_account: Option<Handler>,
    /// `asset.getPublicKey`
    pub get_public_key: Option<Handler>,
    /// `asset.send`
    pub send: Option<Handler>,
    /// `message.signMessage`
    pub sign_message: Option<Handler>,
    /// `message.signMessageHash`
    pub sign_message_hash: Option<Handler>,
    /// `smartContract.invoke`
    pub invoke: Option<Handler>,
    /// `smartContract.invokeRead`
    pub invoke_read: Option<Handler>,
    /// `smartContract.deploy`
    pub deploy: Option<Handler>,
}

impl core::fmt::Debug for WalletHooks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WalletHooks")
            .field("get_account", &self.get_account.is_some())
            .field("get_public_key", &self.get_public_key.is_some())
            .field("send", &self.send.is_some())
            .field("sign_message", &self.sign_message.is_some())
            .field("sign_message_hash", &self.sign_message_hash.is_some())
            .field("invoke", &self.invoke.is_some())
            .field("invoke_read", &self.invoke_read.is_some())
            .field("deploy", &self.deploy.is_some())
            .finish()
    }
}

/// A provider whose capabilities are application callbacks.
#[derive(Debug, Clone)]
pub struct WalletProvider {
    name: String,
    table: CapabilityTable,
}

impl WalletProvider {
    /// Builds the provider from `hooks`.
    #[must_use]
    pub fn new(hooks: WalletHooks) -> Self {
        let mut table = CapabilityTable::new();

        table.insert(Component::Asset, "getAccount", account_lookup(hooks.get_account));
        table.insert(
            Component::Asset,
            "getPublicKey",
            account_lookup(hooks.get_public_key),
        );

        let optional = [
            (Component::Asset, "send", hooks.send),
            (Component::Message, "signMessage", hooks.sign_message),
            (Component::Message, "signMessageHash", hooks.sign_message_hash),
            (Component::SmartContract, "invoke", hooks.invoke),
            (Component::SmartContract, "invokeRead", hooks.invoke_read),
            (Component::SmartContract, "deploy", hooks.deploy),
        ];
        for (component, method, hook) in optional {
            if let Some(hook) = hook {
                table.insert(component, method, hook);
            }
        }

        Self {
            name: "wallet".to_string(),
            table,
        }
    }

    /// Renames the provider.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds or replaces a single handler.
    #[must_use]
    pub fn with_handler(mut self, component: Component, method: &str, h: Handler) -> Self {
        self.table.insert(component, method, h);
        self
    }
}

impl Provider for WalletProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.table
    }
}

/// Wraps an optional account callback so empty answers become
/// [`Error::NoAccount`].
fn account_lookup(hook: Option<Handler>) -> Handler {
    handler(move |args| {
        let hook = hook.clone();
        async move {
            let Some(hook) = hook else {
                return Err(Error::NoAccount);
            };
            let value = hook(args).await?;
            if is_falsy(&value) {
                Err(Error::NoAccount)
            } else {
                Ok(value)
            }
        }
    })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) | Value::Bool(true) => false,
    }
}
