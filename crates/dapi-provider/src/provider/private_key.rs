//! In-memory key signing provider.
//!
//! Signs with a P-256 key held by the application and submits transactions
//! through a [`ChainClient`]. Transaction encoding is delegated to a
//! [`TransactionBuilder`]: this provider only validates the request, signs
//! the builder's signing payload and checks what the chain answers.
//!
//! Every operation resolves the key through its [`KeySource`] first, so a
//! locked wallet fails with [`Error::NoAccount`] before any other check.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::network::ChainClient;
use super::{
    CapabilityTable, Component, Handler, Provider, SignatureData, handler, parse_args, to_value,
};
use crate::address::Address;
use crate::crypto::{
    compress_public_key, decode_message_hash, is_hex, parse_private_key, sign_message,
};
use crate::error::{Error, Result};
use crate::signature::Signature;

/// Default gas price.
pub const DEFAULT_GAS_PRICE: u64 = 500;

/// Default gas limit.
pub const DEFAULT_GAS_LIMIT: u64 = 20_000;

/// Supplies a hex encoded private key on demand.
#[async_trait]
pub trait KeyLoader: Send + Sync {
    /// Returns the key, or `None` when no account is available.
    ///
    /// # Errors
    ///
    /// Loader failures are passed to the caller unchanged.
    async fn load(&self) -> Result<Option<String>>;
}

/// Where the signing key comes from.
#[derive(Clone)]
pub enum KeySource {
    /// A key known up front.
    Fixed(SigningKey),
    /// A key fetched on every request, e.g. after unlocking a keystore.
    Deferred(Arc<dyn KeyLoader>),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(_) => f.write_str("KeySource::Fixed(..)"),
            Self::Deferred(_) => f.write_str("KeySource::Deferred(..)"),
        }
    }
}

impl KeySource {
    /// Parses a fixed hex encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAccount`] if `hex_str` is not a valid P-256 scalar.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        parse_private_key(hex_str)
            .map(Self::Fixed)
            .map_err(|_| Error::NoAccount)
    }

    /// Produces the signing key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAccount`] when the loader has no key or the key
    /// does not parse. Loader errors are propagated.
    pub async fn resolve(&self) -> Result<SigningKey> {
        match self {
            Self::Fixed(key) => Ok(key.clone()),
            Self::Deferred(loader) => match loader.load().await? {
                Some(hex_str) if !hex_str.is_empty() => {
                    parse_private_key(&hex_str).map_err(|_| Error::NoAccount)
                }
                _ => Err(Error::NoAccount),
            },
        }
    }
}

impl From<SigningKey> for KeySource {
    fn from(key: SigningKey) -> Self {
        Self::Fixed(key)
    }
}

/// Fee defaults of a [`PrivateKeyProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivateKeyConfig {
    /// Gas price used when a request does not set one.
    pub gas_price: u64,

    /// Gas limit used when a request does not set one.
    pub gas_limit: u64,
}

impl Default for PrivateKeyConfig {
    fn default() -> Self {
        Self {
            gas_price: DEFAULT_GAS_PRICE,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl PrivateKeyConfig {
    /// The fee for a request, falling back to the defaults for unset or
    /// zero values.
    #[must_use]
    pub fn fee(&self, gas_price: Option<u64>, gas_limit: Option<u64>) -> Fee {
        Fee {
            gas_price: gas_price.filter(|v| *v > 0).unwrap_or(self.gas_price),
            gas_limit: gas_limit.filter(|v| *v > 0).unwrap_or(self.gas_limit),
        }
    }
}

/// Gas settings of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fee {
    /// Gas price.
    pub gas_price: u64,
    /// Gas limit.
    pub gas_limit: u64,
}

/// The asset moved by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    /// The native ONT asset.
    Ont,
    /// The native ONG asset.
    Ong,
    /// A token contract, by its 20-byte script hash.
    Token([u8; 20]),
}

impl Asset {
    /// Parses `ONT`, `ONG` or a 40 hex digit token contract hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedAsset`] for anything else.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ONT" => Ok(Self::Ont),
            "ONG" => Ok(Self::Ong),
            _ => {
                let mut hash = [0u8; 20];
                hex::decode_to_slice(s, &mut hash)
                    .map_err(|_| Error::MalformedAsset(s.to_string()))?;
                Ok(Self::Token(hash))
            }
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ont => f.write_str("ONT"),
            Self::Ong => f.write_str("ONG"),
            Self::Token(hash) => f.write_str(&hex::encode(hash)),
        }
    }
}

/// A validated transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Sender, derived from the signing key.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Asset moved.
    pub asset: Asset,
    /// Amount, as a decimal string.
    pub amount: String,
}

/// A contract invocation request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Contract script hash, hex.
    pub script_hash: String,
    /// Contract function name.
    pub operation: String,
    /// Function parameters, passed to the builder as-is.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Per-call gas price.
    #[serde(default)]
    pub gas_price: Option<u64>,
    /// Per-call gas limit.
    #[serde(default)]
    pub gas_limit: Option<u64>,
    /// Whether the contract requires an identity signature.
    #[serde(default)]
    pub require_identity: bool,
}

/// A contract deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    /// Contract code, hex.
    pub code: String,
    /// Contract name.
    pub name: Option<String>,
    /// Contract version.
    pub version: Option<String>,
    /// Contract author.
    pub author: Option<String>,
    /// Author email.
    pub email: Option<String>,
    /// Contract description.
    pub description: Option<String>,
    /// Whether the contract uses storage.
    pub need_storage: bool,
    /// Per-call gas price.
    pub gas_price: Option<u64>,
    /// Per-call gas limit.
    pub gas_limit: Option<u64>,
}

/// A transaction produced by a [`TransactionBuilder`], not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    /// Bytes the payer signs.
    pub signing_payload: Vec<u8>,
    /// Builder-specific encoding of the transaction body.
    pub raw: Vec<u8>,
}

/// Encodes chain transactions.
pub trait TransactionBuilder: Send + Sync {
    /// Builds a transfer; token transfers are paid by the sender.
    ///
    /// # Errors
    ///
    /// Implementations reject requests they cannot encode.
    fn transfer(&self, transfer: &Transfer, fee: Fee) -> Result<UnsignedTransaction>;

    /// Builds a contract invocation. `payer` and `fee` are `None` for
    /// pre-executed reads.
    ///
    /// # Errors
    ///
    /// Implementations reject requests they cannot encode.
    fn invoke(
        &self,
        invocation: &Invocation,
        payer: Option<&Address>,
        fee: Option<Fee>,
    ) -> Result<UnsignedTransaction>;

    /// Builds a contract deployment.
    ///
    /// # Errors
    ///
    /// Implementations reject requests they cannot encode.
    fn deploy(
        &self,
        deployment: &Deployment,
        payer: &Address,
        fee: Fee,
    ) -> Result<UnsignedTransaction>;

    /// Attaches a signature and returns the serialized transaction, hex.
    ///
    /// # Errors
    ///
    /// Implementations may fail to encode the signature.
    fn seal(
        &self,
        tx: &UnsignedTransaction,
        public_key: &VerifyingKey,
        signature: &Signature,
    ) -> Result<String>;

    /// Serializes an unsigned transaction, hex.
    ///
    /// # Errors
    ///
    /// Implementations may fail to encode the transaction.
    fn serialize(&self, tx: &UnsignedTransaction) -> Result<String>;
}

/// Callbacks run before a result is returned or a transaction is
/// submitted. Returning an error aborts the call with that error.
#[async_trait]
pub trait SignerHooks: Send + Sync {
    /// Runs before `asset.getAccount` returns.
    async fn before_get_account(&self, _address: &Address) -> Result<()> {
        Ok(())
    }

    /// Runs before `asset.getPublicKey` returns.
    async fn before_get_public_key(&self, _public_key: &str) -> Result<()> {
        Ok(())
    }

    /// Runs before a signed transfer is submitted.
    async fn before_send(&self, _transfer: &Transfer) -> Result<()> {
        Ok(())
    }

    /// Runs before `message.signMessage` returns.
    async fn before_sign_message(&self, _signature: &SignatureData) -> Result<()> {
        Ok(())
    }

    /// Runs before `message.signMessageHash` returns.
    async fn before_sign_message_hash(&self, _signature: &SignatureData) -> Result<()> {
        Ok(())
    }

    /// Runs before a signed invocation is submitted.
    async fn before_invoke(&self, _tx_hex: &str) -> Result<()> {
        Ok(())
    }

    /// Runs before a read-only invocation is pre-executed.
    async fn before_invoke_read(&self, _tx_hex: &str) -> Result<()> {
        Ok(())
    }

    /// Runs before a signed deployment is submitted.
    async fn before_deploy(&self, _tx_hex: &str) -> Result<()> {
        Ok(())
    }
}

/// [`SignerHooks`] that never intervene.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

#[async_trait]
impl SignerHooks for NoHooks {}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Integer(u64),
    Text(String),
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        match amount {
            Amount::Integer(n) => n.to_string(),
            Amount::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendArgs {
    to: String,
    #[serde(default)]
    asset: Option<String>,
    amount: Amount,
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
    key: KeySource,
    client: Arc<dyn ChainClient>,
    builder: Arc<dyn TransactionBuilder>,
    config: PrivateKeyConfig,
    hooks: Arc<dyn SignerHooks>,
}

impl Inner {
    async fn get_account(&self) -> Result<Value> {
        let key = self.key.resolve().await?;
        let address = Address::from_public_key(key.verifying_key());
        self.hooks.before_get_account(&address).await?;
        Ok(Value::String(address.to_base58()))
    }

    async fn get_public_key(&self) -> Result<Value> {
        let key = self.key.resolve().await?;
        let public_key = compress_public_key(key.verifying_key());
        self.hooks.before_get_public_key(&public_key).await?;
        Ok(Value::String(public_key))
    }

    #[instrument(skip_all)]
    async fn send(&self, args: SendArgs) -> Result<Value> {
        let key = self.key.resolve().await?;
        let from = Address::from_public_key(key.verifying_key());
        let to = Address::from_base58(&args.to)?;
        let asset = match args.asset.as_deref() {
            Some(asset) if !asset.is_empty() => Asset::parse(asset)?,
            _ => return Err(Error::MalformedAsset(String::new())),
        };

        let transfer = Transfer {
            from,
            to,
            asset,
            amount: args.amount.into(),
        };
        let tx = self
            .builder
            .transfer(&transfer, self.config.fee(None, None))?;
        let tx_hex = self.sign(&key, &tx)?;

        self.hooks.before_send(&transfer).await?;
        debug!(to = %transfer.to, asset = %transfer.asset, amount = %transfer.amount, "submitting transfer");
        self.client.send_raw_transaction(&tx_hex, false).await
    }

    async fn sign_message(&self, message: &[u8]) -> Result<SignatureData> {
        let key = self.key.resolve().await?;
        let signature = sign_message(&key, message);
        Ok(SignatureData {
            public_key: compress_public_key(key.verifying_key()),
            data: signature.to_hex(),
        })
    }

    #[instrument(skip_all, fields(script_hash = %invocation.script_hash, operation = %invocation.operation))]
    async fn invoke(&self, invocation: Invocation) -> Result<Value> {
        let key = self.key.resolve().await?;
        let payer = Address::from_public_key(key.verifying_key());
        let fee = self.config.fee(invocation.gas_price, invocation.gas_limit);

        let tx = self.builder.invoke(&invocation, Some(&payer), Some(fee))?;
        let tx_hex = self.sign(&key, &tx)?;

        self.hooks.before_invoke(&tx_hex).await?;
        let response = self.client.send_raw_transaction(&tx_hex, false).await?;
        transaction_hash(&response)
    }

    #[instrument(skip_all, fields(script_hash = %invocation.script_hash, operation = %invocation.operation))]
    async fn invoke_read(&self, invocation: Invocation) -> Result<Value> {
        let tx = self.builder.invoke(&invocation, None, None)?;
        let tx_hex = self.builder.serialize(&tx)?;

        self.hooks.before_invoke_read(&tx_hex).await?;
        let response = self.client.send_raw_transaction(&tx_hex, true).await?;
        Ok(response
            .get("result")
            .and_then(|result| result.get("Result"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    #[instrument(skip_all)]
    async fn deploy(&self, deployment: Deployment) -> Result<Value> {
        let key = self.key.resolve().await?;
        let payer = Address::from_public_key(key.verifying_key());
        let fee = self.config.fee(deployment.gas_price, deployment.gas_limit);

        let tx = self.builder.deploy(&deployment, &payer, fee)?;
        let tx_hex = self.sign(&key, &tx)?;

        self.hooks.before_deploy(&tx_hex).await?;
        let response = self.client.send_raw_transaction(&tx_hex, false).await?;
        transaction_hash(&response)
    }

    fn sign(&self, key: &SigningKey, tx: &UnsignedTransaction) -> Result<String> {
        let signature = sign_message(key, &tx.signing_payload);
        self.builder.seal(tx, key.verifying_key(), &signature)
    }
}

/// Extracts the transaction hash from a submission response.
fn transaction_hash(response: &Value) -> Result<Value> {
    match response.get("result") {
        Some(Value::String(hash)) if hash.len() == 64 && is_hex(hash) => {
            Ok(Value::String(hash.clone()))
        }
        Some(Value::String(reason)) => Err(Error::TransactionRejected(reason.clone())),
        Some(other) => Err(Error::TransactionRejected(other.to_string())),
        None => Err(Error::TransactionRejected(response.to_string())),
    }
}

/// A provider signing with an in-memory key.
#[derive(Debug, Clone)]
pub struct PrivateKeyProvider {
    table: CapabilityTable,
}

impl PrivateKeyProvider {
    /// Creates the provider with default fees and no hooks.
    #[must_use]
    pub fn new(
        key: KeySource,
        client: Arc<dyn ChainClient>,
        builder: Arc<dyn TransactionBuilder>,
    ) -> Self {
        Self::with_options(
            key,
            client,
            builder,
            PrivateKeyConfig::default(),
            Arc::new(NoHooks),
        )
    }

    /// Creates the provider.
    ///
    /// # Arguments
    ///
    /// * `key` - Signing key source
    /// * `client` - Node used for submission and pre-execution
    /// * `builder` - Transaction encoder
    /// * `config` - Fee defaults
    /// * `hooks` - Pre-return and pre-submit callbacks
    #[must_use]
    pub fn with_options(
        key: KeySource,
        client: Arc<dyn ChainClient>,
        builder: Arc<dyn TransactionBuilder>,
        config: PrivateKeyConfig,
        hooks: Arc<dyn SignerHooks>,
    ) -> Self {
        let inner = Arc::new(Inner {
            key,
            client,
            builder,
            config,
            hooks,
        });
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
            Component::Asset,
            "send",
            handler(move |args| {
                let i = Arc::clone(&i);
                async move { i.send(parse_args(args)?).await }
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
                    let data = i.sign_message(args.message.as_bytes()).await?;
                    i.hooks.before_sign_message(&data).await?;
                    to_value(&data)
                }
            }),
        );

        let i = Arc::clone(&inner);
        table.insert(
            Component::Message,
            "signMessageHash",
            handler(move |args| {
                let i = Arc::clone(&i);
                async move {
                    let args: SignMessageHashArgs = parse_args(args)?;
                    let hash = decode_message_hash(&args.message_hash)?;
                    let data = i.sign_message(&hash).await?;
                    i.hooks.before_sign_message_hash(&data).await?;
                    to_value(&data)
                }
            }),
        );

        let i = Arc::clone(&inner);
        table.insert(
            Component::SmartContract,
            "invoke",
            handler(move |args| {
                let i = Arc::clone(&i);
                async move { i.invoke(parse_args(args)?).await }
            }),
        );

        let i = Arc::clone(&inner);
        table.insert(
            Component::SmartContract,
            "invokeRead",
            handler(move |args| {
                let i = Arc::clone(&i);
                async move { i.invoke_read(parse_args(args)?).await }
            }),
        );

        let i = inner;
        table.insert(
            Component::SmartContract,
            "deploy",
            handler(move |args| {
                let i = Arc::clone(&i);
                async move { i.deploy(parse_args(args)?).await }
            }),
        );

        Self { table }
    }

    /// Adds or replaces a single handler.
    #[must_use]
    pub fn with_handler(mut self, component: Component, method: &str, h: Handler) -> Self {
        self.table.insert(component, method, h);
        self
    }
}

impl Provider for PrivateKeyProvider {
    fn name(&self) -> &str {
        "private-key"
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.table
    }
}
