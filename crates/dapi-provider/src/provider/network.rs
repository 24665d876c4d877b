//! Read-only chain query provider.
//!
//! Forwards `network.*` requests to a [`ChainClient`]. The set of methods
//! depends on the client flavor:
//!
//! | Flavor      | Extra methods                                      | Result post-processing     |
//! |-------------|----------------------------------------------------|----------------------------|
//! | `JsonRpc`   | none                                               | `result` field is unwrapped |
//! | `Rest`      | none                                               | none                       |
//! | `Websocket` | unbound/grant ONG, block hash, mempool, version... | none                       |
//!
//! `network.getNetwork` is only handled when a network type is configured,
//! and `network.isConnected` only when a connectivity probe is supplied.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{CapabilityTable, Component, Handler, Provider, handler, parse_args};
use crate::address::Address;
use crate::error::Result;

/// A block height or a hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeightOrHash {
    /// Block height.
    Height(u64),
    /// Block or transaction hash, hex.
    Hash(String),
}

/// A chain query understood by every [`ChainClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainQuery {
    /// Number of connected nodes.
    NodeCount,
    /// Current block height.
    BlockHeight,
    /// Merkle proof of a transaction.
    MerkleProof {
        /// Transaction hash.
        tx_hash: String,
    },
    /// Contract storage value.
    Storage {
        /// Contract hash.
        contract: String,
        /// Storage key, hex.
        key: String,
    },
    /// Token allowance between two accounts.
    Allowance {
        /// Asset name.
        asset: String,
        /// Owner.
        from: Address,
        /// Spender.
        to: Address,
    },
    /// A block by height or hash.
    Block(HeightOrHash),
    /// A transaction as JSON.
    Transaction {
        /// Transaction hash.
        tx_hash: String,
    },
    /// Native balances of an account.
    Balance {
        /// Account.
        address: Address,
    },
    /// A deployed contract as JSON.
    Contract {
        /// Contract hash.
        hash: String,
    },
    /// Smart contract events by block height or transaction hash.
    SmartCodeEvent(HeightOrHash),
    /// Height of the block containing a transaction.
    BlockHeightByTxHash {
        /// Transaction hash.
        hash: String,
    },
    /// Unbound ONG of an account.
    UnboundOng {
        /// Account.
        address: Address,
    },
    /// Hash of the block at a height.
    BlockHash {
        /// Block height.
        height: u64,
    },
    /// Transactions in the block at a height.
    BlockTxsByHeight {
        /// Block height.
        height: u64,
    },
    /// Current gas price.
    GasPrice,
    /// Grantable ONG of an account.
    GrantOng {
        /// Account.
        address: Address,
    },
    /// Number of transactions in the mempool.
    MempoolTxCount,
    /// Mempool state of a transaction.
    MempoolTxState {
        /// Transaction hash.
        hash: String,
    },
    /// Node version.
    Version,
}

/// A chain node client.
///
/// Implementations own the transport; this crate only routes requests to
/// them.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The node endpoint.
    fn url(&self) -> &str;

    /// Answers a query with the node's response.
    ///
    /// # Errors
    ///
    /// Implementations report transport or node failures, typically as
    /// [`Error::Client`](crate::Error::Client).
    async fn query(&self, query: ChainQuery) -> Result<Value>;

    /// Submits a serialized transaction.
    ///
    /// # Arguments
    ///
    /// * `tx_hex` - Serialized transaction, hex
    /// * `pre_exec` - Only simulate execution, without committing
    ///
    /// # Errors
    ///
    /// Implementations report transport or node failures.
    async fn send_raw_transaction(&self, tx_hex: &str, pre_exec: bool) -> Result<Value>;
}

/// The node API a [`ChainClient`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientFlavor {
    /// JSON-RPC; responses arrive in a `{ "result": ... }` envelope.
    #[default]
    JsonRpc,
    /// REST.
    Rest,
    /// Websocket, with the extended method set.
    Websocket,
}

/// The network a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    /// Main network.
    #[serde(rename = "MAIN")]
    MainNet,
    /// Test network.
    #[serde(rename = "TEST")]
    TestNet,
    /// Private network.
    #[serde(rename = "PRIVATE")]
    PrivateNet,
}

/// Configuration of a [`NetworkProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// Node API flavor.
    pub flavor: ClientFlavor,

    /// Network type reported by `network.getNetwork`.
    pub network: Option<NetworkType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxHashArgs {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct StorageArgs {
    contract: String,
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowanceArgs {
    asset: String,
    from_address: String,
    to_address: String,
}

#[derive(Debug, Deserialize)]
struct BlockArgs {
    block: HeightOrHash,
}

#[derive(Debug, Deserialize)]
struct AddressArgs {
    address: String,
}

#[derive(Debug, Deserialize)]
struct HashArgs {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct EventArgs {
    value: HeightOrHash,
}

#[derive(Debug, Deserialize)]
struct HeightArgs {
    height: u64,
}

/// A provider answering chain queries.
#[derive(Debug, Clone)]
pub struct NetworkProvider {
    flavor: ClientFlavor,
    table: CapabilityTable,
}

impl NetworkProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new(client: Arc<dyn ChainClient>, config: NetworkConfig) -> Self {
        let mut table = CapabilityTable::new();
        let mut add = |method: &str, h: Handler| {
            table.insert(Component::Network, method, h);
        };

        add("getNodeCount", route(&client, |_: Value| Ok(ChainQuery::NodeCount)));
        add("getBlockHeight", route(&client, |_: Value| Ok(ChainQuery::BlockHeight)));
        add(
            "getMerkleProof",
            route(&client, |a: TxHashArgs| {
                Ok(ChainQuery::MerkleProof { tx_hash: a.tx_hash })
            }),
        );
        add(
            "getStorage",
            route(&client, |a: StorageArgs| {
                Ok(ChainQuery::Storage {
                    contract: a.contract,
                    key: a.key,
                })
            }),
        );
        add(
            "getAllowance",
            route(&client, |a: AllowanceArgs| {
                Ok(ChainQuery::Allowance {
                    asset: a.asset,
                    from: Address::from_base58(&a.from_address)?,
                    to: Address::from_base58(&a.to_address)?,
                })
            }),
        );
        add("getBlock", route(&client, |a: BlockArgs| Ok(ChainQuery::Block(a.block))));
        add(
            "getTransaction",
            route(&client, |a: TxHashArgs| {
                Ok(ChainQuery::Transaction { tx_hash: a.tx_hash })
            }),
        );
        add(
            "getBalance",
            route(&client, |a: AddressArgs| {
                Ok(ChainQuery::Balance {
                    address: Address::from_base58(&a.address)?,
                })
            }),
        );
        add(
            "getContract",
            route(&client, |a: HashArgs| Ok(ChainQuery::Contract { hash: a.hash })),
        );
        add(
            "getSmartCodeEvent",
            route(&client, |a: EventArgs| Ok(ChainQuery::SmartCodeEvent(a.value))),
        );
        add(
            "getBlockHeightByTxHash",
            route(&client, |a: HashArgs| {
                Ok(ChainQuery::BlockHeightByTxHash { hash: a.hash })
            }),
        );

        if let Some(network) = config.network {
            let address = client.url().to_string();
            add(
                "getNetwork",
                enveloped(
                    config.flavor,
                    handler(move |_| {
                        let info = json!({ "type": network, "address": address });
                        async move { Ok(info) }
                    }),
                ),
            );
        }

        if config.flavor == ClientFlavor::Websocket {
            add(
                "getUnboundOng",
                route(&client, |a: AddressArgs| {
                    Ok(ChainQuery::UnboundOng {
                        address: Address::from_base58(&a.address)?,
                    })
                }),
            );
            add(
                "getBlockHash",
                route(&client, |a: HeightArgs| {
                    Ok(ChainQuery::BlockHash { height: a.height })
                }),
            );
            add(
                "getBlockTxsByHeight",
                route(&client, |a: HeightArgs| {
                    Ok(ChainQuery::BlockTxsByHeight { height: a.height })
                }),
            );
            add("getGasPrice", route(&client, |_: Value| Ok(ChainQuery::GasPrice)));
            add(
                "getGrantOng",
                route(&client, |a: AddressArgs| {
                    Ok(ChainQuery::GrantOng {
                        address: Address::from_base58(&a.address)?,
                    })
                }),
            );
            add(
                "getMempoolTxCount",
                route(&client, |_: Value| Ok(ChainQuery::MempoolTxCount)),
            );
            add(
                "getMempoolTxState",
                route(&client, |a: HashArgs| {
                    Ok(ChainQuery::MempoolTxState { hash: a.hash })
                }),
            );
            add("getVersion", route(&client, |_: Value| Ok(ChainQuery::Version)));
        }

        Self {
            flavor: config.flavor,
            table,
        }
    }

    /// Handles `network.isConnected` with `probe`.
    #[must_use]
    pub fn with_connectivity_probe(self, probe: Handler) -> Self {
        self.with_handler(Component::Network, "isConnected", probe)
    }

    /// Adds or replaces a single handler.
    ///
    /// `h` answers with a plain value; under the JSON-RPC flavor it is
    /// wrapped so that [`Provider::after_call`] hands it back unchanged.
    #[must_use]
    pub fn with_handler(mut self, component: Component, method: &str, h: Handler) -> Self {
        self.table.insert(component, method, enveloped(self.flavor, h));
        self
    }
}

#[async_trait]
impl Provider for NetworkProvider {
    fn name(&self) -> &str {
        match self.flavor {
            ClientFlavor::JsonRpc => "rpc",
            ClientFlavor::Rest => "rest",
            ClientFlavor::Websocket => "websocket",
        }
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.table
    }

    async fn after_call(&self, value: Value) -> Result<Value> {
        match self.flavor {
            ClientFlavor::JsonRpc => Ok(match value {
                Value::Object(mut envelope) => envelope.remove("result").unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            ClientFlavor::Rest | ClientFlavor::Websocket => Ok(value),
        }
    }
}

/// Puts a locally computed answer into a `{ "result": .. }` envelope, the
/// shape every JSON-RPC client response has.
fn enveloped(flavor: ClientFlavor, h: Handler) -> Handler {
    if flavor != ClientFlavor::JsonRpc {
        return h;
    }
    handler(move |args| {
        let answer = h(args);
        async move { Ok(json!({ "result": answer.await? })) }
    })
}

/// Builds a handler that parses `A` from the arguments, turns it into a
/// query and forwards it to `client`.
fn route<A, F>(client: &Arc<dyn ChainClient>, build: F) -> Handler
where
    A: DeserializeOwned,
    F: Fn(A) -> Result<ChainQuery> + Send + Sync + 'static,
{
    let client = Arc::clone(client);
    handler(move |args| {
        let client = Arc::clone(&client);
        let query = parse_args::<A>(args).and_then(&build);
        async move { client.query(query?).await }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;

    const ADDRESS: &str = "AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF";

    #[derive(Default)]
    struct RecordingClient {
        queries: Mutex<Vec<ChainQuery>>,
    }

    #[async_trait]
    impl ChainClient for RecordingClient {
        fn url(&self) -> &str {
            "http://127.0.0.1:20336"
        }

        async fn query(&self, query: ChainQuery) -> Result<Value> {
            self.queries.lock().unwrap().push(query);
            Ok(json!({ "desc": "SUCCESS", "result": 42 }))
        }

        async fn send_raw_transaction(&self, _tx_hex: &str, _pre_exec: bool) -> Result<Value> {
            Err(Error::Client("read-only".to_string()))
        }
    }

    fn provider(config: NetworkConfig) -> (Arc<RecordingClient>, NetworkProvider) {
        let client = Arc::new(RecordingClient::default());
        let provider = NetworkProvider::new(client.clone(), config);
        (client, provider)
    }

    async fn call(provider: &NetworkProvider, method: &str, args: Value) -> Result<Value> {
        let h = provider.capabilities().get(Component::Network, method).unwrap();
        provider.after_call(h(args).await?).await
    }

    #[tokio::test]
    async fn routes_queries() {
        let (client, provider) = provider(NetworkConfig::default());

        call(&provider, "getBlockHeight", Value::Null).await.unwrap();
        call(&provider, "getBlock", json!({ "block": 12 })).await.unwrap();
        call(&provider, "getSmartCodeEvent", json!({ "value": "ab12" }))
            .await
            .unwrap();
        call(&provider, "getBalance", json!({ "address": ADDRESS }))
            .await
            .unwrap();

        let queries = client.queries.lock().unwrap().clone();
        assert_eq!(
            queries,
            vec![
                ChainQuery::BlockHeight,
                ChainQuery::Block(HeightOrHash::Height(12)),
                ChainQuery::SmartCodeEvent(HeightOrHash::Hash("ab12".to_string())),
                ChainQuery::Balance {
                    address: ADDRESS.parse().unwrap()
                },
            ]
        );
    }

    #[tokio::test]
    async fn malformed_address_argument() {
        let (client, provider) = provider(NetworkConfig::default());

        let err = call(
            &provider,
            "getAllowance",
            json!({ "asset": "ong", "fromAddress": ADDRESS, "toAddress": "nope" }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::MalformedAccount(_)));
        assert!(client.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_arguments() {
        let (_, provider) = provider(NetworkConfig::default());

        let err = call(&provider, "getMerkleProof", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn get_network_only_when_configured() {
        let (_, provider) = provider(NetworkConfig::default());
        assert!(!provider.capabilities().contains(Component::Network, "getNetwork"));

        let (_, provider) = provider_with_network();
        let value = call(&provider, "getNetwork", Value::Null).await.unwrap();
        assert_eq!(
            value,
            json!({ "type": "TEST", "address": "http://127.0.0.1:20336" })
        );
    }

    fn provider_with_network() -> (Arc<RecordingClient>, NetworkProvider) {
        provider(NetworkConfig {
            flavor: ClientFlavor::Rest,
            network: Some(NetworkType::TestNet),
        })
    }

    #[tokio::test]
    async fn get_network_survives_json_rpc_unwrapping() {
        let (_, provider) = provider(NetworkConfig {
            flavor: ClientFlavor::JsonRpc,
            network: Some(NetworkType::MainNet),
        });

        let value = call(&provider, "getNetwork", Value::Null).await.unwrap();
        assert_eq!(
            value,
            json!({ "type": "MAIN", "address": "http://127.0.0.1:20336" })
        );
        assert_eq!(call(&provider, "getBlockHeight", Value::Null).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn is_connected_only_with_probe() {
        for flavor in [ClientFlavor::JsonRpc, ClientFlavor::Rest, ClientFlavor::Websocket] {
            let (_, provider) = provider(NetworkConfig { flavor, network: None });
            assert!(!provider.capabilities().contains(Component::Network, "isConnected"));

            let provider =
                provider.with_connectivity_probe(handler(|_| async { Ok(json!(true)) }));
            assert_eq!(call(&provider, "isConnected", Value::Null).await.unwrap(), json!(true));
        }
    }

    #[test]
    fn websocket_extends_method_set() {
        let (_, rpc) = provider(NetworkConfig::default());
        let (_, ws) = provider(NetworkConfig {
            flavor: ClientFlavor::Websocket,
            network: None,
        });

        for method in [
            "getUnboundOng",
            "getBlockHash",
            "getBlockTxsByHeight",
            "getGasPrice",
            "getGrantOng",
            "getMempoolTxCount",
            "getMempoolTxState",
            "getVersion",
        ] {
            assert!(ws.capabilities().contains(Component::Network, method));
            assert!(!rpc.capabilities().contains(Component::Network, method));
        }
        assert_eq!(rpc.capabilities().len(), 11);
        assert_eq!(ws.capabilities().len(), 19);
    }

    #[tokio::test]
    async fn json_rpc_unwraps_result() {
        let (_, rpc) = provider(NetworkConfig::default());

        assert_eq!(
            rpc.after_call(json!({ "result": { "height": 7 } })).await.unwrap(),
            json!({ "height": 7 })
        );
        assert_eq!(rpc.after_call(json!({ "error": 1 })).await.unwrap(), Value::Null);
        assert_eq!(rpc.after_call(json!(5)).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn rest_result_is_untouched() {
        let (_, rest) = provider_with_network();
        let value = json!({ "result": 1 });
        assert_eq!(rest.after_call(value.clone()).await.unwrap(), value);
    }

    #[test]
    fn config_serde() {
        let config: NetworkConfig =
            serde_json::from_str(r#"{ "flavor": "websocket", "network": "MAIN" }"#).unwrap();
        assert_eq!(config.flavor, ClientFlavor::Websocket);
        assert_eq!(config.network, Some(NetworkType::MainNet));

        let config: NetworkConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, NetworkConfig::default());
    }
}
