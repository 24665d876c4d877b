//! Signature verification provider.
//!
//! Checks [`SignatureData`] produced by any signing provider, the hardware
//! one included. Signatures are `SHA256withECDSA` over P-256.

use serde::Deserialize;
use serde_json::Value;

use super::{CapabilityTable, Component, Handler, Provider, SignatureData, handler, parse_args};
use crate::crypto::{decode_message_hash, parse_public_key, verify_message};
use crate::error::{Error, Result};
use crate::signature::Signature;

#[derive(Debug, Deserialize)]
struct VerifyMessageArgs {
    message: String,
    signature: SignatureData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyMessageHashArgs {
    message_hash: String,
    signature: SignatureData,
}

/// A provider answering `message.verifyMessage` and
/// `message.verifyMessageHash`.
#[derive(Debug, Clone)]
pub struct VerifierProvider {
    table: CapabilityTable,
}

impl Default for VerifierProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifierProvider {
    /// Creates the provider with the built-in P-256 verification.
    #[must_use]
    pub fn new() -> Self {
        let mut table = CapabilityTable::new();

        table.insert(
            Component::Message,
            "verifyMessage",
            handler(|args| async move {
                let args: VerifyMessageArgs = parse_args(args)?;
                verify(args.message.as_bytes(), &args.signature).map(Value::Bool)
            }),
        );

        table.insert(
            Component::Message,
            "verifyMessageHash",
            handler(|args| async move {
                let args: VerifyMessageHashArgs = parse_args(args)?;
                let hash = decode_message_hash(&args.message_hash)?;
                verify(&hash, &args.signature).map(Value::Bool)
            }),
        );

        Self { table }
    }

    /// Replaces the `message.verifyMessage` handler.
    #[must_use]
    pub fn with_verify_message(self, h: Handler) -> Self {
        self.with_handler(Component::Message, "verifyMessage", h)
    }

    /// Replaces the `message.verifyMessageHash` handler.
    #[must_use]
    pub fn with_verify_message_hash(self, h: Handler) -> Self {
        self.with_handler(Component::Message, "verifyMessageHash", h)
    }

    /// Adds or replaces a single handler.
    #[must_use]
    pub fn with_handler(mut self, component: Component, method: &str, h: Handler) -> Self {
        self.table.insert(component, method, h);
        self
    }
}

impl Provider for VerifierProvider {
    fn name(&self) -> &str {
        "verifier"
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.table
    }
}

fn verify(message: &[u8], data: &SignatureData) -> Result<bool> {
    let public_key = parse_public_key(&data.public_key)?;
    let signature = Signature::from_hex(&data.data).map_err(|e| match e {
        Error::HexDecodeFailed(reason) => Error::InvalidSignature(reason),
        other => other,
    })?;
    Ok(verify_message(&public_key, message, &signature))
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use serde_json::json;

    use super::*;
    use crate::crypto::{compress_public_key, sign_message};

    fn signed(message: &[u8]) -> SignatureData {
        let key = SigningKey::from_slice(&[0x01; 32]).unwrap();
        SignatureData {
            public_key: compress_public_key(key.verifying_key()),
            data: sign_message(&key, message).to_hex(),
        }
    }

    async fn call(method: &str, args: Value) -> Result<Value> {
        let provider = VerifierProvider::new();
        let h = provider.capabilities().get(Component::Message, method).unwrap();
        h(args).await
    }

    #[tokio::test]
    async fn verifies_message() {
        let signature = signed(b"hello");

        let ok = call("verifyMessage", json!({ "message": "hello", "signature": signature }))
            .await
            .unwrap();
        assert_eq!(ok, json!(true));

        let wrong = call("verifyMessage", json!({ "message": "hullo", "signature": signature }))
            .await
            .unwrap();
        assert_eq!(wrong, json!(false));
    }

    #[tokio::test]
    async fn verifies_message_hash() {
        let signature = signed(&[0xCA, 0xFE]);

        let ok = call(
            "verifyMessageHash",
            json!({ "messageHash": "CAFE", "signature": signature }),
        )
        .await
        .unwrap();
        assert_eq!(ok, json!(true));
    }

    #[tokio::test]
    async fn non_hex_hash_rejected_before_crypto() {
        // the key is garbage too, but the hash check comes first
        let signature = SignatureData {
            public_key: "zz".to_string(),
            data: "zz".to_string(),
        };

        for bad in ["", "0xCAFE", "hello", "abc"] {
            let err = call(
                "verifyMessageHash",
                json!({ "messageHash": bad, "signature": signature }),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, Error::MalformedMessage));
        }
    }

    #[tokio::test]
    async fn malformed_key_or_signature() {
        let good = signed(b"hello");

        let bad_key = SignatureData {
            public_key: "02ffff".to_string(),
            ..good.clone()
        };
        let err = call("verifyMessage", json!({ "message": "hello", "signature": bad_key }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPublicKey(_)));

        for data in ["not hex", "abcd"] {
            let bad_sig = SignatureData {
                data: data.to_string(),
                ..good.clone()
            };
            let err = call("verifyMessage", json!({ "message": "hello", "signature": bad_sig }))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidSignature(_)));
        }
    }

    #[tokio::test]
    async fn handlers_can_be_replaced() {
        let provider =
            VerifierProvider::new().with_verify_message(handler(|_| async { Ok(json!(false)) }));
        let h = provider
            .capabilities()
            .get(Component::Message, "verifyMessage")
            .unwrap();

        let result = h(json!({ "message": "hello", "signature": signed(b"hello") }))
            .await
            .unwrap();
        assert_eq!(result, json!(false));
        assert!(provider.capabilities().contains(Component::Message, "verifyMessageHash"));
    }
}
