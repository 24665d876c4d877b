//! Hardware signing end to end.
//!
//! An emulated device holds a P-256 key and speaks the signing protocol:
//! it answers `GET PUBLIC KEY` with the uncompressed point, buffers `SIGN`
//! chunks until `P1 = 0x80`, then signs the buffered data (minus the
//! trailing derivation path) and answers with the DER signature.

// Silence unused crate dependency warnings for test binary
use bs58 as _;
#[cfg(feature = "hid")]
use hidapi as _;
#[cfg(feature = "hid")]
use ledger_apdu as _;
#[cfg(feature = "hid")]
use ledger_transport_hid as _;
use proptest as _;
use ripemd as _;
use serde as _;
use sha2 as _;
use thiserror as _;
use tracing as _;
use tracing_subscriber as _;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dapi_provider::error::{DeviceError, ProtocolError};
use dapi_provider::ledger::apdu::status;
use dapi_provider::ledger::{
    ApduAnswer, ApduCommand, DerivationPath, DeviceDescriptor, DeviceEnumerator, DeviceTransport,
    LedgerConfig, LedgerLink,
};
use dapi_provider::provider::{LedgerProvider, VerifierProvider};
use dapi_provider::{Error, ProviderEngine, Result, SignatureData};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature as P256Signature, SigningKey};
use serde_json::{Value, json};

const ACCOUNT_42: &str = "AZSaTScAMMHqDSEFLSfVfPg8QajgBqVkPF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Sign,
    Deny,
    EmptyFinal,
    AppClosed,
}

#[derive(Debug, Default)]
struct Log {
    commands: Vec<ApduCommand>,
    open_handles: usize,
    max_open_handles: usize,
}

#[derive(Clone)]
struct EmulatedDevice {
    key: SigningKey,
    behavior: Behavior,
    log: Arc<Mutex<Log>>,
}

impl EmulatedDevice {
    fn new(behavior: Behavior) -> Self {
        Self {
            key: SigningKey::from_slice(&[0x42; 32]).unwrap(),
            behavior,
            log: Arc::new(Mutex::new(Log::default())),
        }
    }

    fn commands(&self) -> Vec<ApduCommand> {
        self.log.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl DeviceEnumerator for EmulatedDevice {
    async fn is_supported(&self) -> bool {
        true
    }

    async fn list(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(vec![DeviceDescriptor {
            path: "emulated-0".to_string(),
        }])
    }

    async fn open(&self, _device: &DeviceDescriptor) -> Result<Box<dyn DeviceTransport>> {
        let mut log = self.log.lock().unwrap();
        log.open_handles += 1;
        log.max_open_handles = log.max_open_handles.max(log.open_handles);
        Ok(Box::new(EmulatedHandle {
            device: self.clone(),
            buffer: Vec::new(),
        }))
    }
}

struct EmulatedHandle {
    device: EmulatedDevice,
    buffer: Vec<u8>,
}

impl Drop for EmulatedHandle {
    fn drop(&mut self) {
        self.device.log.lock().unwrap().open_handles -= 1;
    }
}

#[async_trait]
impl DeviceTransport for EmulatedHandle {
    async fn exchange(&mut self, command: &ApduCommand) -> Result<ApduAnswer> {
        self.device
            .log
            .lock()
            .unwrap()
            .commands
            .push(command.clone());

        if self.device.behavior == Behavior::AppClosed {
            return Ok(ApduAnswer::new(vec![], status::APP_CLOSED));
        }

        let header = command.header();
        match (header.ins, header.p1) {
            (0x04, _) => {
                let point = self.device.key.verifying_key().to_encoded_point(false);
                Ok(ApduAnswer::new(point.as_bytes().to_vec(), status::OK))
            }
            (0x02, 0x00) => {
                self.buffer.extend_from_slice(command.data());
                Ok(ApduAnswer::new(vec![], status::OK))
            }
            (0x02, 0x80) => {
                self.buffer.extend_from_slice(command.data());
                match self.device.behavior {
                    Behavior::Deny => Ok(ApduAnswer::new(vec![], status::TX_DENIED)),
                    Behavior::EmptyFinal => Ok(ApduAnswer::new(vec![], status::OK)),
                    _ => {
                        let message = &self.buffer[..self.buffer.len() - DerivationPath::BYTE_LEN];
                        let signature: P256Signature = self.device.key.sign(message);
                        Ok(ApduAnswer::new(signature.to_der().as_bytes().to_vec(), status::OK))
                    }
                }
            }
            _ => Ok(ApduAnswer::new(vec![], 0x6D00)),
        }
    }
}

fn engine(device: &EmulatedDevice) -> ProviderEngine {
    let link = LedgerLink::new(Arc::new(device.clone()));
    let ledger = LedgerProvider::from_config(link, LedgerConfig::default()).unwrap();

    let mut engine = ProviderEngine::new(None);
    engine.add_provider(Arc::new(ledger));
    engine.add_provider(Arc::new(VerifierProvider::new()));
    engine.start();
    engine
}

#[tokio::test]
async fn account_from_device() {
    let device = EmulatedDevice::new(Behavior::Sign);
    let engine = engine(&device);

    let account = engine.send_async("asset.getAccount", Value::Null).await.unwrap();
    assert_eq!(account, json!(ACCOUNT_42));

    let commands = device.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(
        hex::encode_upper(commands[0].data()),
        "8000002C80000400800000000000000000000000"
    );
}

#[tokio::test]
async fn hardware_signature_verifies() {
    let device = EmulatedDevice::new(Behavior::Sign);
    let engine = engine(&device);

    let signature = engine
        .send_async("message.signMessage", json!({ "message": "pay 10 ONG to bob" }))
        .await
        .unwrap();
    let data: SignatureData = serde_json::from_value(signature.clone()).unwrap();
    assert_eq!(data.data.len(), 128);

    let verified = engine
        .send_async(
            "message.verifyMessage",
            json!({ "message": "pay 10 ONG to bob", "signature": signature }),
        )
        .await
        .unwrap();
    assert_eq!(verified, json!(true));

    let tampered = engine
        .send_async(
            "message.verifyMessage",
            json!({ "message": "pay 99 ONG to bob", "signature": signature }),
        )
        .await
        .unwrap();
    assert_eq!(tampered, json!(false));
}

#[tokio::test]
async fn long_message_is_chunked() {
    let device = EmulatedDevice::new(Behavior::Sign);
    let engine = engine(&device);
    // 600 message bytes + 20 path bytes = 1240 hex chars = 510 + 510 + 220
    let message = "m".repeat(600);

    let signature = engine
        .send_async("message.signMessage", json!({ "message": message }))
        .await
        .unwrap();

    let commands = device.commands();
    let sign: Vec<_> = commands.iter().filter(|c| c.header().ins == 0x02).collect();
    let lengths: Vec<_> = sign.iter().map(|c| c.data().len()).collect();
    let p1s: Vec<_> = sign.iter().map(|c| c.header().p1).collect();
    assert_eq!(lengths, vec![255, 255, 110]);
    assert_eq!(p1s, vec![0x00, 0x00, 0x80]);

    let verified = engine
        .send_async(
            "message.verifyMessage",
            json!({ "message": message, "signature": signature }),
        )
        .await
        .unwrap();
    assert_eq!(verified, json!(true));
}

#[tokio::test]
async fn message_hash_signature_verifies() {
    let device = EmulatedDevice::new(Behavior::Sign);
    let engine = engine(&device);
    let hash = "9F86D081884C7D659A2FEAA0C55AD015A3BF4F1B2B0B822CD15D6C15B0F00A08";

    let signature = engine
        .send_async("message.signMessageHash", json!({ "messageHash": hash }))
        .await
        .unwrap();
    let verified = engine
        .send_async(
            "message.verifyMessageHash",
            json!({ "messageHash": hash, "signature": signature }),
        )
        .await
        .unwrap();
    assert_eq!(verified, json!(true));
}

#[tokio::test]
async fn denial_on_device() {
    let device = EmulatedDevice::new(Behavior::Deny);
    let engine = engine(&device);

    let err = engine
        .send_async("message.signMessage", json!({ "message": "hello" }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Device(DeviceError::TransactionDenied)));
}

#[tokio::test]
async fn bare_success_instead_of_signature() {
    let device = EmulatedDevice::new(Behavior::EmptyFinal);
    let engine = engine(&device);

    let err = engine
        .send_async("message.signMessage", json!({ "message": "hello" }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::MissingSignature)
    ));
}

#[tokio::test]
async fn closed_application() {
    let device = EmulatedDevice::new(Behavior::AppClosed);
    let engine = engine(&device);

    let err = engine.send_async("asset.getPublicKey", Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::Device(DeviceError::ApplicationClosed)));
    assert_eq!(device.log.lock().unwrap().open_handles, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_serialized() {
    let device = EmulatedDevice::new(Behavior::Sign);
    let engine = Arc::new(engine(&device));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .send_async("message.signMessage", json!({ "message": format!("msg {i}") }))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let log = device.log.lock().unwrap();
    assert_eq!(log.max_open_handles, 1);
    assert_eq!(log.open_handles, 0);
}
