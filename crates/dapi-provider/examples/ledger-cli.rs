//! Ledger dApi CLI Example
//!
//! This example drives a Ledger device through the provider engine, using
//! the native USB HID transport on macOS, Linux, and Windows.
//!
//! # Prerequisites
//!
//! - A Ledger device with the signing application installed and open
//! - On Linux, udev rules granting access to the device
//!
//! # Quick Start
//!
//! ```bash
//! cargo run --example ledger-cli -p dapi-provider --features hid -- list
//! cargo run --example ledger-cli -p dapi-provider --features hid -- address
//! cargo run --example ledger-cli -p dapi-provider --features hid -- sign "hello"
//! ```
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `list` | List attached devices |
//! | `address [index]` | Show the account address and public key |
//! | `sign <message> [index]` | Sign a UTF-8 message and verify it |
//! | `sign-hash <hex> [index]` | Sign hex encoded data and verify it |
//!
//! Set `LEDGER_COMPAT=1` to derive with the compatibility coin type.
//! Set `RUST_LOG=dapi_provider=trace` to see every APDU exchange.
//!
//! # Security Notes
//!
//! - Private keys never leave the device
//! - Every signature must be confirmed on the device

#![expect(unused_crate_dependencies, reason = "needed for CLI example")]

use std::env;
use std::sync::Arc;

use dapi_provider::ledger::{DeviceEnumerator, HidEnumerator, LedgerConfig, LedgerLink};
use dapi_provider::provider::{LedgerProvider, VerifierProvider};
use dapi_provider::error::DeviceError;
use dapi_provider::{Error, ProviderEngine, ProviderInfo};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return;
    }

    match args[1].as_str() {
        "list" => cmd_list().await,
        "address" => cmd_address(&args[2..]).await,
        "sign" => cmd_sign(&args[2..]).await,
        "sign-hash" => cmd_sign_hash(&args[2..]).await,
        "--help" | "-h" | "help" => print_help(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_help();
        }
    }
}

fn print_help() {
    println!(
        r#"Ledger dApi CLI

USAGE:
    ledger-cli <COMMAND>

COMMANDS:
    list                      List attached devices
    address [index]           Show the account address and public key
    sign <message> [index]    Sign a UTF-8 message (confirm on device)
    sign-hash <hex> [index]   Sign hex encoded data (confirm on device)
    help                      Show this help message

ENVIRONMENT:
    LEDGER_COMPAT=1           Use the compatibility coin type
    RUST_LOG=dapi_provider=trace
                              Log every APDU exchange

EXAMPLES:
    cargo run --example ledger-cli --features hid -- list
    cargo run --example ledger-cli --features hid -- address 1
    cargo run --example ledger-cli --features hid -- sign "hello world"
"#
    );
}

async fn cmd_list() {
    println!("Searching for devices...\n");

    let enumerator = HidEnumerator::new();
    if !enumerator.is_supported().await {
        eprintln!("USB HID is not available on this platform.");
        return;
    }

    match enumerator.list().await {
        Ok(devices) if devices.is_empty() => {
            println!("No devices found.");
            println!("\nMake sure:");
            println!("  - Your device is plugged in and unlocked");
            println!("  - The signing application is open");
            println!("  - (Linux) udev rules allow access to the device");
        }
        Ok(devices) => {
            println!("Found {} device(s):\n", devices.len());
            for (i, device) in devices.iter().enumerate() {
                println!("  [{}] {}", i + 1, device.path);
            }
        }
        Err(e) => eprintln!("Error listing devices: {e}"),
    }
}

async fn cmd_address(args: &[String]) {
    let Some(engine) = engine(args.first()) else {
        return;
    };

    println!("Reading account from the device...\n");

    let address = match engine.send_async("asset.getAccount", Value::Null).await {
        Ok(address) => address,
        Err(e) => {
            report(&e);
            return;
        }
    };
    let public_key = match engine.send_async("asset.getPublicKey", Value::Null).await {
        Ok(public_key) => public_key,
        Err(e) => {
            report(&e);
            return;
        }
    };

    println!("Public Key (compressed):");
    println!("  {}", public_key.as_str().unwrap_or_default());
    println!();
    println!("Address:");
    println!("  {}", address.as_str().unwrap_or_default());
}

async fn cmd_sign(args: &[String]) {
    let Some(message) = args.first() else {
        eprintln!("Usage: sign <message> [index]");
        return;
    };
    let Some(engine) = engine(args.get(1)) else {
        return;
    };

    println!("Signing {message:?} (confirm on the device)...\n");
    sign_and_verify(
        &engine,
        ("message.signMessage", json!({ "message": message })),
        ("message.verifyMessage", "message", json!(message)),
    )
    .await;
}

async fn cmd_sign_hash(args: &[String]) {
    let Some(hash) = args.first() else {
        eprintln!("Usage: sign-hash <hex> [index]");
        eprintln!("Example: sign-hash 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08");
        return;
    };
    let hash = hash.strip_prefix("0x").unwrap_or(hash);
    let Some(engine) = engine(args.get(1)) else {
        return;
    };

    println!("Signing 0x{hash} (confirm on the device)...\n");
    sign_and_verify(
        &engine,
        ("message.signMessageHash", json!({ "messageHash": hash })),
        ("message.verifyMessageHash", "messageHash", json!(hash)),
    )
    .await;
}

async fn sign_and_verify(
    engine: &ProviderEngine,
    (sign_method, sign_args): (&str, Value),
    (verify_method, field, value): (&str, &str, Value),
) {
    let signature = match engine.send_async(sign_method, sign_args).await {
        Ok(signature) => signature,
        Err(e) => {
            report(&e);
            return;
        }
    };

    println!("Public Key:");
    println!("  {}", signature["publicKey"].as_str().unwrap_or_default());
    println!();
    println!("Signature (r || s):");
    println!("  {}", signature["data"].as_str().unwrap_or_default());

    let mut verify_args = json!({ "signature": signature });
    verify_args[field] = value;

    match engine.send_async(verify_method, verify_args).await {
        Ok(Value::Bool(true)) => println!("\nSignature verified."),
        Ok(_) => eprintln!("\nWarning: the signature did not verify!"),
        Err(e) => eprintln!("\nVerification failed: {e}"),
    }
}

fn engine(index: Option<&String>) -> Option<ProviderEngine> {
    let account_index = match index.map(|i| i.parse::<u64>()) {
        None => 0,
        Some(Ok(i)) => i,
        Some(Err(e)) => {
            eprintln!("Invalid account index: {e}");
            return None;
        }
    };
    let config = LedgerConfig {
        account_index,
        neo_compatible: env::var("LEDGER_COMPAT").is_ok_and(|v| v == "1"),
    };

    let link = LedgerLink::new(Arc::new(HidEnumerator::new()));
    let ledger = match LedgerProvider::from_config(link, config) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return None;
        }
    };

    let mut engine = ProviderEngine::new(Some(ProviderInfo::new(
        "ledger-cli",
        env!("CARGO_PKG_VERSION"),
    )));
    engine.add_provider(Arc::new(ledger));
    engine.add_provider(Arc::new(VerifierProvider::new()));
    engine.start();
    Some(engine)
}

fn report(err: &Error) {
    eprintln!("Error: {err}");

    if let Error::Device(e) = err {
        eprintln!();
        match e {
            DeviceError::NotFound => {
                eprintln!("Plug in and unlock the device, then try again.");
            }
            DeviceError::ApplicationClosed => {
                eprintln!("Open the signing application on the device.");
            }
            DeviceError::TransactionDenied => {
                eprintln!("The request was rejected on the device.");
            }
            _ => eprintln!("Check the connection to the device."),
        }
    }
}
