//! `account-inspect`: decodes the account's wire formats and computes
//! deferred-action digests.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG_FILE` names the account configuration (default `account.toml`)
//! - `RUST_LOG` controls log output on stderr
//!
//! Every command prints JSON on stdout.

use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde_json::json;

use modular_account::AccountConfig;
use modular_account::codec::{ValidationLocator, parse_runtime_authorization, parse_signature};
use modular_account::telemetry::Telemetry;
use modular_account::{deferred_action_digest, deferred_action_domain};

#[derive(Parser, Debug)]
#[command(name = "account-inspect")]
#[command(version, about = "Inspect modular account nonces, signatures and deferred actions")]
struct Cli {
    /// Account address; overrides the configuration file
    #[arg(long, env = "ACCOUNT_ADDRESS")]
    account: Option<Address>,

    /// Chain id; overrides the configuration file
    #[arg(long, env = "CHAIN_ID")]
    chain_id: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode the validation locator carried by a user operation nonce
    DecodeNonce {
        /// Nonce, decimal or 0x-prefixed hex
        nonce: U256,
    },

    /// Split a signature blob into deferred action, hook segments and validation data
    DecodeSignature {
        /// Signature bytes as hex
        signature: String,

        /// The blob is a runtime authorization or ERC-1271 signature with a leading locator
        #[arg(long, conflicts_with = "deferred")]
        runtime: bool,

        /// The user operation's locator has the deferred-action flag set
        #[arg(long)]
        deferred: bool,
    },

    /// Compute the EIP-712 digest a deferred action must be signed over
    DeferredDigest {
        /// Nonce of the user operation carrying the action
        #[arg(long)]
        nonce: U256,

        /// Unix timestamp after which the action expires; 0 for none
        #[arg(long, default_value = "0")]
        deadline: u64,

        /// Self-call data as hex
        #[arg(long)]
        self_call: String,
    },
}

fn parse_hex(input: &str) -> Result<Bytes> {
    input
        .parse::<Bytes>()
        .with_context(|| format!("invalid hex input {input:?}"))
}

fn load_config(cli: &Cli) -> AccountConfig {
    let mut config = match AccountConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            tracing::info!("Using default configuration");
            AccountConfig::default()
        }
    };
    if let Some(account) = cli.account {
        config = config.with_account(account);
    }
    if let Some(chain_id) = cli.chain_id {
        config = config.with_chain_id(chain_id);
    }
    config
}

fn run(cli: &Cli, config: &AccountConfig) -> Result<serde_json::Value> {
    let output = match &cli.command {
        Commands::DecodeNonce { nonce } => {
            let locator = ValidationLocator::from_nonce(*nonce).context("nonce does not carry a valid locator")?;
            let sequence = *nonce & U256::from(u64::MAX);
            json!({
                "locator": locator,
                "nonceKey": locator.nonce_key().to_string(),
                "sequence": sequence.to_string(),
            })
        }
        Commands::DecodeSignature {
            signature,
            runtime,
            deferred,
        } => {
            let blob = parse_hex(signature)?;
            if *runtime {
                serde_json::to_value(parse_runtime_authorization(&blob).context("malformed runtime authorization")?)?
            } else {
                serde_json::to_value(parse_signature(&blob, *deferred).context("malformed signature")?)?
            }
        }
        Commands::DeferredDigest {
            nonce,
            deadline,
            self_call,
        } => {
            let self_call = parse_hex(self_call)?;
            let digest = deferred_action_digest(config, *nonce, *deadline, &self_call);
            let domain = deferred_action_domain(config);
            json!({
                "digest": digest,
                "domainSeparator": domain.separator(),
                "account": config.account,
                "chainId": config.chain_id,
            })
        }
    };
    Ok(output)
}

fn main() -> Result<()> {
    dotenv().ok();

    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let cli = Cli::parse();
    let config = load_config(&cli);
    let output = run(&cli, &config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
