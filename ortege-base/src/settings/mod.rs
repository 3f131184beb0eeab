//! Settings and configuration for the agents.
//!
//! Configuration is read from JSON files and environment variables (see
//! `loader::load_settings`) into a raw, forgiving struct, then converted into
//! the validated settings with `FromRawConf` so every problem is reported at
//! once.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{eyre, Context, Result};
use prometheus::Registry;
use serde::Deserialize;
use url::Url;

use ortege_core::{config::*, ChainMap, ChainName, H160};

use crate::{
    db::{InMemoryLedger, RocksLedger, SubmissionLedger},
    CoreMetrics,
};

pub use loader::*;
pub use trace::*;

mod loader;
mod trace;

/// Connection details of one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConf {
    /// JSON-RPC endpoint
    pub rpc_url: Url,
    /// Account the node signs relayer transactions with
    pub signer: H160,
}

/// Where submission records are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LedgerConf {
    /// Lost on restart
    #[default]
    Memory,
    /// RocksDB database at `path`
    RocksDb {
        /// Database directory
        path: PathBuf,
    },
}

/// Settings shared by every agent.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Connection details per chain
    pub chains: ChainMap<ChainConf>,
    /// Port to serve prometheus metrics on
    pub metrics_port: Option<u16>,
    /// Logging configuration
    pub tracing: TracingConfig,
    /// Submission record storage
    pub ledger: LedgerConf,
}

impl Settings {
    /// Connection details of `chain`.
    pub fn chain(&self, chain: &ChainName) -> Result<&ChainConf> {
        self.chains
            .get(chain)
            .ok_or_else(|| eyre!("No chain setup found for {chain}"))
    }

    /// Create the core metrics from the settings given the name of the agent.
    pub fn metrics(&self, name: &str) -> Result<Arc<CoreMetrics>> {
        Ok(Arc::new(CoreMetrics::new(
            name,
            self.metrics_port,
            Registry::new(),
        )?))
    }

    /// Open the configured ledger.
    pub fn build_ledger(&self) -> Result<Arc<dyn SubmissionLedger>> {
        Ok(match &self.ledger {
            LedgerConf::Memory => Arc::new(InMemoryLedger::new()),
            LedgerConf::RocksDb { path } => Arc::new(RocksLedger::open(path)?),
        })
    }
}

/// Raw form of `Settings`.
#[derive(Debug, Default, Deserialize)]
pub struct RawSettings {
    chains: Option<BTreeMap<String, RawChainConf>>,
    metrics_port: Option<u16>,
    tracing: Option<TracingConfig>,
    ledger: Option<RawLedgerConf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawChainConf {
    rpc_url: Option<String>,
    signer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLedgerConf {
    #[serde(rename = "type")]
    kind: Option<String>,
    path: Option<String>,
}

impl FromRawConf<RawSettings> for Settings {
    fn from_config(raw: RawSettings, cwp: &ConfigPath) -> ConfigResult<Self> {
        let mut err = ConfigParsingError::default();

        let chains_path = cwp + "chains";
        let chains = raw
            .chains
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, chain)| {
                ChainConf::from_config(chain, &chains_path.join(name.as_str()))
                    .take_config_err(&mut err)
                    .map(|conf| (ChainName::from(name), conf))
            })
            .collect();

        let ledger = match raw.ledger {
            Some(ledger) => LedgerConf::from_config(ledger, &(cwp + "ledger"))
                .take_config_err(&mut err)
                .unwrap_or_default(),
            None => LedgerConf::Memory,
        };

        err.into_result()?;
        Ok(Self {
            chains,
            metrics_port: raw.metrics_port,
            tracing: raw.tracing.unwrap_or_default(),
            ledger,
        })
    }
}

impl FromRawConf<RawChainConf> for ChainConf {
    fn from_config(raw: RawChainConf, cwp: &ConfigPath) -> ConfigResult<Self> {
        let mut err = ConfigParsingError::default();

        let rpc_url = raw
            .rpc_url
            .ok_or_else(|| eyre!("Missing `rpc_url`"))
            .take_err(&mut err, || cwp + "rpc_url")
            .and_then(|url| {
                url.parse::<Url>()
                    .context("Invalid `rpc_url`")
                    .take_err(&mut err, || cwp + "rpc_url")
            });

        let signer = raw
            .signer
            .ok_or_else(|| eyre!("Missing `signer`"))
            .take_err(&mut err, || cwp + "signer")
            .and_then(|signer| parse_address(&signer).take_err(&mut err, || cwp + "signer"));

        err.into_result()?;
        match (rpc_url, signer) {
            (Some(rpc_url), Some(signer)) => Ok(Self { rpc_url, signer }),
            _ => Err(eyre!("Chain connection is incomplete")).into_config_result(|| cwp.clone()),
        }
    }
}

impl FromRawConf<RawLedgerConf> for LedgerConf {
    fn from_config(raw: RawLedgerConf, cwp: &ConfigPath) -> ConfigResult<Self> {
        match raw.kind.as_deref().unwrap_or("memory") {
            "memory" => Ok(Self::Memory),
            "rocksdb" => raw
                .path
                .map(|path| Self::RocksDb { path: path.into() })
                .ok_or_else(|| eyre!("Missing `path` for a rocksdb ledger"))
                .into_config_result(|| cwp + "path"),
            other => Err(eyre!("Unknown ledger type `{other}`"))
                .into_config_result(|| cwp + "type"),
        }
    }
}

/// Parse a 0x-prefixed 20 byte hex address.
pub fn parse_address(raw: &str) -> Result<H160> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(stripped).with_context(|| format!("Invalid hex in `{raw}`"))?;
    if bytes.len() != 20 {
        return Err(eyre!("Address `{raw}` is not 20 bytes long"));
    }
    Ok(H160::from_slice(&bytes))
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw_settings(json: &str) -> RawSettings {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_full_settings() {
        let raw = raw_settings(
            r#"{
                "metrics_port": 9090,
                "tracing": { "fmt": "json", "level": "debug" },
                "ledger": { "type": "rocksdb", "path": "/var/lib/relayer" },
                "chains": {
                    "ethereum": {
                        "rpc_url": "http://localhost:8545",
                        "signer": "0x00000000000000000000000000000000000000aa"
                    }
                }
            }"#,
        );
        let settings = Settings::from_config(raw, &ConfigPath::default()).unwrap();
        assert_eq!(settings.metrics_port, Some(9090));
        assert_eq!(settings.tracing.level, Level::Debug);
        assert_eq!(
            settings.ledger,
            LedgerConf::RocksDb {
                path: "/var/lib/relayer".into()
            }
        );
        let ethereum = settings.chain(&"ethereum".into()).unwrap();
        assert_eq!(ethereum.rpc_url.as_str(), "http://localhost:8545/");
        assert_eq!(ethereum.signer, H160::from_low_u64_be(0xaa));
    }

    #[test]
    fn defaults_to_memory_ledger_without_metrics() {
        let settings = Settings::from_config(raw_settings("{}"), &ConfigPath::default()).unwrap();
        assert_eq!(settings.ledger, LedgerConf::Memory);
        assert!(settings.chains.is_empty());
        assert_eq!(settings.metrics_port, None);
    }

    #[test]
    fn reports_every_invalid_chain_field() {
        let raw = raw_settings(
            r#"{
                "chains": {
                    "ethereum": { "rpc_url": "not a url", "signer": "0x1234" },
                    "avalanche": {}
                },
                "ledger": { "type": "postgres" }
            }"#,
        );
        let err = Settings::from_config(raw, &ConfigPath::default()).unwrap_err();
        let paths: Vec<_> = err.paths().map(ConfigPath::json_name).collect();
        assert_eq!(
            paths,
            vec![
                "chains.avalanche.rpcUrl",
                "chains.avalanche.signer",
                "chains.ethereum.rpcUrl",
                "chains.ethereum.signer",
                "ledger.type",
            ]
        );
    }

    #[test]
    fn address_parsing() {
        assert_eq!(
            parse_address("0x000000000000000000000000000000000000000F").unwrap(),
            H160::from_low_u64_be(15)
        );
        assert!(parse_address("0xzz00000000000000000000000000000000000000").is_err());
        assert!(parse_address("0x00").is_err());
    }
}
