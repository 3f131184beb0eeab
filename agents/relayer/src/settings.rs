//! Relayer configuration.
//!
//! On top of the shared agent settings the relayer needs the Circle view of
//! every chain (domain id and contract addresses), the attestation service and
//! the chains whose bridge adapters it watches.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use eyre::{eyre, Context};
use serde::Deserialize;
use url::Url;

use ortege_base::settings::{load_settings, parse_address, RawSettings, Settings};
use ortege_base::LoadableFromSettings;
use ortege_core::{config::*, ChainMap, ChainName, H160};

const DEFAULT_ATTESTATION_URL: &str = "https://iris-api.circle.com";
const DEFAULT_POLL_INTERVAL_MS: u64 = 6_000;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_ATTEMPTS: u32 = 60;
const DEFAULT_MAX_WAIT_SECS: u64 = 3_600;
const DEFAULT_TRANSIENT_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INDEX_CHUNK_SIZE: u64 = 2_000;

/// Settings for the Circle relayer
#[derive(Debug, Clone)]
pub struct RelayerSettings {
    /// Settings shared by all agents
    pub base: Settings,
    /// Chains whose bridge adapters are scanned for outgoing messages
    pub watched_chains: Vec<ChainName>,
    /// Circle deployment on every chain messages are relayed from or to
    pub circle_chains: ChainMap<CircleChainConf>,
    /// The attestation service and how long to wait for it
    pub attestation: AttestationConf,
    /// Pause between two sweeps of a watched chain
    pub poll_interval: Duration,
    /// How long a sent submission may stay unconfirmed before it is sent again
    pub confirmation_timeout: Duration,
}

/// Circle deployment on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircleChainConf {
    /// Circle domain id of the chain
    pub domain: u32,
    /// Bridge adapter whose transactions emit outgoing messages
    pub bridge_adapter: H160,
    /// Message transmitter that receives messages with their attestation
    pub message_transmitter: H160,
    /// First block scanned for messages
    pub start_block: u64,
    /// Most blocks asked for in one log query
    pub index_chunk_size: u64,
}

/// Attestation service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationConf {
    /// Base url of the attestation API
    pub url: Url,
    /// Attestation requests made for one message before giving up
    pub max_attempts: u32,
    /// Time since discovery after which a message is given up on
    pub max_wait: Duration,
    /// Retries of a request that failed in transport or with a server error
    pub transient_retries: u32,
    /// Delay before the first retry; doubled for every further retry
    pub retry_base_delay: Duration,
    /// Timeout of a single request
    pub request_timeout: Duration,
}

impl AsRef<Settings> for RelayerSettings {
    fn as_ref(&self) -> &Settings {
        &self.base
    }
}

impl LoadableFromSettings for RelayerSettings {
    fn load() -> ConfigResult<Self> {
        load_settings::<RawRelayerSettings, Self>()
    }
}

impl RelayerSettings {
    /// Chain name of a Circle domain id.
    pub fn domain_chains(&self) -> BTreeMap<u32, ChainName> {
        self.circle_chains
            .iter()
            .map(|(chain, conf)| (conf.domain, chain.clone()))
            .collect()
    }
}

/// Raw form of `RelayerSettings`.
#[derive(Debug, Deserialize)]
pub struct RawRelayerSettings {
    #[serde(flatten)]
    base: RawSettings,
    watched_chains: Option<String>,
    poll_interval_ms: Option<u64>,
    confirmation_timeout_secs: Option<u64>,
    circle: Option<RawCircleConf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCircleConf {
    attestation: Option<RawAttestationConf>,
    chains: Option<BTreeMap<String, RawCircleChainConf>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttestationConf {
    url: Option<String>,
    max_attempts: Option<u32>,
    max_wait_secs: Option<u64>,
    transient_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCircleChainConf {
    domain: Option<u32>,
    bridge_adapter: Option<String>,
    message_transmitter: Option<String>,
    start_block: Option<u64>,
    index_chunk_size: Option<u64>,
}

impl FromRawConf<RawRelayerSettings> for RelayerSettings {
    fn from_config(raw: RawRelayerSettings, cwp: &ConfigPath) -> ConfigResult<Self> {
        let mut err = ConfigParsingError::default();

        let base = Settings::from_config(raw.base, cwp).take_config_err(&mut err);

        let circle = raw.circle.unwrap_or_default();
        let circle_path = cwp + "circle";

        let attestation = AttestationConf::from_config(
            circle.attestation.unwrap_or_default(),
            &(&circle_path + "attestation"),
        )
        .take_config_err(&mut err);

        let chains_path = &circle_path + "chains";
        let circle_chains: ChainMap<CircleChainConf> = circle
            .chains
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(name, chain)| {
                CircleChainConf::from_config(chain, &chains_path.join(name.as_str()))
                    .take_config_err(&mut err)
                    .map(|conf| (ChainName::from(name), conf))
            })
            .collect();

        let mut seen_domains = HashSet::new();
        for (chain, conf) in &circle_chains {
            if !seen_domains.insert(conf.domain) {
                err.push(
                    &chains_path.join(chain.as_str()) + "domain",
                    eyre!("Circle domain {} is used by more than one chain", conf.domain),
                );
            }
        }

        let watched_path = cwp + "watched_chains";
        let watched_chains: Vec<ChainName> = raw
            .watched_chains
            .ok_or_else(|| eyre!("Missing `watched_chains`"))
            .take_err(&mut err, || watched_path.clone())
            .map(|chains| {
                chains
                    .split(',')
                    .map(str::trim)
                    .filter(|chain| !chain.is_empty())
                    .map(|chain| ChainName::from(chain.to_lowercase()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(base) = &base {
            for chain in watched_chains.iter().chain(circle_chains.keys()) {
                if !base.chains.contains_key(chain) {
                    err.push(
                        cwp + "chains",
                        eyre!("No connection configured for chain `{chain}`"),
                    );
                }
            }
        }
        for chain in &watched_chains {
            if !circle_chains.contains_key(chain) {
                err.push(
                    watched_path.clone(),
                    eyre!("Watched chain `{chain}` has no Circle deployment configured"),
                );
            }
        }

        err.into_result()?;
        let (Some(base), Some(attestation)) = (base, attestation) else {
            return Err(eyre!("Relayer settings are incomplete")).into_config_result(|| cwp.clone());
        };
        Ok(Self {
            base,
            watched_chains,
            circle_chains,
            attestation,
            poll_interval: Duration::from_millis(
                raw.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            confirmation_timeout: Duration::from_secs(
                raw.confirmation_timeout_secs
                    .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            ),
        })
    }
}

impl FromRawConf<RawAttestationConf> for AttestationConf {
    fn from_config(raw: RawAttestationConf, cwp: &ConfigPath) -> ConfigResult<Self> {
        let mut err = ConfigParsingError::default();

        let url = raw
            .url
            .as_deref()
            .unwrap_or(DEFAULT_ATTESTATION_URL)
            .parse::<Url>()
            .context("Invalid attestation service url")
            .take_err(&mut err, || cwp + "url");

        let max_attempts = raw.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            err.push(cwp + "max_attempts", eyre!("Must allow at least one attempt"));
        }

        err.into_result()?;
        let Some(url) = url else {
            return Err(eyre!("Missing attestation url")).into_config_result(|| cwp + "url");
        };
        Ok(Self {
            url,
            max_attempts,
            max_wait: Duration::from_secs(raw.max_wait_secs.unwrap_or(DEFAULT_MAX_WAIT_SECS)),
            transient_retries: raw.transient_retries.unwrap_or(DEFAULT_TRANSIENT_RETRIES),
            retry_base_delay: Duration::from_millis(
                raw.retry_base_delay_ms
                    .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ),
            request_timeout: Duration::from_secs(
                raw.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }
}

impl FromRawConf<RawCircleChainConf> for CircleChainConf {
    fn from_config(raw: RawCircleChainConf, cwp: &ConfigPath) -> ConfigResult<Self> {
        let mut err = ConfigParsingError::default();

        let domain = raw
            .domain
            .ok_or_else(|| eyre!("Missing `domain`"))
            .take_err(&mut err, || cwp + "domain");

        let mut address = |value: Option<String>, field: &str| {
            value
                .ok_or_else(|| eyre!("Missing `{field}`"))
                .and_then(|value| parse_address(&value))
                .take_err(&mut err, || cwp + field)
        };
        let bridge_adapter = address(raw.bridge_adapter, "bridge_adapter");
        let message_transmitter = address(raw.message_transmitter, "message_transmitter");

        let index_chunk_size = raw.index_chunk_size.unwrap_or(DEFAULT_INDEX_CHUNK_SIZE);
        if index_chunk_size == 0 {
            err.push(cwp + "index_chunk_size", eyre!("Must be at least one block"));
        }

        err.into_result()?;
        match (domain, bridge_adapter, message_transmitter) {
            (Some(domain), Some(bridge_adapter), Some(message_transmitter)) => Ok(Self {
                domain,
                bridge_adapter,
                message_transmitter,
                start_block: raw.start_block.unwrap_or_default(),
                index_chunk_size,
            }),
            _ => Err(eyre!("Circle chain configuration is incomplete"))
                .into_config_result(|| cwp.clone()),
        }
    }
}
