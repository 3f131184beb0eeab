use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, instrument::Instrumented, warn, Instrument};

use ortege_base::{db::SubmissionLedger, AgentCore, BaseAgent, CoreMetrics};
use ortege_core::{ChainMap, ChainName};

use crate::attestation::{AttestationFetcher, AttestationService, CircleAttestationClient};
use crate::chain::{CircleChainClient, EthereumCircleClient};
use crate::clock::{Clock, SystemClock};
use crate::correlator::MessageCorrelator;
use crate::driver::{DriverMetrics, DriverTiming, SubmissionDriver};
use crate::settings::RelayerSettings;

/// Relays Circle messages sent through the bridge adapters of the watched
/// chains to their destination chains.
pub struct CircleRelayer {
    core: AgentCore,
    watched_chains: Vec<ChainName>,
    clients: ChainMap<Arc<dyn CircleChainClient>>,
    attestations: Arc<dyn AttestationService>,
    ledger: Arc<dyn SubmissionLedger>,
    clock: Arc<dyn Clock>,
    settings: RelayerSettings,
}

impl Debug for CircleRelayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircleRelayer")
            .field("watched_chains", &self.watched_chains)
            .field("chains", &self.clients.keys().collect::<Vec<_>>())
            .field("ledger", &self.ledger)
            .finish()
    }
}

#[async_trait]
impl BaseAgent for CircleRelayer {
    const AGENT_NAME: &'static str = "circle_relayer";

    type Settings = RelayerSettings;

    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized,
    {
        let mut clients: ChainMap<Arc<dyn CircleChainClient>> = ChainMap::new();
        for (chain, circle) in &settings.circle_chains {
            let conn = settings.base.chain(chain)?;
            let client = EthereumCircleClient::connect(
                chain.clone(),
                &conn.rpc_url,
                conn.signer,
                circle.bridge_adapter,
                circle.message_transmitter,
            )
            .wrap_err_with(|| format!("Failed to connect to {chain}"))?;
            clients.insert(chain.clone(), Arc::new(client));
        }

        let attestations = CircleAttestationClient::new(
            settings.attestation.url.clone(),
            settings.attestation.request_timeout,
        )
        .wrap_err("Failed to build attestation client")?;
        let ledger = settings.base.build_ledger()?;

        Ok(Self {
            core: AgentCore {
                metrics,
                settings: settings.base.clone(),
            },
            watched_chains: settings.watched_chains.clone(),
            clients,
            attestations: Arc::new(attestations),
            ledger,
            clock: Arc::new(SystemClock),
            settings,
        })
    }

    #[allow(clippy::async_yields_async)]
    async fn run(self) -> Instrumented<JoinHandle<Result<()>>> {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(self.watched_chains.len());
        for origin in &self.watched_chains {
            match self.build_driver(origin) {
                Ok(driver) => tasks.push(driver.spawn(cancel.child_token())),
                Err(err) => {
                    error!(%origin, error = ?err, "Failed to start submission driver");
                    cancel.cancel();
                    return tokio::spawn(async move { Err(err) })
                        .instrument(info_span!("CircleRelayer"));
                }
            }
        }
        info!(chains = ?self.watched_chains, "Relaying Circle messages");

        tokio::spawn(async move {
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(err) => warn!(error = %err, "Cannot listen for shutdown signal"),
                }
                shutdown.cancel();
            });

            for result in join_all(tasks).await {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(error = ?err, "Submission driver failed"),
                    Err(err) => error!(error = ?err, "Submission driver panicked"),
                }
            }
            Ok(())
        })
        .instrument(info_span!("CircleRelayer"))
    }
}

impl CircleRelayer {
    fn build_driver(&self, origin: &ChainName) -> Result<SubmissionDriver> {
        let metrics = &self.core.metrics;
        let circle = self
            .settings
            .circle_chains
            .get(origin)
            .ok_or_else(|| eyre::eyre!("No Circle deployment configured for {origin}"))?;
        let client = self
            .clients
            .get(origin)
            .cloned()
            .ok_or_else(|| eyre::eyre!("No client for {origin}"))?;

        let correlator = MessageCorrelator::new(
            client.clone(),
            self.settings.domain_chains(),
            circle.index_chunk_size,
            metrics.parse_failures(),
        );
        let fetcher = AttestationFetcher::from_conf(
            self.attestations.clone(),
            &self.settings.attestation,
            metrics.attestation_polls(),
        );
        Ok(SubmissionDriver::new(
            client,
            self.clients.clone(),
            correlator,
            fetcher,
            self.ledger.clone(),
            self.clock.clone(),
            DriverMetrics::new(metrics),
            DriverTiming {
                poll_interval: self.settings.poll_interval,
                confirmation_timeout: self.settings.confirmation_timeout,
            },
            circle.start_block,
        ))
    }
}
