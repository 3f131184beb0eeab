use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use eyre::Result;
use prometheus::{
    labels, opts, register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Registry,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Macro to prefix a string with the namespace.
macro_rules! namespaced {
    ($name:expr) => {
        format!("{}_{}", super::NAMESPACE, $name)
    };
}

/// Metrics shared by the agents
pub struct CoreMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,
    const_labels: HashMap<String, String>,
    listen_port: Option<u16>,
    agent_name: String,

    span_events: IntCounterVec,
    parse_failures: IntCounterVec,
    attestation_polls: IntCounterVec,
    submissions: IntCounterVec,
    tracked_messages: IntGaugeVec,
    wallet_balance: GaugeVec,
}

impl CoreMetrics {
    /// Track metrics for a particular agent name.
    ///
    /// - `for_agent` name of the agent these metrics are tracking.
    /// - `listen_port` port to start the HTTP server on. If None the server
    ///   will not be started.
    /// - `registry` prometheus registry to attach the metrics to
    pub fn new(
        for_agent: &str,
        listen_port: Option<u16>,
        registry: Registry,
    ) -> prometheus::Result<Self> {
        let const_labels: HashMap<String, String> = labels! {
            namespaced!("baselib_version") => env!("CARGO_PKG_VERSION").into(),
            "agent".into() => for_agent.into(),
        };
        let const_labels_ref = const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<HashMap<_, _>>();

        let span_events = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("span_events_total"),
                "Number of span events (logs and time metrics) emitted by level",
                const_labels_ref
            ),
            &["event_level"],
            registry
        )?;

        let parse_failures = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("log_parse_failures_total"),
                "Number of bridge adapter log entries that could not be parsed into a message",
                const_labels_ref
            ),
            &["chain"],
            registry
        )?;

        let attestation_polls = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("attestation_polls_total"),
                "Number of attestation requests by outcome",
                const_labels_ref
            ),
            &["origin", "outcome"],
            registry
        )?;

        let submissions = register_int_counter_vec_with_registry!(
            opts!(
                namespaced!("submissions_total"),
                "Number of attestation submissions by outcome",
                const_labels_ref
            ),
            &["origin", "destination", "outcome"],
            registry
        )?;

        let tracked_messages = register_int_gauge_vec_with_registry!(
            opts!(
                namespaced!("tracked_messages"),
                "Number of tracked messages per origin and status",
                const_labels_ref
            ),
            &["origin", "status"],
            registry
        )?;

        let wallet_balance = register_gauge_vec_with_registry!(
            opts!(
                namespaced!("wallet_balance"),
                "Native token balance of the relayer's wallet, in whole tokens",
                const_labels_ref
            ),
            &["chain", "wallet_address"],
            registry
        )?;

        Ok(Self {
            agent_name: for_agent.into(),
            registry,
            listen_port,
            const_labels,
            span_events,
            parse_failures,
            attestation_polls,
            submissions,
            tracked_messages,
            wallet_balance,
        })
    }

    /// Counter of log events by level.
    ///
    /// Labels:
    /// - `event_level`: level of the event, e.g. `INFO`.
    pub fn span_events(&self) -> IntCounterVec {
        self.span_events.clone()
    }

    /// Bridge adapter log entries that were skipped because they could not be
    /// parsed.
    ///
    /// Labels:
    /// - `chain`: chain the log was read from.
    pub fn parse_failures(&self) -> IntCounterVec {
        self.parse_failures.clone()
    }

    /// Attestation requests made.
    ///
    /// Labels:
    /// - `origin`: origin chain of the message.
    /// - `outcome`: `attested`, `pending`, `unavailable` or `gave_up`.
    pub fn attestation_polls(&self) -> IntCounterVec {
        self.attestation_polls.clone()
    }

    /// Attestation submissions.
    ///
    /// Labels:
    /// - `origin`: origin chain of the message.
    /// - `destination`: chain the attestation was submitted to.
    /// - `outcome`: `sent`, `confirmed`, `already_received`, `retry` or `failed`.
    pub fn submissions(&self) -> IntCounterVec {
        self.submissions.clone()
    }

    /// Messages tracked by the relayer.
    ///
    /// Labels:
    /// - `origin`: origin chain of the messages.
    /// - `status`: submission status, e.g. `attestation_pending`.
    pub fn tracked_messages(&self) -> IntGaugeVec {
        self.tracked_messages.clone()
    }

    /// Native balance of the relayer's wallet.
    ///
    /// Labels:
    /// - `chain`: chain the balance is held on.
    /// - `wallet_address`: the wallet.
    pub fn wallet_balance(&self) -> GaugeVec {
        self.wallet_balance.clone()
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics format)
    /// report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    /// Get the name of this agent, e.g. "relayer"
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Run an HTTP server serving OpenMetrics format reports on `/metrics`
    ///
    /// This is compatible with Prometheus, which ought to be configured to
    /// scrape me!
    pub fn run_http_server(self: Arc<CoreMetrics>) -> JoinHandle<()> {
        use warp::Filter;
        match self.listen_port {
            None => {
                info!("not starting prometheus server");
                tokio::spawn(std::future::ready(()))
            }
            Some(port) => {
                info!(port, "starting prometheus server on 0.0.0.0:{port}");
                tokio::spawn(async move {
                    let route = warp::path!("metrics").map(move || match self.gather() {
                        Ok(report) => warp::http::Response::builder()
                            .header("Content-Type", "text/plain; charset=utf-8")
                            .body(report),
                        Err(error) => {
                            warn!(%error, "failed to encode metrics");
                            warp::http::Response::builder()
                                .status(warp::http::StatusCode::INTERNAL_SERVER_ERROR)
                                .body(Vec::new())
                        }
                    });
                    warp::serve(route).run(([0, 0, 0, 0], port)).await;
                })
            }
        }
    }
}

impl Debug for CoreMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CoreMetrics {{ agent_name: {}, listen_port: {:?}, const_labels: {:?} }}",
            self.agent_name, self.listen_port, self.const_labels
        )
    }
}

/// Create a metrics instance that is not served, for tests and tools.
pub fn dummy_metrics(agent: &str) -> Result<Arc<CoreMetrics>> {
    Ok(Arc::new(CoreMetrics::new(agent, None, Registry::new())?))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gathered_report_contains_namespaced_metrics() {
        let metrics = dummy_metrics("relayer").unwrap();
        metrics
            .parse_failures()
            .with_label_values(&["ethereum"])
            .inc();
        metrics
            .wallet_balance()
            .with_label_values(&["ethereum", "0xabc"])
            .set(1.5);

        let report = String::from_utf8(metrics.gather().unwrap()).unwrap();
        assert!(report.contains("ortege_log_parse_failures_total"));
        assert!(report.contains("chain=\"ethereum\""));
        assert!(report.contains("ortege_wallet_balance"));
        assert!(report.contains("agent=\"relayer\""));
    }
}
