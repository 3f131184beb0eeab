//! The per-chain relay loop.
//!
//! Every sweep correlates new messages sent from the watched chain, then moves
//! each tracked message one step along
//! `AttestationPending -> AttestationAvailable -> SubmittedPendingConfirmation
//! -> Submitted`, or to `Failed`. A step runs until it has to wait on someone
//! else: the attestation service, a pending transaction or the next sweep.
//! Every status change is a compare-and-set on the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::Result;
use prometheus::{GaugeVec, IntCounterVec, IntGaugeVec};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, instrument::Instrumented, warn, Instrument};

use ortege_base::{db::DbResult, db::SubmissionLedger, CoreMetrics};
use ortege_core::{
    utils::fmt_bytes, Attestation, ChainMap, ChainName, SubmissionRecord, SubmissionStatus, H256,
};

use crate::attestation::{AttestationFetcher, FetchOutcome};
use crate::chain::{CircleChainClient, TxStatus};
use crate::clock::Clock;
use crate::correlator::MessageCorrelator;

/// Metrics the driver reports to.
#[derive(Debug, Clone)]
pub struct DriverMetrics {
    submissions: IntCounterVec,
    tracked_messages: IntGaugeVec,
    wallet_balance: GaugeVec,
}

impl DriverMetrics {
    /// Driver metrics registered in `metrics`.
    pub fn new(metrics: &CoreMetrics) -> Self {
        Self {
            submissions: metrics.submissions(),
            tracked_messages: metrics.tracked_messages(),
            wallet_balance: metrics.wallet_balance(),
        }
    }
}

/// Timing of the relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTiming {
    /// Pause between sweeps
    pub poll_interval: Duration,
    /// How long a sent submission may stay unconfirmed before it is resent
    pub confirmation_timeout: Duration,
}

/// What happened during one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Messages tracked for the first time
    pub discovered: usize,
    /// Submission transactions sent
    pub sent: usize,
    /// Messages that reached `Submitted`
    pub submitted: usize,
    /// Messages that reached `Failed`
    pub failed: usize,
}

/// Relays the messages of one watched chain.
#[derive(Debug)]
pub struct SubmissionDriver {
    origin: ChainName,
    origin_client: Arc<dyn CircleChainClient>,
    destinations: ChainMap<Arc<dyn CircleChainClient>>,
    correlator: MessageCorrelator,
    fetcher: AttestationFetcher,
    ledger: Arc<dyn SubmissionLedger>,
    clock: Arc<dyn Clock>,
    metrics: DriverMetrics,
    timing: DriverTiming,
    cursor: u64,
}

impl SubmissionDriver {
    /// Driver for the chain of `origin_client`, scanning from `start_block`.
    /// `destinations` must hold a client for every chain messages are
    /// delivered to.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        origin_client: Arc<dyn CircleChainClient>,
        destinations: ChainMap<Arc<dyn CircleChainClient>>,
        correlator: MessageCorrelator,
        fetcher: AttestationFetcher,
        ledger: Arc<dyn SubmissionLedger>,
        clock: Arc<dyn Clock>,
        metrics: DriverMetrics,
        timing: DriverTiming,
        start_block: u64,
    ) -> Self {
        Self {
            origin: origin_client.chain().clone(),
            origin_client,
            destinations,
            correlator,
            fetcher,
            ledger,
            clock,
            metrics,
            timing,
            cursor: start_block,
        }
    }

    /// Run sweeps until `cancel` fires. Cancellation is checked between
    /// sweeps; a sweep in progress is finished first.
    pub fn spawn(self, cancel: CancellationToken) -> Instrumented<JoinHandle<Result<()>>> {
        let span = info_span!("SubmissionDriver", origin = %self.origin);
        tokio::spawn(async move { self.run(cancel).await }).instrument(span)
    }

    async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(cursor = self.cursor, "Starting submission driver");
        while !cancel.is_cancelled() {
            match self.sweep().await {
                Ok(report) if report != SweepReport::default() => info!(?report, "Sweep done"),
                Ok(_) => debug!("Sweep done, nothing changed"),
                Err(err) => error!(error = %err, "Sweep aborted by a ledger failure"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.timing.poll_interval) => {}
            }
        }
        info!("Submission driver stopped");
        Ok(())
    }

    /// One pass: correlate new messages, then advance every tracked message
    /// that is not done, in discovery order. Only ledger failures abort a
    /// sweep; chain and attestation failures leave the affected records for
    /// the next one.
    #[instrument(skip(self), fields(origin = %self.origin, cursor = self.cursor))]
    pub async fn sweep(&mut self) -> DbResult<SweepReport> {
        let mut report = SweepReport::default();

        match self.correlator.find_candidates(self.cursor).await {
            Ok((messages, cursor)) => {
                for message in messages {
                    let record = SubmissionRecord::new(message, self.clock.now());
                    let identity = record.identity();
                    if self.ledger.insert_if_absent(record)? {
                        info!(message = %identity, "Tracking new message");
                        report.discovered += 1;
                    } else {
                        debug!(message = %identity, "Message already tracked");
                    }
                }
                self.cursor = cursor;
            }
            Err(err) => warn!(error = %err, "Failed to correlate messages"),
        }

        let records = self.ledger.records_for_origin(&self.origin)?;
        for record in records {
            if !record.status.is_terminal() {
                self.advance(record, &mut report).await?;
            }
        }

        self.report_tracked()?;
        self.report_balance().await;
        Ok(report)
    }

    async fn advance(&self, record: SubmissionRecord, report: &mut SweepReport) -> DbResult<()> {
        match record.status.clone() {
            SubmissionStatus::AttestationPending => self.poll_attestation(record, report).await,
            SubmissionStatus::AttestationAvailable { attestation } => {
                self.submit(record, attestation, report).await
            }
            SubmissionStatus::SubmittedPendingConfirmation {
                tx_hash,
                submitted_at,
                attestation,
            } => {
                self.confirm(record, tx_hash, submitted_at, attestation, report)
                    .await
            }
            SubmissionStatus::Submitted { .. } | SubmissionStatus::Failed { .. } => Ok(()),
        }
    }

    async fn poll_attestation(
        &self,
        record: SubmissionRecord,
        report: &mut SweepReport,
    ) -> DbResult<()> {
        let now = self.clock.now();
        match self.fetcher.fetch(&record, now).await {
            FetchOutcome::Attested(attestation) => {
                let status = SubmissionStatus::AttestationAvailable {
                    attestation: attestation.clone(),
                };
                let mut updated = record.transitioned(status, now);
                updated.attempts += 1;
                if self.store(&record, updated.clone())? {
                    info!(message = %record.identity(), "Attestation available");
                    self.submit(updated, attestation, report).await?;
                }
            }
            FetchOutcome::Pending => {
                let mut updated = record.transitioned(SubmissionStatus::AttestationPending, now);
                updated.attempts += 1;
                self.store(&record, updated)?;
            }
            FetchOutcome::Unavailable(_) => {}
            FetchOutcome::GiveUp(reason) => {
                warn!(message = %record.identity(), %reason, "Giving up on message");
                self.fail(&record, reason, now, report)?;
            }
        }
        Ok(())
    }

    async fn submit(
        &self,
        record: SubmissionRecord,
        attestation: Attestation,
        report: &mut SweepReport,
    ) -> DbResult<()> {
        let now = self.clock.now();
        let Some(destination) = self.destination(&record) else {
            let reason = format!("no client for destination {}", record.message.destination);
            return self.fail(&record, reason, now, report);
        };

        match destination
            .is_message_received(record.message.used_nonce_key())
            .await
        {
            Ok(true) => return self.already_received(&record, now, report),
            Ok(false) => {}
            Err(err) => {
                warn!(message = %record.identity(), error = %err, "Failed to check if message was received");
                self.count_submission(&record, "retry");
                return Ok(());
            }
        }

        match destination
            .receive_message(&record.message.message, &attestation.signature)
            .await
        {
            Ok(tx_hash) => {
                info!(message = %record.identity(), ?tx_hash, destination = %record.message.destination, "Submitted attestation");
                self.count_submission(&record, "sent");
                report.sent += 1;
                let status = SubmissionStatus::SubmittedPendingConfirmation {
                    tx_hash,
                    submitted_at: now,
                    attestation: attestation.clone(),
                };
                let updated = record.transitioned(status, now);
                let stored = match self.store(&record, updated.clone()) {
                    Ok(stored) => stored,
                    Err(err) => {
                        // the transaction is out but nothing remembers it
                        error!(
                            message = %record.identity(),
                            ?tx_hash,
                            destination = %record.message.destination,
                            error = %err,
                            "Failed to record sent submission, reconcile the transaction manually"
                        );
                        return Err(err);
                    }
                };
                if stored {
                    self.confirm(updated, tx_hash, now, attestation, report)
                        .await?;
                }
            }
            Err(err) if err.is_retryable() => {
                warn!(message = %record.identity(), error = %err, "Submission failed, retrying next sweep");
                self.count_submission(&record, "retry");
            }
            Err(err) => {
                error!(message = %record.identity(), error = %err, "Submission rejected");
                self.fail(&record, format!("submission rejected: {err}"), now, report)?;
            }
        }
        Ok(())
    }

    async fn confirm(
        &self,
        record: SubmissionRecord,
        tx_hash: H256,
        submitted_at: DateTime<Utc>,
        attestation: Attestation,
        report: &mut SweepReport,
    ) -> DbResult<()> {
        let now = self.clock.now();
        let Some(destination) = self.destination(&record) else {
            let reason = format!("no client for destination {}", record.message.destination);
            return self.fail(&record, reason, now, report);
        };

        let status = match destination.transaction_status(tx_hash).await {
            Ok(status) => status,
            Err(err) => {
                warn!(message = %record.identity(), ?tx_hash, error = %err, "Failed to get submission status");
                return Ok(());
            }
        };
        match status {
            TxStatus::Confirmed => {
                let updated = record.transitioned(
                    SubmissionStatus::Submitted {
                        tx_hash: Some(tx_hash),
                    },
                    now,
                );
                if self.store(&record, updated)? {
                    info!(message = %record.identity(), ?tx_hash, "Message delivered");
                    self.count_submission(&record, "confirmed");
                    report.submitted += 1;
                }
            }
            TxStatus::Reverted => {
                match destination
                    .is_message_received(record.message.used_nonce_key())
                    .await
                {
                    Ok(true) => self.already_received(&record, now, report)?,
                    Ok(false) => {
                        let reason = format!("submission {tx_hash:?} reverted");
                        error!(message = %record.identity(), %reason, "Submission reverted");
                        self.fail(&record, reason, now, report)?;
                    }
                    Err(err) => {
                        warn!(message = %record.identity(), error = %err, "Failed to check if message was received")
                    }
                }
            }
            TxStatus::Pending | TxStatus::Unknown => {
                let waited = (now - submitted_at).to_std().unwrap_or_default();
                if waited >= self.timing.confirmation_timeout {
                    warn!(
                        message = %record.identity(),
                        ?tx_hash,
                        ?status,
                        waited_secs = waited.as_secs(),
                        "Submission not confirmed in time, will resubmit"
                    );
                    let updated = record
                        .transitioned(SubmissionStatus::AttestationAvailable { attestation }, now);
                    self.store(&record, updated)?;
                    self.count_submission(&record, "retry");
                } else {
                    debug!(message = %record.identity(), ?tx_hash, ?status, "Waiting for submission");
                }
            }
        }
        Ok(())
    }

    fn already_received(
        &self,
        record: &SubmissionRecord,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> DbResult<()> {
        let updated = record.transitioned(SubmissionStatus::Submitted { tx_hash: None }, now);
        if self.store(record, updated)? {
            info!(message = %record.identity(), "Message was already received");
            self.count_submission(record, "already_received");
            report.submitted += 1;
        }
        Ok(())
    }

    fn fail(
        &self,
        record: &SubmissionRecord,
        reason: String,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> DbResult<()> {
        let updated = record.transitioned(SubmissionStatus::Failed { reason }, now);
        if self.store(record, updated)? {
            self.count_submission(record, "failed");
            report.failed += 1;
        }
        Ok(())
    }

    /// Replace `current` with `updated` unless the record changed since it
    /// was read.
    fn store(&self, current: &SubmissionRecord, updated: SubmissionRecord) -> DbResult<bool> {
        let stored = self.ledger.compare_and_set(&current.status, updated)?;
        if !stored {
            warn!(
                message = %current.identity(),
                expected = current.status.label(),
                "Record changed under us, leaving it to the other writer"
            );
        }
        Ok(stored)
    }

    fn destination(&self, record: &SubmissionRecord) -> Option<&Arc<dyn CircleChainClient>> {
        self.destinations.get(&record.message.destination)
    }

    fn count_submission(&self, record: &SubmissionRecord, outcome: &str) {
        self.metrics
            .submissions
            .with_label_values(&[
                record.message.origin.as_str(),
                record.message.destination.as_str(),
                outcome,
            ])
            .inc();
    }

    fn report_tracked(&self) -> DbResult<()> {
        let mut counts: BTreeMap<&'static str, i64> = SubmissionStatus::LABELS
            .iter()
            .map(|label| (*label, 0))
            .collect();
        for record in self.ledger.records_for_origin(&self.origin)? {
            *counts.entry(record.status.label()).or_default() += 1;
        }
        for (status, count) in counts {
            self.metrics
                .tracked_messages
                .with_label_values(&[self.origin.as_str(), status])
                .set(count);
        }
        Ok(())
    }

    async fn report_balance(&self) {
        let signer = self.origin_client.signer();
        match self.origin_client.signer_balance().await {
            Ok(wei) => {
                let balance = ethers::utils::format_ether(wei);
                info!(chain = %self.origin, wallet = ?signer, %balance, "Relayer balance");
                if let Ok(balance) = balance.parse::<f64>() {
                    self.metrics
                        .wallet_balance
                        .with_label_values(&[self.origin.as_str(), &fmt_bytes(signer.as_bytes())])
                        .set(balance);
                }
            }
            Err(err) => warn!(chain = %self.origin, error = %err, "Failed to read relayer balance"),
        }
    }
}
