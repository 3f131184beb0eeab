use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prometheus::IntCounterVec;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use ortege_core::{Attestation, SubmissionRecord};

use super::{AttestationError, AttestationService, AttestationStatus};
use crate::settings::AttestationConf;

/// How long the relayer keeps asking for the attestation of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationBudget {
    /// Attestation requests made before giving up
    pub max_attempts: u32,
    /// Time since the message was discovered after which it is given up on
    pub max_wait: Duration,
}

impl AttestationBudget {
    fn exhausted(&self, attempts: u32, waited: Duration) -> bool {
        attempts >= self.max_attempts || waited >= self.max_wait
    }
}

/// Result of asking for the attestation of a tracked message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The message is attested
    Attested(Attestation),
    /// Not attested yet, ask again next sweep
    Pending,
    /// The service could not be asked; the record stays as it is
    Unavailable(String),
    /// The budget for this message is spent
    GiveUp(String),
}

/// Asks the attestation service about tracked messages within a
/// per-message budget, retrying transient failures with exponential backoff.
#[derive(Debug)]
pub struct AttestationFetcher {
    service: Arc<dyn AttestationService>,
    budget: AttestationBudget,
    transient_retries: u32,
    retry_base_delay: Duration,
    polls: IntCounterVec,
}

impl AttestationFetcher {
    /// Fetcher using `service`, counting requests in `polls`.
    pub fn new(
        service: Arc<dyn AttestationService>,
        budget: AttestationBudget,
        transient_retries: u32,
        retry_base_delay: Duration,
        polls: IntCounterVec,
    ) -> Self {
        Self {
            service,
            budget,
            transient_retries,
            retry_base_delay,
            polls,
        }
    }

    /// Fetcher configured from the relayer settings.
    pub fn from_conf(
        service: Arc<dyn AttestationService>,
        conf: &AttestationConf,
        polls: IntCounterVec,
    ) -> Self {
        Self::new(
            service,
            AttestationBudget {
                max_attempts: conf.max_attempts,
                max_wait: conf.max_wait,
            },
            conf.transient_retries,
            conf.retry_base_delay,
            polls,
        )
    }

    /// Ask for the attestation of `record`'s message. `record.attempts` is the
    /// number of requests already made for it.
    #[instrument(skip_all, fields(message = %record.identity(), attempts = record.attempts))]
    pub async fn fetch(&self, record: &SubmissionRecord, now: DateTime<Utc>) -> FetchOutcome {
        let waited = (now - record.first_seen_at).to_std().unwrap_or_default();
        if self.budget.exhausted(record.attempts, waited) {
            return self.outcome(record, self.give_up(record.attempts, waited));
        }

        let status = match self.request(record).await {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, "Attestation service unavailable");
                return self.outcome(record, FetchOutcome::Unavailable(err.to_string()));
            }
        };

        let outcome = match status {
            AttestationStatus::Complete(signature) => FetchOutcome::Attested(Attestation {
                message_hash: record.message.message_hash,
                signature,
                fetched_at: now,
            }),
            AttestationStatus::Pending => {
                let attempts = record.attempts + 1;
                if self.budget.exhausted(attempts, waited) {
                    self.give_up(attempts, waited)
                } else {
                    FetchOutcome::Pending
                }
            }
        };
        self.outcome(record, outcome)
    }

    async fn request(&self, record: &SubmissionRecord) -> Result<AttestationStatus, AttestationError> {
        let mut retry = 0;
        loop {
            match self.service.attestation(record.message.message_hash).await {
                Err(err) if err.is_transient() && retry < self.transient_retries => {
                    let delay = self.retry_base_delay.saturating_mul(1u32 << retry.min(16));
                    debug!(error = %err, retry, ?delay, "Retrying attestation request");
                    sleep(delay).await;
                    retry += 1;
                }
                result => return result,
            }
        }
    }

    fn give_up(&self, attempts: u32, waited: Duration) -> FetchOutcome {
        FetchOutcome::GiveUp(format!(
            "no attestation after {attempts} attempts over {}s",
            waited.as_secs()
        ))
    }

    fn outcome(&self, record: &SubmissionRecord, outcome: FetchOutcome) -> FetchOutcome {
        let label = match &outcome {
            FetchOutcome::Attested(_) => "attested",
            FetchOutcome::Pending => "pending",
            FetchOutcome::Unavailable(_) => "unavailable",
            FetchOutcome::GiveUp(_) => "gave_up",
        };
        self.polls
            .with_label_values(&[record.message.origin.as_str(), label])
            .inc();
        outcome
    }
}
