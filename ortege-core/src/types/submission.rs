use chrono::{DateTime, Utc};
use ethers_core::types::Bytes;
use serde::{Deserialize, Serialize};

use crate::{BridgedMessage, MessageIdentity, H256};

/// A signed statement from the attestation service that a message was
/// observed on its origin chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Hash of the message this attestation is for
    pub message_hash: H256,
    /// Opaque attestation bytes passed to the destination transmitter
    pub signature: Bytes,
    /// When the attestation was retrieved
    pub fetched_at: DateTime<Utc>,
}

/// Where a tracked message is in its delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SubmissionStatus {
    /// The attestation service has not attested the message yet
    AttestationPending,
    /// An attestation is cached and waiting to be submitted
    AttestationAvailable {
        /// The cached attestation
        attestation: Attestation,
    },
    /// A submission transaction was sent but has not been seen to land.
    /// The attestation is kept so the message can be resubmitted if the
    /// transaction never confirms.
    SubmittedPendingConfirmation {
        /// Hash of the submission transaction
        tx_hash: H256,
        /// When the transaction was sent
        submitted_at: DateTime<Utc>,
        /// The attestation that was submitted
        attestation: Attestation,
    },
    /// The message was received on the destination chain
    Submitted {
        /// The transaction that delivered it, if this relayer delivered it
        tx_hash: Option<H256>,
    },
    /// The message will not be delivered by this relayer
    Failed {
        /// Why the message was given up on
        reason: String,
    },
}

impl SubmissionStatus {
    /// Every value `label` can return.
    pub const LABELS: [&'static str; 5] = [
        "attestation_pending",
        "attestation_available",
        "submitted_pending_confirmation",
        "submitted",
        "failed",
    ];

    /// Terminal states are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted { .. } | Self::Failed { .. })
    }

    /// Short name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        self.into()
    }
}

/// Everything the relayer knows about one bridged message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// The message being delivered
    pub message: BridgedMessage,
    /// Current state
    pub status: SubmissionStatus,
    /// Number of attestation requests made so far
    pub attempts: u32,
    /// When the message was first correlated
    pub first_seen_at: DateTime<Utc>,
    /// When the last transition attempt happened
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl SubmissionRecord {
    /// A fresh record for a newly discovered message.
    pub fn new(message: BridgedMessage, now: DateTime<Utc>) -> Self {
        Self {
            message,
            status: SubmissionStatus::AttestationPending,
            attempts: 0,
            first_seen_at: now,
            last_attempt_at: None,
        }
    }

    /// The deduplication key of the tracked message.
    pub fn identity(&self) -> MessageIdentity {
        self.message.identity()
    }

    /// A copy of this record in `status`, stamped as attempted at `now`.
    pub fn transitioned(&self, status: SubmissionStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            last_attempt_at: Some(now),
            ..self.clone()
        }
    }
}
