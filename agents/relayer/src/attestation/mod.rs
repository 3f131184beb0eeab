//! Getting attestations for bridged messages.

use std::fmt::Debug;

use async_trait::async_trait;
use ethers::types::{Bytes, H256};

pub use circle::*;
pub use fetcher::*;

mod circle;
mod fetcher;

/// What the attestation service knows about a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttestationStatus {
    /// Not attested yet
    Pending,
    /// Attested; the attestation to submit with the message
    Complete(Bytes),
}

/// Errors from talking to the attestation service.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    /// The request never got a response
    #[error("Attestation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service failed to answer, worth retrying
    #[error("Attestation service answered with status {0}")]
    Server(u16),
    /// The service refused the request
    #[error("Attestation service rejected the request with status {0}")]
    Rejected(u16),
    /// The response could not be understood
    #[error("Unexpected attestation response: {0}")]
    Malformed(String),
}

impl AttestationError {
    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server(_))
    }
}

/// An external service attesting bridged messages, keyed by message hash.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttestationService: Send + Sync + Debug {
    /// Current attestation state of the message with `message_hash`.
    async fn attestation(&self, message_hash: H256) -> Result<AttestationStatus, AttestationError>;
}
