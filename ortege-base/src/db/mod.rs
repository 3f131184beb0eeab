//! Storage of submission records.
//!
//! A ledger is the only state shared between the per-chain relay tasks. Every
//! status change goes through `compare_and_set` so two writers can never both
//! move a record out of the same state.

use auto_impl::auto_impl;

use ortege_core::{ChainName, MessageIdentity, SubmissionRecord, SubmissionStatus};

pub use error::*;
pub use memory::*;
pub use rocks::*;

mod error;
mod memory;
mod rocks;

/// Persistent (or not) store of submission records.
#[auto_impl(&, Box, Arc)]
pub trait SubmissionLedger: Send + Sync + std::fmt::Debug {
    /// Fetch the record of a message.
    fn get(&self, id: &MessageIdentity) -> DbResult<Option<SubmissionRecord>>;

    /// Store `record` unless a record with the same identity exists.
    /// Returns whether the record was stored.
    fn insert_if_absent(&self, record: SubmissionRecord) -> DbResult<bool>;

    /// Replace the stored record with `updated` if the stored status is still
    /// `expected`. Returns whether the replacement happened.
    fn compare_and_set(
        &self,
        expected: &SubmissionStatus,
        updated: SubmissionRecord,
    ) -> DbResult<bool>;

    /// Every record of messages sent from `origin`, in the order they were
    /// first inserted.
    fn records_for_origin(&self, origin: &ChainName) -> DbResult<Vec<SubmissionRecord>>;
}
