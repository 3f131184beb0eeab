use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{mapref::entry::Entry, DashMap};

use ortege_core::{ChainName, MessageIdentity, SubmissionRecord, SubmissionStatus};

use super::{DbResult, SubmissionLedger};

/// A ledger that lives as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: DashMap<MessageIdentity, (u64, SubmissionRecord)>,
    next_sequence: AtomicU64,
}

impl InMemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubmissionLedger for InMemoryLedger {
    fn get(&self, id: &MessageIdentity) -> DbResult<Option<SubmissionRecord>> {
        Ok(self.records.get(id).map(|entry| entry.1.clone()))
    }

    fn insert_if_absent(&self, record: SubmissionRecord) -> DbResult<bool> {
        match self.records.entry(record.identity()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
                vacant.insert((sequence, record));
                Ok(true)
            }
        }
    }

    fn compare_and_set(
        &self,
        expected: &SubmissionStatus,
        updated: SubmissionRecord,
    ) -> DbResult<bool> {
        match self.records.get_mut(&updated.identity()) {
            Some(mut entry) if entry.1.status == *expected => {
                entry.1 = updated;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn records_for_origin(&self, origin: &ChainName) -> DbResult<Vec<SubmissionRecord>> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| &entry.key().origin == origin)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|(sequence, _)| *sequence);
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::super::test_utils::record;
    use super::*;

    #[test]
    fn insert_is_at_most_once() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.insert_if_absent(record("ethereum", 1)).unwrap());

        let mut again = record("ethereum", 1);
        again.attempts = 9;
        assert!(!ledger.insert_if_absent(again).unwrap());
        assert_eq!(
            ledger.get(&record("ethereum", 1).identity()).unwrap().unwrap().attempts,
            0
        );
    }

    #[test]
    fn compare_and_set_requires_expected_status() {
        let ledger = InMemoryLedger::new();
        let original = record("ethereum", 1);
        ledger.insert_if_absent(original.clone()).unwrap();

        let failed = original.transitioned(
            SubmissionStatus::Failed {
                reason: "gave up".into(),
            },
            original.first_seen_at,
        );
        let wrong_expectation = SubmissionStatus::Submitted { tx_hash: None };
        assert!(!ledger
            .compare_and_set(&wrong_expectation, failed.clone())
            .unwrap());
        assert!(ledger
            .compare_and_set(&SubmissionStatus::AttestationPending, failed.clone())
            .unwrap());
        assert!(!ledger
            .compare_and_set(&SubmissionStatus::AttestationPending, failed)
            .unwrap());
    }

    #[test]
    fn compare_and_set_on_unknown_record_does_nothing() {
        let ledger = InMemoryLedger::new();
        assert!(!ledger
            .compare_and_set(&SubmissionStatus::AttestationPending, record("ethereum", 1))
            .unwrap());
        assert!(ledger.get(&record("ethereum", 1).identity()).unwrap().is_none());
    }

    #[test]
    fn records_are_partitioned_by_origin_in_insertion_order() {
        let ledger = InMemoryLedger::new();
        for nonce in [5, 3, 9] {
            ledger.insert_if_absent(record("ethereum", nonce)).unwrap();
        }
        ledger.insert_if_absent(record("avalanche", 1)).unwrap();

        let nonces: Vec<_> = ledger
            .records_for_origin(&"ethereum".into())
            .unwrap()
            .iter()
            .map(|r| r.message.nonce)
            .collect();
        assert_eq!(nonces, vec![5, 3, 9]);
        assert_eq!(
            ledger.records_for_origin(&"avalanche".into()).unwrap().len(),
            1
        );
    }

    #[test]
    fn concurrent_transitions_from_the_same_state_succeed_once() {
        let ledger = Arc::new(InMemoryLedger::new());
        let original = record("ethereum", 1);
        ledger.insert_if_absent(original.clone()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                let original = original.clone();
                std::thread::spawn(move || {
                    let updated = original.transitioned(
                        SubmissionStatus::Failed {
                            reason: format!("writer {i}"),
                        },
                        original.first_seen_at,
                    );
                    ledger
                        .compare_and_set(&SubmissionStatus::AttestationPending, updated)
                        .unwrap()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
