use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{Options, DB as Rocks};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use ortege_core::{ChainName, MessageIdentity, SubmissionRecord, SubmissionStatus};

use super::{DbError, DbResult, SubmissionLedger};

const RECORD_PREFIX: &[u8] = b"record/";
const NEXT_SEQUENCE_KEY: &[u8] = b"meta/next_sequence";

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    sequence: u64,
    record: SubmissionRecord,
}

/// A ledger persisted in RocksDB so a restarted relayer resumes where it
/// stopped.
///
/// Writes are serialized by a process-local lock; a database directory must
/// not be shared between processes.
#[derive(Clone)]
pub struct RocksLedger {
    db: Arc<Rocks>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for RocksLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RocksLedger {{ path: {:?} }}", self.db.path())
    }
}

impl RocksLedger {
    /// Opens db at `db_path` and creates if missing
    #[instrument(err)]
    pub fn open(db_path: &Path) -> DbResult<Self> {
        match db_path.is_dir() {
            true => info!(path = %db_path.display(), "Opening existing db"),
            false => info!(path = %db_path.display(), "Creating db"),
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = Rocks::open(&opts, db_path)?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn origin_prefix(origin: &ChainName) -> Vec<u8> {
        let mut key = RECORD_PREFIX.to_vec();
        key.extend_from_slice(origin.as_str().as_bytes());
        key.push(b'/');
        key
    }

    fn record_key(id: &MessageIdentity) -> Vec<u8> {
        let mut key = Self::origin_prefix(&id.origin);
        key.extend_from_slice(id.source_tx_hash.as_bytes());
        key.extend_from_slice(&id.nonce.to_be_bytes());
        key
    }

    fn retrieve(&self, key: &[u8]) -> DbResult<Option<StoredRecord>> {
        self.db
            .get(key)?
            .map(|raw| serde_json::from_slice(&raw))
            .transpose()
            .map_err(Into::into)
    }

    fn store(&self, key: &[u8], stored: &StoredRecord) -> DbResult<()> {
        Ok(self.db.put(key, serde_json::to_vec(stored)?)?)
    }

    fn next_sequence(&self) -> DbResult<u64> {
        let current = match self.db.get(NEXT_SEQUENCE_KEY)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| DbError::Other("corrupt sequence counter".to_owned()))?;
                u64::from_be_bytes(bytes)
            }
            None => 0,
        };
        self.db.put(NEXT_SEQUENCE_KEY, (current + 1).to_be_bytes())?;
        Ok(current)
    }
}

impl SubmissionLedger for RocksLedger {
    fn get(&self, id: &MessageIdentity) -> DbResult<Option<SubmissionRecord>> {
        Ok(self
            .retrieve(&Self::record_key(id))?
            .map(|stored| stored.record))
    }

    fn insert_if_absent(&self, record: SubmissionRecord) -> DbResult<bool> {
        let _guard = self.write_lock.lock().map_err(|_| DbError::LockPoisoned)?;
        let key = Self::record_key(&record.identity());
        if self.db.get(&key)?.is_some() {
            return Ok(false);
        }
        let sequence = self.next_sequence()?;
        self.store(&key, &StoredRecord { sequence, record })?;
        Ok(true)
    }

    fn compare_and_set(
        &self,
        expected: &SubmissionStatus,
        updated: SubmissionRecord,
    ) -> DbResult<bool> {
        let _guard = self.write_lock.lock().map_err(|_| DbError::LockPoisoned)?;
        let key = Self::record_key(&updated.identity());
        match self.retrieve(&key)? {
            Some(stored) if stored.record.status == *expected => {
                self.store(
                    &key,
                    &StoredRecord {
                        sequence: stored.sequence,
                        record: updated,
                    },
                )?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn records_for_origin(&self, origin: &ChainName) -> DbResult<Vec<SubmissionRecord>> {
        let prefix = Self::origin_prefix(origin);
        let mut records = vec![];
        for item in self.db.prefix_iterator(&prefix) {
            let (key, value) = item?;
            // the iterator runs past the prefix when no prefix extractor is set
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(serde_json::from_slice::<StoredRecord>(&value)?);
        }
        records.sort_by_key(|stored| stored.sequence);
        Ok(records.into_iter().map(|stored| stored.record).collect())
    }
}
