/// DB Error type
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    /// Rocks DB Error
    #[error("{0}")]
    RockError(#[from] rocksdb::Error),
    /// A stored value could not be (de)serialized
    #[error("Failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The lock guarding writes was poisoned by a panicking writer
    #[error("Ledger lock poisoned")]
    LockPoisoned,
    /// The database could not be opened
    #[error("{0}")]
    Other(String),
}

/// Result type for DB operations
pub type DbResult<T> = std::result::Result<T, DbError>;
