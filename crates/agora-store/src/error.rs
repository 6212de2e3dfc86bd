//! Chat store errors.

use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures of the chat store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("record not found")]
    NotFound,

    /// RocksDB rejected the operation.
    #[error("rocksdb: {0}")]
    Database(String),

    /// The opened database lacks a column family of the schema.
    #[error("column family {0} is missing")]
    MissingColumnFamily(String),

    /// A record could not be encoded as CBOR.
    #[error("failed to encode record: {0}")]
    Encode(String),

    /// A stored record could not be decoded.
    #[error("failed to decode record: {0}")]
    Decode(String),

    /// The persisted message-id counter is not an 8-byte big-endian integer.
    #[error("message sequence is corrupt ({len} bytes)")]
    CorruptSequence {
        /// Length of the stored value.
        len: usize,
    },
}
