use thiserror::Error;

/// Errors returned by the ResultStore and its durable table.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The run key is absent from the cache. A run with zero cached entries
    /// is not an error.
    #[error("no cached results for run {0}")]
    NoCachedResults(String),

    /// `remove_run` on a run the durable table has never seen.
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("malformed run id {run_id:?}: {reason}")]
    MalformedRunId { run_id: String, reason: String },

    #[error("unknown sort field {0:?}")]
    UnknownSortField(String),

    #[error("unknown sort order {0:?}")]
    UnknownSortOrder(String),

    /// The record's own run id or URL disagrees with the key it is stored
    /// under.
    #[error("record for {record_run}/{record_url} cannot be stored as {run_id}/{url}")]
    RecordMismatch {
        run_id: String,
        url: String,
        record_run: String,
        record_url: String,
    },

    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Failure in the storage engine (I/O, corruption), passed through.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
