//! Error type for `staffroom-store`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("date/time parse error: {0}")]
    DateParse(String),

    /// A row violates an invariant the store itself maintains.
    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
