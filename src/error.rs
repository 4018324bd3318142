//! Error types for the import pipeline.

use thiserror::Error;

/// Fatal errors raised by the writer and database layers.
///
/// Malformed tag values never surface here: the classifier degrades
/// them silently. Missing geometry is reported as `None` by the
/// geometry builder and simply yields no rows.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("database connection failed: {0}")]
    ConnectionFailed(#[source] tokio_postgres::Error),

    #[error("query failed: {0}")]
    QueryFailed(#[source] tokio_postgres::Error),

    #[error("COPY protocol error: {0}")]
    CopyProtocol(#[source] tokio_postgres::Error),

    #[error("cannot apply diffs unless in slim mode")]
    RequiresSlimMode,
}

pub type Result<T> = std::result::Result<T, ImportError>;
