use thiserror::Error;
use tokio::task::JoinError;

/// Failures that abort a whole scan. Problems with individual artifacts are logged and skipped
///  instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("artifact task reported a problem: {0:#}")]
    Producer(anyhow::Error),
    #[error("artifact task was aborted: {0}")]
    ProducerAborted(#[from] JoinError),
    #[error("artifact channel closed without end marker")]
    Protocol,
    #[error("graph store failure: {0:#}")]
    Store(anyhow::Error),
    #[error("cannot list changed artifacts: {0:#}")]
    Listing(anyhow::Error),
    #[error("invalid configuration: {0:#}")]
    Configuration(anyhow::Error),
}
