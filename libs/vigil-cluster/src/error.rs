use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("connection failed: {0}")]
    Connection(String),
    /// Only the local wait is abandoned; the remote process is not
    /// confirmed killed.
    #[error("command timed out after {seconds}s")]
    CommandTimeout { seconds: u64 },
    #[error("submission failed: {0}")]
    Submission(String),
    #[error("status query failed: {0}")]
    Query(String),
    #[error("unexpected scheduler output: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ClusterError {
    fn from(e: std::io::Error) -> Self {
        ClusterError::Io(e.to_string())
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
