use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackLensError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Permission denied reading log source: {0}")]
    PermissionDenied(String),

    #[error("Cache not found: {0}")]
    CacheNotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown crash category tag: {0}")]
    UnknownCategory(String),

    #[error("Insight provider failed: {0}")]
    Insight(String),

    #[error("Read cancelled")]
    Cancelled,

    #[error("State lock poisoned")]
    StatePoisoned,
}

pub type Result<T> = std::result::Result<T, StackLensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert_with_context() {
        let err: StackLensError = std::io::Error::new(std::io::ErrorKind::NotFound, "dropbox").into();
        assert!(matches!(err, StackLensError::Io(_)));
        assert_eq!(err.to_string(), "IO error: dropbox");
    }

    #[test]
    fn test_unknown_category_message() {
        let err = StackLensError::UnknownCategory("netstats".to_string());
        assert_eq!(err.to_string(), "Unknown crash category tag: netstats");
    }
}
