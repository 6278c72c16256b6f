use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the execution cache.
///
/// Functions return `anyhow::Result`; callers that need to branch on the kind
/// of failure use `err.downcast_ref::<CacheError>()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("No existing output for '{label}', and no executable specified")]
    NoExecutableAvailable { label: String },

    #[error("Content hash unavailable for entity {entity}: {reason}")]
    HashUnavailable { entity: String, reason: String },

    #[error("Path does not exist: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid archive at {}: {reason}", path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Can not restore '{}': neither a file nor a directory", path.display())]
    CorruptEntry { path: PathBuf },

    #[error("Required environment variable is not set: {key}")]
    MissingEnvironment { key: String },

    #[error("Invalid data directory {}: {reason}", path.display())]
    InvalidDataDir { path: PathBuf, reason: String },

    #[error("Configuration does not specify an executable for label '{label}'")]
    UnknownLabel { label: String },
}

/// Returns the cache error carried by `err`, if any.
pub fn classify(err: &anyhow::Error) -> Option<&CacheError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CacheError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_through_context() {
        let err: anyhow::Result<()> = Err(CacheError::NoExecutableAvailable {
            label: "diff".to_string(),
        })
        .context("sandbox run failed");

        let err = err.unwrap_err();
        assert_eq!(
            classify(&err),
            Some(&CacheError::NoExecutableAvailable {
                label: "diff".to_string()
            })
        );
    }

    #[test]
    fn test_display_mentions_path() {
        let err = CacheError::NotFound {
            path: PathBuf::from("/tmp/missing.tar.gz"),
        };
        assert!(err.to_string().contains("/tmp/missing.tar.gz"));
    }
}
