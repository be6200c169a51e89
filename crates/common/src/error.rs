// Error taxonomy shared by every engine operation.

use thiserror::Error;

use crate::path::PathError;

/// Errors surfaced by the versioning engine's public operations.
///
/// Quota pressure is handled internally by the tiered recovery protocol and
/// only escalates here as [`VersionError::StorageExhausted`] once every tier
/// has failed. The in-memory replicated state is never lost on any of these
/// errors.
#[derive(Debug, Error)]
pub enum VersionError {
    /// Widget hookup could not complete; the path is left unbound.
    #[error("failed to bind `{path}` to widget: {reason}")]
    Binding { path: String, reason: String },

    /// Restore or compare named a snapshot id that is not in the history.
    #[error("snapshot `{0}` not found")]
    SnapshotNotFound(String),

    /// Serialized snapshot state failed to decode; live state left untouched.
    #[error("snapshot `{id}` is corrupt: {reason}")]
    CorruptSnapshot { id: String, reason: String },

    /// Every quota-recovery tier failed; the durable medium is out of room.
    #[error("durable storage exhausted after all recovery tiers")]
    StorageExhausted,

    /// The durable medium failed for a reason other than capacity.
    #[error("storage backend error: {0}")]
    Storage(String),

    #[error(transparent)]
    Path(#[from] PathError),
}

impl VersionError {
    /// Whether the caller can retry after freeing durable space.
    pub fn is_storage_exhausted(&self) -> bool {
        matches!(self, Self::StorageExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_error_names_path_and_reason() {
        let error = VersionError::Binding {
            path: "notes.tex".to_string(),
            reason: "widget rejected content".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "failed to bind `notes.tex` to widget: widget rejected content"
        );
    }

    #[test]
    fn storage_exhausted_is_distinguishable() {
        assert!(VersionError::StorageExhausted.is_storage_exhausted());
        assert!(!VersionError::SnapshotNotFound("x".into()).is_storage_exhausted());
    }

    #[test]
    fn path_errors_convert() {
        let error: VersionError = PathError::Empty.into();
        assert!(matches!(error, VersionError::Path(PathError::Empty)));
    }
}
