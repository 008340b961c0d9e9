use switchboard_storage::StorageError;
use thiserror::Error;

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("stored directory is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("stored directory has unsupported version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("directory shard source must not be empty")]
    EmptyShardSource,
}
