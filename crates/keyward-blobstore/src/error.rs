/// Errors raised while reading or writing vault backup blobs.
#[derive(thiserror::Error, Debug)]
pub enum BlobStoreError {
    /// No blob exists at the requested filename.
    #[error("blob not found: {0}")]
    NotFound(String),
    /// Errors during I/O operations, including the temp-write/rename step.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
