//! S3-compatible object storage for media bytes.

pub mod client;
pub mod error;

pub use client::{MediaStore, StorageConfig};
pub use error::{StorageError, StorageResult};
