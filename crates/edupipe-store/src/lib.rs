//! PostgREST record store adapter.
//!
//! Production-grade client with:
//! - HTTP client tuning (pooling, timeouts)
//! - Built-in backoff on transient failures
//! - Request counters and latency histograms
//! - Atomic conditional claim and failure-count bump

pub mod client;
pub mod error;
pub mod videos;

pub use client::{PostgrestClient, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use videos::{NewVideo, RecordStore, VideoRepo};
