#![forbid(unsafe_code)]

//! `syrinx-storage`
//!
//! Storage primitives for syrinx.
//!
//! Provides the [`Storage`] contract a sink commits its output through:
//! named binary blobs (init headers, media segments) and named text blobs
//! (manifests), plus best-effort removal of evicted segments.
//!
//! Implementations:
//! - [`FsStorage`] — filesystem-backed; manifests are replaced atomically
//!   via temp + rename.
//! - [`MockStorage`] — in-memory, records every call in order and supports
//!   scripted failures (tests / `test-utils` feature).

mod adapter;
mod error;
mod fs;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use adapter::Storage;
pub use error::{StorageError, StorageResult};
pub use fs::FsStorage;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockOp, MockStorage};
