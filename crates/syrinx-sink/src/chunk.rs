#![forbid(unsafe_code)]

use std::time::Duration;

use bytes::Bytes;

/// One encoded media fragment handed to the sink by the upstream pipeline.
///
/// The payload is opaque: the sink never parses media bytes.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub payload: Bytes,
    pub duration: Duration,
    /// Whether the fragment starts with an independently decodable frame.
    pub independent: bool,
    /// `false` marks an in-progress partial fragment not yet sealed.
    pub complete: bool,
}

impl MediaChunk {
    pub fn new(payload: impl Into<Bytes>, duration: Duration) -> Self {
        Self {
            payload: payload.into(),
            duration,
            independent: true,
            complete: true,
        }
    }

    pub fn with_independent(mut self, independent: bool) -> Self {
        self.independent = independent;
        self
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn byte_size(&self) -> u64 {
        self.payload.len() as u64
    }
}
