#![forbid(unsafe_code)]

//! In-memory storage mock for tests.
//!
//! Records every adapter call in arrival order and supports scripted,
//! one-shot failures so callers can exercise their error paths. After a
//! scripted failure fires, subsequent calls succeed again (the
//! adapter-not-poisoned contract).

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Storage, StorageError, StorageResult};

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    StoreInit { name: String },
    StoreSegment { name: String, byte_size: u64 },
    StoreManifests { names: Vec<String> },
    RemoveSegments { names: Vec<String> },
}

/// Shared-state mock adapter. Clones observe the same state, so a test can
/// keep one handle while the sink owns another.
#[derive(Clone, Default)]
pub struct MockStorage {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    ops: Vec<MockOp>,

    init_calls: usize,
    segment_calls: usize,
    manifest_calls: usize,

    // 1-based call index at which the matching operation fails once.
    fail_init_at: Option<usize>,
    fail_segment_at: Option<usize>,
    fail_manifest_at: Option<usize>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th `store_init` call (1-based), once.
    pub fn fail_nth_init_store(&self, n: usize) {
        self.inner.lock().fail_init_at = Some(n);
    }

    /// Fail the `n`-th `store_segment` call (1-based), once.
    pub fn fail_nth_segment_store(&self, n: usize) {
        self.inner.lock().fail_segment_at = Some(n);
    }

    /// Fail the `n`-th `store_manifests` call (1-based), once.
    pub fn fail_nth_manifest_store(&self, n: usize) {
        self.inner.lock().fail_manifest_at = Some(n);
    }

    /// All recorded operations, in arrival order.
    pub fn ops(&self) -> Vec<MockOp> {
        self.inner.lock().ops.clone()
    }

    pub fn object(&self, name: &str) -> Option<Bytes> {
        self.inner.lock().objects.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().objects.contains_key(name)
    }

    /// A stored manifest decoded as UTF-8.
    pub fn manifest_text(&self, name: &str) -> Option<String> {
        self.object(name)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    pub fn segment_store_count(&self) -> usize {
        self.inner.lock().segment_calls
    }

    pub fn manifest_store_count(&self) -> usize {
        self.inner.lock().manifest_calls
    }
}

fn should_fail(trigger: &mut Option<usize>, call_index: usize) -> bool {
    if *trigger == Some(call_index) {
        *trigger = None;
        true
    } else {
        false
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn store_init(&mut self, name: &str, data: Bytes) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.init_calls += 1;
        let call = state.init_calls;
        if should_fail(&mut state.fail_init_at, call) {
            return Err(StorageError::Failed(format!("injected init failure: {name}")));
        }
        state.ops.push(MockOp::StoreInit {
            name: name.to_string(),
        });
        state.objects.insert(name.to_string(), data);
        Ok(())
    }

    async fn store_segment(&mut self, name: &str, data: Bytes) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.segment_calls += 1;
        let call = state.segment_calls;
        if should_fail(&mut state.fail_segment_at, call) {
            return Err(StorageError::Failed(format!(
                "injected segment failure: {name}"
            )));
        }
        state.ops.push(MockOp::StoreSegment {
            name: name.to_string(),
            byte_size: data.len() as u64,
        });
        state.objects.insert(name.to_string(), data);
        Ok(())
    }

    async fn store_manifests(&mut self, manifests: &[(String, String)]) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.manifest_calls += 1;
        let call = state.manifest_calls;
        if should_fail(&mut state.fail_manifest_at, call) {
            return Err(StorageError::Failed("injected manifest failure".into()));
        }
        state.ops.push(MockOp::StoreManifests {
            names: manifests.iter().map(|(name, _)| name.clone()).collect(),
        });
        for (name, content) in manifests {
            state
                .objects
                .insert(name.clone(), Bytes::from(content.clone().into_bytes()));
        }
        Ok(())
    }

    async fn remove_segments(&mut self, names: &[String]) -> StorageResult<()> {
        let mut state = self.inner.lock();
        state.ops.push(MockOp::RemoveSegments {
            names: names.to_vec(),
        });
        for name in names {
            // Best-effort: a missing blob is not an error.
            state.objects.remove(name);
        }
        Ok(())
    }
}
