//! Shared test utilities.
//!
//! This module provides a pre-wired in-memory environment (remote store,
//! sync adapter, state store, file cache in a temp dir) plus small helpers
//! for tests that have to wait on background commits.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::cache::LocalCache;
use crate::core::state::StateStore;
use crate::remote::memory::MemoryStore;
use crate::sync::SyncAdapter;

/// Installs a test-writer tracing subscriber once per process.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .try_init();
}

/// Everything a pipeline or session test needs, wired together.
///
/// The temp directory backing the cache lives as long as the env.
pub struct TestEnv {
    pub memory: Arc<MemoryStore>,
    pub sync: Arc<SyncAdapter>,
    pub store: Arc<StateStore>,
    pub cache: Arc<LocalCache>,
    _dir: tempfile::TempDir,
}

impl TestEnv {
    /// An env whose remote store applies writes immediately.
    pub fn new() -> Self {
        Self::with_memory(Arc::new(MemoryStore::new()))
    }

    /// An env whose remote store holds writes until
    /// [`MemoryStore::resume`] is called, keeping ids in their temporary
    /// phase for the duration of a test.
    pub fn paused() -> Self {
        Self::with_memory(Arc::new(MemoryStore::paused()))
    }

    fn with_memory(memory: Arc<MemoryStore>) -> Self {
        init_test_tracing();
        let dir = tempfile::tempdir().expect("create temp cache dir");
        let cache = Arc::new(LocalCache::new(dir.path()).expect("init cache"));
        let sync = Arc::new(SyncAdapter::new(Arc::<MemoryStore>::clone(&memory)));
        Self {
            memory,
            sync,
            store: Arc::new(StateStore::new()),
            cache,
            _dir: dir,
        }
    }
}

/// Polls a condition until it holds, panicking after two seconds. Used to
/// observe background commit tasks without sleeping a fixed amount.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
