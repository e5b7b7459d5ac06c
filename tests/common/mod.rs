//! Shared test helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use univrs_store::{MemoryMedium, Result, StorageMedium};

/// A write observed by [`RecordingMedium`].
#[derive(Debug, Clone)]
pub struct Write {
    pub at: Instant,
    pub key: String,
    pub record: String,
}

/// Memory medium that counts every call and reports writes on a channel.
pub struct RecordingMedium {
    inner: MemoryMedium,
    reads: AtomicUsize,
    writes: AtomicUsize,
    removes: AtomicUsize,
    events: mpsc::UnboundedSender<Write>,
}

impl RecordingMedium {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Write>) {
        Self::wrapping(MemoryMedium::new())
    }

    pub fn wrapping(inner: MemoryMedium) -> (Arc<Self>, mpsc::UnboundedReceiver<Write>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let medium = Arc::new(Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            events,
        });
        (medium, receiver)
    }

    pub fn memory(&self) -> &MemoryMedium {
        &self.inner
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.reads() + self.writes() + self.removes()
    }
}

#[async_trait]
impl StorageMedium for RecordingMedium {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(Write {
            at: Instant::now(),
            key: key.to_string(),
            record: value.to_string(),
        });
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_item(key).await
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

/// Install a test log subscriber once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
