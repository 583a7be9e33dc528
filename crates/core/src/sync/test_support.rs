//! Storage doubles shared by the sync tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

use crate::errors::{Result, StorageError};
use crate::storage::{
    MemoryStorageArea, StorageArea, StorageAreaKind, StorageChanges, StorageItems,
};

/// Memory-backed area whose reads and writes can be made to fail.
pub(crate) struct FlakyStorageArea {
    inner: MemoryStorageArea,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyStorageArea {
    pub(crate) fn new(kind: StorageAreaKind) -> Self {
        Self::with_items(kind, StorageItems::new())
    }

    pub(crate) fn with_items(kind: StorageAreaKind, items: StorageItems) -> Self {
        Self {
            inner: MemoryStorageArea::with_items(kind, items),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls.
    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> StorageItems {
        self.inner.snapshot()
    }
}

#[async_trait]
impl StorageArea for FlakyStorageArea {
    fn kind(&self) -> StorageAreaKind {
        self.inner.kind()
    }

    async fn get(&self, keys: &[&str]) -> Result<StorageItems> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::read_failed(self.kind(), "injected read failure").into());
        }
        self.inner.get(keys).await
    }

    async fn set(&self, items: StorageItems) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::write_failed(self.kind(), "injected write failure").into());
        }
        self.inner.set(items).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::write_failed(self.kind(), "injected write failure").into());
        }
        self.inner.remove(keys).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.inner.subscribe()
    }
}

/// Memory-backed area that, once gating is on, holds every read result until
/// the test releases it. Reads take their snapshot before waiting, so several
/// held readers all observe the same state.
pub(crate) struct GatedStorageArea {
    inner: MemoryStorageArea,
    gating: AtomicBool,
    gate: Semaphore,
    entered: AtomicUsize,
}

impl GatedStorageArea {
    pub(crate) fn new(kind: StorageAreaKind) -> Self {
        Self {
            inner: MemoryStorageArea::new(kind),
            gating: AtomicBool::new(false),
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
        }
    }

    pub(crate) fn start_gating(&self) {
        self.gating.store(true, Ordering::SeqCst);
    }

    /// Lets `count` held reads complete.
    pub(crate) fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Number of reads that reached the gate.
    pub(crate) fn reads_entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` reads are held at the gate.
    pub(crate) async fn wait_for_reads(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.reads_entered() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("reads never reached the gate");
    }

    pub(crate) fn snapshot(&self) -> StorageItems {
        self.inner.snapshot()
    }
}

#[async_trait]
impl StorageArea for GatedStorageArea {
    fn kind(&self) -> StorageAreaKind {
        self.inner.kind()
    }

    async fn get(&self, keys: &[&str]) -> Result<StorageItems> {
        let items = self.inner.get(keys).await?;
        if self.gating.load(Ordering::SeqCst) {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StorageError::Internal(e.to_string()))?;
            permit.forget();
        }
        Ok(items)
    }

    async fn set(&self, items: StorageItems) -> Result<()> {
        self.inner.set(items).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        self.inner.remove(keys).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.inner.subscribe()
    }
}
