//! In-memory block store
//!
//! Backs dry runs of the harness and the engine's tests. A [`FaultPlan`]
//! makes reads, writes or flushes fail on demand, and [`MemoryStore::corrupt`]
//! changes bytes out-of-band to simulate silent divergence.

use crate::store::BlockStore;
use async_trait::async_trait;
use bytes::Bytes;
use mirrorio_common::{IoRange, Result};
use parking_lot::{Mutex, RwLock};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Switchable failures for a [`MemoryStore`]
#[derive(Debug, Default)]
pub struct FaultPlan {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_flush: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl FaultPlan {
    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_flush(&self, on: bool) {
        self.fail_flush.store(on, Ordering::SeqCst);
    }

    /// Delay every write by `delay` before it lands
    pub fn delay_writes(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(io::Error::other(format!("injected {what} failure")).into());
        }
        Ok(())
    }
}

/// Block store held in a byte vector
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    data: RwLock<Vec<u8>>,
    faults: Arc<FaultPlan>,
    flushed: RwLock<Vec<u8>>,
}

impl MemoryStore {
    /// Create a zero-filled store of `size` bytes
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(vec![0u8; size]),
            faults: Arc::new(FaultPlan::default()),
            flushed: RwLock::new(vec![0u8; size]),
        }
    }

    /// Handle on the store's fault switches
    pub fn faults(&self) -> Arc<FaultPlan> {
        Arc::clone(&self.faults)
    }

    /// Overwrite bytes directly, bypassing faults and the mirror
    pub fn corrupt(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.write();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Copy of the current contents of `[offset, offset + length)`
    pub fn contents(&self, offset: usize, length: usize) -> Vec<u8> {
        self.data.read()[offset..offset + length].to_vec()
    }

    /// Copy of the contents as of the last successful flush
    pub fn durable_contents(&self, offset: usize, length: usize) -> Vec<u8> {
        self.flushed.read()[offset..offset + length].to_vec()
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    fn identity(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> u64 {
        self.data.read().len() as u64
    }

    async fn read(&self, offset: u64, length: usize) -> Result<Bytes> {
        let range = IoRange::checked(offset, length as u64, self.capacity())?;
        FaultPlan::check(&self.faults.fail_reads, "read")?;

        let data = self.data.read();
        Ok(Bytes::copy_from_slice(
            &data[range.offset as usize..range.end() as usize],
        ))
    }

    async fn write(&self, offset: u64, payload: Bytes) -> Result<()> {
        let range = IoRange::checked(offset, payload.len() as u64, self.capacity())?;
        FaultPlan::check(&self.faults.fail_writes, "write")?;

        let delay = *self.faults.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut data = self.data.write();
        data[range.offset as usize..range.end() as usize].copy_from_slice(&payload);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        FaultPlan::check(&self.faults.fail_flush, "flush")?;
        let snapshot = self.data.read().clone();
        *self.flushed.write() = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorio_common::Error;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryStore::new("mem0", 4096);
        store
            .write(10, Bytes::from_static(b"mirror"))
            .await
            .unwrap();
        assert_eq!(store.read(10, 6).await.unwrap().as_ref(), b"mirror");
        assert_eq!(store.contents(9, 1), vec![0]);
    }

    #[tokio::test]
    async fn test_flush_makes_durable() {
        let store = MemoryStore::new("mem0", 16);
        store.write(0, Bytes::from_static(b"ab")).await.unwrap();
        assert_eq!(store.durable_contents(0, 2), vec![0, 0]);
        store.flush().await.unwrap();
        assert_eq!(store.durable_contents(0, 2), b"ab".to_vec());
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new("mem1", 16);
        let faults = store.faults();

        faults.fail_writes(true);
        let err = store.write(0, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::DiskIo(_)));
        assert_eq!(store.contents(0, 1), vec![0]);

        faults.fail_writes(false);
        faults.fail_flush(true);
        store.write(0, Bytes::from_static(b"x")).await.unwrap();
        assert!(store.flush().await.is_err());

        faults.fail_reads(true);
        assert!(store.read(0, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_bypasses_faults() {
        let store = MemoryStore::new("mem2", 8);
        store.faults().fail_writes(true);
        store.corrupt(7, &[0xEE]);
        assert_eq!(store.contents(7, 1), vec![0xEE]);
    }
}
