//! Block store adapter
//!
//! `BlockStore` is the boundary between the mirror engine and one physical
//! member. It has no state machine of its own: positioned read, positioned
//! write and a durable flush, each range-checked against the member's
//! capacity.

use crate::raw_io::RawFile;
use async_trait::async_trait;
use bytes::Bytes;
use mirrorio_common::{Error, IoRange, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Uniform interface over a single backing extent
///
/// Device failures are reported as [`Error::DiskIo`]; the mirror engine
/// attributes them to the member slot holding the store.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    /// Path or name identifying the backing extent
    fn identity(&self) -> &str;

    /// Capacity in bytes
    fn capacity(&self) -> u64;

    /// Natural I/O unit of the extent. Informational only: every store
    /// accepts byte-granular requests.
    fn alignment(&self) -> u64 {
        1
    }

    /// Read `length` bytes at `offset`
    async fn read(&self, offset: u64, length: usize) -> Result<Bytes>;

    /// Write `data` at `offset`. Not durable until [`BlockStore::flush`].
    async fn write(&self, offset: u64, data: Bytes) -> Result<()>;

    /// Force previously acknowledged writes to stable storage
    async fn flush(&self) -> Result<()>;
}

/// Store backed by an image file or block device
///
/// The handle is opened once and held until the store is dropped.
/// Blocking positioned I/O runs on the tokio blocking pool.
#[derive(Debug, Clone)]
pub struct FileStore {
    file: Arc<RawFile>,
}

impl FileStore {
    /// Open an existing image read-write
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = RawFile::open(path, false)?;
        debug!("Opened member image {} ({} bytes)", file.path(), file.size());
        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Create (or truncate) a zero-filled image of `size` bytes
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let file = RawFile::create(path, size)?;
        debug!("Created member image {} ({} bytes)", file.path(), file.size());
        Ok(Self {
            file: Arc::new(file),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RawFile) -> Result<T> + Send + 'static,
    {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || f(&file))
            .await
            .map_err(|e| Error::internal(format!("blocking I/O task failed: {e}")))?
    }
}

#[async_trait]
impl BlockStore for FileStore {
    fn identity(&self) -> &str {
        self.file.path()
    }

    fn capacity(&self) -> u64 {
        self.file.size()
    }

    async fn read(&self, offset: u64, length: usize) -> Result<Bytes> {
        IoRange::checked(offset, length as u64, self.capacity())?;
        self.blocking(move |file| {
            let mut buf = vec![0u8; length];
            file.read_at(offset, &mut buf)?;
            Ok(Bytes::from(buf))
        })
        .await
    }

    async fn write(&self, offset: u64, data: Bytes) -> Result<()> {
        IoRange::checked(offset, data.len() as u64, self.capacity())?;
        self.blocking(move |file| file.write_at(offset, &data)).await
    }

    async fn flush(&self) -> Result<()> {
        self.blocking(RawFile::sync_data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStore::create(dir.path().join("m0.img"), 10 * 1024).unwrap();
        assert_eq!(store.capacity(), 10 * 1024);

        let mut payload = vec![0u8; 3000];
        rand::thread_rng().fill_bytes(&mut payload);
        store.write(1234, Bytes::from(payload.clone())).await.unwrap();
        store.flush().await.unwrap();

        let read = store.read(1234, 3000).await.unwrap();
        assert_eq!(&read[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_file_store_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m1.img");
        {
            let store = FileStore::create(&path, 4096).unwrap();
            store.write(4095, Bytes::from_static(b"z")).await.unwrap();
            store.flush().await.unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.read(4095, 1).await.unwrap().as_ref(), b"z");
    }

    #[tokio::test]
    async fn test_file_store_out_of_range() {
        let dir = tempdir().unwrap();
        let store = FileStore::create(dir.path().join("m2.img"), 1024).unwrap();

        assert!(matches!(
            store.read(1000, 25).await,
            Err(Error::OutOfRange { capacity: 1024, .. })
        ));
        assert!(matches!(
            store.write(1024, Bytes::from_static(b"x")).await,
            Err(Error::OutOfRange { .. })
        ));
    }
}
