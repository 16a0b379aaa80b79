//! Mirror set
//!
//! The virtual block device: byte-addressable read / write / flush over
//! `[0, capacity)`, where every member holds the full image at the same
//! offsets.

use crate::fanout;
use crate::member::{MemberStatus, MemberTable};
use crate::range_lock::RangeLock;
use crate::selector::ReadSelector;
use crate::verify::{self, VerifyMode};
use bytes::Bytes;
use mirrorio_common::{
    DivergenceReport, Error, IoRange, MemberId, MemberSpec, MemberState, MirrorConfig,
    MirrorHealth, ReadPolicy, Result,
};
use mirrorio_storage::{BlockStore, FileStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Engine settings taken from a [`MirrorConfig`]
#[derive(Clone, Debug)]
pub struct MirrorOptions {
    pub block_size: u64,
    pub read_policy: ReadPolicy,
    pub primary: usize,
    pub verify_chunk_size: usize,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self::from(&MirrorConfig::default())
    }
}

impl From<&MirrorConfig> for MirrorOptions {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            block_size: config.block_size,
            read_policy: config.read_policy,
            primary: config.primary,
            verify_chunk_size: config.verify_chunk_size,
        }
    }
}

/// Snapshot of a mirror set's state
#[derive(Clone, Debug, Serialize)]
pub struct MirrorStatus {
    pub capacity: u64,
    pub block_size: u64,
    pub read_policy: String,
    pub health: MirrorHealth,
    pub members: Vec<MemberStatus>,
}

/// A mirrored virtual block device
pub struct MirrorSet {
    members: Arc<MemberTable>,
    capacity: u64,
    block_size: u64,
    selector: ReadSelector,
    locks: Arc<RangeLock>,
    verify_chunk_size: usize,
}

impl MirrorSet {
    /// Assemble a mirror from member stores in slot order
    ///
    /// `None` marks an absent member, which starts Degraded. The logical
    /// capacity is the smallest present member capacity rounded down to a
    /// multiple of the block size; bytes past it on larger members are not
    /// addressable.
    pub fn assemble(
        stores: Vec<Option<Arc<dyn BlockStore>>>,
        options: &MirrorOptions,
    ) -> Result<Self> {
        if stores.len() < 2 {
            return Err(Error::configuration(format!(
                "a mirror needs at least 2 members, got {}",
                stores.len()
            )));
        }
        if options.block_size == 0 || options.verify_chunk_size == 0 {
            return Err(Error::configuration(
                "block_size and verify_chunk_size must be non-zero",
            ));
        }
        if options.primary >= stores.len() {
            return Err(Error::configuration(format!(
                "primary {} is not a member index",
                options.primary
            )));
        }

        let smallest = stores
            .iter()
            .flatten()
            .map(|s| s.capacity())
            .min()
            .ok_or_else(|| Error::configuration("every member is missing"))?;
        let capacity = smallest / options.block_size * options.block_size;
        if capacity == 0 {
            return Err(Error::configuration(format!(
                "smallest member ({smallest} bytes) holds no full block of {} bytes",
                options.block_size
            )));
        }

        for store in stores.iter().flatten() {
            if store.capacity() != capacity {
                debug!(
                    "{} has {} bytes, {} beyond the mirror capacity are unused",
                    store.identity(),
                    store.capacity(),
                    store.capacity() - capacity
                );
            }
        }

        let members = Arc::new(MemberTable::new(stores));
        let health = MirrorHealth::from_states(&members.states());
        info!(
            "Assembled mirror: {} members, capacity {} bytes, block size {}, read policy {}",
            members.len(),
            capacity,
            options.block_size,
            options.read_policy
        );
        if let MirrorHealth::Degraded(n) = health {
            warn!("Mirror is running degraded: {} member(s) missing", n);
        }

        Ok(Self {
            members,
            capacity,
            block_size: options.block_size,
            selector: ReadSelector::new(options.read_policy, MemberId::new(options.primary)),
            locks: Arc::new(RangeLock::new()),
            verify_chunk_size: options.verify_chunk_size,
        })
    }

    /// Open the member images named by `config` and assemble them
    pub fn open(config: &MirrorConfig) -> Result<Self> {
        config.validate()?;
        let stores = config
            .members()
            .map(|spec| match spec {
                MemberSpec::Path(path) => {
                    FileStore::open(&path).map(|s| Some(Arc::new(s) as Arc<dyn BlockStore>))
                }
                MemberSpec::Missing => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::assemble(stores, &MirrorOptions::from(config))
    }

    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub const fn read_policy(&self) -> ReadPolicy {
        self.selector.policy()
    }

    pub fn member_state(&self, member: MemberId) -> Result<MemberState> {
        self.members.state(member)
    }

    pub fn healthy_members(&self) -> Vec<MemberId> {
        self.members.healthy()
    }

    fn healthy_or_unavailable(&self) -> Result<Vec<MemberId>> {
        let healthy = self.members.healthy();
        if healthy.is_empty() {
            return Err(Error::MirrorUnavailable);
        }
        Ok(healthy)
    }

    /// Write `data` at `offset` on every healthy member
    ///
    /// Succeeds only if every targeted member took the write. Members that
    /// fail are marked Degraded and reported in
    /// [`Error::PartialWriteFailure`]; members that succeeded keep the new
    /// bytes. The write is not durable until [`MirrorSet::flush`].
    pub async fn write(&self, offset: u64, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        let range = IoRange::checked(offset, data.len() as u64, self.capacity)?;
        if range.is_empty() {
            return Ok(());
        }

        let guard = self.locks.lock(range).await;
        let targets = self.healthy_or_unavailable()?;
        let members = Arc::clone(&self.members);

        // The fan-out owns the range guard and runs to completion even if
        // this future is dropped.
        let outcome = tokio::spawn(async move {
            let outcome = fanout::write_all(&members, &targets, offset, data).await;
            drop(guard);
            outcome
        })
        .await
        .map_err(|e| Error::internal(format!("write fan-out task failed: {e}")))?;

        if outcome.is_complete() {
            Ok(())
        } else {
            Err(Error::PartialWriteFailure {
                failed: outcome.failed_members(),
            })
        }
    }

    /// Read `length` bytes at `offset`
    ///
    /// Degraded members are never read. Under `verify-all` every healthy
    /// member is read and any difference fails the read with
    /// [`Error::MirrorDivergence`].
    pub async fn read(&self, offset: u64, length: usize) -> Result<Bytes> {
        let range = IoRange::checked(offset, length as u64, self.capacity)?;
        if range.is_empty() {
            return Ok(Bytes::new());
        }

        if self.selector.policy() == ReadPolicy::VerifyAll {
            return self.read_verified(range, length).await;
        }

        let healthy = self.healthy_or_unavailable()?;
        let member = self.selector.select(&healthy).ok_or(Error::MirrorUnavailable)?;
        debug!("Read offset={} len={} from {}", offset, length, member);
        self.members.slot(member)?.read(offset, length).await
    }

    async fn read_verified(&self, range: IoRange, length: usize) -> Result<Bytes> {
        // Locked so an in-flight write is not mistaken for divergence.
        let _guard = self.locks.lock(range).await;
        let healthy = self.healthy_or_unavailable()?;
        let buffers = verify::read_all(&self.members, &healthy, range.offset, length).await?;

        if let Some(report) = verify::compare(range.offset, &buffers, VerifyMode::FirstMismatch) {
            let first = report.first_range();
            warn!(
                "Verify-all read of [{}, {}) diverges at {}",
                range.offset,
                range.end(),
                first.offset
            );
            return Err(Error::MirrorDivergence {
                offset: first.offset,
                length: first.length,
            });
        }

        let preferred = self.selector.select(&healthy);
        buffers
            .into_iter()
            .find(|(id, _)| Some(*id) == preferred)
            .map(|(_, data)| data)
            .ok_or_else(|| Error::internal("selected member missing from verified read"))
    }

    /// Flush every healthy member to stable storage
    ///
    /// Members that fail to sync are marked Degraded and reported in
    /// [`Error::PartialFlushFailure`]. Members that did sync stay synced;
    /// there is no atomic commit across members.
    pub async fn flush(&self) -> Result<()> {
        let targets = self.healthy_or_unavailable()?;
        let members = Arc::clone(&self.members);
        let outcome = tokio::spawn(async move { fanout::flush_all(&members, &targets).await })
            .await
            .map_err(|e| Error::internal(format!("flush fan-out task failed: {e}")))?;

        if outcome.is_complete() {
            Ok(())
        } else {
            Err(Error::PartialFlushFailure {
                failed: outcome.failed_members(),
            })
        }
    }

    /// Compare `[offset, offset + length)` across all healthy members
    ///
    /// Returns the first divergence, or `None` when the members agree.
    /// Read-only and unlocked: concurrent writes may show up as transient
    /// differences.
    pub async fn verify(&self, offset: u64, length: u64) -> Result<Option<DivergenceReport>> {
        self.verify_with(offset, length, VerifyMode::FirstMismatch)
            .await
    }

    /// [`MirrorSet::verify`] with an explicit reporting mode
    pub async fn verify_with(
        &self,
        offset: u64,
        length: u64,
        mode: VerifyMode,
    ) -> Result<Option<DivergenceReport>> {
        let range = IoRange::checked(offset, length, self.capacity)?;
        let healthy = self.healthy_or_unavailable()?;
        verify::verify_region(
            &self.members,
            &healthy,
            range,
            self.verify_chunk_size,
            mode,
        )
        .await
    }

    /// Read directly from one member, bypassing read selection
    ///
    /// Works on Degraded members too, so tooling can inspect them.
    pub async fn member_read(&self, member: MemberId, offset: u64, length: usize) -> Result<Bytes> {
        IoRange::checked(offset, length as u64, self.capacity)?;
        self.members.slot(member)?.read(offset, length).await
    }

    /// Zero-fill the whole device on every member, then flush
    ///
    /// Refuses to run while any member is Degraded.
    pub async fn initialize(&self) -> Result<()> {
        if self.members.healthy().len() != self.members.len() {
            return Err(Error::invalid_argument(
                "cannot initialize a mirror with degraded members",
            ));
        }

        let chunk = self.verify_chunk_size as u64 / self.block_size * self.block_size;
        let step = chunk.max(self.block_size);
        let zeros = Bytes::from(vec![0u8; step as usize]);
        let mut offset = 0;
        while offset < self.capacity {
            let len = step.min(self.capacity - offset) as usize;
            self.write(offset, zeros.slice(..len)).await?;
            offset += len as u64;
            debug!("Initialized {}/{} bytes", offset, self.capacity);
        }
        self.flush().await?;
        info!(
            "Initialized mirror: {} bytes zeroed on {} members",
            self.capacity,
            self.members.len()
        );
        Ok(())
    }

    /// Clear a Degraded marker after an external repair
    ///
    /// No data is copied; the caller must have resynchronised the member.
    pub fn mark_repaired(&self, member: MemberId) -> Result<()> {
        self.members.mark_healthy(member)
    }

    pub fn status(&self) -> MirrorStatus {
        MirrorStatus {
            capacity: self.capacity,
            block_size: self.block_size,
            read_policy: self.selector.policy().to_string(),
            health: MirrorHealth::from_states(&self.members.states()),
            members: self.members.status(),
        }
    }

    /// Flush healthy members and release the member handles
    pub async fn close(self) -> Result<()> {
        let result = match self.flush().await {
            Err(Error::MirrorUnavailable) => Ok(()),
            other => other,
        };
        if let Err(e) = &result {
            error!("Flush on close failed: {}", e);
        }
        info!("Closed mirror ({} members)", self.members.len());
        result
    }
}
