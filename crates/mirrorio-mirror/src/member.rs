//! Member slots and their health state
//!
//! Each slot owns one block store for the lifetime of the mirror set. The
//! Healthy/Degraded state of every slot lives in a single table guarded by
//! one lock, separate from the per-range write lock.

use bytes::Bytes;
use mirrorio_common::{Error, MISSING_MEMBER, MemberId, MemberState, Result};
use mirrorio_storage::{BlockStore, IoStats, IoStatsSnapshot};
use parking_lot::RwLock;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One position in the mirror
pub struct MemberSlot {
    id: MemberId,
    identity: String,
    store: Option<Arc<dyn BlockStore>>,
    stats: IoStats,
}

impl MemberSlot {
    fn new(id: MemberId, store: Option<Arc<dyn BlockStore>>) -> Self {
        let identity = store
            .as_ref()
            .map_or_else(|| MISSING_MEMBER.to_string(), |s| s.identity().to_string());
        Self {
            id,
            identity,
            store,
            stats: IoStats::default(),
        }
    }

    pub const fn id(&self) -> MemberId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub const fn is_present(&self) -> bool {
        self.store.is_some()
    }

    pub fn capacity(&self) -> Option<u64> {
        self.store.as_ref().map(|s| s.capacity())
    }

    pub const fn stats(&self) -> &IoStats {
        &self.stats
    }

    fn store(&self) -> Result<&Arc<dyn BlockStore>> {
        self.store.as_ref().ok_or_else(|| Error::Io {
            member: self.id,
            source: io::Error::new(io::ErrorKind::NotFound, "member is missing"),
        })
    }

    /// Read from this member's store
    pub async fn read(&self, offset: u64, length: usize) -> Result<Bytes> {
        match self.store()?.read(offset, length).await {
            Ok(data) => {
                self.stats.record_read(data.len() as u64);
                Ok(data)
            }
            Err(e) => {
                self.stats.record_read_error();
                Err(e.on_member(self.id))
            }
        }
    }

    /// Write to this member's store
    pub async fn write(&self, offset: u64, data: Bytes) -> Result<()> {
        let len = data.len() as u64;
        match self.store()?.write(offset, data).await {
            Ok(()) => {
                self.stats.record_write(len);
                Ok(())
            }
            Err(e) => {
                self.stats.record_write_error();
                Err(e.on_member(self.id))
            }
        }
    }

    /// Flush this member's store
    pub async fn flush(&self) -> Result<()> {
        match self.store()?.flush().await {
            Ok(()) => {
                self.stats.record_flush();
                Ok(())
            }
            Err(e) => {
                self.stats.record_flush_error();
                Err(e.on_member(self.id))
            }
        }
    }
}

/// Status of one member, as reported by [`MemberTable::status`]
#[derive(Clone, Debug, Serialize)]
pub struct MemberStatus {
    pub id: MemberId,
    pub identity: String,
    pub present: bool,
    pub state: MemberState,
    pub stats: IoStatsSnapshot,
}

/// All member slots of a mirror set and their states
pub struct MemberTable {
    slots: Vec<Arc<MemberSlot>>,
    states: RwLock<Vec<MemberState>>,
}

impl MemberTable {
    /// Build the table; absent members start Degraded
    pub fn new(stores: Vec<Option<Arc<dyn BlockStore>>>) -> Self {
        let slots: Vec<_> = stores
            .into_iter()
            .enumerate()
            .map(|(i, store)| Arc::new(MemberSlot::new(MemberId::new(i), store)))
            .collect();
        let states = slots
            .iter()
            .map(|s| {
                if s.is_present() {
                    MemberState::Healthy
                } else {
                    MemberState::Degraded
                }
            })
            .collect();
        Self {
            slots,
            states: RwLock::new(states),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Arc<MemberSlot>] {
        &self.slots
    }

    pub fn slot(&self, id: MemberId) -> Result<&Arc<MemberSlot>> {
        self.slots.get(id.index()).ok_or(Error::MemberNotFound(id))
    }

    pub fn state(&self, id: MemberId) -> Result<MemberState> {
        self.states
            .read()
            .get(id.index())
            .copied()
            .ok_or(Error::MemberNotFound(id))
    }

    pub fn states(&self) -> Vec<MemberState> {
        self.states.read().clone()
    }

    /// Healthy members in slot order
    pub fn healthy(&self) -> Vec<MemberId> {
        self.states
            .read()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_healthy())
            .map(|(i, _)| MemberId::new(i))
            .collect()
    }

    /// Transition members to Degraded
    ///
    /// Already degraded members are left as they are.
    pub fn mark_degraded(&self, failed: &[MemberId]) {
        let mut states = self.states.write();
        for id in failed {
            if let Some(state) = states.get_mut(id.index())
                && state.is_healthy()
            {
                *state = MemberState::Degraded;
                warn!(
                    "{} ({}) marked degraded",
                    id,
                    self.slots[id.index()].identity()
                );
            }
        }
        if !states.iter().any(MemberState::is_healthy) {
            error!("No healthy member remains, mirror is unavailable");
        }
    }

    /// Clear a Degraded marker after an external repair
    pub fn mark_healthy(&self, id: MemberId) -> Result<()> {
        let slot = self.slot(id)?;
        if !slot.is_present() {
            return Err(Error::invalid_argument(format!(
                "{id} is missing and cannot be marked healthy"
            )));
        }
        let mut states = self.states.write();
        if !states[id.index()].is_healthy() {
            states[id.index()] = MemberState::Healthy;
            info!("{} ({}) marked healthy after repair", id, slot.identity());
        }
        Ok(())
    }

    pub fn status(&self) -> Vec<MemberStatus> {
        let states = self.states.read();
        self.slots
            .iter()
            .zip(states.iter())
            .map(|(slot, state)| MemberStatus {
                id: slot.id(),
                identity: slot.identity().to_string(),
                present: slot.is_present(),
                state: *state,
                stats: slot.stats().snapshot(),
            })
            .collect()
    }
}
