//! Write and flush fan-out
//!
//! Issues the same member operation to every target member in parallel and
//! joins them all before returning. A failing member never stops the
//! others from being attempted. Members that fail are marked Degraded
//! before the outcome is returned.

use crate::member::MemberTable;
use bytes::Bytes;
use futures::future::join_all;
use mirrorio_common::{Error, MemberId, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-member results of one fan-out
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    pub succeeded: Vec<MemberId>,
    pub failed: Vec<(MemberId, Error)>,
}

impl FanOutOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_members(&self) -> Vec<MemberId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }
}

#[derive(Clone, Copy, Debug)]
enum MemberOp {
    Write,
    Flush,
}

/// Write `data` at `offset` on every target member
///
/// Each member receives a clone of the same `Bytes` buffer, so every
/// member is handed an identical byte sequence.
pub async fn write_all(
    members: &Arc<MemberTable>,
    targets: &[MemberId],
    offset: u64,
    data: Bytes,
) -> FanOutOutcome {
    debug!(
        "Fan-out write offset={} len={} targets={}",
        offset,
        data.len(),
        targets.len()
    );
    run(members, targets, MemberOp::Write, offset, data).await
}

/// Flush every target member
pub async fn flush_all(members: &Arc<MemberTable>, targets: &[MemberId]) -> FanOutOutcome {
    debug!("Fan-out flush targets={}", targets.len());
    run(members, targets, MemberOp::Flush, 0, Bytes::new()).await
}

async fn run(
    members: &Arc<MemberTable>,
    targets: &[MemberId],
    op: MemberOp,
    offset: u64,
    data: Bytes,
) -> FanOutOutcome {
    // One task per member: tasks run to completion even if the awaiting
    // future is dropped.
    let tasks: Vec<_> = targets
        .iter()
        .map(|&id| {
            let members = Arc::clone(members);
            let data = data.clone();
            tokio::spawn(async move {
                let slot = members.slot(id)?;
                match op {
                    MemberOp::Write => slot.write(offset, data).await,
                    MemberOp::Flush => slot.flush().await,
                }
            })
        })
        .collect();

    let results = join_all(tasks).await;

    let mut outcome = FanOutOutcome::default();
    for (&id, res) in targets.iter().zip(results) {
        let res: Result<()> = res.unwrap_or_else(|e| {
            Err(Error::internal(format!("{op:?} task for {id} failed: {e}")))
        });
        match res {
            Ok(()) => outcome.succeeded.push(id),
            Err(e) => {
                warn!("{:?} failed on {}: {}", op, id, e);
                outcome.failed.push((id, e));
            }
        }
    }

    if !outcome.is_complete() {
        members.mark_degraded(&outcome.failed_members());
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorio_common::MemberState;
    use mirrorio_storage::{BlockStore, MemoryStore};

    fn members(stores: &[Arc<MemoryStore>]) -> Arc<MemberTable> {
        Arc::new(MemberTable::new(
            stores
                .iter()
                .map(|s| Some(Arc::clone(s) as Arc<dyn BlockStore>))
                .collect(),
        ))
    }

    #[tokio::test]
    async fn test_write_reaches_every_member() {
        let stores = [
            Arc::new(MemoryStore::new("mem0", 64)),
            Arc::new(MemoryStore::new("mem1", 64)),
        ];
        let table = members(&stores);

        let outcome = write_all(&table, &table.healthy(), 8, Bytes::from_static(b"fanout")).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.succeeded.len(), 2);
        for store in &stores {
            assert_eq!(store.contents(8, 6), b"fanout".to_vec());
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_others() {
        let stores = [
            Arc::new(MemoryStore::new("mem0", 64)),
            Arc::new(MemoryStore::new("mem1", 64)),
        ];
        stores[0].faults().fail_writes(true);
        let table = members(&stores);

        let outcome = write_all(&table, &table.healthy(), 0, Bytes::from_static(b"abc")).await;
        assert_eq!(outcome.failed_members(), vec![MemberId::new(0)]);
        assert_eq!(outcome.succeeded, vec![MemberId::new(1)]);
        assert_eq!(stores[1].contents(0, 3), b"abc".to_vec());
        assert_eq!(
            table.state(MemberId::new(0)).unwrap(),
            MemberState::Degraded
        );
    }

    #[tokio::test]
    async fn test_flush_failure_degrades() {
        let stores = [
            Arc::new(MemoryStore::new("mem0", 64)),
            Arc::new(MemoryStore::new("mem1", 64)),
        ];
        stores[1].faults().fail_flush(true);
        let table = members(&stores);

        let outcome = flush_all(&table, &table.healthy()).await;
        assert_eq!(outcome.failed_members(), vec![MemberId::new(1)]);
        assert_eq!(table.healthy(), vec![MemberId::new(0)]);
    }
}
