//! Consistency verification
//!
//! Reads the same region from every healthy member and compares the bytes.
//! Large regions are processed in windows so memory stays bounded. The
//! verifier only reads; it takes no range lock, so a verify racing with
//! writes reports a snapshot that may include in-flight differences.

use crate::member::MemberTable;
use bytes::Bytes;
use futures::future::try_join_all;
use mirrorio_common::{DivergenceReport, IoRange, MemberByte, MemberId, Mismatch, Result};
use tracing::{debug, warn};

/// How much of a divergence to report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VerifyMode {
    /// Stop at the end of the first run of differing bytes
    #[default]
    FirstMismatch,
    /// Enumerate every run of differing bytes
    AllRanges,
}

/// Read `[offset, offset + length)` from each target member concurrently
pub async fn read_all(
    members: &MemberTable,
    targets: &[MemberId],
    offset: u64,
    length: usize,
) -> Result<Vec<(MemberId, Bytes)>> {
    let reads = targets.iter().map(|&id| async move {
        let data = members.slot(id)?.read(offset, length).await?;
        Ok::<_, mirrorio_common::Error>((id, data))
    });
    try_join_all(reads).await
}

/// Compare buffers read from the same region starting at `offset`
///
/// Returns `None` when every buffer holds the same bytes.
pub fn compare(
    offset: u64,
    buffers: &[(MemberId, Bytes)],
    mode: VerifyMode,
) -> Option<DivergenceReport> {
    let (_, reference) = buffers.first()?;
    let others = &buffers[1..];
    if others.iter().all(|(_, b)| b == reference) {
        return None;
    }

    let len = buffers.iter().map(|(_, b)| b.len()).min().unwrap_or(0);
    let differs = |i: usize| others.iter().any(|(_, b)| b[i] != reference[i]);

    let mut first: Option<Mismatch> = None;
    let mut ranges: Vec<IoRange> = Vec::new();
    let mut run_start: Option<usize> = None;

    for i in 0..len {
        match (differs(i), run_start) {
            (true, None) => {
                if first.is_none() {
                    first = Some(Mismatch {
                        offset: offset + i as u64,
                        bytes: buffers
                            .iter()
                            .map(|(member, b)| MemberByte {
                                member: *member,
                                value: b[i],
                            })
                            .collect(),
                    });
                }
                run_start = Some(i);
            }
            (false, Some(start)) => {
                ranges.push(IoRange::new(offset + start as u64, (i - start) as u64));
                run_start = None;
                if mode == VerifyMode::FirstMismatch {
                    break;
                }
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        ranges.push(IoRange::new(offset + start as u64, (len - start) as u64));
    }

    first.map(|first| DivergenceReport {
        offset,
        length: len as u64,
        members: buffers.iter().map(|(id, _)| *id).collect(),
        first,
        ranges,
    })
}

/// Verify `range` across `targets`, `chunk` bytes at a time
pub async fn verify_region(
    members: &MemberTable,
    targets: &[MemberId],
    range: IoRange,
    chunk: usize,
    mode: VerifyMode,
) -> Result<Option<DivergenceReport>> {
    if targets.len() < 2 {
        debug!(
            "Verify skipped: {} healthy member(s), nothing to compare",
            targets.len()
        );
        return Ok(None);
    }

    let mut report: Option<DivergenceReport> = None;
    let mut pos = range.offset;
    while pos < range.end() {
        let len = chunk.min((range.end() - pos) as usize);
        let buffers = read_all(members, targets, pos, len).await?;
        let window_end = pos + len as u64;

        let Some(window) = compare(pos, &buffers, mode) else {
            if mode == VerifyMode::FirstMismatch && report.is_some() {
                break;
            }
            pos = window_end;
            continue;
        };

        if let Some(acc) = report.as_mut() {
            let mut runs = window.ranges.into_iter();
            if mode == VerifyMode::FirstMismatch {
                // Only a run continuing across the window edge belongs to
                // the first divergence.
                match runs.next() {
                    Some(run) if run.offset == pos && ends_at(acc, pos) => {
                        push_range(&mut acc.ranges, run);
                    }
                    _ => break,
                }
            } else {
                for run in runs {
                    push_range(&mut acc.ranges, run);
                }
            }
        } else {
            report = Some(window);
        }

        if mode == VerifyMode::FirstMismatch
            && let Some(acc) = report.as_ref()
            && !ends_at(acc, window_end)
        {
            break;
        }
        pos = window_end;
    }

    Ok(report.map(|mut r| {
        r.offset = range.offset;
        r.length = range.length;
        warn!(
            "Divergence in [{}, {}): first at {}, {} bytes differ",
            range.offset,
            range.end(),
            r.first.offset,
            r.mismatched_bytes()
        );
        r
    }))
}

fn ends_at(report: &DivergenceReport, pos: u64) -> bool {
    report.ranges.last().is_some_and(|r| r.end() == pos)
}

fn push_range(ranges: &mut Vec<IoRange>, run: IoRange) {
    match ranges.last_mut() {
        Some(last) if last.end() == run.offset => last.length += run.length,
        _ => ranges.push(run),
    }
}
