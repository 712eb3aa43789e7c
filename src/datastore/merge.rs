//! Segment compaction
//!
//! Rewrites every sealed segment into a single new one, keeping only the
//! newest value per key. Runs on its own thread, scheduled by rollover, and
//! holds the engine's exclusive lock for the whole pass so puts and gets
//! simply wait it out.
//!
//! ## Failure Atomicity
//! The merged output is staged in `merge.tmp` and committed with a single
//! rename. Any error before the rename removes the temp file and leaves the
//! input segments and the index untouched; errors are logged and never
//! surfaced to concurrent operations. A crash after the rename but before
//! the inputs are unlinked converges on the next open: the merged segment
//! has the highest ID and recovery is last-write-wins in ascending ID order.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::sync::atomic::Ordering;

use crate::error::Result;

use super::engine::{Shared, State};
use super::record::Record;
use super::segment::{self, SegmentFile, MERGE_TMP_NAME};

/// Execute one merge pass against the engine's shared state
pub(super) fn run(shared: &Shared) {
    if shared.closed.load(Ordering::Acquire) {
        return;
    }
    if shared.merge_fail.load(Ordering::Acquire) {
        tracing::warn!("merge aborted by fault injection");
        return;
    }

    let mut state = shared.state.write();
    match merge_pass(shared, &mut state) {
        Ok(Some((inputs, keys))) => {
            tracing::info!(inputs, keys, "segments merged");
        }
        Ok(None) => {}
        Err(e) => {
            // The engine stays fully usable; the next rollover retries.
            tracing::warn!("merge failed: {}", e);
        }
    }
}

/// Merge all sealed segments into one; returns (input count, key count)
///
/// Returns `Ok(None)` when there is nothing to merge.
fn merge_pass(shared: &Shared, state: &mut State) -> Result<Option<(usize, usize)>> {
    let segments = segment::list_segments(&shared.dir)?;
    if segments.len() < 2 {
        return Ok(None);
    }

    let tmp_path = shared.dir.join(MERGE_TMP_NAME);
    let merged_offsets = match write_merged(&segments, &tmp_path) {
        Ok(offsets) => offsets,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    let merged_id = state.next_segment_id;
    let merged_path = segment::segment_path(&shared.dir, merged_id);
    if let Err(e) = fs::rename(&tmp_path, &merged_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    // Committed. Repoint survivors, then drop the inputs.
    let inputs: HashSet<u64> = segments.iter().map(|seg| seg.id).collect();
    let key_count = merged_offsets.len();
    state
        .index
        .retarget_merged(&inputs, &merged_offsets, merged_id);
    state.next_segment_id = merged_id + 1;

    for seg in &segments {
        if let Err(e) = fs::remove_file(&seg.path) {
            tracing::warn!(segment = seg.id, "failed to unlink merged input: {}", e);
        }
    }

    Ok(Some((segments.len(), key_count)))
}

/// Stage the merged output in `tmp_path`
///
/// Inputs are scanned newest-first with first-seen-wins semantics, so every
/// key keeps its most recent sealed value. Returns each key's offset in the
/// staged file.
fn write_merged(segments: &[SegmentFile], tmp_path: &std::path::Path) -> Result<HashMap<String, u64>> {
    let mut newest: HashMap<String, String> = HashMap::new();
    for seg in segments.iter().rev() {
        segment::scan_records(&seg.path, |record, _, _| {
            newest.entry(record.key).or_insert(record.value);
        })?;
    }

    let mut file = File::create(tmp_path)?;
    let mut offsets = HashMap::with_capacity(newest.len());
    let mut offset = 0u64;

    for (key, value) in newest {
        let record = Record::new(key, value);
        let encoded = record.encode();
        file.write_all(&encoded)?;
        offsets.insert(record.key, offset);
        offset += encoded.len() as u64;
    }

    // The inputs are only deleted once the merged copy is durable.
    file.sync_all()?;
    Ok(offsets)
}
