//! Storage engine
//!
//! The coordinating component of the datastore: opens and recovers a data
//! directory, appends records to the active log, serves point reads through
//! the reader pool, seals the active log into segments when it outgrows the
//! configured size, and schedules background merges.
//!
//! ## Concurrency Model
//! - One engine-level `RwLock` guards the mutable state (active log handle,
//!   offsets, key directory). `put` and the merge pass take it exclusively;
//!   `get` takes it shared and only long enough to resolve a key to a file
//!   offset.
//! - Actual disk reads run on the reader pool, off the lock.
//! - Merges run on their own thread and serialize behind the same lock.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

use crate::error::{RelayError, Result};

use super::index::{KeyDir, Location};
use super::merge;
use super::record::Record;
use super::reader_pool::ReaderPool;
use super::segment::{self, ACTIVE_LOG_NAME};

/// State guarded by the engine lock
pub(super) struct State {
    /// Append handle for the active log; `None` once close has begun
    pub(super) active: Option<File>,

    /// Byte offset where the next record lands in the active log
    pub(super) active_offset: u64,

    /// Next segment ID to allocate (rollover and merge both draw from it)
    pub(super) next_segment_id: u64,

    /// Key → location directory
    pub(super) index: KeyDir,
}

/// State shared between the engine handle, reader pool and merge threads
pub(super) struct Shared {
    pub(super) dir: PathBuf,
    pub(super) segment_size: u64,
    pub(super) state: RwLock<State>,
    pub(super) readers: ReaderPool,
    pub(super) closed: AtomicBool,
    pub(super) merge_fail: AtomicBool,
}

/// Append-only, log-structured key-value store
pub struct Engine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Open (or create) a datastore in `dir`
    ///
    /// `segment_size == 0` disables rollover: everything stays in the active
    /// log. Recovery scans the sealed segments in ascending numeric ID order
    /// (later segments overwrite earlier index entries) and the active log
    /// last, since its records are newer than anything sealed. A file cut
    /// mid-record fails the open with a corruption error.
    pub fn open(dir: impl AsRef<Path>, segment_size: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let active_path = dir.join(ACTIVE_LOG_NAME);
        let active = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)?;

        let mut index = KeyDir::new();
        let mut next_segment_id = 0;

        let segments = segment::list_segments(&dir)?;
        for seg in &segments {
            segment::scan_records(&seg.path, |record, offset, _| {
                index.insert(record.key, Location::Segment { id: seg.id, offset });
            })?;
            next_segment_id = seg.id + 1;
        }

        let mut active_offset = 0;
        segment::scan_records(&active_path, |record, offset, len| {
            index.insert(record.key, Location::Active { offset });
            active_offset = offset + len as u64;
        })?;

        tracing::info!(
            dir = %dir.display(),
            segments = segments.len(),
            keys = index.len(),
            "datastore opened"
        );

        let shared = Arc::new(Shared {
            dir,
            segment_size,
            state: RwLock::new(State {
                active: Some(active),
                active_offset,
                next_segment_id,
                index,
            }),
            readers: ReaderPool::new(0)?,
            closed: AtomicBool::new(false),
            merge_fail: AtomicBool::new(false),
        });

        Ok(Self { shared })
    }

    /// Store `value` under `key`
    ///
    /// The record is written to the active log before this returns; no fsync
    /// is issued, but a crash leaves at worst a truncated final record, which
    /// recovery treats as corruption of the tail only.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(RelayError::ShuttingDown);
        }

        let record = Record::new(key, value);
        let encoded = record.encode();

        let mut state = self.shared.state.write();

        if self.shared.segment_size > 0
            && state.active_offset + encoded.len() as u64 > self.shared.segment_size
        {
            self.roll_over(&mut state)?;
        }

        let active = state.active.as_mut().ok_or(RelayError::ShuttingDown)?;
        active.write_all(&encoded)?;

        let offset = state.active_offset;
        state.index.insert(key.to_string(), Location::Active { offset });
        state.active_offset += encoded.len() as u64;

        Ok(())
    }

    /// Fetch the latest value stored under `key`
    ///
    /// The fast path resolves the key under the shared lock but reads off
    /// it. That read can race a rollover (the active log gets renamed and
    /// its offsets restart) or a merge (an input segment gets unlinked); both
    /// cases are detected (wrong key at the offset, short file, missing
    /// file) and retried against the repointed index. If the races persist,
    /// the final attempt holds the shared lock across the read, which
    /// excludes rollover and merge entirely.
    pub fn get(&self, key: &str) -> Result<String> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(RelayError::ShuttingDown);
        }

        for _ in 0..2 {
            let location = {
                let state = self.shared.state.read();
                state.index.get(key)
            }
            .ok_or(RelayError::KeyNotFound)?;

            let (path, offset) = self.resolve(location);
            match self.shared.readers.read(path, offset) {
                Ok(Some(record)) if record.key == key => return Ok(record.value),
                Ok(_) => continue,
                Err(RelayError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }

        let state = self.shared.state.read();
        let location = state.index.get(key).ok_or(RelayError::KeyNotFound)?;
        let (path, offset) = self.resolve(location);
        match self.shared.readers.read(path, offset)? {
            Some(record) if record.key == key => Ok(record.value),
            _ => Err(RelayError::Corruption(format!(
                "index points at a missing record for key {:?}",
                key
            ))),
        }
    }

    /// Total bytes on disk: active log plus every sealed segment
    pub fn size(&self) -> Result<u64> {
        let mut total = fs::metadata(self.shared.dir.join(ACTIVE_LOG_NAME))
            .map(|m| m.len())
            .unwrap_or(0);

        for seg in segment::list_segments(&self.shared.dir)? {
            match fs::metadata(&seg.path) {
                Ok(meta) => total += meta.len(),
                // Unlinked by a concurrent merge.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(total)
    }

    /// Shut the engine down
    ///
    /// Stops the reader pool (waiting for every worker to exit), then closes
    /// the active log. Idempotent; operations issued afterwards fail with a
    /// shutting-down error.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shared.readers.close();

        let active = self.shared.state.write().active.take();
        if let Some(file) = active {
            file.sync_all()?;
        }

        tracing::info!(dir = %self.shared.dir.display(), "datastore closed");
        Ok(())
    }

    /// Force subsequent merge passes to abort before doing any work
    ///
    /// Fault-injection hook for exercising merge atomicity.
    #[doc(hidden)]
    pub fn inject_merge_failure(&self, enabled: bool) {
        self.shared.merge_fail.store(enabled, Ordering::Release);
    }

    /// Seal the active log into a segment and start a fresh one
    ///
    /// Caller holds the write lock.
    fn roll_over(&self, state: &mut State) -> Result<()> {
        let sealed_id = state.next_segment_id;
        let active_path = self.shared.dir.join(ACTIVE_LOG_NAME);
        let sealed_path = segment::segment_path(&self.shared.dir, sealed_id);

        // Close the handle before the rename so the sealed file is never
        // written through a stale descriptor.
        let active = state.active.take().ok_or(RelayError::ShuttingDown)?;
        drop(active);

        fs::rename(&active_path, &sealed_path)?;

        // Offsets survive the rename, only the file name changed.
        state.index.seal_active(sealed_id);

        let fresh = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)?;
        state.active = Some(fresh);
        state.active_offset = 0;
        state.next_segment_id = sealed_id + 1;

        tracing::debug!(segment = sealed_id, "active log sealed");

        self.schedule_merge();
        Ok(())
    }

    /// Kick off one asynchronous merge pass
    fn schedule_merge(&self) {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("relaykv-merge".to_string())
            .spawn(move || merge::run(&shared));

        if let Err(e) = spawned {
            tracing::warn!("failed to spawn merge thread: {}", e);
        }
    }

    /// Turn an index location into a concrete file path and offset
    fn resolve(&self, location: Location) -> (PathBuf, u64) {
        match location {
            Location::Active { offset } => (self.shared.dir.join(ACTIVE_LOG_NAME), offset),
            Location::Segment { id, offset } => {
                (segment::segment_path(&self.shared.dir, id), offset)
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
