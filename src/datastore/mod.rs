//! Datastore Module
//!
//! Append-only, log-structured key-value storage with an in-memory index.
//!
//! ## Responsibilities
//! - Durable writes via append-only logging
//! - Crash recovery by replaying logs into the key directory
//! - Size-triggered rollover of the active log into sealed segments
//! - Background compaction of sealed segments
//!
//! ## On-Disk Layout
//! ```text
//! <dir>/
//!   current-data     the single appendable log, all writes land here
//!   0.segment        sealed segments, immutable until compaction
//!   1.segment
//!   ...
//!   merge.tmp        transient, at most one, only while a merge is staging
//! ```
//!
//! Each file is a sequence of records:
//! ```text
//! ┌────────────┬────────────┬──────────┬─────────┬───────────┐
//! │ key_len(4) │ val_len(4) │ crc32(4) │ key     │ value     │
//! └────────────┴────────────┴──────────┴─────────┴───────────┘
//! ```

mod engine;
mod index;
mod merge;
mod reader_pool;
mod record;
mod segment;

pub use engine::Engine;
pub use index::{KeyDir, Location};
pub use reader_pool::ReaderPool;
pub use record::{Record, HEADER_SIZE, MAX_RECORD_SIZE};
pub use segment::{
    list_segments, parse_segment_id, segment_path, SegmentFile, ACTIVE_LOG_NAME, MERGE_TMP_NAME,
    SEGMENT_SUFFIX,
};
