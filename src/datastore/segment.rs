//! Segment files
//!
//! Sealed, immutable append-log files named `<N>.segment` where `N` is a
//! monotonically increasing integer. Files are read-only between seal and
//! deletion, so point reads need no coordination with writers.
//!
//! Segment IDs are not zero-padded; enumeration sorts numerically by the
//! parsed ID so `2.segment` always precedes `10.segment`.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

use super::record::Record;

/// Filename of the single appendable log
pub const ACTIVE_LOG_NAME: &str = "current-data";

/// Filename extension of sealed segments
pub const SEGMENT_SUFFIX: &str = ".segment";

/// Transient output file used while a merge is in flight
pub const MERGE_TMP_NAME: &str = "merge.tmp";

/// A sealed segment discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub id: u64,
    pub path: PathBuf,
}

/// Build the path of segment `id` inside `dir`
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{}{}", id, SEGMENT_SUFFIX))
}

/// Parse a segment ID out of a filename, if it is one
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(SEGMENT_SUFFIX)?;
    stem.parse().ok()
}

/// Enumerate the sealed segments in `dir`, sorted by ID ascending
pub fn list_segments(dir: &Path) -> Result<Vec<SegmentFile>> {
    let mut segments = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if let Some(id) = parse_segment_id(&path) {
            segments.push(SegmentFile { id, path });
        }
    }

    segments.sort_by_key(|segment| segment.id);
    Ok(segments)
}

/// Read one record at `offset` in `path`
///
/// Opens a fresh handle per call. Returns `Ok(None)` when the file ends at
/// or before `offset`, which callers racing a rollover treat as a stale
/// location rather than corruption.
pub fn read_record_at(path: &Path, offset: u64) -> Result<Option<Record>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut reader = BufReader::new(file);
    Ok(Record::decode_from(&mut reader)?.map(|(record, _)| record))
}

/// Scan every record in `path` from the beginning
///
/// Calls `visit(record, offset, encoded_len)` for each record in file order.
/// A clean EOF ends the scan; a mid-record EOF or checksum failure is
/// reported as corruption tagged with the file name.
pub fn scan_records<F>(path: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(Record, u64, usize),
{
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut offset = 0u64;

    loop {
        match Record::decode_from(&mut reader) {
            Ok(Some((record, consumed))) => {
                visit(record, offset, consumed);
                offset += consumed as u64;
            }
            Ok(None) => return Ok(()),
            Err(RelayError::Corruption(msg)) => {
                return Err(RelayError::Corruption(format!(
                    "{}: {}",
                    path.display(),
                    msg
                )))
            }
            Err(e) => return Err(e),
        }
    }
}
