//! Segmentation and compaction tests
//!
//! Rollover behavior, background merge convergence, merge failure
//! atomicity, and recovery ordering across sealed segments.

use std::path::Path;
use std::time::{Duration, Instant};

use relaykv::datastore::{segment_path, Record};
use relaykv::Engine;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn count_files_with_suffix(dir: &Path, suffix: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|entry| {
            entry
                .as_ref()
                .unwrap()
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(suffix))
        })
        .count()
}

fn segment_count(dir: &Path) -> usize {
    count_files_with_suffix(dir, ".segment")
}

fn wait_for_segment_count(dir: &Path, target: usize, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if segment_count(dir) == target {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

fn fifty_bytes() -> String {
    "x".repeat(50)
}

// =============================================================================
// Rollover
// =============================================================================

#[test]
fn test_rollover_creates_multiple_segments() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(temp.path(), 100).unwrap();

    // Merges would collapse the segments again; keep them apart so the
    // rollover output itself is observable.
    engine.inject_merge_failure(true);

    for i in 0..10u8 {
        let key = ((b'a' + i) as char).to_string();
        engine.put(&key, &fifty_bytes()).unwrap();
    }

    assert!(
        segment_count(temp.path()) >= 2,
        "expected multiple segments, got {}",
        segment_count(temp.path())
    );

    for i in 0..10u8 {
        let key = ((b'a' + i) as char).to_string();
        assert_eq!(engine.get(&key).unwrap(), fifty_bytes());
    }
}

#[test]
fn test_zero_segment_size_disables_rollover() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(temp.path(), 0).unwrap();

    for i in 0..50 {
        engine.put(&format!("key{}", i), &fifty_bytes()).unwrap();
    }

    assert_eq!(segment_count(temp.path()), 0);
}

// =============================================================================
// Merge Convergence
// =============================================================================

#[test]
fn test_merge_converges_to_single_segment() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(temp.path(), 100).unwrap();

    for i in 0..10u8 {
        let key = ((b'a' + i) as char).to_string();
        engine.put(&key, &fifty_bytes()).unwrap();
    }

    assert!(
        wait_for_segment_count(temp.path(), 1, Duration::from_secs(5)),
        "merge did not settle, {} segments remain",
        segment_count(temp.path())
    );
    assert_eq!(count_files_with_suffix(temp.path(), ".tmp"), 0);

    for i in 0..10u8 {
        let key = ((b'a' + i) as char).to_string();
        assert_eq!(engine.get(&key).unwrap(), fifty_bytes());
    }
}

#[test]
fn test_merge_keeps_newest_value_per_key() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(temp.path(), 100).unwrap();

    // Rewrite the same three keys across many rollovers.
    for round in 0..12 {
        for key in ["k0", "k1", "k2"] {
            engine
                .put(key, &format!("{}-{}", fifty_bytes(), round))
                .unwrap();
        }
    }

    wait_for_segment_count(temp.path(), 1, Duration::from_secs(5));

    for key in ["k0", "k1", "k2"] {
        assert_eq!(engine.get(key).unwrap(), format!("{}-11", fifty_bytes()));
    }
}

// =============================================================================
// Merge Atomicity
// =============================================================================

#[test]
fn test_failed_merge_leaves_state_untouched() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(temp.path(), 100).unwrap();

    engine.inject_merge_failure(true);

    let value = fifty_bytes();
    for i in 0..5u8 {
        let key = ((b'a' + i) as char).to_string();
        engine.put(&key, &value).unwrap();
    }

    let initial_segments = segment_count(temp.path());
    std::thread::sleep(Duration::from_millis(300));

    assert_eq!(
        segment_count(temp.path()),
        initial_segments,
        "segment count changed after failed merge"
    );
    assert_eq!(
        count_files_with_suffix(temp.path(), ".tmp"),
        0,
        "temporary merge files remain after failure"
    );

    for i in 0..5u8 {
        let key = ((b'a' + i) as char).to_string();
        assert_eq!(engine.get(&key).unwrap(), value);
    }
}

// =============================================================================
// Recovery Across Segments
// =============================================================================

#[test]
fn test_restart_with_segments_preserves_latest_values() {
    let temp = TempDir::new().unwrap();

    {
        let engine = Engine::open(temp.path(), 100).unwrap();
        engine.inject_merge_failure(true);

        for round in 0..3 {
            for key in ["a", "b", "c"] {
                engine
                    .put(key, &format!("{}-{}", fifty_bytes(), round))
                    .unwrap();
            }
        }
        engine.close().unwrap();
    }

    let engine = Engine::open(temp.path(), 100).unwrap();
    for key in ["a", "b", "c"] {
        assert_eq!(engine.get(key).unwrap(), format!("{}-2", fifty_bytes()));
    }

    // The directory keeps working after recovery.
    engine.put("d", "fresh").unwrap();
    assert_eq!(engine.get("d").unwrap(), "fresh");
}

#[test]
fn test_recovery_orders_segments_numerically() {
    let temp = TempDir::new().unwrap();

    // A lexicographic scan would read 10.segment before 2.segment and keep
    // the stale value.
    std::fs::write(
        segment_path(temp.path(), 2),
        Record::new("k", "stale").encode(),
    )
    .unwrap();
    std::fs::write(
        segment_path(temp.path(), 10),
        Record::new("k", "fresh").encode(),
    )
    .unwrap();

    let engine = Engine::open(temp.path(), 0).unwrap();
    assert_eq!(engine.get("k").unwrap(), "fresh");
}

#[test]
fn test_recovery_after_interrupted_merge_unlink() {
    let temp = TempDir::new().unwrap();

    // Simulate a crash after the merged segment was renamed into place but
    // before the inputs were unlinked: the merged copy (highest ID) and the
    // stale inputs coexist.
    std::fs::write(
        segment_path(temp.path(), 0),
        Record::new("k", "old-0").encode(),
    )
    .unwrap();
    std::fs::write(
        segment_path(temp.path(), 1),
        Record::new("k", "old-1").encode(),
    )
    .unwrap();
    std::fs::write(
        segment_path(temp.path(), 2),
        Record::new("k", "merged").encode(),
    )
    .unwrap();

    let engine = Engine::open(temp.path(), 0).unwrap();
    assert_eq!(engine.get("k").unwrap(), "merged");
}

#[test]
fn test_active_log_wins_over_segments_on_recovery() {
    let temp = TempDir::new().unwrap();

    {
        let engine = Engine::open(temp.path(), 100).unwrap();
        engine.inject_merge_failure(true);

        // Push "k" into a sealed segment, then overwrite it in the active log.
        engine.put("k", &fifty_bytes()).unwrap();
        engine.put("filler", &fifty_bytes()).unwrap();
        engine.put("k", "newest").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(temp.path(), 100).unwrap();
    assert_eq!(engine.get("k").unwrap(), "newest");
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_reads_and_writes() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(temp.path(), 256).unwrap();

    for i in 1..=3 {
        engine
            .put(&format!("key{}", i), &format!("initial_value{}", i))
            .unwrap();
    }

    const READERS: usize = 10;
    const WRITERS: usize = 5;
    const OPS: usize = 100;

    std::thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|| {
                for j in 0..OPS {
                    let n = (j % 3) + 1;
                    let key = format!("key{}", n);
                    let value = engine.get(&key).unwrap();

                    let initial = format!("initial_value{}", n);
                    let updated = format!("updated_value{}", n);
                    assert!(
                        value == initial || value == updated,
                        "unexpected value for {}: {}",
                        key,
                        value
                    );
                }
            });
        }

        for _ in 0..WRITERS {
            scope.spawn(|| {
                for j in 0..OPS {
                    let n = (j % 3) + 1;
                    engine
                        .put(&format!("key{}", n), &format!("updated_value{}", n))
                        .unwrap();
                }
            });
        }
    });

    for i in 1..=3 {
        let value = engine.get(&format!("key{}", i)).unwrap();
        assert!(
            value == format!("initial_value{}", i) || value == format!("updated_value{}", i)
        );
    }
}
