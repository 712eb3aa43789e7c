//! Reader worker pool
//!
//! Serves point reads for the engine without holding the engine lock across
//! file I/O. Callers resolve a key to a concrete `(path, offset)` under the
//! lock, then hand the read to this pool and block on a one-shot result
//! channel.
//!
//! ## Architecture
//! - A bounded request queue fans out to a fixed set of worker threads
//! - Each worker opens its own file handle per read
//! - Dropping the request sender is the shutdown signal: workers drain the
//!   queue, then exit; late callers get a shutting-down error

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{RelayError, Result};

use super::record::Record;
use super::segment;

/// A single queued read
struct ReadRequest {
    path: PathBuf,
    offset: u64,
    result: Sender<Result<Option<Record>>>,
}

/// Pool of blocking read workers
pub struct ReaderPool {
    /// Request queue; `None` once shutdown has begun
    requests: Mutex<Option<Sender<ReadRequest>>>,

    /// Worker thread handles, joined on close
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReaderPool {
    /// Spawn a pool with `workers` threads (0 = twice the CPU count)
    pub fn new(workers: usize) -> Result<Self> {
        let workers = if workers == 0 {
            available_parallelism() * 2
        } else {
            workers
        };

        let (sender, receiver) = bounded::<ReadRequest>(workers * 2);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let receiver: Receiver<ReadRequest> = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("relaykv-reader-{}", worker_id))
                .spawn(move || {
                    tracing::debug!("reader worker {} started", worker_id);

                    while let Ok(request) = receiver.recv() {
                        let result = perform_read(&request);
                        // The caller may have given up; a dead result channel
                        // is not an error here.
                        let _ = request.result.send(result);
                    }

                    tracing::debug!("reader worker {} stopped", worker_id);
                })?;

            handles.push(handle);
        }

        Ok(Self {
            requests: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        })
    }

    /// Read the record at `offset` in `path`
    ///
    /// Blocks until a worker has performed the read; `Ok(None)` means the
    /// file ends at or before `offset`. Fails with `ShuttingDown` once
    /// `close` has been called.
    pub fn read(&self, path: PathBuf, offset: u64) -> Result<Option<Record>> {
        let sender = self
            .requests
            .lock()
            .as_ref()
            .cloned()
            .ok_or(RelayError::ShuttingDown)?;

        let (result_tx, result_rx) = bounded(1);
        let request = ReadRequest {
            path,
            offset,
            result: result_tx,
        };

        sender.send(request).map_err(|_| RelayError::ShuttingDown)?;
        result_rx.recv().map_err(|_| RelayError::ShuttingDown)?
    }

    /// Shut the pool down and wait for every worker to exit
    ///
    /// Queued reads are still served before the workers stop. Idempotent.
    pub fn close(&self) {
        let sender = self.requests.lock().take();
        drop(sender);

        for handle in self.workers.lock().drain(..) {
            if let Err(e) = handle.join() {
                tracing::error!("reader worker panicked: {:?}", e);
            }
        }
    }
}

impl Drop for ReaderPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Execute one read on the calling worker thread
fn perform_read(request: &ReadRequest) -> Result<Option<Record>> {
    segment::read_record_at(&request.path, request.offset)
}

/// Number of CPUs (for the default worker count)
fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_records(dir: &TempDir, records: &[Record]) -> PathBuf {
        let path = dir.path().join("0.segment");
        let mut file = std::fs::File::create(&path).unwrap();
        for record in records {
            file.write_all(&record.encode()).unwrap();
        }
        path
    }

    #[test]
    fn test_read_through_pool() {
        let temp = TempDir::new().unwrap();
        let first = Record::new("a", "v1");
        let second = Record::new("b", "v2");
        let path = write_records(&temp, &[first.clone(), second]);

        let pool = ReaderPool::new(2).unwrap();

        let record = pool.read(path.clone(), 0).unwrap().unwrap();
        assert_eq!(record.value, "v1");

        let record = pool.read(path, first.encoded_len() as u64).unwrap().unwrap();
        assert_eq!(record.value, "v2");

        pool.close();
    }

    #[test]
    fn test_read_after_close_fails() {
        let temp = TempDir::new().unwrap();
        let path = write_records(&temp, &[Record::new("a", "v1")]);

        let pool = ReaderPool::new(1).unwrap();
        pool.close();

        let err = pool.read(path, 0).unwrap_err();
        assert!(matches!(err, RelayError::ShuttingDown));
    }

    #[test]
    fn test_close_is_idempotent() {
        let pool = ReaderPool::new(1).unwrap();
        pool.close();
        pool.close();
    }
}
