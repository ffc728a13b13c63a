//! Background read-ahead shared by the RAM caching loaders.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::block;

/// The cache side of read-ahead: what is present and how to fetch one block.
pub(crate) trait AheadFill: Send + Sync + 'static {
    /// Total number of blocks, or `None` when the size is unknown.
    fn block_count(&self) -> Option<u64>;

    /// Whether `block` is already resident.
    fn is_cached(&self, block: u64) -> bool;

    /// Fetch `block` into the cache. Returning `false` stops the current pass.
    fn fill_ahead(&self, block: u64) -> bool;
}

/// Lazily started, cancellable read-ahead worker.
///
/// The thread is spawned by the first [`request`](ReadAhead::request), never
/// at construction. Each request carries a new target position; targets that
/// queue up while a pass is running collapse to the most recent one. For each
/// target the worker walks up to `depth` blocks, skipping blocks the
/// foreground path already cached and checking the cancel flag between
/// blocks.
pub(crate) struct ReadAhead<S: AheadFill> {
    source: Arc<S>,
    depth: u64,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    targets: mpsc::Sender<u64>,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl<S: AheadFill> ReadAhead<S> {
    pub fn new(source: Arc<S>, depth: u64) -> Self {
        Self {
            source,
            depth,
            worker: Mutex::new(None),
        }
    }

    /// Ask the worker to populate blocks starting at byte `pos`.
    pub fn request(&self, pos: u64) {
        let mut worker = self.worker.lock();

        if let Some(running) = worker.as_ref() {
            if running.targets.send(pos).is_ok() {
                return;
            }
            // The thread is gone (it panicked); reap it and start over.
            if let Some(dead) = worker.take() {
                dead.stop();
            }
        }

        match Worker::spawn(self.source.clone(), self.depth) {
            Ok(spawned) => {
                let _ = spawned.targets.send(pos);
                *worker = Some(spawned);
            }
            Err(err) => log::warn!("Unable to start read-ahead thread: {err}"),
        }
    }

    /// Stop the worker and wait for it to exit.
    pub fn cancel(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.stop();
        }
    }

    /// Whether a worker thread currently exists.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl<S: AheadFill> Drop for ReadAhead<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Worker {
    fn spawn<S: AheadFill>(source: Arc<S>, depth: u64) -> std::io::Result<Self> {
        let (targets, receiver) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();

        let handle = std::thread::Builder::new()
            .name("loader-readahead".into())
            .spawn(move || run(source.as_ref(), depth, &receiver, &flag))?;

        Ok(Self {
            targets,
            cancel,
            handle,
        })
    }

    fn stop(self) {
        self.cancel.store(true, Ordering::Release);
        drop(self.targets);
        if self.handle.join().is_err() {
            log::error!("Read-ahead thread panicked");
        }
    }
}

fn run<S: AheadFill>(source: &S, depth: u64, targets: &mpsc::Receiver<u64>, cancel: &AtomicBool) {
    while let Ok(mut pos) = targets.recv() {
        while let Ok(newer) = targets.try_recv() {
            pos = newer;
        }

        let first = block::block_of(pos);
        for block in first..first.saturating_add(depth) {
            if cancel.load(Ordering::Acquire) {
                return;
            }
            if source.block_count().is_some_and(|count| block >= count) {
                break;
            }
            if source.is_cached(block) {
                continue;
            }
            if !source.fill_ahead(block) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::{Duration, Instant};

    struct Recorder {
        count: Option<u64>,
        filled: Mutex<BTreeSet<u64>>,
    }

    impl AheadFill for Recorder {
        fn block_count(&self) -> Option<u64> {
            self.count
        }

        fn is_cached(&self, block: u64) -> bool {
            self.filled.lock().contains(&block)
        }

        fn fill_ahead(&self, block: u64) -> bool {
            self.filled.lock().insert(block);
            true
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn no_thread_until_first_request() {
        let source = Arc::new(Recorder {
            count: Some(10),
            filled: Mutex::new(BTreeSet::new()),
        });
        let ahead = ReadAhead::new(source, 4);
        assert!(!ahead.is_running());
    }

    #[test]
    fn fills_depth_blocks_from_target() {
        let source = Arc::new(Recorder {
            count: Some(100),
            filled: Mutex::new(BTreeSet::new()),
        });
        let ahead = ReadAhead::new(source.clone(), 4);
        ahead.request(block::block_start(10) + 5);

        assert!(wait_for(|| source.filled.lock().len() == 4));
        let filled: Vec<u64> = source.filled.lock().iter().copied().collect();
        assert_eq!(filled, vec![10, 11, 12, 13]);
        assert!(ahead.is_running());
    }

    #[test]
    fn stops_at_end_of_file() {
        let source = Arc::new(Recorder {
            count: Some(3),
            filled: Mutex::new(BTreeSet::new()),
        });
        let ahead = ReadAhead::new(source.clone(), 4);
        ahead.request(block::block_start(1));
        assert!(wait_for(|| source.filled.lock().len() == 2));
        ahead.cancel();
        let filled: Vec<u64> = source.filled.lock().iter().copied().collect();
        assert_eq!(filled, vec![1, 2]);
    }

    #[test]
    fn cancel_joins_and_restarts() {
        let source = Arc::new(Recorder {
            count: None,
            filled: Mutex::new(BTreeSet::new()),
        });
        let ahead = ReadAhead::new(source.clone(), 2);
        ahead.request(0);
        ahead.cancel();
        assert!(!ahead.is_running());

        ahead.request(block::block_start(50));
        assert!(wait_for(|| source.filled.lock().contains(&51)));
    }
}
