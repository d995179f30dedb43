//! Content-addressed background fetching of referenced resources.
//!
//! When an element update references external image content, the recorder
//! stores a local copy named by the hash of the reference string. Fetches
//! are fire-and-forget: the logging call never waits on one, a bounded
//! queue caps the backlog, and a hash that is already cached on disk or
//! already pending is never fetched twice.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Default extension when a reference has none to borrow.
const FALLBACK_EXTENSION: &str = "img";

/// Hash of a reference string, used as the cache key.
pub fn content_hash(reference: &str) -> String {
    hex::encode(Sha256::digest(reference.as_bytes()))
}

/// File extension borrowed from the reference (its last dot-segment),
/// or a fallback when there is none.
pub fn reference_extension(reference: &str) -> &str {
    match reference.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 8 && !ext.contains('/') => ext,
        _ => FALLBACK_EXTENSION,
    }
}

/// Cache target and key for an image reference inside a session directory.
pub fn cached_image_target(dir: &Path, reference: &str) -> (PathBuf, String) {
    let hash = content_hash(reference);
    let target = crate::session::cached_image_path(dir, &hash, reference_extension(reference));
    (target, hash)
}

/// Narrow interface to the blob download collaborator.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(reference)
            .send()
            .with_context(|| format!("Failed to fetch {}", reference))?
            .error_for_status()
            .with_context(|| format!("Fetch of {} returned an error status", reference))?;

        let bytes = response
            .bytes()
            .with_context(|| format!("Failed to read body of {}", reference))?;
        Ok(bytes.to_vec())
    }
}

struct FetchJob {
    reference: String,
    target: PathBuf,
    hash: String,
}

/// Bounded pool of background fetch workers, keyed by content hash.
pub struct FetchPool {
    jobs: Sender<FetchJob>,
    pending: Arc<Mutex<HashSet<String>>>,
    workers: Vec<JoinHandle<()>>,
}

impl FetchPool {
    /// Spawn `workers` threads draining a queue of at most `queue_size`
    /// outstanding fetches.
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, workers: usize, queue_size: usize) -> Self {
        let (tx, rx) = bounded(queue_size.max(1));
        let pending = Arc::new(Mutex::new(HashSet::new()));

        let handles = (0..workers.max(1))
            .map(|_| {
                let rx: Receiver<FetchJob> = rx.clone();
                let fetcher = fetcher.clone();
                let pending = pending.clone();
                std::thread::spawn(move || {
                    while let Ok(job) = rx.recv() {
                        run_job(fetcher.as_ref(), &job);
                        pending
                            .lock()
                            .expect("pending fetch lock poisoned")
                            .remove(&job.hash);
                    }
                })
            })
            .collect();

        Self {
            jobs: tx,
            pending,
            workers: handles,
        }
    }

    /// Enqueue a fetch of `reference` into `target` unless the content is
    /// already cached or already on its way. Never blocks; a full queue
    /// drops the fetch with a warning (the caller has already recorded the
    /// element update, only the local copy is skipped).
    pub fn enqueue(&self, reference: &str, target: &Path, hash: &str) {
        if target.exists() {
            return;
        }

        {
            let mut pending = self.pending.lock().expect("pending fetch lock poisoned");
            if !pending.insert(hash.to_string()) {
                return;
            }
        }

        let job = FetchJob {
            reference: reference.to_string(),
            target: target.to_path_buf(),
            hash: hash.to_string(),
        };

        match self.jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                warn!("fetch queue full, dropping fetch of {}", job.reference);
                self.pending
                    .lock()
                    .expect("pending fetch lock poisoned")
                    .remove(&job.hash);
            }
        }
    }

    /// Whether a hash is currently queued or being fetched.
    pub fn is_pending(&self, hash: &str) -> bool {
        self.pending
            .lock()
            .expect("pending fetch lock poisoned")
            .contains(hash)
    }
}

impl Drop for FetchPool {
    fn drop(&mut self) {
        // Disconnect the queue so idle workers exit; in-flight jobs finish.
        let (empty_tx, _) = bounded(1);
        self.jobs = empty_tx;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn run_job(fetcher: &dyn ResourceFetcher, job: &FetchJob) {
    match fetcher.fetch(&job.reference) {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(&job.target, bytes) {
                warn!("failed to store fetched resource {:?}: {}", job.target, e);
            } else {
                debug!("cached {} as {:?}", job.reference, job.target);
            }
        }
        Err(e) => warn!("failed to fetch {}: {:#}", job.reference, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFetcher {
        calls: AtomicUsize,
        payload: Vec<u8>,
    }

    impl CountingFetcher {
        fn new(payload: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                payload: payload.to_vec(),
            })
        }
    }

    impl ResourceFetcher for CountingFetcher {
        fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..100 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn content_hash_is_stable_and_distinct() {
        let a = content_hash("http://example.org/logo.png");
        let b = content_hash("http://example.org/logo.png");
        let c = content_hash("http://example.org/other.png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn reference_extension_borrows_last_segment() {
        assert_eq!(reference_extension("http://x/logo.png"), "png");
        assert_eq!(reference_extension("http://x/archive.tar.gz"), "gz");
        assert_eq!(reference_extension("http://x/no-extension"), "img");
        assert_eq!(reference_extension("http://x/trailing."), "img");
    }

    #[test]
    fn enqueue_fetches_and_stores() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"image-bytes");
        let pool = FetchPool::new(fetcher.clone(), 2, 8);

        let reference = "http://example.org/logo.png";
        let hash = content_hash(reference);
        let target = dir.path().join("image.cache.png");

        pool.enqueue(reference, &target, &hash);
        wait_for(|| target.exists());

        assert_eq!(std::fs::read(&target).unwrap(), b"image-bytes");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cached_target_is_never_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new(b"x");
        let pool = FetchPool::new(fetcher.clone(), 1, 8);

        let target = dir.path().join("image.cached.png");
        std::fs::write(&target, b"already here").unwrap();

        pool.enqueue("http://example.org/a.png", &target, "somehash");
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(&target).unwrap(), b"already here");
    }

    #[test]
    fn pending_hash_is_not_enqueued_twice() {
        struct SlowFetcher {
            calls: AtomicUsize,
        }

        impl ResourceFetcher for SlowFetcher {
            fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                Ok(vec![1])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(SlowFetcher {
            calls: AtomicUsize::new(0),
        });
        let pool = FetchPool::new(fetcher.clone(), 1, 8);

        let target = dir.path().join("image.slow.png");
        pool.enqueue("http://example.org/slow.png", &target, "slowhash");
        pool.enqueue("http://example.org/slow.png", &target, "slowhash");
        pool.enqueue("http://example.org/slow.png", &target, "slowhash");

        wait_for(|| target.exists());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fetch_failure_is_absorbed() {
        struct FailingFetcher;

        impl ResourceFetcher for FailingFetcher {
            fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
                anyhow::bail!("connection refused")
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let pool = FetchPool::new(Arc::new(FailingFetcher), 1, 8);

        let target = dir.path().join("image.fail.png");
        pool.enqueue("http://example.org/fail.png", &target, "failhash");

        wait_for(|| !pool.is_pending("failhash"));
        assert!(!target.exists());
    }
}
