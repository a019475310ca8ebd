//! Endless batch streams, with optional background prefetching.
//!
//! Training runs a fixed number of iterations per epoch regardless of pass
//! boundaries, so [`CyclicStream`] restarts its source whenever a pass ends.
//! [`PrefetchStream`] moves batch construction onto worker threads and hands
//! batches to the training loop through a bounded channel, keeping the
//! consumer's delivery order deterministic.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use crate::batch::BatchSource;
use crate::rng::RngKey;

/// Wraps a [`BatchSource`] into an endless stream by starting a fresh pass
/// whenever the current one runs out.
pub struct CyclicStream<S: BatchSource> {
    inner: S,
}

impl<S: BatchSource> CyclicStream<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Next batch, crossing pass boundaries transparently.
    pub fn next(&mut self) -> S::Batch {
        loop {
            if let Some(batch) = self.inner.next_batch() {
                return batch;
            }
            self.inner.begin_pass();
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Background prefetcher over multiple independent batch sources.
///
/// Each worker owns one source (seeded with its own [`RngKey`] by the
/// caller) and pushes batches into a bounded channel. `next()` drains the
/// workers round-robin, so delivery order depends only on the sources, not
/// on thread scheduling.
pub struct PrefetchStream<B: Send + 'static> {
    receivers: Vec<Receiver<B>>,
    cursor: usize,
    handles: Vec<JoinHandle<()>>,
}

impl<B: Send + 'static> PrefetchStream<B> {
    /// Spawn one worker per source, each buffering up to `prefetch` batches.
    pub fn spawn<S>(sources: Vec<S>, prefetch: usize) -> Self
    where
        S: BatchSource<Batch = B> + 'static,
    {
        let mut receivers = Vec::with_capacity(sources.len());
        let mut handles = Vec::with_capacity(sources.len());
        for source in sources {
            let (tx, rx) = mpsc::sync_channel(prefetch.max(1));
            receivers.push(rx);
            handles.push(thread::spawn(move || worker_loop(source, tx)));
        }
        Self {
            receivers,
            cursor: 0,
            handles,
        }
    }

    /// Next batch, blocking until a worker delivers one.
    ///
    /// Panics if every worker has hung up, which only happens after the
    /// stream itself is being torn down.
    pub fn next(&mut self) -> B {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.receivers.len();
        self.receivers[slot]
            .recv()
            .unwrap_or_else(|_| panic!("prefetch worker {slot} terminated"))
    }

    pub fn n_workers(&self) -> usize {
        self.receivers.len()
    }
}

impl<B: Send + 'static> Drop for PrefetchStream<B> {
    fn drop(&mut self) {
        // Dropping the receivers makes the workers' next send fail, which is
        // their exit signal.
        self.receivers.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop<S: BatchSource>(source: S, tx: SyncSender<S::Batch>) {
    let mut stream = CyclicStream::new(source);
    loop {
        let batch = stream.next();
        if tx.send(batch).is_err() {
            // receiver dropped, stream is shutting down
            return;
        }
    }
}

/// Derive one key per prefetch worker from a parent key.
pub fn worker_keys(key: RngKey, n_workers: usize) -> Vec<RngKey> {
    key.split(n_workers.max(1))
}
