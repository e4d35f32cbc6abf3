//! Cooperative background worker handles
//!
//! The host application runs long jobs (level downloads, database
//! maintenance) off the main loop. Workers never touch simulation state;
//! they produce data the simulation picks up at the next scene load. The
//! pattern is a cancellation token checked between discrete work units plus
//! a mutex-guarded progress snapshot the main loop polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

/// Poll-friendly snapshot of what a worker is doing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// 0.0 to 100.0
    pub percent: f32,
    /// Human-readable current operation
    pub operation: String,
}

/// Shared cancel flag; cooperative, checked between work units only
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop after its current work unit
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The worker side: check for cancellation, report progress
pub struct WorkerContext {
    cancel: CancelToken,
    progress: Arc<Mutex<Progress>>,
}

impl WorkerContext {
    /// Should the worker wind down? Check between work units; a unit is
    /// never interrupted mid-flight.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_progress(&self, percent: f32, operation: impl Into<String>) {
        let mut progress = self.progress.lock();
        progress.percent = percent;
        progress.operation = operation.into();
    }
}

/// The caller side: poll progress, cancel, join
pub struct WorkerHandle<T> {
    handle: Option<JoinHandle<T>>,
    cancel: CancelToken,
    progress: Arc<Mutex<Progress>>,
}

impl<T> WorkerHandle<T> {
    /// Snapshot of the worker's current progress
    pub fn progress(&self) -> Progress {
        self.progress.lock().clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the worker and take its result
    pub fn join(mut self) -> thread::Result<T> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => unreachable!("join consumes the handle"),
        }
    }

    /// Cancel, then wait for the current work unit to finish
    pub fn cancel_and_join(self) -> thread::Result<T> {
        self.cancel();
        self.join()
    }
}

/// Spawn a named worker thread running `f` with a [`WorkerContext`]
pub fn spawn_worker<T, F>(name: impl Into<String>, f: F) -> WorkerHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&WorkerContext) -> T + Send + 'static,
{
    let cancel = CancelToken::new();
    let progress = Arc::new(Mutex::new(Progress::default()));
    let context = WorkerContext {
        cancel: cancel.clone(),
        progress: progress.clone(),
    };

    let handle = thread::Builder::new()
        .name(name.into())
        .spawn(move || f(&context))
        .expect("worker thread spawns");

    WorkerHandle {
        handle: Some(handle),
        cancel,
        progress,
    }
}
