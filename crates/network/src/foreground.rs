// crates/network/src/foreground.rs
//! Foreground execution context
//!
//! Progress handlers mutate UI state, so they must run on the application's
//! foreground context no matter which thread the transport reports on. The
//! orchestrator posts every progress update through a [`ForegroundContext`].

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::thread::{JoinHandle, ThreadId};

/// Work posted to the foreground context
pub type ForegroundTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs posted closures on the application's foreground context, in order
pub trait ForegroundContext: Send + Sync {
    fn post(&self, task: ForegroundTask);
}

/// A dedicated thread acting as the foreground context
///
/// Suitable for hosts without a UI loop of their own.
pub struct ForegroundThread {
    tx: Option<Sender<ForegroundTask>>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl ForegroundThread {
    /// Spawns the foreground thread
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<ForegroundTask>();
        let handle = std::thread::Builder::new()
            .name("tz-foreground".to_string())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    task();
                }
                log::debug!("Foreground thread exiting");
            })?;

        Ok(Self {
            tx: Some(tx),
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns true when called from the foreground thread
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }
}

impl ForegroundContext for ForegroundThread {
    fn post(&self, task: ForegroundTask) {
        if let Some(tx) = &self.tx {
            if tx.send(task).is_err() {
                log::debug!("Foreground thread gone, dropping task");
            }
        }
    }
}

impl Drop for ForegroundThread {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain and exit
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Queue drained by the host's own UI loop through a [`ForegroundPump`]
#[derive(Clone)]
pub struct ForegroundQueue {
    tx: Sender<ForegroundTask>,
}

/// Consumer side of a [`ForegroundQueue`]; owned by the foreground loop
pub struct ForegroundPump {
    rx: Receiver<ForegroundTask>,
}

impl ForegroundQueue {
    pub fn new() -> (Self, ForegroundPump) {
        let (tx, rx) = unbounded();
        (Self { tx }, ForegroundPump { rx })
    }
}

impl ForegroundContext for ForegroundQueue {
    fn post(&self, task: ForegroundTask) {
        if self.tx.send(task).is_err() {
            log::debug!("Foreground pump gone, dropping task");
        }
    }
}

impl ForegroundPump {
    /// Runs every task queued so far on the calling thread
    ///
    /// Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            match self.rx.try_recv() {
                Ok(task) => {
                    task();
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return count,
            }
        }
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
