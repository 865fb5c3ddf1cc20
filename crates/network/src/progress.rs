// crates/network/src/progress.rs
//! Transfer progress tracking

use crate::foreground::ForegroundContext;
use std::sync::{Arc, Mutex};

/// Progress snapshot handed to callers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Bytes transferred so far
    pub completed_bytes: u64,
    /// Total bytes to transfer (if known)
    pub total_bytes: Option<u64>,
    /// Completed fraction, 0.0 to 1.0
    pub fraction: f64,
}

impl Progress {
    /// Fraction as a percentage string, e.g. `42.00%`
    pub fn percent_string(&self) -> String {
        format!("{:.2}%", self.fraction * 100.0)
    }
}

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Byte accounting for one upload or download
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Total bytes to transfer (if known)
    pub total_bytes: Option<u64>,
    /// Bytes transferred so far
    pub transferred_bytes: u64,
}

impl TransferProgress {
    pub fn new(total_bytes: Option<u64>) -> Self {
        Self {
            total_bytes,
            transferred_bytes: 0,
        }
    }

    /// Records newly transferred bytes
    pub fn update(&mut self, additional_bytes: u64) {
        self.transferred_bytes += additional_bytes;
    }

    /// Completed fraction (0.0 to 1.0); 0.0 while the total is unknown
    pub fn fraction(&self) -> f64 {
        match self.total_bytes {
            Some(0) => 1.0,
            Some(total) => (self.transferred_bytes as f64 / total as f64).min(1.0),
            None => 0.0,
        }
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            completed_bytes: self.transferred_bytes,
            total_bytes: self.total_bytes,
            fraction: self.fraction(),
        }
    }
}

/// Observer-side sink that sees every reported update on the transport context
pub(crate) type ProgressTap = Box<dyn Fn(&Progress) + Send + Sync>;

struct ReporterState {
    transfer: TransferProgress,
    last_fraction: Option<f64>,
}

/// Reports one request's progress to the caller on the foreground context
///
/// Reported fractions never decrease: an update below the last reported
/// fraction is dropped.
pub(crate) struct ProgressReporter {
    state: Mutex<ReporterState>,
    callback: Option<ProgressCallback>,
    foreground: Arc<dyn ForegroundContext>,
    tap: Option<ProgressTap>,
}

impl ProgressReporter {
    pub(crate) fn new(
        total_bytes: Option<u64>,
        callback: Option<ProgressCallback>,
        foreground: Arc<dyn ForegroundContext>,
    ) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                transfer: TransferProgress::new(total_bytes),
                last_fraction: None,
            }),
            callback,
            foreground,
            tap: None,
        }
    }

    pub(crate) fn with_tap(mut self, tap: ProgressTap) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Sets the expected total and the bytes already present (resumed downloads)
    pub(crate) fn start(&self, total_bytes: Option<u64>, already_transferred: u64) {
        let mut state = self.lock();
        let mut transfer = TransferProgress::new(total_bytes);
        transfer.transferred_bytes = already_transferred;
        state.transfer = transfer;
        self.emit(&mut state);
    }

    pub(crate) fn advance(&self, bytes: u64) {
        let mut state = self.lock();
        state.transfer.update(bytes);
        self.emit(&mut state);
    }

    /// Reports completion as 1.0
    pub(crate) fn finish(&self) {
        let mut state = self.lock();
        let transferred = state.transfer.transferred_bytes;
        state.transfer.total_bytes = Some(transferred);
        self.emit(&mut state);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Posting while holding the lock keeps foreground order equal to report order
    fn emit(&self, state: &mut ReporterState) {
        let progress = state.transfer.snapshot();
        let known_total = progress.total_bytes.is_some();

        if let Some(last) = state.last_fraction {
            if progress.fraction < last || (known_total && progress.fraction == last) {
                return;
            }
        }
        state.last_fraction = Some(progress.fraction);

        if let Some(tap) = &self.tap {
            tap(&progress);
        }
        if let Some(callback) = &self.callback {
            let callback = Arc::clone(callback);
            self.foreground.post(Box::new(move || callback(progress)));
        }
    }
}
