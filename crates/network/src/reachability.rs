// crates/network/src/reachability.rs
//! Network reachability
//!
//! [`ReachabilityGate`] holds the last definitive connectivity signal. It is
//! created once at startup, shared with the orchestrator by `Arc`, and stops
//! its listener on [`ReachabilityGate::shutdown`] or drop.

use crate::config::NetworkConfig;
use crate::error::ConfigError;
use crate::transport::TransportClient;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Interface a reachable network goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    EthernetOrWiFi,
    Cellular,
    Other,
}

/// Connectivity transition reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Reachable(ConnectionType),
    NotReachable,
    /// No definitive signal; does not change the gate
    Unknown,
}

/// Answers whether requests should be dispatched
pub trait Reachability: Send + Sync {
    /// Non-blocking read of the last known state
    fn is_reachable(&self) -> bool;
}

const STATE_UNKNOWN: u8 = 0;
const STATE_REACHABLE: u8 = 1;
const STATE_NOT_REACHABLE: u8 = 2;

/// Connectivity flag fed by a background listener
///
/// Reports not reachable until the first definitive signal arrives.
pub struct ReachabilityGate {
    state: Arc<AtomicU8>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ReachabilityGate {
    /// Starts listening to `signals` on the current tokio runtime
    pub fn new(signals: mpsc::Receiver<ConnectivityStatus>) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let state = Arc::new(AtomicU8::new(STATE_UNKNOWN));
        let listener = runtime.spawn(listen(signals, Arc::clone(&state)));

        Ok(Self {
            state,
            tasks: Mutex::new(vec![listener]),
        })
    }

    /// Gate driven by a [`ConnectivityProbe`]
    pub fn with_probe(probe: ConnectivityProbe) -> Result<Self, ConfigError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let (tx, rx) = mpsc::channel(8);
        let gate = Self::new(rx)?;
        let prober = runtime.spawn(probe.run(tx));
        gate.lock_tasks().push(prober);
        Ok(gate)
    }

    pub fn is_reachable(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_REACHABLE
    }

    /// Last definitive state, `None` before any signal
    pub fn last_known(&self) -> Option<bool> {
        match self.state.load(Ordering::Acquire) {
            STATE_REACHABLE => Some(true),
            STATE_NOT_REACHABLE => Some(false),
            _ => None,
        }
    }

    /// Stops the listener; the last state stays readable
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.lock_tasks().drain(..).collect();
        if !tasks.is_empty() {
            log::debug!("Stopping reachability listener");
        }
        for task in tasks {
            task.abort();
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Reachability for ReachabilityGate {
    fn is_reachable(&self) -> bool {
        ReachabilityGate::is_reachable(self)
    }
}

impl Drop for ReachabilityGate {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn listen(mut signals: mpsc::Receiver<ConnectivityStatus>, state: Arc<AtomicU8>) {
    while let Some(status) = signals.recv().await {
        apply(&state, status);
    }
    log::warn!("Connectivity signal source closed, keeping last state");
}

fn apply(state: &AtomicU8, status: ConnectivityStatus) {
    match status {
        ConnectivityStatus::Reachable(kind) => {
            let previous = state.swap(STATE_REACHABLE, Ordering::AcqRel);
            if previous != STATE_REACHABLE {
                log::info!("Network connected ({:?})", kind);
            }
        }
        ConnectivityStatus::NotReachable => {
            let previous = state.swap(STATE_NOT_REACHABLE, Ordering::AcqRel);
            if previous != STATE_NOT_REACHABLE {
                log::info!("Network disconnected");
            }
        }
        ConnectivityStatus::Unknown => log::debug!("Network state unknown"),
    }
}

/// Connectivity signal source that probes URLs with HEAD requests
#[derive(Clone)]
pub struct ConnectivityProbe {
    client: TransportClient,
    check_urls: Vec<String>,
    interval: Duration,
}

impl ConnectivityProbe {
    /// Creates a probe with the configured URLs and interval
    pub fn new(client: TransportClient, config: &NetworkConfig) -> Self {
        Self {
            client,
            check_urls: config.probe_urls.clone(),
            interval: config.probe_interval(),
        }
    }

    /// Creates a probe with custom URLs
    pub fn with_urls(client: TransportClient, urls: Vec<String>, interval: Duration) -> Self {
        Self {
            client,
            check_urls: urls,
            interval,
        }
    }

    /// Checks if any probe URL answers
    pub async fn is_online(&self) -> bool {
        for url in &self.check_urls {
            if self.client.is_accessible(url).await {
                return true;
            }
        }
        false
    }

    /// One probe round as a connectivity signal
    pub async fn check(&self) -> ConnectivityStatus {
        if self.check_urls.is_empty() {
            return ConnectivityStatus::Unknown;
        }
        if self.is_online().await {
            ConnectivityStatus::Reachable(ConnectionType::Other)
        } else {
            ConnectivityStatus::NotReachable
        }
    }

    /// Probes until the receiving side goes away
    pub async fn run(self, signals: mpsc::Sender<ConnectivityStatus>) {
        loop {
            let status = self.check().await;
            if signals.send(status).await.is_err() {
                break;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
