//! Service status snapshot.
//!
//! The service periodically serializes a [`ServiceStatus`] to JSON and, if
//! `[status] path` is configured, writes it to that file so supervisors and
//! operators can see which chips exist and how the bridge is behaving.

use crate::chip::ChipSummary;
use crate::engine::{EngineCounters, RequestEngine};
use crate::registry::ChipRegistry;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};
use tracing::debug;
use vgpio_common::config::StatusConfig;
use vgpio_common::consts::API_VERSION;

/// Coarse service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Created, receive loop not running yet.
    Starting,
    /// Receive loop running.
    Running,
    /// Shut down.
    Stopped,
}

/// Serializable snapshot of the service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    /// Instance name
    pub service_name: String,
    /// Crate version
    pub version: String,
    /// API version reported to bridges
    pub api_version: String,
    /// Process id
    pub process_id: u32,
    /// Current state
    pub state: ServiceState,
    /// Time since the publisher was created
    pub uptime_ms: u64,
    /// Every chip in the registry
    pub chips: Vec<ChipSummary>,
    /// Engine counters
    pub counters: EngineCounters,
}

/// Builds and writes [`ServiceStatus`] snapshots.
pub struct StatusPublisher {
    service_name: String,
    path: Option<PathBuf>,
    interval: Duration,
    started: Instant,
    last_publish: Option<Instant>,
    state: ServiceState,
}

impl StatusPublisher {
    /// Create a publisher in the `Starting` state.
    pub fn new(service_name: &str, config: &StatusConfig) -> Self {
        Self {
            service_name: service_name.to_string(),
            path: config.path.clone(),
            interval: Duration::from_millis(config.interval_ms),
            started: Instant::now(),
            last_publish: None,
            state: ServiceState::Starting,
        }
    }

    /// Current state.
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Set the state reported by the next snapshot.
    pub fn set_state(&mut self, state: ServiceState) {
        self.state = state;
    }

    /// Build a snapshot.
    pub fn snapshot(&self, registry: &ChipRegistry, engine: &RequestEngine) -> ServiceStatus {
        ServiceStatus {
            service_name: self.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: API_VERSION.to_string(),
            process_id: process::id(),
            state: self.state,
            uptime_ms: self.started.elapsed().as_millis() as u64,
            chips: registry.chips().iter().map(|chip| chip.summary()).collect(),
            counters: engine.counters(),
        }
    }

    /// Publish if the interval has elapsed since the last write.
    pub fn update(&mut self, registry: &ChipRegistry, engine: &RequestEngine) -> io::Result<()> {
        if self
            .last_publish
            .is_some_and(|last| last.elapsed() < self.interval)
        {
            return Ok(());
        }
        self.publish(registry, engine)
    }

    /// Write a snapshot now. Does nothing without a configured path.
    pub fn publish(&mut self, registry: &ChipRegistry, engine: &RequestEngine) -> io::Result<()> {
        self.last_publish = Some(Instant::now());
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let status = self.snapshot(registry, engine);
        let json = serde_json::to_vec_pretty(&status).map_err(io::Error::other)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!("Published status (state={:?}, {} chips)", status.state, status.chips.len());
        Ok(())
    }
}
