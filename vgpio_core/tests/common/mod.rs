//! Shared harness for vgpio_core integration tests.
//!
//! Runs a `BridgeService` on its own thread over a loopback bus, with
//! short timeouts so failure paths stay fast.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use vgpio_common::config::CoreConfig;
use vgpio_common::protocol::Message;
use vgpio_core::transport::{LoopbackPort, Transport};
use vgpio_core::{BridgeService, ChipRegistry, LineTable, LoopbackBus, RequestEngine, SimBridge};

/// Reply timeout used by the harness.
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(200);

/// How long a bridge waits for an ack.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration with short timeouts.
pub fn test_config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.engine.reply_timeout_ms = REPLY_TIMEOUT.as_millis() as u64;
    config.transport.poll_interval_ms = 5;
    config
}

/// A running core attached to a loopback bus.
pub struct Harness {
    pub bus: LoopbackBus,
    pub table: Arc<LineTable>,
    pub registry: Arc<ChipRegistry>,
    pub engine: Arc<RequestEngine>,
    running: Arc<AtomicBool>,
    service: Option<JoinHandle<()>>,
}

impl Harness {
    /// Start a core with [`test_config`].
    pub fn start() -> Self {
        Self::with_config(test_config())
    }

    /// Start a core with `config`.
    pub fn with_config(config: CoreConfig) -> Self {
        let bus = LoopbackBus::new();
        let table = Arc::new(LineTable::new());
        let mut service = BridgeService::new(&config, Arc::new(bus.attach()), table.clone());
        let registry = Arc::clone(service.registry());
        let engine = Arc::clone(service.engine());
        let running = service.running_flag();

        let handle = thread::Builder::new()
            .name("vgpio-test-service".to_string())
            .spawn(move || {
                service.run().expect("receive loop failed");
                service.shutdown().expect("shutdown failed");
            })
            .expect("failed to spawn service thread");

        Self {
            bus,
            table,
            registry,
            engine,
            running,
            service: Some(handle),
        }
    }

    /// Start a simulated bridge for chip `uid` on the bus.
    pub fn sim(&self, uid: u64, line_count: u32) -> SimBridge {
        let mut sim = SimBridge::new(uid, line_count, Arc::new(self.bus.attach()));
        sim.start().expect("failed to start simulated bridge");
        sim
    }

    /// Start a simulated bridge that has registered its chip.
    pub fn registered_sim(&self, uid: u64, line_count: u32) -> SimBridge {
        let sim = self.sim(uid, line_count);
        assert_eq!(sim.init(ACK_TIMEOUT).expect("no Init-Ack"), 0);
        sim
    }

    /// A raw port on the bus.
    pub fn port(&self) -> LoopbackPort {
        self.bus.attach()
    }

    /// Stop the service and wait for its shutdown to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.service.take() {
            handle.join().expect("service thread panicked");
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.stop();
        } else {
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

/// Receive on `port` until `accept` returns `Some`, or panic after `ACK_TIMEOUT`.
pub fn expect_message<T>(port: &LoopbackPort, mut accept: impl FnMut(&Message) -> Option<T>) -> T {
    let deadline = Instant::now() + ACK_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(message) = port.recv(Duration::from_millis(10)).expect("recv failed") {
            if let Some(found) = accept(&message) {
                return found;
            }
        }
    }
    panic!("expected message did not arrive");
}

/// Poll `condition` until it holds, or panic after `ACK_TIMEOUT`.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + ACK_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {what}");
}
