//! Bridge service: receive loop, control worker and shutdown.
//!
//! The `BridgeService` owns the chip registry, the request/reply engine and
//! the lifecycle manager, and connects them to a transport:
//!
//! - line replies are dispatched inline on the receive thread
//! - `Init` and `Deinit` are queued to a control worker thread, which
//!   answers with `InitAck` / `DeinitAck`
//! - everything else (our own requests echoed back, other cores' acks) is
//!   ignored
//!
//! Lifecycle work never runs on the receive thread: a deinitialize waiting
//! for a chip lock held by a line operation must not block delivery of
//! that operation's reply.

use crate::engine::RequestEngine;
use crate::framework::LineFramework;
use crate::lifecycle::LifecycleManager;
use crate::registry::ChipRegistry;
use crate::status::{ServiceState, ServiceStatus, StatusPublisher};
use crate::transport::{Transport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use vgpio_common::config::CoreConfig;
use vgpio_common::consts::{API_VERSION, EXIT_MESSAGE, UID_BROADCAST};
use vgpio_common::error::ack_status;
use vgpio_common::protocol::Message;

/// Service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The control worker thread could not be started.
    #[error("failed to spawn control worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The transport failed in a way the receive loop cannot survive.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// The vgpio core service.
pub struct BridgeService {
    transport: Arc<dyn Transport>,
    registry: Arc<ChipRegistry>,
    engine: Arc<RequestEngine>,
    lifecycle: Arc<LifecycleManager>,
    /// Running flag for receive loop control
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    status: StatusPublisher,
    stopped: bool,
}

impl BridgeService {
    /// Build the service from its configuration, a transport and the line
    /// framework chips are exposed through.
    pub fn new(
        config: &CoreConfig,
        transport: Arc<dyn Transport>,
        framework: Arc<dyn LineFramework>,
    ) -> Self {
        let registry = Arc::new(ChipRegistry::new());
        let engine = Arc::new(RequestEngine::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            config.engine.reply_timeout(),
        ));
        let lifecycle = Arc::new(
            LifecycleManager::new(Arc::clone(&registry), Arc::clone(&engine), framework)
                .with_max_chips(config.lifecycle.max_chips),
        );

        info!(
            "BridgeService '{}' created (reply timeout {:?}, max chips {:?})",
            config.shared.service_name,
            config.engine.reply_timeout(),
            config.lifecycle.max_chips
        );

        Self {
            transport,
            registry,
            engine,
            lifecycle,
            running: Arc::new(AtomicBool::new(true)),
            poll_interval: config.transport.poll_interval(),
            status: StatusPublisher::new(&config.shared.service_name, &config.status),
            stopped: false,
        }
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Chip registry.
    pub fn registry(&self) -> &Arc<ChipRegistry> {
        &self.registry
    }

    /// Request/reply engine.
    pub fn engine(&self) -> &Arc<RequestEngine> {
        &self.engine
    }

    /// Lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Current status snapshot.
    pub fn status(&self) -> ServiceStatus {
        self.status.snapshot(&self.registry, &self.engine)
    }

    /// Run the receive loop.
    ///
    /// Blocks until the running flag is cleared or the transport closes.
    ///
    /// # Errors
    /// Returns error if the control worker cannot start or the transport
    /// closed underneath the loop.
    pub fn run(&mut self) -> Result<(), ServiceError> {
        let (control_tx, control_rx) = mpsc::channel();
        let worker = spawn_control_worker(
            control_rx,
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.transport),
        )?;

        info!("Starting receive loop (poll interval {:?})", self.poll_interval);
        self.status.set_state(ServiceState::Running);
        self.publish_status(true);

        let mut result = Ok(());
        while self.running.load(Ordering::SeqCst) {
            match self.transport.recv(self.poll_interval) {
                Ok(Some(message)) => self.route(message, &control_tx),
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    error!("Transport closed, leaving receive loop");
                    result = Err(ServiceError::Transport(TransportError::Closed));
                    break;
                }
                Err(e) => warn!("Dropping inbound frame: {}", e),
            }
            self.publish_status(false);
        }

        drop(control_tx);
        if worker.join().is_err() {
            error!("Control worker panicked");
        }

        let counters = self.engine.counters();
        info!(
            "Receive loop stopped ({} requests, {} replies dispatched, {} dropped, {} timeouts)",
            counters.sent, counters.dispatched, counters.dropped, counters.timed_out
        );
        result
    }

    fn route(&self, message: Message, control: &Sender<Message>) {
        if message.is_line_reply() {
            self.engine.dispatch(&message);
        } else if message.is_control() {
            if control.send(message).is_err() {
                warn!("Control worker is gone, dropping control message");
            }
        } else {
            trace!("Ignoring {} for uid {}", message.kind(), message.uid());
        }
    }

    fn publish_status(&mut self, force: bool) {
        let result = if force {
            self.status.publish(&self.registry, &self.engine)
        } else {
            self.status.update(&self.registry, &self.engine)
        };
        if let Err(e) = result {
            debug!("Failed to publish status: {}", e);
        }
    }

    /// Stop the service: broadcast `Exit` and tear down every chip.
    ///
    /// Safe to call more than once; only the first call has effect.
    pub fn shutdown(&mut self) -> Result<(), ServiceError> {
        if self.stopped {
            return Ok(());
        }
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        self.stopped = true;

        let exit = Message::Exit {
            uid: UID_BROADCAST,
            message: EXIT_MESSAGE.to_string(),
        };
        send_best_effort(self.transport.as_ref(), &exit);

        let count = self.lifecycle.teardown_all();
        info!("Shutdown complete ({} chip(s) torn down)", count);

        self.status.set_state(ServiceState::Stopped);
        self.publish_status(true);
        Ok(())
    }
}

fn spawn_control_worker(
    rx: Receiver<Message>,
    lifecycle: Arc<LifecycleManager>,
    transport: Arc<dyn Transport>,
) -> Result<JoinHandle<()>, ServiceError> {
    thread::Builder::new()
        .name("vgpio-control".to_string())
        .spawn(move || {
            for message in rx {
                handle_control(&lifecycle, transport.as_ref(), message);
            }
            debug!("Control worker exiting");
        })
        .map_err(ServiceError::Spawn)
}

/// Handle one `Init` or `Deinit` and send its ack.
fn handle_control(lifecycle: &LifecycleManager, transport: &dyn Transport, message: Message) {
    let ack = match message {
        Message::Init {
            uid,
            line_count,
            label,
            names,
        } => {
            let result = lifecycle.register(uid, &label, line_count, names).map(|_| ());
            if let Err(e) = &result {
                warn!("Init of chip uid {} failed: {}", uid, e);
            }
            Message::InitAck {
                uid,
                status: ack_status(&result),
            }
        }
        Message::Deinit { uid } => {
            let result = lifecycle.deinitialize(uid);
            if let Err(e) = &result {
                warn!("Deinit of chip uid {} failed: {}", uid, e);
            }
            Message::DeinitAck {
                uid,
                status: ack_status(&result),
                version: API_VERSION,
            }
        }
        other => {
            debug!("Control worker ignoring {}", other.kind());
            return;
        }
    };
    send_best_effort(transport, &ack);
}

fn send_best_effort(transport: &dyn Transport, message: &Message) {
    match transport.send(message) {
        Ok(()) => {}
        Err(TransportError::NoSubscribers) => {
            debug!("No bridge listening for {}", message.kind());
        }
        Err(e) => warn!("Failed to send {}: {}", message.kind(), e),
    }
}
