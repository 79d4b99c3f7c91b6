//! Simulated bridge.
//!
//! A [`SimBridge`] is a bridge peer backed by in-memory lines. It registers
//! its chip with `Init`, withdraws it with `Deinit`, and answers line
//! requests through a programmable responder (by default [`echo`], which
//! applies every request to the simulated lines and replies OK).
//!
//! Used by `vgpio_core --simulate` and by the integration tests.

use crate::transport::{Transport, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use vgpio_common::error::BridgeError;
use vgpio_common::protocol::{ApiVersion, ConfigKind, Direction, Message, Status};

/// Receive poll interval of the bridge thread.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One simulated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimLine {
    /// Current level
    pub value: bool,
    /// Current direction
    pub direction: Direction,
    /// Last applied configuration
    pub config: ConfigKind,
}

impl Default for SimLine {
    fn default() -> Self {
        Self {
            value: false,
            direction: Direction::Disabled,
            config: ConfigKind::BiasDisable,
        }
    }
}

/// Produces the reply to a line request, or `None` to stay silent.
pub type Responder = Box<dyn FnMut(&Message, &mut [SimLine]) -> Option<Message> + Send>;

/// Apply a line request to `lines` and reply OK.
///
/// Unknown lines are answered with `ProtocolError`, unknown direction or
/// configuration codes with `NotSupported`.
pub fn echo(message: &Message, lines: &mut [SimLine]) -> Option<Message> {
    let ok = Status::Ok.code();
    let bad_line = Status::ProtocolError.code();
    let unsupported = Status::NotSupported.code();

    let reply = match *message {
        Message::GetValue { uid, pin } => match lines.get(pin as usize) {
            Some(line) => Message::GetValueReply {
                uid,
                pin,
                status: ok,
                value: Some(u32::from(line.value)),
            },
            None => Message::GetValueReply {
                uid,
                pin,
                status: bad_line,
                value: None,
            },
        },
        Message::SetValue { uid, pin, value } => {
            let status = match lines.get_mut(pin as usize) {
                Some(line) => {
                    line.value = value != 0;
                    ok
                }
                None => bad_line,
            };
            Message::SetValueReply { uid, pin, status }
        }
        Message::SetConfig { uid, pin, config } => {
            let status = match (lines.get_mut(pin as usize), ConfigKind::from_code(config)) {
                (Some(line), Some(kind)) => {
                    line.config = kind;
                    ok
                }
                (Some(_), None) => unsupported,
                (None, _) => bad_line,
            };
            Message::SetConfigReply { uid, pin, status }
        }
        Message::SetDirection {
            uid,
            pin,
            direction,
        } => {
            let status = match (lines.get_mut(pin as usize), Direction::from_code(direction)) {
                (Some(line), Some(direction)) => {
                    line.direction = direction;
                    ok
                }
                (Some(_), None) => unsupported,
                (None, _) => bad_line,
            };
            Message::SetDirectionReply { uid, pin, status }
        }
        _ => return None,
    };
    Some(reply)
}

/// State shared with the bridge thread.
struct Shared {
    uid: u64,
    transport: Arc<dyn Transport>,
    lines: Mutex<Vec<SimLine>>,
    responder: Mutex<Responder>,
    exit: Mutex<Option<String>>,
    requests: AtomicU64,
    running: AtomicBool,
}

/// In-process bridge peer owning one simulated chip.
pub struct SimBridge {
    label: String,
    names: Vec<String>,
    shared: Arc<Shared>,
    acks: Mutex<Receiver<Message>>,
    ack_tx: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl SimBridge {
    /// Create a bridge for chip `uid` with `line_count` lines, talking over
    /// `transport`. Call [`start`](Self::start) before use.
    pub fn new(uid: u64, line_count: u32, transport: Arc<dyn Transport>) -> Self {
        let names = (0..line_count)
            .map(|pin| format!("sim-{uid}-gpio-{pin}"))
            .collect();
        let (ack_tx, ack_rx) = mpsc::channel();
        Self {
            label: format!("sim-{uid}"),
            names,
            shared: Arc::new(Shared {
                uid,
                transport,
                lines: Mutex::new(vec![SimLine::default(); line_count as usize]),
                responder: Mutex::new(Box::new(echo)),
                exit: Mutex::new(None),
                requests: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
            acks: Mutex::new(ack_rx),
            ack_tx,
            worker: None,
        }
    }

    /// Override the chip label sent with `Init`.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Override the line names sent with `Init`. The number of simulated
    /// lines is unchanged.
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    /// Chip uid.
    pub fn uid(&self) -> u64 {
        self.shared.uid
    }

    /// Replace the responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Message, &mut [SimLine]) -> Option<Message> + Send + 'static,
    {
        *self.shared.responder.lock() = Box::new(responder);
    }

    /// Start the bridge thread. Does nothing if already started.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let acks = self.ack_tx.clone();
        let worker = thread::Builder::new()
            .name(format!("sim-bridge-{}", self.shared.uid))
            .spawn(move || serve(&shared, &acks))
            .map_err(|e| BridgeError::Framework(format!("cannot start simulated bridge: {e}")))?;
        self.worker = Some(worker);
        debug!("simulated bridge uid {} started", self.shared.uid);
        Ok(())
    }

    /// Ask the core to register the chip. Returns the Init-Ack status.
    ///
    /// # Errors
    /// `Unresponsive` if no ack arrives within `timeout`.
    pub fn init(&self, timeout: Duration) -> Result<u32, BridgeError> {
        let message = Message::Init {
            uid: self.shared.uid,
            line_count: self.names.len() as u32,
            label: self.label.clone(),
            names: self.names.clone(),
        };
        match self.exchange(&message, timeout)? {
            Message::InitAck { status, .. } => Ok(status),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask the core to withdraw the chip. Returns the Deinit-Ack status and
    /// the core's API version.
    ///
    /// # Errors
    /// `Unresponsive` if no ack arrives within `timeout`.
    pub fn deinit(&self, timeout: Duration) -> Result<(u32, ApiVersion), BridgeError> {
        let message = Message::Deinit {
            uid: self.shared.uid,
        };
        match self.exchange(&message, timeout)? {
            Message::DeinitAck {
                status, version, ..
            } => Ok((status, version)),
            other => Err(unexpected(&other)),
        }
    }

    fn exchange(&self, message: &Message, timeout: Duration) -> Result<Message, BridgeError> {
        let acks = self.acks.lock();
        // Acks left over from an exchange that timed out.
        while acks.try_recv().is_ok() {}

        match self.shared.transport.send(message) {
            Ok(()) | Err(TransportError::NoSubscribers) => {}
            Err(e) => return Err(BridgeError::TransportFailure(e.to_string())),
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match acks.recv_timeout(remaining) {
                Ok(ack) if ack_answers(&ack, message) => return Ok(ack),
                Ok(ack) => trace!("ignoring stale {}", ack.kind()),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::Unresponsive);
                }
            }
        }
    }

    /// Snapshot of the simulated lines.
    pub fn lines(&self) -> Vec<SimLine> {
        self.shared.lines.lock().clone()
    }

    /// Set a line level directly, as the hardware would.
    pub fn drive(&self, pin: u32, value: bool) {
        if let Some(line) = self.shared.lines.lock().get_mut(pin as usize) {
            line.value = value;
        }
    }

    /// Number of line requests received.
    pub fn request_count(&self) -> u64 {
        self.shared.requests.load(Ordering::SeqCst)
    }

    /// Message of the last `Exit` received from the core.
    pub fn exit_message(&self) -> Option<String> {
        self.shared.exit.lock().clone()
    }

    /// Stop the bridge thread.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("simulated bridge uid {} thread panicked", self.shared.uid);
            }
        }
    }
}

impl Drop for SimBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

fn ack_answers(ack: &Message, request: &Message) -> bool {
    match (ack, request) {
        (Message::InitAck { uid, .. }, Message::Init { uid: want, .. })
        | (Message::DeinitAck { uid, .. }, Message::Deinit { uid: want }) => uid == want,
        _ => false,
    }
}

fn unexpected(message: &Message) -> BridgeError {
    BridgeError::ProtocolViolation(format!("unexpected {}", message.kind()))
}

fn serve(shared: &Shared, acks: &Sender<Message>) {
    while shared.running.load(Ordering::SeqCst) {
        let message = match shared.transport.recv(POLL_INTERVAL) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(TransportError::Closed) => break,
            Err(e) => {
                warn!("simulated bridge dropped inbound frame: {}", e);
                continue;
            }
        };

        match message {
            Message::Exit { ref message, .. } => {
                info!("core exited: {}", message);
                *shared.exit.lock() = Some(message.clone());
            }
            Message::InitAck { uid, .. } | Message::DeinitAck { uid, .. } if uid == shared.uid => {
                // Nobody waiting is fine.
                let _ = acks.send(message);
            }
            ref request if request.is_line_request() && request.uid() == shared.uid => {
                shared.requests.fetch_add(1, Ordering::SeqCst);
                let reply = {
                    let mut responder = shared.responder.lock();
                    let mut lines = shared.lines.lock();
                    let respond = &mut *responder;
                    respond(request, lines.as_mut_slice())
                };
                if let Some(reply) = reply {
                    if let Err(e) = shared.transport.send(&reply) {
                        warn!("simulated bridge could not reply: {}", e);
                    }
                }
            }
            _ => {}
        }
    }
}
