//! Virtual chip: line states, lifecycle flags and the chip lock.
//!
//! All line contents and both lifecycle flags are guarded by the chip lock.
//! The flags are mirrored in atomics so that the registry, the dispatcher
//! and the status snapshot can read them without taking the lock; they are
//! only ever written through a [`ChipGuard`] of the same chip.

use crate::framework::FrameworkHandle;
use crate::line::{LineState, WaitCell};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use static_assertions::assert_impl_all;
use std::sync::atomic::{AtomicBool, Ordering};
use vgpio_common::error::BridgeError;

/// Lock-protected part of a chip.
#[derive(Debug)]
pub struct ChipState {
    lines: Vec<LineState>,
    handle: Option<FrameworkHandle>,
}

impl ChipState {
    /// Cached state of `pin`.
    pub fn line(&self, pin: u32) -> Option<&LineState> {
        self.lines.get(pin as usize)
    }

    /// Mutable cached state of `pin`.
    pub fn line_mut(&mut self, pin: u32) -> Option<&mut LineState> {
        self.lines.get_mut(pin as usize)
    }

    /// Framework handle while the chip is exposed.
    pub fn handle(&self) -> Option<FrameworkHandle> {
        self.handle
    }

    /// Record or clear the framework handle.
    pub fn set_handle(&mut self, handle: Option<FrameworkHandle>) {
        self.handle = handle;
    }
}

/// Proof that the chip lock is held.
pub type ChipGuard<'a> = MutexGuard<'a, ChipState>;

/// One virtual GPIO controller.
#[derive(Debug)]
pub struct Chip {
    uid: u64,
    label: String,
    names: Vec<String>,
    cells: Box<[WaitCell]>,
    state: Mutex<ChipState>,
    initialized: AtomicBool,
    registered: AtomicBool,
    retired: AtomicBool,
}

assert_impl_all!(Chip: Send, Sync);

impl Chip {
    /// Allocate a chip with one fresh line per name.
    ///
    /// The chip starts `initialized` and not `registered`; it is not yet
    /// visible to anyone but its creator.
    pub fn new(uid: u64, label: impl Into<String>, names: Vec<String>) -> Self {
        let lines = vec![LineState::default(); names.len()];
        let cells = names.iter().map(|_| WaitCell::new()).collect();
        Self {
            uid,
            label: label.into(),
            names,
            cells,
            state: Mutex::new(ChipState {
                lines,
                handle: None,
            }),
            initialized: AtomicBool::new(true),
            registered: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }
    }

    /// Bridge-chosen identifier.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Human-readable chip label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Line names, one per line.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of lines.
    pub fn line_count(&self) -> u32 {
        self.names.len() as u32
    }

    /// Take the chip lock.
    pub fn lock(&self) -> ChipGuard<'_> {
        self.state.lock()
    }

    /// Wait-cell of `pin`. Never needs the chip lock.
    pub fn cell(&self, pin: u32) -> Option<&WaitCell> {
        self.cells.get(pin as usize)
    }

    /// Fail with `InvalidLine` if `pin` is not on this chip.
    pub fn check_pin(&self, pin: u32) -> Result<(), BridgeError> {
        if pin < self.line_count() {
            Ok(())
        } else {
            Err(BridgeError::InvalidLine {
                pin,
                line_count: self.line_count(),
            })
        }
    }

    /// Whether the chip accepts line operations.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether the chip is exposed through the line framework.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Whether the chip was evicted or torn down. Retired chips never
    /// receive replies again.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Set `initialized`.
    ///
    /// # Panics
    /// If `guard` is not this chip's lock.
    pub fn set_initialized(&self, guard: &ChipGuard<'_>, value: bool) {
        assert!(self.owns(guard), "guard of another chip");
        self.initialized.store(value, Ordering::Release);
    }

    /// Set `registered`.
    ///
    /// # Panics
    /// If `guard` is not this chip's lock.
    pub fn set_registered(&self, guard: &ChipGuard<'_>, value: bool) {
        assert!(self.owns(guard), "guard of another chip");
        self.registered.store(value, Ordering::Release);
    }

    /// Mark the chip retired. Irreversible.
    ///
    /// # Panics
    /// If `guard` is not this chip's lock.
    pub fn retire(&self, guard: &ChipGuard<'_>) {
        assert!(self.owns(guard), "guard of another chip");
        self.retired.store(true, Ordering::Release);
    }

    /// True if `guard` locks this chip.
    pub fn owns(&self, guard: &ChipGuard<'_>) -> bool {
        std::ptr::eq(MutexGuard::mutex(guard), &self.state)
    }

    /// Point-in-time summary for logs and the status snapshot.
    pub fn summary(&self) -> ChipSummary {
        ChipSummary {
            uid: self.uid,
            label: self.label.clone(),
            line_count: self.line_count(),
            initialized: self.is_initialized(),
            registered: self.is_registered(),
        }
    }
}

/// Serializable view of a chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChipSummary {
    /// Chip uid
    pub uid: u64,
    /// Chip label
    pub label: String,
    /// Number of lines
    pub line_count: u32,
    /// Accepting line operations
    pub initialized: bool,
    /// Exposed through the framework
    pub registered: bool,
}
