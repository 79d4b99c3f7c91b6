//! Line-consumer framework interface and the in-memory line table.
//!
//! The core exposes each registered chip through a [`LineFramework`]. The
//! framework hands consumers lines of exposed chips and reports which lines
//! are held, which is what blocks a chip from being deinitialized.
//!
//! [`LineTable`] is the in-process framework used by the service binary and
//! the tests.

use crate::ops::GpioOps;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use vgpio_common::error::BridgeError;

/// Opaque handle for an exposed chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameworkHandle(u64);

/// What the framework needs to know about a chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipDescriptor {
    /// Chip uid
    pub uid: u64,
    /// Chip label
    pub label: String,
    /// One name per line
    pub names: Vec<String>,
}

impl ChipDescriptor {
    /// Number of lines.
    pub fn line_count(&self) -> u32 {
        self.names.len() as u32
    }
}

/// Interface the core consumes to expose chips.
pub trait LineFramework: Send + Sync {
    /// Expose a chip whose lines are served by `ops`.
    fn add_chip(
        &self,
        descriptor: ChipDescriptor,
        ops: Arc<dyn GpioOps>,
    ) -> Result<FrameworkHandle, BridgeError>;

    /// Withdraw an exposed chip.
    fn remove_chip(&self, handle: FrameworkHandle);

    /// Whether a consumer holds `pin` of the chip.
    fn is_line_held(&self, handle: FrameworkHandle, pin: u32) -> bool;
}

struct ExposedChip {
    descriptor: ChipDescriptor,
    ops: Arc<dyn GpioOps>,
    /// Consumer name per held line.
    held: Vec<Option<String>>,
}

/// In-memory [`LineFramework`].
///
/// Chips are addressed by uid. Requesting a line marks it held; releasing
/// it calls [`GpioOps::free`] first.
#[derive(Default)]
pub struct LineTable {
    next_handle: AtomicU64,
    chips: Mutex<HashMap<FrameworkHandle, ExposedChip>>,
}

impl LineTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn find_uid<'a>(
        chips: &'a mut HashMap<FrameworkHandle, ExposedChip>,
        uid: u64,
    ) -> Option<&'a mut ExposedChip> {
        chips.values_mut().find(|chip| chip.descriptor.uid == uid)
    }

    /// Hold `pin` of chip `uid` for `consumer` and return its operations.
    ///
    /// # Errors
    /// - `Framework` if no chip with `uid` is exposed
    /// - `InvalidLine` if `pin` is not on the chip
    /// - `Busy` if another consumer holds the line
    pub fn request_line(
        &self,
        uid: u64,
        pin: u32,
        consumer: &str,
    ) -> Result<Arc<dyn GpioOps>, BridgeError> {
        let mut chips = self.chips.lock();
        let chip = Self::find_uid(&mut chips, uid)
            .ok_or_else(|| BridgeError::Framework(format!("no chip with uid {uid}")))?;
        let line_count = chip.descriptor.line_count();
        let slot = chip
            .held
            .get_mut(pin as usize)
            .ok_or(BridgeError::InvalidLine { pin, line_count })?;
        if let Some(owner) = slot {
            debug!("line {}:{} already held by {}", uid, pin, owner);
            return Err(BridgeError::Busy);
        }
        *slot = Some(consumer.to_string());
        debug!("line {}:{} requested by {}", uid, pin, consumer);
        Ok(Arc::clone(&chip.ops))
    }

    /// Release `pin` of chip `uid`.
    ///
    /// The line is freed through the chip's operations without holding the
    /// table lock, then unmarked. A failing free is logged and the line is
    /// released anyway.
    ///
    /// # Errors
    /// Returns `Framework` if the line is not held.
    pub fn release_line(&self, uid: u64, pin: u32) -> Result<(), BridgeError> {
        let ops = {
            let mut chips = self.chips.lock();
            let chip = Self::find_uid(&mut chips, uid)
                .ok_or_else(|| BridgeError::Framework(format!("no chip with uid {uid}")))?;
            match chip.held.get(pin as usize) {
                Some(Some(_)) => Arc::clone(&chip.ops),
                _ => {
                    return Err(BridgeError::Framework(format!(
                        "line {uid}:{pin} is not held"
                    )));
                }
            }
        };

        if let Err(e) = ops.free(pin) {
            warn!("freeing line {}:{} failed: {}", uid, pin, e);
        }

        let mut chips = self.chips.lock();
        if let Some(slot) =
            Self::find_uid(&mut chips, uid).and_then(|chip| chip.held.get_mut(pin as usize))
        {
            *slot = None;
        }
        debug!("line {}:{} released", uid, pin);
        Ok(())
    }

    /// Operations of an exposed chip, without holding any line.
    pub fn chip_ops(&self, uid: u64) -> Option<Arc<dyn GpioOps>> {
        let mut chips = self.chips.lock();
        Self::find_uid(&mut chips, uid).map(|chip| Arc::clone(&chip.ops))
    }

    /// Descriptors of every exposed chip, ordered by uid.
    pub fn chips(&self) -> Vec<ChipDescriptor> {
        let mut descriptors: Vec<_> = self
            .chips
            .lock()
            .values()
            .map(|chip| chip.descriptor.clone())
            .collect();
        descriptors.sort_by_key(|d| d.uid);
        descriptors
    }

    /// Consumer holding a line, if any.
    pub fn holder(&self, uid: u64, pin: u32) -> Option<String> {
        let mut chips = self.chips.lock();
        Self::find_uid(&mut chips, uid)
            .and_then(|chip| chip.held.get(pin as usize).cloned())
            .flatten()
    }
}

impl LineFramework for LineTable {
    fn add_chip(
        &self,
        descriptor: ChipDescriptor,
        ops: Arc<dyn GpioOps>,
    ) -> Result<FrameworkHandle, BridgeError> {
        let mut chips = self.chips.lock();
        if chips.values().any(|chip| chip.descriptor.uid == descriptor.uid) {
            return Err(BridgeError::Framework(format!(
                "chip uid {} already exposed",
                descriptor.uid
            )));
        }
        let handle = FrameworkHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        info!(
            "exposing chip '{}' (uid {}, {} lines)",
            descriptor.label,
            descriptor.uid,
            descriptor.line_count()
        );
        let held = vec![None; descriptor.names.len()];
        chips.insert(
            handle,
            ExposedChip {
                descriptor,
                ops,
                held,
            },
        );
        Ok(handle)
    }

    fn remove_chip(&self, handle: FrameworkHandle) {
        if let Some(chip) = self.chips.lock().remove(&handle) {
            info!("withdrew chip '{}' (uid {})", chip.descriptor.label, chip.descriptor.uid);
        }
    }

    fn is_line_held(&self, handle: FrameworkHandle, pin: u32) -> bool {
        self.chips
            .lock()
            .get(&handle)
            .and_then(|chip| chip.held.get(pin as usize))
            .is_some_and(Option::is_some)
    }
}
