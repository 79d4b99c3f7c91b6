//! Chip registry.
//!
//! Maps chip uids to shared [`Chip`] handles. The registry lock is always
//! taken before any chip lock and is never held across a reply wait.

use crate::chip::Chip;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use vgpio_common::error::BridgeError;

/// Locked view of the registry map for composite operations.
pub type RegistryGuard<'a> = MutexGuard<'a, HashMap<u64, Arc<Chip>>>;

/// Registry of chips known to the core.
#[derive(Debug, Default)]
pub struct ChipRegistry {
    chips: Mutex<HashMap<u64, Arc<Chip>>>,
}

impl ChipRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a chip. The caller still has to take the chip lock.
    pub fn find(&self, uid: u64) -> Option<Arc<Chip>> {
        self.chips.lock().get(&uid).cloned()
    }

    /// Insert a chip.
    ///
    /// # Errors
    /// Returns `BridgeError::AlreadyInUse` if the uid is already mapped.
    pub fn insert(&self, chip: Arc<Chip>) -> Result<(), BridgeError> {
        let mut chips = self.chips.lock();
        if chips.contains_key(&chip.uid()) {
            return Err(BridgeError::AlreadyInUse(chip.uid()));
        }
        chips.insert(chip.uid(), chip);
        Ok(())
    }

    /// Remove a mapping. The chip is freed when its last handle drops.
    pub fn remove(&self, uid: u64) -> Option<Arc<Chip>> {
        self.chips.lock().remove(&uid)
    }

    /// Take every chip out of the registry.
    pub fn drain(&self) -> Vec<Arc<Chip>> {
        let mut chips: Vec<_> = self.chips.lock().drain().map(|(_, chip)| chip).collect();
        chips.sort_by_key(|chip| chip.uid());
        chips
    }

    /// Mapped uids in ascending order.
    pub fn uids(&self) -> Vec<u64> {
        let mut uids: Vec<u64> = self.chips.lock().keys().copied().collect();
        uids.sort_unstable();
        uids
    }

    /// Snapshot of every mapped chip, ordered by uid.
    pub fn chips(&self) -> Vec<Arc<Chip>> {
        let mut chips: Vec<_> = self.chips.lock().values().cloned().collect();
        chips.sort_by_key(|chip| chip.uid());
        chips
    }

    /// Number of mapped chips.
    pub fn len(&self) -> usize {
        self.chips.lock().len()
    }

    /// True if no chip is mapped.
    pub fn is_empty(&self) -> bool {
        self.chips.lock().is_empty()
    }

    /// Take the registry lock.
    pub fn lock(&self) -> RegistryGuard<'_> {
        self.chips.lock()
    }
}
