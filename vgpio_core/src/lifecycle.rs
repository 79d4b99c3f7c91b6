//! Chip lifecycle: register, deinitialize, teardown.
//!
//! ```text
//! UNREGISTERED --register--> INITIALIZED --framework add ok--> REGISTERED
//! REGISTERED --deinitialize (no held lines)--> UNREGISTERED
//! INITIALIZED --framework add fails--> rolled back
//! any --teardown_all--> retired
//! ```
//!
//! A deinitialized chip stays in the registry, unregistered, until the same
//! uid registers again or the service tears down.

use crate::chip::Chip;
use crate::engine::RequestEngine;
use crate::framework::{ChipDescriptor, LineFramework};
use crate::ops::{ChipOps, GpioOps};
use crate::registry::ChipRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vgpio_common::consts::UID_BROADCAST;
use vgpio_common::error::BridgeError;

/// Drives chips through their lifecycle.
pub struct LifecycleManager {
    registry: Arc<ChipRegistry>,
    engine: Arc<RequestEngine>,
    framework: Arc<dyn LineFramework>,
    max_chips: Option<usize>,
}

impl LifecycleManager {
    /// Create a manager without a chip limit.
    pub fn new(
        registry: Arc<ChipRegistry>,
        engine: Arc<RequestEngine>,
        framework: Arc<dyn LineFramework>,
    ) -> Self {
        Self {
            registry,
            engine,
            framework,
            max_chips: None,
        }
    }

    /// Limit the number of live chips.
    pub fn with_max_chips(mut self, max_chips: Option<usize>) -> Self {
        self.max_chips = max_chips;
        self
    }

    /// Registry the manager operates on.
    pub fn registry(&self) -> &Arc<ChipRegistry> {
        &self.registry
    }

    /// Create a chip and expose it through the framework.
    ///
    /// An empty `label` becomes `vgpio-<uid>`.
    ///
    /// # Errors
    /// - `ProtocolViolation` for uid 0, zero lines or a name count that does
    ///   not match `line_count`
    /// - `AlreadyInUse` if the uid names an initialized chip
    /// - `Busy` if a deinitialize of the uid has not settled
    /// - `ChipLimit` if the configured limit is reached
    /// - the framework's error if exposing the chip failed
    pub fn register(
        &self,
        uid: u64,
        label: &str,
        line_count: u32,
        names: Vec<String>,
    ) -> Result<Arc<Chip>, BridgeError> {
        validate(uid, line_count, &names)?;
        let label = if label.is_empty() {
            format!("vgpio-{uid}")
        } else {
            label.to_string()
        };

        let chip = {
            let mut chips = self.registry.lock();
            match chips
                .get(&uid)
                .map(|c| (c.is_initialized(), c.is_registered()))
            {
                Some((true, _)) => return Err(BridgeError::AlreadyInUse(uid)),
                Some((false, true)) => return Err(BridgeError::Busy),
                Some((false, false)) => {
                    if let Some(stale) = chips.remove(&uid) {
                        let guard = stale.lock();
                        stale.retire(&guard);
                        debug!("evicted stale chip uid {}", uid);
                    }
                }
                None => {}
            }

            if let Some(max) = self.max_chips {
                let live = chips
                    .values()
                    .filter(|chip| chip.is_initialized() || chip.is_registered())
                    .count();
                if live >= max {
                    return Err(BridgeError::ChipLimit(max));
                }
            }

            // Visible to dispatch before the framework can issue requests.
            let chip = Arc::new(Chip::new(uid, label, names));
            chips.insert(uid, Arc::clone(&chip));
            chip
        };

        let descriptor = ChipDescriptor {
            uid,
            label: chip.label().to_string(),
            names: chip.names().to_vec(),
        };
        let ops: Arc<dyn GpioOps> = Arc::new(ChipOps::new(
            Arc::clone(&chip),
            Arc::clone(&self.engine),
        ));

        match self.framework.add_chip(descriptor, ops) {
            Ok(handle) => {
                {
                    let mut guard = chip.lock();
                    guard.set_handle(Some(handle));
                    chip.set_registered(&guard, true);
                }
                info!(
                    "registered chip '{}' (uid {}, {} lines)",
                    chip.label(),
                    uid,
                    chip.line_count()
                );
                Ok(chip)
            }
            Err(e) => {
                warn!("framework refused chip uid {}: {}", uid, e);
                {
                    let mut chips = self.registry.lock();
                    if chips.get(&uid).is_some_and(|c| Arc::ptr_eq(c, &chip)) {
                        chips.remove(&uid);
                    }
                }
                let guard = chip.lock();
                chip.set_initialized(&guard, false);
                chip.retire(&guard);
                Err(e)
            }
        }
    }

    /// Withdraw a chip from the framework.
    ///
    /// Unknown or unregistered uids succeed without effect.
    ///
    /// # Errors
    /// Returns `Busy` if a consumer still holds one of the chip's lines.
    pub fn deinitialize(&self, uid: u64) -> Result<(), BridgeError> {
        let Some(chip) = self.registry.find(uid) else {
            debug!("deinitialize of unknown uid {}", uid);
            return Ok(());
        };
        if !chip.is_registered() {
            debug!("deinitialize of unregistered uid {}", uid);
            return Ok(());
        }

        let mut guard = chip.lock();
        if !chip.is_registered() {
            return Ok(());
        }
        chip.set_initialized(&guard, false);

        let Some(handle) = guard.handle() else {
            chip.set_registered(&guard, false);
            return Ok(());
        };
        let held = (0..chip.line_count()).find(|&pin| self.framework.is_line_held(handle, pin));
        if let Some(pin) = held {
            chip.set_initialized(&guard, true);
            info!("chip uid {} busy: line {} is held", uid, pin);
            return Err(BridgeError::Busy);
        }

        self.framework.remove_chip(handle);
        guard.set_handle(None);
        chip.set_registered(&guard, false);
        info!("deinitialized chip uid {}", uid);
        Ok(())
    }

    /// Withdraw and retire every chip. Returns how many there were.
    pub fn teardown_all(&self) -> usize {
        let chips = self.registry.drain();
        for chip in &chips {
            let mut guard = chip.lock();
            chip.set_initialized(&guard, false);
            if let Some(handle) = guard.handle() {
                self.framework.remove_chip(handle);
                guard.set_handle(None);
            }
            chip.set_registered(&guard, false);
            chip.retire(&guard);
        }
        if !chips.is_empty() {
            info!("tore down {} chip(s)", chips.len());
        }
        chips.len()
    }
}

fn validate(uid: u64, line_count: u32, names: &[String]) -> Result<(), BridgeError> {
    if uid == UID_BROADCAST {
        return Err(BridgeError::ProtocolViolation(format!(
            "uid {UID_BROADCAST} is reserved"
        )));
    }
    if line_count == 0 {
        return Err(BridgeError::ProtocolViolation(
            "chip must have at least one line".to_string(),
        ));
    }
    if names.len() != line_count as usize {
        return Err(BridgeError::ProtocolViolation(format!(
            "{} line names for {} lines",
            names.len(),
            line_count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::{FrameworkHandle, LineTable};
    use crate::transport::LoopbackBus;
    use std::time::Duration;

    struct RefusingFramework;

    impl LineFramework for RefusingFramework {
        fn add_chip(
            &self,
            _descriptor: ChipDescriptor,
            _ops: Arc<dyn GpioOps>,
        ) -> Result<FrameworkHandle, BridgeError> {
            Err(BridgeError::Framework("no room".to_string()))
        }
        fn remove_chip(&self, _handle: FrameworkHandle) {}
        fn is_line_held(&self, _handle: FrameworkHandle, _pin: u32) -> bool {
            false
        }
    }

    fn manager(framework: Arc<dyn LineFramework>) -> LifecycleManager {
        let bus = LoopbackBus::new();
        let registry = Arc::new(ChipRegistry::new());
        let engine = Arc::new(RequestEngine::new(
            Arc::new(bus.attach()),
            Arc::clone(&registry),
            Duration::from_millis(20),
        ));
        LifecycleManager::new(registry, engine, framework)
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("l{i}")).collect()
    }

    #[test]
    fn register_validates_input() {
        let lm = manager(Arc::new(LineTable::new()));
        for (uid, count, n) in [(0, 1, 1), (1, 0, 0), (1, 2, 1)] {
            assert!(matches!(
                lm.register(uid, "x", count, names(n)),
                Err(BridgeError::ProtocolViolation(_))
            ));
        }
        assert!(lm.registry().is_empty());
    }

    #[test]
    fn empty_label_defaults_to_uid() {
        let lm = manager(Arc::new(LineTable::new()));
        let chip = lm.register(12, "", 1, names(1)).unwrap();
        assert_eq!(chip.label(), "vgpio-12");
        assert!(chip.is_registered());
    }

    #[test]
    fn live_uid_is_in_use() {
        let lm = manager(Arc::new(LineTable::new()));
        lm.register(7, "a", 1, names(1)).unwrap();
        assert_eq!(
            lm.register(7, "b", 1, names(1)).err(),
            Some(BridgeError::AlreadyInUse(7))
        );
    }

    #[test]
    fn reregistration_replaces_stale_chip() {
        let lm = manager(Arc::new(LineTable::new()));
        let first = lm.register(7, "a", 1, names(1)).unwrap();
        lm.deinitialize(7).unwrap();
        assert!(!first.is_registered());
        assert_eq!(lm.registry().len(), 1);

        let second = lm.register(7, "a", 2, names(2)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.is_retired());
        assert_eq!(second.line_count(), 2);
        assert_eq!(lm.registry().len(), 1);
    }

    #[test]
    fn register_during_deinitialize_is_busy() {
        let lm = manager(Arc::new(LineTable::new()));
        let chip = lm.register(7, "a", 1, names(1)).unwrap();

        // Deinitialize has cleared `initialized` but not yet `registered`.
        let guard = chip.lock();
        chip.set_initialized(&guard, false);
        assert_eq!(lm.register(7, "b", 1, names(1)).err(), Some(BridgeError::Busy));
        drop(guard);

        assert!(chip.is_registered());
        assert!(!chip.is_retired());
        assert!(Arc::ptr_eq(&lm.registry().find(7).unwrap(), &chip));
    }

    #[test]
    fn framework_failure_rolls_back() {
        let lm = manager(Arc::new(RefusingFramework));
        assert_eq!(
            lm.register(3, "a", 1, names(1)).err(),
            Some(BridgeError::Framework("no room".to_string()))
        );
        assert!(lm.registry().find(3).is_none());
    }

    #[test]
    fn chip_limit_counts_live_chips() {
        let lm = manager(Arc::new(LineTable::new())).with_max_chips(Some(1));
        lm.register(1, "a", 1, names(1)).unwrap();
        assert_eq!(
            lm.register(2, "b", 1, names(1)).err(),
            Some(BridgeError::ChipLimit(1))
        );
        lm.deinitialize(1).unwrap();
        lm.register(2, "b", 1, names(1)).unwrap();
    }

    #[test]
    fn deinitialize_is_idempotent() {
        let lm = manager(Arc::new(LineTable::new()));
        assert_eq!(lm.deinitialize(42), Ok(()));
        assert_eq!(lm.deinitialize(42), Ok(()));

        lm.register(42, "a", 1, names(1)).unwrap();
        assert_eq!(lm.deinitialize(42), Ok(()));
        assert_eq!(lm.deinitialize(42), Ok(()));
    }

    #[test]
    fn held_line_blocks_deinitialize() {
        let table = Arc::new(LineTable::new());
        let lm = manager(table.clone());
        let chip = lm.register(5, "a", 2, names(2)).unwrap();

        table.request_line(5, 1, "test").unwrap();
        assert_eq!(lm.deinitialize(5), Err(BridgeError::Busy));
        assert!(chip.is_initialized());
        assert!(chip.is_registered());
    }

    #[test]
    fn teardown_retires_everything() {
        let table = Arc::new(LineTable::new());
        let lm = manager(table.clone());
        let a = lm.register(1, "a", 1, names(1)).unwrap();
        let b = lm.register(2, "b", 1, names(1)).unwrap();
        lm.deinitialize(2).unwrap();

        assert_eq!(lm.teardown_all(), 2);
        assert!(lm.registry().is_empty());
        assert!(table.chips().is_empty());
        for chip in [a, b] {
            assert!(chip.is_retired());
            assert!(!chip.is_registered());
            assert!(!chip.is_initialized());
        }
    }
}
