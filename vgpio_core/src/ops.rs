//! GPIO operations exposed to line consumers.
//!
//! Every operation takes the chip lock, requires an initialized chip and a
//! pin on the chip, and performs at most the bridge round trips it names.
//! Cached line state only changes after the bridge answered OK.

use crate::chip::{Chip, ChipGuard};
use crate::engine::{Reply, Request, RequestEngine};
use static_assertions::assert_impl_all;
use std::sync::Arc;
use tracing::debug;
use vgpio_common::error::BridgeError;
use vgpio_common::protocol::{ConfigKind, Direction};

/// Direction requested by a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    /// Sample the line.
    Input,
    /// Drive the line, starting at the given level.
    Output(bool),
    /// Release the line.
    Disabled,
}

/// Pin configuration parameter requested by a consumer.
///
/// Only the bias and drive parameters are forwarded to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinConfig {
    /// Disable bias.
    BiasDisable,
    /// Keep the last level with a weak latch.
    BiasBusHold,
    /// Pull down.
    BiasPullDown,
    /// Pull up.
    BiasPullUp,
    /// Open drain.
    DriveOpenDrain,
    /// Open source.
    DriveOpenSource,
    /// Push-pull.
    DrivePushPull,
    /// Drive strength in mA.
    DriveStrength(u32),
    /// Input debounce in µs.
    InputDebounce(u32),
    /// Schmitt trigger on/off.
    InputSchmittTrigger(bool),
    /// Keep line state across suspend or reset.
    PersistState(bool),
}

impl PinConfig {
    /// Wire kind to forward, `None` for a local no-op.
    ///
    /// # Errors
    /// Returns `BridgeError::Unsupported` for parameters the bridge does not
    /// handle.
    pub fn to_kind(self) -> Result<Option<ConfigKind>, BridgeError> {
        match self {
            Self::BiasDisable => Ok(Some(ConfigKind::BiasDisable)),
            Self::BiasPullDown => Ok(Some(ConfigKind::BiasPullDown)),
            Self::BiasPullUp => Ok(Some(ConfigKind::BiasPullUp)),
            Self::DriveOpenDrain => Ok(Some(ConfigKind::DriveOpenDrain)),
            Self::DriveOpenSource => Ok(Some(ConfigKind::DriveOpenSource)),
            Self::DrivePushPull => Ok(Some(ConfigKind::DrivePushPull)),
            Self::PersistState(_) => Ok(None),
            Self::BiasBusHold
            | Self::DriveStrength(_)
            | Self::InputDebounce(_)
            | Self::InputSchmittTrigger(_) => Err(BridgeError::Unsupported),
        }
    }
}

/// Line operations a framework dispatches into a chip.
pub trait GpioOps: Send + Sync {
    /// Read the level from the bridge.
    fn get_value(&self, pin: u32) -> Result<bool, BridgeError>;

    /// Drive the level.
    fn set_value(&self, pin: u32, value: bool) -> Result<(), BridgeError>;

    /// Apply a pin configuration.
    fn set_config(&self, pin: u32, config: PinConfig) -> Result<(), BridgeError>;

    /// Change direction. `Output(v)` also drives `v`.
    fn set_direction(&self, pin: u32, mode: LineMode) -> Result<(), BridgeError>;

    /// Cached direction; no bridge round trip.
    fn get_direction(&self, pin: u32) -> Result<Direction, BridgeError>;

    /// Release the line (direction `Disabled`).
    fn free(&self, pin: u32) -> Result<(), BridgeError>;
}

/// [`GpioOps`] for one chip.
pub struct ChipOps {
    chip: Arc<Chip>,
    engine: Arc<RequestEngine>,
}

assert_impl_all!(ChipOps: Send, Sync);

impl ChipOps {
    /// Bind operations to `chip`.
    pub fn new(chip: Arc<Chip>, engine: Arc<RequestEngine>) -> Self {
        Self { chip, engine }
    }

    /// The chip these operations act on.
    pub fn chip(&self) -> &Arc<Chip> {
        &self.chip
    }

    fn ready(&self, pin: u32) -> Result<ChipGuard<'_>, BridgeError> {
        let guard = self.chip.lock();
        if !self.chip.is_initialized() {
            return Err(BridgeError::NotReady);
        }
        self.chip.check_pin(pin)?;
        Ok(guard)
    }

    fn write_value(
        &self,
        guard: &mut ChipGuard<'_>,
        pin: u32,
        value: bool,
    ) -> Result<(), BridgeError> {
        self.engine
            .call(&self.chip, guard, pin, Request::SetValue(value))?;
        if let Some(line) = guard.line_mut(pin) {
            line.value = value;
        }
        Ok(())
    }

    fn write_direction(
        &self,
        guard: &mut ChipGuard<'_>,
        pin: u32,
        direction: Direction,
    ) -> Result<(), BridgeError> {
        self.engine
            .call(&self.chip, guard, pin, Request::SetDirection(direction))?;
        if let Some(line) = guard.line_mut(pin) {
            line.direction = direction;
        }
        Ok(())
    }
}

impl GpioOps for ChipOps {
    fn get_value(&self, pin: u32) -> Result<bool, BridgeError> {
        let mut guard = self.ready(pin)?;
        let value = match self.engine.call(&self.chip, &guard, pin, Request::GetValue)? {
            Reply::Value(value) => value,
            Reply::Done => {
                return Err(BridgeError::ProtocolViolation(
                    "get-value answered without a level".to_string(),
                ));
            }
        };
        if let Some(line) = guard.line_mut(pin) {
            line.value = value;
        }
        Ok(value)
    }

    fn set_value(&self, pin: u32, value: bool) -> Result<(), BridgeError> {
        let mut guard = self.ready(pin)?;
        self.write_value(&mut guard, pin, value)
    }

    fn set_config(&self, pin: u32, config: PinConfig) -> Result<(), BridgeError> {
        let guard = self.ready(pin)?;
        let Some(kind) = config.to_kind()? else {
            debug!(uid = self.chip.uid(), pin, "{:?} handled locally", config);
            return Ok(());
        };
        self.engine
            .call(&self.chip, &guard, pin, Request::SetConfig(kind))?;
        Ok(())
    }

    fn set_direction(&self, pin: u32, mode: LineMode) -> Result<(), BridgeError> {
        let mut guard = self.ready(pin)?;
        match mode {
            LineMode::Input => self.write_direction(&mut guard, pin, Direction::Input),
            LineMode::Disabled => self.write_direction(&mut guard, pin, Direction::Disabled),
            LineMode::Output(value) => {
                self.write_direction(&mut guard, pin, Direction::Output)?;
                self.write_value(&mut guard, pin, value)
            }
        }
    }

    fn get_direction(&self, pin: u32) -> Result<Direction, BridgeError> {
        let guard = self.chip.lock();
        guard
            .line(pin)
            .map(|line| line.direction)
            .ok_or(BridgeError::InvalidLine {
                pin,
                line_count: self.chip.line_count(),
            })
    }

    fn free(&self, pin: u32) -> Result<(), BridgeError> {
        self.set_direction(pin, LineMode::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChipRegistry;
    use crate::transport::LoopbackBus;
    use std::time::Duration;

    fn ops(line_count: usize) -> ChipOps {
        let bus = LoopbackBus::new();
        let registry = Arc::new(ChipRegistry::new());
        let engine = Arc::new(RequestEngine::new(
            Arc::new(bus.attach()),
            Arc::clone(&registry),
            Duration::from_millis(20),
        ));
        let names = (0..line_count).map(|i| format!("l{i}")).collect();
        let chip = Arc::new(Chip::new(5, "ops", names));
        registry.insert(Arc::clone(&chip)).unwrap();
        ChipOps::new(chip, engine)
    }

    #[test]
    fn config_allow_list() {
        assert_eq!(
            PinConfig::BiasPullUp.to_kind(),
            Ok(Some(ConfigKind::BiasPullUp))
        );
        assert_eq!(
            PinConfig::DriveOpenSource.to_kind(),
            Ok(Some(ConfigKind::DriveOpenSource))
        );
        assert_eq!(PinConfig::PersistState(true).to_kind(), Ok(None));
        assert_eq!(
            PinConfig::DriveStrength(4).to_kind(),
            Err(BridgeError::Unsupported)
        );
        assert_eq!(
            PinConfig::BiasBusHold.to_kind(),
            Err(BridgeError::Unsupported)
        );
    }

    #[test]
    fn unsupported_config_sends_nothing() {
        let ops = ops(1);
        assert_eq!(
            ops.set_config(0, PinConfig::InputDebounce(100)),
            Err(BridgeError::Unsupported)
        );
        assert_eq!(ops.set_config(0, PinConfig::PersistState(false)), Ok(()));
        assert_eq!(ops.engine.counters().sent, 0);
    }

    #[test]
    fn uninitialized_chip_is_not_ready() {
        let ops = ops(1);
        let guard = ops.chip().lock();
        ops.chip().set_initialized(&guard, false);
        drop(guard);

        assert_eq!(ops.get_value(0), Err(BridgeError::NotReady));
        assert_eq!(ops.set_value(0, true), Err(BridgeError::NotReady));
        assert_eq!(ops.free(0), Err(BridgeError::NotReady));
        // Cached reads stay available.
        assert_eq!(ops.get_direction(0), Ok(Direction::Input));
    }

    #[test]
    fn out_of_range_pin_rejected() {
        let ops = ops(2);
        let invalid = Err(BridgeError::InvalidLine {
            pin: 2,
            line_count: 2,
        });
        assert_eq!(ops.set_value(2, true), invalid);
        assert_eq!(ops.get_direction(2).map(|_| ()), invalid);
        assert_eq!(ops.engine.counters().sent, 0);
    }

    #[test]
    fn failed_write_keeps_cached_state() {
        let ops = ops(1);
        assert_eq!(
            ops.set_direction(0, LineMode::Output(true)),
            Err(BridgeError::Unresponsive)
        );
        assert_eq!(ops.get_direction(0), Ok(Direction::Input));
        let guard = ops.chip().lock();
        assert!(!guard.line(0).unwrap().value);
    }
}
