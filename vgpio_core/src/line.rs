//! Per-line state and the reply wait-cell.
//!
//! A [`WaitCell`] is a counting signal: every reply posts exactly once and
//! every request consumes exactly once. A reply that arrives after its
//! caller gave up stays pending and is consumed by the next request on the
//! same line.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use vgpio_common::protocol::{Direction, Status};

/// Cached state of one line. Guarded by the owning chip's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineState {
    /// Last level confirmed by the bridge.
    pub value: bool,
    /// Last direction confirmed by the bridge.
    pub direction: Direction,
}

/// What the dispatcher stored for a waiting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Status of the most recent reply.
    pub status: Status,
    /// Level carried by the most recent OK reply, if any.
    pub value: Option<bool>,
}

#[derive(Debug)]
struct CellState {
    pending: u32,
    status: Status,
    value: Option<bool>,
}

/// Counting signal a caller blocks on until the reply for its line arrives.
#[derive(Debug)]
pub struct WaitCell {
    state: Mutex<CellState>,
    signal: Condvar,
}

impl WaitCell {
    /// Create a cell with no pending signal.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState {
                pending: 0,
                status: Status::Unknown,
                value: None,
            }),
            signal: Condvar::new(),
        }
    }

    /// Store a reply and signal once.
    ///
    /// The value is only recorded for an OK status.
    pub fn post(&self, status: Status, value: Option<bool>) {
        let mut state = self.state.lock();
        state.status = status;
        if status.is_ok() {
            state.value = value;
        }
        state.pending = state.pending.saturating_add(1);
        self.signal.notify_one();
    }

    /// Wait up to `timeout` for a signal and consume it.
    ///
    /// Returns `None` if nothing was posted before the deadline.
    pub fn wait(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.pending == 0 {
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                if state.pending == 0 {
                    return None;
                }
                break;
            }
        }
        state.pending -= 1;
        Some(Outcome {
            status: state.status,
            value: state.value,
        })
    }

    /// Number of posted signals not yet consumed.
    pub fn pending(&self) -> u32 {
        self.state.lock().pending
    }
}

impl Default for WaitCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_times_out_without_post() {
        let cell = WaitCell::new();
        let start = Instant::now();
        assert_eq!(cell.wait(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn post_before_wait_is_not_lost() {
        let cell = WaitCell::new();
        cell.post(Status::Ok, Some(true));
        let outcome = cell.wait(Duration::from_millis(10)).unwrap();
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(outcome.value, Some(true));
        assert_eq!(cell.pending(), 0);
    }

    #[test]
    fn post_wakes_waiter() {
        let cell = Arc::new(WaitCell::new());
        let poster = Arc::clone(&cell);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post(Status::BrokenPipe, None);
        });
        let outcome = cell.wait(Duration::from_secs(2)).unwrap();
        assert_eq!(outcome.status, Status::BrokenPipe);
        handle.join().unwrap();
    }

    #[test]
    fn stray_post_is_consumed_by_next_wait() {
        let cell = WaitCell::new();
        assert_eq!(cell.wait(Duration::from_millis(5)), None);
        // Late reply for the request that already timed out.
        cell.post(Status::Ok, Some(false));
        assert_eq!(cell.pending(), 1);
        assert!(cell.wait(Duration::from_millis(5)).is_some());
        assert_eq!(cell.wait(Duration::from_millis(5)), None);
    }

    #[test]
    fn failed_status_keeps_previous_value() {
        let cell = WaitCell::new();
        cell.post(Status::Ok, Some(true));
        cell.post(Status::NotSupported, Some(false));
        let outcome = cell.wait(Duration::from_millis(5)).unwrap();
        assert_eq!(outcome.status, Status::NotSupported);
        assert_eq!(outcome.value, Some(true));
    }
}
