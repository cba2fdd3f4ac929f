// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hardware completion events.
//!
//! The listener thread blocks on a [`HardwareEventSource`] and wakes idle
//! workers on every event, so tasks parked with `CallStatus::Busy` are retried
//! without each worker polling the device.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Source of accelerator completion signals.
pub trait HardwareEventSource: Send + Sync {
    /// Block until an event arrives or `timeout` passes. Returns `true` on an
    /// event.
    fn wait_for_event(&self, timeout: Duration) -> bool;

    /// Make a pending `wait_for_event` return early.
    fn interrupt(&self) {}
}

enum HwMessage {
    Event,
    Interrupt,
}

/// Channel-backed event source. Drivers call [`HardwareSignal::notify`].
pub struct ChannelEventSource {
    tx: Sender<HwMessage>,
    rx: Receiver<HwMessage>,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn signal(&self) -> HardwareSignal {
        HardwareSignal {
            tx: self.tx.clone(),
        }
    }
}

impl Default for ChannelEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareEventSource for ChannelEventSource {
    fn wait_for_event(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(HwMessage::Event) => true,
            Ok(HwMessage::Interrupt) => false,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn interrupt(&self) {
        let _ = self.tx.send(HwMessage::Interrupt);
    }
}

/// Cloneable sender for hardware completion events.
#[derive(Clone)]
pub struct HardwareSignal {
    tx: Sender<HwMessage>,
}

impl HardwareSignal {
    pub fn notify(&self) -> bool {
        self.tx.send(HwMessage::Event).is_ok()
    }
}

impl std::fmt::Debug for HardwareSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSignal").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_and_timeout() {
        let source = ChannelEventSource::new();
        assert!(!source.wait_for_event(Duration::from_millis(5)));
        assert!(source.signal().notify());
        assert!(source.wait_for_event(Duration::from_millis(5)));
    }

    #[test]
    fn test_interrupt_is_not_an_event() {
        let source = ChannelEventSource::new();
        source.interrupt();
        assert!(!source.wait_for_event(Duration::from_secs(5)));
    }
}
