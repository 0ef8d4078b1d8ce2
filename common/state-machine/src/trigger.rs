// Licensed under the Apache-2.0 license

//! Level-latched event signals for decoupled cross-machine notification.
//!
//! Signals are sticky: once notified they stay set until explicitly
//! cleared, so a consumer scheduled on a later tick than its producer still
//! observes the event. By convention each signal has a single producer.

/// The closed set of cross-machine signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// DDR training finished; main memory is usable.
    DdrTrained,
    /// One-time platform bring-up is complete.
    StartupComplete,
    /// The boot service has accepted an image and begun dispatching chunks.
    BootStarted,
    /// All harts have been handed their boot chunks and released.
    BootComplete,
    /// Boot has finished; preboot-only services should stand down.
    PostBoot,
    /// The user asked for USB mass-storage mode before boot.
    UsbdmscRequested,
    /// The mass-storage gadget is up and exposing storage.
    UsbdmscActive,
}

impl Event {
    pub const COUNT: usize = 7;

    fn index(self) -> usize {
        self as usize
    }
}

/// The shared signal table, passed by reference into every machine's tick.
///
/// There is no locking: mutual exclusion is structural, because exactly one
/// machine handler runs at a time under the cooperative scheduler.
#[derive(Default)]
pub struct TriggerBus {
    latched: [bool; Event::COUNT],
}

impl TriggerBus {
    pub const fn new() -> Self {
        Self {
            latched: [false; Event::COUNT],
        }
    }

    /// Latches `event`. Idempotent.
    pub fn notify(&mut self, event: Event) {
        self.latched[event.index()] = true;
    }

    /// Reads the latch without side effects.
    pub fn is_notified(&self, event: Event) -> bool {
        self.latched[event.index()]
    }

    /// Resets the latch. A no-op when the signal is not set.
    pub fn clear(&mut self, event: Event) {
        self.latched[event.index()] = false;
    }
}
