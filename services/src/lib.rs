// Licensed under the Apache-2.0 license

//! Hardware-facing bring-up services, one cooperative state machine each.
//!
//! Hardware access lives behind narrow traits so the machines stay
//! host-testable; the platform supplies implementations at registration
//! time. Services coordinate exclusively through the shared
//! [`state_machine::TriggerBus`].

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod ddr;
pub mod gpio_ui;
pub mod memtest;
pub mod startup;
pub mod usbdmsc;
