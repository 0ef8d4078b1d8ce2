// Licensed under the Apache-2.0 license

//! Cooperative state-machine scheduling core.
//!
//! Every hardware-facing service is a [`StateMachine`] driven once per outer
//! tick by the [`Scheduler`]. Machines coordinate through the level-latched
//! [`TriggerBus`]; all waiting is expressed as "not yet transitioning" and
//! revisited on a later tick. Nothing here preempts or blocks.

#![cfg_attr(not(test), no_std)]

mod clock;
mod engine;
mod scheduler;
mod trigger;

pub use clock::{is_elapsed, Clock, Tick};
pub use engine::{
    MachineCore, StateDesc, StateHook, StateId, StateMachine, TickContext, INVALID_STATE,
    MAX_STATES,
};
pub use scheduler::{Schedulable, Scheduler};
pub use trigger::{Event, TriggerBus};
