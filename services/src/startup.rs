// Licensed under the Apache-2.0 license

//! One-time platform bring-up aggregator. Runs one init step per tick
//! (keeping the superloop responsive) and notifies
//! [`Event::StartupComplete`] once the sequence reports done.

use state_machine::{Event, MachineCore, StateDesc, StateId, StateMachine, TickContext};

/// Platform init sequence seam. `step` performs at most one pending piece
/// of work and returns whether the whole sequence has finished.
pub trait InitSequence {
    fn step(&mut self) -> bool;
}

const S_RUN: StateId = 0;
const S_IDLE: StateId = 1;

pub struct StartupContext<S> {
    sequence: S,
}

pub fn startup_machine<S: InitSequence>(sequence: S, priority: u8) -> StateMachine<StartupContext<S>> {
    StateMachine::new(
        "startup_service",
        priority,
        S_RUN,
        StartupContext { sequence },
        &[
            StateDesc::new(S_RUN, "run", None, None, run_handler::<S>),
            StateDesc::new(S_IDLE, "idle", None, None, idle_handler::<S>),
        ],
    )
}

fn run_handler<S: InitSequence>(
    core: &mut MachineCore,
    cx: &mut StartupContext<S>,
    ctx: &mut TickContext,
) {
    if cx.sequence.step() {
        log::info!("startup: init sequence complete");
        ctx.triggers.notify(Event::StartupComplete);
        core.state = S_IDLE;
    }
}

fn idle_handler<S: InitSequence>(
    _core: &mut MachineCore,
    _cx: &mut StartupContext<S>,
    _ctx: &mut TickContext,
) {
}
