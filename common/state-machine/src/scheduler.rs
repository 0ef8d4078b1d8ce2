// Licensed under the Apache-2.0 license

//! Priority-ordered cooperative scheduler.
//!
//! Each outer tick steps every registered machine exactly once, in ascending
//! priority order. A producer scheduled earlier than a consumer makes its
//! signals visible within the same tick; a consumer scheduled earlier sees
//! them starting the following tick. The registered set is fixed while a
//! scheduler exists (the exclusive borrows make mid-tick changes
//! unrepresentable).

use crate::clock::Clock;
use crate::engine::{StateMachine, TickContext};
use crate::trigger::TriggerBus;

/// Anything the scheduler can drive. Implemented by every
/// [`StateMachine`]; the trait object erases the per-machine context type.
pub trait Schedulable {
    fn name(&self) -> &'static str;
    /// Lower runs earlier within a tick.
    fn priority(&self) -> u8;
    fn step(&mut self, ctx: &mut TickContext);
}

impl<C> Schedulable for StateMachine<C> {
    fn name(&self) -> &'static str {
        self.core().name()
    }

    fn priority(&self) -> u8 {
        self.core().priority()
    }

    fn step(&mut self, ctx: &mut TickContext) {
        StateMachine::step(self, ctx);
    }
}

pub struct Scheduler<'m, 'a> {
    machines: &'m mut [&'a mut (dyn Schedulable + 'a)],
    tick_count: u64,
}

impl<'m, 'a> Scheduler<'m, 'a> {
    /// Takes ownership of the registered set for the lifetime of the
    /// scheduler, ordering it by ascending priority. Registration order is
    /// kept for equal priorities (stable insertion sort; `core` has no
    /// stable slice sort).
    pub fn new(machines: &'m mut [&'a mut (dyn Schedulable + 'a)]) -> Self {
        let mut i = 1;
        while i < machines.len() {
            let mut j = i;
            while j > 0 && machines[j - 1].priority() > machines[j].priority() {
                machines.swap(j - 1, j);
                j -= 1;
            }
            i += 1;
        }
        Self {
            machines,
            tick_count: 0,
        }
    }

    /// Runs one outer tick: samples the clock once and steps every machine
    /// in priority order.
    pub fn tick(&mut self, clock: &dyn Clock, triggers: &mut TriggerBus) {
        let mut ctx = TickContext {
            now: clock.now(),
            triggers,
        };
        for machine in self.machines.iter_mut() {
            machine.step(&mut ctx);
        }
        self.tick_count += 1;
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}
