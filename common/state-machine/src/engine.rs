// Licensed under the Apache-2.0 license

//! The per-tick state machine engine.
//!
//! A machine is a table of [`StateDesc`] entries plus a [`MachineCore`]
//! (identity, current/previous state, timing and execution statistics) and a
//! private context owned exclusively by that machine. Handlers communicate
//! transition intent purely by writing a new state id into
//! [`MachineCore::state`]; the engine invokes on-exit/on-entry hooks exactly
//! once per visit when it observes the change on the next step.

use crate::clock::{is_elapsed, Tick};
use crate::trigger::TriggerBus;
use arrayvec::ArrayVec;

/// Identifier of a declared state within one machine.
pub type StateId = u32;

/// Sentinel for "no previous state"; only ever observed before the first
/// execution of a machine.
pub const INVALID_STATE: StateId = StateId::MAX;

/// Upper bound on declared states per machine.
pub const MAX_STATES: usize = 8;

/// Everything a hook or handler may touch during one tick, besides the
/// machine itself.
pub struct TickContext<'a> {
    /// Tick count sampled once at the start of the scheduler tick.
    pub now: Tick,
    /// The shared signal table.
    pub triggers: &'a mut TriggerBus,
}

impl TickContext<'_> {
    /// Debounce/timeout helper against this tick's sampled time.
    pub fn is_elapsed(&self, reference: Tick, duration: Tick) -> bool {
        is_elapsed(self.now, reference, duration)
    }
}

/// Hook/handler signature. The split borrow (core vs. context) lets a
/// handler transition the machine while mutating its private data.
pub type StateHook<C> = fn(&mut MachineCore, &mut C, &mut TickContext);

/// One declared state: id, display name, optional entry/exit hooks and the
/// mandatory steady-state handler. Immutable once registered.
pub struct StateDesc<C> {
    pub id: StateId,
    pub name: &'static str,
    pub on_entry: Option<StateHook<C>>,
    pub on_exit: Option<StateHook<C>>,
    pub handler: StateHook<C>,
}

impl<C> StateDesc<C> {
    pub const fn new(
        id: StateId,
        name: &'static str,
        on_entry: Option<StateHook<C>>,
        on_exit: Option<StateHook<C>>,
        handler: StateHook<C>,
    ) -> Self {
        Self {
            id,
            name,
            on_entry,
            on_exit,
            handler,
        }
    }
}

// Manual impls: `fn` pointers are Copy regardless of `C`, but a derive
// would demand `C: Copy`.
impl<C> Clone for StateDesc<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for StateDesc<C> {}

/// The engine-owned part of a machine. Handlers may write `state` (to
/// request a transition) and `start_time` (to re-arm a debounce window);
/// the remaining fields are engine bookkeeping.
pub struct MachineCore {
    name: &'static str,
    /// Current state. Writing a different declared id requests a transition.
    pub state: StateId,
    prev_state: StateId,
    priority: u8,
    /// Tick at which the current state was entered (or last re-armed).
    pub start_time: Tick,
    last_execution_time: Tick,
    execution_count: u64,
    /// Emit a trace line on every transition.
    pub debug: bool,
}

impl MachineCore {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prev_state(&self) -> StateId {
        self.prev_state
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn last_execution_time(&self) -> Tick {
        self.last_execution_time
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }
}

/// A registered state machine instance: core + descriptor table + private
/// context. Constructed once at startup and never destroyed.
pub struct StateMachine<C> {
    core: MachineCore,
    descs: ArrayVec<StateDesc<C>, MAX_STATES>,
    context: C,
}

impl<C> StateMachine<C> {
    /// Builds a machine from its declared state table.
    ///
    /// Panics if `initial` is not a declared state or the table overflows
    /// [`MAX_STATES`]; both are construction-time defects, not runtime
    /// errors.
    pub fn new(
        name: &'static str,
        priority: u8,
        initial: StateId,
        context: C,
        states: &[StateDesc<C>],
    ) -> Self {
        let mut descs = ArrayVec::new();
        for desc in states {
            assert!(
                desc.id != INVALID_STATE,
                "{}: INVALID_STATE is reserved",
                name
            );
            descs.push(*desc);
        }
        let machine = Self {
            core: MachineCore {
                name,
                state: initial,
                prev_state: INVALID_STATE,
                priority,
                start_time: 0,
                last_execution_time: 0,
                execution_count: 0,
                debug: false,
            },
            descs,
            context,
        };
        assert!(
            machine.find(initial).is_some(),
            "{}: initial state {} not declared",
            name,
            initial
        );
        machine
    }

    pub fn with_debug(mut self) -> Self {
        self.core.debug = true;
        self
    }

    pub fn core(&self) -> &MachineCore {
        &self.core
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Display name of the current state.
    pub fn state_name(&self) -> &'static str {
        match self.find(self.core.state) {
            Some(desc) => desc.name,
            None => "<invalid>",
        }
    }

    fn find(&self, id: StateId) -> Option<StateDesc<C>> {
        self.descs.iter().find(|d| d.id == id).copied()
    }

    fn desc(&self, id: StateId) -> StateDesc<C> {
        match self.find(id) {
            Some(desc) => desc,
            // Handlers may only move to declared states; anything else is a
            // construction-time defect.
            None => panic!("{}: undeclared state {}", self.core.name, id),
        }
    }

    /// One engine step, as run by the scheduler once per outer tick.
    pub fn step(&mut self, ctx: &mut TickContext) {
        if self.core.state != self.core.prev_state {
            if self.core.prev_state != INVALID_STATE {
                let outgoing = self.desc(self.core.prev_state);
                if let Some(on_exit) = outgoing.on_exit {
                    on_exit(&mut self.core, &mut self.context, ctx);
                }
            }
            let incoming = self.desc(self.core.state);
            if self.core.debug {
                log::trace!(
                    "[{}] {} -> {}",
                    self.core.name,
                    self.core.prev_state,
                    incoming.name
                );
            }
            if let Some(on_entry) = incoming.on_entry {
                on_entry(&mut self.core, &mut self.context, ctx);
            }
            self.core.start_time = ctx.now;
            self.core.prev_state = self.core.state;
        }

        // The handler runs every tick, including the one where on-entry
        // just ran: entry hooks do one-time setup, handlers do the work.
        let current = self.desc(self.core.state);
        (current.handler)(&mut self.core, &mut self.context, ctx);

        self.core.last_execution_time = ctx.now;
        self.core.execution_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S_FIRST: StateId = 0;
    const S_SECOND: StateId = 1;

    #[derive(Default)]
    struct Counters {
        entries: u32,
        exits: u32,
        handled_first: u32,
        handled_second: u32,
        hop_after: Option<u64>,
    }

    fn first_entry(_core: &mut MachineCore, cx: &mut Counters, _ctx: &mut TickContext) {
        cx.entries += 1;
    }

    fn first_exit(_core: &mut MachineCore, cx: &mut Counters, _ctx: &mut TickContext) {
        cx.exits += 1;
    }

    fn first_handler(core: &mut MachineCore, cx: &mut Counters, _ctx: &mut TickContext) {
        cx.handled_first += 1;
        if let Some(after) = cx.hop_after {
            if core.execution_count() + 1 >= after {
                core.state = S_SECOND;
            }
        }
    }

    fn second_handler(_core: &mut MachineCore, cx: &mut Counters, _ctx: &mut TickContext) {
        cx.handled_second += 1;
    }

    fn test_machine(hop_after: Option<u64>) -> StateMachine<Counters> {
        StateMachine::new(
            "test_machine",
            0,
            S_FIRST,
            Counters {
                hop_after,
                ..Default::default()
            },
            &[
                StateDesc::new(
                    S_FIRST,
                    "first",
                    Some(first_entry),
                    Some(first_exit),
                    first_handler,
                ),
                StateDesc::new(S_SECOND, "second", None, None, second_handler),
            ],
        )
    }

    fn run_ticks(machine: &mut StateMachine<Counters>, bus: &mut TriggerBus, from: Tick, n: u64) {
        for i in 0..n {
            let mut ctx = TickContext {
                now: from + i,
                triggers: bus,
            };
            machine.step(&mut ctx);
        }
    }

    #[test]
    fn test_entry_hook_fires_once_per_visit() {
        let mut bus = TriggerBus::new();
        let mut machine = test_machine(None);
        run_ticks(&mut machine, &mut bus, 0, 5);
        let cx = machine.context();
        assert_eq!(cx.entries, 1, "entry hook must fire once per visit");
        assert_eq!(cx.handled_first, 5, "handler must run every tick");
        assert_eq!(cx.exits, 0);
    }

    #[test]
    fn test_handler_runs_on_entry_tick() {
        let mut bus = TriggerBus::new();
        let mut machine = test_machine(None);
        run_ticks(&mut machine, &mut bus, 0, 1);
        let cx = machine.context();
        assert_eq!(cx.entries, 1);
        assert_eq!(
            cx.handled_first, 1,
            "handler runs on the same tick as on-entry"
        );
    }

    #[test]
    fn test_exit_runs_on_transition_and_execution_count_tracks_ticks() {
        let mut bus = TriggerBus::new();
        // Transition out of `first` at the end of tick 3.
        let mut machine = test_machine(Some(3));
        run_ticks(&mut machine, &mut bus, 0, 7);
        let cx = machine.context();
        assert_eq!(cx.handled_first, 3);
        assert_eq!(cx.exits, 1, "exit hook fires once when leaving the state");
        assert_eq!(cx.handled_second, 4);
        assert_eq!(
            machine.core().execution_count(),
            7,
            "execution count equals tick count regardless of transitions"
        );
        assert_eq!(machine.core().state, S_SECOND);
        assert_eq!(machine.state_name(), "second");
    }

    #[test]
    fn test_start_time_recorded_on_transition() {
        let mut bus = TriggerBus::new();
        let mut machine = test_machine(Some(2));
        run_ticks(&mut machine, &mut bus, 10, 4);
        // Transition requested at the end of tick 11 (now == 11), observed
        // and time-stamped by the engine at the start of tick 12.
        assert_eq!(machine.core().start_time, 12);
    }

    #[test]
    fn test_prev_state_starts_invalid() {
        let machine = test_machine(None);
        assert_eq!(machine.core().prev_state(), INVALID_STATE);
    }

    #[test]
    #[should_panic(expected = "initial state")]
    fn test_undeclared_initial_state_panics() {
        StateMachine::new(
            "bad",
            0,
            7,
            Counters::default(),
            &[StateDesc::new(S_FIRST, "first", None, None, first_handler)],
        );
    }

    #[test]
    #[should_panic(expected = "undeclared state")]
    fn test_transition_to_undeclared_state_panics() {
        let mut bus = TriggerBus::new();
        let mut machine = StateMachine::new(
            "bad",
            0,
            S_FIRST,
            Counters::default(),
            &[StateDesc::new(
                S_FIRST,
                "first",
                None,
                None,
                |core, _cx, _ctx| core.state = 42,
            )],
        );
        run_ticks(&mut machine, &mut bus, 0, 2);
    }
}
