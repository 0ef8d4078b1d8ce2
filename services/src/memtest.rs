// Licensed under the Apache-2.0 license

//! DDR memory-test service: once training completes, runs the configured
//! test depth and records the verdict. Pattern generation lives behind the
//! [`MemoryTester`] seam.

use state_machine::{Event, MachineCore, StateDesc, StateId, StateMachine, TickContext};

pub trait MemoryTester {
    /// Quick data/address-bus sanity pass.
    fn test_fast(&mut self) -> bool;
    /// Exhaustive pattern pass.
    fn test_full(&mut self) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MemtestConfig {
    /// Run the exhaustive pass instead of the quick one.
    pub full: bool,
}

const S_WAIT: StateId = 0;
const S_RUN: StateId = 1;
const S_IDLE: StateId = 2;

pub struct MemtestContext<M> {
    tester: M,
    config: MemtestConfig,
    /// Verdict, once the test has run.
    pub passed: Option<bool>,
}

pub fn memtest_machine<M: MemoryTester>(
    tester: M,
    config: MemtestConfig,
    priority: u8,
) -> StateMachine<MemtestContext<M>> {
    StateMachine::new(
        "memtest_service",
        priority,
        S_WAIT,
        MemtestContext {
            tester,
            config,
            passed: None,
        },
        &[
            StateDesc::new(S_WAIT, "wait", None, None, wait_handler::<M>),
            StateDesc::new(S_RUN, "run", None, None, run_handler::<M>),
            StateDesc::new(S_IDLE, "idle", None, None, idle_handler::<M>),
        ],
    )
}

fn wait_handler<M: MemoryTester>(
    core: &mut MachineCore,
    _cx: &mut MemtestContext<M>,
    ctx: &mut TickContext,
) {
    // Nothing to test until main memory exists.
    if ctx.triggers.is_notified(Event::DdrTrained) {
        core.state = S_RUN;
    }
}

fn run_handler<M: MemoryTester>(
    core: &mut MachineCore,
    cx: &mut MemtestContext<M>,
    _ctx: &mut TickContext,
) {
    let passed = if cx.config.full {
        cx.tester.test_full()
    } else {
        cx.tester.test_fast()
    };
    if passed {
        log::info!("memtest: pass");
    } else {
        log::error!("memtest: FAIL");
    }
    cx.passed = Some(passed);
    core.state = S_IDLE;
}

fn idle_handler<M: MemoryTester>(
    _core: &mut MachineCore,
    _cx: &mut MemtestContext<M>,
    _ctx: &mut TickContext,
) {
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_machine::TriggerBus;

    #[derive(Default)]
    struct FakeTester {
        fast_runs: u32,
        full_runs: u32,
        fail: bool,
    }

    impl MemoryTester for FakeTester {
        fn test_fast(&mut self) -> bool {
            self.fast_runs += 1;
            !self.fail
        }

        fn test_full(&mut self) -> bool {
            self.full_runs += 1;
            !self.fail
        }
    }

    fn tick(machine: &mut StateMachine<MemtestContext<FakeTester>>, bus: &mut TriggerBus, now: u64) {
        let mut ctx = TickContext { now, triggers: bus };
        machine.step(&mut ctx);
    }

    #[test]
    fn test_waits_for_ddr_then_runs_once() {
        let mut bus = TriggerBus::new();
        let mut machine = memtest_machine(FakeTester::default(), MemtestConfig::default(), 0);
        tick(&mut machine, &mut bus, 0);
        assert_eq!(machine.context().passed, None, "gated on DDR training");

        bus.notify(Event::DdrTrained);
        tick(&mut machine, &mut bus, 1);
        tick(&mut machine, &mut bus, 2);
        tick(&mut machine, &mut bus, 3);
        assert_eq!(machine.context().passed, Some(true));
        assert_eq!(machine.context().tester.fast_runs, 1, "test runs exactly once");
        assert_eq!(machine.context().tester.full_runs, 0);
        assert_eq!(machine.state_name(), "idle");
    }

    #[test]
    fn test_full_depth_and_failure_recorded() {
        let mut bus = TriggerBus::new();
        let mut machine = memtest_machine(
            FakeTester {
                fail: true,
                ..Default::default()
            },
            MemtestConfig { full: true },
            0,
        );
        bus.notify(Event::DdrTrained);
        tick(&mut machine, &mut bus, 0);
        tick(&mut machine, &mut bus, 1);
        assert_eq!(machine.context().passed, Some(false));
        assert_eq!(machine.context().tester.full_runs, 1);
    }
}
