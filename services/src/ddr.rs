// Licensed under the Apache-2.0 license

//! DDR training monitor: kicks off training once and notifies
//! [`Event::DdrTrained`] when the controller reports completion.

use state_machine::{Event, MachineCore, StateDesc, StateId, StateMachine, TickContext};

/// The DDR controller seam. Training itself (register pokes, calibration)
/// is the platform's business.
pub trait DdrController {
    fn start_training(&mut self);
    fn is_trained(&mut self) -> bool;
}

const S_TRAIN: StateId = 0;
const S_IDLE: StateId = 1;

pub struct DdrContext<D> {
    hw: D,
}

pub fn ddr_machine<D: DdrController>(hw: D, priority: u8) -> StateMachine<DdrContext<D>> {
    StateMachine::new(
        "ddr_service",
        priority,
        S_TRAIN,
        DdrContext { hw },
        &[
            StateDesc::new(
                S_TRAIN,
                "train",
                Some(train_on_entry::<D>),
                None,
                train_handler::<D>,
            ),
            StateDesc::new(S_IDLE, "idle", None, None, idle_handler::<D>),
        ],
    )
}

fn train_on_entry<D: DdrController>(
    _core: &mut MachineCore,
    cx: &mut DdrContext<D>,
    _ctx: &mut TickContext,
) {
    cx.hw.start_training();
}

fn train_handler<D: DdrController>(
    core: &mut MachineCore,
    cx: &mut DdrContext<D>,
    ctx: &mut TickContext,
) {
    if cx.hw.is_trained() {
        log::info!("ddr: training complete");
        ctx.triggers.notify(Event::DdrTrained);
        core.state = S_IDLE;
    }
}

fn idle_handler<D: DdrController>(
    _core: &mut MachineCore,
    _cx: &mut DdrContext<D>,
    _ctx: &mut TickContext,
) {
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_machine::TriggerBus;

    struct FakeDdr {
        started: bool,
        trained_after: u32,
        polls: u32,
    }

    impl DdrController for FakeDdr {
        fn start_training(&mut self) {
            self.started = true;
        }

        fn is_trained(&mut self) -> bool {
            self.polls += 1;
            self.polls > self.trained_after
        }
    }

    #[test]
    fn test_notifies_when_training_completes() {
        let mut bus = TriggerBus::new();
        let mut machine = ddr_machine(
            FakeDdr {
                started: false,
                trained_after: 2,
                polls: 0,
            },
            0,
        );
        for now in 0..4 {
            let mut ctx = TickContext {
                now,
                triggers: &mut bus,
            };
            machine.step(&mut ctx);
        }
        assert!(machine.context().hw.started, "training started on entry");
        assert!(bus.is_notified(Event::DdrTrained));
        assert_eq!(machine.state_name(), "idle");
    }
}
