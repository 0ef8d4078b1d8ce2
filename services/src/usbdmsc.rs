// Licensed under the Apache-2.0 license

//! USB mass-storage gadget service.
//!
//! Exposes the boot medium over USB on request, for as long as the request
//! stays latched and the cable is attached. [`Event::UsbdmscActive`] is
//! this machine's signal: notified while the gadget is up, cleared on
//! teardown, so other machines (gpio_ui) can observe gadget liveness
//! without reaching into the driver.

use state_machine::{Event, MachineCore, StateDesc, StateId, StateMachine, TickContext};

/// Gadget driver seam. `service` pumps the endpoint once and reports
/// transfer progress.
pub trait UsbGadget {
    /// Brings the gadget up. Returns false when enumeration failed.
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn cable_present(&mut self) -> bool;
    /// One polling pass; returns (bytes written so far, total bytes).
    fn service(&mut self) -> (u64, u64);
}

const S_INIT: StateId = 0;
const S_WAIT: StateId = 1;
const S_ACTIVE: StateId = 2;
const S_IDLE: StateId = 3;

pub struct UsbdmscContext<G> {
    gadget: G,
}

pub fn usbdmsc_machine<G: UsbGadget>(gadget: G, priority: u8) -> StateMachine<UsbdmscContext<G>> {
    StateMachine::new(
        "usbdmsc_service",
        priority,
        S_INIT,
        UsbdmscContext { gadget },
        &[
            StateDesc::new(S_INIT, "init", None, None, init_handler::<G>),
            StateDesc::new(S_WAIT, "wait", None, None, wait_handler::<G>),
            StateDesc::new(
                S_ACTIVE,
                "active",
                Some(active_on_entry::<G>),
                Some(active_on_exit::<G>),
                active_handler::<G>,
            ),
            StateDesc::new(S_IDLE, "idle", None, None, idle_handler::<G>),
        ],
    )
}

fn init_handler<G: UsbGadget>(
    core: &mut MachineCore,
    _cx: &mut UsbdmscContext<G>,
    ctx: &mut TickContext,
) {
    if ctx.triggers.is_notified(Event::DdrTrained)
        && ctx.triggers.is_notified(Event::StartupComplete)
    {
        core.state = S_WAIT;
    }
}

fn wait_handler<G: UsbGadget>(
    core: &mut MachineCore,
    _cx: &mut UsbdmscContext<G>,
    ctx: &mut TickContext,
) {
    if ctx.triggers.is_notified(Event::PostBoot) {
        core.state = S_IDLE;
    } else if ctx.triggers.is_notified(Event::UsbdmscRequested) {
        core.state = S_ACTIVE;
    }
}

fn active_on_entry<G: UsbGadget>(
    core: &mut MachineCore,
    cx: &mut UsbdmscContext<G>,
    ctx: &mut TickContext,
) {
    if cx.gadget.start() {
        ctx.triggers.notify(Event::UsbdmscActive);
        log::info!("usbdmsc: gadget up");
    } else {
        // Drop the request too, so the requester sees the session end
        // instead of this machine retrying the gadget forever.
        log::error!("usbdmsc: gadget failed to start");
        ctx.triggers.clear(Event::UsbdmscRequested);
        core.state = S_WAIT;
    }
}

fn active_on_exit<G: UsbGadget>(
    _core: &mut MachineCore,
    cx: &mut UsbdmscContext<G>,
    ctx: &mut TickContext,
) {
    cx.gadget.stop();
    ctx.triggers.clear(Event::UsbdmscActive);
    log::info!("usbdmsc: gadget down");
}

fn active_handler<G: UsbGadget>(
    core: &mut MachineCore,
    cx: &mut UsbdmscContext<G>,
    ctx: &mut TickContext,
) {
    if ctx.triggers.is_notified(Event::PostBoot) {
        core.state = S_IDLE;
        return;
    }
    // The request latch doubles as "keep running": gpio_ui clears it to
    // cancel the session.
    if !ctx.triggers.is_notified(Event::UsbdmscRequested) || !cx.gadget.cable_present() {
        core.state = S_WAIT;
        return;
    }
    let (written, total) = cx.gadget.service();
    log::trace!("usbdmsc: {written}/{total} bytes");
}

fn idle_handler<G: UsbGadget>(
    _core: &mut MachineCore,
    _cx: &mut UsbdmscContext<G>,
    _ctx: &mut TickContext,
) {
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_machine::TriggerBus;

    struct FakeGadget {
        start_ok: bool,
        cable: bool,
        starts: u32,
        stops: u32,
        polls: u32,
    }

    impl Default for FakeGadget {
        fn default() -> Self {
            Self {
                start_ok: true,
                cable: true,
                starts: 0,
                stops: 0,
                polls: 0,
            }
        }
    }

    impl UsbGadget for FakeGadget {
        fn start(&mut self) -> bool {
            self.starts += 1;
            self.start_ok
        }

        fn stop(&mut self) {
            self.stops += 1;
        }

        fn cable_present(&mut self) -> bool {
            self.cable
        }

        fn service(&mut self) -> (u64, u64) {
            self.polls += 1;
            (self.polls as u64 * 512, 4096)
        }
    }

    fn tick(machine: &mut StateMachine<UsbdmscContext<FakeGadget>>, bus: &mut TriggerBus, now: u64) {
        let mut ctx = TickContext { now, triggers: bus };
        machine.step(&mut ctx);
    }

    fn into_wait(machine: &mut StateMachine<UsbdmscContext<FakeGadget>>, bus: &mut TriggerBus) {
        bus.notify(Event::DdrTrained);
        bus.notify(Event::StartupComplete);
        tick(machine, bus, 0);
        tick(machine, bus, 1);
        assert_eq!(machine.state_name(), "wait");
    }

    #[test]
    fn test_session_runs_while_requested() {
        let mut bus = TriggerBus::new();
        let mut machine = usbdmsc_machine(FakeGadget::default(), 0);
        into_wait(&mut machine, &mut bus);

        bus.notify(Event::UsbdmscRequested);
        tick(&mut machine, &mut bus, 2);
        tick(&mut machine, &mut bus, 3);
        assert!(bus.is_notified(Event::UsbdmscActive), "gadget up on entry");
        assert_eq!(machine.context().gadget.starts, 1);
        assert!(machine.context().gadget.polls > 0, "endpoint pumped");

        // Consumer cancels: request cleared, session winds down.
        bus.clear(Event::UsbdmscRequested);
        tick(&mut machine, &mut bus, 4);
        tick(&mut machine, &mut bus, 5);
        assert_eq!(machine.state_name(), "wait");
        assert_eq!(machine.context().gadget.stops, 1, "exit hook stops gadget");
        assert!(
            !bus.is_notified(Event::UsbdmscActive),
            "liveness signal cleared on teardown"
        );
    }

    #[test]
    fn test_cable_removal_ends_session() {
        let mut bus = TriggerBus::new();
        let mut machine = usbdmsc_machine(FakeGadget::default(), 0);
        into_wait(&mut machine, &mut bus);

        bus.notify(Event::UsbdmscRequested);
        tick(&mut machine, &mut bus, 2);
        tick(&mut machine, &mut bus, 3);
        machine.context_mut().gadget.cable = false;
        tick(&mut machine, &mut bus, 4);
        tick(&mut machine, &mut bus, 5);
        assert_eq!(machine.state_name(), "wait");
        assert!(!bus.is_notified(Event::UsbdmscActive));
    }

    #[test]
    fn test_failed_start_returns_to_wait() {
        let mut bus = TriggerBus::new();
        let mut machine = usbdmsc_machine(
            FakeGadget {
                start_ok: false,
                ..Default::default()
            },
            0,
        );
        into_wait(&mut machine, &mut bus);
        bus.notify(Event::UsbdmscRequested);
        tick(&mut machine, &mut bus, 2);
        tick(&mut machine, &mut bus, 3);
        tick(&mut machine, &mut bus, 4);
        assert_eq!(machine.state_name(), "wait");
        assert!(!bus.is_notified(Event::UsbdmscActive));
        assert_eq!(machine.context().gadget.polls, 0, "never pumped");
    }

    #[test]
    fn test_post_boot_parks_service() {
        let mut bus = TriggerBus::new();
        let mut machine = usbdmsc_machine(FakeGadget::default(), 0);
        into_wait(&mut machine, &mut bus);
        bus.notify(Event::PostBoot);
        tick(&mut machine, &mut bus, 2);
        assert_eq!(machine.state_name(), "idle");
    }
}
