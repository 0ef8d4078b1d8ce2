// Licensed under the Apache-2.0 license

//! GPIO user-interface service.
//!
//! Waits for DDR and startup to complete, then watches the user button
//! through a debounce window during preboot. A press latches a one-shot
//! request for USB mass-storage mode; while that mode runs, either another
//! press, gadget teardown or boot completion cancels back out, clearing
//! the request so a re-entry starts clean.

use state_machine::{Event, MachineCore, StateDesc, StateId, StateMachine, Tick, TickContext};

/// Board seam: the two buttons and the progress indicator.
pub trait GpioUiHardware {
    fn init(&mut self);
    /// Samples the (noisy) "enter mass-storage mode" button.
    fn preboot_button_pressed(&mut self) -> bool;
    /// Samples the user cancel button.
    fn user_button_pressed(&mut self) -> bool;
    /// Drives the transfer-progress indicator (LEDs, display, ...).
    fn report_usb_progress(&mut self, bytes_written: u64, total_bytes: u64);
}

#[derive(Clone, Copy, Debug)]
pub struct GpioUiConfig {
    /// Register the mass-storage sub-flow states.
    pub usbdmsc: bool,
    /// Gate preboot on DDR training (off for DDR-less configs).
    pub ddr_gate: bool,
    /// Minimum ticks between button re-samples.
    pub debounce_ticks: Tick,
}

impl Default for GpioUiConfig {
    fn default() -> Self {
        Self {
            usbdmsc: true,
            ddr_gate: true,
            debounce_ticks: 1000,
        }
    }
}

const S_INIT: StateId = 0;
const S_PREBOOT: StateId = 1;
const S_USBDMSC: StateId = 2;
const S_IDLE: StateId = 3;

pub struct GpioUiContext<H> {
    hw: H,
    config: GpioUiConfig,
    /// One-shot latch so re-entrant checks do not double-fire the request.
    usbdmsc_requested: bool,
}

pub fn gpio_ui_machine<H: GpioUiHardware>(
    hw: H,
    config: GpioUiConfig,
    priority: u8,
) -> StateMachine<GpioUiContext<H>> {
    let mut states = arrayvec::ArrayVec::<_, { state_machine::MAX_STATES }>::new();
    states.push(StateDesc::new(
        S_INIT,
        "init",
        Some(init_on_entry::<H>),
        None,
        init_handler::<H>,
    ));
    states.push(StateDesc::new(
        S_PREBOOT,
        "preboot",
        None,
        None,
        preboot_handler::<H>,
    ));
    if config.usbdmsc {
        // The state table is data: the sub-flow only exists in
        // configurations that carry the mass-storage gadget.
        states.push(StateDesc::new(
            S_USBDMSC,
            "usbdmsc",
            None,
            None,
            usbdmsc_handler::<H>,
        ));
    }
    states.push(StateDesc::new(
        S_IDLE,
        "idle",
        Some(idle_on_entry::<H>),
        None,
        idle_handler::<H>,
    ));
    StateMachine::new(
        "gpio_ui_service",
        priority,
        S_INIT,
        GpioUiContext {
            hw,
            config,
            usbdmsc_requested: false,
        },
        &states,
    )
}

fn check_usbdmsc_request<H: GpioUiHardware>(cx: &mut GpioUiContext<H>, ctx: &mut TickContext) {
    if cx.config.usbdmsc && !cx.usbdmsc_requested && cx.hw.preboot_button_pressed() {
        ctx.triggers.notify(Event::UsbdmscRequested);
        cx.usbdmsc_requested = true;
        log::warn!("gpio_ui: mass-storage mode requested");
    }
}

fn init_on_entry<H: GpioUiHardware>(
    core: &mut MachineCore,
    cx: &mut GpioUiContext<H>,
    ctx: &mut TickContext,
) {
    cx.hw.init();
    cx.usbdmsc_requested = false;
    core.start_time = ctx.now;
    check_usbdmsc_request(cx, ctx);
    cx.hw.report_usb_progress(0, 0);
}

fn init_handler<H: GpioUiHardware>(
    core: &mut MachineCore,
    cx: &mut GpioUiContext<H>,
    ctx: &mut TickContext,
) {
    check_usbdmsc_request(cx, ctx);

    let ddr_ready = !cx.config.ddr_gate || ctx.triggers.is_notified(Event::DdrTrained);
    if ddr_ready && ctx.triggers.is_notified(Event::StartupComplete) {
        core.state = S_PREBOOT;
    }
}

fn preboot_handler<H: GpioUiHardware>(
    core: &mut MachineCore,
    cx: &mut GpioUiContext<H>,
    ctx: &mut TickContext,
) {
    if cx.config.usbdmsc {
        if ctx.is_elapsed(core.start_time, cx.config.debounce_ticks) {
            // Another opportunity to catch the button.
            check_usbdmsc_request(cx, ctx);
        }
        if ctx.triggers.is_notified(Event::UsbdmscRequested) {
            core.start_time = ctx.now;
            cx.usbdmsc_requested = false;
            core.state = S_USBDMSC;
            return;
        }
    }
    if ctx.triggers.is_notified(Event::PostBoot) {
        log::warn!("gpio_ui: post boot, going to idle");
        ctx.triggers.clear(Event::UsbdmscRequested);
        core.state = S_IDLE;
    } else {
        cx.hw.report_usb_progress(0, 0);
    }
}

fn usbdmsc_handler<H: GpioUiHardware>(
    core: &mut MachineCore,
    cx: &mut GpioUiContext<H>,
    ctx: &mut TickContext,
) {
    if ctx.is_elapsed(core.start_time, cx.config.debounce_ticks) {
        if cx.hw.user_button_pressed() || !ctx.triggers.is_notified(Event::UsbdmscActive) {
            log::warn!("gpio_ui: button or cable removal, going back to preboot");
            ctx.triggers.clear(Event::UsbdmscRequested);
            core.start_time = ctx.now;
            core.state = S_PREBOOT;
        }
        if ctx.triggers.is_notified(Event::PostBoot) {
            core.state = S_IDLE;
        }
    }
}

fn idle_on_entry<H: GpioUiHardware>(
    _core: &mut MachineCore,
    cx: &mut GpioUiContext<H>,
    _ctx: &mut TickContext,
) {
    cx.hw.report_usb_progress(0, 0);
}

fn idle_handler<H: GpioUiHardware>(
    _core: &mut MachineCore,
    _cx: &mut GpioUiContext<H>,
    _ctx: &mut TickContext,
) {
}
