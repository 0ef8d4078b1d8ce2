// Licensed under the Apache-2.0 license

//! Boot service: verify the boot image and bring up the application harts.
//!
//! Waits for DDR and startup, holds while the mass-storage gadget owns the
//! external medium, then verifies the image (format, header CRC, and the
//! signature when a verifier is supplied) before walking the chunk tables.
//! Dispatch is cooperative: one hart's chunks are loaded per tick so other
//! machines keep getting serviced under large payloads. Any verification
//! or load failure parks the machine in a terminal failed state with the
//! cause recorded in the context.

use boot_image::{
    hart_owner_id, BootChunkDesc, BootFlags, BootImage, BootZiChunkDesc, ChunkRecord,
    HartDescriptor, ImageError, SignatureVerifier, NUM_HARTS,
};
use state_machine::{Event, MachineCore, StateDesc, StateId, StateMachine, TickContext};

/// Platform seam for moving chunk payloads into hart memory and releasing
/// a hart out of reset.
pub trait HartLoader {
    /// Copies a load chunk's payload to its execution address.
    fn load_chunk(&mut self, image: &[u8], chunk: &BootChunkDesc) -> bool;
    /// Clears a zero-init region.
    fn zero_init(&mut self, chunk: &BootZiChunkDesc) -> bool;
    /// Points hart `index` at its entry and lets it run.
    fn release_hart(&mut self, index: usize, desc: &HartDescriptor) -> bool;
}

#[derive(Clone, Copy, Debug)]
pub struct BootConfig {
    /// Gate boot on DDR training (off for DDR-less configs).
    pub ddr_gate: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self { ddr_gate: true }
    }
}

/// Terminal result, readable by the harness once the machine parks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootOutcome {
    Complete,
    ImageRejected(ImageError),
    /// The loader refused a chunk or a hart release.
    LoadFailed { hart: usize },
}

const S_WAIT: StateId = 0;
const S_VERIFY: StateId = 1;
const S_DISPATCH: StateId = 2;
const S_COMPLETE: StateId = 3;
const S_FAILED: StateId = 4;

pub struct BootContext<'img, L> {
    image: &'img [u8],
    loader: L,
    verifier: Option<&'img dyn SignatureVerifier>,
    config: BootConfig,
    /// Next descriptor slot to dispatch; one per tick.
    next_hart: usize,
    pub outcome: Option<BootOutcome>,
}

pub fn boot_machine<'img, L: HartLoader>(
    image: &'img [u8],
    loader: L,
    verifier: Option<&'img dyn SignatureVerifier>,
    config: BootConfig,
    priority: u8,
) -> StateMachine<BootContext<'img, L>> {
    let mut states = arrayvec::ArrayVec::<_, { state_machine::MAX_STATES }>::new();
    states.push(StateDesc::new(S_WAIT, "wait", None, None, wait_handler::<L>));
    states.push(StateDesc::new(
        S_VERIFY,
        "verify",
        None,
        None,
        verify_handler::<L>,
    ));
    states.push(StateDesc::new(
        S_DISPATCH,
        "dispatch",
        None,
        None,
        dispatch_handler::<L>,
    ));
    states.push(StateDesc::new(
        S_COMPLETE,
        "complete",
        Some(complete_on_entry::<L>),
        None,
        parked_handler::<L>,
    ));
    states.push(StateDesc::new(
        S_FAILED,
        "failed",
        None,
        None,
        parked_handler::<L>,
    ));
    StateMachine::new(
        "boot_service",
        priority,
        S_WAIT,
        BootContext {
            image,
            loader,
            verifier,
            config,
            next_hart: 0,
            outcome: None,
        },
        &states,
    )
}

fn reject<L>(core: &mut MachineCore, cx: &mut BootContext<'_, L>, err: ImageError) {
    log::error!("boot: image rejected: {}", err);
    cx.outcome = Some(BootOutcome::ImageRejected(err));
    core.state = S_FAILED;
}

fn wait_handler<L: HartLoader>(
    core: &mut MachineCore,
    cx: &mut BootContext<'_, L>,
    ctx: &mut TickContext,
) {
    let ddr_ready = !cx.config.ddr_gate || ctx.triggers.is_notified(Event::DdrTrained);
    if !ddr_ready || !ctx.triggers.is_notified(Event::StartupComplete) {
        return;
    }
    // The gadget owns the boot medium while it is exporting it; boot only
    // proceeds once that mode winds down.
    if ctx.triggers.is_notified(Event::UsbdmscActive)
        || ctx.triggers.is_notified(Event::UsbdmscRequested)
    {
        return;
    }
    core.state = S_VERIFY;
}

fn verify_handler<L: HartLoader>(
    core: &mut MachineCore,
    cx: &mut BootContext<'_, L>,
    ctx: &mut TickContext,
) {
    let image = match BootImage::new(cx.image) {
        Ok(image) => image,
        Err(err) => return reject(core, cx, err),
    };
    if let Err(err) = image.check_format() {
        return reject(core, cx, err);
    }
    if let Err(err) = image.verify_header() {
        return reject(core, cx, err);
    }
    match cx.verifier {
        Some(verifier) => {
            if let Err(err) = image.verify_signature(verifier) {
                return reject(core, cx, err);
            }
        }
        None => log::warn!("boot: no verifier configured, skipping signature check"),
    }
    log::info!(
        "boot: image \"{}\" accepted, starting dispatch",
        image.header().set_name_str()
    );
    ctx.triggers.notify(Event::BootStarted);
    core.state = S_DISPATCH;
}

fn dispatch_handler<L: HartLoader>(
    core: &mut MachineCore,
    cx: &mut BootContext<'_, L>,
    _ctx: &mut TickContext,
) {
    let hart = cx.next_hart;
    if hart >= NUM_HARTS {
        core.state = S_COMPLETE;
        return;
    }
    cx.next_hart += 1;

    // Header layout was bounds-checked during verify; a fresh parse of the
    // same bytes cannot fail here.
    let Ok(image) = BootImage::new(cx.image) else {
        return;
    };
    let desc = image.header().harts[hart];
    if desc.num_chunks == 0 && desc.entry_point == 0 {
        return; // unpopulated descriptor slot
    }
    if desc.boot_flags().contains(BootFlags::SKIP_AUTOBOOT) {
        log::info!("boot: hart {} ({}) flagged skip-autoboot", hart, desc.name_str());
        return;
    }

    let owner = hart_owner_id(hart);
    for chunk in image.load_chunks() {
        match chunk {
            Ok(chunk) if chunk.owner() == owner => {
                if !cx.loader.load_chunk(cx.image, &chunk) {
                    log::error!("boot: hart {} load chunk failed", hart);
                    cx.outcome = Some(BootOutcome::LoadFailed { hart });
                    core.state = S_FAILED;
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => return reject(core, cx, err),
        }
    }
    for chunk in image.zi_chunks() {
        match chunk {
            Ok(chunk) if chunk.owner() == owner => {
                if !cx.loader.zero_init(&chunk) {
                    log::error!("boot: hart {} zero-init failed", hart);
                    cx.outcome = Some(BootOutcome::LoadFailed { hart });
                    core.state = S_FAILED;
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => return reject(core, cx, err),
        }
    }
    if !cx.loader.release_hart(hart, &desc) {
        log::error!("boot: hart {} release failed", hart);
        cx.outcome = Some(BootOutcome::LoadFailed { hart });
        core.state = S_FAILED;
        return;
    }
    log::info!("boot: hart {} ({}) released", hart, desc.name_str());
}

fn complete_on_entry<L: HartLoader>(
    _core: &mut MachineCore,
    cx: &mut BootContext<'_, L>,
    ctx: &mut TickContext,
) {
    log::info!("boot: all harts dispatched");
    cx.outcome = Some(BootOutcome::Complete);
    ctx.triggers.notify(Event::BootComplete);
    ctx.triggers.notify(Event::PostBoot);
}

fn parked_handler<L: HartLoader>(
    _core: &mut MachineCore,
    _cx: &mut BootContext<'_, L>,
    _ctx: &mut TickContext,
) {
}
