//! Cortex-M glue for [`rios_kernel`]: the concrete [`InterruptControl`]
//! implementation, the naked PendSV context switch, SysTick, and vector
//! table relocation. This crate holds every line of `asm!` and every
//! register access in the whole workspace — `rios_kernel` itself never
//! touches hardware.
//!
//! `cortex-m`/`cortex-m-rt` are only pulled in under
//! `cfg(target_os = "none")` (see `Cargo.toml`), so everything that touches
//! a peripheral register or emits inline `asm!` is gated the same way —
//! a hosted build (e.g. the workspace's own `cargo test`) sees an empty
//! shell of this crate instead of failing to resolve `cortex_m` or trying
//! to assemble Armv7-M mnemonics for the host target.
#![feature(naked_functions)]
#![feature(asm_const)]
#![feature(asm_sym)]
#![no_std]

pub mod context_switch;
#[cfg(target_os = "none")]
mod systick;
#[cfg(target_os = "none")]
mod vector_table;

#[cfg(target_os = "none")]
use cortex_m::peripheral::{Peripherals, SCB};
#[cfg(target_os = "none")]
use cortex_m::register::primask;
#[cfg(target_os = "none")]
use rios_kernel::InterruptControl;

pub use context_switch::EXC_RETURN_THREAD_PSP;

/// Lowest Cortex-M exception priority value usable on a 3-bit-priority
/// implementation (the common case on the Cortex-M3/M4 parts this targets).
/// `launch` arms SysTick and PendSV at this priority, per §6: "sets
/// pendable-switch and tick priorities to the lowest maskable priority."
#[cfg(target_os = "none")]
const LOWEST_PRIORITY: u8 = 0xe0;

/// The `InterruptControl` implementation `rios_kernel::Kernel` is
/// parameterized over on this target.
#[cfg(target_os = "none")]
pub struct CortexM;

#[cfg(target_os = "none")]
impl InterruptControl for CortexM {
    #[inline]
    fn disable() -> bool {
        let was_enabled = primask::read().is_active();
        cortex_m::interrupt::disable();
        was_enabled
    }

    #[inline]
    unsafe fn restore(was_enabled: bool) {
        if was_enabled {
            unsafe { cortex_m::interrupt::enable() };
        }
    }

    #[inline]
    fn pend_switch() {
        SCB::set_pendsv();
    }

    unsafe fn install_vector(irq: u16, priority: u8, handler: unsafe extern "C" fn()) {
        unsafe {
            vector_table::install(irq, handler);
            let mut peripherals = Peripherals::steal();
            peripherals.NVIC.set_priority(Irq(irq), priority);
            cortex_m::peripheral::NVIC::unmask(Irq(irq));
        }
    }
}

/// Adapts a raw IRQ number to `cortex_m::interrupt::Nr`, since this port has
/// no compile-time enum of interrupt lines (aperiodic IRQs are registered
/// dynamically, unlike a board crate's usual `interrupt::Interrupt` enum).
#[cfg(target_os = "none")]
#[derive(Clone, Copy)]
struct Irq(u16);

#[cfg(target_os = "none")]
unsafe impl cortex_m::interrupt::InterruptNumber for Irq {
    #[inline]
    fn number(&self) -> u16 {
        self.0
    }
}

/// One-time board bring-up: relocates the vector table to RAM and programs
/// SysTick. Does not itself start the first thread — call
/// [`rios_kernel::Kernel::launch`] and then [`start_first_task`] once the
/// application has added its threads.
///
/// # Safety
/// Must run once, before interrupts are enabled and before any thread or
/// aperiodic handler is registered.
#[cfg(target_os = "none")]
pub unsafe fn init(syst: &mut cortex_m::peripheral::SYST, tick_reload: u32) {
    unsafe { vector_table::relocate() };
    systick::init(syst, tick_reload);
}

/// Arms SysTick and PendSV at the kernel's reserved lowest priority. Call
/// once, after [`init`] and before [`start_first_task`].
#[cfg(target_os = "none")]
pub fn set_kernel_interrupt_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(cortex_m::peripheral::scb::SystemHandler::PendSV, LOWEST_PRIORITY);
        scb.set_priority(cortex_m::peripheral::scb::SystemHandler::SysTick, LOWEST_PRIORITY);
    }
}

/// The low-level "start first thread" primitive (§6). Runs in Thread mode
/// on the boot (main) stack and never returns: it globally enables
/// interrupts and issues `svc 0`, which the `SVCall` handler
/// [`crate::bind_kernel`] installs services by asking the scheduler for the
/// slot [`rios_kernel::Kernel::launch`] selected and popping its synthetic
/// frame — the same pop-and-exception-return sequence every later `PendSV`
/// switch uses, so there is exactly one frame format and one restore
/// routine in the whole port.
///
/// # Safety
/// Must be called exactly once, from Thread mode, after `init`,
/// `set_kernel_interrupt_priorities`, and `Kernel::launch` have all run.
#[cfg(target_os = "none")]
#[naked]
pub unsafe extern "C" fn start_first_task() -> ! {
    core::arch::asm!(
        "cpsie i",
        "dsb",
        "isb",
        "svc 0",
        "udf #0", // unreachable: SVCall never returns here
        options(noreturn),
    );
}
