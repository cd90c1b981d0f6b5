//! The PendSV-based context switch (§4.F) and the macro that wires a
//! concrete `Kernel` static to it.
//!
//! Unlike a general-purpose port, this one targets a single convention:
//! Armv7-M (no FPU lazy-stacking, no Armv6-M fallback path), threads always
//! run on PSP, and the handler always returns with the same `EXC_RETURN`
//! value. That keeps the handler a single straight-line routine instead of
//! the conditional-compilation lattice a portable port needs.

/// `EXC_RETURN`: return to Thread mode, use PSP, no floating-point state.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Binds a `Kernel<P>` static to the board's PendSV and SysTick vectors.
///
/// Expands to a private module containing the handlers `cortex-m-rt`'s
/// vector table expects by name (`PendSV`, `SysTick`); invoke once per
/// application, near `main`.
///
/// The PendSV body below is the whole of §4.F: it saves `r4-r11` onto the
/// outgoing thread's stack, hands the resulting pointer to
/// [`crate::Kernel::save_running_sp`], asks
/// [`crate::Kernel::choose_next_task`] for the incoming thread's saved
/// pointer, restores `r4-r11` from there, and returns into it on `PSP`. A
/// `#[naked]` function's body must be exactly one `asm!` block, so the two
/// Rust-level calls are reached through `bl` against `sym`-named
/// trampolines rather than ordinary function calls.
///
/// The crate invoking this macro must itself enable
/// `#![feature(naked_functions)]`, `#![feature(asm_const)]`, and
/// `#![feature(asm_sym)]` (the same three features `rios_port_arm_m`'s own
/// crate root enables for [`crate::start_first_task`]) — a `#[naked]`
/// function with `const`/`sym` operands is not yet stable.
#[macro_export]
macro_rules! bind_kernel {
    ($kernel:expr, $port:ty) => {
        mod __rios_port_glue {
            use super::*;

            #[allow(unused)]
            fn __rios_kernel_type_check() -> &'static ::rios_kernel::Kernel<$port> {
                $kernel
            }

            unsafe extern "C" fn __rios_save_sp(sp: *mut u32) {
                ($kernel).save_running_sp(sp);
            }

            unsafe extern "C" fn __rios_choose_next_sp() -> *mut u32 {
                ($kernel).choose_next_task()
            }

            #[naked]
            #[no_mangle]
            pub unsafe extern "C" fn PendSV() {
                core::arch::asm!(
                    "mrs r0, psp",
                    "subs r0, r0, #32",
                    "stmia r0, {{r4-r11}}",
                    "bl {save_sp}",
                    "bl {choose_next}",
                    "ldmia r0!, {{r4-r11}}",
                    "msr psp, r0",
                    "ldr lr, ={exc_return}",
                    "bx lr",
                    save_sp = sym __rios_save_sp,
                    choose_next = sym __rios_choose_next_sp,
                    exc_return = const $crate::context_switch::EXC_RETURN_THREAD_PSP,
                    options(noreturn),
                );
            }

            #[no_mangle]
            pub unsafe extern "C" fn SysTick() {
                if let Some(handler) = ($kernel).on_tick() {
                    handler();
                }
            }

            /// Services the `svc 0` in [`$crate::start_first_task`]. Reuses
            /// `__rios_choose_next_sp` (i.e. the scheduler) to pick the
            /// thread `launch` selected and pops it the same way `PendSV`
            /// pops every later switch, so there is exactly one frame
            /// format and one return sequence in the whole port.
            #[naked]
            #[no_mangle]
            pub unsafe extern "C" fn SVCall() {
                core::arch::asm!(
                    "bl {choose_next}",
                    "ldmia r0!, {{r4-r11}}",
                    "msr psp, r0",
                    "movs r0, #2",
                    "msr control, r0",
                    "isb",
                    "ldr lr, ={exc_return}",
                    "bx lr",
                    choose_next = sym __rios_choose_next_sp,
                    exc_return = const $crate::context_switch::EXC_RETURN_THREAD_PSP,
                    options(noreturn),
                );
            }
        }
    };
}
