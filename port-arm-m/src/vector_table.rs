//! Runtime-writable vector table relocation (§6: "Writable vector-table
//! relocation").
//!
//! `cortex-m-rt` links the boot vector table into flash, which is exactly
//! what [`crate::Kernel::add_aperiodic_event`] cannot write into at
//! runtime. `init` copies that table into a RAM array once and repoints
//! `SCB.VTOR` at the copy; after that, installing an aperiodic handler is a
//! single store.
use core::ptr;

use cortex_m::peripheral::SCB;

/// Vector slots 0..16 are the fixed architectural exceptions (stack top,
/// Reset, NMI, HardFault, ...); externally-triggered IRQs start at 16.
/// 155 mirrors the largest IRQ number the source validates in
/// `addAperiodicEvent`.
const VECTOR_COUNT: usize = 16 + 155;

// `VTOR` requires the table to be aligned to its own size rounded up to a
// power of two; `VECTOR_COUNT` words round up to 1 KiB.
#[repr(align(1024))]
struct VectorTable([u32; VECTOR_COUNT]);

static mut RAM_VECTOR_TABLE: VectorTable = VectorTable([0; VECTOR_COUNT]);

/// Copies the boot (flash) vector table into RAM and relocates `SCB.VTOR`
/// to it. Must run before any aperiodic handler is installed, and only
/// once.
///
/// # Safety
/// Must be called exactly once, early in `init`, before interrupts are
/// enabled and before any other code reads `RAM_VECTOR_TABLE`.
pub(crate) unsafe fn relocate() {
    let boot_table = unsafe { (*SCB::PTR).vtor.read() } as *const u32;
    unsafe {
        ptr::copy_nonoverlapping(boot_table, RAM_VECTOR_TABLE.0.as_mut_ptr(), VECTOR_COUNT);
        (*SCB::PTR).vtor.write(RAM_VECTOR_TABLE.0.as_ptr() as u32);
    }
}

/// Installs `handler` at IRQ `irq`'s slot in the relocated table.
///
/// # Safety
/// [`relocate`] must already have run. The caller has validated `irq`
/// against the platform's range.
pub(crate) unsafe fn install(irq: u16, handler: unsafe extern "C" fn()) {
    let slot = 16 + irq as usize;
    unsafe {
        RAM_VECTOR_TABLE.0[slot] = handler as usize as u32;
    }
}
