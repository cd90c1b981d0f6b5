//! Aperiodic (interrupt-triggered) handler registration (§4.H).
use crate::error::ErrCode;

/// Highest interrupt number the relocated vector table this core targets
/// can address; mirrors `original_source/G8RTOS_Scheduler.c`'s bound.
const MAX_IRQN: u16 = 155;

/// Highest usable NVIC priority on a Cortex-M with 3 implemented priority
/// bits below the kernel's own reserved (lowest) levels.
const MAX_HWI_PRIORITY: u8 = 6;

/// Validates the arguments `Kernel::add_aperiodic_event` installs the
/// vector with. The source used strict `>`/`<` inconsistently between this
/// check and the FIFO index check; this core uses `<`/`<=` uniformly here
/// (0 is reserved, `MAX_IRQN` itself is out of range) and documents the
/// choice in DESIGN.md.
pub(crate) fn validate(irq: u16, priority: u8) -> Result<(), ErrCode> {
    if irq == 0 || irq >= MAX_IRQN {
        return Err(ErrCode::IrqnInvalid);
    }
    if priority > MAX_HWI_PRIORITY {
        return Err(ErrCode::HwiPriorityInvalid);
    }
    Ok(())
}
