//! SysTick as the platform's "programmable tick source firing at a fixed
//! rate" (§1, platform primitive (i)).
use cortex_m::peripheral::SYST;

/// Programs SysTick for a `reload`-cycle period and enables it and its
/// interrupt. `reload` is the cycle count per tick minus one, the same
/// convention `SYST::set_reload` itself uses.
pub(crate) fn init(syst: &mut SYST, reload: u32) {
    syst.set_reload(reload);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
}
