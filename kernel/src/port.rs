//! The platform contract (§1 OUT OF SCOPE: "three primitives from the
//! platform"), expressed as a trait so the rest of this crate never touches
//! a register directly and can be exercised on the host under `cfg(test)`.
//!
//! A concrete board support crate (e.g. `rios_port_arm_m`) implements this
//! trait once, wiring it to a real tick source, a real pendable interrupt,
//! and a real (relocated) vector table. Nothing in `kernel` assumes Cortex-M
//! specifically beyond "there exists a maskable-interrupt disable/restore
//! pair and a pendable low-priority interrupt".
pub trait InterruptControl {
    /// Disable all maskable interrupts and return whether they were
    /// previously enabled, so a paired [`restore`](Self::restore) can put
    /// them back exactly as found. Nested use is safe as long as callers
    /// pair their own `disable`/`restore` calls.
    fn disable() -> bool;

    /// Restore the interrupt-enable state previously returned by
    /// [`disable`](Self::disable).
    ///
    /// # Safety
    /// `was_enabled` must be a value this same logical caller received from
    /// its own `disable()`; critical sections must nest properly.
    unsafe fn restore(was_enabled: bool);

    /// Assert the pendable switch interrupt so a context switch happens as
    /// soon as the current interrupt priority level allows it to be taken.
    fn pend_switch();

    /// Install `handler` at vector `irq`, program the interrupt controller
    /// priority to `priority`, and enable the line.
    ///
    /// # Safety
    /// The caller has already validated `irq` and `priority` against the
    /// platform's ranges; this writes directly into the (already relocated)
    /// vector table.
    unsafe fn install_vector(irq: u16, priority: u8, handler: unsafe extern "C" fn());
}

/// RAII critical-section guard implementing §4.A's begin/end bracket.
pub struct CriticalSection<P: InterruptControl> {
    was_enabled: bool,
    _port: core::marker::PhantomData<P>,
}

impl<P: InterruptControl> CriticalSection<P> {
    #[inline]
    #[must_use]
    pub fn enter() -> Self {
        Self {
            was_enabled: P::disable(),
            _port: core::marker::PhantomData,
        }
    }
}

impl<P: InterruptControl> Drop for CriticalSection<P> {
    #[inline]
    fn drop(&mut self) {
        // Safety: `was_enabled` is exactly what our own `disable()` call
        // returned, and this guard cannot be constructed any other way.
        unsafe { P::restore(self.was_enabled) };
    }
}

#[cfg(test)]
pub(crate) mod test_port {
    use super::InterruptControl;
    use core::cell::Cell;

    thread_local! {
        static ENABLED: Cell<bool> = const { Cell::new(true) };
    }

    /// A host-side stand-in for a real interrupt controller: single
    /// threaded, so "disabling interrupts" just needs to be observable and
    /// idempotent for the duration of a test.
    pub struct TestPort;

    impl InterruptControl for TestPort {
        fn disable() -> bool {
            ENABLED.with(|e| e.replace(false))
        }
        unsafe fn restore(was_enabled: bool) {
            ENABLED.with(|e| e.set(was_enabled));
        }
        fn pend_switch() {}
        unsafe fn install_vector(_irq: u16, _priority: u8, _handler: unsafe extern "C" fn()) {}
    }
}
