//! The public API surface (§6): a thin, critical-section-guarded shell
//! around [`State`] that decides, after each mutation, whether to assert
//! the pendable switch interrupt.
use core::cell::UnsafeCell;

use crate::aperiodic;
use crate::error::{ErrCode, FifoError};
use crate::port::{CriticalSection, InterruptControl};
use crate::semaphore::Semaphore;
use crate::state::{State, IDLE_PRIORITY};
use crate::thread::{ThreadFn, ThreadId};

/// Runs forever at [`IDLE_PRIORITY`] so the scheduler always has something
/// eligible to select (§9: "provide an implicit idle thread at the lowest
/// priority").
unsafe extern "C" fn idle_thread() {
    loop {
        core::hint::spin_loop();
    }
}

/// The kernel singleton. Applications declare one `static KERNEL: Kernel<P>`
/// per board and drive it from their tick handler, switch handler, and
/// `main`. `P` is the board's [`InterruptControl`] implementation; nothing
/// in here touches a register directly.
pub struct Kernel<P: InterruptControl> {
    state: UnsafeCell<State>,
    _port: core::marker::PhantomData<P>,
}

// Safety: every access to `state` is taken under `CriticalSection<P>`,
// which disables the interrupts that would otherwise reenter it; the only
// unsynchronized field is `system_time`, which `State` itself documents as
// tick-handler-owned.
unsafe impl<P: InterruptControl> Sync for Kernel<P> {}

impl<P: InterruptControl> Kernel<P> {
    pub const fn new() -> Self {
        Self {
            state: UnsafeCell::new(State::new()),
            _port: core::marker::PhantomData,
        }
    }

    #[inline]
    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let _cs = CriticalSection::<P>::enter();
        // Safety: `_cs` proves interrupts are masked for the duration of
        // this call, and the RAII guard on every other call site gives
        // the same guarantee, so no other execution context can be
        // touching `state` concurrently.
        f(unsafe { &mut *self.state.get() })
    }

    /// One-time setup. Installs the implicit idle thread at slot 0 so the
    /// ring is never empty once user threads are added.
    pub fn init(&self) -> Result<(), ErrCode> {
        self.with_state(|s| s.add_thread(idle_thread, IDLE_PRIORITY, "idle").map(|_| ()))
    }

    /// Selects slot 0 (the idle thread `init` installed) as the initial
    /// currently-running thread. The board's port is responsible for the
    /// low-level "start first thread" primitive that actually pops its
    /// synthetic frame and for arming the tick and switch interrupts at
    /// the lowest maskable priority before calling this.
    pub fn launch(&self) -> Result<(), ErrCode> {
        self.with_state(|s| {
            s.running = 0;
            Ok(())
        })
    }

    // ---- Thread API --------------------------------------------------------

    pub fn add_thread(&self, entry: ThreadFn, priority: u8, name: &str) -> Result<ThreadId, ErrCode> {
        self.with_state(|s| s.add_thread(entry, priority, name))
    }

    pub fn kill_thread(&self, id: ThreadId) -> Result<(), ErrCode> {
        self.with_state(|s| s.kill_thread(id))
    }

    pub fn kill_self(&self) -> Result<(), ErrCode> {
        let needs_switch = self.with_state(|s| s.kill_self())?;
        if needs_switch {
            P::pend_switch();
        }
        Ok(())
    }

    pub fn sleep(&self, ticks: u32) {
        let needs_switch = self.with_state(|s| s.sleep(ticks));
        if needs_switch {
            P::pend_switch();
        }
    }

    pub fn get_thread_id(&self) -> ThreadId {
        self.with_state(|s| s.get_id())
    }

    pub fn get_number_of_threads(&self) -> usize {
        self.with_state(|s| s.get_count())
    }

    // ---- Periodic API -------------------------------------------------------

    pub fn add_periodic_event(
        &self,
        handler: ThreadFn,
        period: u32,
        execution_offset: u32,
    ) -> Result<(), ErrCode> {
        self.with_state(|s| s.add_periodic(handler, period, execution_offset))
    }

    // ---- Aperiodic API -------------------------------------------------------

    /// Validates, then installs the vector under a critical section, as
    /// §4.H specifies ("...then ends the critical section").
    pub fn add_aperiodic_event(
        &self,
        handler: unsafe extern "C" fn(),
        priority: u8,
        irq: u16,
    ) -> Result<(), ErrCode> {
        aperiodic::validate(irq, priority)?;
        self.with_state(|_s| {
            // Safety: `validate` above already checked `irq`/`priority`
            // against the platform's ranges.
            unsafe { P::install_vector(irq, priority, handler) };
        });
        Ok(())
    }

    // ---- Semaphore API -------------------------------------------------------

    pub fn sem_init(&self, s: &Semaphore, value: i32) {
        self.with_state(|st| st.sem_init_raw(s as *const Semaphore, value));
    }

    pub fn sem_wait(&self, s: &Semaphore) {
        let needs_switch = self.with_state(|st| st.sem_wait_raw(s as *const Semaphore));
        if needs_switch {
            P::pend_switch();
        }
    }

    pub fn sem_signal(&self, s: &Semaphore) {
        self.with_state(|st| st.sem_signal_raw(s as *const Semaphore));
    }

    // ---- FIFO API -------------------------------------------------------------

    pub fn init_fifo(&self, index: usize) -> Result<(), FifoError> {
        self.with_state(|s| s.fifo_init(index))
    }

    /// Mirrors the source's two independently critical-sectioned waits
    /// (§4.I): waiting on `current_size` can suspend the calling thread,
    /// and that suspension must not hold the kernel locked, so each wait
    /// takes its own critical section rather than one spanning the whole
    /// read.
    pub fn read_fifo(&self, index: usize) -> Result<u32, FifoError> {
        let (current_size, mutex) = self.with_state(|s| s.fifo_semaphores(index))?;
        // Safety: pointers are into `self.state`, which outlives every
        // call through `self` for as long as `self` is reachable.
        self.sem_wait(unsafe { &*current_size });
        self.sem_wait(unsafe { &*mutex });
        let data = self.with_state(|s| s.fifo_pop(index));
        self.sem_signal(unsafe { &*mutex });
        Ok(data)
    }

    pub fn write_fifo(&self, index: usize, data: u32) -> Result<(), FifoError> {
        self.with_state(|s| s.fifo_write(index, data))
    }

    pub fn fifo_lost_data(&self, index: usize) -> u32 {
        self.with_state(|s| s.fifo_lost_data(index))
    }

    // ---- Entry points the port calls from its interrupt handlers -----------

    /// Called from the board's SysTick handler. Returns the due periodic
    /// handler, if any, so the port can invoke it *after* this call
    /// returns — running user code while still inside the kernel's own
    /// critical section would hide a second tick's worth of latency from
    /// everything else.
    pub fn on_tick(&self) -> Option<ThreadFn> {
        let (due, needs_switch) = self.with_state(|s| s.tick());
        if needs_switch {
            P::pend_switch();
        }
        due
    }

    /// Called from the board's pendable-switch handler, between saving the
    /// outgoing thread's registers and restoring the incoming one's.
    /// Returns the stack pointer the port should restore from.
    pub fn choose_next_task(&self) -> *mut u32 {
        self.with_state(|s| {
            s.schedule();
            s.threads[s.running].sp
        })
    }

    /// Called from the board's pendable-switch handler immediately before
    /// it saves registers, to record where they went.
    pub fn save_running_sp(&self, sp: *mut u32) {
        self.with_state(|s| {
            let running = s.running;
            s.threads[running].sp = sp;
        });
    }

    pub fn system_time(&self) -> u32 {
        // Safety: reads of `system_time` alone are documented in `State`
        // as not requiring the critical section; only the tick handler
        // writes it.
        unsafe { (*self.state.get()).system_time() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::test_port::TestPort;

    /// `state.rs`'s `trace!` calls (thread add/kill, scheduler decisions)
    /// are otherwise invisible under `cargo test`; installing `env_logger`
    /// once surfaces them via `RUST_LOG=trace`, the same way a board would
    /// install its own logger backend against this crate's `log` facade.
    /// `try_init` rather than `init` because every test module's first test
    /// races to install it, and only the first should win.
    fn init_logging() {
        let _ = env_logger::try_init();
    }

    unsafe extern "C" fn noop() {}

    fn slot_of(k: &Kernel<TestPort>, id: ThreadId) -> usize {
        k.with_state(|s| {
            let mut idx = 0;
            for _ in 0..s.thread_count {
                if s.threads[idx].id == id {
                    return idx;
                }
                idx = s.threads[idx].next as usize;
            }
            panic!("thread {id} not found");
        })
    }

    #[test]
    fn higher_priority_thread_is_selected_over_a_sleeping_lower_one() {
        init_logging();
        let k = Kernel::<TestPort>::new();
        k.init().unwrap();
        let hi = k.add_thread(noop, 1, "hi").unwrap();
        let lo = k.add_thread(noop, 5, "lo").unwrap();

        // Put `lo` to sleep as if it were the currently-running thread.
        let lo_slot = slot_of(&k, lo);
        k.with_state(|s| s.running = lo_slot);
        k.sleep(10);

        k.with_state(|s| s.schedule());
        assert_eq!(k.with_state(|s| s.threads[s.running].id), hi);

        for _ in 0..10 {
            k.on_tick();
        }
        assert!(!k.with_state(|s| s.threads[lo_slot].asleep));
    }

    #[test]
    fn semaphore_wait_then_signal_clears_blocked_field() {
        init_logging();
        let k = Kernel::<TestPort>::new();
        k.init().unwrap(); // slot 0: idle
        let a = k.add_thread(noop, 5, "a").unwrap();
        let sem = Semaphore::new(0);
        k.sem_init(&sem, 0);

        let a_slot = slot_of(&k, a);
        k.with_state(|s| s.running = a_slot);
        k.sem_wait(&sem); // `a` blocks on `sem`
        assert!(k.with_state(|s| s.threads[a_slot].blocked_on.is_some()));

        k.with_state(|s| s.running = 0); // idle signals on `a`'s behalf
        k.sem_signal(&sem);
        assert!(k.with_state(|s| s.threads[a_slot].blocked_on.is_none()));
    }

    #[test]
    fn fifo_round_trips_four_values() {
        let k = Kernel::<TestPort>::new();
        k.init().unwrap();
        k.add_thread(noop, 5, "a").unwrap();
        k.init_fifo(0).unwrap();
        for v in [10, 20, 30, 40] {
            k.write_fifo(0, v).unwrap();
        }
        for v in [10, 20, 30, 40] {
            assert_eq!(k.read_fifo(0).unwrap(), v);
        }
    }

    #[test]
    fn add_aperiodic_event_validates_irq_bounds() {
        let k = Kernel::<TestPort>::new();
        assert_eq!(
            k.add_aperiodic_event(noop, 1, 0),
            Err(ErrCode::IrqnInvalid)
        );
        assert_eq!(
            k.add_aperiodic_event(noop, 1, 155),
            Err(ErrCode::IrqnInvalid)
        );
        assert!(k.add_aperiodic_event(noop, 1, 30).is_ok());
    }
}
