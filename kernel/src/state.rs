//! The portable kernel state machine: every operation in §4 that does not
//! need to touch hardware lives here as a plain method on [`State`], so it
//! can be driven directly from host-side `#[test]`s without a real
//! `InterruptControl` implementation. [`crate::Kernel`] is the thin wrapper
//! that takes the critical section and, where the algorithm below reports
//! it, asserts the pendable switch interrupt.
use crate::config::{MAX_FIFOS, MAX_NAME_LEN, MAX_PTHREADS, MAX_THREADS, STACK_SIZE};
use crate::error::{ErrCode, FifoError};
use crate::fifo::Fifo;
use crate::periodic::Ptcb;
use crate::semaphore::Semaphore;
use crate::thread::{self, Tcb, ThreadFn, ThreadId};

/// Priority reserved for the implicit idle thread launch() installs to
/// resolve the open question in §9: "there is no idle thread; if all
/// threads block, the scheduler's behaviour is undefined in source."
pub const IDLE_PRIORITY: u8 = u8::MAX;

pub(crate) struct State {
    pub(crate) threads: [Tcb; MAX_THREADS],
    pub(crate) stacks: [[u32; STACK_SIZE]; MAX_THREADS],
    pub(crate) thread_count: usize,
    pub(crate) running: usize,
    pub(crate) next_id: u32,

    pub(crate) periodics: [Ptcb; MAX_PTHREADS],
    pub(crate) periodic_count: usize,

    pub(crate) system_time: u32,

    pub(crate) fifos: [Fifo; MAX_FIFOS],
}

impl State {
    pub(crate) const fn new() -> Self {
        Self {
            threads: [Tcb::DEAD; MAX_THREADS],
            stacks: [[0; STACK_SIZE]; MAX_THREADS],
            thread_count: 0,
            running: 0,
            next_id: 0,
            periodics: [Ptcb::DEAD; MAX_PTHREADS],
            periodic_count: 0,
            system_time: 0,
            fifos: [Fifo::UNINIT; MAX_FIFOS],
        }
    }

    // ---- C. Thread table & ring -----------------------------------------

    pub(crate) fn add_thread(
        &mut self,
        entry: ThreadFn,
        priority: u8,
        name: &str,
    ) -> Result<ThreadId, ErrCode> {
        if self.thread_count >= MAX_THREADS {
            return Err(ErrCode::ThreadLimitReached);
        }
        let slot = (0..MAX_THREADS)
            .find(|&i| !self.threads[i].alive)
            .expect("thread_count < MAX_THREADS implies a dead slot exists");

        let sp = thread::init_stack_frame(&mut self.stacks[slot], entry);
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.threads[slot] = Tcb {
            sp,
            next: slot as u16,
            prev: slot as u16,
            blocked_on: None,
            sleep_ticks: 0,
            asleep: false,
            priority,
            alive: true,
            name: [0; MAX_NAME_LEN],
            id,
        };
        thread::set_name(&mut self.threads[slot], name);

        if self.thread_count == 0 {
            // Self-linked ring of one.
            self.threads[slot].next = slot as u16;
            self.threads[slot].prev = slot as u16;
        } else {
            // Insert immediately before slot 0 (the ring's anchor).
            let head = 0usize;
            let tail = self.threads[head].prev as usize;
            self.threads[slot].next = head as u16;
            self.threads[slot].prev = tail as u16;
            self.threads[tail].next = slot as u16;
            self.threads[head].prev = slot as u16;
        }

        self.thread_count += 1;
        #[cfg(feature = "log")]
        log::trace!("add_thread: id={} slot={} priority={}", id, slot, priority);
        Ok(id)
    }

    pub(crate) fn kill_thread(&mut self, id: ThreadId) -> Result<(), ErrCode> {
        if self.thread_count == 1 {
            return Err(ErrCode::CannotKillLast);
        }
        let mut idx = 0usize;
        for _ in 0..self.thread_count {
            if self.threads[idx].alive && self.threads[idx].id == id {
                self.unlink_thread(idx);
                #[cfg(feature = "log")]
                log::trace!("kill_thread: id={} slot={}", id, idx);
                return Ok(());
            }
            idx = self.threads[idx].next as usize;
        }
        Err(ErrCode::ThreadDoesNotExist)
    }

    fn unlink_thread(&mut self, idx: usize) {
        let next = self.threads[idx].next as usize;
        let prev = self.threads[idx].prev as usize;
        self.threads[prev].next = next as u16;
        self.threads[next].prev = prev as u16;
        self.threads[idx].blocked_on = None;
        self.threads[idx].alive = false;
        self.thread_count -= 1;
    }

    /// Returns `true` if a context switch should be requested.
    pub(crate) fn kill_self(&mut self) -> Result<bool, ErrCode> {
        if self.thread_count == 1 {
            return Err(ErrCode::CannotKillLast);
        }
        let running = self.running;
        // Waking whoever we were blocked on mirrors the original
        // `G8RTOS_KillSelf`, which signals the semaphore the dying thread
        // held before unlinking it — a running thread is never itself
        // blocked, so this only matters if callers misuse the API, but we
        // keep the check for parity with the source behavior.
        if let Some(sem) = self.threads[running].blocked_on {
            self.sem_signal_raw(sem);
        }
        #[cfg(feature = "log")]
        log::trace!("kill_self: id={} slot={}", self.threads[running].id, running);
        self.unlink_thread(running);
        Ok(true)
    }

    pub(crate) fn sleep(&mut self, ticks: u32) -> bool {
        let running = self.running;
        self.threads[running].sleep_ticks = ticks;
        self.threads[running].asleep = ticks > 0;
        true
    }

    pub(crate) fn get_id(&self) -> ThreadId {
        self.threads[self.running].id
    }

    pub(crate) fn get_count(&self) -> usize {
        self.thread_count
    }

    // ---- D. Scheduler -----------------------------------------------------

    /// Picks the runnable thread with the lowest priority value (0 =
    /// highest), breaking ties by ring order; leaves `running` unchanged
    /// if nothing is eligible (§4.D edge case — in practice the idle
    /// thread, installed at [`IDLE_PRIORITY`], is always eligible).
    pub(crate) fn schedule(&mut self) {
        let chosen = crate::scheduler::choose_next(&self.threads, self.thread_count, self.running);
        #[cfg(feature = "log")]
        if chosen != self.running {
            log::trace!(
                "schedule: slot {} -> slot {} (priority {})",
                self.running,
                chosen,
                self.threads[chosen].priority
            );
        }
        self.running = chosen;
    }

    // ---- E. Tick handler ---------------------------------------------------

    /// Advances system time, fires at most one due periodic thread, and
    /// decrements sleep counters. Returns the due periodic's handler (to be
    /// invoked by the caller *outside* the critical section bracket this
    /// method itself does not take — tick context already serializes
    /// against thread-mode mutators on a single core) and whether a switch
    /// should be requested (always `true`, per §4.E step 4).
    pub(crate) fn tick(&mut self) -> (Option<ThreadFn>, bool) {
        self.system_time = self.system_time.wrapping_add(1);

        let mut due = None;
        for i in 0..MAX_PTHREADS {
            let p = &mut self.periodics[i];
            if p.alive && p.next_due == self.system_time {
                p.next_due = p.next_due.wrapping_add(p.period);
                due = p.handler;
                break;
            }
        }

        for i in 0..MAX_THREADS {
            let t = &mut self.threads[i];
            if t.alive && t.sleep_ticks > 0 {
                t.sleep_ticks -= 1;
                if t.sleep_ticks == 0 {
                    t.asleep = false;
                }
            }
        }

        (due, true)
    }

    pub(crate) fn system_time(&self) -> u32 {
        self.system_time
    }

    // ---- G. Periodic thread table ------------------------------------------

    pub(crate) fn add_periodic(
        &mut self,
        handler: ThreadFn,
        period: u32,
        execution_offset: u32,
    ) -> Result<(), ErrCode> {
        if self.periodic_count >= MAX_PTHREADS {
            return Err(ErrCode::ThreadLimitReached);
        }
        let slot = (0..MAX_PTHREADS)
            .find(|&i| !self.periodics[i].alive)
            .expect("periodic_count < MAX_PTHREADS implies a dead slot exists");

        self.periodics[slot] = Ptcb {
            handler: Some(handler),
            next: slot as u16,
            prev: slot as u16,
            period,
            next_due: execution_offset,
            alive: true,
        };

        if self.periodic_count == 0 {
            self.periodics[slot].next = slot as u16;
            self.periodics[slot].prev = slot as u16;
        } else {
            let head = (0..MAX_PTHREADS)
                .find(|&i| self.periodics[i].alive && i != slot)
                .expect("periodic_count > 0 implies another live slot exists");
            let tail = self.periodics[head].prev as usize;
            self.periodics[slot].next = head as u16;
            self.periodics[slot].prev = tail as u16;
            self.periodics[tail].next = slot as u16;
            self.periodics[head].prev = slot as u16;
        }

        self.periodic_count += 1;
        Ok(())
    }

    /// Unlinks a periodic slot from the ring and marks it dead, mirroring
    /// the original source's standalone `RemovePThread` counter-decrement
    /// helper (`original_source/G8RTOS_Scheduler.c`). `spec.md` never
    /// exposes periodic removal through the public API, so this has no
    /// `Kernel` wrapper; it exists for a future public operation or for the
    /// kernel's own bookkeeping to retire a periodic slot symmetrically
    /// with how `kill_thread` retires a thread slot.
    #[allow(dead_code)]
    pub(crate) fn remove_periodic(&mut self, slot: usize) {
        let p = &self.periodics[slot];
        let (next, prev) = (p.next as usize, p.prev as usize);
        self.periodics[prev].next = next as u16;
        self.periodics[next].prev = prev as u16;
        self.periodics[slot].alive = false;
        self.periodic_count -= 1;
    }

    // ---- B. Semaphore -------------------------------------------------------

    pub(crate) fn sem_init_raw(&mut self, s: *const Semaphore, value: i32) {
        unsafe { *(*s).cell() = value };
    }

    /// Returns `true` if the caller should request a context switch.
    pub(crate) fn sem_wait_raw(&mut self, s: *const Semaphore) -> bool {
        let cell = unsafe { &mut *(*s).cell() };
        *cell -= 1;
        if *cell < 0 {
            self.threads[self.running].blocked_on = Some(s);
            true
        } else {
            false
        }
    }

    /// §4.B: never itself forces a switch.
    ///
    /// The wake walk is bounded to `thread_count` steps rather than looping
    /// until a match is found: if the thread that depressed the count was
    /// since killed (§5, §8 scenario 6 — "signalling s once does not
    /// resurrect T_a"), no alive thread is blocked on `s` anymore and an
    /// unbounded walk would spin forever. The original source's unbounded
    /// `while` loop relied on a blocked waiter always still being on the
    /// ring, an invariant `kill_thread`/`kill_self` break; this core bounds
    /// the walk so that case degrades to "count moves, nobody wakes"
    /// instead of a hang (decision recorded in DESIGN.md).
    pub(crate) fn sem_signal_raw(&mut self, s: *const Semaphore) {
        let cell = unsafe { &mut *(*s).cell() };
        *cell += 1;
        if *cell <= 0 {
            let mut idx = self.threads[self.running].next as usize;
            for _ in 0..self.thread_count {
                if self.threads[idx].blocked_on == Some(s) {
                    self.threads[idx].blocked_on = None;
                    break;
                }
                idx = self.threads[idx].next as usize;
            }
        }
    }

    // ---- I. FIFO --------------------------------------------------------------

    pub(crate) fn fifo_init(&mut self, index: usize) -> Result<(), FifoError> {
        if index >= MAX_FIFOS {
            return Err(FifoError::BadIndex);
        }
        self.fifos[index].reset();
        self.sem_init_raw(&self.fifos[index].current_size as *const _, 0);
        self.sem_init_raw(&self.fifos[index].mutex as *const _, 1);
        Ok(())
    }

    /// Never blocks: a full FIFO drops the datum and counts it as lost
    /// (§4.I). Returns whether a context switch should be requested (a
    /// successful write signals `current_size`, which may need to wake a
    /// blocked reader, but per §4.B a bare `signal` never forces a switch
    /// on its own).
    pub(crate) fn fifo_write(&mut self, index: usize, data: u32) -> Result<(), FifoError> {
        if index >= MAX_FIFOS {
            return Err(FifoError::BadIndex);
        }
        if self.fifos[index].is_full() {
            self.fifos[index].lost_data += 1;
            return Err(FifoError::Overflow);
        }
        self.fifos[index].push(data);
        let sem = &self.fifos[index].current_size as *const Semaphore;
        self.sem_signal_raw(sem);
        Ok(())
    }

    pub(crate) fn fifo_lost_data(&self, index: usize) -> u32 {
        self.fifos[index].lost_data
    }

    /// Pointers to a fifo's pair of semaphores, for callers that need to
    /// wait/signal them individually (§4.I read path — each wait takes its
    /// own critical section exactly as `original_source/G8RTOS_IPC.c`'s
    /// `G8RTOS_ReadFIFO` does, so a reader blocked on `current_size` doesn't
    /// hold the whole kernel locked while it waits).
    pub(crate) fn fifo_semaphores(
        &self,
        index: usize,
    ) -> Result<(*const Semaphore, *const Semaphore), FifoError> {
        if index >= MAX_FIFOS {
            return Err(FifoError::BadIndex);
        }
        Ok((
            &self.fifos[index].current_size as *const Semaphore,
            &self.fifos[index].mutex as *const Semaphore,
        ))
    }

    pub(crate) fn fifo_pop(&mut self, index: usize) -> u32 {
        self.fifos[index].pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn noop() {}

    #[test]
    fn add_thread_assigns_and_links() {
        let mut s = State::new();
        let a = s.add_thread(noop, 3, "a").unwrap();
        let b = s.add_thread(noop, 1, "b").unwrap();
        assert_ne!(a, b);
        assert_eq!(s.get_count(), 2);
    }

    #[test]
    fn add_thread_respects_capacity() {
        let mut s = State::new();
        for _ in 0..MAX_THREADS {
            s.add_thread(noop, 5, "t").unwrap();
        }
        assert_eq!(s.add_thread(noop, 5, "overflow"), Err(ErrCode::ThreadLimitReached));
    }

    #[test]
    fn add_then_kill_round_trips_count() {
        let mut s = State::new();
        s.add_thread(noop, 5, "first").unwrap();
        let id = s.add_thread(noop, 5, "second").unwrap();
        assert_eq!(s.get_count(), 2);
        s.kill_thread(id).unwrap();
        assert_eq!(s.get_count(), 1);
    }

    #[test]
    fn killing_the_last_thread_is_refused() {
        let mut s = State::new();
        let id = s.add_thread(noop, 5, "only").unwrap();
        assert_eq!(s.kill_thread(id), Err(ErrCode::CannotKillLast));
    }

    #[test]
    fn killing_unknown_id_reports_not_found() {
        let mut s = State::new();
        s.add_thread(noop, 5, "a").unwrap();
        s.add_thread(noop, 5, "b").unwrap();
        assert_eq!(s.kill_thread(999), Err(ErrCode::ThreadDoesNotExist));
    }

    #[test]
    fn scheduler_prefers_lower_priority_value() {
        let mut s = State::new();
        s.add_thread(noop, 5, "lo").unwrap();
        s.add_thread(noop, 1, "hi").unwrap();
        s.schedule();
        assert_eq!(s.threads[s.running].name_str(), "hi");
    }

    #[test]
    fn sleep_clears_exactly_on_duration_elapsed() {
        let mut s = State::new();
        s.add_thread(noop, 5, "a").unwrap();
        s.sleep(3);
        assert!(s.threads[s.running].asleep);
        for _ in 0..2 {
            s.tick();
            assert!(s.threads[0].asleep);
        }
        s.tick();
        assert!(!s.threads[0].asleep);
    }

    #[test]
    fn periodic_fires_once_at_each_due_tick() {
        let mut s = State::new();
        s.add_thread(noop, 5, "a").unwrap();
        s.add_periodic(noop, 3, 3).unwrap();

        let mut fired_at = Vec::new();
        for t in 1..=9u32 {
            let (due, _) = s.tick();
            if due.is_some() {
                fired_at.push(t);
            }
        }
        assert_eq!(fired_at, vec![3, 6, 9]);
    }

    #[test]
    fn remove_periodic_unlinks_and_stops_it_firing() {
        let mut s = State::new();
        s.add_thread(noop, 5, "a").unwrap();
        s.add_periodic(noop, 3, 3).unwrap();
        s.add_periodic(noop, 5, 5).unwrap();
        assert_eq!(s.periodic_count, 2);

        s.remove_periodic(0);
        assert_eq!(s.periodic_count, 1);
        assert!(!s.periodics[0].alive);

        let mut fired = 0;
        for _ in 1..=5u32 {
            let (due, _) = s.tick();
            if due.is_some() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1); // only the period-5 slot still fires
    }

    #[test]
    fn semaphore_round_trips_after_matched_wait_signal() {
        let s = Semaphore::new(2);
        let mut st = State::new();
        st.add_thread(noop, 5, "a").unwrap();
        let p = &s as *const Semaphore;
        assert!(!st.sem_wait_raw(p));
        assert!(!st.sem_wait_raw(p));
        st.sem_signal_raw(p);
        st.sem_signal_raw(p);
        assert_eq!(s.peek(), 2);
        assert!(st.threads[st.running].blocked_on.is_none());
    }

    #[test]
    fn wait_blocks_when_count_goes_negative() {
        let sem = Semaphore::new(0);
        let mut st = State::new();
        let a = st.add_thread(noop, 5, "a").unwrap();
        let p = &sem as *const Semaphore;
        assert!(st.sem_wait_raw(p));
        assert_eq!(st.threads[0].blocked_on, Some(p));
        let _ = a;
    }

    #[test]
    fn signal_wakes_the_next_blocked_thread_in_ring_order() {
        let sem = Semaphore::new(0);
        let mut st = State::new();
        st.add_thread(noop, 5, "a").unwrap();
        st.add_thread(noop, 5, "b").unwrap();
        st.add_thread(noop, 5, "c").unwrap();
        let p = &sem as *const Semaphore;
        // Forward ring order after three adds is a(0) -> b(1) -> c(2) -> a,
        // since each new thread is linked in immediately before slot 0.
        // Both b and c block; a's signal walks from a's successor and must
        // reach b (the first encountered) before c.
        st.running = 1; // b
        st.sem_wait_raw(p);
        st.running = 2; // c
        st.sem_wait_raw(p);
        st.running = 0; // a
        st.sem_signal_raw(p);
        assert!(st.threads[1].blocked_on.is_none());
        assert!(st.threads[2].blocked_on.is_some());
    }

    #[test]
    fn killing_a_blocked_thread_leaves_the_semaphore_depressed() {
        let sem = Semaphore::new(0);
        let mut st = State::new();
        let a = st.add_thread(noop, 5, "a").unwrap();
        st.add_thread(noop, 5, "b").unwrap();
        let p = &sem as *const Semaphore;
        st.sem_wait_raw(p);
        assert_eq!(sem.peek(), -1);
        st.kill_thread(a).unwrap();
        assert_eq!(sem.peek(), -1);
        st.sem_signal_raw(p);
        // No thread was waiting anymore, so the walk finds nothing to wake
        // but the count still moves — the source's documented behaviour.
        assert_eq!(sem.peek(), 0);
    }

    #[test]
    fn fifo_write_then_read_preserves_order() {
        let mut s = State::new();
        s.add_thread(noop, 5, "a").unwrap();
        s.fifo_init(0).unwrap();
        s.fifo_write(0, 10).unwrap();
        s.fifo_write(0, 20).unwrap();
        assert_eq!(s.fifo_pop(0), 10);
        assert_eq!(s.fifo_pop(0), 20);
    }

    #[test]
    fn fifo_overflow_drops_newest_and_counts_loss() {
        let mut s = State::new();
        s.add_thread(noop, 5, "a").unwrap();
        s.fifo_init(0).unwrap();
        for i in 0..FIFO_SIZE_FOR_TEST {
            s.fifo_write(0, i as u32).unwrap();
        }
        assert_eq!(s.fifo_write(0, 999), Err(FifoError::Overflow));
        assert_eq!(s.fifo_lost_data(0), 1);
        assert_eq!(s.fifo_pop(0), 0);
    }

    const FIFO_SIZE_FOR_TEST: usize = crate::config::FIFO_SIZE;
}
