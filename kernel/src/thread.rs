//! Thread control blocks, stacks, and the synthetic exception frame that
//! makes a freshly created thread indistinguishable from one that was
//! merely pre-empted (§3 "Thread stack", §4.C).
use crate::config::{MAX_NAME_LEN, STACK_SIZE};
use crate::semaphore::Semaphore;

/// A thread's identity. Kernel-assigned at `add_thread` time (equal to the
/// pool slot the thread occupies) — the original C source's `AddThread`
/// took an explicit `ID` argument but never actually used it, always
/// deriving the id from the slot index instead; this core keeps that
/// behavior and simply returns the assigned id rather than accept an unused
/// parameter (decision recorded in DESIGN.md).
pub type ThreadId = u32;

/// A thread entry point: `extern "C"` because the synthetic stack frame
/// hands control to it the same way an exception return would.
pub type ThreadFn = unsafe extern "C" fn();

/// Cortex-M PSR thumb-state bit (bit 24), which must be set in the
/// synthetic frame's saved xPSR or the processor will fault entering
/// thread code.
const THUMB_BIT: u32 = 1 << 24;

#[derive(Clone, Copy)]
pub(crate) struct Tcb {
    /// Saved stack pointer; always points somewhere inside this slot's own
    /// stack array (§3 invariant).
    pub(crate) sp: *mut u32,
    pub(crate) next: u16,
    pub(crate) prev: u16,
    /// The semaphore this thread is blocked on, identified by address, or
    /// `None` when runnable.
    pub(crate) blocked_on: Option<*const Semaphore>,
    pub(crate) sleep_ticks: u32,
    pub(crate) asleep: bool,
    pub(crate) priority: u8,
    pub(crate) alive: bool,
    pub(crate) name: [u8; MAX_NAME_LEN],
    pub(crate) id: ThreadId,
}

impl Tcb {
    pub(crate) const DEAD: Tcb = Tcb {
        sp: core::ptr::null_mut(),
        next: 0,
        prev: 0,
        blocked_on: None,
        sleep_ticks: 0,
        asleep: false,
        priority: u8::MAX,
        alive: false,
        name: [0; MAX_NAME_LEN],
        id: 0,
    };

    pub(crate) fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

fn copy_name(dst: &mut [u8; MAX_NAME_LEN], src: &str) {
    *dst = [0; MAX_NAME_LEN];
    let bytes = src.as_bytes();
    let n = bytes.len().min(MAX_NAME_LEN - 1);
    dst[..n].copy_from_slice(&bytes[..n]);
}

/// Writes the synthetic interrupt-exception frame a newly created thread
/// needs at the top of its stack, and returns the stack pointer value the
/// context-switch primitive should restore from.
///
/// Layout, from the top of the stack downward (matches
/// `original_source/G8RTOS_Scheduler.c`'s `SetInitialStack`/`AddThread`
/// exactly): xPSR (thumb bit set), PC (`entry`), LR (sentinel — thread
/// functions never return), R12, R3, R2, R1, R0, then R11..R4. The saved
/// stack pointer is the address of R4, i.e. 16 words below the top.
pub(crate) fn init_stack_frame(stack: &mut [u32; STACK_SIZE], entry: ThreadFn) -> *mut u32 {
    let top = STACK_SIZE;
    stack[top - 1] = THUMB_BIT; // xPSR
    stack[top - 2] = entry as usize as u32; // PC
    stack[top - 3] = 0; // LR
    stack[top - 4] = 0; // R12
    stack[top - 5] = 0; // R3
    stack[top - 6] = 0; // R2
    stack[top - 7] = 0; // R1
    stack[top - 8] = 0; // R0
    for i in 0..8 {
        stack[top - 9 - i] = 0; // R11..R4
    }
    &mut stack[top - 16] as *mut u32
}

pub(crate) fn set_name(tcb: &mut Tcb, name: &str) {
    copy_name(&mut tcb.name, name);
}
