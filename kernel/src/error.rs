//! Kernel error taxonomy.
//!
//! Every fallible kernel operation reports failure through [`ErrCode`]; the
//! kernel never panics or traps on API misuse, it rejects and continues.
//! FIFO operations have their own narrower error types ([`FifoError`])
//! since they are reported as small negative integers in the platform this
//! core is descended from (-1 for a bad index, -2 for a full buffer) and we
//! keep those discriminants so the numeric contract still holds for callers
//! that care about it.
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ErrCode {
    NoError = 0,
    ThreadLimitReached = -1,
    ThreadDoesNotExist = -2,
    CannotKillLast = -3,
    IrqnInvalid = -4,
    HwiPriorityInvalid = -5,
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoError => "no error",
            Self::ThreadLimitReached => "thread limit reached",
            Self::ThreadDoesNotExist => "thread does not exist",
            Self::CannotKillLast => "cannot kill the last thread",
            Self::IrqnInvalid => "interrupt number out of range",
            Self::HwiPriorityInvalid => "hardware interrupt priority out of range",
        };
        f.write_str(s)
    }
}

/// Result of a FIFO index lookup or write that can overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum FifoError {
    /// The FIFO index did not name a configured FIFO.
    BadIndex = -1,
    /// The FIFO was full; the new datum was dropped and `lost_data` was
    /// incremented.
    Overflow = -2,
}
