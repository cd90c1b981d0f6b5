//! Compile-time kernel limits.
//!
//! A fixed-capacity kernel has no allocator to size its pools from, so every
//! pool's capacity is nailed down here, once, at compile time — the direct
//! analogue of the original `#define MAX_THREADS` style header this core is
//! grounded on. Adjust these to retune footprint vs. capacity for a given
//! board.

/// Maximum number of threads [`crate::Kernel::add_thread`] can register
/// simultaneously.
pub const MAX_THREADS: usize = 16;

/// Maximum number of periodic software timers
/// [`crate::Kernel::add_periodic`] can register.
pub const MAX_PTHREADS: usize = 8;

/// Number of FIFO instances in the shared FIFO pool.
pub const MAX_FIFOS: usize = 4;

/// Capacity, in words, of a single FIFO.
pub const FIFO_SIZE: usize = 16;

/// Size, in 32-bit words, of each thread's private stack.
pub const STACK_SIZE: usize = 128;

/// Maximum length (including the terminating NUL) of a thread's name.
pub const MAX_NAME_LEN: usize = 16;
