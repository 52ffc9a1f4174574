//! # brkalloc - A `malloc` Family on Top of the Program Break
//!
//! This crate implements `malloc`, `calloc`, `realloc` and `free` in user
//! space, using nothing but the ability to move the program break up and
//! down (`sbrk(2)`).
//!
//! ## Overview
//!
//! Every allocation is a block: a header followed by the payload. Blocks are
//! carved off the top of the heap by growing the break and are chained in a
//! singly linked list in the order they were created:
//!
//! ```text
//!   Heap Block List:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │   ┌────┬─────┬────┬─────────┬────┬───┬──────────────────────────┐   │
//!   │   │ H1 │ A1  │ H2 │   A2    │ H3 │A3 │        unmapped          │   │
//!   │   └────┴─────┴────┴─────────┴────┴───┴──────────────────────────┘   │
//!   │     ▲            ▲              ▲      ▲                            │
//!   │     │            │              │      │                            │
//!   │   head ──next──▶ ──────next───▶ tail  Program                       │
//!   │                                        Break                        │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **allocate**: the list is scanned first-fit for a free block that is
//!   large enough. Only if none exists is the break grown and a new block
//!   appended. Reused blocks are never split.
//! - **release**: if the block ends at the break it is the tail, and the
//!   break moves back down over it. Any other block is only flagged free.
//!   Adjacent free blocks are never merged.
//! - **resize**: blocks never shrink. Growing moves the contents to a new
//!   block and releases the old one.
//! - **zero-allocate**: allocate plus zero fill, with an overflow check on
//!   `count * elem_size`.
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── align      - Alignment rounding (align_to!)
//!   ├── block      - Block header layout
//!   ├── brk        - Break managers: Sbrk (process) and ArenaBreak (buffer)
//!   ├── heap       - Block list, first-fit scan, grow and release paths
//!   ├── allocator  - Locked facade, GlobalAlloc, BRK_ALLOCATOR
//!   ├── error      - Why a request produced no memory
//!   ├── logger     - Reentrancy-safe logging and an allocation-free sink
//!   └── ffi        - C symbols (feature `c-abi`)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{Allocator, ArenaBreak};
//!
//! let allocator = Allocator::new(ArenaBreak::with_capacity(4096));
//!
//! let ptr = allocator.allocate(64);
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     ptr.write(42);
//!     let ptr = allocator.resize(ptr, 256);
//!     assert_eq!(ptr.read(), 42);
//!     allocator.release(ptr);
//! }
//!
//! // The tail went back to the break; the first block stays, flagged free.
//! let blocks = allocator.blocks();
//! assert_eq!(blocks.len(), 1);
//! assert!(blocks[0].is_free);
//! ```
//!
//! [`BRK_ALLOCATOR`] drives the real process break. To make the process
//! break back Rust's global allocator instead, declare the owner there (and
//! leave `BRK_ALLOCATOR` unused):
//!
//! ```rust,ignore
//! use brkalloc::{Allocator, Sbrk};
//!
//! #[global_allocator]
//! static GLOBAL: Allocator<Sbrk> = Allocator::new(unsafe { Sbrk::new() });
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┬─────────┐
//!   │    Block Header       │         User Data              │ padding │
//!   │  ┌─────────────────┐  │                                │         │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │ to a    │
//!   │  │ is_free: false  │  │  │                          │  │ multiple│
//!   │  │ next: null/ptr  │  │  │     N bytes usable       │  │ of 16   │
//!   │  └─────────────────┘  │  │                          │  │         │
//!   │  32 bytes, align 16   │  └──────────────────────────┘  │         │
//!   └───────────────────────┴────────────────────────────────┴─────────┘
//!                           ▲
//!                           └── Pointer returned to user (16-byte aligned)
//! ```
//!
//! ## Limitations
//!
//! - **One lock**: every operation serializes on a single mutex.
//! - **Limited return to the OS**: only the tail block goes back.
//! - **Alignment**: nothing beyond 16 bytes.
//! - **Shared break**: the release path reads the break and then moves it.
//!   Anything else in the process that grows the break in between gets its
//!   memory released. The lock only orders this crate's own callers.
//! - **Unix-only**: requires `libc` and `sbrk`.
//!
//! ## Safety
//!
//! Pointers handed to `resize` and `release` must come from the same
//! allocator and must not have been released already. Nothing checks this.

pub mod align;
#[macro_use]
pub mod logger;
mod allocator;
mod block;
mod brk;
mod error;
#[cfg(all(feature = "c-abi", not(test)))]
pub mod ffi;
mod heap;

pub use allocator::{Allocator, BRK_ALLOCATOR};
pub use block::{Block, HEADER_ALIGN, HEADER_SIZE};
pub use brk::{ArenaBreak, ProgramBreak, Sbrk};
pub use error::{Error, Result};
pub use heap::{Allocation, BlockInfo, Blocks, Heap, Release, Source};
