//! # brkalloc-core
//!
//! A single-arena, first-fit heap allocator over a simulated program break.
//!
//! The arena is a growable byte buffer kept in lockstep with an `sbrk`-style
//! break primitive; chunks are offsets into that buffer, so the whole engine
//! is bounds-checked safe Rust and testable without touching OS memory.
//!
//! The engine consists of:
//! - **Alignment** (`align`): word-boundary rounding shared by all paths
//! - **Break primitive** (`brk`): the `ProgramBreak` trait and its simulation
//! - **Arena** (`arena`): the byte-buffer region behind the break
//! - **Chunk directory** (`chunk`): doubly linked headers, first-fit search,
//!   split and coalesce, structural validation
//! - **Facade** (`heap`): allocate / allocate_zeroed / resize / release behind
//!   one coarse lock, with a structured lifecycle log
//! - **Configuration** (`config`): per-heap double-release policy
//! - **Metrics** (`metrics`): atomic counters for observability
//!
//! Every public operation is linearizable: one `parking_lot::Mutex` guards
//! the directory, the arena, and the break calls.

#![deny(unsafe_code)]

pub mod align;
pub mod arena;
pub mod brk;
pub mod chunk;
pub mod config;
pub mod error;
pub mod heap;
pub mod metrics;

pub use align::{ALIGNMENT, align_up};
pub use brk::{ProgramBreak, SimBreak};
pub use chunk::{ChunkRecord, HEADER_SIZE};
pub use config::{DoubleReleasePolicy, HeapConfig};
pub use error::HeapError;
pub use heap::{Heap, HeapLogLevel, HeapLogRecord};
pub use metrics::{HeapMetrics, MetricsSnapshot};
