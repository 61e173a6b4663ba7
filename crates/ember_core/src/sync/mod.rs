//! # Synchronization Primitives for Strided Parallel Updates
//!
//! ## The Problem
//!
//! ```text
//! Worker 0:  writes slots 0, N, 2N, ...
//! Worker 1:  writes slots 1, N+1, 2N+1, ...
//!
//! &mut Vec<T> per worker:  ALIASING → UB
//! Mutex<Vec<T>>:           LOCK CONTENTION → serial
//! ```
//!
//! ## The Solution: Partition by Construction
//!
//! Every slot lives in its own `UnsafeCell`. The caller proves that each slot
//! is reached by exactly one worker per phase (stride = worker count over a
//! single list), so workers write without locks.

mod partitioned;

pub use partitioned::PartitionedSlots;
