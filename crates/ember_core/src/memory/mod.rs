//! # Memory Management
//!
//! Owner-side storage for objects that other objects refer to by handle.
//!
//! ## Design Philosophy
//!
//! References between engine objects are never raw pointers:
//! - A handle is an index into the owner's arena
//! - A generation counter detects handles to removed objects
//! - Slots are reused, so memory stays flat while editing

mod arena;

pub use arena::{Arena, Handle};
