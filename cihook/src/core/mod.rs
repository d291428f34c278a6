//! Deterministic, pure logic shared by the hook runner.
//!
//! Core modules must be free of I/O side effects.

pub mod flags;
pub mod slug;
