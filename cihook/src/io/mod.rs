//! I/O helpers for cihook commands.

pub mod config;
pub mod git;
pub mod hook;
pub mod lock;
pub mod process;
pub mod workspace;
