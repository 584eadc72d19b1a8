//! Utility modules for the binary: logging setup and a drop guard.

pub mod guard;
pub mod logger;
