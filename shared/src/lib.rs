//! Shared types and utilities for ticktally
//!
//! This crate contains the identity tokens, sample records and the
//! statistics table exchanged between the profiling engine and its host,
//! plus the fixed-width codec used for spilled samples.

pub mod codec;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{sample::*, stats::*};
