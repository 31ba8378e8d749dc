//! Data types shared between the engine and its host

pub mod sample;
pub mod stats;
