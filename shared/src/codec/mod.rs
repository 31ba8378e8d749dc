//! Binary encodings used by the engine
//!
//! Only the spill file has a byte format today. It never leaves the
//! process, so there is no versioning.

pub mod record;
