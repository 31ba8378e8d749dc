//! Fixed-width sample records for the spill file.
//!
//! Uses bincode with an explicit fixint config so every record is exactly
//! [`RECORD_SIZE`] bytes. Chunked read-back relies on that: a chunk of
//! `n * RECORD_SIZE` bytes always holds `n` whole records.
//!
//! Encoding writes into a caller-owned buffer and never allocates, which
//! keeps it usable from the signal handler.

use crate::types::sample::{FuncId, Pc, Sample};
use anyhow::Result;
use bincode::Options;
use serde::{Deserialize, Serialize};

/// Size of one encoded sample, in bytes
pub const RECORD_SIZE: usize = 16;

/// Fixint, little-endian, no trailing-byte check (we decode record slices).
fn record_bincode() -> impl bincode::config::Options + Copy {
    bincode::config::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

/// On-disk shape of a sample; 0 encodes a null reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpillRecord {
    pub func: u64,
    pub pc: u64,
}

impl From<Sample> for SpillRecord {
    fn from(sample: Sample) -> Self {
        Self {
            func: sample.func.map_or(0, FuncId::get),
            pc: sample.pc.map_or(0, Pc::get),
        }
    }
}

impl From<SpillRecord> for Sample {
    fn from(record: SpillRecord) -> Self {
        Sample {
            func: FuncId::from_raw(record.func),
            pc: Pc::from_raw(record.pc),
        }
    }
}

/// Bytes needed to encode `count` samples, or `None` on overflow
pub const fn encoded_len(count: usize) -> Option<usize> {
    count.checked_mul(RECORD_SIZE)
}

/// Encode `samples` into the front of `out`.
///
/// Returns the number of bytes written, or `None` if `out` is too small.
pub fn encode_samples(samples: &[Sample], out: &mut [u8]) -> Option<usize> {
    let len = encoded_len(samples.len())?;
    if out.len() < len {
        return None;
    }
    for (sample, slot) in samples.iter().zip(out[..len].chunks_exact_mut(RECORD_SIZE)) {
        let mut cursor: &mut [u8] = slot;
        record_bincode()
            .serialize_into(&mut cursor, &SpillRecord::from(*sample))
            .ok()?;
    }
    Some(len)
}

/// Result of decoding a byte run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Whole records appended to the output
    pub records: usize,

    /// Bytes left over after the last whole record
    pub trailing_bytes: usize,
}

/// Decode every whole record in `bytes`, appending to `out`.
pub fn decode_samples(bytes: &[u8], out: &mut Vec<Sample>) -> Result<Decoded> {
    let records = bytes.chunks_exact(RECORD_SIZE);
    let trailing_bytes = records.remainder().len();
    let mut count = 0;
    for chunk in records {
        let record: SpillRecord = record_bincode().deserialize(chunk)?;
        out.push(record.into());
        count += 1;
    }
    Ok(Decoded {
        records: count,
        trailing_bytes,
    })
}
