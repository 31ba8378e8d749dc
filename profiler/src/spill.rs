//! Spill store for samples that overflow the in-memory buffer
//!
//! Backed by an anonymous temporary file (`tempfile::tempfile`), unlinked at
//! creation, so nothing is left behind if the process dies.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use ticktally_shared::codec::record::{self, encoded_len, RECORD_SIZE};
use ticktally_shared::Sample;
use tracing::{debug, warn};

use crate::error::ProfilerError;

/// Why an append did not reach the file
#[derive(Debug)]
pub(crate) enum AppendError {
    Closed,
    Encode,
    Write,
}

/// Outcome of replaying the spill file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Replay {
    pub records: u64,
    pub chunks: u64,
    /// Bytes at the end of the file that did not form a whole record
    pub partial_bytes: u64,
}

pub(crate) struct SpillStore {
    file: Option<File>,
    /// Encoding scratch space, sized for one full sample buffer
    scratch: Box<[u8]>,
    chunk_capacity: usize,
    dir: Option<PathBuf>,
    records_written: u64,
}

impl SpillStore {
    /// `chunk_capacity` is bounded by config validation, so its encoded
    /// size always fits in `usize`.
    pub fn new(chunk_capacity: usize, dir: Option<PathBuf>) -> Self {
        let chunk_bytes = encoded_len(chunk_capacity).unwrap_or(0);
        Self {
            file: None,
            scratch: vec![0u8; chunk_bytes].into_boxed_slice(),
            chunk_capacity,
            dir,
            records_written: 0,
        }
    }

    /// Records appended since the file was last opened or truncated
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Create the backing file if there is none. Returns true if created.
    pub fn open(&mut self) -> Result<bool, ProfilerError> {
        if self.file.is_some() {
            return Ok(false);
        }
        let file = match &self.dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
        .map_err(ProfilerError::SpillCreate)?;
        debug!("Opened anonymous spill file");
        self.file = Some(file);
        self.records_written = 0;
        Ok(true)
    }

    #[cfg(test)]
    pub fn replace_file(&mut self, file: File) {
        self.file = Some(file);
    }

    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed spill file");
        }
        self.records_written = 0;
    }

    /// Append `samples` at the end of the file.
    ///
    /// Runs inside the signal handler: encodes into the preallocated scratch
    /// buffer and issues the write directly, without allocating.
    pub fn append(&mut self, samples: &[Sample]) -> Result<(), AppendError> {
        let Some(file) = self.file.as_mut() else {
            return Err(AppendError::Closed);
        };
        let len = record::encode_samples(samples, &mut self.scratch).ok_or(AppendError::Encode)?;
        if file.write_all(&self.scratch[..len]).is_err() {
            // A short write would shift every later record off its boundary.
            let _ = Self::rewind_to(file, self.records_written);
            return Err(AppendError::Write);
        }
        self.records_written += samples.len() as u64;
        Ok(())
    }

    /// Cut the file back to `records` whole records and continue appending
    /// from there. Only `ftruncate` and `lseek`, both async-signal-safe.
    fn rewind_to(file: &mut File, records: u64) -> io::Result<()> {
        let end = records.saturating_mul(RECORD_SIZE as u64);
        file.set_len(end)?;
        file.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Rewind and feed the whole file back, one buffer-sized chunk at a time.
    pub fn replay<F>(&mut self, mut f: F) -> Result<Replay, ProfilerError>
    where
        F: FnMut(&[Sample]),
    {
        let mut replay = Replay::default();
        let Some(file) = self.file.as_mut() else {
            return Ok(replay);
        };
        file.seek(SeekFrom::Start(0)).map_err(ProfilerError::SpillSeek)?;

        let mut bytes = vec![0u8; self.scratch.len()];
        let mut batch = Vec::with_capacity(self.chunk_capacity);
        loop {
            let filled = fill(file, &mut bytes).map_err(ProfilerError::SpillRead)?;
            if filled == 0 {
                break;
            }
            batch.clear();
            let decoded = record::decode_samples(&bytes[..filled], &mut batch)
                .map_err(|e| ProfilerError::SpillRead(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
            f(&batch);
            replay.chunks += 1;
            replay.records += decoded.records as u64;
            replay.partial_bytes += decoded.trailing_bytes as u64;
            if filled < bytes.len() {
                break;
            }
        }

        if replay.partial_bytes > 0 {
            warn!(
                "profiler: spill file ends with {} bytes of an incomplete sample",
                replay.partial_bytes
            );
        }
        Ok(replay)
    }

    /// Drop all spilled samples and move the write position back to 0.
    pub fn truncate(&mut self) -> Result<(), ProfilerError> {
        if let Some(file) = self.file.as_mut() {
            file.set_len(0).map_err(ProfilerError::SpillTruncate)?;
            file.seek(SeekFrom::Start(0)).map_err(ProfilerError::SpillTruncate)?;
        }
        self.records_written = 0;
        Ok(())
    }
}

/// Read until `buf` is full or EOF, returning the byte count.
fn fill(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticktally_shared::{FuncId, Pc};

    fn samples(range: std::ops::Range<u64>) -> Vec<Sample> {
        range
            .map(|i| Sample::at(FuncId::from_raw(i + 1).unwrap(), Pc::from_raw(i * 4)))
            .collect()
    }

    fn replay_all(store: &mut SpillStore) -> (Vec<Sample>, Replay) {
        let mut seen = Vec::new();
        let replay = store.replay(|chunk| seen.extend_from_slice(chunk)).unwrap();
        (seen, replay)
    }

    #[test]
    fn test_append_requires_open_file() {
        let mut store = SpillStore::new(4, None);
        assert!(matches!(store.append(&samples(0..2)), Err(AppendError::Closed)));
        assert!(store.open().unwrap());
        assert!(!store.open().unwrap());
        assert!(store.append(&samples(0..2)).is_ok());
    }

    #[test]
    fn test_replay_preserves_order_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SpillStore::new(4, Some(dir.path().to_path_buf()));
        store.open().unwrap();

        let all = samples(0..10);
        store.append(&all[0..4]).unwrap();
        store.append(&all[4..8]).unwrap();
        store.append(&all[8..10]).unwrap();
        assert_eq!(store.records_written(), 10);

        let (seen, replay) = replay_all(&mut store);
        assert_eq!(seen, all);
        assert_eq!(replay.records, 10);
        assert_eq!(replay.chunks, 3);
        assert_eq!(replay.partial_bytes, 0);

        // The anonymous file is not visible in the directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_truncate_empties_and_rewinds() {
        let mut store = SpillStore::new(4, None);
        store.open().unwrap();
        store.append(&samples(0..4)).unwrap();
        let _ = replay_all(&mut store);
        store.truncate().unwrap();

        let (seen, replay) = replay_all(&mut store);
        assert!(seen.is_empty());
        assert_eq!(replay, Replay::default());

        // New appends start at offset 0 rather than after a hole.
        store.append(&samples(20..22)).unwrap();
        let (seen, _) = replay_all(&mut store);
        assert_eq!(seen, samples(20..22));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readonly");
        std::fs::write(&path, b"").unwrap();

        let mut store = SpillStore::new(4, None);
        store.file = Some(File::open(&path).unwrap());
        assert!(matches!(store.append(&samples(0..1)), Err(AppendError::Write)));
    }

    #[test]
    fn test_short_write_is_cut_back_to_record_boundary() {
        let mut store = SpillStore::new(4, None);
        store.open().unwrap();
        store.append(&samples(0..2)).unwrap();

        // Leftover of a write that stopped partway through a record.
        let file = store.file.as_mut().unwrap();
        file.write_all(&[0xab; RECORD_SIZE / 2 + 3]).unwrap();
        SpillStore::rewind_to(file, store.records_written).unwrap();

        store.append(&samples(2..4)).unwrap();
        let (seen, replay) = replay_all(&mut store);
        assert_eq!(seen, samples(0..4));
        assert_eq!(replay.partial_bytes, 0);
    }

    #[test]
    fn test_failed_write_keeps_record_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readonly");
        std::fs::write(&path, b"").unwrap();

        let mut store = SpillStore::new(4, None);
        store.file = Some(File::open(&path).unwrap());
        assert!(store.append(&samples(0..3)).is_err());
        assert_eq!(store.records_written(), 0);
    }

    #[test]
    fn test_closed_store_replays_nothing() {
        let mut store = SpillStore::new(4, None);
        let (seen, replay) = replay_all(&mut store);
        assert!(seen.is_empty());
        assert_eq!(replay.records, 0);
        assert!(store.truncate().is_ok());
    }
}
