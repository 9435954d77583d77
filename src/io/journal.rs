use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use fs2::FileExt;

use crate::constants::{CACHE_RECORD_MAGIC, MAX_CACHE_RECORD_BYTES};
use crate::error::{ChemlinkError, Result};

// Each record header: [magic: u32][len: u32][checksum: 32 bytes]
const RECORD_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// What a replay found besides valid records.
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    pub records: Vec<JournalRecord>,
    /// Records skipped because their checksum or header did not verify.
    pub corrupt: Vec<ChemlinkError>,
    /// Bytes dropped from a torn tail (partial final write).
    pub truncated_bytes: u64,
}

/// Append-only, checksummed record log backing the resolution cache.
///
/// The file is locked exclusively for the lifetime of the handle.
#[derive(Debug)]
pub struct Journal {
    file: File,
    path: PathBuf,
    write_head: u64,
    appends: u64,
    skip_sync: bool,
}

impl Journal {
    /// Open (creating if needed) and replay the journal.
    ///
    /// A torn tail is truncated away. Damaged records followed by a valid one
    /// are reported in [`ReplayOutcome::corrupt`] and left in place until the
    /// next [`Journal::rewrite`].
    pub fn open(path: &Path, skip_sync: bool) -> Result<(Self, ReplayOutcome)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        lock_exclusive(&file, path)?;

        let file_len = file.metadata()?.len();
        let (mut outcome, valid_end) = scan_records(&file, file_len)?;
        if valid_end < file_len {
            tracing::warn!(
                journal.path = %path.display(),
                journal.valid_end = valid_end,
                journal.file_len = file_len,
                "truncating torn journal tail"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
            outcome.truncated_bytes = file_len - valid_end;
        }

        Ok((
            Self {
                file,
                path: path.to_path_buf(),
                write_head: valid_end,
                appends: 0,
                skip_sync,
            },
            outcome,
        ))
    }

    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_CACHE_RECORD_BYTES)
            .ok_or_else(|| ChemlinkError::CacheCorruption {
                offset: self.write_head,
                reason: "journal payload too large".into(),
            })?;

        let mut header = [0u8; RECORD_HEADER_SIZE];
        header[..4].copy_from_slice(&CACHE_RECORD_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&len.to_le_bytes());
        header[8..40].copy_from_slice(blake3::hash(payload).as_bytes());

        // Single write so a crash leaves either nothing or a detectable torn tail
        let mut combined = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        combined.extend_from_slice(&header);
        combined.extend_from_slice(payload);

        let offset = self.write_head;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&combined)?;
        if !self.skip_sync {
            self.file.sync_data()?;
        }
        self.write_head += combined.len() as u64;
        self.appends += 1;
        tracing::trace!(journal.offset = offset, journal.len = len, "journal append");
        Ok(offset)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_all().map_err(Into::into)
    }

    /// Replace the whole journal with `payloads`, atomically.
    pub fn rewrite<'a, I>(&mut self, payloads: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut atomic = AtomicWriteFile::open(&self.path)?;
        let mut written = 0u64;
        for payload in payloads {
            let len = u32::try_from(payload.len()).map_err(|_| ChemlinkError::CacheCorruption {
                offset: written,
                reason: "journal payload too large".into(),
            })?;
            let mut header = [0u8; RECORD_HEADER_SIZE];
            header[..4].copy_from_slice(&CACHE_RECORD_MAGIC.to_le_bytes());
            header[4..8].copy_from_slice(&len.to_le_bytes());
            header[8..40].copy_from_slice(blake3::hash(payload).as_bytes());
            atomic.write_all(&header)?;
            atomic.write_all(payload)?;
            written += (RECORD_HEADER_SIZE + payload.len()) as u64;
        }
        atomic.flush()?;
        atomic.commit()?;

        // The rename replaced the inode; reopen and lock the new file.
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        lock_exclusive(&file, &self.path)?;
        self.file = file;
        self.write_head = written;
        self.appends = 0;
        Ok(())
    }

    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.write_head
    }

    #[must_use]
    pub fn appends(&self) -> u64 {
        self.appends
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    file.try_lock_exclusive().map_err(|err| {
        ChemlinkError::Lock(format!(
            "resolution cache {} is held by another process: {err}",
            path.display()
        ))
    })
}

fn scan_records(file: &File, file_len: u64) -> Result<(ReplayOutcome, u64)> {
    let mut reader = file.try_clone()?;
    reader.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::with_capacity(usize::try_from(file_len).unwrap_or(0));
    reader.take(file_len).read_to_end(&mut bytes)?;

    let mut outcome = ReplayOutcome::default();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        match parse_record(&bytes, cursor) {
            RecordAt::Valid { end } => {
                outcome.records.push(JournalRecord {
                    offset: cursor as u64,
                    payload: bytes[cursor + RECORD_HEADER_SIZE..end].to_vec(),
                });
                cursor = end;
            }
            RecordAt::ChecksumMismatch { end } => {
                // A damaged length can point into the middle of the next record.
                let next = match parse_record(&bytes, end) {
                    RecordAt::Valid { .. } => Some(end),
                    _ => next_valid_record(&bytes, cursor + 1),
                };
                outcome.corrupt.push(ChemlinkError::CacheCorruption {
                    offset: cursor as u64,
                    reason: "record checksum mismatch".into(),
                });
                cursor = next.unwrap_or(end);
            }
            RecordAt::Invalid => {
                let Some(next) = next_valid_record(&bytes, cursor + 1) else {
                    tracing::warn!(
                        journal.offset = cursor,
                        journal.file_len = file_len,
                        "journal record header invalid; treating remainder as torn tail"
                    );
                    return Ok((outcome, cursor as u64));
                };
                tracing::warn!(
                    journal.offset = cursor,
                    journal.resume = next,
                    "journal record header invalid; resuming at next valid record"
                );
                outcome.corrupt.push(ChemlinkError::CacheCorruption {
                    offset: cursor as u64,
                    reason: format!("invalid record header; skipped {} bytes", next - cursor).into(),
                });
                cursor = next;
            }
        }
    }

    Ok((outcome, cursor as u64))
}

enum RecordAt {
    Valid { end: usize },
    /// Header is well formed but the payload does not hash to its checksum.
    ChecksumMismatch { end: usize },
    /// Bad magic, oversized length, or a record running past the end of file.
    Invalid,
}

fn parse_record(bytes: &[u8], at: usize) -> RecordAt {
    let Some(header) = bytes.get(at..at + RECORD_HEADER_SIZE) else {
        return RecordAt::Invalid;
    };
    let mut word = [0u8; 4];
    word.copy_from_slice(&header[..4]);
    let magic = u32::from_le_bytes(word);
    word.copy_from_slice(&header[4..8]);
    let length = u32::from_le_bytes(word);
    if magic != CACHE_RECORD_MAGIC || length > MAX_CACHE_RECORD_BYTES {
        return RecordAt::Invalid;
    }
    let end = at + RECORD_HEADER_SIZE + length as usize;
    let Some(payload) = bytes.get(at + RECORD_HEADER_SIZE..end) else {
        return RecordAt::Invalid;
    };
    if blake3::hash(payload).as_bytes() == &header[8..40] {
        RecordAt::Valid { end }
    } else {
        RecordAt::ChecksumMismatch { end }
    }
}

/// Offset of the first record at or after `from` whose checksum verifies.
fn next_valid_record(bytes: &[u8], from: usize) -> Option<usize> {
    let magic = CACHE_RECORD_MAGIC.to_le_bytes();
    (from..bytes.len().saturating_sub(RECORD_HEADER_SIZE - 1))
        .filter(|&at| bytes[at..at + 4] == magic)
        .find(|&at| matches!(parse_record(bytes, at), RecordAt::Valid { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_replay() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("cache.log");
        {
            let (mut journal, outcome) = Journal::open(&path, false).expect("open");
            assert!(outcome.records.is_empty());
            journal.append(b"first").expect("append first");
            journal.append(b"second").expect("append second");
        }
        let (_journal, outcome) = Journal::open(&path, false).expect("reopen");
        let payloads: Vec<_> = outcome.records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"first"[..], &b"second"[..]]);
        assert_eq!(outcome.records[0].offset, 0);
        assert!(outcome.corrupt.is_empty());
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("cache.log");
        let good_len = {
            let (mut journal, _) = Journal::open(&path, false).expect("open");
            journal.append(b"kept").expect("append");
            journal.len_bytes()
        };
        let mut bytes = std::fs::read(&path).expect("read");
        bytes.extend_from_slice(&CACHE_RECORD_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        std::fs::write(&path, &bytes).expect("write torn");

        let (mut journal, outcome) = Journal::open(&path, false).expect("reopen");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.truncated_bytes, 20);
        assert_eq!(journal.len_bytes(), good_len);
        journal.append(b"after").expect("append after truncation");
        drop(journal);

        let (_journal, outcome) = Journal::open(&path, false).expect("reopen again");
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[1].payload, b"after");
    }

    #[test]
    fn checksum_mismatch_skips_only_that_record() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("cache.log");
        {
            let (mut journal, _) = Journal::open(&path, false).expect("open");
            journal.append(b"alpha").expect("a");
            journal.append(b"bravo").expect("b");
            journal.append(b"charlie").expect("c");
        }
        let mut bytes = std::fs::read(&path).expect("read");
        // First payload byte of the second record.
        let second = RECORD_HEADER_SIZE + b"alpha".len();
        bytes[second + RECORD_HEADER_SIZE] ^= 0xFF;
        std::fs::write(&path, &bytes).expect("write");

        let (_journal, outcome) = Journal::open(&path, false).expect("reopen");
        let payloads: Vec<_> = outcome.records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"alpha"[..], &b"charlie"[..]]);
        assert_eq!(outcome.corrupt.len(), 1);
        match &outcome.corrupt[0] {
            ChemlinkError::CacheCorruption { offset, .. } => assert_eq!(*offset, second as u64),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn damaged_header_skips_only_that_record() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("cache.log");
        let file_len = {
            let (mut journal, _) = Journal::open(&path, false).expect("open");
            journal.append(b"alpha").expect("a");
            journal.append(b"bravo").expect("b");
            journal.append(b"charlie").expect("c");
            journal.len_bytes()
        };
        let mut bytes = std::fs::read(&path).expect("read");
        bytes[0] ^= 0xFF;
        std::fs::write(&path, &bytes).expect("write");

        let (journal, outcome) = Journal::open(&path, false).expect("reopen");
        let payloads: Vec<_> = outcome.records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"bravo"[..], &b"charlie"[..]]);
        assert_eq!(outcome.corrupt.len(), 1);
        assert_eq!(outcome.truncated_bytes, 0);
        assert_eq!(journal.len_bytes(), file_len);
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), file_len);
    }

    #[test]
    fn damaged_length_resyncs_on_next_record() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("cache.log");
        {
            let (mut journal, _) = Journal::open(&path, false).expect("open");
            journal.append(b"alpha").expect("a");
            journal.append(b"bravo").expect("b");
            journal.append(b"charlie").expect("c");
        }
        let mut bytes = std::fs::read(&path).expect("read");
        // Length of the first record shrinks by one; its end now lands inside the second header.
        bytes[4] = 4;
        std::fs::write(&path, &bytes).expect("write");

        let (_journal, outcome) = Journal::open(&path, false).expect("reopen");
        let payloads: Vec<_> = outcome.records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"bravo"[..], &b"charlie"[..]]);
        assert_eq!(outcome.corrupt.len(), 1);
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("cache.log");
        let (mut journal, _) = Journal::open(&path, false).expect("open");
        journal.append(b"old-1").expect("append");
        journal.append(b"old-2").expect("append");
        journal.rewrite([&b"new"[..]]).expect("rewrite");
        journal.append(b"tail").expect("append after rewrite");
        drop(journal);

        let (_journal, outcome) = Journal::open(&path, false).expect("reopen");
        let payloads: Vec<_> = outcome.records.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![&b"new"[..], &b"tail"[..]]);
    }

    #[test]
    fn second_handle_is_refused() {
        let dir = tempdir().expect("tmp");
        let path = dir.path().join("cache.log");
        let (_first, _) = Journal::open(&path, false).expect("open");
        let err = Journal::open(&path, false).expect_err("lock held");
        assert!(matches!(err, ChemlinkError::Lock(_)), "got {err:?}");
    }
}
