//! Single-file layout of the reference index.
//!
//! ```text
//! [header: 96 bytes][records region][keys region][slot table]
//! ```
//!
//! Header fields are little-endian: magic, version, record count, key count,
//! records offset/len, keys offset/len, slot table offset, and a blake3 checksum
//! of every byte after the header. Each 24-byte slot is
//! `[key_off u64][key_len u32][record_off u64][record_len u32]`, offsets relative
//! to their region. Slots are sorted by key bytes so lookups are a binary search
//! over the memory map.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use atomic_write_file::AtomicWriteFile;
use memmap2::Mmap;

use crate::constants::{
    INDEX_HEADER_SIZE, INDEX_MAGIC, INDEX_SLOT_SIZE, INDEX_VERSION, MAX_INDEX_RECORD_BYTES,
};
use crate::error::{ChemlinkError, Result};
use crate::record_config;
use crate::types::ChemicalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub record_count: u64,
    pub key_count: u64,
    pub records_offset: u64,
    pub records_len: u64,
    pub keys_offset: u64,
    pub keys_len: u64,
    pub slots_offset: u64,
    pub checksum: [u8; 32],
}

impl IndexHeader {
    fn encode(&self) -> [u8; INDEX_HEADER_SIZE] {
        let mut buf = [0u8; INDEX_HEADER_SIZE];
        buf[..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.record_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.key_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.records_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.records_len.to_le_bytes());
        buf[40..48].copy_from_slice(&self.keys_offset.to_le_bytes());
        buf[48..56].copy_from_slice(&self.keys_len.to_le_bytes());
        buf[56..64].copy_from_slice(&self.slots_offset.to_le_bytes());
        buf[64..96].copy_from_slice(&self.checksum);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INDEX_HEADER_SIZE {
            return Err(ChemlinkError::invalid_index("file shorter than header"));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        if magic != INDEX_MAGIC {
            return Err(ChemlinkError::invalid_index("bad magic"));
        }
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&bytes[64..96]);
        Ok(Self {
            magic,
            version: read_u32(bytes, 4),
            record_count: read_u64(bytes, 8),
            key_count: read_u64(bytes, 16),
            records_offset: read_u64(bytes, 24),
            records_len: read_u64(bytes, 32),
            keys_offset: read_u64(bytes, 40),
            keys_len: read_u64(bytes, 48),
            slots_offset: read_u64(bytes, 56),
            checksum,
        })
    }

    fn validate(&self, file_len: u64) -> Result<()> {
        if self.version != INDEX_VERSION {
            return Err(ChemlinkError::invalid_index(format!(
                "unsupported version {} (expected {INDEX_VERSION})",
                self.version
            )));
        }
        let header_end = INDEX_HEADER_SIZE as u64;
        let slots_len = self
            .key_count
            .checked_mul(INDEX_SLOT_SIZE as u64)
            .ok_or_else(|| ChemlinkError::invalid_index("slot table size overflows"))?;
        let regions = [
            ("records", self.records_offset, self.records_len),
            ("keys", self.keys_offset, self.keys_len),
            ("slots", self.slots_offset, slots_len),
        ];
        for (name, offset, len) in regions {
            let end = offset
                .checked_add(len)
                .ok_or_else(|| ChemlinkError::invalid_index(format!("{name} region overflows")))?;
            if offset < header_end || end > file_len {
                return Err(ChemlinkError::invalid_index(format!(
                    "{name} region {offset}..{end} outside file of {file_len} bytes"
                )));
            }
        }
        Ok(())
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    key_offset: u64,
    key_len: u32,
    record_offset: u64,
    record_len: u32,
}

impl Slot {
    fn encode(&self) -> [u8; INDEX_SLOT_SIZE] {
        let mut buf = [0u8; INDEX_SLOT_SIZE];
        buf[..8].copy_from_slice(&self.key_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.key_len.to_le_bytes());
        buf[12..20].copy_from_slice(&self.record_offset.to_le_bytes());
        buf[20..24].copy_from_slice(&self.record_len.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            key_offset: read_u64(bytes, 0),
            key_len: read_u32(bytes, 8),
            record_offset: read_u64(bytes, 12),
            record_len: read_u32(bytes, 20),
        }
    }
}

/// Write an index file atomically: readers see either the previous file or the
/// complete new one.
///
/// `keys` must be sorted by key bytes (a `BTreeMap<String, _>` iteration order)
/// and map each key to a position in `records`.
pub(crate) fn write_index<'a, I>(path: &Path, records: &[ChemicalRecord], keys: I) -> Result<IndexHeader>
where
    I: IntoIterator<Item = (&'a str, usize)>,
{
    let mut atomic = AtomicWriteFile::options().open(path)?;
    let mut hasher = blake3::Hasher::new();

    let header = {
        let file = atomic.as_file_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        let mut writer = HashingWriter {
            inner: BufWriter::new(&mut *file),
            hasher: &mut hasher,
        };
        writer.inner.write_all(&[0u8; INDEX_HEADER_SIZE])?;

        let records_offset = INDEX_HEADER_SIZE as u64;
        let mut record_spans = Vec::with_capacity(records.len());
        let mut records_len = 0u64;
        for record in records {
            let encoded = bincode::serde::encode_to_vec(record, record_config())?;
            let len = u32::try_from(encoded.len())
                .ok()
                .filter(|len| *len <= MAX_INDEX_RECORD_BYTES)
                .ok_or_else(|| {
                    ChemlinkError::invalid_index(format!(
                        "record {} exceeds the per-record size limit",
                        record.identifier
                    ))
                })?;
            writer.write_all(&encoded)?;
            record_spans.push((records_len, len));
            records_len += u64::from(len);
        }

        let keys_offset = records_offset + records_len;
        let mut slots = Vec::new();
        let mut keys_len = 0u64;
        for (key, record_idx) in keys {
            let (record_offset, record_len) = *record_spans.get(record_idx).ok_or_else(|| {
                ChemlinkError::invalid_index(format!("key {key:?} points at missing record"))
            })?;
            let key_len = u32::try_from(key.len())
                .map_err(|_| ChemlinkError::invalid_index("key longer than u32::MAX"))?;
            writer.write_all(key.as_bytes())?;
            slots.push(Slot {
                key_offset: keys_len,
                key_len,
                record_offset,
                record_len,
            });
            keys_len += u64::from(key_len);
        }

        let slots_offset = keys_offset + keys_len;
        for slot in &slots {
            writer.write_all(&slot.encode())?;
        }
        writer.inner.flush()?;

        IndexHeader {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            record_count: records.len() as u64,
            key_count: slots.len() as u64,
            records_offset,
            records_len,
            keys_offset,
            keys_len,
            slots_offset,
            checksum: [0u8; 32],
        }
    };

    let header = IndexHeader {
        checksum: *hasher.finalize().as_bytes(),
        ..header
    };
    let file = atomic.as_file_mut();
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.encode())?;
    file.sync_all()?;
    atomic.commit()?;
    Ok(header)
}

/// Forwards writes and feeds the same bytes into a hasher.
struct HashingWriter<'h, W: Write> {
    inner: W,
    hasher: &'h mut blake3::Hasher,
}

impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Read-only memory-mapped view over an index file.
#[derive(Debug)]
pub(crate) struct IndexFile {
    mmap: Mmap,
    header: IndexHeader,
}

impl IndexFile {
    pub(crate) fn open(file: &File, verify_checksum: bool) -> Result<Self> {
        // Safety: the index is written once through an atomic rename and never
        // modified in place afterwards, so the mapped bytes are stable.
        let mmap = unsafe { Mmap::map(file)? };
        let header = IndexHeader::decode(&mmap)?;
        header.validate(mmap.len() as u64)?;
        if verify_checksum {
            let actual = blake3::hash(&mmap[INDEX_HEADER_SIZE..]);
            if actual.as_bytes() != &header.checksum {
                return Err(ChemlinkError::invalid_index("checksum mismatch"));
            }
        }
        tracing::debug!(
            index.records = header.record_count,
            index.keys = header.key_count,
            index.bytes = mmap.len(),
            "reference index mapped"
        );
        Ok(Self { mmap, header })
    }

    pub(crate) fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub(crate) fn key_count(&self) -> usize {
        // validate() proved key_count * SLOT_SIZE fits inside the mapped file
        #[allow(clippy::cast_possible_truncation)]
        let count = self.header.key_count as usize;
        count
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, idx: usize) -> Slot {
        let start = self.header.slots_offset as usize + idx * INDEX_SLOT_SIZE;
        Slot::decode(&self.mmap[start..start + INDEX_SLOT_SIZE])
    }

    fn region(&self, offset: u64, len: u64, rel: u64, rel_len: u64) -> Option<&[u8]> {
        let end = rel.checked_add(rel_len)?;
        if end > len {
            return None;
        }
        let start = usize::try_from(offset + rel).ok()?;
        let stop = usize::try_from(offset + end).ok()?;
        self.mmap.get(start..stop)
    }

    pub(crate) fn key_at(&self, idx: usize) -> Option<&[u8]> {
        let slot = self.slot(idx);
        self.region(
            self.header.keys_offset,
            self.header.keys_len,
            slot.key_offset,
            u64::from(slot.key_len),
        )
    }

    pub(crate) fn record_at(&self, idx: usize) -> Option<ChemicalRecord> {
        let slot = self.slot(idx);
        let bytes = self.region(
            self.header.records_offset,
            self.header.records_len,
            slot.record_offset,
            u64::from(slot.record_len),
        )?;
        match bincode::serde::decode_from_slice::<ChemicalRecord, _>(bytes, record_config()) {
            Ok((record, _)) => Some(record),
            Err(err) => {
                tracing::warn!(slot = idx, error = %err, "index record failed to decode");
                None
            }
        }
    }

    /// Binary search for an exact key; returns its slot position.
    pub(crate) fn find(&self, key: &[u8]) -> Option<usize> {
        let (mut lo, mut hi) = (0usize, self.key_count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key_at(mid)?.cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }
}
