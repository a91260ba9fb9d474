use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::lock::FileLock;

const FILE_MAGIC: [u8; 8] = *b"OBJRNL\0\x01";
const FILE_HEADER_SIZE: u64 = 16;

// Each journal record header: [seq: u64][len: u32][reserved: 4 bytes][checksum: 32 bytes]
const ENTRY_HEADER_SIZE: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalStats {
    pub len_bytes: u64,
    pub records: u64,
    pub sequence: u64,
    /// Bytes of a torn trailing record discarded on open.
    pub truncated_tail_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub sequence: u64,
    /// Byte offset of the record header in the file.
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Append-only, checksummed commit log backing the journaled document store.
///
/// One record holds one whole batch, so a batch is either fully present after a crash
/// or discarded with the torn tail.
#[derive(Debug)]
pub struct Journal {
    file: File,
    _lock: FileLock,
    write_head: u64,
    sequence: u64,
    records: u64,
    truncated_tail_bytes: u64,
}

impl Journal {
    /// Open or create the journal at `path` and return every intact record in order.
    pub fn open(path: &Path) -> StoreResult<(Self, Vec<JournalRecord>)> {
        let (mut file, lock) = FileLock::open_and_lock(path)?;
        let file_len = file.metadata()?.len();

        if file_len == 0 {
            let mut header = [0u8; FILE_HEADER_SIZE as usize];
            header[..8].copy_from_slice(&FILE_MAGIC);
            file.write_all(&header)?;
            file.sync_all()?;
            tracing::debug!(journal.path = %path.display(), "journal created");
        } else {
            Self::check_file_header(&mut file, file_len)?;
        }

        let file_len = file.metadata()?.len();
        let (entries, valid_end) = Self::scan_records(&mut file, file_len)?;
        let truncated_tail_bytes = file_len - valid_end;
        if truncated_tail_bytes > 0 {
            tracing::warn!(
                journal.path = %path.display(),
                journal.valid_end = valid_end,
                journal.discarded = truncated_tail_bytes,
                "discarding torn journal tail"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }

        let sequence = entries.last().map_or(0, |entry| entry.sequence);
        let journal = Self {
            file,
            _lock: lock,
            write_head: valid_end,
            sequence,
            records: entries.len() as u64,
            truncated_tail_bytes,
        };
        Ok((journal, entries))
    }

    fn check_file_header(file: &mut File, file_len: u64) -> StoreResult<()> {
        if file_len < FILE_HEADER_SIZE {
            return Err(StoreError::JournalCorruption {
                offset: 0,
                reason: "file shorter than journal header".into(),
            });
        }
        let mut header = [0u8; FILE_HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        if header[..8] != FILE_MAGIC {
            return Err(StoreError::JournalCorruption {
                offset: 0,
                reason: "bad journal magic".into(),
            });
        }
        Ok(())
    }

    /// Append one record and make it durable. Returns its sequence number.
    ///
    /// On a failed write the file is cut back to the previous record boundary.
    pub fn append(&mut self, payload: &[u8]) -> StoreResult<u64> {
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            StoreError::Rejected("journal payload larger than 4 GiB".into())
        })?;
        let next_sequence = self.sequence + 1;
        tracing::debug!(
            journal.write_head = self.write_head,
            journal.sequence = next_sequence,
            journal.payload_len = payload_len,
            "journal append"
        );

        if let Err(err) = self.write_record(next_sequence, payload_len, payload) {
            tracing::error!(
                error = %err,
                journal.write_head = self.write_head,
                "journal append failed"
            );
            if let Err(trim_err) = self.file.set_len(self.write_head) {
                tracing::error!(error = %trim_err, "journal rollback failed");
            }
            return Err(err);
        }

        self.write_head += ENTRY_HEADER_SIZE as u64 + u64::from(payload_len);
        self.sequence = next_sequence;
        self.records += 1;
        Ok(self.sequence)
    }

    #[must_use]
    pub fn stats(&self) -> JournalStats {
        JournalStats {
            len_bytes: self.write_head,
            records: self.records,
            sequence: self.sequence,
            truncated_tail_bytes: self.truncated_tail_bytes,
        }
    }

    fn write_record(&mut self, sequence: u64, payload_len: u32, payload: &[u8]) -> StoreResult<()> {
        let digest = blake3::hash(payload);
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        header[..8].copy_from_slice(&sequence.to_le_bytes());
        header[8..12].copy_from_slice(&payload_len.to_le_bytes());
        header[16..48].copy_from_slice(digest.as_bytes());

        // Single write of header + payload so a crash leaves at most one torn record.
        let mut combined = Vec::with_capacity(ENTRY_HEADER_SIZE + payload.len());
        combined.extend_from_slice(&header);
        combined.extend_from_slice(payload);

        self.file.seek(SeekFrom::Start(self.write_head))?;
        self.file.write_all(&combined)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn scan_records(file: &mut File, file_len: u64) -> StoreResult<(Vec<JournalRecord>, u64)> {
        let mut records = Vec::new();
        let mut cursor = FILE_HEADER_SIZE;
        let mut expected_sequence = 1u64;

        while cursor + ENTRY_HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(cursor))?;
            let mut header = [0u8; ENTRY_HEADER_SIZE];
            file.read_exact(&mut header)?;

            let sequence = u64::from_le_bytes(header[..8].try_into().map_err(|_| {
                StoreError::JournalCorruption {
                    offset: cursor,
                    reason: "invalid journal sequence header".into(),
                }
            })?);
            let length = u64::from(u32::from_le_bytes(header[8..12].try_into().map_err(
                |_| StoreError::JournalCorruption {
                    offset: cursor,
                    reason: "invalid journal length header".into(),
                },
            )?));
            let checksum = &header[16..48];

            if sequence == 0 && length == 0 {
                break;
            }
            let record_end = cursor + ENTRY_HEADER_SIZE as u64 + length;
            if record_end > file_len {
                // Torn final write.
                break;
            }
            if length == 0 || sequence != expected_sequence {
                tracing::error!(
                    journal.scan_offset = cursor,
                    journal.sequence = sequence,
                    journal.expected_sequence = expected_sequence,
                    journal.length = length,
                    "journal record header invalid"
                );
                return Err(StoreError::JournalCorruption {
                    offset: cursor,
                    reason: "journal record header invalid".into(),
                });
            }

            let length_usize =
                usize::try_from(length).map_err(|_| StoreError::JournalCorruption {
                    offset: cursor,
                    reason: "journal record length too large for platform".into(),
                })?;
            let mut payload = vec![0u8; length_usize];
            file.read_exact(&mut payload)?;
            if blake3::hash(&payload).as_bytes() != checksum {
                if record_end == file_len {
                    break;
                }
                return Err(StoreError::JournalCorruption {
                    offset: cursor,
                    reason: "journal record checksum mismatch".into(),
                });
            }

            records.push(JournalRecord {
                sequence,
                offset: cursor,
                payload,
            });
            expected_sequence += 1;
            cursor = record_end;
        }

        Ok((records, cursor))
    }
}
