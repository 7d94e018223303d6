//! Append-only commit journal.
//!
//! One JSON object per line, one line per committed write. Entries are
//! hash-chained so truncation in the middle or an edited line is detected
//! on open:
//!
//! ```text
//! entry_hash = SHA-256( JOURNAL_HASH_DOMAIN || block_number (u64 LE)
//!                       || prev_hash || tx_hash || committed_at (i64 LE secs) )
//! ```
//!
//! A line is flushed and `sync_data`-ed before the write it records is
//! acknowledged. A final line without its newline was never acknowledged:
//! `open` truncates it, and a failed append cuts the file back to its
//! previous length.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use custody_types::{CustodyError, Result, SignedCall, TxHash, constants};
use serde::{Deserialize, Deserializer, Serializer};
use sha2::{Digest, Sha256};

fn serialize_hash<S: Serializer>(bytes: &[u8; 32], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(bytes))
}

fn deserialize_hash<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<[u8; 32], D::Error> {
    let text = String::deserialize(d)?;
    let mut out = [0u8; 32];
    hex::decode_to_slice(&text, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

/// One committed write.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JournalEntry {
    pub block_number: u64,
    pub call: SignedCall,
    pub committed_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_hash", deserialize_with = "deserialize_hash")]
    pub prev_hash: [u8; 32],
    #[serde(serialize_with = "serialize_hash", deserialize_with = "deserialize_hash")]
    pub entry_hash: [u8; 32],
}

impl JournalEntry {
    fn compute_hash(
        block_number: u64,
        prev_hash: &[u8; 32],
        tx_hash: TxHash,
        committed_at: DateTime<Utc>,
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(constants::JOURNAL_HASH_DOMAIN);
        hasher.update(block_number.to_le_bytes());
        hasher.update(prev_hash);
        hasher.update(tx_hash.0);
        hasher.update(committed_at.timestamp().to_le_bytes());
        hasher.finalize().into()
    }

    /// Recompute this entry's hash from its contents.
    pub fn expected_hash(&self) -> Result<[u8; 32]> {
        Ok(Self::compute_hash(
            self.block_number,
            &self.prev_hash,
            self.call.tx_hash()?,
            self.committed_at,
        ))
    }
}

/// Writer half of the journal, positioned at the end of a verified chain.
pub struct Journal {
    path: PathBuf,
    file: File,
    /// Length of the verified prefix; everything past it is discarded.
    len: u64,
    last_hash: [u8; 32],
    last_block: u64,
}

impl Journal {
    /// Open (or create) the journal at `path` and return every entry in it.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read or opened for append
    /// - `JournalCorrupt` if a line fails to parse, skips a block number,
    ///   or breaks the hash chain
    pub fn open(path: &Path) -> Result<(Self, Vec<JournalEntry>)> {
        let mut entries = Vec::new();
        let mut last_hash = constants::JOURNAL_GENESIS_HASH;
        let mut last_block = 0u64;
        let mut len = 0u64;

        if path.exists() {
            let bytes = std::fs::read(path)?;
            for (idx, raw) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
                let line_no = idx + 1;
                let Some(text) = raw.strip_suffix(b"\n") else {
                    // Only the final line can lack a terminator. Its append was
                    // never synced, so it was never acknowledged.
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no,
                        bytes = raw.len(),
                        "Truncating torn journal tail"
                    );
                    let file = OpenOptions::new().write(true).open(path)?;
                    file.set_len(len)?;
                    file.sync_all()?;
                    break;
                };
                len += raw.len() as u64;
                if text.trim_ascii().is_empty() {
                    continue;
                }
                let entry: JournalEntry =
                    serde_json::from_slice(text).map_err(|e| CustodyError::JournalCorrupt {
                        line: line_no,
                        reason: e.to_string(),
                    })?;
                if entry.block_number != last_block + 1 {
                    return Err(CustodyError::JournalCorrupt {
                        line: line_no,
                        reason: format!(
                            "block {} follows block {last_block}",
                            entry.block_number
                        ),
                    });
                }
                if entry.prev_hash != last_hash {
                    return Err(CustodyError::JournalCorrupt {
                        line: line_no,
                        reason: "prev_hash does not match preceding entry".to_string(),
                    });
                }
                if entry.expected_hash()? != entry.entry_hash {
                    return Err(CustodyError::JournalCorrupt {
                        line: line_no,
                        reason: "entry_hash mismatch".to_string(),
                    });
                }
                last_hash = entry.entry_hash;
                last_block = entry.block_number;
                entries.push(entry);
            }
        } else if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            last_block,
            "Journal opened"
        );

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len,
                last_hash,
                last_block,
            },
            entries,
        ))
    }

    /// Durably append a committed call as `block_number`.
    ///
    /// # Errors
    /// - `Internal` if `block_number` doesn't directly follow the last entry
    /// - `Io` if the write or sync fails; the file is cut back to its length
    ///   before the append and the journal is unchanged in memory
    pub fn append(
        &mut self,
        block_number: u64,
        call: &SignedCall,
        committed_at: DateTime<Utc>,
    ) -> Result<JournalEntry> {
        if block_number != self.last_block + 1 {
            return Err(CustodyError::Internal(format!(
                "journal append out of sequence: block {block_number} after {}",
                self.last_block
            )));
        }
        let entry_hash =
            JournalEntry::compute_hash(block_number, &self.last_hash, call.tx_hash()?, committed_at);
        let entry = JournalEntry {
            block_number,
            call: call.clone(),
            committed_at,
            prev_hash: self.last_hash,
            entry_hash,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        if let Err(e) = self.write_synced(line.as_bytes()) {
            self.discard_partial_append();
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.last_hash = entry_hash;
        self.last_block = block_number;
        Ok(entry)
    }

    fn write_synced(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.file.sync_data()
    }

    /// Cut the file back to the last acknowledged entry.
    fn discard_partial_append(&mut self) {
        let truncated = self
            .file
            .set_len(self.len)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = truncated {
            tracing::error!(
                path = %self.path.display(),
                len = self.len,
                error = %e,
                "Failed to discard partial journal append"
            );
        }
    }

    #[must_use]
    pub fn last_block(&self) -> u64 {
        self.last_block
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
