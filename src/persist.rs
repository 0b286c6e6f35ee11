//! Flat-file snapshots.
//!
//! Layout: an 8-byte big-endian leaf count, then every row's hashes bottom
//! up — `num_leaves >> row` hashes of 32 bytes each per row, until a row
//! would be empty. The file is truncated to exactly that length on every
//! commit, so a snapshot is self-describing: the leaf count determines how
//! many bytes follow.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::node::Hash;
use crate::store::ForestStore;

/// Maximum leaf count a snapshot may declare.
const MAX_LEAVES: u64 = 1 << 63;

/// An open snapshot file, held for the lifetime of its forest.
pub(crate) struct SnapshotFile {
    file: File,
}

impl SnapshotFile {
    /// Open (or create) the snapshot at `path`.
    ///
    /// The second return value is true when the file was empty and holds no
    /// forest yet.
    pub fn open(path: &Path) -> Result<(Self, bool)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let fresh = file.metadata()?.len() == 0;
        Ok((SnapshotFile { file }, fresh))
    }

    /// Write a full snapshot of `store`, truncating previous content.
    pub fn commit(&mut self, num_leaves: u64, store: &ForestStore) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut total = 8u64;
        {
            let mut writer = BufWriter::new(&mut self.file);
            writer.write_all(&num_leaves.to_be_bytes())?;

            let mut count = num_leaves;
            let mut row = 0;
            while count > 0 {
                let row_data = store.rows().get(row).ok_or_else(|| {
                    Error::InvariantViolation(format!("row {row} missing during commit"))
                })?;
                if (row_data.len() as u64) < count {
                    return Err(Error::InvariantViolation(format!(
                        "row {row} holds {} of {count} hashes",
                        row_data.len()
                    )));
                }
                for hash in &row_data[..count as usize] {
                    writer.write_all(&hash.0)?;
                }
                total += 32 * count;
                row += 1;
                count >>= 1;
            }
            writer.flush()?;
        }
        self.file.set_len(total)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Read a snapshot back as `(num_leaves, rows)`.
    pub fn restore(&mut self) -> Result<(u64, Vec<Vec<Hash>>)> {
        self.file.seek(SeekFrom::Start(0))?;

        let mut count_bytes = [0u8; 8];
        read_exact(&mut self.file, &mut count_bytes)?;
        let num_leaves = u64::from_be_bytes(count_bytes);
        if num_leaves > MAX_LEAVES {
            return Err(Error::CorruptFile(format!(
                "impossible leaf count {num_leaves}"
            )));
        }
        if (self.file.metadata()?.len() as u128) < snapshot_len(num_leaves) {
            return Err(Error::CorruptFile(format!(
                "snapshot too short for {num_leaves} leaves"
            )));
        }

        let mut rows = Vec::new();
        let mut count = num_leaves;
        while count > 0 {
            let mut row_data = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let mut hash = [0u8; 32];
                read_exact(&mut self.file, &mut hash)?;
                row_data.push(Hash(hash));
            }
            rows.push(row_data);
            count >>= 1;
        }
        Ok((num_leaves, rows))
    }
}

// Exact byte length of a snapshot holding `num_leaves` leaves.
fn snapshot_len(num_leaves: u64) -> u128 {
    let mut hashes = 0u128;
    let mut count = num_leaves;
    while count > 0 {
        hashes += count as u128;
        count >>= 1;
    }
    8 + 32 * hashes
}

// Read fully, turning a short read into a parse error rather than an I/O
// error: a snapshot that ends early is corrupt, not unreadable.
fn read_exact(file: &mut File, buf: &mut [u8]) -> Result<()> {
    file.read_exact(buf).map_err(|err| {
        if err.kind() == ErrorKind::UnexpectedEof {
            Error::CorruptFile("premature end of snapshot".into())
        } else {
            Error::Io(err)
        }
    })
}
