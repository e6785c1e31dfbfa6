//! The durable record: an append-only JSON-lines file of results.
//!
//! Each line is one `{"<key>": <viewport or null>}` object. The collector
//! is the only writer. Every append is flushed and synced before the
//! corresponding `done` message is acknowledged, so a crash can only ever
//! leave a torn final line, never damage an earlier one.

use crate::error::{Error, Result};
use crate::model::JobResult;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::warn;

const TAIL_CHUNK: u64 = 8 * 1024;

/// Append handle on the record file.
pub struct RecordWriter {
    path: PathBuf,
    file: File,
}

impl RecordWriter {
    /// Open (or create) the record for appending.
    ///
    /// A newline-less tail left by a crash mid-append is cut off first. The
    /// result it belonged to was never acknowledged and will come back
    /// from the broker.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(removed) = truncate_torn_tail(&path).await? {
            warn!(path = %path.display(), bytes = removed, "dropped torn tail of record");
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one result as a line and sync it to disk.
    pub async fn append(&mut self, result: &JobResult) -> Result<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}

/// Cut the file back to its last newline. Returns the number of bytes
/// removed, or None if nothing needed removing.
async fn truncate_torn_tail(path: &Path) -> Result<Option<u64>> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata().await?.len();
    let mut end = len;
    let mut buf = vec![0u8; TAIL_CHUNK as usize];

    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(std::io::SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;

        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            let keep = start + pos as u64 + 1;
            if keep == len {
                return Ok(None);
            }
            file.set_len(keep).await?;
            file.sync_data().await?;
            return Ok(Some(len - keep));
        }
        end = start;
    }

    if len == 0 {
        return Ok(None);
    }
    file.set_len(0).await?;
    file.sync_data().await?;
    Ok(Some(len))
}

/// Read every entry of a record file, in order.
///
/// Blank lines are skipped. Anything else that is not a single-key JSON
/// object fails with [`Error::MalformedRecord`].
pub async fn read_record(path: impl AsRef<Path>) -> Result<Vec<JobResult>> {
    let file = File::open(path.as_ref()).await?;
    let mut lines = BufReader::new(file).lines();
    let mut entries = Vec::new();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| Error::MalformedRecord {
                line: line_no,
                reason: e.to_string(),
            })?;
        let entry = JobResult::from_entry(value).map_err(|reason| Error::MalformedRecord {
            line: line_no,
            reason,
        })?;
        entries.push(entry);
    }

    Ok(entries)
}
