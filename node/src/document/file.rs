// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-Only File Document Store
//!
//! Every write is one line, appended and fsync'd before it is acknowledged.
//!
//! # File Format
//! ```text
//! <crc32 hex, 8 chars>\t<json LogLine>\n
//! <crc32 hex, 8 chars>\t<json LogLine>\n
//! ...
//! ```
//!
//! A batch of documents is a single line, so a crash can never leave half a
//! batch behind. An incomplete final line (crash mid-write) is dropped on open;
//! a bad line anywhere else means the file is corrupt and opening fails. A
//! final line that checks out but lost its newline is kept and terminated.
//!
//! Compaction writes indexes, live documents and the update sequence to
//! `<path>.tmp` and renames it over the log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::config::DEFAULT_CHANGE_BUFFER;
use crate::document::{Change, DocTable, Document, DocumentStore, IndexDefinition, StoreInfo};
use crate::errors::{StoreError, StoreResult};

#[derive(Debug, Serialize, Deserialize)]
enum LogLine {
    /// Update sequence in effect when the file was last compacted.
    Watermark(u64),
    Index(IndexDefinition),
    Docs(Vec<Document>),
}

struct FileInner {
    table: DocTable,
    file: File,
}

pub struct FileDocumentStore {
    path: PathBuf,
    inner: Mutex<FileInner>,
    changes: broadcast::Sender<Change>,
}

impl FileDocumentStore {
    /// Open or create a document log at `path`, replaying whatever it holds.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_capacity(path, DEFAULT_CHANGE_BUFFER)
    }

    /// Like `open`, with the change feed buffering up to `capacity` changes
    /// per receiver.
    pub fn open_with_capacity(path: impl AsRef<Path>, capacity: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let table = if path.exists() {
            load(&path)?
        } else {
            DocTable::default()
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (changes, _) = broadcast::channel(capacity.max(1));

        tracing::info!(
            "Document log opened at {:?} (update_seq={})",
            path,
            table.update_seq()
        );

        Ok(Self {
            path,
            inner: Mutex::new(FileInner { table, file }),
            changes,
        })
    }
}

fn encode_line(line: &LogLine) -> StoreResult<Vec<u8>> {
    let json = serde_json::to_vec(line)?;
    let mut hasher = Hasher::new();
    hasher.update(&json);
    let mut framed = format!("{:08x}\t", hasher.finalize()).into_bytes();
    framed.extend_from_slice(&json);
    framed.push(b'\n');
    Ok(framed)
}

fn decode_line(raw: &[u8]) -> Option<LogLine> {
    // A tail torn inside a multi-byte character is just another bad line.
    let text = std::str::from_utf8(raw).ok()?;
    let (crc, json) = text.split_once('\t')?;
    let stored = u32::from_str_radix(crc, 16).ok()?;
    let mut hasher = Hasher::new();
    hasher.update(json.as_bytes());
    if hasher.finalize() != stored {
        return None;
    }
    serde_json::from_str(json).ok()
}

fn append(file: &mut File, line: &LogLine) -> StoreResult<()> {
    let framed = encode_line(line)?;
    file.write_all(&framed)?;
    file.flush()?;
    // fsync before acknowledging
    file.sync_data()?;
    Ok(())
}

fn load(path: &Path) -> StoreResult<DocTable> {
    let bytes = std::fs::read(path)?;
    let mut table = DocTable::default();
    let mut offset = 0usize;
    let mut line_no = 0usize;

    while offset < bytes.len() {
        line_no += 1;
        let rest = &bytes[offset..];
        let (raw, terminated) = match rest.iter().position(|&b| b == b'\n') {
            Some(end) => (&rest[..end], true),
            None => (rest, false),
        };
        let next = offset + raw.len() + usize::from(terminated);

        let Some(line) = decode_line(raw) else {
            if next < bytes.len() {
                return Err(StoreError::Corrupted { line: line_no });
            }
            tracing::warn!("Ignoring incomplete record at end of document log (line {})", line_no);
            truncate(path, offset as u64)?;
            break;
        };

        match line {
            LogLine::Watermark(seq) => table.raise_watermark(seq),
            LogLine::Index(index) => {
                // Compaction rewrites indexes; a duplicate is harmless.
                let _ = table.add_index(index);
            }
            LogLine::Docs(docs) => table.restore(docs),
        }

        if !terminated {
            // The next append must start on a line of its own.
            tracing::warn!("Terminating final record of document log (line {})", line_no);
            terminate(path)?;
        }
        offset = next;
    }

    Ok(table)
}

fn terminate(path: &Path) -> StoreResult<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(b"\n")?;
    file.sync_data()?;
    Ok(())
}

fn truncate(path: &Path, len: u64) -> StoreResult<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn info(&self) -> StoreResult<StoreInfo> {
        Ok(self.inner.lock().await.table.info())
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        self.inner.lock().await.table.get(id)
    }

    async fn put(&self, doc: Document) -> StoreResult<u64> {
        let revs = self.bulk_docs(vec![doc]).await?;
        Ok(revs[0])
    }

    async fn bulk_docs(&self, docs: Vec<Document>) -> StoreResult<Vec<u64>> {
        let mut inner = self.inner.lock().await;
        let stamped = inner.table.prepare(docs)?;

        // Durable first, then visible.
        append(&mut inner.file, &LogLine::Docs(stamped.clone()))?;

        let revs = stamped.iter().map(|d| d.rev).collect();
        for change in inner.table.apply(stamped) {
            let _ = self.changes.send(change);
        }
        Ok(revs)
    }

    async fn put_index(&self, index: IndexDefinition) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.table.has_index(&index.name) {
            return Err(StoreError::Conflict { id: index.name });
        }
        append(&mut inner.file, &LogLine::Index(index.clone()))?;
        inner.table.add_index(index)
    }

    async fn query(&self, index: &str) -> StoreResult<Vec<Document>> {
        self.inner.lock().await.table.query(index)
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    async fn compact(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let dropped = inner.table.compact();

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for index in inner.table.indexes() {
                tmp.write_all(&encode_line(&LogLine::Index(index.clone()))?)?;
            }
            let live: Vec<Document> = inner.table.live_docs().cloned().collect();
            if !live.is_empty() {
                tmp.write_all(&encode_line(&LogLine::Docs(live))?)?;
            }
            // Written last so it wins over the count of restored docs.
            tmp.write_all(&encode_line(&LogLine::Watermark(inner.table.update_seq()))?)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        inner.file = OpenOptions::new().append(true).open(&self.path)?;
        tracing::info!("Compacted document log {:?}, dropped {} tombstone(s)", self.path, dropped);
        Ok(())
    }
}
