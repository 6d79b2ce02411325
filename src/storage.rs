use crate::embedding::check_dim;
use crate::error::{Result, StorageError};
use crate::matcher::Gallery;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

/// Free-form record annotations; never interpreted by the store.
pub type Metadata = BTreeMap<String, String>;
pub type RecordId = Uuid;

/// One enrolled face. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: RecordId,
    pub label: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl FaceRecord {
    pub fn new(label: &str, embedding: &[f32], metadata: &Metadata) -> Result<Self> {
        check_dim(embedding.len())?;
        Ok(Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            embedding: embedding.to_vec(),
            metadata: metadata.clone(),
        })
    }
}

/// Append-only record set.
///
/// `append` is atomic per record; a `load_all` that starts after an
/// `append` returns sees that record.
pub trait EmbeddingStore: Send + Sync {
    fn append(&self, label: &str, embedding: &[f32], metadata: &Metadata) -> Result<RecordId>;

    /// Every record, in insertion order.
    fn records(&self) -> Result<Vec<FaceRecord>>;

    fn load_all(&self) -> Result<Gallery> {
        Gallery::from_records(&self.records()?)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records()?.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<FaceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingStore for MemoryStore {
    fn append(&self, label: &str, embedding: &[f32], metadata: &Metadata) -> Result<RecordId> {
        let record = FaceRecord::new(label, embedding, metadata)?;
        let id = record.id;
        self.records
            .write()
            .map_err(|_| StorageError::Poisoned)?
            .push(record);
        Ok(id)
    }

    fn records(&self) -> Result<Vec<FaceRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| StorageError::Poisoned)?
            .clone())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.read().map_err(|_| StorageError::Poisoned)?.len())
    }
}

/// Durable log file of COBS-framed postcard records.
///
/// Appends are serialised by the write lock and land as a single write
/// followed by a data sync. Readers share the read lock, so they never see
/// a frame that is still being written. Bytes after the last delimiter are
/// an interrupted append: readers skip them and the next append cuts them
/// off before writing.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::from)?;
        }
        log::debug!("face store at {}", path.display());
        Ok(Self {
            path,
            lock: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EmbeddingStore for FileStore {
    fn append(&self, label: &str, embedding: &[f32], metadata: &Metadata) -> Result<RecordId> {
        let record = FaceRecord::new(label, embedding, metadata)?;
        let frame = postcard::to_allocvec_cobs(&record).map_err(StorageError::from)?;

        let _guard = self.lock.write().map_err(|_| StorageError::Poisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(StorageError::from)?;

        let len = file.metadata().map_err(StorageError::from)?.len();
        let committed = committed_len(&mut file, len).map_err(StorageError::from)?;
        if committed < len {
            log::warn!(
                "dropping {} bytes of an incomplete record from {}",
                len - committed,
                self.path.display()
            );
            file.set_len(committed).map_err(StorageError::from)?;
        }

        let written = file
            .seek(SeekFrom::Start(committed))
            .and_then(|_| file.write_all(&frame))
            .and_then(|_| file.sync_data());
        if let Err(e) = written {
            // leave the log ending on a frame boundary
            if let Err(undo) = file.set_len(committed) {
                log::warn!("could not roll back {}: {}", self.path.display(), undo);
            }
            return Err(StorageError::from(e).into());
        }

        Ok(record.id)
    }

    fn records(&self) -> Result<Vec<FaceRecord>> {
        let read = {
            let _guard = self.lock.read().map_err(|_| StorageError::Poisoned)?;
            std::fs::read(&self.path)
        };
        let mut data = match read {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StorageError::from(e).into()),
        };

        // bytes after the last delimiter are a frame torn by a crash mid-append
        let complete = data.iter().rposition(|&b| b == 0).map_or(0, |i| i + 1);
        if complete < data.len() {
            log::warn!(
                "ignoring {} trailing bytes of an incomplete record in {}",
                data.len() - complete,
                self.path.display()
            );
        }

        let mut records = Vec::new();
        for frame in data[..complete].split_mut(|&b| b == 0) {
            if frame.is_empty() {
                continue;
            }
            let record: FaceRecord = postcard::from_bytes_cobs(frame).map_err(StorageError::from)?;
            check_dim(record.embedding.len())?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Length of the log up to and including its last frame delimiter.
fn committed_len(file: &mut File, len: u64) -> std::io::Result<u64> {
    const BLOCK: u64 = 4096;
    let mut end = len;
    let mut buf = vec![0u8; BLOCK as usize];
    while end > 0 {
        let start = end.saturating_sub(BLOCK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(i) = chunk.iter().rposition(|&b| b == 0) {
            return Ok(start + i as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}
