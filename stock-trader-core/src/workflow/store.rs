//! Transaction store keyed by transaction id, optionally mirrored to JSON

use crate::error::TaskError;
use crate::models::transaction::TransactionRecord;
use crate::workflow::tasks::TransactionRecorder;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// On-disk layout of the transaction file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TransactionFile {
    transactions: Vec<TransactionRecord>,
}

impl TransactionFile {
    fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(contents).context("Failed to parse transaction store JSON")
    }
}

/// What a put did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PutOutcome {
    Inserted,
    AlreadyRecorded,
    Conflict,
}

/// Durable, Id-keyed transaction store.
///
/// Records are immutable: re-putting an identical record is a no-op, while a
/// different record under an existing Id is rejected. For file-backed stores
/// the file is the source of truth; every put re-reads it under an exclusive
/// lock, so several processes can share one path. Cloning shares the store.
#[derive(Clone)]
pub struct TransactionStore {
    /// Path to JSON file, None for in-memory stores
    store_path: Option<PathBuf>,
    /// Records known to be durable
    records: Arc<DashMap<String, TransactionRecord>>,
    /// Serializes writers within this process
    write_lock: Arc<Mutex<()>>,
}

impl TransactionStore {
    /// Store that lives only for the process
    pub fn in_memory() -> Self {
        Self {
            store_path: None,
            records: Arc::new(DashMap::new()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open (or create) a file-backed store
    pub fn open<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store_path = store_path.as_ref().to_path_buf();

        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create transaction store directory")?;
        }

        let records = DashMap::new();
        if store_path.exists() {
            for record in Self::load_file(&store_path)?.transactions {
                records.insert(record.id.clone(), record);
            }
        }

        Ok(Self {
            store_path: Some(store_path),
            records: Arc::new(records),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn load_file(path: &Path) -> Result<TransactionFile> {
        let file = File::open(path).context("Failed to open transaction store file")?;
        file.lock_shared()
            .context("Failed to acquire read lock on transaction store")?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(file);
        reader
            .read_to_string(&mut contents)
            .context("Failed to read transaction store")?;
        drop(reader);

        TransactionFile::parse(&contents)
    }

    /// Merge `record` into the file under an exclusive lock.
    ///
    /// Records other handles wrote since the last read are picked up into
    /// memory along the way.
    fn put_to_file(&self, path: &Path, record: &TransactionRecord) -> Result<PutOutcome> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .context("Failed to open transaction store file for writing")?;
        file.lock_exclusive()
            .context("Failed to acquire write lock on transaction store")?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read transaction store")?;
        let mut on_disk = TransactionFile::parse(&contents)?;

        for existing in &on_disk.transactions {
            self.records
                .entry(existing.id.clone())
                .or_insert_with(|| existing.clone());
        }

        if let Some(existing) = on_disk.transactions.iter().find(|r| r.id == record.id) {
            return Ok(if existing == record {
                PutOutcome::AlreadyRecorded
            } else {
                PutOutcome::Conflict
            });
        }

        on_disk.transactions.push(record.clone());
        on_disk
            .transactions
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        let json = serde_json::to_string_pretty(&on_disk)
            .context("Failed to serialize transaction store")?;

        file.seek(SeekFrom::Start(0))
            .context("Failed to rewind transaction store")?;
        file.set_len(0)
            .context("Failed to truncate transaction store")?;
        let mut writer = std::io::BufWriter::new(&mut file);
        writer
            .write_all(json.as_bytes())
            .context("Failed to write transaction store")?;
        writer
            .flush()
            .context("Failed to flush transaction store to disk")?;
        drop(writer);
        file.sync_data()
            .context("Failed to sync transaction store to disk")?;

        self.records.insert(record.id.clone(), record.clone());
        Ok(PutOutcome::Inserted)
    }

    fn put_in_memory(&self, record: &TransactionRecord) -> PutOutcome {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(existing) if existing.get() == record => PutOutcome::AlreadyRecorded,
            Entry::Occupied(_) => PutOutcome::Conflict,
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                PutOutcome::Inserted
            }
        }
    }

    /// Insert a record, idempotent by Id.
    ///
    /// Returns only once the record is durable. File-backed stores block on
    /// file I/O; async callers go through [`TransactionRecorder::put`].
    pub fn put_record(&self, record: &TransactionRecord) -> Result<(), TaskError> {
        let outcome = match &self.store_path {
            Some(path) => self.put_to_file(path, record).map_err(|e| {
                TaskError::task_failed(format!(
                    "failed to persist transaction '{}': {:#}",
                    record.id, e
                ))
            })?,
            None => self.put_in_memory(record),
        };

        match outcome {
            PutOutcome::Inserted => {
                tracing::info!(id = %record.id, kind = %record.kind, "Transaction recorded");
                Ok(())
            }
            PutOutcome::AlreadyRecorded => {
                tracing::debug!(id = %record.id, "Transaction already recorded");
                Ok(())
            }
            PutOutcome::Conflict => Err(TaskError::DuplicateId(record.id.clone())),
        }
    }

    pub fn get(&self, id: &str) -> Option<TransactionRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// All records ordered by timestamp, then id
    pub fn list(&self) -> Vec<TransactionRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }
}

#[async_trait]
impl TransactionRecorder for TransactionStore {
    async fn put(&self, record: &TransactionRecord) -> Result<(), TaskError> {
        if self.store_path.is_none() {
            return self.put_record(record);
        }

        let store = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.put_record(&record))
            .await
            .map_err(|e| TaskError::task_failed(format!("transaction write task failed: {}", e)))?
    }

    fn store_name(&self) -> String {
        match &self.store_path {
            Some(path) => path.display().to_string(),
            None => "in-memory".to_string(),
        }
    }
}
