// src/storage/ledger.rs
use crate::error::LedgerError;
use crate::types::OrderRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Append-only record of executed orders. Records are never updated or removed.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn append(&self, record: OrderRecord) -> Result<(), LedgerError>;
}

/// One JSON object per line. Appends from concurrent monitors are serialized
/// by the file mutex and flushed before the lock is released.
pub struct JsonlLedger {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlLedger {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        info!(path = %path.display(), "order ledger opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_all(&self) -> Result<Vec<OrderRecord>, LedgerError> {
        let data = fs::read_to_string(&self.path).await?;
        data.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(LedgerError::from))
            .collect()
    }
}

#[async_trait]
impl OrderLedger for JsonlLedger {
    async fn append(&self, record: OrderRecord) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// In-process ledger for dry runs and tests.
#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<OrderRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<OrderRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl OrderLedger for MemoryLedger {
    async fn append(&self, record: OrderRecord) -> Result<(), LedgerError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}
