//! File-backed pending-request store
//!
//! One JSON file holds every record. The file is tiny (a handful of records
//! per cycle), so each mutation rewrites it whole, through a temp file and an
//! atomic rename so a crash mid-write never leaves a torn store behind.

use async_trait::async_trait;
use freeday_application::{PendingRequest, PendingStore, StoreError};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// `PendingStore` over a single JSON file on disk.
pub struct JsonFilePendingStore {
    path: PathBuf,
    // Serializes read-modify-write sequences within this process; cross-
    // process exclusion is out of scope (one manager owns one store file).
    lock: Mutex<()>,
}

impl JsonFilePendingStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Vec<PendingRequest>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Serde(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn write_records(&self, records: &[PendingRequest]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let bytes =
            serde_json::to_vec_pretty(records).map_err(|e| StoreError::Serde(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PendingStore for JsonFilePendingStore {
    async fn save(&self, record: PendingRequest) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_records()?;
        debug!(
            person = %record.person,
            batch = record.batch_index,
            "saving pending record"
        );
        records.push(record);
        self.write_records(&records)
    }

    async fn find(&self, owner: &str, person: &str) -> Result<Vec<PendingRequest>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut found: Vec<PendingRequest> = self
            .read_records()?
            .into_iter()
            .filter(|r| r.owner == owner && r.person == person)
            .collect();
        found.sort_by_key(|r| r.batch_index);
        Ok(found)
    }

    async fn find_all(&self, owner: &str) -> Result<Vec<PendingRequest>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut found: Vec<PendingRequest> = self
            .read_records()?
            .into_iter()
            .filter(|r| r.owner == owner)
            .collect();
        found.sort_by(|a, b| (&a.person, a.batch_index).cmp(&(&b.person, b.batch_index)));
        Ok(found)
    }

    async fn delete(&self, record: &PendingRequest) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|r| !r.same_identity(record));
        if records.len() != before {
            self.write_records(&records)?;
        }
        Ok(())
    }
}
