mod record;
mod state;

use std::{path::Path, sync::Arc};

use state::LedgerState;
use tracing::debug;

use crate::error::LedgerError;
use crate::models::DetectionRecord;

pub use record::{DetectionRepository, decode_record, encode_record};
pub use state::LoadSummary;

/// Durable, newest-first collection of detection records.
///
/// Cheap to clone; clones share the same records. Writers are serialized internally, and every
/// mutation rewrites the whole snapshot.
#[derive(Debug, Clone)]
pub struct DetectionLedger {
    state: Arc<LedgerState>,
}

impl DetectionLedger {
    /// Handle over `snapshot_file`. Nothing is read until [`DetectionLedger::load`] or the first
    /// operation.
    pub fn new<P: AsRef<Path>>(snapshot_file: P) -> Self {
        Self {
            state: Arc::new(LedgerState::new(snapshot_file.as_ref().to_path_buf())),
        }
    }

    /// Construct and load in one step.
    pub async fn open<P: AsRef<Path>>(snapshot_file: P) -> Result<Self, LedgerError> {
        let ledger = Self::new(snapshot_file);
        ledger.load().await?;
        Ok(ledger)
    }

    /// Read the persisted snapshot once. Later calls are no-ops.
    pub async fn load(&self) -> Result<LoadSummary, LedgerError> {
        self.state.load().await
    }

    /// Drop the in-memory list and read the persisted snapshot again.
    pub async fn reload(&self) -> Result<LoadSummary, LedgerError> {
        self.state.reload().await
    }

    pub fn snapshot_file(&self) -> &Path {
        self.state.snapshot_file()
    }

    pub async fn len(&self) -> Result<usize, LedgerError> {
        self.state.read(|records| records.len()).await
    }

    pub async fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len().await? == 0)
    }
}

impl DetectionRepository for DetectionLedger {
    async fn get_records(&self) -> Result<Vec<DetectionRecord>, LedgerError> {
        self.state.read(|records| records.to_vec()).await
    }

    async fn get_record(&self, id: &str) -> Result<Option<DetectionRecord>, LedgerError> {
        self.state
            .read(|records| records.iter().find(|record| record.id() == id).cloned())
            .await
    }

    async fn insert_record(&self, record: DetectionRecord) -> Result<(), LedgerError> {
        debug!("Inserting record {}", record.id());
        let id = record.id().to_string();
        let inserted = self
            .state
            .mutate(|records| {
                if records.iter().any(|existing| existing.id() == record.id()) {
                    return (false, false);
                }
                // Usually index 0; older timestamps land where they keep the order intact
                let position =
                    records.partition_point(|existing| existing.timestamp() > record.timestamp());
                records.insert(position, record);
                (true, true)
            })
            .await?;
        if !inserted {
            return Err(LedgerError::DuplicateId(id));
        }
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<bool, LedgerError> {
        self.state
            .mutate(|records| {
                let before = records.len();
                records.retain(|record| record.id() != id);
                let removed = records.len() != before;
                (removed, removed)
            })
            .await
    }

    async fn delete_records(&self, ids: &[String]) -> Result<usize, LedgerError> {
        self.state
            .mutate(|records| {
                let before = records.len();
                records.retain(|record| !ids.iter().any(|id| id == record.id()));
                let removed = before - records.len();
                (removed, removed > 0)
            })
            .await
    }

    async fn verify_record(&self, id: &str) -> Result<bool, LedgerError> {
        self.state
            .mutate(|records| match records.iter_mut().find(|record| record.id() == id) {
                Some(record) => {
                    record.mark_verified();
                    (true, true)
                }
                None => (false, false),
            })
            .await
    }

    async fn clear_records(&self) -> Result<(), LedgerError> {
        self.state.clear().await
    }
}
