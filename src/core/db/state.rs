use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zstd::stream::write::Encoder as ZstdEncoder;

use super::record::{decode_record, encode_record};
use crate::error::LedgerError;
use crate::models::DetectionRecord;

const ZSTD_LEVEL: i32 = 3;

/// Outcome of reading the persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    /// Entries that could not be decoded and were dropped.
    pub skipped: usize,
}

pub(super) struct LedgerState {
    snapshot_file: PathBuf,
    /// `None` until the snapshot has been read.
    records: RwLock<Option<Vec<DetectionRecord>>>,
}

impl std::fmt::Debug for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerState")
            .field("snapshot_file", &self.snapshot_file)
            .finish()
    }
}

impl LedgerState {
    pub(super) fn new(snapshot_file: PathBuf) -> Self {
        Self {
            snapshot_file,
            records: RwLock::new(None),
        }
    }

    pub(super) fn snapshot_file(&self) -> &Path {
        &self.snapshot_file
    }

    /// Read the snapshot unless it has already been read.
    pub(super) async fn load(&self) -> Result<LoadSummary, LedgerError> {
        let mut guard = self.records.write().await;
        if let Some(records) = guard.as_ref() {
            return Ok(LoadSummary {
                loaded: records.len(),
                skipped: 0,
            });
        }
        let (records, summary) = read_snapshot(&self.snapshot_file).await?;
        *guard = Some(records);
        Ok(summary)
    }

    /// Discard the in-memory list and read the snapshot again.
    pub(super) async fn reload(&self) -> Result<LoadSummary, LedgerError> {
        let mut guard = self.records.write().await;
        let (records, summary) = read_snapshot(&self.snapshot_file).await?;
        *guard = Some(records);
        Ok(summary)
    }

    /// Run `f` against the loaded records.
    pub(super) async fn read<R>(
        &self,
        f: impl FnOnce(&[DetectionRecord]) -> R,
    ) -> Result<R, LedgerError> {
        self.load().await?;
        let guard = self.records.read().await;
        Ok(f(guard.as_deref().unwrap_or(&[])))
    }

    /// Apply `f` to a copy of the records and persist the copy when `f` reports a change.
    ///
    /// The in-memory list is replaced only after the snapshot has been written, so a failed
    /// write leaves both memory and disk as they were. The write lock is held throughout,
    /// which serializes writers.
    pub(super) async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<DetectionRecord>) -> (R, bool),
    ) -> Result<R, LedgerError> {
        self.load().await?;
        let mut guard = self.records.write().await;

        let mut next = guard.clone().unwrap_or_default();
        let (result, changed) = f(&mut next);
        if changed {
            write_snapshot(&self.snapshot_file, &next).await?;
            *guard = Some(next);
        }
        Ok(result)
    }

    /// Forget every record and remove the snapshot file.
    pub(super) async fn clear(&self) -> Result<(), LedgerError> {
        let mut guard = self.records.write().await;
        match tokio::fs::remove_file(&self.snapshot_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(LedgerError::storage(&self.snapshot_file, e)),
        }
        *guard = Some(Vec::new());
        info!("Ledger cleared");
        Ok(())
    }
}

/// Newest first. Stable, so records sharing a timestamp keep their relative order.
fn sort_newest_first(records: &mut [DetectionRecord]) {
    records.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
}

async fn read_snapshot(path: &Path) -> Result<(Vec<DetectionRecord>, LoadSummary), LedgerError> {
    let compressed = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No ledger snapshot at {:?}, starting empty", path);
            return Ok((
                Vec::new(),
                LoadSummary {
                    loaded: 0,
                    skipped: 0,
                },
            ));
        }
        Err(e) => return Err(LedgerError::storage(path, e)),
    };

    let json = zstd::stream::decode_all(compressed.as_slice())
        .map_err(|e| LedgerError::CorruptSnapshot(format!("{:?}: {}", path, e)))?;
    let entries: Vec<String> = serde_json::from_slice(&json)
        .map_err(|e| LedgerError::CorruptSnapshot(format!("{:?}: {}", path, e)))?;

    let mut skipped = 0;
    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match decode_record(entry) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping undecodable ledger entry {}: {}", index, e);
                skipped += 1;
            }
        }
    }
    sort_newest_first(&mut records);

    let summary = LoadSummary {
        loaded: records.len(),
        skipped,
    };
    info!(
        "Loaded {} ledger records from {:?} ({} skipped)",
        summary.loaded, path, summary.skipped
    );
    Ok((records, summary))
}

async fn write_snapshot(path: &Path, records: &[DetectionRecord]) -> Result<(), LedgerError> {
    let entries = records
        .iter()
        .map(encode_record)
        .collect::<Result<Vec<_>, _>>()?;
    let json = serde_json::to_vec(&entries)?;

    let target = path.to_path_buf();
    let count = entries.len();
    tokio::task::spawn_blocking(move || write_snapshot_blocking(&target, &json))
        .await
        .map_err(|e| LedgerError::storage(path, std::io::Error::other(e)))??;
    debug!("Persisted {} ledger records", count);
    Ok(())
}

/// Write to a temporary sibling and rename it over the snapshot.
fn write_snapshot_blocking(path: &Path, json: &[u8]) -> Result<(), LedgerError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| LedgerError::storage(&parent, e))?;

    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| LedgerError::storage(&parent, e))?;
    {
        let mut encoder = ZstdEncoder::new(temp.as_file_mut(), ZSTD_LEVEL)
            .map_err(|e| LedgerError::storage(path, e))?;
        encoder
            .write_all(json)
            .map_err(|e| LedgerError::storage(path, e))?;
        encoder.finish().map_err(|e| LedgerError::storage(path, e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| LedgerError::storage(path, e))?;
    temp.persist(path)
        .map_err(|e| LedgerError::storage(path, e.error))?;
    Ok(())
}
