use std::future::Future;

use crate::error::LedgerError;
use crate::models::DetectionRecord;

/// Encode one record as a standalone JSON string.
pub fn encode_record(record: &DetectionRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}

/// Decode one record previously produced by [`encode_record`].
///
/// Entries that parse but break a record invariant are rejected like malformed JSON.
pub fn decode_record(entry: &str) -> Result<DetectionRecord, serde_json::Error> {
    let record: DetectionRecord = serde_json::from_str(entry)?;
    record
        .check_invariants()
        .map_err(<serde_json::Error as serde::de::Error>::custom)?;
    Ok(record)
}

pub trait DetectionRepository {
    /// All records, newest first.
    fn get_records(&self) -> impl Future<Output = Result<Vec<DetectionRecord>, LedgerError>>;
    fn get_record(&self, id: &str) -> impl Future<Output = Result<Option<DetectionRecord>, LedgerError>>;
    /// Fails with `DuplicateId` when a record with the same id is already stored.
    fn insert_record(&self, record: DetectionRecord) -> impl Future<Output = Result<(), LedgerError>>;
    /// Returns whether a record was removed. Unknown ids are not an error.
    fn delete_record(&self, id: &str) -> impl Future<Output = Result<bool, LedgerError>>;
    /// Returns how many records were removed.
    fn delete_records(&self, ids: &[String]) -> impl Future<Output = Result<usize, LedgerError>>;
    /// Mark a record verified. Returns whether it was found.
    fn verify_record(&self, id: &str) -> impl Future<Output = Result<bool, LedgerError>>;
    /// Drop every record together with the persisted snapshot.
    fn clear_records(&self) -> impl Future<Output = Result<(), LedgerError>>;
}
