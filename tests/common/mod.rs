mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from visiontally for tests
pub use visiontally::core::analytics::AnalyticsEngine;
pub use visiontally::core::db::{DetectionLedger, DetectionRepository};
pub use visiontally::detection::engine::{InferenceEngine, ModelAssets};
pub use visiontally::{
    ClassificationService, ClassifyError, DetectionRecord, HistoryFilter, LedgerError, RecordFilter,
};
