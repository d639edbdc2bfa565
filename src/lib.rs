pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod models;

pub use config::AppConfig;
pub use core::analytics::AnalyticsEngine;
pub use core::db::{DetectionLedger, DetectionRepository};
pub use detection::ClassificationService;
pub use error::{ClassifyError, LedgerError};
pub use models::{
    ClassAccuracyStats, ClassificationResult, DailyErrorStats, DailyStats, DetectionRecord,
    HistoryFilter, Prediction, RecordFilter,
};
