use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Label substituted when the model reports an index past the end of the label list.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Ground-truth index used by records that carry no user-supplied label.
pub const NO_GROUND_TRUTH: i32 = -1;

/// Outcome of one inference call. Not persisted; it becomes a [`DetectionRecord`]
/// once the caller supplies a ground truth.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub label: String,
    pub index: usize,
    pub confidence: f32,
    pub scores: Vec<f32>,
    labels: Arc<[String]>,
}

/// One ranked entry of a score vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

impl ClassificationResult {
    pub(crate) fn new(index: usize, scores: Vec<f32>, labels: Arc<[String]>) -> Self {
        let label = label_at(&labels, index);
        let confidence = scores.get(index).copied().unwrap_or(0.0);
        Self {
            label,
            index,
            confidence,
            scores,
            labels,
        }
    }

    /// The `k` highest scoring classes, best first. Equal scores keep the lower index first.
    pub fn top_k(&self, k: usize) -> Vec<Prediction> {
        let mut order: Vec<usize> = (0..self.scores.len()).collect();
        // sort_by is stable, so ties stay in index order
        order.sort_by(|&a, &b| {
            self.scores[b]
                .partial_cmp(&self.scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
            .into_iter()
            .take(k)
            .map(|index| Prediction {
                index,
                label: label_at(&self.labels, index),
                score: self.scores[index],
            })
            .collect()
    }
}

fn label_at(labels: &[String], index: usize) -> String {
    labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

/// A persisted classification outcome.
///
/// Everything but the verification flag is fixed at creation; the flag can only be raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    id: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    ground_truth_class: String,
    ground_truth_index: i32,
    predicted_class: String,
    predicted_index: i32,
    confidence: f32,
    scores: Vec<f32>,
    #[serde(default)]
    is_verified: bool,
}

impl DetectionRecord {
    /// Build a record for `result` with the ground truth asserted by the user.
    pub fn new(
        result: &ClassificationResult,
        ground_truth_class: impl Into<String>,
        ground_truth_index: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: OffsetDateTime::now_utc(),
            ground_truth_class: ground_truth_class.into(),
            ground_truth_index,
            predicted_class: result.label.clone(),
            predicted_index: result.index as i32,
            confidence: result.confidence.clamp(0.0, 1.0),
            scores: result.scores.clone(),
            is_verified: false,
        }
    }

    /// A record without ground truth. It is listed and exported but never counted.
    pub fn placeholder(result: &ClassificationResult) -> Self {
        Self::new(result, String::new(), NO_GROUND_TRUTH)
    }

    /// Build a record from already known parts, e.g. when importing.
    pub fn from_parts(
        timestamp: OffsetDateTime,
        ground_truth_class: impl Into<String>,
        ground_truth_index: i32,
        predicted_class: impl Into<String>,
        predicted_index: i32,
        confidence: f32,
        scores: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: timestamp.to_offset(time::UtcOffset::UTC),
            ground_truth_class: ground_truth_class.into(),
            ground_truth_index,
            predicted_class: predicted_class.into(),
            predicted_index,
            confidence: confidence.clamp(0.0, 1.0),
            scores,
            is_verified: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn ground_truth_class(&self) -> &str {
        &self.ground_truth_class
    }

    pub fn ground_truth_index(&self) -> i32 {
        self.ground_truth_index
    }

    pub fn predicted_class(&self) -> &str {
        &self.predicted_class
    }

    pub fn predicted_index(&self) -> i32 {
        self.predicted_index
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn is_verified(&self) -> bool {
        self.is_verified
    }

    pub fn has_ground_truth(&self) -> bool {
        self.ground_truth_index >= 0
    }

    pub fn is_correct(&self) -> bool {
        self.ground_truth_index == self.predicted_index
    }

    /// Check what the constructors guarantee. Used on records read back from storage.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} is outside [0, 1]", self.confidence));
        }
        if let Ok(predicted) = usize::try_from(self.predicted_index) {
            if !self.scores.is_empty() && predicted >= self.scores.len() {
                return Err(format!(
                    "predicted index {} is past the {} scores",
                    predicted,
                    self.scores.len()
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn mark_verified(&mut self) {
        self.is_verified = true;
    }
}

/// Verification-state selector used by every aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordFilter {
    #[default]
    All,
    Verified,
    NotVerified,
}

impl RecordFilter {
    pub fn matches(&self, record: &DetectionRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::Verified => record.is_verified(),
            RecordFilter::NotVerified => !record.is_verified(),
        }
    }
}

/// Compound history filter. Every `None` leaves that dimension unconstrained.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub record_filter: RecordFilter,
    /// Matches the ground-truth class index.
    pub class_index: Option<i32>,
    pub is_correct: Option<bool>,
    /// Case-insensitive substring of the predicted or ground-truth class name.
    pub search: Option<String>,
    /// Inclusive, compared by calendar day.
    pub start_date: Option<Date>,
    /// Inclusive, compared by calendar day.
    pub end_date: Option<Date>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub date: Date,
    pub detection_count: usize,
    pub accuracy: f64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyErrorStats {
    pub date: Date,
    pub detection_count: usize,
    pub error_count: usize,
    pub error_rate: f64,
}

/// Per-class accuracy. `accuracy` is [`ClassAccuracyStats::NO_SAMPLES`] when the class has
/// no records.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassAccuracyStats {
    pub class_index: usize,
    pub sample_count: usize,
    pub accuracy: f64,
    pub error_count: usize,
}

impl ClassAccuracyStats {
    pub const NO_SAMPLES: f64 = -1.0;

    pub fn has_samples(&self) -> bool {
        self.sample_count > 0
    }
}
