//! Read-only queries over a ledger snapshot.
//!
//! Records without ground truth (`ground_truth_index < 0`) are excluded from every count,
//! rate, matrix and rollup computed here. They still show up in history listings and exports.

mod daily;
mod export;

use time::UtcOffset;

use crate::models::{ClassAccuracyStats, DetectionRecord, HistoryFilter, RecordFilter};

pub use daily::{date_key, local_now, trailing_days};
pub use export::{CSV_HEADER, export_csv, export_json};

/// Counting aggregates over one filtered set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub verified: usize,
    pub accuracy: f64,
    pub error_rate: f64,
    pub verification_rate: f64,
    pub avg_confidence: f64,
}

/// Square `[actual][predicted]` count table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    cells: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    fn new(size: usize) -> Self {
        Self {
            cells: vec![vec![0; size]; size],
        }
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.cells
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn row_total(&self, actual: usize) -> usize {
        self.cells.get(actual).map(|row| row.iter().sum()).unwrap_or(0)
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.cells
    }

    pub fn into_rows(self) -> Vec<Vec<usize>> {
        self.cells
    }
}

/// Stateless analytics over a borrowed snapshot of the ledger.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsEngine<'a> {
    records: &'a [DetectionRecord],
    num_classes: usize,
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(records: &'a [DetectionRecord], num_classes: usize) -> Self {
        Self {
            records,
            num_classes,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Records eligible for scoring: ground truth present and passing `filter`.
    fn scored(&self, filter: RecordFilter) -> impl Iterator<Item = &'a DetectionRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| record.has_ground_truth() && filter.matches(record))
    }

    /// Index pair inside the `num_classes` square, if both ends fit.
    fn class_cell(&self, record: &DetectionRecord) -> Option<(usize, usize)> {
        let actual = usize::try_from(record.ground_truth_index()).ok()?;
        let predicted = usize::try_from(record.predicted_index()).ok()?;
        (actual < self.num_classes && predicted < self.num_classes).then_some((actual, predicted))
    }

    pub fn total_count(&self, filter: RecordFilter) -> usize {
        self.scored(filter).count()
    }

    pub fn correct_count(&self, filter: RecordFilter) -> usize {
        self.scored(filter).filter(|record| record.is_correct()).count()
    }

    pub fn incorrect_count(&self, filter: RecordFilter) -> usize {
        self.scored(filter).filter(|record| !record.is_correct()).count()
    }

    /// `correct / total`, 0.0 for an empty set.
    pub fn accuracy(&self, filter: RecordFilter) -> f64 {
        ratio(self.correct_count(filter), self.total_count(filter))
    }

    pub fn error_rate(&self, filter: RecordFilter) -> f64 {
        1.0 - self.accuracy(filter)
    }

    pub fn verification_rate(&self, filter: RecordFilter) -> f64 {
        let verified = self.scored(filter).filter(|record| record.is_verified()).count();
        ratio(verified, self.total_count(filter))
    }

    /// Every counting aggregate in a single pass.
    pub fn summary(&self, filter: RecordFilter) -> Summary {
        let mut summary = Summary::default();
        let mut confidence_sum = 0.0;
        for record in self.scored(filter) {
            summary.total += 1;
            if record.is_correct() {
                summary.correct += 1;
            } else {
                summary.incorrect += 1;
            }
            if record.is_verified() {
                summary.verified += 1;
            }
            confidence_sum += record.confidence() as f64;
        }
        summary.accuracy = ratio(summary.correct, summary.total);
        summary.error_rate = 1.0 - summary.accuracy;
        summary.verification_rate = ratio(summary.verified, summary.total);
        summary.avg_confidence = if summary.total == 0 {
            0.0
        } else {
            confidence_sum / summary.total as f64
        };
        summary
    }

    /// Accuracy over records whose ground truth is `class_index`; 0.0 when there are none.
    pub fn class_accuracy(&self, class_index: usize, filter: RecordFilter) -> f64 {
        self.class_accuracy_stats(filter)
            .into_iter()
            .find(|stats| stats.class_index == class_index)
            .filter(ClassAccuracyStats::has_samples)
            .map(|stats| stats.accuracy)
            .unwrap_or(0.0)
    }

    /// One entry per class, in class order. Classes without samples carry
    /// [`ClassAccuracyStats::NO_SAMPLES`].
    pub fn class_accuracy_stats(&self, filter: RecordFilter) -> Vec<ClassAccuracyStats> {
        let mut samples = vec![0usize; self.num_classes];
        let mut correct = vec![0usize; self.num_classes];
        for (actual, predicted) in self.scored(filter).filter_map(|r| self.class_cell(r)) {
            samples[actual] += 1;
            if actual == predicted {
                correct[actual] += 1;
            }
        }

        (0..self.num_classes)
            .map(|class_index| {
                let sample_count = samples[class_index];
                ClassAccuracyStats {
                    class_index,
                    sample_count,
                    accuracy: if sample_count == 0 {
                        ClassAccuracyStats::NO_SAMPLES
                    } else {
                        ratio(correct[class_index], sample_count)
                    },
                    error_count: sample_count - correct[class_index],
                }
            })
            .collect()
    }

    /// Classes ordered from worst to best accuracy; classes without samples always trail.
    pub fn hardest_classes(&self, filter: RecordFilter, limit: Option<usize>) -> Vec<ClassAccuracyStats> {
        let mut stats = self.class_accuracy_stats(filter);
        stats.sort_by(|a, b| match (a.has_samples(), b.has_samples()) {
            (true, true) => a
                .accuracy
                .partial_cmp(&b.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal),
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => std::cmp::Ordering::Equal,
        });
        if let Some(limit) = limit {
            stats.truncate(limit);
        }
        stats
    }

    /// `[actual][predicted]` counts. Indices outside `num_classes` are skipped.
    pub fn confusion_matrix(&self, filter: RecordFilter) -> ConfusionMatrix {
        let mut matrix = ConfusionMatrix::new(self.num_classes);
        for (actual, predicted) in self.scored(filter).filter_map(|r| self.class_cell(r)) {
            matrix.cells[actual][predicted] += 1;
        }
        matrix
    }

    /// Sample count per ground-truth class.
    pub fn class_distribution(&self, filter: RecordFilter) -> Vec<usize> {
        self.class_accuracy_stats(filter)
            .into_iter()
            .map(|stats| stats.sample_count)
            .collect()
    }

    /// Records passing every active dimension of `filter`, newest first.
    ///
    /// Calendar days are taken in `offset`, the requester's local offset.
    pub fn filter_history(&self, filter: &HistoryFilter, offset: UtcOffset) -> Vec<&'a DetectionRecord> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase);

        self.records
            .iter()
            .filter(|record| filter.record_filter.matches(record))
            .filter(|record| {
                filter
                    .class_index
                    .is_none_or(|class_index| record.ground_truth_index() == class_index)
            })
            .filter(|record| {
                filter.is_correct.is_none_or(|wanted| {
                    record.has_ground_truth() && record.is_correct() == wanted
                })
            })
            .filter(|record| {
                search.as_deref().is_none_or(|needle| {
                    record.predicted_class().to_lowercase().contains(needle)
                        || record.ground_truth_class().to_lowercase().contains(needle)
                })
            })
            .filter(|record| {
                let day = record.timestamp().to_offset(offset).date();
                filter.start_date.is_none_or(|start| day >= start)
                    && filter.end_date.is_none_or(|end| day <= end)
            })
            .collect()
    }
}
