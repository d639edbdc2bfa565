use time::{Date, OffsetDateTime, UtcOffset, macros::format_description};

use super::{AnalyticsEngine, ratio};
use crate::models::{DailyErrorStats, DailyStats, DetectionRecord, RecordFilter};

/// Current time in the local offset, or UTC when the platform cannot report one.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// The `days` calendar days ending with `today`, oldest first.
pub fn trailing_days(today: Date, days: usize) -> Vec<Date> {
    let mut dates = Vec::with_capacity(days);
    let mut day = Some(today);
    for _ in 0..days {
        match day {
            Some(current) => {
                dates.push(current);
                day = current.previous_day();
            }
            None => break,
        }
    }
    dates.reverse();
    dates
}

/// `YYYY-MM-DD` bucket key.
pub fn date_key(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(format).unwrap_or_else(|_| date.to_string())
}

/// Per-day tallies shared by both rollups.
#[derive(Debug, Default, Clone, Copy)]
struct DayBucket {
    count: usize,
    correct: usize,
    confidence_sum: f64,
}

impl<'a> AnalyticsEngine<'a> {
    /// Group scored records into the trailing `days` local calendar days ending at `now`.
    ///
    /// A record's day is its timestamp shifted into `now`'s offset, so records made in another
    /// zone are bucketed by the requester's calendar.
    fn bucket_days(&self, days: usize, filter: RecordFilter, now: OffsetDateTime) -> Vec<(Date, DayBucket)> {
        let offset: UtcOffset = now.offset();
        let mut buckets: Vec<(Date, DayBucket)> = trailing_days(now.date(), days)
            .into_iter()
            .map(|date| (date, DayBucket::default()))
            .collect();

        let records = self
            .records
            .iter()
            .filter(|record| record.has_ground_truth() && filter.matches(record));
        for record in records {
            let day = local_day(record, offset);
            // Buckets are consecutive and sorted, so binary search finds the slot
            if let Ok(slot) = buckets.binary_search_by(|(date, _)| date.cmp(&day)) {
                let bucket = &mut buckets[slot].1;
                bucket.count += 1;
                if record.is_correct() {
                    bucket.correct += 1;
                }
                bucket.confidence_sum += record.confidence() as f64;
            }
        }
        buckets
    }

    /// One [`DailyStats`] per day for the trailing `days` days, oldest first. Empty days are
    /// reported with zero count, accuracy and confidence.
    pub fn daily_stats(&self, days: usize, filter: RecordFilter, now: OffsetDateTime) -> Vec<DailyStats> {
        self.bucket_days(days, filter, now)
            .into_iter()
            .map(|(date, bucket)| DailyStats {
                date,
                detection_count: bucket.count,
                accuracy: ratio(bucket.correct, bucket.count),
                avg_confidence: if bucket.count == 0 {
                    0.0
                } else {
                    bucket.confidence_sum / bucket.count as f64
                },
            })
            .collect()
    }

    /// Same buckets as [`AnalyticsEngine::daily_stats`], reporting mistakes instead.
    pub fn daily_error_stats(
        &self,
        days: usize,
        filter: RecordFilter,
        now: OffsetDateTime,
    ) -> Vec<DailyErrorStats> {
        self.bucket_days(days, filter, now)
            .into_iter()
            .map(|(date, bucket)| {
                let error_count = bucket.count - bucket.correct;
                DailyErrorStats {
                    date,
                    detection_count: bucket.count,
                    error_count,
                    error_rate: ratio(error_count, bucket.count),
                }
            })
            .collect()
    }
}

fn local_day(record: &DetectionRecord, offset: UtcOffset) -> Date {
    record.timestamp().to_offset(offset).date()
}
