//! Integration tests for the analytics queries.
//!
//! Tests cover:
//! - Counting aggregates and the accuracy/error-rate relation
//! - Confusion matrix and per-class accuracy consistency
//! - Hardest-class ranking with classes that have no samples
//! - Calendar-day rollups in the requester's offset
//! - Advanced history filtering
//! - Exclusion of records without ground truth

mod common;

use common::*;
use time::macros::{date, datetime};
use time::{Duration, OffsetDateTime, UtcOffset};
use visiontally::ClassAccuracyStats;
use visiontally::models::NO_GROUND_TRUTH;

const SCENARIO_NOW: OffsetDateTime = datetime!(2026-06-15 12:00 UTC);

fn scenario_records() -> Vec<DetectionRecord> {
    vec![
        make_record_at(SCENARIO_NOW, 0, 0, 0.9),
        make_record_at(SCENARIO_NOW, 0, 0, 0.8),
        make_record_at(SCENARIO_NOW, 1, 0, 0.6),
    ]
}

fn placeholder(predicted_index: i32) -> DetectionRecord {
    make_record_at(SCENARIO_NOW, NO_GROUND_TRUTH, predicted_index, 0.99)
}

#[test]
fn test_two_of_three_correct() {
    let records = scenario_records();
    let engine = AnalyticsEngine::new(&records, 2);

    assert_eq!(engine.total_count(RecordFilter::All), 3);
    assert_eq!(engine.correct_count(RecordFilter::All), 2);
    assert_eq!(engine.incorrect_count(RecordFilter::All), 1);
    assert!((engine.accuracy(RecordFilter::All) - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(
        engine.confusion_matrix(RecordFilter::All).into_rows(),
        vec![vec![2, 0], vec![1, 0]]
    );
}

#[test]
fn test_accuracy_and_error_rate_sum_to_one() {
    let records = scenario_records();
    let engine = AnalyticsEngine::new(&records, 2);

    let sum = engine.accuracy(RecordFilter::All) + engine.error_rate(RecordFilter::All);
    assert!((sum - 1.0).abs() < 1e-9);

    let summary = engine.summary(RecordFilter::All);
    assert_eq!(summary.total, 3);
    assert!((summary.accuracy + summary.error_rate - 1.0).abs() < 1e-9);
    assert!((summary.avg_confidence - (0.9 + 0.8 + 0.6) / 3.0).abs() < 1e-6);
}

#[test]
fn test_empty_set_has_zero_accuracy() {
    let engine = AnalyticsEngine::new(&[], 3);

    assert_eq!(engine.total_count(RecordFilter::All), 0);
    assert_eq!(engine.accuracy(RecordFilter::All), 0.0);
    assert_eq!(engine.verification_rate(RecordFilter::All), 0.0);
    assert_eq!(engine.summary(RecordFilter::All).avg_confidence, 0.0);
}

#[test]
fn test_placeholders_are_never_counted() {
    // 1. Scenario records plus placeholders, one predicting out of range
    let mut records = scenario_records();
    records.push(placeholder(0));
    records.push(placeholder(1));
    records.push(placeholder(9));
    let engine = AnalyticsEngine::new(&records, 2);

    // 2. Every aggregate matches the scenario alone
    assert_eq!(engine.total_count(RecordFilter::All), 3);
    assert!((engine.accuracy(RecordFilter::All) - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(
        engine.confusion_matrix(RecordFilter::All).into_rows(),
        vec![vec![2, 0], vec![1, 0]]
    );
    assert_eq!(engine.class_distribution(RecordFilter::All), vec![2, 1]);

    // 3. Daily rollups ignore them too
    let today = engine.daily_stats(1, RecordFilter::All, SCENARIO_NOW);
    assert_eq!(today[0].detection_count, 3);
    let errors = engine.daily_error_stats(1, RecordFilter::All, SCENARIO_NOW);
    assert_eq!(errors[0].error_count, 1);
}

#[tokio::test]
async fn test_verification_filters() -> anyhow::Result<()> {
    // 1. Verify one of three records through the ledger
    let (ledger, _temp_dir) = create_test_ledger().await;
    let records = scenario_records();
    for record in &records {
        ledger.insert_record(record.clone()).await?;
    }
    ledger.verify_record(records[2].id()).await?;
    let stored = ledger.get_records().await?;
    let engine = AnalyticsEngine::new(&stored, 2);

    // 2. Filters split the set
    assert!((engine.verification_rate(RecordFilter::All) - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(engine.total_count(RecordFilter::Verified), 1);
    assert_eq!(engine.accuracy(RecordFilter::Verified), 0.0);
    assert_eq!(engine.total_count(RecordFilter::NotVerified), 2);
    assert_eq!(engine.accuracy(RecordFilter::NotVerified), 1.0);

    Ok(())
}

#[test]
fn test_confusion_rows_match_class_samples() {
    let records = vec![
        make_record(0, 0, 0.9),
        make_record(0, 2, 0.4),
        make_record(1, 1, 0.7),
        make_record(2, 0, 0.3),
        make_record(2, 2, 0.8),
        make_record(2, 2, 0.6),
        make_record(1, 7, 0.2),
    ];
    let engine = AnalyticsEngine::new(&records, 3);

    let matrix = engine.confusion_matrix(RecordFilter::All);
    let stats = engine.class_accuracy_stats(RecordFilter::All);
    for class in &stats {
        assert_eq!(matrix.row_total(class.class_index), class.sample_count);
    }
    assert_eq!(matrix.get(2, 0), 1);
    // Out-of-range cells read as zero
    assert_eq!(matrix.get(1, 7), 0);
    assert_eq!(matrix.get(5, 5), 0);
}

#[test]
fn test_class_accuracy_standalone() {
    let records = vec![
        make_record(0, 0, 0.9),
        make_record(0, 1, 0.9),
        make_record(1, 1, 0.9),
    ];
    let engine = AnalyticsEngine::new(&records, 3);

    assert_eq!(engine.class_accuracy(0, RecordFilter::All), 0.5);
    assert_eq!(engine.class_accuracy(1, RecordFilter::All), 1.0);
    // No data reads as 0.0 here
    assert_eq!(engine.class_accuracy(2, RecordFilter::All), 0.0);
    assert_eq!(engine.class_accuracy(9, RecordFilter::All), 0.0);
}

#[test]
fn test_hardest_classes_put_empty_classes_last() {
    // Class 1 has no samples, class 3 is always wrong
    let records = vec![
        make_record(0, 0, 0.9),
        make_record(0, 2, 0.9),
        make_record(2, 2, 0.9),
        make_record(3, 0, 0.9),
    ];
    let engine = AnalyticsEngine::new(&records, 5);

    let ranking = engine.hardest_classes(RecordFilter::All, None);
    let order: Vec<usize> = ranking.iter().map(|s| s.class_index).collect();
    assert_eq!(order, vec![3, 0, 2, 1, 4]);
    assert_eq!(ranking[0].accuracy, 0.0);
    assert_eq!(ranking[3].accuracy, ClassAccuracyStats::NO_SAMPLES);
    assert!(!ranking[4].has_samples());

    let top_two = engine.hardest_classes(RecordFilter::All, Some(2));
    assert_eq!(top_two.len(), 2);
    assert_eq!(top_two[1].error_count, 1);
}

#[test]
fn test_daily_stats_cover_every_day() {
    // 1. Records today and three days ago
    let now = datetime!(2026-06-15 12:00 UTC);
    let records = vec![
        make_record_at(now - Duration::hours(1), 0, 0, 0.8),
        make_record_at(now - Duration::hours(11), 1, 0, 0.4),
        make_record_at(now - Duration::days(3), 2, 2, 0.6),
    ];
    let engine = AnalyticsEngine::new(&records, 3);

    // 2. Exactly seven buckets, oldest first
    let days = engine.daily_stats(7, RecordFilter::All, now);
    assert_eq!(days.len(), 7);
    assert_eq!(days[6].date, now.date());
    assert!(days.windows(2).all(|pair| pair[0].date.next_day() == Some(pair[1].date)));

    // 3. Populated and empty days
    assert_eq!(days[6].detection_count, 2);
    assert_eq!(days[6].accuracy, 0.5);
    assert!((days[6].avg_confidence - 0.6).abs() < 1e-6);
    assert_eq!(days[3].detection_count, 1);
    assert_eq!(days[3].accuracy, 1.0);
    for empty in [0, 1, 2, 4, 5] {
        assert_eq!(days[empty].detection_count, 0);
        assert_eq!(days[empty].accuracy, 0.0);
        assert_eq!(days[empty].avg_confidence, 0.0);
    }
}

#[test]
fn test_daily_error_stats() {
    let now = datetime!(2026-06-15 12:00 UTC);
    let records: Vec<DetectionRecord> = [(0, 1), (1, 1), (2, 0), (2, 2)]
        .into_iter()
        .map(|(truth, predicted)| make_record_at(now, truth, predicted, 0.6))
        .collect();
    let engine = AnalyticsEngine::new(&records, 3);

    let days = engine.daily_error_stats(3, RecordFilter::All, now);
    assert_eq!(days.len(), 3);
    assert_eq!(days[2].detection_count, 4);
    assert_eq!(days[2].error_count, 2);
    assert_eq!(days[2].error_rate, 0.5);
    assert_eq!(days[0].error_count, 0);
    assert_eq!(days[0].error_rate, 0.0);
}

#[test]
fn test_days_follow_requester_offset() {
    // 23:30 UTC on the 10th is already the 11th at +02:00
    let late = DetectionRecord::from_parts(
        datetime!(2026-03-10 23:30 UTC),
        "cat",
        0,
        "cat",
        0,
        0.9,
        vec![1.0],
    );
    let records = vec![late];
    let engine = AnalyticsEngine::new(&records, 1);

    let local = engine.daily_stats(2, RecordFilter::All, datetime!(2026-03-11 10:00 +02:00));
    assert_eq!(local[0].date, date!(2026-03-10));
    assert_eq!(local[0].detection_count, 0);
    assert_eq!(local[1].detection_count, 1);

    let utc = engine.daily_stats(2, RecordFilter::All, datetime!(2026-03-11 10:00 UTC));
    assert_eq!(utc[0].detection_count, 1);
    assert_eq!(utc[1].detection_count, 0);
}

#[test]
fn test_filter_history_combines_dimensions() {
    let records = vec![
        DetectionRecord::from_parts(datetime!(2026-04-03 12:00 UTC), "Dog", 1, "dog", 1, 0.9, vec![]),
        DetectionRecord::from_parts(datetime!(2026-04-02 12:00 UTC), "dog", 1, "cat", 0, 0.6, vec![]),
        DetectionRecord::from_parts(datetime!(2026-04-01 12:00 UTC), "bird", 2, "bird", 2, 0.7, vec![]),
        DetectionRecord::from_parts(datetime!(2026-03-31 12:00 UTC), "", -1, "Dogfish", 0, 0.4, vec![]),
    ];
    let engine = AnalyticsEngine::new(&records, 3);
    let utc = UtcOffset::UTC;

    // 1. No constraints keeps everything, placeholders included
    assert_eq!(engine.filter_history(&HistoryFilter::default(), utc).len(), 4);

    // 2. Search is case-insensitive over both class names
    let filter = HistoryFilter {
        search: Some("DOG".to_string()),
        ..Default::default()
    };
    assert_eq!(engine.filter_history(&filter, utc).len(), 3);

    // 3. Search AND correctness
    let filter = HistoryFilter {
        search: Some("dog".to_string()),
        is_correct: Some(false),
        ..Default::default()
    };
    let found = engine.filter_history(&filter, utc);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].predicted_class(), "cat");

    // 4. Ground-truth class
    let filter = HistoryFilter {
        class_index: Some(1),
        ..Default::default()
    };
    assert_eq!(engine.filter_history(&filter, utc).len(), 2);

    // 5. Inclusive day range
    let filter = HistoryFilter {
        start_date: Some(date!(2026-04-01)),
        end_date: Some(date!(2026-04-02)),
        ..Default::default()
    };
    let found = engine.filter_history(&filter, utc);
    let classes: Vec<&str> = found.iter().map(|r| r.predicted_class()).collect();
    assert_eq!(classes, vec!["cat", "bird"]);
}

#[test]
fn test_filter_history_day_range_uses_offset() {
    let records = vec![DetectionRecord::from_parts(
        datetime!(2026-04-01 22:00 UTC),
        "cat",
        0,
        "cat",
        0,
        0.9,
        vec![],
    )];
    let engine = AnalyticsEngine::new(&records, 1);
    let filter = HistoryFilter {
        start_date: Some(date!(2026-04-02)),
        ..Default::default()
    };

    assert!(engine.filter_history(&filter, UtcOffset::UTC).is_empty());
    let east = UtcOffset::from_hms(3, 0, 0).unwrap();
    assert_eq!(engine.filter_history(&filter, east).len(), 1);
}

#[tokio::test]
async fn test_filter_history_by_verification() -> anyhow::Result<()> {
    // 1. Three dog records, one of them verified
    let (ledger, _temp_dir) = create_test_ledger().await;
    let records = vec![
        make_record_at(SCENARIO_NOW, 1, 1, 0.9),
        make_record_at(SCENARIO_NOW - Duration::hours(1), 1, 0, 0.5),
        make_record_at(SCENARIO_NOW - Duration::hours(2), 2, 2, 0.7),
        make_record_at(SCENARIO_NOW - Duration::hours(3), 0, 1, 0.4),
    ];
    for record in &records {
        ledger.insert_record(record.clone()).await?;
    }
    ledger.verify_record(records[1].id()).await?;
    ledger.verify_record(records[2].id()).await?;
    let stored = ledger.get_records().await?;
    let engine = AnalyticsEngine::new(&stored, 3);

    // 2. Verified AND search keeps exactly the verified dog record
    let filter = HistoryFilter {
        record_filter: RecordFilter::Verified,
        search: Some("dog".to_string()),
        ..Default::default()
    };
    let found = engine.filter_history(&filter, UtcOffset::UTC);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), records[1].id());

    // 3. NotVerified with the same search keeps the other two dog records
    let filter = HistoryFilter {
        record_filter: RecordFilter::NotVerified,
        search: Some("dog".to_string()),
        ..Default::default()
    };
    let ids: Vec<&str> = engine
        .filter_history(&filter, UtcOffset::UTC)
        .into_iter()
        .map(|r| r.id())
        .collect();
    assert_eq!(ids, vec![records[0].id(), records[3].id()]);

    Ok(())
}
