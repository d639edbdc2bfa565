use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::models::DetectionRecord;

pub const CSV_HEADER: &str =
    "ID,Timestamp,Ground Truth,Ground Truth Index,Predicted,Predicted Index,Correct,Confidence,Verified";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    #[serde(with = "time::serde::rfc3339")]
    export_date: OffsetDateTime,
    total_records: usize,
    records: &'a [&'a DetectionRecord],
}

/// Pretty-printed JSON document carrying every field of every record.
pub fn export_json(
    records: &[&DetectionRecord],
    exported_at: OffsetDateTime,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ExportDocument {
        export_date: exported_at,
        total_records: records.len(),
        records,
    })
}

/// One header row and one row per record. Class names are quoted; confidence has 4 decimals.
pub fn export_csv(records: &[&DetectionRecord]) -> Result<String, time::error::Format> {
    let mut csv = String::with_capacity(CSV_HEADER.len() + 1 + records.len() * 96);
    csv.push_str(CSV_HEADER);
    csv.push('\n');
    for record in records {
        let row = [
            record.id().to_string(),
            record.timestamp().format(&Rfc3339)?,
            quote(record.ground_truth_class()),
            record.ground_truth_index().to_string(),
            quote(record.predicted_class()),
            record.predicted_index().to_string(),
            record.is_correct().to_string(),
            format!("{:.4}", record.confidence()),
            record.is_verified().to_string(),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    Ok(csv)
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
