use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use time::{Date, macros::format_description};
use tracing::Level;

use visiontally::core::analytics::{self, AnalyticsEngine};
use visiontally::detection::color::{FrameFormat, FramePlane, RawFrame};
use visiontally::detection::labels::{clean_label, read_labels, resolve_class};
use visiontally::{
    AppConfig, ClassificationResult, ClassificationService, DetectionLedger, DetectionRecord,
    DetectionRepository, HistoryFilter, RecordFilter,
};

#[derive(Parser)]
#[command(name = "visiontally")]
#[command(about = "Classify images on-device and track prediction accuracy over time")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding model.rten, labels.txt and ledger.zst
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Model file (overrides the data directory)
    #[arg(long, value_name = "FILE", global = true)]
    model: Option<PathBuf>,

    /// Label file (overrides the data directory)
    #[arg(long, value_name = "FILE", global = true)]
    labels: Option<PathBuf>,

    /// Ledger snapshot (overrides the data directory)
    #[arg(long, value_name = "FILE", global = true)]
    ledger: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a still image (PNG, JPEG, ...)
    Classify {
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Record the outcome with this ground truth (class index or name)
        #[arg(long, value_name = "CLASS")]
        truth: Option<String>,

        /// Record the outcome without a ground truth
        #[arg(long, conflicts_with = "truth")]
        save: bool,

        /// Show the best N classes
        #[arg(long, default_value_t = 1)]
        top: usize,
    },
    /// Classify a raw camera frame dump
    Frame {
        #[arg(value_name = "FILE")]
        frame_path: PathBuf,

        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        /// Pixel layout: i420 (planar 4:2:0) or bgra
        #[arg(long, default_value = "i420")]
        format: String,

        /// Record the outcome with this ground truth (class index or name)
        #[arg(long, value_name = "CLASS")]
        truth: Option<String>,
    },
    /// List recorded detections, newest first
    History {
        #[command(flatten)]
        filter: HistoryArgs,

        #[arg(long)]
        limit: Option<usize>,
    },
    /// Overall accuracy figures
    Stats {
        #[arg(long, value_enum, default_value_t = Verification::All)]
        records: Verification,
    },
    /// Actual-vs-predicted count table
    Confusion {
        #[arg(long, value_enum, default_value_t = Verification::All)]
        records: Verification,
    },
    /// Per-day rollup of the trailing N days
    Daily {
        #[arg(long, default_value_t = 7)]
        days: usize,

        /// Report error counts and rates instead of accuracy
        #[arg(long)]
        errors: bool,

        #[arg(long, value_enum, default_value_t = Verification::All)]
        records: Verification,
    },
    /// Classes with the lowest accuracy
    Hardest {
        #[arg(long, default_value_t = 5)]
        limit: usize,

        #[arg(long, value_enum, default_value_t = Verification::All)]
        records: Verification,
    },
    /// Mark a record as verified
    Verify { id: String },
    /// Delete one or more records
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Export records as JSON or CSV
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        filter: HistoryArgs,
    },
    /// Delete every record
    Reset {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Verification {
    All,
    Verified,
    Unverified,
}

impl From<Verification> for RecordFilter {
    fn from(value: Verification) -> Self {
        match value {
            Verification::All => RecordFilter::All,
            Verification::Verified => RecordFilter::Verified,
            Verification::Unverified => RecordFilter::NotVerified,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

#[derive(Args)]
struct HistoryArgs {
    #[arg(long, value_enum, default_value_t = Verification::All)]
    records: Verification,

    /// Ground-truth class (index or name)
    #[arg(long, value_name = "CLASS")]
    class: Option<String>,

    /// Only correct predictions
    #[arg(long, conflicts_with = "incorrect")]
    correct: bool,

    /// Only wrong predictions
    #[arg(long)]
    incorrect: bool,

    /// Case-insensitive class name substring
    #[arg(long)]
    search: Option<String>,

    /// First day, YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    from: Option<Date>,

    /// Last day, YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    to: Option<Date>,
}

fn parse_date(text: &str) -> Result<Date, String> {
    Date::parse(text, format_description!("[year]-[month]-[day]")).map_err(|e| e.to_string())
}

impl HistoryArgs {
    fn to_filter(&self, class_names: &[String]) -> anyhow::Result<HistoryFilter> {
        let class_index = match &self.class {
            Some(reference) => {
                let (index, _) = resolve_class(class_names, reference)
                    .with_context(|| format!("Unknown class {:?}", reference))?;
                Some(index as i32)
            }
            None => None,
        };
        let is_correct = match (self.correct, self.incorrect) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Ok(HistoryFilter {
            record_filter: self.records.into(),
            class_index,
            is_correct,
            search: self.search.clone(),
            start_date: self.from,
            end_date: self.to,
        })
    }
}

fn load_class_names(config: &AppConfig) -> anyhow::Result<Vec<String>> {
    Ok(read_labels(&config.labels_path)?
        .iter()
        .map(|label| clean_label(label))
        .collect())
}

fn print_result(result: &ClassificationResult, top: usize) {
    println!(
        "{} (#{}) - confidence: {:.2}",
        result.label, result.index, result.confidence
    );
    if top > 1 {
        for (rank, prediction) in result.top_k(top).iter().enumerate() {
            println!(
                "  {}. {} (#{}) {:.4}",
                rank + 1,
                prediction.label,
                prediction.index,
                prediction.score
            );
        }
    }
}

/// Store `result` with the user's ground truth, or as a placeholder when `truth` is `None`.
async fn record_result(
    ledger: &DetectionLedger,
    service: &ClassificationService,
    result: &ClassificationResult,
    truth: Option<&str>,
) -> anyhow::Result<()> {
    let record = match truth {
        Some(reference) => {
            let labels = service.labels().unwrap_or_default();
            let (index, name) = resolve_class(&labels, reference)
                .with_context(|| format!("Unknown class {:?}", reference))?;
            DetectionRecord::new(result, name, index as i32)
        }
        None => DetectionRecord::placeholder(result),
    };
    ledger.insert_record(record.clone()).await?;
    let verdict = if !record.has_ground_truth() {
        "unlabelled"
    } else if record.is_correct() {
        "correct"
    } else {
        "incorrect"
    };
    println!("Recorded {} ({})", record.id(), verdict);
    Ok(())
}

/// Split a raw dump into planes for `format`.
fn frame_planes<'a>(
    bytes: &'a [u8],
    width: u32,
    height: u32,
    format: &FrameFormat,
) -> anyhow::Result<Vec<FramePlane<'a>>> {
    let (width, height) = (width as usize, height as usize);
    match format {
        FrameFormat::Yuv420 => {
            let (chroma_w, chroma_h) = (width.div_ceil(2), height.div_ceil(2));
            let luma_len = width * height;
            let chroma_len = chroma_w * chroma_h;
            anyhow::ensure!(
                bytes.len() >= luma_len + 2 * chroma_len,
                "I420 frame needs {} bytes, file has {}",
                luma_len + 2 * chroma_len,
                bytes.len()
            );
            let (y, rest) = bytes.split_at(luma_len);
            let (u, v) = rest.split_at(chroma_len);
            Ok(vec![
                FramePlane::new(y, width, 1),
                FramePlane::new(u, chroma_w, 1),
                FramePlane::new(&v[..chroma_len], chroma_w, 1),
            ])
        }
        _ => Ok(vec![FramePlane::new(bytes, width * 4, 4)]),
    }
}

fn print_records(records: &[&DetectionRecord]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }
    for record in records {
        let truth = if record.has_ground_truth() {
            record.ground_truth_class()
        } else {
            "-"
        };
        println!(
            "{}  {}  truth: {:<20} predicted: {:<20} {:.2}{}",
            record.id(),
            analytics::date_key(record.timestamp().to_offset(analytics::local_now().offset()).date()),
            truth,
            record.predicted_class(),
            record.confidence(),
            if record.is_verified() { "  [verified]" } else { "" }
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    let config = AppConfig::resolve(args.data_dir, args.model, args.labels, args.ledger)?;
    let ledger = DetectionLedger::new(&config.ledger_path);

    match args.command {
        Command::Classify {
            image_path,
            truth,
            save,
            top,
        } => {
            let service = ClassificationService::from_assets(config.model_assets());
            let bytes = std::fs::read(&image_path)
                .with_context(|| format!("Failed to read image {:?}", image_path))?;
            let result = service.classify_still(&bytes)?;
            print_result(&result, top);
            if truth.is_some() || save {
                record_result(&ledger, &service, &result, truth.as_deref()).await?;
            }
        }
        Command::Frame {
            frame_path,
            width,
            height,
            format,
            truth,
        } => {
            let service = ClassificationService::from_assets(config.model_assets());
            let bytes = std::fs::read(&frame_path)
                .with_context(|| format!("Failed to read frame {:?}", frame_path))?;
            let format = FrameFormat::from_name(&format);
            let planes = frame_planes(&bytes, width, height, &format)?;
            let frame = RawFrame {
                width,
                height,
                format,
                planes,
            };
            let result = service.classify_frame(&frame)?;
            print_result(&result, 1);
            if truth.is_some() {
                record_result(&ledger, &service, &result, truth.as_deref()).await?;
            }
        }
        Command::History { filter, limit } => {
            let class_names = if filter.class.is_some() {
                load_class_names(&config)?
            } else {
                Vec::new()
            };
            let filter = filter.to_filter(&class_names)?;
            let records = ledger.get_records().await?;
            let engine = AnalyticsEngine::new(&records, class_names.len());
            let mut matches = engine.filter_history(&filter, analytics::local_now().offset());
            if let Some(limit) = limit {
                matches.truncate(limit);
            }
            print_records(&matches);
        }
        Command::Stats { records: which } => {
            let records = ledger.get_records().await?;
            let class_names = load_class_names(&config)?;
            let engine = AnalyticsEngine::new(&records, class_names.len());
            let summary = engine.summary(which.into());

            println!("\n=== Detection Statistics ===");
            println!("Total scored:      {}", summary.total);
            println!("Correct:           {}", summary.correct);
            println!("Incorrect:         {}", summary.incorrect);
            println!("Accuracy:          {:.2}%", summary.accuracy * 100.0);
            println!("Error rate:        {:.2}%", summary.error_rate * 100.0);
            println!("Verified:          {:.2}%", summary.verification_rate * 100.0);
            println!("Avg confidence:    {:.4}", summary.avg_confidence);

            let distribution = engine.class_distribution(which.into());
            if distribution.iter().any(|&count| count > 0) {
                println!("\nSamples per class:");
                for (index, count) in distribution.iter().enumerate().filter(|(_, c)| **c > 0) {
                    println!("  {:<24} {}", class_names[index], count);
                }
            }
        }
        Command::Confusion { records: which } => {
            let records = ledger.get_records().await?;
            let class_names = load_class_names(&config)?;
            let engine = AnalyticsEngine::new(&records, class_names.len());
            let matrix = engine.confusion_matrix(which.into());

            println!("actual \\ predicted: {}", class_names.join(", "));
            for (index, row) in matrix.rows().iter().enumerate() {
                let cells: Vec<String> = row.iter().map(usize::to_string).collect();
                println!("  {:<24} {}", class_names[index], cells.join(" "));
            }
        }
        Command::Daily {
            days,
            errors,
            records: which,
        } => {
            let records = ledger.get_records().await?;
            let engine = AnalyticsEngine::new(&records, 0);
            let now = analytics::local_now();
            if errors {
                for day in engine.daily_error_stats(days, which.into(), now) {
                    println!(
                        "{}  {:>4} detections  {:>4} errors  {:.2}%",
                        analytics::date_key(day.date),
                        day.detection_count,
                        day.error_count,
                        day.error_rate * 100.0
                    );
                }
            } else {
                for day in engine.daily_stats(days, which.into(), now) {
                    println!(
                        "{}  {:>4} detections  {:.2}% accurate  avg confidence {:.4}",
                        analytics::date_key(day.date),
                        day.detection_count,
                        day.accuracy * 100.0,
                        day.avg_confidence
                    );
                }
            }
        }
        Command::Hardest {
            limit,
            records: which,
        } => {
            let records = ledger.get_records().await?;
            let class_names = load_class_names(&config)?;
            let engine = AnalyticsEngine::new(&records, class_names.len());
            for stats in engine.hardest_classes(which.into(), Some(limit)) {
                let name = &class_names[stats.class_index];
                if stats.has_samples() {
                    println!(
                        "  {:<24} {:.2}% ({} of {} wrong)",
                        name,
                        stats.accuracy * 100.0,
                        stats.error_count,
                        stats.sample_count
                    );
                } else {
                    println!("  {:<24} no samples", name);
                }
            }
        }
        Command::Verify { id } => {
            if ledger.verify_record(&id).await? {
                println!("Verified {}", id);
            } else {
                anyhow::bail!("No record with id {}", id);
            }
        }
        Command::Delete { ids } => {
            let removed = ledger.delete_records(&ids).await?;
            println!("Deleted {} of {} records", removed, ids.len());
        }
        Command::Export {
            format,
            output,
            filter,
        } => {
            let class_names = if filter.class.is_some() {
                load_class_names(&config)?
            } else {
                Vec::new()
            };
            let filter = filter.to_filter(&class_names)?;
            let records = ledger.get_records().await?;
            let engine = AnalyticsEngine::new(&records, class_names.len());
            let now = analytics::local_now();
            let selected = engine.filter_history(&filter, now.offset());

            let document = match format {
                ExportFormat::Json => analytics::export_json(&selected, now)?,
                ExportFormat::Csv => analytics::export_csv(&selected)?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, document)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Exported {} records to {:?}", selected.len(), path);
                }
                None => print!("{}", document),
            }
        }
        Command::Reset { yes } => {
            anyhow::ensure!(yes, "Refusing to delete every record without --yes");
            ledger.clear_records().await?;
            println!("Ledger cleared");
        }
    }

    Ok(())
}
