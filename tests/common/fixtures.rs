use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{ImageBuffer, Rgb, RgbImage};
use time::{Duration, OffsetDateTime};
use visiontally::DetectionRecord;
use visiontally::core::db::DetectionLedger;
use visiontally::detection::engine::{BackendLoader, InferenceEngine, ModelAssets, ModelBackend};
use visiontally::detection::preprocessing::InputTensor;

/// Class names used by most tests. The first label carries an index prefix on purpose.
pub const TEST_LABELS: &str = "0 cat\ndog\n\n  bird  \n";

/// Stand-in model that returns fixed scores and remembers the last input it saw.
pub struct FakeBackend {
    pub input_size: (u32, u32),
    pub declared_classes: Option<usize>,
    pub scores: Vec<f32>,
    pub last_input: Arc<std::sync::Mutex<Option<InputTensor>>>,
}

impl ModelBackend for FakeBackend {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn num_classes(&self) -> Option<usize> {
        self.declared_classes
    }

    fn run(&self, input: &InputTensor) -> anyhow::Result<Vec<f32>> {
        *self.last_input.lock().unwrap() = Some(input.clone());
        Ok(self.scores.clone())
    }
}

/// Builds [`FakeBackend`]s and counts how often it was asked to.
#[derive(Clone)]
pub struct FakeLoader {
    pub input_size: (u32, u32),
    pub declared_classes: Option<usize>,
    pub scores: Vec<f32>,
    pub fail: bool,
    pub loads: Arc<AtomicUsize>,
    pub last_input: Arc<std::sync::Mutex<Option<InputTensor>>>,
}

impl FakeLoader {
    pub fn new(input_size: (u32, u32), scores: Vec<f32>) -> Self {
        Self {
            input_size,
            declared_classes: Some(scores.len()),
            scores,
            fail: false,
            loads: Arc::new(AtomicUsize::new(0)),
            last_input: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new((4, 4), vec![0.0; 3])
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<InputTensor> {
        self.last_input.lock().unwrap().clone()
    }
}

impl BackendLoader for FakeLoader {
    fn load(&self, _model_bytes: Vec<u8>) -> anyhow::Result<Box<dyn ModelBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("not a model");
        }
        Ok(Box::new(FakeBackend {
            input_size: self.input_size,
            declared_classes: self.declared_classes,
            scores: self.scores.clone(),
            last_input: self.last_input.clone(),
        }))
    }
}

/// Writes a dummy model file and a label file into a fresh temp directory.
/// Returns the assets and the temp directory (which must be kept alive).
pub fn create_test_assets(labels: &str) -> (ModelAssets, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let model_path = dir.path().join("model.rten");
    let labels_path = dir.path().join("labels.txt");
    std::fs::write(&model_path, b"fake model bytes").expect("Failed to write model");
    std::fs::write(&labels_path, labels).expect("Failed to write labels");
    (
        ModelAssets {
            model_path,
            labels_path,
        },
        dir,
    )
}

/// Engine over [`TEST_LABELS`] whose model always answers `scores`.
pub fn create_test_engine(scores: Vec<f32>) -> (InferenceEngine, FakeLoader, tempfile::TempDir) {
    let (assets, dir) = create_test_assets(TEST_LABELS);
    let loader = FakeLoader::new((4, 4), scores);
    let engine = InferenceEngine::new(assets, Box::new(loader.clone()));
    (engine, loader, dir)
}

/// Creates a ledger backed by a snapshot file in a temp directory.
/// Returns both the ledger and the temp directory (which must be kept alive).
pub async fn create_test_ledger() -> (DetectionLedger, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("ledger.zst");
    let ledger = DetectionLedger::open(&path)
        .await
        .expect("Failed to open test ledger");
    (ledger, dir)
}

/// A solid-colour RGB image.
pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    ImageBuffer::from_fn(width, height, |_, _| Rgb(color))
}

/// PNG bytes of a solid-colour image.
pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let mut bytes = Vec::new();
    solid_image(width, height, color)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes
}

/// Class name for an index in [`TEST_LABELS`].
pub fn class_name(index: i32) -> &'static str {
    match index {
        0 => "cat",
        1 => "dog",
        2 => "bird",
        _ => "",
    }
}

/// A record with the given ground truth and prediction, made at `timestamp`.
pub fn make_record_at(
    timestamp: OffsetDateTime,
    ground_truth_index: i32,
    predicted_index: i32,
    confidence: f32,
) -> DetectionRecord {
    DetectionRecord::from_parts(
        timestamp,
        class_name(ground_truth_index),
        ground_truth_index,
        class_name(predicted_index),
        predicted_index,
        confidence,
        vec![0.1, 0.2, 0.7],
    )
}

/// A record with the given ground truth and prediction, made `age` ago.
pub fn make_record_aged(
    ground_truth_index: i32,
    predicted_index: i32,
    confidence: f32,
    age: Duration,
) -> DetectionRecord {
    make_record_at(
        OffsetDateTime::now_utc() - age,
        ground_truth_index,
        predicted_index,
        confidence,
    )
}

/// A record with the given ground truth and prediction, made now.
pub fn make_record(ground_truth_index: i32, predicted_index: i32, confidence: f32) -> DetectionRecord {
    make_record_aged(ground_truth_index, predicted_index, confidence, Duration::ZERO)
}
