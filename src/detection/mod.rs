pub mod color;
pub mod engine;
pub mod labels;
pub mod preprocessing;
pub mod rten_backend;

use std::sync::{Mutex, MutexGuard};

use image::RgbImage;
use tracing::{debug, warn};

use crate::error::ClassifyError;
use crate::models::ClassificationResult;
use color::RawFrame;
use engine::{InferenceEngine, ModelAssets};
use rten_backend::RtenLoader;

/// Public face of the inference pipeline.
///
/// Both entry points funnel through resize, normalize, infer and top-1. The model is
/// loaded by the first call and reused afterwards.
pub struct ClassificationService {
    engine: Mutex<InferenceEngine>,
}

impl ClassificationService {
    pub fn new(engine: InferenceEngine) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Service over an `.rten` model and its label file.
    pub fn from_assets(assets: ModelAssets) -> Self {
        Self::new(InferenceEngine::new(assets, Box::new(RtenLoader)))
    }

    fn engine(&self) -> Result<MutexGuard<'_, InferenceEngine>, ClassifyError> {
        self.engine
            .lock()
            .map_err(|_| ClassifyError::ModelUnavailable("engine lock poisoned".to_string()))
    }

    /// Decode an encoded still image (PNG, JPEG, ...) and classify it.
    pub fn classify_still(&self, image_bytes: &[u8]) -> Result<ClassificationResult, ClassifyError> {
        let mut engine = self.engine()?;
        engine.load()?;

        let image = image::load_from_memory(image_bytes)
            .inspect_err(|e| warn!("Still image rejected: {}", e))?
            .to_rgb8();
        debug!("Decoded still {}x{}", image.width(), image.height());
        Self::run_pipeline(&engine, &image)
    }

    /// Convert a raw camera frame and classify it. Failures stay with this frame.
    pub fn classify_frame(&self, frame: &RawFrame) -> Result<ClassificationResult, ClassifyError> {
        let mut engine = self.engine()?;
        engine.load()?;

        let image = frame
            .to_rgb()
            .inspect_err(|e| warn!("Frame {}x{} rejected: {}", frame.width, frame.height, e))?;
        Self::run_pipeline(&engine, &image)
    }

    /// Classify an RGB raster that is already in memory.
    pub fn classify_image(&self, image: &RgbImage) -> Result<ClassificationResult, ClassifyError> {
        let mut engine = self.engine()?;
        engine.load()?;
        Self::run_pipeline(&engine, image)
    }

    fn run_pipeline(
        engine: &InferenceEngine,
        image: &RgbImage,
    ) -> Result<ClassificationResult, ClassifyError> {
        let tensor = engine.preprocessor()?.process(image);
        let result = engine
            .classify(&tensor)
            .inspect_err(|e| warn!("Inference failed: {}", e))?;
        debug!(
            "Top-1: {} (#{}) at {:.4}",
            result.label, result.index, result.confidence
        );
        Ok(result)
    }

    /// Load eagerly instead of on the first classification.
    pub fn warm_up(&self) -> Result<(), ClassifyError> {
        self.engine()?.load()
    }

    pub fn labels(&self) -> Option<Vec<String>> {
        self.engine().ok()?.labels().map(<[String]>::to_vec)
    }

    pub fn is_ready(&self) -> bool {
        self.engine().map(|engine| engine.is_ready()).unwrap_or(false)
    }

    /// Release the model. The next classification loads it again.
    pub fn dispose(&self) {
        if let Ok(mut engine) = self.engine() {
            engine.dispose();
        }
    }
}
