use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use crate::detection::labels::{clean_label, read_labels};
use crate::detection::preprocessing::{InputTensor, TensorPreprocessor};
use crate::error::ClassifyError;
use crate::models::ClassificationResult;

/// A loaded model that maps an NHWC tensor to per-class scores.
pub trait ModelBackend: Send {
    /// Input resolution as `(height, width)`.
    fn input_size(&self) -> (u32, u32);

    /// Number of classes in the output vector, when the model declares it.
    fn num_classes(&self) -> Option<usize>;

    fn run(&self, input: &InputTensor) -> anyhow::Result<Vec<f32>>;
}

/// Builds a [`ModelBackend`] from the raw bytes of a model artifact.
pub trait BackendLoader: Send + Sync {
    fn load(&self, model_bytes: Vec<u8>) -> anyhow::Result<Box<dyn ModelBackend>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
}

/// Location of the model artifact and its label file.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
}

struct LoadedModel {
    backend: Box<dyn ModelBackend>,
    labels: Arc<[String]>,
    preprocessor: TensorPreprocessor,
    num_classes: usize,
}

/// Owns the model and label list. `Unloaded -> Loading -> Ready`, back to `Unloaded` only
/// through [`InferenceEngine::dispose`].
pub struct InferenceEngine {
    assets: ModelAssets,
    loader: Box<dyn BackendLoader>,
    state: EngineState,
    loaded: Option<LoadedModel>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("assets", &self.assets)
            .field("state", &self.state)
            .finish()
    }
}

impl InferenceEngine {
    pub fn new(assets: ModelAssets, loader: Box<dyn BackendLoader>) -> Self {
        Self {
            assets,
            loader,
            state: EngineState::Unloaded,
            loaded: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// Load model and labels once. Calling again while ready does nothing.
    pub fn load(&mut self) -> Result<(), ClassifyError> {
        if self.state == EngineState::Ready {
            return Ok(());
        }

        self.state = EngineState::Loading;
        match self.read_assets() {
            Ok(loaded) => {
                info!(
                    "Model ready: input {}x{}, {} classes, {} labels",
                    loaded.preprocessor.input_size().1,
                    loaded.preprocessor.input_size().0,
                    loaded.num_classes,
                    loaded.labels.len()
                );
                self.loaded = Some(loaded);
                self.state = EngineState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("Failed to load model: {:#}", e);
                self.state = EngineState::Unloaded;
                Err(ClassifyError::ModelUnavailable(format!("{:#}", e)))
            }
        }
    }

    fn read_assets(&self) -> anyhow::Result<LoadedModel> {
        let model_path = &self.assets.model_path;
        info!("Loading model {:?}", model_path);
        let model_bytes = std::fs::read(model_path)
            .with_context(|| format!("Failed to read model {:?}", model_path))?;
        debug!(
            "Model size: {:.2} MB",
            model_bytes.len() as f64 / (1024.0 * 1024.0)
        );
        let backend = self.loader.load(model_bytes)?;

        let labels: Arc<[String]> = read_labels(&self.assets.labels_path)?
            .iter()
            .map(|label| clean_label(label))
            .collect();
        debug!("Read {} labels from {:?}", labels.len(), self.assets.labels_path);

        let num_classes = match backend.num_classes() {
            Some(declared) => {
                if declared != labels.len() {
                    warn!(
                        "Model declares {} classes but label file has {}; unmatched indices read as Unknown",
                        declared,
                        labels.len()
                    );
                }
                declared
            }
            None => labels.len(),
        };

        let (height, width) = backend.input_size();
        anyhow::ensure!(
            height > 0 && width > 0,
            "model reports an empty input resolution {}x{}",
            width,
            height
        );

        Ok(LoadedModel {
            backend,
            labels,
            preprocessor: TensorPreprocessor::new(height, width),
            num_classes,
        })
    }

    /// Release the model. Inference is rejected until the next [`InferenceEngine::load`].
    pub fn dispose(&mut self) {
        if self.loaded.take().is_some() {
            info!("Model released");
        }
        self.state = EngineState::Unloaded;
    }

    fn ready(&self) -> Result<&LoadedModel, ClassifyError> {
        match (&self.state, &self.loaded) {
            (EngineState::Ready, Some(loaded)) => Ok(loaded),
            _ => Err(ClassifyError::ModelUnavailable(
                "model is not loaded".to_string(),
            )),
        }
    }

    pub fn labels(&self) -> Option<&[String]> {
        self.loaded.as_ref().map(|loaded| &*loaded.labels)
    }

    pub fn num_classes(&self) -> Option<usize> {
        self.loaded.as_ref().map(|loaded| loaded.num_classes)
    }

    /// Model input resolution as `(height, width)`.
    pub fn input_size(&self) -> Option<(u32, u32)> {
        self.loaded
            .as_ref()
            .map(|loaded| loaded.preprocessor.input_size())
    }

    pub fn preprocessor(&self) -> Result<TensorPreprocessor, ClassifyError> {
        Ok(self.ready()?.preprocessor)
    }

    /// Run the model, returning one score per declared class.
    pub fn run(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifyError> {
        let loaded = self.ready()?;

        let (height, width) = loaded.preprocessor.input_size();
        let expected = [1, height as usize, width as usize, 3];
        if input.shape != expected {
            return Err(ClassifyError::Inference(format!(
                "input shape {:?} does not match model input {:?}",
                input.shape, expected
            )));
        }

        let scores = loaded
            .backend
            .run(input)
            .map_err(|e| ClassifyError::Inference(format!("{:#}", e)))?;

        if scores.len() != loaded.num_classes {
            return Err(ClassifyError::Inference(format!(
                "model produced {} scores, expected {}",
                scores.len(),
                loaded.num_classes
            )));
        }
        Ok(scores)
    }

    /// Run the model and pick the top-1 class.
    pub fn classify(&self, input: &InputTensor) -> Result<ClassificationResult, ClassifyError> {
        let scores = self.run(input)?;
        let index = top_one(&scores)
            .ok_or_else(|| ClassifyError::Inference("model produced no scores".to_string()))?;
        let labels = self.ready()?.labels.clone();
        Ok(ClassificationResult::new(index, scores, labels))
    }
}

/// Index of the highest score. Ties go to the first occurrence; NaN never wins.
pub fn top_one(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}
