use rten::{Dimension, Model};
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};
use tracing::debug;

use crate::detection::engine::{BackendLoader, ModelBackend};
use crate::detection::preprocessing::InputTensor;

/// Classifier backed by an `.rten` model taking `[1, H, W, 3]` and returning `[1, C]`.
pub struct RtenClassifier {
    model: Model,
    input_height: u32,
    input_width: u32,
    num_classes: Option<usize>,
}

impl RtenClassifier {
    pub fn from_bytes(model_bytes: Vec<u8>) -> anyhow::Result<Self> {
        let model = Model::load(model_bytes)?;

        let input_id = *model
            .input_ids()
            .first()
            .ok_or_else(|| anyhow::anyhow!("model has no inputs"))?;
        let input_shape = model
            .node_info(input_id)
            .and_then(|info| info.shape())
            .ok_or_else(|| anyhow::anyhow!("model does not declare an input shape"))?;
        let dims = fixed_dims(&input_shape);
        debug!("Model input shape: {:?}", dims);

        let (input_height, input_width) = match dims.as_slice() {
            [_, Some(h), Some(w), Some(3)] => (*h as u32, *w as u32),
            _ => anyhow::bail!(
                "expected NHWC input [1, H, W, 3] with fixed H and W, got {:?}",
                dims
            ),
        };

        let num_classes = model
            .output_ids()
            .first()
            .and_then(|&id| model.node_info(id))
            .and_then(|info| info.shape())
            .and_then(|shape| fixed_dims(&shape).last().copied().flatten());
        debug!("Model output classes: {:?}", num_classes);

        Ok(Self {
            model,
            input_height,
            input_width,
            num_classes,
        })
    }
}

fn fixed_dims(shape: &[Dimension]) -> Vec<Option<usize>> {
    shape
        .iter()
        .map(|dim| match dim {
            Dimension::Fixed(size) => Some(*size),
            Dimension::Symbolic(_) => None,
        })
        .collect()
}

impl ModelBackend for RtenClassifier {
    fn input_size(&self) -> (u32, u32) {
        (self.input_height, self.input_width)
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn run(&self, input: &InputTensor) -> anyhow::Result<Vec<f32>> {
        let tensor = NdTensor::from_data(input.shape, input.data.clone());
        let output = self.model.run_one(tensor.view().into(), None)?;
        let scores: Tensor<f32> = output
            .try_into()
            .map_err(|e| anyhow::anyhow!("model output is not f32: {:?}", e))?;
        Ok(scores.to_vec())
    }
}

/// Default loader for `.rten` artifacts.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtenLoader;

impl BackendLoader for RtenLoader {
    fn load(&self, model_bytes: Vec<u8>) -> anyhow::Result<Box<dyn ModelBackend>> {
        Ok(Box::new(RtenClassifier::from_bytes(model_bytes)?))
    }
}
