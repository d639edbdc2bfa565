use image::imageops::{self, FilterType};
use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// Resampling filter used for every resize. Bilinear, applied once, no crop or letterbox.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Dense NHWC float tensor shaped `[1, height, width, 3]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }
}

/// Turns RGB rasters into model input tensors at a fixed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorPreprocessor {
    height: u32,
    width: u32,
}

impl TensorPreprocessor {
    /// `height` and `width` come from the loaded model, never from configuration.
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Stretch `image` to the model resolution and rescale every channel to `[0, 1]`.
    pub fn process(&self, image: &RgbImage) -> InputTensor {
        let resized = resize_exact(image, self.width, self.height);
        normalize(&resized)
    }
}

/// Resize ignoring aspect ratio; non-square sources are stretched.
pub fn resize_exact(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, RESIZE_FILTER)
}

/// Divide each channel by 255 and lay the result out as `[1, H, W, 3]`.
pub fn normalize(image: &RgbImage) -> InputTensor {
    let (width, height) = image.dimensions();
    let data = image
        .as_raw()
        .iter()
        .map(|&value| value as f32 / 255.0)
        .collect();

    InputTensor {
        shape: [1, height as usize, width as usize, RGB_CHANNELS],
        data,
    }
}
