use image::{Rgb, RgbImage};

use crate::error::ClassifyError;

/// Pixel layout of a raw camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameFormat {
    /// Tri-planar Y, U, V with chroma subsampled 2x2.
    Yuv420,
    /// Single interleaved plane, 4 bytes per pixel in B, G, R, A order.
    Bgra8888,
    /// Anything the device reported that we do not convert.
    Unsupported(String),
}

impl FrameFormat {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "yuv420" | "yuv_420_888" | "i420" => FrameFormat::Yuv420,
            "bgra8888" | "bgra" => FrameFormat::Bgra8888,
            other => FrameFormat::Unsupported(other.to_string()),
        }
    }
}

/// One plane of a raw frame, borrowed from the capture buffer.
#[derive(Debug, Clone, Copy)]
pub struct FramePlane<'a> {
    pub bytes: &'a [u8],
    pub bytes_per_row: usize,
    pub bytes_per_pixel: usize,
}

impl<'a> FramePlane<'a> {
    pub fn new(bytes: &'a [u8], bytes_per_row: usize, bytes_per_pixel: usize) -> Self {
        Self {
            bytes,
            bytes_per_row,
            bytes_per_pixel,
        }
    }

    /// Smallest buffer that can address `cols` x `rows` samples with this plane's strides.
    fn required_len(&self, cols: usize, rows: usize) -> usize {
        if cols == 0 || rows == 0 {
            return 0;
        }
        (rows - 1) * self.bytes_per_row + (cols - 1) * self.bytes_per_pixel + 1
    }

    fn check(&self, name: &str, cols: usize, rows: usize) -> Result<(), ClassifyError> {
        let required = self.required_len(cols, rows);
        if self.bytes.len() < required {
            return Err(ClassifyError::MalformedFrame(format!(
                "{} plane holds {} bytes, {} needed for {}x{} samples",
                name,
                self.bytes.len(),
                required,
                cols,
                rows
            )));
        }
        Ok(())
    }
}

/// A raw frame as delivered by the camera stack.
#[derive(Debug, Clone)]
pub struct RawFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub planes: Vec<FramePlane<'a>>,
}

impl RawFrame<'_> {
    /// Convert into an RGB raster of the same size.
    pub fn to_rgb(&self) -> Result<RgbImage, ClassifyError> {
        if self.width == 0 || self.height == 0 {
            return Err(ClassifyError::MalformedFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        match &self.format {
            FrameFormat::Yuv420 => yuv420_to_rgb(self),
            FrameFormat::Bgra8888 => bgra8888_to_rgb(self),
            FrameFormat::Unsupported(name) => Err(ClassifyError::UnsupportedFrame(name.clone())),
        }
    }
}

/// Standard YCbCr to RGB transform, each channel rounded and clamped.
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344136 * u - 0.714136 * v;
    let b = y + 1.772 * u;

    Rgb([clamp_channel(r), clamp_channel(g), clamp_channel(b)])
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn yuv420_to_rgb(frame: &RawFrame) -> Result<RgbImage, ClassifyError> {
    let [y_plane, u_plane, v_plane] = frame.planes.as_slice() else {
        return Err(ClassifyError::MalformedFrame(format!(
            "yuv420 frame needs 3 planes, got {}",
            frame.planes.len()
        )));
    };

    let width = frame.width as usize;
    let height = frame.height as usize;
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);

    y_plane.check("Y", width, height)?;
    u_plane.check("U", chroma_w, chroma_h)?;
    v_plane.check("V", chroma_w, chroma_h)?;

    // U and V may differ in stride
    let image = RgbImage::from_fn(frame.width, frame.height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let luma = y_plane.bytes[y * y_plane.bytes_per_row + x * y_plane.bytes_per_pixel];
        let (cx, cy) = (x / 2, y / 2);
        let u = u_plane.bytes[cy * u_plane.bytes_per_row + cx * u_plane.bytes_per_pixel];
        let v = v_plane.bytes[cy * v_plane.bytes_per_row + cx * v_plane.bytes_per_pixel];
        yuv_to_rgb(luma, u, v)
    });

    Ok(image)
}

fn bgra8888_to_rgb(frame: &RawFrame) -> Result<RgbImage, ClassifyError> {
    let [plane] = frame.planes.as_slice() else {
        return Err(ClassifyError::MalformedFrame(format!(
            "bgra8888 frame needs 1 plane, got {}",
            frame.planes.len()
        )));
    };
    if plane.bytes_per_pixel < 4 {
        return Err(ClassifyError::MalformedFrame(format!(
            "bgra8888 pixel stride {} is below 4 bytes",
            plane.bytes_per_pixel
        )));
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    // Last pixel reads 4 bytes, not 1
    let required = plane.required_len(width, height) + 3;
    if plane.bytes.len() < required {
        return Err(ClassifyError::MalformedFrame(format!(
            "bgra8888 plane holds {} bytes, {} needed",
            plane.bytes.len(),
            required
        )));
    }

    let image = RgbImage::from_fn(frame.width, frame.height, |x, y| {
        let offset = y as usize * plane.bytes_per_row + x as usize * plane.bytes_per_pixel;
        let px = &plane.bytes[offset..offset + 4];
        Rgb([px[2], px[1], px[0]])
    });

    Ok(image)
}
