use idscan_core::Rect;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Side of the smoothing kernel applied before thresholding.
pub const SMOOTH_KERNEL: usize = 5;
/// Side of the neighbourhood the adaptive threshold averages over.
pub const THRESHOLD_BLOCK: usize = 11;
/// Constant subtracted from the local mean.
pub const THRESHOLD_BIAS: i32 = 2;

const WHITE: u8 = 255;
const BLACK: u8 = 0;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Region has zero area ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },
    #[error("Region {rect} lies outside the {frame_width}x{frame_height} frame")]
    RegionOutOfBounds { rect: Rect, frame_width: u32, frame_height: u32 },
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Color sub-image cut from a captured frame. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelRegion(RgbImage);

impl PixelRegion {
    pub fn new(image: RgbImage) -> Result<Self, PreprocessError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PreprocessError::EmptyRegion { width, height });
        }
        Ok(Self(image))
    }

    /// Crops `rect` out of `frame`.
    pub fn from_frame(frame: &RgbImage, rect: Rect) -> Result<Self, PreprocessError> {
        if rect.is_empty() {
            return Err(PreprocessError::EmptyRegion { width: rect.width, height: rect.height });
        }
        let (frame_width, frame_height) = frame.dimensions();
        if !rect.fits_within(frame_width, frame_height) {
            return Err(PreprocessError::RegionOutOfBounds { rect, frame_width, frame_height });
        }
        let cropped = image::imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
        Self::new(cropped)
    }

    /// Decodes an encoded image (JPEG / PNG / …) as a whole-frame region.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PreprocessError> {
        Self::new(image::load_from_memory(data)?.to_rgb8())
    }

    pub fn open(path: &Path) -> Result<Self, PreprocessError> {
        Self::new(image::open(path)?.to_rgb8())
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.0
    }

    pub fn into_rgb(self) -> RgbImage {
        self.0
    }
}

/// Single-channel image whose pixels are either 0 or 255.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryImage(GrayImage);

impl BinaryImage {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, PreprocessError> {
        let mut buf = Vec::new();
        self.0
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| PreprocessError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// Grayscale → 5×5 Gaussian smoothing → 11×11 Gaussian adaptive threshold →
/// 2×2 closing.
pub fn binarize(region: &PixelRegion) -> BinaryImage {
    debug!(width = region.width(), height = region.height(), "Binarizing region");
    let gray = to_grayscale(region.as_rgb());
    let smoothed = gaussian_smooth(&gray, SMOOTH_KERNEL, Border::Reflect101);
    let thresholded = adaptive_threshold(&smoothed, THRESHOLD_BLOCK, THRESHOLD_BIAS);
    BinaryImage(close_2x2(&thresholded))
}

/// Rec.601 luma in 14-bit fixed point: `0.299 R + 0.587 G + 0.114 B`, rounded.
pub fn to_grayscale(rgb: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;
    ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (r as u32 * R + g as u32 * G + b as u32 * B + (1 << (SHIFT - 1))) >> SHIFT;
        Luma([luma as u8])
    })
}

/// How samples outside the image are synthesized during convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// `dcb|abcd|cba`, the edge pixel is not repeated.
    Reflect101,
    /// `aaa|abcd|ddd`
    Replicate,
}

impl Border {
    fn index(self, i: isize, n: usize) -> usize {
        let last = n as isize - 1;
        match self {
            Border::Replicate => i.clamp(0, last) as usize,
            Border::Reflect101 => {
                if n == 1 {
                    return 0;
                }
                let period = 2 * last;
                let i = i.rem_euclid(period);
                (if i > last { period - i } else { i }) as usize
            }
        }
    }
}

/// Normalized 1-D Gaussian weights for an odd `size`, with the standard
/// deviation derived from the size: `0.3 * ((size - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Separable Gaussian filter; returns unrounded intensities.
fn gaussian_filter(gray: &GrayImage, size: usize, border: Border) -> Vec<f32> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let kernel = gaussian_kernel(size);
    let radius = (size / 2) as isize;
    let src: Vec<f32> = gray.as_raw().iter().map(|&v| v as f32).collect();

    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            horizontal[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * row[border.index(x as isize + k as isize - radius, w)])
                .sum();
        }
    }

    let mut out = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            out[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    weight * horizontal[border.index(y as isize + k as isize - radius, h) * w + x]
                })
                .sum();
        }
    }
    out
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

pub fn gaussian_smooth(gray: &GrayImage, size: usize, border: Border) -> GrayImage {
    let filtered = gaussian_filter(gray, size, border);
    let raw: Vec<u8> = filtered.into_iter().map(to_u8).collect();
    // Same dimensions as the source, so the buffer length always matches.
    ImageBuffer::from_raw(gray.width(), gray.height(), raw).unwrap_or_else(|| gray.clone())
}

/// Each pixel becomes white when it is brighter than the Gaussian-weighted
/// mean of its `block`×`block` neighbourhood minus `bias`, black otherwise.
pub fn adaptive_threshold(gray: &GrayImage, block: usize, bias: i32) -> GrayImage {
    let mean = gaussian_smooth(gray, block, Border::Replicate);
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let src = gray.get_pixel(x, y)[0] as i32;
        let local = mean.get_pixel(x, y)[0] as i32;
        Luma([if src - local > -bias { WHITE } else { BLACK }])
    })
}

/// Morphological closing with a 2×2 square: dilation followed by erosion.
/// Neighbours outside the image are ignored.
pub fn close_2x2(binary: &GrayImage) -> GrayImage {
    // Opposite offsets for the two passes so strokes do not drift by a pixel.
    let dilated = morph_2x2(binary, -1, u8::max);
    morph_2x2(&dilated, 1, u8::min)
}

/// Folds each pixel with its neighbours at `offset` (-1 looks up/left,
/// +1 looks down/right) on both axes.
fn morph_2x2(img: &GrayImage, offset: i64, fold: fn(u8, u8) -> u8) -> GrayImage {
    let (w, h) = (img.width() as i64, img.height() as i64);
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let (x, y) = (x as i64, y as i64);
        let mut acc = img.get_pixel(x as u32, y as u32)[0];
        for (dx, dy) in [(offset, 0), (0, offset), (offset, offset)] {
            let (nx, ny) = (x + dx, y + dy);
            if nx >= 0 && nx < w && ny >= 0 && ny < h {
                acc = fold(acc, img.get_pixel(nx as u32, ny as u32)[0]);
            }
        }
        Luma([acc])
    })
}
