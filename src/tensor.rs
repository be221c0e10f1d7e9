use crate::error::InfernumError;
use crate::geometry::CANVAS_SIZE;
use image::{GrayImage, Luma};

/// Number of features fed to every classifier (28 x 28).
pub const TENSOR_LEN: usize = (CANVAS_SIZE * CANVAS_SIZE) as usize;

/// A row-major flattened 28x28 image with every value in `[0, 1]`.
///
/// The constructors enforce the length and range contract, so consumers can
/// rely on it without re-checking.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedTensor(Vec<f32>);

impl NormalizedTensor {
    /// Encodes a 28x28 grayscale raster: `value / 255`, row 0 first.
    pub fn encode(raster: &GrayImage) -> Result<Self, InfernumError> {
        if raster.dimensions() != (CANVAS_SIZE, CANVAS_SIZE) {
            return Err(InfernumError::Shape {
                expected: vec![CANVAS_SIZE as usize, CANVAS_SIZE as usize],
                actual: vec![raster.height() as usize, raster.width() as usize],
            });
        }
        // `GrayImage` stores rows contiguously, so its raw buffer is already row-major.
        let values = raster
            .as_raw()
            .iter()
            .map(|&v| v as f32 / 255.0)
            .collect();
        Ok(Self(values))
    }

    /// Wraps an already-normalized vector, checking its length and range.
    pub fn from_vec(values: Vec<f32>) -> Result<Self, InfernumError> {
        if values.len() != TENSOR_LEN {
            return Err(InfernumError::Shape {
                expected: vec![TENSOR_LEN],
                actual: vec![values.len()],
            });
        }
        if let Some((index, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(0.0..=1.0).contains(*v))
        {
            return Err(InfernumError::OutOfRange { index, value });
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the tensor back to a 28x28 raster, scaling by 255.
    pub fn to_raster(&self) -> GrayImage {
        GrayImage::from_fn(CANVAS_SIZE, CANVAS_SIZE, |x, y| {
            let v = self.0[(y * CANVAS_SIZE + x) as usize];
            Luma([(v * 255.0).round() as u8])
        })
    }
}

/// Converts a raw vector back into a raster, rejecting anything but 784 values.
pub fn vector_to_raster(values: &[f32]) -> Result<GrayImage, InfernumError> {
    if values.len() != TENSOR_LEN {
        return Err(InfernumError::Shape {
            expected: vec![TENSOR_LEN],
            actual: vec![values.len()],
        });
    }
    Ok(GrayImage::from_fn(CANVAS_SIZE, CANVAS_SIZE, |x, y| {
        let v = values[(y * CANVAS_SIZE + x) as usize].clamp(0.0, 1.0);
        Luma([(v * 255.0).round() as u8])
    }))
}
