use thiserror::Error;

/// Reasons a request payload could not be turned into a raster.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload (after stripping any data-URL header) was empty.
    #[error("image payload is empty")]
    Empty,
    /// The payload is not valid standard base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not an image format we can read.
    #[error("undecodable image bytes: {0}")]
    Image(#[from] image::ImageError),
}

/// Reasons a model artifact could not be loaded from disk.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

/// Errors produced by the digit recognition pipeline.
///
/// Every variant propagates unmodified to the caller; nothing in the pipeline
/// retries. Use [`InfernumError::is_client_error`] to split user-input failures
/// from deployment or programming failures.
#[derive(Debug, Error)]
pub enum InfernumError {
    /// The request carried no image at all.
    #[error("No image provided")]
    MissingImage,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The decoded image has no non-background pixel.
    #[error("image has no drawn content")]
    EmptyContent,
    /// A tensor reached a consumer with the wrong shape.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A tensor value fell outside the normalized `[0, 1]` range.
    #[error("tensor value {value} at index {index} outside [0, 1]")]
    OutOfRange { index: usize, value: f32 },
    #[error("Model '{key}' not available")]
    ModelNotFound { key: String, available: Vec<String> },
    #[error("Model '{key}' failed to load or is unavailable: {reason}")]
    ModelUnavailable { key: String, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
}

impl InfernumError {
    /// Returns `true` for failures caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            InfernumError::MissingImage
                | InfernumError::Decode(_)
                | InfernumError::EmptyContent
                | InfernumError::ModelNotFound { .. }
        )
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InfernumError::MissingImage => "missing_image",
            InfernumError::Decode(_) => "decode",
            InfernumError::EmptyContent => "empty_content",
            InfernumError::Shape { .. } => "shape",
            InfernumError::OutOfRange { .. } => "out_of_range",
            InfernumError::ModelNotFound { .. } => "model_not_found",
            InfernumError::ModelUnavailable { .. } => "model_unavailable",
            InfernumError::Inference(_) => "inference",
        }
    }
}
