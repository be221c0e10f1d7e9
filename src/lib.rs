//! Handwritten digit recognition for user-drawn canvas images.
//!
//! A request flows through the crate leaf-first:
//!
//! 1. [`decode`] turns a base64 payload (optionally data-URL prefixed) into a
//!    grayscale raster.
//! 2. [`geometry`] crops the drawing, scales it into a 20x20 box with
//!    nearest-neighbour sampling and centres it on a 28x28 canvas.
//! 3. [`tensor`] flattens the canvas into a [`NormalizedTensor`] of 784 values
//!    in `[0, 1]`.
//! 4. [`ModelHandle::infer`] feeds the tensor to a classical or neural model
//!    from the [`ModelRegistry`], reshaping it the way that family expects.
//! 5. [`PredictionResult::assemble`] turns the probabilities into the result
//!    record.
//!
//! [`DigitPipeline`] runs the whole chain for one request.

pub mod classifiers;
pub mod decode;
pub mod error;
pub mod geometry;
pub mod model;
pub mod observer;
pub mod pipeline;
pub mod registry;
pub mod result;
pub mod tensor;

pub use error::{DecodeError, InfernumError, ModelLoadError};
pub use geometry::{CenteringMode, GeometryNormalizer, Polarity};
pub use model::{
    ClassicalClassifier, ModelFamily, ModelHandle, NUM_CLASSES, NeuralClassifier, Serialized,
};
pub use observer::{DebugImageWriter, NoopObserver, PipelineObserver, Stage};
pub use pipeline::{DigitPipeline, ErrorRecord, PipelineConfig, PredictRequest};
pub use registry::{
    DEFAULT_MODEL_KEY, ModelKind, ModelRegistry, ModelSpec, ModelStatus, RegistryCell,
    RegistryConfig,
};
pub use result::{ClassProbability, PredictionResult};
pub use tensor::{NormalizedTensor, TENSOR_LEN};
