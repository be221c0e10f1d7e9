use crate::error::InfernumError;
use crate::tensor::{NormalizedTensor, TENSOR_LEN};
use ndarray::{Array2, ArrayView2, ArrayViewD, IxDyn};
use std::sync::{Mutex, PoisonError};

/// Number of digit classes every model must score.
pub const NUM_CLASSES: usize = 10;

/// Family discriminant of a loaded model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFamily {
    /// Flat-feature classifiers exposing class probabilities directly.
    Classical,
    /// Networks whose input rank is fixed by their first layer.
    Neural,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Classical => "classical",
            ModelFamily::Neural => "neural",
        }
    }
}

/// A classifier over flat feature rows.
///
/// Implementations must be free of side effects: the same row always yields
/// the same probabilities.
pub trait ClassicalClassifier {
    /// Returns class probabilities of shape `(rows, classes)` for a
    /// `(rows, features)` matrix.
    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, InfernumError>;
}

/// A network classifier with a fixed per-sample input shape.
pub trait NeuralClassifier {
    /// Shape of one sample, without the batch axis, e.g. `[28, 28]` or `[784]`.
    fn input_shape(&self) -> Vec<usize>;

    /// Runs the forward pass over a batch shaped `[batch, input_shape..]` and
    /// returns `(batch, classes)` scores.
    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<Array2<f32>, InfernumError>;
}

/// A loaded, read-only predictor tagged with its family.
///
/// Each variant knows the reshape its family needs, so callers only ever pass
/// a [`NormalizedTensor`].
pub enum ModelHandle {
    Classical(Box<dyn ClassicalClassifier + Send + Sync>),
    Neural(Box<dyn NeuralClassifier + Send + Sync>),
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModelHandle").field(&self.family()).finish()
    }
}

impl ModelHandle {
    pub fn classical<M>(model: M) -> Self
    where
        M: ClassicalClassifier + Send + Sync + 'static,
    {
        ModelHandle::Classical(Box::new(model))
    }

    pub fn neural<M>(model: M) -> Self
    where
        M: NeuralClassifier + Send + Sync + 'static,
    {
        ModelHandle::Neural(Box::new(model))
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            ModelHandle::Classical(_) => ModelFamily::Classical,
            ModelHandle::Neural(_) => ModelFamily::Neural,
        }
    }

    /// Produces the class probability vector for one normalized image.
    ///
    /// Classical models receive a `(1, 784)` matrix. Neural models receive a
    /// batch of one in their declared input shape. Row 0 of the output is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`InfernumError::Shape`] if the network's input shape does not hold 784
    /// values or the model does not return exactly [`NUM_CLASSES`] scores.
    pub fn infer(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, InfernumError> {
        let output = match self {
            ModelHandle::Classical(model) => {
                let features = ArrayView2::from_shape((1, TENSOR_LEN), tensor.as_slice())
                    .map_err(|_| InfernumError::Shape {
                        expected: vec![TENSOR_LEN],
                        actual: vec![tensor.len()],
                    })?;
                model.predict_proba(features)?
            }
            ModelHandle::Neural(model) => {
                let mut shape = vec![1];
                shape.extend(model.input_shape());
                let input = ArrayViewD::from_shape(IxDyn(&shape), tensor.as_slice()).map_err(
                    |_| InfernumError::Shape {
                        expected: shape.clone(),
                        actual: vec![1, tensor.len()],
                    },
                )?;
                model.predict(input)?
            }
        };

        if output.nrows() == 0 || output.ncols() != NUM_CLASSES {
            return Err(InfernumError::Shape {
                expected: vec![1, NUM_CLASSES],
                actual: output.shape().to_vec(),
            });
        }
        let probabilities = output.row(0).to_vec();
        log::debug!("Probabilities: {:?}", probabilities);
        Ok(probabilities)
    }
}

/// Serializes calls into a model that cannot be invoked concurrently.
///
/// The lock is scoped to the wrapped instance; other models keep running in
/// parallel.
pub struct Serialized<M> {
    inner: Mutex<M>,
}

impl<M> Serialized<M> {
    pub fn new(model: M) -> Self {
        Self {
            inner: Mutex::new(model),
        }
    }
}

impl<M: ClassicalClassifier> ClassicalClassifier for Serialized<M> {
    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, InfernumError> {
        // Inference leaves no partial state behind, so a poisoned lock is still usable.
        let model = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        model.predict_proba(features)
    }
}

impl<M: NeuralClassifier> NeuralClassifier for Serialized<M> {
    fn input_shape(&self) -> Vec<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .input_shape()
    }

    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<Array2<f32>, InfernumError> {
        let model = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        model.predict(input)
    }
}
