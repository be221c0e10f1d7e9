use crate::decode::decode_base64_image;
use crate::error::InfernumError;
use crate::geometry::{CenteringMode, GeometryNormalizer, Polarity, apply_polarity};
use crate::observer::{NoopObserver, PipelineObserver, Stage};
use crate::registry::{DEFAULT_MODEL_KEY, ModelRegistry};
use crate::result::PredictionResult;
use crate::tensor::NormalizedTensor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Inbound recognition request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PredictRequest {
    /// Base64 image, optionally prefixed with a data-URL header.
    #[serde(default)]
    pub image: Option<String>,
    /// Model key; the pipeline default is used when absent.
    #[serde(default)]
    pub model: Option<String>,
}

/// Error body returned to clients.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ErrorRecord {
    pub error: String,
    /// Configured model keys, present when the requested model is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_loaded: Option<Vec<String>>,
}

impl From<&InfernumError> for ErrorRecord {
    fn from(err: &InfernumError) -> Self {
        let models_loaded = match err {
            InfernumError::ModelNotFound { available, .. } => Some(available.clone()),
            _ => None,
        };
        Self {
            error: err.to_string(),
            models_loaded,
        }
    }
}

/// Tunables of the recognition pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub centering: CenteringMode,
    pub polarity: Polarity,
    /// Divide model output by its sum before assembling the result.
    pub renormalize: bool,
    pub default_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            centering: CenteringMode::default(),
            polarity: Polarity::default(),
            renormalize: true,
            default_model: DEFAULT_MODEL_KEY.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn with_centering(mut self, centering: CenteringMode) -> Self {
        self.centering = centering;
        self
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_renormalize(mut self, renormalize: bool) -> Self {
        self.renormalize = renormalize;
        self
    }

    pub fn with_default_model(mut self, key: impl Into<String>) -> Self {
        self.default_model = key.into();
        self
    }
}

/// End-to-end digit recognition: base64 payload in, prediction out.
///
/// The pipeline holds only shared read-only state (the registry and the
/// observer), so one instance can serve concurrent requests; every raster and
/// tensor it creates belongs to a single call.
#[derive(Clone)]
pub struct DigitPipeline {
    config: PipelineConfig,
    registry: Arc<ModelRegistry>,
    observer: Arc<dyn PipelineObserver>,
}

impl DigitPipeline {
    pub fn new(registry: Arc<ModelRegistry>, config: PipelineConfig) -> Self {
        Self {
            config,
            registry,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Decodes and normalizes a payload into the 784-value model input.
    pub fn prepare(&self, payload: &str) -> Result<NormalizedTensor, InfernumError> {
        let mut raster = decode_base64_image(payload)?;
        apply_polarity(&mut raster, self.config.polarity);
        self.observer.on_stage(Stage::Decoded, &raster);

        let canvas =
            GeometryNormalizer::new(self.config.centering).normalize(&raster, self.observer.as_ref())?;
        NormalizedTensor::encode(&canvas)
    }

    /// Handles a boundary request record.
    pub fn predict(&self, request: &PredictRequest) -> Result<PredictionResult, InfernumError> {
        let image = request
            .image
            .as_deref()
            .filter(|image| !image.is_empty())
            .ok_or(InfernumError::MissingImage)?;
        self.predict_image(image, request.model.as_deref())
    }

    /// Recognizes the digit in `payload` with the named model, or the
    /// configured default.
    pub fn predict_image(
        &self,
        payload: &str,
        model: Option<&str>,
    ) -> Result<PredictionResult, InfernumError> {
        let start_time = Instant::now();
        let key = model.unwrap_or(&self.config.default_model);
        // Resolve the model first so a bad key fails before any image work.
        let handle = self.registry.get(key)?;

        let tensor = self.prepare(payload)?;
        let probabilities = handle.infer(&tensor)?;
        let result = PredictionResult::assemble(&probabilities, key, self.config.renormalize)?;

        log::debug!(
            "Predicted {} ({:.3}) with '{}' in {:?}",
            result.predicted_digit,
            result.confidence,
            key,
            start_time.elapsed()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassicalClassifier, ModelHandle, NUM_CLASSES};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use image::{GrayImage, ImageFormat, Luma};
    use ndarray::{Array2, ArrayView2};
    use std::io::Cursor;
    use std::sync::Mutex;

    struct Uniform;

    impl ClassicalClassifier for Uniform {
        fn predict_proba(&self, _: ArrayView2<'_, f32>) -> Result<Array2<f32>, InfernumError> {
            Ok(Array2::from_elem((1, NUM_CLASSES), 0.1))
        }
    }

    /// Raw scores that are not a distribution.
    struct Scores;

    impl ClassicalClassifier for Scores {
        fn predict_proba(&self, _: ArrayView2<'_, f32>) -> Result<Array2<f32>, InfernumError> {
            Ok(Array2::from_elem((1, NUM_CLASSES), 2.0))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Stage>>);

    impl PipelineObserver for Recorder {
        fn on_stage(&self, stage: Stage, _raster: &GrayImage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    fn pipeline() -> DigitPipeline {
        let registry = ModelRegistry::builder()
            .insert("logistic_regression", ModelHandle::classical(Uniform))
            .unavailable("neural_network", "missing artifact")
            .build();
        DigitPipeline::new(Arc::new(registry), PipelineConfig::default())
    }

    fn stroke_png() -> String {
        let mut img = GrayImage::new(64, 64);
        for y in 10..50 {
            for x in 30..36 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn missing_image_is_rejected_first() {
        let err = pipeline().predict(&PredictRequest::default()).unwrap_err();
        assert!(matches!(err, InfernumError::MissingImage));

        let empty = PredictRequest {
            image: Some(String::new()),
            model: Some("nope".into()),
        };
        assert!(matches!(
            pipeline().predict(&empty),
            Err(InfernumError::MissingImage)
        ));
    }

    #[test]
    fn uses_the_default_model() {
        let request = PredictRequest {
            image: Some(stroke_png()),
            model: None,
        };
        let result = pipeline().predict(&request).unwrap();
        assert_eq!(result.model_used, "logistic_regression");
        assert_eq!(result.predicted_digit, 0);
    }

    #[test]
    fn model_errors_surface_before_decoding() {
        let p = pipeline();
        assert!(matches!(
            p.predict_image("%%%", Some("svm")),
            Err(InfernumError::ModelNotFound { .. })
        ));
        assert!(matches!(
            p.predict_image("%%%", Some("neural_network")),
            Err(InfernumError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn raw_scores_fail_without_renormalization() {
        let registry = ModelRegistry::builder()
            .insert("logistic_regression", ModelHandle::classical(Scores))
            .build();
        let registry = Arc::new(registry);
        let request = PredictRequest {
            image: Some(stroke_png()),
            model: None,
        };

        let strict = DigitPipeline::new(
            registry.clone(),
            PipelineConfig::default().with_renormalize(false),
        );
        assert!(matches!(
            strict.predict(&request),
            Err(InfernumError::Inference(_))
        ));

        let result = DigitPipeline::new(registry, PipelineConfig::default())
            .predict(&request)
            .unwrap();
        assert!(result.confidence <= 1.0);
    }

    #[test]
    fn observer_sees_every_stage() {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline().with_observer(recorder.clone());
        p.prepare(&stroke_png()).unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![Stage::Decoded, Stage::Cropped, Stage::Resized, Stage::Normalized]
        );
    }

    #[test]
    fn error_record_lists_models_for_unknown_key() {
        let err = pipeline().predict_image("", Some("svm")).unwrap_err();
        let record = ErrorRecord::from(&err);
        assert_eq!(record.error, "Model 'svm' not available");
        assert_eq!(
            record.models_loaded,
            Some(vec!["logistic_regression".to_string(), "neural_network".to_string()])
        );

        let record = ErrorRecord::from(&InfernumError::EmptyContent);
        assert!(record.models_loaded.is_none());
        assert!(!serde_json::to_string(&record).unwrap().contains("models_loaded"));
    }
}
