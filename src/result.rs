use crate::error::InfernumError;
use crate::model::NUM_CLASSES;
use serde::{Deserialize, Serialize};

/// Largest distance from 1 tolerated in the sum of a probability vector.
pub const SUM_TOLERANCE: f32 = 1e-3;

/// Probability assigned to one digit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub digit: u8,
    pub prob: f32,
}

/// Outcome of one recognition request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_digit: u8,
    /// Probability of `predicted_digit`.
    pub confidence: f32,
    /// All ten classes, in ascending digit order.
    pub probabilities: Vec<ClassProbability>,
    pub model_used: String,
}

impl PredictionResult {
    /// Builds a result from a model's probability vector.
    ///
    /// With `renormalize`, every entry is divided by the vector's sum first to
    /// absorb rounding in the model output. Either way the final vector must
    /// sum to 1 within [`SUM_TOLERANCE`], otherwise the model did not return a
    /// distribution and the call fails with [`InfernumError::Inference`].
    /// Ties for the top class go to the lowest digit.
    pub fn assemble(
        probabilities: &[f32],
        model_key: &str,
        renormalize: bool,
    ) -> Result<Self, InfernumError> {
        if probabilities.len() != NUM_CLASSES {
            return Err(InfernumError::Shape {
                expected: vec![NUM_CLASSES],
                actual: vec![probabilities.len()],
            });
        }
        if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(InfernumError::Inference(format!(
                "model '{model_key}' returned invalid probabilities: {probabilities:?}"
            )));
        }

        let sum: f32 = probabilities.iter().sum();
        let probs: Vec<f32> = if renormalize {
            if sum <= 0.0 {
                return Err(InfernumError::Inference(format!(
                    "model '{model_key}' returned an all-zero distribution"
                )));
            }
            probabilities.iter().map(|p| p / sum).collect()
        } else {
            probabilities.to_vec()
        };
        let total: f32 = probs.iter().sum();
        if (total - 1.0).abs() > SUM_TOLERANCE {
            return Err(InfernumError::Inference(format!(
                "model '{model_key}' returned probabilities summing to {total}"
            )));
        }

        let (predicted, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, probs[0]), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        Ok(Self {
            predicted_digit: predicted as u8,
            confidence,
            probabilities: probs
                .iter()
                .enumerate()
                .map(|(digit, &prob)| ClassProbability {
                    digit: digit as u8,
                    prob,
                })
                .collect(),
            model_used: model_key.to_string(),
        })
    }
}
