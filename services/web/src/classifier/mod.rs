//! Inference adapter around the pretrained skin condition classifier.
//!
//! The classifier itself is opaque: an RGB image goes in, one score per
//! class comes out in the model's class-index order. This module turns that
//! raw vector into a [`ClassificationResult`] over the fixed [`SkinClass`]
//! label set, or a typed [`InferenceError`].

mod adapter;
mod onnx;

pub use adapter::InferenceAdapter;
pub use onnx::OnnxClassifier;

use crate::classes::SkinClass;
use image::RgbImage;
use std::time::Duration;
use thiserror::Error;

/// Tolerance when checking whether scores already form a distribution
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

/// Errors that can occur while classifying an upload
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to load model {path}: {message}")]
    ModelLoad { path: String, message: String },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to prepare input tensor: {0}")]
    Preprocess(String),

    #[error("Inference failed: {0}")]
    Runtime(String),

    #[error("Model did not return predictions")]
    NoPredictions,

    #[error("Model output format not recognized")]
    UnrecognizedOutput,

    #[error("Model returned {actual} scores, expected {expected}")]
    LabelMismatch { expected: usize, actual: usize },

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference task failed: {0}")]
    Task(String),
}

/// An opaque image classifier.
///
/// Implementations return the raw score vector, one entry per class in
/// model output order. Scores may be probabilities or logits.
#[cfg_attr(test, mockall::automock)]
pub trait ImageClassifier: Send + Sync {
    fn predict(&self, image: &RgbImage) -> Result<Vec<f32>, InferenceError>;
}

/// Probability distribution over the fixed label set
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    probabilities: [f32; SkinClass::COUNT],
    top_class: SkinClass,
}

impl ClassificationResult {
    /// Build a result from raw model scores.
    ///
    /// Scores that already form a probability distribution are kept as-is;
    /// anything else is treated as logits and passed through softmax.
    pub fn from_scores(scores: &[f32]) -> Result<Self, InferenceError> {
        if scores.is_empty() {
            return Err(InferenceError::UnrecognizedOutput);
        }
        if scores.len() != SkinClass::COUNT {
            return Err(InferenceError::LabelMismatch {
                expected: SkinClass::COUNT,
                actual: scores.len(),
            });
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(InferenceError::UnrecognizedOutput);
        }

        let mut probabilities = [0f32; SkinClass::COUNT];
        if is_distribution(scores) {
            probabilities.copy_from_slice(scores);
        } else {
            softmax(scores, &mut probabilities);
        }

        // First maximum wins, so ties resolve to label order
        let mut top = 0;
        for (i, &p) in probabilities.iter().enumerate().skip(1) {
            if p > probabilities[top] {
                top = i;
            }
        }

        Ok(Self {
            probabilities,
            top_class: SkinClass::ALL[top],
        })
    }

    pub fn top_class(&self) -> SkinClass {
        self.top_class
    }

    /// Probability of the top class
    pub fn confidence(&self) -> f32 {
        self.probability(self.top_class)
    }

    pub fn probability(&self, class: SkinClass) -> f32 {
        self.probabilities[class.index()]
    }

    /// `(class, probability)` pairs in label order
    pub fn iter(&self) -> impl Iterator<Item = (SkinClass, f32)> + '_ {
        SkinClass::ALL
            .iter()
            .map(move |&class| (class, self.probabilities[class.index()]))
    }
}

fn is_distribution(scores: &[f32]) -> bool {
    let sum: f32 = scores.iter().sum();
    scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE
}

fn softmax(logits: &[f32], out: &mut [f32]) {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    for (o, &x) in out.iter_mut().zip(logits) {
        *o = (x - max_logit).exp() / exp_sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(result: &ClassificationResult) -> f32 {
        result.iter().map(|(_, p)| p).sum()
    }

    #[test]
    fn test_probabilities_kept_as_is() {
        let result = ClassificationResult::from_scores(&[0.05, 0.1, 0.7, 0.1, 0.05]).unwrap();

        assert_eq!(result.top_class(), SkinClass::Herpes);
        assert_eq!(result.confidence(), 0.7);
        assert_eq!(result.probability(SkinClass::Acne), 0.05);
        assert!((sum(&result) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_logits_pass_through_softmax() {
        let result = ClassificationResult::from_scores(&[-1.0, 4.0, 0.5, 2.0, -3.0]).unwrap();

        assert_eq!(result.top_class(), SkinClass::Eksim);
        assert!((sum(&result) - 1.0).abs() < 1e-5);
        assert!(result.iter().all(|(_, p)| (0.0..=1.0).contains(&p)));

        let argmax = result
            .iter()
            .fold((SkinClass::Acne, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        assert_eq!(argmax.0, result.top_class());
    }

    #[test]
    fn test_ties_resolve_to_label_order() {
        let result = ClassificationResult::from_scores(&[0.1, 0.4, 0.1, 0.4, 0.0]).unwrap();
        assert_eq!(result.top_class(), SkinClass::Eksim);

        let uniform = ClassificationResult::from_scores(&[0.2; 5]).unwrap();
        assert_eq!(uniform.top_class(), SkinClass::Acne);
    }

    #[test]
    fn test_empty_output_is_unrecognized() {
        assert!(matches!(
            ClassificationResult::from_scores(&[]),
            Err(InferenceError::UnrecognizedOutput)
        ));
    }

    #[test]
    fn test_wrong_length_is_label_mismatch() {
        assert!(matches!(
            ClassificationResult::from_scores(&[0.5, 0.5]),
            Err(InferenceError::LabelMismatch {
                expected: 5,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_non_finite_output_is_unrecognized() {
        assert!(matches!(
            ClassificationResult::from_scores(&[0.1, f32::NAN, 0.2, 0.3, 0.4]),
            Err(InferenceError::UnrecognizedOutput)
        ));
    }

    #[test]
    fn test_unrecognized_output_message() {
        assert_eq!(
            InferenceError::UnrecognizedOutput.to_string(),
            "Model output format not recognized"
        );
    }
}
