//! Appearance feature vectors.
//!
//! Every feature has exactly [`FEATURE_DIM`] components:
//! [`HUE_BINS`] hue bins, then [`SATURATION_BINS`] saturation bins, then
//! [`VALUE_BINS`] value bins. Non-zero features are stored L2-normalized.
//! The all-zero vector is the sentinel for an unmatchable observation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of hue histogram bins.
pub const HUE_BINS: usize = 50;

/// Number of saturation histogram bins.
pub const SATURATION_BINS: usize = 32;

/// Number of value (brightness) histogram bins.
pub const VALUE_BINS: usize = 32;

/// Fixed feature dimensionality (114).
pub const FEATURE_DIM: usize = HUE_BINS + SATURATION_BINS + VALUE_BINS;

/// Errors raised when building a feature from raw values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("Feature must have {expected} components, got {actual}")]
    WrongDimension { expected: usize, actual: usize },

    #[error("Feature component {index} is not finite")]
    NonFinite { index: usize },
}

/// Fixed-length appearance descriptor of a person crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct AppearanceFeature {
    values: Vec<f32>,
}

impl AppearanceFeature {
    /// Build a feature from raw components, normalizing to unit length.
    ///
    /// An all-zero input yields the unmatchable sentinel.
    pub fn new(values: Vec<f32>) -> Result<Self, FeatureError> {
        if values.len() != FEATURE_DIM {
            return Err(FeatureError::WrongDimension {
                expected: FEATURE_DIM,
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(FeatureError::NonFinite { index });
        }
        Ok(Self::normalized(values))
    }

    /// The zero-vector sentinel used for degenerate crops.
    pub fn unmatchable() -> Self {
        Self {
            values: vec![0.0; FEATURE_DIM],
        }
    }

    /// True for the zero-vector sentinel.
    pub fn is_unmatchable(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Raw components.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Cosine similarity in `[-1, 1]`; `0.0` when either side is unmatchable.
    pub fn cosine_similarity(&self, other: &AppearanceFeature) -> f32 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(*a), f64::from(*b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
    }

    /// Exponential moving average towards `newer`, re-normalized.
    ///
    /// `alpha` is the weight given to `newer` and is clamped to `[0, 1]`.
    /// Blending into the unmatchable sentinel simply adopts `newer`.
    pub fn blend(&self, newer: &AppearanceFeature, alpha: f32) -> AppearanceFeature {
        if self.is_unmatchable() {
            return newer.clone();
        }
        if newer.is_unmatchable() {
            return self.clone();
        }
        let alpha = alpha.clamp(0.0, 1.0);
        let values = self
            .values
            .iter()
            .zip(newer.values.iter())
            .map(|(old, new)| (1.0 - alpha) * old + alpha * new)
            .collect();
        Self::normalized(values)
    }

    fn normalized(mut values: Vec<f32>) -> Self {
        let norm = values
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v = (f64::from(*v) / norm) as f32;
            }
        }
        Self { values }
    }
}

impl TryFrom<Vec<f32>> for AppearanceFeature {
    type Error = FeatureError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<AppearanceFeature> for Vec<f32> {
    fn from(feature: AppearanceFeature) -> Self {
        feature.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(index: usize) -> AppearanceFeature {
        let mut values = vec![0.0; FEATURE_DIM];
        values[index] = 1.0;
        AppearanceFeature::new(values).unwrap()
    }

    #[test]
    fn test_dimension_is_114() {
        assert_eq!(FEATURE_DIM, 114);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let err = AppearanceFeature::new(vec![1.0; 10]).unwrap_err();
        assert_eq!(
            err,
            FeatureError::WrongDimension {
                expected: FEATURE_DIM,
                actual: 10
            }
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut values = vec![0.5; FEATURE_DIM];
        values[7] = f32::NAN;
        assert_eq!(
            AppearanceFeature::new(values).unwrap_err(),
            FeatureError::NonFinite { index: 7 }
        );
    }

    #[test]
    fn test_new_normalizes() {
        let feature = AppearanceFeature::new(vec![3.0; FEATURE_DIM]).unwrap();
        let norm: f32 = feature.as_slice().iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = one_hot(0);
        let b = one_hot(1);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-6);
        assert!(a.cosine_similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_unmatchable_similarity_is_zero() {
        let zero = AppearanceFeature::unmatchable();
        assert!(zero.is_unmatchable());
        assert_eq!(zero.cosine_similarity(&one_hot(3)), 0.0);
        assert_eq!(one_hot(3).cosine_similarity(&zero), 0.0);
    }

    #[test]
    fn test_blend_moves_towards_newer() {
        let a = one_hot(0);
        let b = one_hot(1);
        let blended = a.blend(&b, 0.2);
        assert!(blended.cosine_similarity(&a) > blended.cosine_similarity(&b));
        assert!(blended.cosine_similarity(&b) > 0.0);
        assert_eq!(a.blend(&b, 1.0), b);
    }

    #[test]
    fn test_blend_from_unmatchable_adopts_newer() {
        let b = one_hot(5);
        assert_eq!(AppearanceFeature::unmatchable().blend(&b, 0.1), b);
    }

    #[test]
    fn test_deserialize_validates_length() {
        assert!(serde_json::from_str::<AppearanceFeature>("[1.0, 2.0]").is_err());
        let json = serde_json::to_string(&vec![1.0f32; FEATURE_DIM]).unwrap();
        assert!(serde_json::from_str::<AppearanceFeature>(&json).is_ok());
    }
}
