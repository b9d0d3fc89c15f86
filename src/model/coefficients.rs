// Trained coefficient sets
// Weights are keyed by feature name and checked against the feature list on both sides of the model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::regression::FitMetrics;
use crate::errors::{PricingError, PricingResult};
use crate::features::{Feature, PricingFeatures};

/// One row of `price_model_coefficients`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCoefficients {
    pub model_version: String,
    pub training_date: DateTime<Utc>,
    pub sample_size: i32,
    pub r_squared: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// feature name -> weight
    pub coefficients: BTreeMap<String, f64>,
}

impl ModelCoefficients {
    /// Pair fitted weights with the features that produced the design matrix columns
    pub fn from_fit(
        features: &[Feature],
        weights: &[f64],
        metrics: FitMetrics,
        sample_size: usize,
        training_date: DateTime<Utc>,
    ) -> PricingResult<Self> {
        if features.len() != weights.len() {
            return Err(PricingError::regression(format!(
                "{} fitted weights for {} features",
                weights.len(),
                features.len()
            )));
        }

        let coefficients: BTreeMap<String, f64> = features
            .iter()
            .zip(weights)
            .map(|(f, w)| (f.name().to_string(), *w))
            .collect();

        let sample_size = i32::try_from(sample_size).map_err(|_| {
            PricingError::regression(format!("sample size {} does not fit the model table", sample_size))
        })?;

        let model = Self {
            model_version: new_model_version(training_date),
            training_date,
            sample_size,
            r_squared: metrics.r_squared,
            mse: metrics.mse,
            rmse: metrics.rmse,
            mae: metrics.mae,
            coefficients,
        };
        model.validate(&Feature::ALL)?;
        Ok(model)
    }

    /// The coefficient names must be exactly the given features
    pub fn validate(&self, features: &[Feature]) -> PricingResult<()> {
        let missing: Vec<String> = features
            .iter()
            .filter(|f| !self.coefficients.contains_key(f.name()))
            .map(|f| f.name().to_string())
            .collect();
        let unexpected: Vec<String> = self
            .coefficients
            .keys()
            .filter(|name| !features.iter().any(|f| f.name() == name.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(PricingError::FeatureMismatch {
                missing,
                unexpected,
            })
        }
    }

    pub fn weight(&self, feature: Feature) -> Option<f64> {
        self.coefficients.get(feature.name()).copied()
    }

    /// Unclamped adjustment ratio: Σ weight[name] * value[name]
    pub fn raw_ratio(&self, features: &PricingFeatures) -> PricingResult<f64> {
        self.validate(&Feature::ALL)?;
        let ratio = features
            .named_values()
            .into_iter()
            .map(|(name, value)| self.coefficients.get(name).copied().unwrap_or(0.0) * value)
            .sum();
        Ok(ratio)
    }

    pub fn metrics(&self) -> FitMetrics {
        FitMetrics {
            r_squared: self.r_squared,
            mse: self.mse,
            rmse: self.rmse,
            mae: self.mae,
        }
    }
}

/// `v<date>_<time>_<micros>-<8 hex>`: sortable by time, unique within a second
pub fn new_model_version(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("v{}-{}", at.format("%Y%m%d_%H%M%S_%6f"), &suffix[..8])
}
