// Price adjustment rules
// Turns a model ratio into a bounded price for one product

use serde::Serialize;

use super::coefficients::ModelCoefficients;
use super::store::ProductPricing;
use crate::errors::{PricingError, PricingResult};

pub const DEFAULT_MIN_RATIO: f64 = 0.8;
pub const DEFAULT_MAX_RATIO: f64 = 1.2;

/// Safety band for the adjustment ratio
///
/// Only constructed through [`PriceBounds::new`] or `Default`, so `min_ratio <= max_ratio` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBounds {
    min_ratio: f64,
    max_ratio: f64,
}

impl PriceBounds {
    pub fn new(min_ratio: f64, max_ratio: f64) -> PricingResult<Self> {
        let valid = min_ratio.is_finite()
            && max_ratio.is_finite()
            && min_ratio > 0.0
            && min_ratio <= max_ratio;
        if !valid {
            return Err(PricingError::InvalidBounds {
                min_ratio,
                max_ratio,
            });
        }
        Ok(Self {
            min_ratio,
            max_ratio,
        })
    }

    pub fn min_ratio(&self) -> f64 {
        self.min_ratio
    }

    pub fn max_ratio(&self) -> f64 {
        self.max_ratio
    }

    pub fn clamp(&self, ratio: f64) -> f64 {
        ratio.clamp(self.min_ratio, self.max_ratio)
    }
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min_ratio: DEFAULT_MIN_RATIO,
            max_ratio: DEFAULT_MAX_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceDecision {
    pub product_id: i32,
    pub raw_ratio: f64,
    pub applied_ratio: f64,
    pub old_price: Option<f64>,
    pub new_price: f64,
    pub model_version: String,
}

impl PriceDecision {
    /// Whether the model output was pulled back into the band
    pub fn was_clamped(&self) -> bool {
        self.raw_ratio != self.applied_ratio
    }
}

/// Apply the coefficients to one product's features and bound the result
pub fn decide(
    pricing: &ProductPricing,
    model: &ModelCoefficients,
    bounds: &PriceBounds,
) -> PricingResult<PriceDecision> {
    let product_id = pricing.features.product_id;
    let raw_ratio = model.raw_ratio(&pricing.features)?;
    if raw_ratio.is_nan() {
        return Err(PricingError::NonFiniteRatio { product_id });
    }

    let applied_ratio = bounds.clamp(raw_ratio);
    Ok(PriceDecision {
        product_id,
        raw_ratio,
        applied_ratio,
        old_price: pricing.adjusted_price,
        new_price: pricing.base_price * applied_ratio,
        model_version: model.model_version.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Feature, PricingFeatures};
    use crate::model::regression::FitMetrics;
    use chrono::Utc;

    fn pricing(base_price: f64, adjusted_price: Option<f64>, review_score: f64) -> ProductPricing {
        ProductPricing {
            features: PricingFeatures {
                product_id: 9,
                days_since_last_sale: Some(1),
                sales_velocity: 0.0,
                total_sales_count: 0,
                total_sales_value: 0.0,
                category_percentile: 0.0,
                review_score,
                wishlist_to_sales_ratio: 0.0,
                days_since_restock: None,
                computed_at: Utc::now(),
            },
            base_price,
            adjusted_price,
        }
    }

    /// Only review_score carries weight, so the raw ratio equals review_score * weight
    fn review_only_model(weight: f64) -> ModelCoefficients {
        let weights: Vec<f64> = Feature::ALL
            .iter()
            .map(|f| if *f == Feature::ReviewScore { weight } else { 0.0 })
            .collect();
        let metrics = FitMetrics {
            r_squared: 0.5,
            mse: 0.0,
            rmse: 0.0,
            mae: 0.0,
        };
        ModelCoefficients::from_fit(&Feature::ALL, &weights, metrics, 9, Utc::now()).unwrap()
    }

    #[test]
    fn test_ratio_above_band_clamps_to_max() {
        let decision = decide(
            &pricing(100.0, Some(95.0), 1.5),
            &review_only_model(1.0),
            &PriceBounds::default(),
        )
        .unwrap();

        assert!((decision.raw_ratio - 1.5).abs() < 1e-12);
        assert_eq!(decision.applied_ratio, 1.2);
        assert!((decision.new_price - 120.0).abs() < 1e-9);
        assert_eq!(decision.old_price, Some(95.0));
        assert!(decision.was_clamped());
    }

    #[test]
    fn test_ratio_inside_band_is_kept() {
        let decision = decide(
            &pricing(50.0, None, 1.0),
            &review_only_model(1.05),
            &PriceBounds::default(),
        )
        .unwrap();

        assert!((decision.new_price - 52.5).abs() < 1e-9);
        assert_eq!(decision.old_price, None);
        assert!(!decision.was_clamped());
    }

    #[test]
    fn test_extreme_outputs_stay_in_band() {
        let bounds = PriceBounds::default();
        for weight in [-1e12, -3.0, 0.0, 0.9, 7.0, 1e12, f64::INFINITY] {
            let decision = decide(&pricing(80.0, None, 2.0), &review_only_model(weight), &bounds)
                .unwrap();
            assert!(decision.new_price >= 80.0 * 0.8 - 1e-9);
            assert!(decision.new_price <= 80.0 * 1.2 + 1e-9);
        }
    }

    #[test]
    fn test_nan_ratio_is_rejected() {
        let result = decide(
            &pricing(80.0, None, 2.0),
            &review_only_model(f64::NAN),
            &PriceBounds::default(),
        );
        assert!(matches!(result, Err(PricingError::NonFiniteRatio { product_id: 9 })));
    }

    #[test]
    fn test_bounds_validation() {
        assert!(PriceBounds::new(0.8, 1.2).is_ok());
        assert!(PriceBounds::new(1.0, 1.0).is_ok());
        assert!(PriceBounds::new(1.3, 1.2).is_err());
        assert!(PriceBounds::new(0.0, 1.2).is_err());
        assert!(PriceBounds::new(f64::NAN, 1.2).is_err());
    }

    #[test]
    fn test_inverted_bounds_never_reach_clamp() {
        match PriceBounds::new(1.3, 1.2) {
            Err(PricingError::InvalidBounds {
                min_ratio,
                max_ratio,
            }) => {
                assert_eq!(min_ratio, 1.3);
                assert_eq!(max_ratio, 1.2);
            }
            other => panic!("expected InvalidBounds, got {:?}", other),
        }

        let bounds = PriceBounds::new(0.9, 1.1).unwrap();
        assert_eq!(bounds.min_ratio(), 0.9);
        assert_eq!(bounds.max_ratio(), 1.1);
        assert_eq!(bounds.clamp(1.0), 1.0);
        assert_eq!(bounds.clamp(f64::NEG_INFINITY), 0.9);

        let default = PriceBounds::default();
        assert_eq!(default.min_ratio(), DEFAULT_MIN_RATIO);
        assert_eq!(default.max_ratio(), DEFAULT_MAX_RATIO);
    }
}
