//! Pricing model: training, coefficient history and bounded price adjustment
//!
//! Fit diagnostics are computed on the training set itself; there is no
//! held-out split, so they describe in-sample fit only.

pub mod adjust;
pub mod coefficients;
pub mod regression;
pub mod store;

pub use adjust::{PriceBounds, PriceDecision, DEFAULT_MAX_RATIO, DEFAULT_MIN_RATIO};
pub use coefficients::ModelCoefficients;
pub use regression::{FitMetrics, LinearFit};
pub use store::{ModelStore, PgModelStore, PriceAdjustment, ProductPricing};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{PricingError, PricingResult};
use crate::features::Feature;

/// New price for one product from a bulk run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedPrice {
    pub product_id: i32,
    pub adjusted_price: f64,
}

pub struct PricingModel<S> {
    store: S,
}

impl<S: ModelStore> PricingModel<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fit the feature -> ratio regression over every priced product and append the result
    pub async fn train_model(&self) -> PricingResult<ModelCoefficients> {
        let rows = self.store.training_rows().await?;
        if rows.is_empty() {
            return Err(PricingError::NoTrainingData);
        }
        info!(samples = rows.len(), "Training pricing model");

        let design: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| Feature::ALL.iter().map(|&f| row.features.value(f)).collect())
            .collect();
        let targets: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.observed_ratio())
            .collect();
        if targets.len() != rows.len() {
            return Err(PricingError::regression(
                "training row without an adjusted price",
            ));
        }

        let fit = regression::fit_ols(&design, &targets)?;
        if !fit.dropped_columns.is_empty() {
            let dropped: Vec<&str> = fit
                .dropped_columns
                .iter()
                .map(|&i| Feature::ALL[i].name())
                .collect();
            warn!(?dropped, "Features carried no independent signal and were given zero weight");
        }
        debug!(intercept = fit.intercept, "Regression bias term (not persisted)");

        let predicted: Vec<f64> = design.iter().map(|row| fit.predict(row)).collect();
        let metrics = regression::evaluate(&targets, &predicted);

        let coefficients = ModelCoefficients::from_fit(
            &Feature::ALL,
            &fit.coefficients,
            metrics,
            rows.len(),
            Utc::now(),
        )?;
        self.store.insert_coefficients(&coefficients).await?;

        info!(
            model_version = %coefficients.model_version,
            sample_size = coefficients.sample_size,
            r_squared = coefficients.r_squared,
            rmse = coefficients.rmse,
            mae = coefficients.mae,
            "Pricing model trained"
        );
        Ok(coefficients)
    }

    /// Latest coefficient set, or `None` when no model has been trained yet
    pub async fn get_model_coefficients(&self) -> PricingResult<Option<ModelCoefficients>> {
        self.store.latest_coefficients().await
    }

    async fn require_coefficients(&self) -> PricingResult<ModelCoefficients> {
        let coefficients = self
            .store
            .latest_coefficients()
            .await?
            .ok_or(PricingError::NoCoefficients)?;
        coefficients.validate(&Feature::ALL)?;
        Ok(coefficients)
    }

    pub async fn adjust_price_for_product(
        &self,
        product_id: i32,
        min_ratio: f64,
        max_ratio: f64,
    ) -> PricingResult<f64> {
        let bounds = PriceBounds::new(min_ratio, max_ratio)?;
        let coefficients = self.require_coefficients().await?;

        let pricing = self
            .store
            .product_pricing(product_id)
            .await?
            .ok_or(PricingError::ProductNotFound(product_id))?;

        let decision = adjust::decide(&pricing, &coefficients, &bounds)?;
        self.store
            .apply_adjustments(&[PriceAdjustment::from(&decision)])
            .await?;

        info!(
            product_id,
            new_price = decision.new_price,
            old_price = ?decision.old_price,
            ratio = decision.applied_ratio,
            model_version = %decision.model_version,
            "Adjusted price"
        );
        Ok(decision.new_price)
    }

    pub async fn adjust_price_for_all_products(
        &self,
        min_ratio: f64,
        max_ratio: f64,
    ) -> PricingResult<Vec<AdjustedPrice>> {
        let bounds = PriceBounds::new(min_ratio, max_ratio)?;
        let coefficients = self.require_coefficients().await?;

        let products = self.store.all_product_pricing().await?;
        if products.is_empty() {
            return Err(PricingError::NoProductData);
        }

        let decisions = products
            .iter()
            .map(|pricing| adjust::decide(pricing, &coefficients, &bounds))
            .collect::<PricingResult<Vec<_>>>()?;

        let adjustments: Vec<PriceAdjustment> =
            decisions.iter().map(PriceAdjustment::from).collect();
        self.store.apply_adjustments(&adjustments).await?;

        let clamped = decisions.iter().filter(|d| d.was_clamped()).count();
        if clamped > 0 {
            info!(
                clamped,
                pct = clamped as f64 / decisions.len() as f64 * 100.0,
                "Products had price adjustments bounded"
            );
        }
        info!(
            products = decisions.len(),
            model_version = %coefficients.model_version,
            "Adjusted prices for all products"
        );

        Ok(decisions
            .into_iter()
            .map(|d| AdjustedPrice {
                product_id: d.product_id,
                adjusted_price: d.new_price,
            })
            .collect())
    }
}
