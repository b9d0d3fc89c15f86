use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

use pulse_pricing::config::PricingConfig;
use pulse_pricing::{FeatureExtractor, VaderSentiment, PgModelStore, PricingModel};

fn extractor(pool: PgPool, pricing: &PricingConfig) -> FeatureExtractor {
    FeatureExtractor::new(pool, Arc::new(VaderSentiment::new()))
        .with_velocity_window(pricing.velocity_window_days)
}

fn model(pool: PgPool) -> PricingModel<PgModelStore> {
    PricingModel::new(PgModelStore::new(pool))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Compute and store features for one product
pub async fn compute_features(pool: PgPool, pricing: &PricingConfig, product_id: i32) -> Result<()> {
    let status = extractor(pool, pricing).process_features(product_id).await;
    print_json(&json!({ "result": status }))?;

    if status != "success" {
        bail!("Feature computation failed for product {}: {}", product_id, status);
    }
    Ok(())
}

/// Compute and store features for every product with metrics
pub async fn compute_all_features(pool: PgPool, pricing: &PricingConfig) -> Result<()> {
    let report = extractor(pool, pricing)
        .process_all_features()
        .await
        .context("Failed to list products for feature computation")?;

    print_json(&json!({ "result": report }))?;

    if !report.failed.is_empty() {
        warn!(
            failed = report.failed.len(),
            "Some products failed feature computation"
        );
    }
    Ok(())
}

/// Train a new model from the stored feature rows
pub async fn train(pool: PgPool) -> Result<()> {
    let coefficients = model(pool)
        .train_model()
        .await
        .context("Error training model")?;

    print_json(&json!({
        "status": "success",
        "message": "Model training completed successfully",
        "model_version": coefficients.model_version,
        "metrics": {
            "r_squared": coefficients.r_squared,
            "mse": coefficients.mse,
            "rmse": coefficients.rmse,
            "mae": coefficients.mae,
            "sample_size": coefficients.sample_size,
        },
        "coefficients": coefficients.coefficients,
    }))
}

/// Reprice one product
pub async fn adjust_price(pool: PgPool, product_id: i32, min_ratio: f64, max_ratio: f64) -> Result<()> {
    let price = model(pool)
        .adjust_price_for_product(product_id, min_ratio, max_ratio)
        .await
        .with_context(|| format!("Error adjusting price for product {}", product_id))?;

    print_json(&json!({ "result": price }))
}

/// Reprice every product that has a feature row
pub async fn adjust_prices(pool: PgPool, min_ratio: f64, max_ratio: f64) -> Result<()> {
    let prices = model(pool)
        .adjust_price_for_all_products(min_ratio, max_ratio)
        .await
        .context("Error adjusting all prices")?;

    info!("Adjusted {} prices", prices.len());
    print_json(&json!({ "result": prices }))
}

/// Print the most recent coefficient set, or null when none exists
pub async fn coefficients(pool: PgPool) -> Result<()> {
    let latest = model(pool)
        .get_model_coefficients()
        .await
        .context("Failed to load model coefficients")?;

    print_json(&json!({ "result": latest }))
}
