// Model persistence
// Coefficients and adjustments are append-only; product_metrics.adjusted_price is overwritten

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::debug;

use super::adjust::PriceDecision;
use super::coefficients::ModelCoefficients;
use crate::errors::PricingResult;
use crate::features::{Feature, PricingFeatures};

/// Feature row joined with its catalog prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductPricing {
    #[sqlx(flatten)]
    pub features: PricingFeatures,
    pub base_price: f64,
    pub adjusted_price: Option<f64>,
}

impl ProductPricing {
    /// Observed `adjusted_price / base_price`, when the product has been priced before
    pub fn observed_ratio(&self) -> Option<f64> {
        self.adjusted_price.map(|adjusted| adjusted / self.base_price)
    }
}

/// One `price_adjustments` audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceAdjustment {
    pub product_id: i32,
    pub old_price: Option<f64>,
    pub new_price: f64,
    pub model_version: String,
}

impl From<&PriceDecision> for PriceAdjustment {
    fn from(decision: &PriceDecision) -> Self {
        Self {
            product_id: decision.product_id,
            old_price: decision.old_price,
            new_price: decision.new_price,
            model_version: decision.model_version.clone(),
        }
    }
}

/// Storage seam for training and inference
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Products that have both a feature row and a non-null adjusted price
    async fn training_rows(&self) -> PricingResult<Vec<ProductPricing>>;

    /// Append a coefficient set. Never updates existing rows.
    async fn insert_coefficients(&self, coefficients: &ModelCoefficients) -> PricingResult<()>;

    /// Most recently trained coefficient set
    async fn latest_coefficients(&self) -> PricingResult<Option<ModelCoefficients>>;

    async fn product_pricing(&self, product_id: i32) -> PricingResult<Option<ProductPricing>>;

    async fn all_product_pricing(&self) -> PricingResult<Vec<ProductPricing>>;

    /// Write each new price into the catalog and append its audit row, atomically
    async fn apply_adjustments(&self, adjustments: &[PriceAdjustment]) -> PricingResult<()>;
}

const PRICING_SELECT: &str = r#"
    SELECT
        pf.product_id,
        pf.days_since_last_sale,
        pf.sales_velocity,
        pf.total_sales_count,
        pf.total_sales_value,
        pf.category_percentile,
        pf.review_score,
        pf.wishlist_to_sales_ratio,
        pf.days_since_restock,
        pf.computed_at,
        pm.base_price,
        pm.adjusted_price
    FROM pricing_features pf
    JOIN product_metrics pm ON pf.product_id = pm.product_id
"#;

pub struct PgModelStore {
    pool: PgPool,
}

impl PgModelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn coefficients_from_row(row: &PgRow) -> PricingResult<ModelCoefficients> {
        let mut coefficients = BTreeMap::new();
        for feature in Feature::ALL {
            let weight: f64 = row.try_get(feature.coefficient_column().as_str())?;
            coefficients.insert(feature.name().to_string(), weight);
        }

        Ok(ModelCoefficients {
            model_version: row.try_get("model_version")?,
            training_date: row.try_get::<DateTime<Utc>, _>("training_date")?,
            sample_size: row.try_get("sample_size")?,
            r_squared: row.try_get("r_squared")?,
            mse: row.try_get("mse")?,
            rmse: row.try_get("rmse")?,
            mae: row.try_get("mae")?,
            coefficients,
        })
    }
}

#[async_trait]
impl ModelStore for PgModelStore {
    async fn training_rows(&self) -> PricingResult<Vec<ProductPricing>> {
        let sql = format!(
            "{} WHERE pm.adjusted_price IS NOT NULL ORDER BY pf.product_id",
            PRICING_SELECT
        );
        let rows = sqlx::query_as::<_, ProductPricing>(&sql)
            .fetch_all(&self.pool)
            .await?;
        debug!(rows = rows.len(), "Fetched training data");
        Ok(rows)
    }

    async fn insert_coefficients(&self, coefficients: &ModelCoefficients) -> PricingResult<()> {
        coefficients.validate(&Feature::ALL)?;

        let weight_columns: Vec<String> =
            Feature::ALL.iter().map(|f| f.coefficient_column()).collect();
        let placeholders: Vec<String> = (0..weight_columns.len())
            .map(|i| format!("${}", i + 8))
            .collect();
        let sql = format!(
            r#"
            INSERT INTO price_model_coefficients (
                model_version, training_date, sample_size, r_squared, mse, rmse, mae, {}
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, {})
            "#,
            weight_columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql)
            .bind(&coefficients.model_version)
            .bind(coefficients.training_date)
            .bind(coefficients.sample_size)
            .bind(coefficients.r_squared)
            .bind(coefficients.mse)
            .bind(coefficients.rmse)
            .bind(coefficients.mae);
        for feature in Feature::ALL {
            query = query.bind(coefficients.weight(feature).unwrap_or(0.0));
        }
        query.execute(&self.pool).await?;

        debug!(model_version = %coefficients.model_version, "Saved model coefficients");
        Ok(())
    }

    async fn latest_coefficients(&self) -> PricingResult<Option<ModelCoefficients>> {
        let row = sqlx::query(
            r#"
            SELECT *
            FROM price_model_coefficients
            ORDER BY training_date DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::coefficients_from_row).transpose()
    }

    async fn product_pricing(&self, product_id: i32) -> PricingResult<Option<ProductPricing>> {
        let sql = format!("{} WHERE pf.product_id = $1", PRICING_SELECT);
        let row = sqlx::query_as::<_, ProductPricing>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn all_product_pricing(&self) -> PricingResult<Vec<ProductPricing>> {
        let sql = format!("{} ORDER BY pf.product_id", PRICING_SELECT);
        let rows = sqlx::query_as::<_, ProductPricing>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn apply_adjustments(&self, adjustments: &[PriceAdjustment]) -> PricingResult<()> {
        let mut tx = self.pool.begin().await?;

        for adjustment in adjustments {
            sqlx::query(
                r#"
                UPDATE product_metrics
                SET adjusted_price = $1
                WHERE product_id = $2
                "#,
            )
            .bind(adjustment.new_price)
            .bind(adjustment.product_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO price_adjustments (product_id, old_price, new_price, model_version)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(adjustment.product_id)
            .bind(adjustment.old_price)
            .bind(adjustment.new_price)
            .bind(&adjustment.model_version)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = adjustments.len(), "Applied price adjustments");
        Ok(())
    }
}
