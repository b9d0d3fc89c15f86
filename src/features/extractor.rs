// Feature Extractor
// Runs the per-product aggregate queries and upserts the result into pricing_features

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, error, info};

use super::sentiment::{rescale_to_rating, SentimentScorer};
use super::PricingFeatures;
use crate::errors::PricingResult;

pub const DEFAULT_VELOCITY_WINDOW_DAYS: i32 = 30;

const NUMERIC_REVIEW_WEIGHT: f64 = 0.7;
const SENTIMENT_REVIEW_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Result of a pass over every product in the catalog
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkFeatureReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: Vec<(i32, String)>,
}

pub struct FeatureExtractor {
    pool: PgPool,
    sentiment: Arc<dyn SentimentScorer>,
    velocity_window_days: i32,
}

impl FeatureExtractor {
    pub fn new(pool: PgPool, sentiment: Arc<dyn SentimentScorer>) -> Self {
        Self {
            pool,
            sentiment,
            velocity_window_days: DEFAULT_VELOCITY_WINDOW_DAYS,
        }
    }

    pub fn with_velocity_window(mut self, days: i32) -> Self {
        self.velocity_window_days = days;
        self
    }

    /// Whole days since the product's last recorded sale
    pub async fn days_since_last_sale(&self, product_id: i32) -> PricingResult<Option<i32>> {
        let last_sale: Option<DateTime<Utc>> = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT last_sale
            FROM product_metrics
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        let days = last_sale.map(|ts| whole_days_since(ts, Utc::now()));
        debug!(product_id, ?days, "days since last sale");
        Ok(days)
    }

    /// Sales per day over the trailing window
    pub async fn sales_velocity(&self, product_id: i32, window_days: i32) -> PricingResult<f64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sales
            WHERE product_id = $1
            AND created_at >= NOW() - INTERVAL '1 day' * $2
            "#,
        )
        .bind(product_id)
        .bind(window_days as f64)
        .fetch_one(&self.pool)
        .await?;

        let velocity = sales_velocity_from_count(count, window_days);
        debug!(product_id, window_days, count, velocity, "sales velocity");
        Ok(velocity)
    }

    pub async fn total_sales_count(&self, product_id: i32) -> PricingResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM sales
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        debug!(product_id, count, "total sales count");
        Ok(count)
    }

    /// Lifetime revenue (price x quantity)
    pub async fn total_sales_value(&self, product_id: i32) -> PricingResult<f64> {
        let value: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT SUM(sale_price * quantity)::DOUBLE PRECISION
            FROM sales
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        let value = value.unwrap_or(0.0);
        debug!(product_id, value, "total sales value");
        Ok(value)
    }

    /// Revenue percentile rank among products in the same category
    pub async fn category_percentile(&self, product_id: i32) -> PricingResult<f64> {
        let percentile: Option<f64> = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            WITH category_sales AS (
                SELECT
                    p.id,
                    p.category_id,
                    COALESCE(SUM(s.sale_price * s.quantity), 0)::DOUBLE PRECISION AS total_sales
                FROM products p
                LEFT JOIN sales s ON p.id = s.product_id
                GROUP BY p.id, p.category_id
            ),
            category_rankings AS (
                SELECT
                    id,
                    PERCENT_RANK() OVER (PARTITION BY category_id ORDER BY total_sales) AS sales_percentile
                FROM category_sales
            )
            SELECT sales_percentile
            FROM category_rankings
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        let percentile = percentile.unwrap_or(0.0);
        debug!(product_id, percentile, "category percentile");
        Ok(percentile)
    }

    /// Average rating blended with the sentiment of written reviews
    pub async fn review_score(&self, product_id: i32) -> PricingResult<f64> {
        let average_rating: Option<f64> = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT average_rating
            FROM product_metrics
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        let review_texts: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT review_text
            FROM reviews
            WHERE product_id = $1
            AND review_text IS NOT NULL
            AND TRIM(review_text) <> ''
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let numeric = average_rating.unwrap_or(0.0);
        let polarities: Vec<f64> = review_texts
            .iter()
            .map(|text| self.sentiment.polarity(text))
            .collect();

        let score = blend_review_score(numeric, &polarities);
        debug!(
            product_id,
            numeric,
            reviews = polarities.len(),
            score,
            "review score"
        );
        Ok(score)
    }

    pub async fn wishlist_to_sales_ratio(&self, product_id: i32) -> PricingResult<f64> {
        let row: Option<(Option<i64>, i64)> = sqlx::query_as(
            r#"
            SELECT
                pm.wishlist_count,
                COUNT(s.id)
            FROM product_metrics pm
            LEFT JOIN sales s ON pm.product_id = s.product_id
            WHERE pm.product_id = $1
            GROUP BY pm.wishlist_count
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        let ratio = match row {
            Some((wishlist_count, sales_count)) => wishlist_ratio(wishlist_count, sales_count),
            None => 0.0,
        };
        debug!(product_id, ratio, "wishlist to sales ratio");
        Ok(ratio)
    }

    /// Whole days since the most recent restock event
    pub async fn days_since_restock(&self, product_id: i32) -> PricingResult<Option<i32>> {
        let last_restock: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT created_at
            FROM stock_history
            WHERE product_id = $1
            AND event_type = 'restock'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        let days = last_restock.map(|ts| whole_days_since(ts, Utc::now()));
        debug!(product_id, ?days, "days since restock");
        Ok(days)
    }

    pub async fn compute_all_features(&self, product_id: i32) -> PricingResult<PricingFeatures> {
        info!(product_id, "Computing pricing features");

        let features = PricingFeatures {
            product_id,
            days_since_last_sale: self.days_since_last_sale(product_id).await?,
            sales_velocity: self
                .sales_velocity(product_id, self.velocity_window_days)
                .await?,
            total_sales_count: self.total_sales_count(product_id).await?,
            total_sales_value: self.total_sales_value(product_id).await?,
            category_percentile: self.category_percentile(product_id).await?,
            review_score: self.review_score(product_id).await?,
            wishlist_to_sales_ratio: self.wishlist_to_sales_ratio(product_id).await?,
            days_since_restock: self.days_since_restock(product_id).await?,
            computed_at: Utc::now(),
        };

        info!(product_id, features = ?features, "Pricing features computed");
        Ok(features)
    }

    /// Compute and persist the features for one product.
    ///
    /// Failures are reported in the returned status instead of propagated:
    /// `"success"` or `"error: <cause>"`.
    pub async fn process_features(&self, product_id: i32) -> String {
        let result: PricingResult<UpsertOutcome> = async {
            let features = self.compute_all_features(product_id).await?;
            self.upsert_features(&features).await
        }
        .await;

        match result {
            Ok(outcome) => {
                info!(product_id, ?outcome, "process_features completed");
                "success".to_string()
            }
            Err(e) => {
                error!(product_id, error = %e, "process_features failed");
                format!("error: {}", e)
            }
        }
    }

    /// Insert the row, or overwrite every non-key column when it already exists
    pub async fn upsert_features(&self, features: &PricingFeatures) -> PricingResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM pricing_features WHERE product_id = $1",
        )
        .bind(features.product_id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        let query = if exists {
            r#"
            UPDATE pricing_features
            SET days_since_last_sale = $2,
                sales_velocity = $3,
                total_sales_count = $4,
                total_sales_value = $5,
                category_percentile = $6,
                review_score = $7,
                wishlist_to_sales_ratio = $8,
                days_since_restock = $9,
                computed_at = $10
            WHERE product_id = $1
            "#
        } else {
            r#"
            INSERT INTO pricing_features (
                product_id, days_since_last_sale, sales_velocity, total_sales_count,
                total_sales_value, category_percentile, review_score,
                wishlist_to_sales_ratio, days_since_restock, computed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#
        };

        sqlx::query(query)
            .bind(features.product_id)
            .bind(features.days_since_last_sale)
            .bind(features.sales_velocity)
            .bind(features.total_sales_count)
            .bind(features.total_sales_value)
            .bind(features.category_percentile)
            .bind(features.review_score)
            .bind(features.wishlist_to_sales_ratio)
            .bind(features.days_since_restock)
            .bind(features.computed_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let outcome = if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        info!(product_id = features.product_id, ?outcome, "Pricing features saved");
        Ok(outcome)
    }

    /// Stored feature row for a product, if any
    pub async fn read_features(&self, product_id: i32) -> PricingResult<Option<PricingFeatures>> {
        let features = sqlx::query_as::<_, PricingFeatures>(
            r#"
            SELECT
                product_id,
                days_since_last_sale,
                sales_velocity,
                total_sales_count,
                total_sales_value,
                category_percentile,
                review_score,
                wishlist_to_sales_ratio,
                days_since_restock,
                computed_at
            FROM pricing_features
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(features)
    }

    pub async fn product_ids(&self) -> PricingResult<Vec<i32>> {
        let ids = sqlx::query_scalar("SELECT product_id FROM product_metrics ORDER BY product_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Run `process_features` for every product with metrics
    pub async fn process_all_features(&self) -> PricingResult<BulkFeatureReport> {
        let ids = self.product_ids().await?;
        info!(products = ids.len(), "Processing features for all products");

        let mut report = BulkFeatureReport::default();
        for product_id in ids {
            let status = self.process_features(product_id).await;
            report.processed += 1;
            if status == "success" {
                report.succeeded += 1;
            } else {
                report.failed.push((product_id, status));
            }
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "Bulk feature processing finished"
        );
        Ok(report)
    }
}

/// Whole days elapsed from `then` to `now`, truncated
pub fn whole_days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    (now - then).num_days() as i32
}

pub fn sales_velocity_from_count(count: i64, window_days: i32) -> f64 {
    if count <= 0 || window_days <= 0 {
        return 0.0;
    }
    count as f64 / window_days as f64
}

pub fn wishlist_ratio(wishlist_count: Option<i64>, sales_count: i64) -> f64 {
    match wishlist_count {
        Some(wishlist) if wishlist != 0 && sales_count > 0 => wishlist as f64 / sales_count as f64,
        _ => 0.0,
    }
}

/// 70% numeric rating, 30% review sentiment rescaled to 0..=5.
/// Without any polarities the numeric rating is returned unchanged.
pub fn blend_review_score(numeric: f64, polarities: &[f64]) -> f64 {
    if polarities.is_empty() {
        return numeric;
    }
    let avg = polarities.iter().sum::<f64>() / polarities.len() as f64;
    NUMERIC_REVIEW_WEIGHT * numeric + SENTIMENT_REVIEW_WEIGHT * rescale_to_rating(avg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_whole_days_truncates() {
        let now = Utc::now();
        assert_eq!(whole_days_since(now - Duration::hours(47), now), 1);
        assert_eq!(whole_days_since(now - Duration::days(10), now), 10);
        assert_eq!(whole_days_since(now, now), 0);
    }

    #[test]
    fn test_velocity_without_sales_is_zero() {
        assert_eq!(sales_velocity_from_count(0, 30), 0.0);
        assert_eq!(sales_velocity_from_count(15, 30), 0.5);
        assert_eq!(sales_velocity_from_count(5, 0), 0.0);
    }

    #[test]
    fn test_wishlist_ratio_guards_zero() {
        assert_eq!(wishlist_ratio(Some(10), 0), 0.0);
        assert_eq!(wishlist_ratio(Some(0), 4), 0.0);
        assert_eq!(wishlist_ratio(None, 4), 0.0);
        assert_eq!(wishlist_ratio(Some(10), 4), 2.5);
    }

    #[test]
    fn test_review_score_without_text_is_numeric() {
        assert_eq!(blend_review_score(4.2, &[]), 4.2);
        assert_eq!(blend_review_score(0.0, &[]), 0.0);
    }

    #[test]
    fn test_review_score_blends_sentiment() {
        // avg polarity 0.2 -> (1.2 * 2.5) = 3.0
        let score = blend_review_score(4.0, &[0.6, -0.2]);
        assert!((score - (0.7 * 4.0 + 0.3 * 3.0)).abs() < 1e-12);

        let all_negative = blend_review_score(5.0, &[-1.0]);
        assert!((all_negative - 3.5).abs() < 1e-12);
    }
}
