//! Per-product pricing features
//! Aggregates sales, review and stock history into the eight model inputs

pub mod extractor;
pub mod sentiment;

pub use extractor::{FeatureExtractor, UpsertOutcome};
pub use sentiment::{VaderSentiment, SentimentScorer};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The eight model inputs, in training order.
///
/// Everything that pairs a feature with a value or a coefficient goes through
/// `Feature::name`, never through a positional index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    DaysSinceLastSale,
    SalesVelocity,
    TotalSalesCount,
    TotalSalesValue,
    CategoryPercentile,
    ReviewScore,
    WishlistToSalesRatio,
    DaysSinceRestock,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::DaysSinceLastSale,
        Feature::SalesVelocity,
        Feature::TotalSalesCount,
        Feature::TotalSalesValue,
        Feature::CategoryPercentile,
        Feature::ReviewScore,
        Feature::WishlistToSalesRatio,
        Feature::DaysSinceRestock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::DaysSinceLastSale => "days_since_last_sale",
            Feature::SalesVelocity => "sales_velocity",
            Feature::TotalSalesCount => "total_sales_count",
            Feature::TotalSalesValue => "total_sales_value",
            Feature::CategoryPercentile => "category_percentile",
            Feature::ReviewScore => "review_score",
            Feature::WishlistToSalesRatio => "wishlist_to_sales_ratio",
            Feature::DaysSinceRestock => "days_since_restock",
        }
    }

    /// Column holding this feature's weight in `price_model_coefficients`
    pub fn coefficient_column(self) -> String {
        format!("{}_coef", self.name())
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One row of `pricing_features`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PricingFeatures {
    pub product_id: i32,
    pub days_since_last_sale: Option<i32>,
    pub sales_velocity: f64,
    pub total_sales_count: i64,
    pub total_sales_value: f64,
    pub category_percentile: f64,
    pub review_score: f64,
    pub wishlist_to_sales_ratio: f64,
    pub days_since_restock: Option<i32>,
    pub computed_at: DateTime<Utc>,
}

impl PricingFeatures {
    /// Numeric value of one feature. Absent day counts read as 0.0.
    pub fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::DaysSinceLastSale => self.days_since_last_sale.map(f64::from).unwrap_or(0.0),
            Feature::SalesVelocity => self.sales_velocity,
            Feature::TotalSalesCount => self.total_sales_count as f64,
            Feature::TotalSalesValue => self.total_sales_value,
            Feature::CategoryPercentile => self.category_percentile,
            Feature::ReviewScore => self.review_score,
            Feature::WishlistToSalesRatio => self.wishlist_to_sales_ratio,
            Feature::DaysSinceRestock => self.days_since_restock.map(f64::from).unwrap_or(0.0),
        }
    }

    /// (name, value) pairs for every feature
    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        Feature::ALL
            .iter()
            .map(|&f| (f.name(), self.value(f)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PricingFeatures {
        PricingFeatures {
            product_id: 1,
            days_since_last_sale: None,
            sales_velocity: 0.5,
            total_sales_count: 12,
            total_sales_value: 340.0,
            category_percentile: 0.75,
            review_score: 4.1,
            wishlist_to_sales_ratio: 0.25,
            days_since_restock: Some(9),
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_feature_names_are_unique_and_round_trip() {
        let mut names: Vec<&str> = Feature::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);

        for feature in Feature::ALL {
            assert_eq!(Feature::from_name(feature.name()), Some(feature));
        }
        assert_eq!(Feature::from_name("seasonal_factor"), None);
    }

    #[test]
    fn test_coefficient_column_naming() {
        assert_eq!(
            Feature::WishlistToSalesRatio.coefficient_column(),
            "wishlist_to_sales_ratio_coef"
        );
    }

    #[test]
    fn test_missing_day_counts_read_as_zero() {
        let features = sample();
        assert_eq!(features.value(Feature::DaysSinceLastSale), 0.0);
        assert_eq!(features.value(Feature::DaysSinceRestock), 9.0);
        assert_eq!(features.value(Feature::TotalSalesCount), 12.0);
    }

    #[test]
    fn test_named_values_follow_feature_order() {
        let values = sample().named_values();
        let names: Vec<&str> = values.iter().map(|(n, _)| *n).collect();
        assert_eq!(names[0], "days_since_last_sale");
        assert_eq!(names[7], "days_since_restock");
        assert_eq!(values[4].1, 0.75);
    }
}
