// Pulse pricing
// Computes per-product pricing features, fits a linear price-ratio model and applies
// bounded price adjustments to the catalog.

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod db;
pub mod errors;
pub mod features;
pub mod model;

// Re-export commonly used items
pub use config::Config;
pub use errors::{PricingError, PricingResult};
pub use features::{Feature, FeatureExtractor, VaderSentiment, PricingFeatures, SentimentScorer};
pub use model::{
    AdjustedPrice, ModelCoefficients, ModelStore, PgModelStore, PriceBounds, PricingModel,
};
