use thiserror::Error;

/// Error types for feature extraction, training and price adjustment
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No training data available")]
    NoTrainingData,

    #[error("Not enough training data: {samples} examples for {parameters} fitted parameters")]
    InsufficientSamples { samples: usize, parameters: usize },

    #[error("No model coefficients found in database")]
    NoCoefficients,

    #[error("No data found for product {0}")]
    ProductNotFound(i32),

    #[error("No product data found")]
    NoProductData,

    #[error("Coefficient set does not match features (missing: {missing:?}, unexpected: {unexpected:?})")]
    FeatureMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Invalid price bounds: min_ratio={min_ratio}, max_ratio={max_ratio}")]
    InvalidBounds { min_ratio: f64, max_ratio: f64 },

    #[error("Model produced a non-finite adjustment ratio for product {product_id}")]
    NonFiniteRatio { product_id: i32 },

    #[error("Regression error: {0}")]
    Regression(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pricing operations
pub type PricingResult<T> = Result<T, PricingError>;

impl PricingError {
    /// Precondition failures abort an operation but say nothing about storage health
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PricingError::NoTrainingData
                | PricingError::InsufficientSamples { .. }
                | PricingError::NoCoefficients
                | PricingError::ProductNotFound(_)
                | PricingError::NoProductData
                | PricingError::FeatureMismatch { .. }
                | PricingError::InvalidBounds { .. }
        )
    }

    pub fn regression<S: Into<String>>(message: S) -> Self {
        PricingError::Regression(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(PricingError::NoTrainingData.is_precondition());
        assert!(PricingError::ProductNotFound(7).is_precondition());
        assert!(!PricingError::regression("singular").is_precondition());
        assert!(!PricingError::Database(sqlx::Error::RowNotFound).is_precondition());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = PricingError::ProductNotFound(42);
        assert_eq!(err.to_string(), "No data found for product 42");

        let err = PricingError::InsufficientSamples { samples: 3, parameters: 9 };
        assert!(err.to_string().contains("3 examples"));
    }
}
