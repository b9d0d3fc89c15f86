use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::info;

use pulse_pricing::Config;

pub mod commands;
pub mod migrate;

#[derive(Parser)]
#[command(
    name = "pulse-pricing",
    about = "Pricing feature extraction and price adjustment model",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute and store pricing features for one product
    ComputeFeatures {
        /// Product to compute features for
        #[arg(short, long)]
        product_id: i32,
    },

    /// Compute and store pricing features for every product with metrics
    ComputeAllFeatures,

    /// Train a new pricing model from the stored features
    Train,

    /// Adjust the price of one product with the latest model
    AdjustPrice {
        /// Product to reprice
        #[arg(short, long)]
        product_id: i32,

        /// Lower bound of the adjustment ratio (defaults to PRICE_MIN_RATIO)
        #[arg(long)]
        min_ratio: Option<f64>,

        /// Upper bound of the adjustment ratio (defaults to PRICE_MAX_RATIO)
        #[arg(long)]
        max_ratio: Option<f64>,
    },

    /// Adjust the price of every product with the latest model
    AdjustPrices {
        /// Lower bound of the adjustment ratio (defaults to PRICE_MIN_RATIO)
        #[arg(long)]
        min_ratio: Option<f64>,

        /// Upper bound of the adjustment ratio (defaults to PRICE_MAX_RATIO)
        #[arg(long)]
        max_ratio: Option<f64>,
    },

    /// Show the latest trained model coefficients
    Coefficients,

    /// Run database migrations
    Migrate,
}

/// Execute CLI command with database pool
pub async fn run(cli: Cli, pool: PgPool, config: &Config) -> Result<()> {
    let pricing = &config.pricing;
    match cli.command {
        Commands::ComputeFeatures { product_id } => {
            info!("Computing features for product {}", product_id);
            commands::compute_features(pool, pricing, product_id).await?;
        }
        Commands::ComputeAllFeatures => {
            info!("Computing features for all products");
            commands::compute_all_features(pool, pricing).await?;
        }
        Commands::Train => {
            info!("Starting model training");
            commands::train(pool).await?;
        }
        Commands::AdjustPrice {
            product_id,
            min_ratio,
            max_ratio,
        } => {
            info!("Starting price adjustment for product {}", product_id);
            let min_ratio = min_ratio.unwrap_or(pricing.min_ratio);
            let max_ratio = max_ratio.unwrap_or(pricing.max_ratio);
            commands::adjust_price(pool, product_id, min_ratio, max_ratio).await?;
        }
        Commands::AdjustPrices {
            min_ratio,
            max_ratio,
        } => {
            info!("Starting adjusting all prices");
            let min_ratio = min_ratio.unwrap_or(pricing.min_ratio);
            let max_ratio = max_ratio.unwrap_or(pricing.max_ratio);
            commands::adjust_prices(pool, min_ratio, max_ratio).await?;
        }
        Commands::Coefficients => {
            commands::coefficients(pool).await?;
        }
        Commands::Migrate => {
            migrate::execute(pool).await?;
        }
    }
    Ok(())
}
