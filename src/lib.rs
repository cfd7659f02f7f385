//! City-level arbovirus outbreak risk from daily weather.
//!
//! Observations flow through feature engineering, mutual-information
//! selection, class rebalancing and a Random Forest classifier, while a
//! per-city seasonal forecaster projects case counts forward. The reporter
//! merges both into Low / Medium / High risk reports.

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod forecasting;
pub mod ml;
pub mod models;
pub mod pipeline;
pub mod reporting;
pub mod service;

pub use config::Config;
pub use error::{AppError, Result};
pub use pipeline::{EvaluationReport, RiskOutcome, RiskPipeline, TrainingSummary};
pub use service::{RiskService, RiskServiceStats};
