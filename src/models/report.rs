use crate::ml::models::Prediction;
use crate::models::forecast::ForecastPoint;
use crate::models::risk::RiskCategory;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relevance of one feature to the classifier's decisions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Risk assessment for one observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub city: String,
    pub date: NaiveDate,

    /// Final category after merging classifier and forecaster
    pub category: RiskCategory,

    /// Classifier verdict with per-class probabilities
    pub classifier: Prediction<RiskCategory>,

    /// Matching forecast point, if the city had one for this date
    pub forecast: Option<ForecastPoint>,

    /// Category of the forecast likelihood under the configured thresholds
    pub forecast_category: Option<RiskCategory>,

    /// P(Medium) * 0.5 + P(High), in [0, 1]
    pub risk_score: f64,

    /// Most influential features, highest first
    pub feature_importances: Vec<FeatureImportance>,
}

/// Per-city roll-up of the reports and forecast horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitySummary {
    pub city: String,

    /// Date of the most recent report
    pub latest_date: NaiveDate,

    /// Category of the most recent report
    pub latest_category: RiskCategory,

    pub mean_risk_score: f64,

    /// Number of reports per category
    pub category_counts: BTreeMap<RiskCategory, usize>,

    /// Highest future forecast point
    pub peak_forecast: Option<ForecastPoint>,

    /// Category of the peak future likelihood
    pub outlook: Option<RiskCategory>,
}

impl CitySummary {
    /// Most severe of the latest category and the forecast outlook
    pub fn headline(&self) -> RiskCategory {
        match self.outlook {
            Some(outlook) => outlook.max(self.latest_category),
            None => self.latest_category,
        }
    }
}
