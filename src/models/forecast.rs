use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether a forecast point lies inside the fitted history or beyond it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForecastHorizon {
    History,
    Future,
}

/// Uncertainty band around a forecast value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,

    /// Nominal coverage, e.g. 0.8
    pub width: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Predicted outbreak likelihood for one city-day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub city: String,
    pub date: NaiveDate,

    /// Expected case count, never negative
    pub likelihood: f64,

    pub interval: ConfidenceInterval,
    pub horizon: ForecastHorizon,
}

impl ForecastPoint {
    /// Build a point, clamping everything to the non-negative range and
    /// keeping `lower <= likelihood <= upper`.
    pub fn new(
        city: impl Into<String>,
        date: NaiveDate,
        likelihood: f64,
        lower: f64,
        upper: f64,
        width: f64,
        horizon: ForecastHorizon,
    ) -> Self {
        let likelihood = clamp_non_negative(likelihood);
        let lower = clamp_non_negative(lower).min(likelihood);
        let upper = clamp_non_negative(upper).max(likelihood);

        Self {
            city: city.into(),
            date,
            likelihood,
            interval: ConfidenceInterval {
                lower,
                upper,
                width,
            },
            horizon,
        }
    }

    pub fn is_future(&self) -> bool {
        self.horizon == ForecastHorizon::Future
    }
}

fn clamp_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
