use crate::error::{AppError, Result};
use crate::models::risk::{RiskCategory, RiskThresholds};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

/// Names of the weather columns, in feature order
pub const WEATHER_COLUMNS: [&str; 4] = [
    "temperature_2m_max",
    "temperature_2m_min",
    "precipitation_sum",
    "wind_speed_10m_max",
];

/// Daily weather for one city. Any value may be missing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WeatherReading {
    /// Daily maximum temperature at 2m (°C)
    pub temperature_2m_max: Option<f64>,

    /// Daily minimum temperature at 2m (°C)
    pub temperature_2m_min: Option<f64>,

    /// Daily precipitation (mm)
    pub precipitation_sum: Option<f64>,

    /// Daily maximum wind speed at 10m (km/h)
    pub wind_speed_10m_max: Option<f64>,
}

impl WeatherReading {
    pub fn new(t_max: f64, t_min: f64, precipitation: f64, wind: f64) -> Self {
        Self {
            temperature_2m_max: Some(t_max),
            temperature_2m_min: Some(t_min),
            precipitation_sum: Some(precipitation),
            wind_speed_10m_max: Some(wind),
        }
    }

    /// Values in [`WEATHER_COLUMNS`] order
    pub fn values(&self) -> [Option<f64>; 4] {
        [
            self.temperature_2m_max,
            self.temperature_2m_min,
            self.precipitation_sum,
            self.wind_speed_10m_max,
        ]
    }

    /// Look up a column by name
    pub fn get(&self, column: &str) -> Option<f64> {
        WEATHER_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|idx| self.values()[idx])
    }
}

/// A single city-day input record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Observation {
    /// City name
    #[validate(length(min = 1, max = 255))]
    pub city: String,

    /// Observation date
    pub date: NaiveDate,

    /// Weather for the day
    pub weather: WeatherReading,

    /// Reported arbovirus cases for the day
    #[validate(range(min = 0.0))]
    pub cases: f64,
}

impl Observation {
    pub fn new(city: impl Into<String>, date: NaiveDate, weather: WeatherReading) -> Self {
        Self {
            city: city.into(),
            date,
            weather,
            cases: 0.0,
        }
    }

    pub fn with_cases(mut self, cases: f64) -> Self {
        self.cases = cases;
        self
    }

    /// Identity of the record within a batch
    pub fn key(&self) -> (&str, NaiveDate) {
        (self.city.as_str(), self.date)
    }
}

/// Observation with its historical risk label, used only for training
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledExample {
    pub observation: Observation,
    pub label: RiskCategory,
}

impl LabeledExample {
    pub fn new(observation: Observation, label: RiskCategory) -> Self {
        Self { observation, label }
    }

    /// Label an observation from its case count
    pub fn from_cases(observation: Observation, thresholds: &RiskThresholds) -> Self {
        let label = thresholds.categorize(observation.cases);
        Self { observation, label }
    }
}

/// Validate every record and reject duplicate (city, date) pairs
pub fn validate_batch<'a, I>(observations: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut seen = HashSet::new();
    for observation in observations {
        observation.validate()?;
        if !seen.insert(observation.key()) {
            return Err(AppError::Validation(format!(
                "duplicate observation for {} on {}",
                observation.city, observation.date
            )));
        }
    }
    Ok(())
}
