use crate::error::{AppError, Result};
use crate::models::{validate_batch, LabeledExample, Observation, RiskCategory, RiskThresholds, WeatherReading};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// One row of an input CSV. Columns not listed here are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationRecord {
    pub city: String,
    pub date: NaiveDate,
    pub temperature_2m_max: Option<f64>,
    pub temperature_2m_min: Option<f64>,
    pub precipitation_sum: Option<f64>,
    pub wind_speed_10m_max: Option<f64>,

    #[serde(default)]
    pub cases: Option<f64>,

    /// Historical risk label (`Low`, `Medium`, `High`)
    #[serde(default)]
    pub risk: Option<String>,
}

impl ObservationRecord {
    fn into_observation(self) -> Observation {
        let weather = WeatherReading {
            temperature_2m_max: self.temperature_2m_max,
            temperature_2m_min: self.temperature_2m_min,
            precipitation_sum: self.precipitation_sum,
            wind_speed_10m_max: self.wind_speed_10m_max,
        };
        Observation::new(self.city, self.date, weather).with_cases(self.cases.unwrap_or(0.0))
    }
}

fn parse_records<R: Read>(reader: R) -> Result<Vec<ObservationRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: ObservationRecord = result?;
        records.push(record);
    }

    Ok(records)
}

/// Read unlabeled observations. A missing `cases` value counts as zero.
pub fn read_observations<R: Read>(reader: R) -> Result<Vec<Observation>> {
    let observations: Vec<Observation> = parse_records(reader)?
        .into_iter()
        .map(ObservationRecord::into_observation)
        .collect();

    validate_batch(&observations)?;
    Ok(observations)
}

/// Read training examples.
///
/// The label comes from the `risk` column when present, otherwise from
/// `cases` under the given thresholds. A row with neither is rejected.
pub fn read_labeled<R: Read>(reader: R, thresholds: &RiskThresholds) -> Result<Vec<LabeledExample>> {
    let examples = parse_records(reader)?
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let explicit = match record.risk.as_deref().filter(|r| !r.is_empty()) {
                Some(risk) => Some(risk.parse::<RiskCategory>().map_err(|_| {
                    AppError::Validation(format!("row {}: unknown risk label '{}'", i + 1, risk))
                })?),
                None => None,
            };
            let has_cases = record.cases.is_some();
            let observation = record.into_observation();

            match (explicit, has_cases) {
                (Some(label), _) => Ok(LabeledExample::new(observation, label)),
                (None, true) => Ok(LabeledExample::from_cases(observation, thresholds)),
                (None, false) => Err(AppError::Validation(format!(
                    "row {}: needs a risk label or a case count",
                    i + 1
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    validate_batch(examples.iter().map(|e| &e.observation))?;
    Ok(examples)
}

pub fn load_observations(path: &Path) -> Result<Vec<Observation>> {
    let file = std::fs::File::open(path)?;
    let observations = read_observations(file)?;
    info!("Loaded {} observations from {}", observations.len(), path.display());
    Ok(observations)
}

pub fn load_labeled(path: &Path, thresholds: &RiskThresholds) -> Result<Vec<LabeledExample>> {
    let file = std::fs::File::open(path)?;
    let examples = read_labeled(file, thresholds)?;
    info!("Loaded {} labeled examples from {}", examples.len(), path.display());
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
city,date,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max,cases,risk,source
Recife,2024-01-01,31.2,24.0,0.0,12.5,0,low,station
Recife,2024-01-02,32.0,,4.2,10.1,7,,station
Natal,2024-01-01,30.1,23.5,1.0,15.0,2,Medium,station
";

    #[test]
    fn test_read_observations() {
        let observations = read_observations(SAMPLE.as_bytes()).unwrap();
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[1].weather.temperature_2m_min, None);
        assert_eq!(observations[1].cases, 7.0);
        assert_eq!(observations[2].city, "Natal");
    }

    #[test]
    fn test_read_labeled() {
        let examples = read_labeled(SAMPLE.as_bytes(), &RiskThresholds::default()).unwrap();
        assert_eq!(examples[0].label, RiskCategory::Low);
        // No explicit label: 7 cases is High under the default thresholds
        assert_eq!(examples[1].label, RiskCategory::High);
        assert_eq!(examples[2].label, RiskCategory::Medium);
    }

    #[test]
    fn test_weather_only_file() {
        let data = "city,date,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max\n\
                    Belem,2024-03-01,30,23,5,8\n";
        let observations = read_observations(data.as_bytes()).unwrap();
        assert_eq!(observations[0].cases, 0.0);

        let err = read_labeled(data.as_bytes(), &RiskThresholds::default()).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_unknown_label_rejected() {
        let data = "city,date,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max,risk\n\
                    Belem,2024-03-01,30,23,5,8,severe\n";
        assert!(read_labeled(data.as_bytes(), &RiskThresholds::default()).is_err());
    }

    #[test]
    fn test_bad_date_is_csv_error() {
        let data = "city,date,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max\n\
                    Belem,03/01/2024,30,23,5,8\n";
        let err = read_observations(data.as_bytes()).unwrap_err();
        assert_eq!(err.error_code(), "CSV_ERROR");
    }

    #[test]
    fn test_duplicates_rejected() {
        let data = "city,date,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max\n\
                    Belem,2024-03-01,30,23,5,8\n\
                    Belem,2024-03-01,31,23,5,8\n";
        assert!(read_observations(data.as_bytes()).is_err());
    }
}
