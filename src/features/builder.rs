use crate::config::FeatureConfig;
use crate::error::{AppError, Result};
use crate::features::rolling::{fill_gaps, lag, rolling_mean, rolling_std};
use crate::features::temporal::{temporal_feature_names, temporal_features};
use crate::models::{validate_batch, Observation, WEATHER_COLUMNS};
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Feature vector for one observation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub city: String,
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

/// Named feature vectors, ordered by city then date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Value of a named feature for one row
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let column = self.names.iter().position(|n| n == name)?;
        self.rows.get(row).and_then(|r| r.values.get(column).copied())
    }

    /// Dense (n_rows × n_features) view for the models
    pub fn to_array(&self) -> Array2<f64> {
        let mut array = Array2::zeros((self.rows.len(), self.names.len()));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, &value) in row.values.iter().enumerate() {
                array[[i, j]] = value;
            }
        }
        array
    }

    /// Keep only the given columns, in the given order
    pub fn select(&self, columns: &[usize]) -> Result<FeatureMatrix> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.names.len()) {
            return Err(AppError::Internal(format!(
                "feature column {} out of range ({} features)",
                bad,
                self.names.len()
            )));
        }

        Ok(FeatureMatrix {
            names: columns.iter().map(|&c| self.names[c].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| FeatureRow {
                    city: row.city.clone(),
                    date: row.date,
                    values: columns.iter().map(|&c| row.values[c]).collect(),
                })
                .collect(),
        })
    }
}

/// Builds per-city, per-day feature vectors from raw observations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBuilder {
    /// Configuration
    config: FeatureConfig,

    /// Feature names in output order
    names: Vec<String>,

    /// Most recent training observations per city, used as lookback context
    history: HashMap<String, Vec<Observation>>,

    /// Is fitted (history captured)
    is_fitted: bool,
}

impl FeatureBuilder {
    /// Create a new feature builder
    pub fn new(config: FeatureConfig) -> Self {
        let names = Self::build_names(&config);
        Self {
            config,
            names,
            history: HashMap::new(),
            is_fitted: false,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Build features and remember each city's tail as context for later batches
    pub fn fit(&mut self, observations: &[Observation]) -> Result<FeatureMatrix> {
        let matrix = self.build(observations)?;

        let keep = self.config.lookback().max(1);
        self.history = group_by_city(observations.iter())
            .into_iter()
            .map(|(city, mut rows)| {
                let start = rows.len().saturating_sub(keep);
                let tail: Vec<Observation> = rows.drain(start..).cloned().collect();
                (city, tail)
            })
            .collect();
        self.is_fitted = true;

        info!(
            "Feature builder fitted on {} observations across {} cities ({} features)",
            observations.len(),
            self.history.len(),
            self.names.len()
        );

        Ok(matrix)
    }

    /// Build features for a standalone batch
    pub fn build(&self, observations: &[Observation]) -> Result<FeatureMatrix> {
        validate_batch(observations)?;

        let mut rows = Vec::with_capacity(observations.len());
        for (city, city_rows) in group_by_city(observations.iter()) {
            if let Some(built) = self.build_city(&city, &city_rows, 0) {
                rows.extend(built);
            }
        }

        Ok(FeatureMatrix {
            names: self.names.clone(),
            rows,
        })
    }

    /// Build features for a scoring batch, prepending remembered history so
    /// rolling and lag features see the days before the batch.
    pub fn build_with_context(&self, observations: &[Observation]) -> Result<FeatureMatrix> {
        validate_batch(observations)?;

        let lookback = self.config.lookback();
        let mut rows = Vec::with_capacity(observations.len());

        for (city, city_rows) in group_by_city(observations.iter()) {
            let first_date = city_rows[0].date;
            let context: Vec<&Observation> = self
                .history
                .get(&city)
                .map(|tail| {
                    let earlier: Vec<&Observation> =
                        tail.iter().filter(|o| o.date < first_date).collect();
                    let start = earlier.len().saturating_sub(lookback);
                    earlier[start..].to_vec()
                })
                .unwrap_or_default();

            if !context.is_empty() {
                debug!("Using {} context rows for {}", context.len(), city);
            }

            let emit_from = context.len();
            let combined: Vec<&Observation> = context.into_iter().chain(city_rows).collect();
            if let Some(built) = self.build_city(&city, &combined, emit_from) {
                rows.extend(built);
            }
        }

        Ok(FeatureMatrix {
            names: self.names.clone(),
            rows,
        })
    }

    /// Features for one city's date-ordered rows; rows before `emit_from` are context only.
    fn build_city(
        &self,
        city: &str,
        rows: &[&Observation],
        emit_from: usize,
    ) -> Option<Vec<FeatureRow>> {
        let n = rows.len();

        // Gap-filled weather columns
        let mut weather: Vec<Vec<f64>> = Vec::with_capacity(WEATHER_COLUMNS.len());
        for (col_idx, column) in WEATHER_COLUMNS.iter().enumerate() {
            let raw: Vec<Option<f64>> = rows.iter().map(|o| o.weather.values()[col_idx]).collect();
            match fill_gaps(&raw) {
                Some(filled) => weather.push(filled),
                None => {
                    warn!("Dropping {}: no {} values to fill from", city, column);
                    return None;
                }
            }
        }

        let t_max = &weather[0];
        let t_min = &weather[1];
        let precipitation = &weather[2];

        // Rolling statistics per column and window
        let mut rolling: Vec<Vec<f64>> = Vec::new();
        for series in &weather {
            for &window in &self.config.rolling_windows {
                rolling.push(rolling_mean(series, window));
                rolling.push(rolling_std(series, window));
            }
        }

        // Vector indicators
        let optimal_temp: Vec<f64> = t_max
            .iter()
            .map(|&t| {
                let in_band = t >= self.config.mosquito_temp_min && t <= self.config.mosquito_temp_max;
                if in_band { 1.0 } else { 0.0 }
            })
            .collect();

        let breeding: Vec<f64> = precipitation
            .iter()
            .zip(t_min.iter())
            .map(|(&p, &t)| {
                let favourable = p > self.config.breeding_min_precipitation
                    && t > self.config.breeding_min_temp;
                if favourable { 1.0 } else { 0.0 }
            })
            .collect();

        let lags: Vec<Vec<f64>> = self
            .config
            .breeding_lags
            .iter()
            .map(|&l| lag(&breeding, l, 0.0))
            .collect();

        let mut out = Vec::with_capacity(n.saturating_sub(emit_from));
        for i in emit_from..n {
            let mut values = Vec::with_capacity(self.names.len());

            if self.config.include_temporal {
                values.extend(temporal_features(rows[i].date, self.config.include_cyclic));
            }
            values.extend(weather.iter().map(|series| series[i]));
            values.extend(rolling.iter().map(|series| series[i]));
            values.push(optimal_temp[i]);
            values.push(breeding[i]);
            values.extend(lags.iter().map(|series| series[i]));

            debug_assert_eq!(values.len(), self.names.len());

            out.push(FeatureRow {
                city: city.to_string(),
                date: rows[i].date,
                values,
            });
        }

        Some(out)
    }

    fn build_names(config: &FeatureConfig) -> Vec<String> {
        let mut names = Vec::new();

        if config.include_temporal {
            names.extend(temporal_feature_names(config.include_cyclic));
        }

        names.extend(WEATHER_COLUMNS.iter().map(|c| c.to_string()));

        for column in WEATHER_COLUMNS {
            for window in &config.rolling_windows {
                names.push(format!("{}_{}d_mean", column, window));
                names.push(format!("{}_{}d_std", column, window));
            }
        }

        names.push("optimal_mosquito_temp".to_string());
        names.push("breeding_conditions".to_string());
        for l in &config.breeding_lags {
            names.push(format!("breeding_conditions_lag_{}", l));
        }

        names
    }
}

/// Group observations by city (sorted) with each city's rows in date order
fn group_by_city<'a, I>(observations: I) -> BTreeMap<String, Vec<&'a Observation>>
where
    I: Iterator<Item = &'a Observation>,
{
    let mut groups: BTreeMap<String, Vec<&'a Observation>> = BTreeMap::new();
    for observation in observations {
        groups
            .entry(observation.city.clone())
            .or_default()
            .push(observation);
    }
    for rows in groups.values_mut() {
        rows.sort_by_key(|o| o.date);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeatherReading;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset)
    }

    fn observation(city: &str, offset: i64, t_max: f64, t_min: f64, rain: f64) -> Observation {
        Observation::new(city, day(offset), WeatherReading::new(t_max, t_min, rain, 10.0))
    }

    fn config() -> FeatureConfig {
        FeatureConfig {
            rolling_windows: vec![3],
            breeding_lags: vec![2],
            include_cyclic: false,
            ..FeatureConfig::default()
        }
    }

    #[test]
    fn test_feature_names_match_row_width() {
        let builder = FeatureBuilder::new(FeatureConfig::default());
        let obs: Vec<Observation> = (0..5).map(|i| observation("Recife", i, 30.0, 22.0, 1.0)).collect();
        let matrix = builder.build(&obs).unwrap();

        assert_eq!(matrix.len(), 5);
        for row in &matrix.rows {
            assert_eq!(row.values.len(), builder.n_features());
        }
        assert!(builder.feature_names().contains(&"temperature_2m_max_7d_mean".to_string()));
        assert!(builder.feature_names().contains(&"breeding_conditions_lag_14".to_string()));
        assert!(builder.feature_names().contains(&"day_of_week_cos".to_string()));
    }

    #[test]
    fn test_indicators_and_lags() {
        let builder = FeatureBuilder::new(config());
        let obs = vec![
            observation("Recife", 0, 30.0, 22.0, 5.0), // breeding, optimal
            observation("Recife", 1, 38.0, 22.0, 0.0), // hot, dry
            observation("Recife", 2, 26.0, 18.0, 3.0), // cool night
            observation("Recife", 3, 25.0, 21.0, 1.0), // breeding, optimal
        ];
        let matrix = builder.build(&obs).unwrap();

        let optimal: Vec<f64> = (0..4).map(|i| matrix.value(i, "optimal_mosquito_temp").unwrap()).collect();
        let breeding: Vec<f64> = (0..4).map(|i| matrix.value(i, "breeding_conditions").unwrap()).collect();
        let lagged: Vec<f64> = (0..4)
            .map(|i| matrix.value(i, "breeding_conditions_lag_2").unwrap())
            .collect();

        assert_eq!(optimal, vec![1.0, 0.0, 1.0, 1.0]);
        assert_eq!(breeding, vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(lagged, vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_rolling_mean_per_city() {
        let builder = FeatureBuilder::new(config());
        let obs = vec![
            observation("A", 0, 30.0, 22.0, 0.0),
            observation("B", 0, 10.0, 5.0, 0.0),
            observation("A", 1, 32.0, 22.0, 0.0),
            observation("A", 2, 34.0, 22.0, 0.0),
        ];
        let matrix = builder.build(&obs).unwrap();

        // Rows are ordered by city then date
        assert_eq!(matrix.rows[0].city, "A");
        assert_eq!(matrix.rows[3].city, "B");
        assert_eq!(matrix.value(2, "temperature_2m_max_3d_mean"), Some(32.0));
        // City B does not leak into A's windows
        assert_eq!(matrix.value(3, "temperature_2m_max_3d_mean"), Some(10.0));
    }

    #[test]
    fn test_missing_weather_is_filled() {
        let builder = FeatureBuilder::new(config());
        let mut first = observation("Natal", 0, 30.0, 22.0, 0.0);
        first.weather.precipitation_sum = None;
        let second = observation("Natal", 1, 30.0, 22.0, 4.0);
        let matrix = builder.build(&[first, second]).unwrap();

        assert_eq!(matrix.value(0, "precipitation_sum"), Some(4.0));
    }

    #[test]
    fn test_city_without_column_is_dropped() {
        let builder = FeatureBuilder::new(config());
        let mut a = observation("Natal", 0, 30.0, 22.0, 0.0);
        a.weather.wind_speed_10m_max = None;
        let b = observation("Recife", 0, 30.0, 22.0, 0.0);
        let matrix = builder.build(&[a, b]).unwrap();

        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.rows[0].city, "Recife");
    }

    #[test]
    fn test_duplicate_observations_rejected() {
        let builder = FeatureBuilder::new(config());
        let obs = vec![
            observation("Natal", 0, 30.0, 22.0, 0.0),
            observation("Natal", 0, 31.0, 22.0, 0.0),
        ];
        assert!(builder.build(&obs).is_err());
    }

    #[test]
    fn test_context_matches_full_build() {
        let obs: Vec<Observation> = (0..10)
            .map(|i| observation("Recife", i, 25.0 + i as f64, 21.0, (i % 3) as f64))
            .collect();

        let full = FeatureBuilder::new(config()).build(&obs).unwrap();

        let mut builder = FeatureBuilder::new(config());
        builder.fit(&obs[..6]).unwrap();
        let scored = builder.build_with_context(&obs[6..]).unwrap();

        assert_eq!(scored.len(), 4);
        for (scored_row, full_row) in scored.rows.iter().zip(full.rows[6..].iter()) {
            assert_eq!(scored_row, full_row);
        }
    }

    #[test]
    fn test_select_columns() {
        let builder = FeatureBuilder::new(config());
        let obs = vec![observation("Recife", 0, 30.0, 22.0, 1.0)];
        let matrix = builder.build(&obs).unwrap();
        let t_max = matrix.names.iter().position(|n| n == "temperature_2m_max").unwrap();

        let selected = matrix.select(&[t_max]).unwrap();
        assert_eq!(selected.names, vec!["temperature_2m_max".to_string()]);
        assert_eq!(selected.rows[0].values, vec![30.0]);
        assert!(matrix.select(&[999]).is_err());
    }
}
