use crate::config::{ForecasterConfig, SeasonalityMode};
use crate::error::{AppError, Result};
use crate::forecasting::series::{prepare_series, CitySeries};
use crate::forecasting::stats::mean_std;
use crate::models::{ForecastHorizon, ForecastPoint, Observation};
use chrono::{Datelike, Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::ridge_regression::{
    RidgeRegression, RidgeRegressionParameters, RidgeRegressionSolverName,
};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

/// Prior scale of the intercept and base slope columns
const TREND_PRIOR_SCALE: f64 = 5.0;

const YEARLY_PERIOD: f64 = 365.25;
const WEEKLY_PERIOD: f64 = 7.0;

/// Cap on the log-scale prediction before exponentiating
const MAX_LOG_VALUE: f64 = 50.0;

type Ridge = RidgeRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// A city the forecaster could not fit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedCity {
    pub city: String,
    pub reason: String,
}

/// Forecast points for every fitted city, sorted by city then date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastBatch {
    pub points: Vec<ForecastPoint>,
    pub skipped: Vec<SkippedCity>,
}

impl ForecastBatch {
    pub fn cities(&self) -> Vec<&str> {
        let mut cities: Vec<&str> = self.points.iter().map(|p| p.city.as_str()).collect();
        cities.dedup();
        cities
    }
}

/// Columns of the design matrix actually used for one city
#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    slope: bool,
    n_changepoints: usize,
    yearly_order: usize,
    weekly_order: usize,
    n_regressors: usize,
}

impl Layout {
    fn from_config(config: &ForecasterConfig, n_regressors: usize) -> Self {
        Self {
            slope: true,
            n_changepoints: config.n_changepoints,
            yearly_order: if config.yearly_seasonality { config.yearly_order } else { 0 },
            weekly_order: if config.weekly_seasonality { config.weekly_order } else { 0 },
            n_regressors,
        }
    }

    fn n_columns(&self) -> usize {
        1 + usize::from(self.slope)
            + self.n_changepoints
            + 2 * self.yearly_order
            + 2 * self.weekly_order
            + self.n_regressors
    }

    /// Drop columns until the system has more rows than columns
    fn fit_to(mut self, n_rows: usize) -> Self {
        while self.n_columns() >= n_rows {
            if self.n_changepoints > 0 {
                self.n_changepoints -= 1;
            } else if self.yearly_order > 0 {
                self.yearly_order -= 1;
            } else if self.weekly_order > 0 {
                self.weekly_order -= 1;
            } else if self.n_regressors > 0 {
                self.n_regressors -= 1;
            } else if self.slope {
                self.slope = false;
            } else {
                break;
            }
        }
        self
    }
}

/// Standardisation and hold-forward value of one regressor
#[derive(Debug, Clone)]
struct RegressorScaling {
    name: String,
    mean: f64,
    std: f64,
    last: f64,
}

/// Trend plus seasonality forecaster with additive or multiplicative seasonality.
///
/// Piecewise-linear trend with changepoints, Fourier seasonality and weather
/// regressors, fitted per city by ridge regression with column-wise prior scales.
pub struct SeasonalForecaster {
    config: ForecasterConfig,
}

impl SeasonalForecaster {
    pub fn new(config: ForecasterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    /// Fit one city's series
    pub fn fit(&self, series: &CitySeries) -> Result<FittedForecast> {
        let n = series.len();
        if n < self.config.min_history.max(2) {
            return Err(AppError::InsufficientData(format!(
                "{} has {} dated points, need {}",
                series.city,
                n,
                self.config.min_history.max(2)
            )));
        }

        let start = series.dates[0];
        let last = series.dates[n - 1];
        let span = (last - start).num_days() as f64;
        if span <= 0.0 {
            return Err(AppError::InsufficientData(format!(
                "{} has no date span to fit a trend",
                series.city
            )));
        }

        let full = Layout::from_config(&self.config, series.regressors.len());
        let mut layout = full.fit_to(n);
        let changepoints = changepoints(&series.dates, start, span, &self.config, layout);
        layout.n_changepoints = changepoints.len();
        if layout != full {
            debug!("Reduced design for {} to {:?}", series.city, layout);
        }

        let z = Normal::new(0.0, 1.0)
            .map_err(|e| AppError::Configuration(format!("standard normal: {}", e)))?
            .inverse_cdf(0.5 + self.config.interval_width / 2.0);

        let regressors: Vec<RegressorScaling> = series
            .regressors
            .iter()
            .take(layout.n_regressors)
            .map(|r| {
                let (mean, std) = mean_std(&r.values);
                RegressorScaling {
                    name: r.name.clone(),
                    mean,
                    std: if std > 0.0 { std } else { 1.0 },
                    last: r.values.last().copied().unwrap_or(mean),
                }
            })
            .collect();

        let mut fitted = FittedForecast {
            city: series.city.clone(),
            start,
            last,
            span,
            n_history: n,
            layout,
            changepoints,
            regressors,
            mode: self.config.seasonality_mode,
            target_scale: 1.0,
            target_mean: 0.0,
            sigma: 0.0,
            z,
            interval_width: self.config.interval_width,
            changepoint_prior_scale: self.config.changepoint_prior_scale,
            seasonality_prior_scale: self.config.seasonality_prior_scale,
            regressor_prior_scale: self.config.regressor_prior_scale,
            history: series.clone(),
            model: None,
        };

        let transformed: Vec<f64> = match fitted.mode {
            SeasonalityMode::Multiplicative => {
                series.cases.iter().map(|y| y.max(0.0).ln_1p()).collect()
            }
            SeasonalityMode::Additive => {
                let scale = series.cases.iter().fold(0.0_f64, |m, y| m.max(y.abs()));
                fitted.target_scale = if scale > 0.0 { scale } else { 1.0 };
                series.cases.iter().map(|y| y / fitted.target_scale).collect()
            }
        };
        fitted.target_mean = transformed.iter().sum::<f64>() / n as f64;
        let target: Vec<f64> = transformed.iter().map(|z| z - fitted.target_mean).collect();

        let x = fitted.design_matrix(&series.dates, |i, r| series.regressors[r].values[i]);

        let params = RidgeRegressionParameters::default()
            .with_alpha(self.config.regularization)
            .with_solver(RidgeRegressionSolverName::Cholesky)
            .with_normalize(false);

        let model = Ridge::fit(&x, &target, params).map_err(|e| {
            AppError::Training(format!("Forecast fit failed for {}: {}", series.city, e))
        })?;

        let fitted_values = model.predict(&x).map_err(|e| {
            AppError::Prediction(format!("Forecast failed for {}: {}", series.city, e))
        })?;
        let ssr: f64 = target
            .iter()
            .zip(&fitted_values)
            .map(|(a, p)| (a - p).powi(2))
            .sum();
        let dof = n.saturating_sub(layout.n_columns()).max(1);
        fitted.sigma = (ssr / dof as f64).sqrt();
        fitted.model = Some(model);

        debug!(
            "Fitted {} on {} points with {} columns (sigma {:.4})",
            series.city,
            n,
            layout.n_columns(),
            fitted.sigma
        );

        Ok(fitted)
    }

    /// Fit every city, skipping those that cannot be fitted
    pub fn fit_all(&self, series: &[CitySeries]) -> (Vec<FittedForecast>, Vec<SkippedCity>) {
        let results: Vec<(String, Result<FittedForecast>)> = series
            .par_iter()
            .map(|s| (s.city.clone(), self.fit(s)))
            .collect();

        let mut fitted = Vec::new();
        let mut skipped = Vec::new();
        for (city, result) in results {
            match result {
                Ok(model) => fitted.push(model),
                Err(e) => {
                    warn!("Skipping forecast for {}: {}", city, e);
                    skipped.push(SkippedCity {
                        city,
                        reason: e.to_string(),
                    });
                }
            }
        }

        (fitted, skipped)
    }

    /// History plus `periods` future days for every city in the observations
    pub fn forecast_all(&self, observations: &[Observation], periods: usize) -> ForecastBatch {
        let series = prepare_series(observations, &self.config.regressors);
        let (fitted, mut skipped) = self.fit_all(&series);

        let results: Vec<(String, Result<Vec<ForecastPoint>>)> = fitted
            .par_iter()
            .map(|f| (f.city.clone(), f.forecast(periods)))
            .collect();

        let mut points = Vec::new();
        for (city, result) in results {
            match result {
                Ok(city_points) => points.extend(city_points),
                Err(e) => {
                    warn!("Skipping forecast for {}: {}", city, e);
                    skipped.push(SkippedCity {
                        city,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Forecast {} points for {} cities ({} skipped)",
            points.len(),
            series.len() - skipped.len(),
            skipped.len()
        );

        ForecastBatch { points, skipped }
    }
}

/// A fitted per-city forecast model
pub struct FittedForecast {
    city: String,
    start: NaiveDate,
    last: NaiveDate,
    span: f64,
    n_history: usize,
    layout: Layout,
    changepoints: Vec<f64>,
    regressors: Vec<RegressorScaling>,
    mode: SeasonalityMode,
    target_scale: f64,
    target_mean: f64,
    sigma: f64,
    z: f64,
    interval_width: f64,
    changepoint_prior_scale: f64,
    seasonality_prior_scale: f64,
    regressor_prior_scale: f64,
    history: CitySeries,
    model: Option<Ridge>,
}

impl FittedForecast {
    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn last_date(&self) -> NaiveDate {
        self.last
    }

    /// Residual standard deviation on the model scale
    pub fn residual_std(&self) -> f64 {
        self.sigma
    }

    /// Names of the regressors the model uses
    pub fn regressor_names(&self) -> Vec<&str> {
        self.regressors.iter().map(|r| r.name.as_str()).collect()
    }

    /// Every history date followed by `periods` future days
    pub fn forecast(&self, periods: usize) -> Result<Vec<ForecastPoint>> {
        let mut dates = self.history.dates.clone();
        dates.extend((1..=periods as i64).map(|d| self.last + Duration::days(d)));
        self.predict_dates(&dates)
    }

    /// Predict arbitrary dates.
    ///
    /// Dates in the history use the observed regressors; any other date holds
    /// every regressor at its last observed value.
    pub fn predict_dates(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastPoint>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::NotTrained(format!("{} forecast not fitted", self.city)))?;

        if dates.is_empty() {
            return Ok(Vec::new());
        }

        let history_index: Vec<Option<usize>> = dates
            .iter()
            .map(|d| self.history.dates.binary_search(d).ok())
            .collect();

        let x = self.design_matrix(dates, |i, r| match history_index[i] {
            Some(h) => self.history.regressors[r].values[h],
            None => self.regressors[r].last,
        });

        let predicted = model.predict(&x).map_err(|e| {
            AppError::Prediction(format!("Forecast failed for {}: {}", self.city, e))
        })?;

        Ok(dates
            .iter()
            .zip(predicted)
            .map(|(&date, centred)| {
                let value = centred + self.target_mean;
                let days_ahead = (date - self.last).num_days().max(0) as f64;
                let half_width =
                    self.z * self.sigma * (1.0 + days_ahead / self.n_history as f64).sqrt();

                let horizon = if date > self.last {
                    ForecastHorizon::Future
                } else {
                    ForecastHorizon::History
                };

                ForecastPoint::new(
                    self.city.clone(),
                    date,
                    self.back_transform(value),
                    self.back_transform(value - half_width),
                    self.back_transform(value + half_width),
                    self.interval_width,
                    horizon,
                )
            })
            .collect())
    }

    fn back_transform(&self, value: f64) -> f64 {
        match self.mode {
            SeasonalityMode::Multiplicative => value.min(MAX_LOG_VALUE).exp_m1(),
            SeasonalityMode::Additive => value * self.target_scale,
        }
    }

    fn design_matrix<F>(&self, dates: &[NaiveDate], regressor_value: F) -> DenseMatrix<f64>
    where
        F: Fn(usize, usize) -> f64,
    {
        let n_columns = self.layout.n_columns();
        let mut data = Vec::with_capacity(dates.len() * n_columns);

        for (i, &date) in dates.iter().enumerate() {
            let t = (date - self.start).num_days() as f64 / self.span;

            data.push(TREND_PRIOR_SCALE);
            if self.layout.slope {
                data.push(t * TREND_PRIOR_SCALE);
            }
            for &c in &self.changepoints {
                data.push((t - c).max(0.0) * self.changepoint_prior_scale);
            }

            let day = date.num_days_from_ce() as f64;
            fourier_terms(day, YEARLY_PERIOD, self.layout.yearly_order, self.seasonality_prior_scale, &mut data);
            fourier_terms(day, WEEKLY_PERIOD, self.layout.weekly_order, self.seasonality_prior_scale, &mut data);

            for (r, scaling) in self.regressors.iter().enumerate() {
                let standardized = (regressor_value(i, r) - scaling.mean) / scaling.std;
                data.push(standardized * self.regressor_prior_scale);
            }
        }

        DenseMatrix::new(dates.len(), n_columns, data, false)
    }
}

/// Changepoint locations on the scaled time axis, evenly spaced over the
/// first `changepoint_range` share of the history
fn changepoints(
    dates: &[NaiveDate],
    start: NaiveDate,
    span: f64,
    config: &ForecasterConfig,
    layout: Layout,
) -> Vec<f64> {
    let hist_size = ((dates.len() as f64) * config.changepoint_range).floor() as usize;
    let n_changepoints = layout.n_changepoints.min(hist_size.saturating_sub(1));
    if n_changepoints == 0 {
        return Vec::new();
    }

    let step = (hist_size - 1) as f64 / n_changepoints as f64;
    (1..=n_changepoints)
        .map(|k| {
            let idx = ((k as f64) * step).round() as usize;
            (dates[idx.min(dates.len() - 1)] - start).num_days() as f64 / span
        })
        .collect()
}

fn fourier_terms(day: f64, period: f64, order: usize, scale: f64, out: &mut Vec<f64>) {
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * day / period;
        out.push(angle.sin() * scale);
        out.push(angle.cos() * scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecasting::series::RegressorSeries;

    fn weekly_series(n: usize, level: f64) -> CitySeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let dates: Vec<NaiveDate> = (0..n).map(|d| start + Duration::days(d as i64)).collect();
        let cases: Vec<f64> = (0..n)
            .map(|d| level + if d % 7 < 2 { 4.0 } else { 0.0 })
            .collect();
        let temperature: Vec<f64> = (0..n).map(|d| 28.0 + (d % 5) as f64).collect();

        CitySeries {
            city: "Fortaleza".to_string(),
            dates,
            cases,
            regressors: vec![RegressorSeries {
                name: "temperature_2m_max".to_string(),
                values: temperature,
            }],
        }
    }

    #[test]
    fn test_forecast_covers_history_and_future() {
        let series = weekly_series(120, 10.0);
        let forecaster = SeasonalForecaster::new(ForecasterConfig::default());
        let fitted = forecaster.fit(&series).unwrap();

        let points = fitted.forecast(30).unwrap();
        assert_eq!(points.len(), 150);
        assert_eq!(points.iter().filter(|p| p.is_future()).count(), 30);
        assert_eq!(points[120].date, series.last_date().unwrap() + Duration::days(1));

        for p in &points {
            assert!(p.likelihood >= 0.0);
            assert!(p.interval.lower <= p.likelihood && p.likelihood <= p.interval.upper);
        }
    }

    #[test]
    fn test_tracks_level() {
        let series = weekly_series(140, 20.0);
        let fitted = SeasonalForecaster::new(ForecasterConfig::default())
            .fit(&series)
            .unwrap();

        let points = fitted.forecast(14).unwrap();
        let future_mean: f64 =
            points.iter().filter(|p| p.is_future()).map(|p| p.likelihood).sum::<f64>() / 14.0;
        assert!(future_mean > 15.0 && future_mean < 30.0, "mean {}", future_mean);
    }

    #[test]
    fn test_interval_widens_with_horizon() {
        let mut series = weekly_series(100, 5.0);
        // Noise so the residual spread is non-zero
        for (i, c) in series.cases.iter_mut().enumerate() {
            *c += ((i * 37) % 11) as f64 * 0.5;
        }
        let fitted = SeasonalForecaster::new(ForecasterConfig::default())
            .fit(&series)
            .unwrap();
        assert!(fitted.residual_std() > 0.0);

        let last = fitted.last_date();
        let points = fitted
            .predict_dates(&[last + Duration::days(1), last + Duration::days(85)])
            .unwrap();

        let width = |p: &ForecastPoint| {
            let scale = p.likelihood.ln_1p();
            ((p.interval.upper.ln_1p() - scale) + (scale - p.interval.lower.ln_1p())) / 2.0
        };
        assert!(width(&points[1]) > width(&points[0]));
    }

    #[test]
    fn test_additive_mode() {
        let series = weekly_series(60, 8.0);
        let config = ForecasterConfig {
            seasonality_mode: SeasonalityMode::Additive,
            ..ForecasterConfig::default()
        };
        let fitted = SeasonalForecaster::new(config).fit(&series).unwrap();
        let points = fitted.forecast(7).unwrap();
        assert!(points.iter().all(|p| p.likelihood >= 0.0));
    }

    #[test]
    fn test_short_history_is_rejected() {
        let series = weekly_series(5, 1.0);
        let err = SeasonalForecaster::new(ForecasterConfig::default())
            .fit(&series)
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "INSUFFICIENT_DATA");
    }

    #[test]
    fn test_layout_shrinks_to_rows() {
        let config = ForecasterConfig::default();
        let layout = Layout::from_config(&config, 3).fit_to(20);
        assert!(layout.n_columns() < 20);
        assert_eq!(layout.n_changepoints, 0);

        let tiny = Layout::from_config(&config, 3).fit_to(2);
        assert_eq!(tiny.n_columns(), 1);
    }

    #[test]
    fn test_changepoints_within_range() {
        let series = weekly_series(100, 1.0);
        let config = ForecasterConfig::default();
        let layout = Layout::from_config(&config, 1);
        let start = series.dates[0];
        let cps = changepoints(&series.dates, start, 99.0, &config, layout);

        assert_eq!(cps.len(), 25);
        assert!(cps.iter().all(|&c| c > 0.0 && c <= 0.8));
        assert!(cps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_narrow_changepoint_range_fits() {
        let series = weekly_series(120, 5.0);

        for range in [0.1, 0.0] {
            let config = ForecasterConfig {
                changepoint_range: range,
                ..ForecasterConfig::default()
            };
            let fitted = SeasonalForecaster::new(config).fit(&series).unwrap();

            assert_eq!(fitted.layout.n_changepoints, fitted.changepoints.len());
            assert!(fitted.changepoints.len() <= 11);
            assert_eq!(fitted.forecast(10).unwrap().len(), 130);
        }
    }

    #[test]
    fn test_interval_quantile() {
        let series = weekly_series(60, 5.0);
        let fitted = SeasonalForecaster::new(ForecasterConfig::default())
            .fit(&series)
            .unwrap();
        assert!((fitted.z - 1.2815515655).abs() < 1e-6);
    }
}
