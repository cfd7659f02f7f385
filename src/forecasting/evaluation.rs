use crate::forecasting::model::{SeasonalForecaster, SkippedCity};
use crate::forecasting::series::{prepare_series, CitySeries};
use crate::forecasting::stats::{mae, rmse};
use crate::models::Observation;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Holdout accuracy of a forecast
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastMetrics {
    pub mae: f64,
    pub rmse: f64,

    /// Share of held-out values inside the forecast interval
    pub coverage: f64,

    pub n_points: usize,
}

impl ForecastMetrics {
    fn compute(actual: &[f64], predicted: &[f64], inside: usize) -> Self {
        Self {
            mae: mae(actual, predicted),
            rmse: rmse(actual, predicted),
            coverage: if actual.is_empty() {
                0.0
            } else {
                inside as f64 / actual.len() as f64
            },
            n_points: actual.len(),
        }
    }
}

/// Backtest result for one city
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityBacktest {
    pub city: String,
    pub n_train: usize,
    pub metrics: ForecastMetrics,
}

/// Backtest over every city, with metrics pooled across all held-out points
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BacktestReport {
    pub cities: Vec<CityBacktest>,
    pub overall: Option<ForecastMetrics>,
    pub skipped: Vec<SkippedCity>,
}

struct CityOutcome {
    backtest: CityBacktest,
    actual: Vec<f64>,
    predicted: Vec<f64>,
    inside: usize,
}

/// Fit each city on all but its last `horizon` dated points and score the
/// forecast of those points
pub fn backtest(
    forecaster: &SeasonalForecaster,
    observations: &[Observation],
    horizon: usize,
) -> BacktestReport {
    let series = prepare_series(observations, &forecaster.config().regressors);

    let outcomes: Vec<Result<CityOutcome, SkippedCity>> = series
        .par_iter()
        .map(|s| backtest_city(forecaster, s, horizon))
        .collect();

    let mut report = BacktestReport::default();
    let mut actual = Vec::new();
    let mut predicted = Vec::new();
    let mut inside = 0;

    for outcome in outcomes {
        match outcome {
            Ok(city) => {
                actual.extend(city.actual);
                predicted.extend(city.predicted);
                inside += city.inside;
                report.cities.push(city.backtest);
            }
            Err(skipped) => {
                warn!("Backtest skipped {}: {}", skipped.city, skipped.reason);
                report.skipped.push(skipped);
            }
        }
    }

    if !actual.is_empty() {
        report.overall = Some(ForecastMetrics::compute(&actual, &predicted, inside));
    }

    if let Some(overall) = &report.overall {
        info!(
            "Backtest over {} cities: MAE {:.3}, RMSE {:.3}, coverage {:.1}%",
            report.cities.len(),
            overall.mae,
            overall.rmse,
            overall.coverage * 100.0
        );
    }

    report
}

fn backtest_city(
    forecaster: &SeasonalForecaster,
    series: &CitySeries,
    horizon: usize,
) -> Result<CityOutcome, SkippedCity> {
    let skip = |reason: String| SkippedCity {
        city: series.city.clone(),
        reason,
    };

    if horizon == 0 || series.len() <= horizon {
        return Err(skip(format!(
            "{} points leave nothing to train on with horizon {}",
            series.len(),
            horizon
        )));
    }

    let (train, test) = series.split_at(series.len() - horizon);
    let fitted = forecaster.fit(&train).map_err(|e| skip(e.to_string()))?;
    let points = fitted
        .predict_dates(&test.dates)
        .map_err(|e| skip(e.to_string()))?;

    let predicted: Vec<f64> = points.iter().map(|p| p.likelihood).collect();
    let inside = points
        .iter()
        .zip(&test.cases)
        .filter(|(p, &actual)| p.interval.contains(actual))
        .count();

    Ok(CityOutcome {
        backtest: CityBacktest {
            city: series.city.clone(),
            n_train: train.len(),
            metrics: ForecastMetrics::compute(&test.cases, &predicted, inside),
        },
        actual: test.cases,
        predicted,
        inside,
    })
}
