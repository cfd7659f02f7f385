//! Per-city outbreak forecasting
//!
//! Case counts are modelled as trend + yearly/weekly seasonality + weather
//! regressors, fitted independently for each city and run in parallel.

pub mod evaluation;
pub mod model;
pub mod series;
pub mod stats;

pub use evaluation::{backtest, BacktestReport, CityBacktest, ForecastMetrics};
pub use model::{FittedForecast, ForecastBatch, SeasonalForecaster, SkippedCity};
pub use series::{prepare_series, CitySeries, RegressorSeries};
