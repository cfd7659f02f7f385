/// Integration tests for per-city forecasting
mod common;

use arbo_risk::{
    config::{ForecasterConfig, SeasonalityMode},
    forecasting::{backtest, prepare_series, SeasonalForecaster},
    models::{ForecastHorizon, Observation},
};
use chrono::Duration;
use common::{synthetic_observations, test_config};

#[test]
fn test_forecast_all_cities() {
    let observations = synthetic_observations(&["Recife", "Natal", "Maceio"], 180, 11);
    let forecaster = SeasonalForecaster::new(ForecasterConfig::default());

    let batch = forecaster.forecast_all(&observations, 90);

    assert!(batch.skipped.is_empty());
    assert_eq!(batch.cities(), vec!["Maceio", "Natal", "Recife"]);
    assert_eq!(batch.points.len(), 3 * (180 + 90));

    for point in &batch.points {
        assert!(point.likelihood >= 0.0);
        assert!(point.interval.lower >= 0.0);
        assert!(point.interval.lower <= point.likelihood);
        assert!(point.likelihood <= point.interval.upper);
        assert_eq!(point.interval.width, 0.8);
    }

    let last_history = common::start_date() + Duration::days(179);
    let future: Vec<_> = batch.points.iter().filter(|p| p.is_future()).collect();
    assert_eq!(future.len(), 270);
    assert!(future.iter().all(|p| p.date > last_history));
    assert!(batch
        .points
        .iter()
        .filter(|p| p.horizon == ForecastHorizon::History)
        .all(|p| p.date <= last_history));
}

#[test]
fn test_short_city_is_skipped() {
    let mut observations = synthetic_observations(&["Recife"], 60, 12);
    observations.extend(synthetic_observations(&["Olinda"], 5, 13));

    let batch = SeasonalForecaster::new(ForecasterConfig::default()).forecast_all(&observations, 7);

    assert_eq!(batch.cities(), vec!["Recife"]);
    assert_eq!(batch.skipped.len(), 1);
    assert_eq!(batch.skipped[0].city, "Olinda");
}

#[test]
fn test_regressor_missing_for_a_city() {
    let observations: Vec<Observation> = synthetic_observations(&["Natal"], 60, 14)
        .into_iter()
        .map(|mut o| {
            o.weather.wind_speed_10m_max = None;
            o
        })
        .collect();

    let config = ForecasterConfig::default();
    let series = prepare_series(&observations, &config.regressors);
    assert_eq!(series[0].regressors.len(), 2);

    let fitted = SeasonalForecaster::new(config).fit(&series[0]).unwrap();
    assert!(!fitted.regressor_names().contains(&"wind_speed_10m_max"));
    assert_eq!(fitted.forecast(10).unwrap().len(), 70);
}

#[test]
fn test_additive_and_multiplicative_modes() {
    let observations = synthetic_observations(&["Belem"], 120, 15);

    for mode in [SeasonalityMode::Additive, SeasonalityMode::Multiplicative] {
        let config = ForecasterConfig {
            seasonality_mode: mode,
            ..ForecasterConfig::default()
        };
        let batch = SeasonalForecaster::new(config).forecast_all(&observations, 30);
        assert_eq!(batch.points.len(), 150);
        assert!(batch.points.iter().all(|p| p.likelihood.is_finite()));
    }
}

#[test]
fn test_backtest_coverage_is_a_share() {
    let observations = synthetic_observations(&["Recife", "Natal"], 150, 16);
    let forecaster = SeasonalForecaster::new(ForecasterConfig::default());

    let report = backtest(&forecaster, &observations, 30);

    assert_eq!(report.cities.len(), 2);
    for city in &report.cities {
        assert_eq!(city.n_train, 120);
        assert_eq!(city.metrics.n_points, 30);
        assert!((0.0..=1.0).contains(&city.metrics.coverage));
    }
    let overall = report.overall.unwrap();
    assert_eq!(overall.n_points, 60);
    assert!(overall.rmse >= overall.mae);
}

#[test]
fn test_narrow_changepoint_range_from_config() {
    let mut config = test_config();
    config.forecaster.changepoint_range = 0.1;
    config.validate_all().unwrap();

    let observations = synthetic_observations(&["Recife"], 120, 17);
    let batch = SeasonalForecaster::new(config.forecaster).forecast_all(&observations, 10);

    assert!(batch.skipped.is_empty());
    assert_eq!(batch.points.len(), 130);
}
