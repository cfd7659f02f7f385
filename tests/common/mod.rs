//! Common test utilities
//!
//! Synthetic city histories where warm, wet spells drive case counts, and
//! helpers to render them as input CSV.

#![allow(dead_code)]

use arbo_risk::config::Config;
use arbo_risk::models::{LabeledExample, Observation, RiskThresholds, WeatherReading};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

/// Daily observations for each city.
///
/// Weather follows a yearly cycle plus noise; cases rise a week after rainy,
/// warm days.
pub fn synthetic_observations(cities: &[&str], days: i64, seed: u64) -> Vec<Observation> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut observations = Vec::new();

    for (c, city) in cities.iter().enumerate() {
        let offset = c as f64 * 0.7;
        let mut rain_history: Vec<f64> = Vec::new();

        for d in 0..days {
            let phase = 2.0 * std::f64::consts::PI * d as f64 / 365.25 + offset;
            let t_max = 30.0 + 3.0 * phase.sin() + rng.gen_range(-1.0..1.0);
            let t_min = 22.0 + 2.5 * phase.sin() + rng.gen_range(-1.0..1.0);
            let rain = (8.0 * phase.sin() + rng.gen_range(-4.0..6.0)).max(0.0);
            let wind = 12.0 + rng.gen_range(-3.0..3.0);
            rain_history.push(rain);

            let lagged = if d >= 7 { rain_history[(d - 7) as usize] } else { 0.0 };
            let cases = (lagged * 0.6 + if t_min > 22.0 { 1.0 } else { 0.0 }
                + rng.gen_range(0.0..1.0))
            .floor();

            observations.push(
                Observation::new(
                    *city,
                    start_date() + Duration::days(d),
                    WeatherReading::new(t_max, t_min, rain, wind),
                )
                .with_cases(cases),
            );
        }
    }

    observations
}

pub fn synthetic_examples(cities: &[&str], days: i64, seed: u64) -> Vec<LabeledExample> {
    let thresholds = RiskThresholds::default();
    synthetic_observations(cities, days, seed)
        .into_iter()
        .map(|o| LabeledExample::from_cases(o, &thresholds))
        .collect()
}

/// Render observations in the input CSV layout
pub fn to_csv(observations: &[Observation]) -> String {
    let mut out = String::from(
        "city,date,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max,cases\n",
    );
    let field = |v: Option<f64>| v.map(|x| format!("{:.3}", x)).unwrap_or_default();

    for o in observations {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            o.city,
            o.date,
            field(o.weather.temperature_2m_max),
            field(o.weather.temperature_2m_min),
            field(o.weather.precipitation_sum),
            field(o.weather.wind_speed_10m_max),
            o.cases
        ));
    }
    out
}

/// Small, fast configuration for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.classifier.n_trees = 12;
    config.classifier.importance_repeats = 1;
    config.forecaster.periods = 14;
    config
}
