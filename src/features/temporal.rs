use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Calendar season. Months 6-10 are rainy, the rest dry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Season {
    Dry,
    Rainy,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            6..=10 => Season::Rainy,
            _ => Season::Dry,
        }
    }
}

/// Periods used for the cyclic encodings
const CYCLES: [(&str, f64); 4] = [
    ("month", 12.0),
    ("day_of_year", 365.0),
    ("week_of_year", 52.0),
    ("day_of_week", 7.0),
];

/// Names of the calendar features, in the order [`temporal_features`] emits them
pub fn temporal_feature_names(include_cyclic: bool) -> Vec<String> {
    let mut names: Vec<String> = [
        "month",
        "year",
        "day_of_year",
        "week_of_year",
        "day_of_week",
        "rainy_season",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if include_cyclic {
        for (name, _) in CYCLES {
            names.push(format!("{}_sin", name));
            names.push(format!("{}_cos", name));
        }
    }

    names
}

/// Calendar features for one date
pub fn temporal_features(date: NaiveDate, include_cyclic: bool) -> Vec<f64> {
    let month = date.month() as f64;
    let day_of_year = date.ordinal() as f64;
    let week_of_year = date.iso_week().week() as f64;
    let day_of_week = date.weekday().num_days_from_monday() as f64;
    let rainy = match Season::from_month(date.month()) {
        Season::Rainy => 1.0,
        Season::Dry => 0.0,
    };

    let mut features = vec![
        month,
        date.year() as f64,
        day_of_year,
        week_of_year,
        day_of_week,
        rainy,
    ];

    if include_cyclic {
        let raw = [month, day_of_year, week_of_year, day_of_week];
        for (value, (_, period)) in raw.iter().zip(CYCLES.iter()) {
            let angle = 2.0 * PI * value / period;
            features.push(angle.sin());
            features.push(angle.cos());
        }
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_values() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        assert_eq!(temporal_feature_names(true).len(), temporal_features(date, true).len());
        assert_eq!(temporal_feature_names(false).len(), temporal_features(date, false).len());
    }

    #[test]
    fn test_calendar_values() {
        // Monday 15 July 2024, ISO week 29
        let date = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        let features = temporal_features(date, false);
        assert_eq!(features, vec![7.0, 2024.0, 197.0, 29.0, 0.0, 1.0]);
    }

    #[test]
    fn test_seasons() {
        assert_eq!(Season::from_month(1), Season::Dry);
        assert_eq!(Season::from_month(5), Season::Dry);
        assert_eq!(Season::from_month(6), Season::Rainy);
        assert_eq!(Season::from_month(10), Season::Rainy);
        assert_eq!(Season::from_month(11), Season::Dry);
        assert_eq!(Season::from_month(12), Season::Dry);
    }

    #[test]
    fn test_cyclic_encoding_on_unit_circle() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let features = temporal_features(date, true);
        for pair in features[6..].chunks(2) {
            let norm = pair[0].powi(2) + pair[1].powi(2);
            assert!((norm - 1.0).abs() < 1e-9);
        }
        // December: month_cos = cos(2π) = 1
        assert!((features[7] - 1.0).abs() < 1e-9);
    }
}
