use crate::features::rolling::fill_gaps;
use crate::models::Observation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A gap-filled weather column aligned with a city's dates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressorSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Daily case counts for one city, one entry per distinct date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CitySeries {
    pub city: String,
    pub dates: Vec<NaiveDate>,
    pub cases: Vec<f64>,
    pub regressors: Vec<RegressorSeries>,
}

impl CitySeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Split at `at`: the first series keeps rows before it, the second the rest
    pub fn split_at(&self, at: usize) -> (CitySeries, CitySeries) {
        let at = at.min(self.len());
        let part = |range: std::ops::Range<usize>| CitySeries {
            city: self.city.clone(),
            dates: self.dates[range.clone()].to_vec(),
            cases: self.cases[range.clone()].to_vec(),
            regressors: self
                .regressors
                .iter()
                .map(|r| RegressorSeries {
                    name: r.name.clone(),
                    values: r.values[range.clone()].to_vec(),
                })
                .collect(),
        };
        (part(0..at), part(at..self.len()))
    }
}

/// Group observations into per-city series, sorted by city then date.
///
/// Cases are summed per date; each regressor takes the first reading of the
/// date and is then gap-filled. A regressor never observed for a city is left
/// out of that city's series.
pub fn prepare_series(observations: &[Observation], regressors: &[String]) -> Vec<CitySeries> {
    let mut grouped: BTreeMap<&str, BTreeMap<NaiveDate, (f64, Vec<Option<f64>>)>> =
        BTreeMap::new();

    for obs in observations {
        let day = grouped
            .entry(obs.city.as_str())
            .or_default()
            .entry(obs.date)
            .or_insert_with(|| (0.0, vec![None; regressors.len()]));

        day.0 += obs.cases;
        for (slot, name) in day.1.iter_mut().zip(regressors) {
            if slot.is_none() {
                *slot = obs.weather.get(name).filter(|v| v.is_finite());
            }
        }
    }

    grouped
        .into_iter()
        .map(|(city, days)| {
            let dates: Vec<NaiveDate> = days.keys().copied().collect();
            let cases: Vec<f64> = days.values().map(|(c, _)| *c).collect();

            let regressor_series = regressors
                .iter()
                .enumerate()
                .filter_map(|(idx, name)| {
                    let raw: Vec<Option<f64>> = days.values().map(|(_, r)| r[idx]).collect();
                    match fill_gaps(&raw) {
                        Some(values) => Some(RegressorSeries {
                            name: name.clone(),
                            values,
                        }),
                        None => {
                            warn!("Regressor {} missing for {}; skipping it", name, city);
                            None
                        }
                    }
                })
                .collect();

            CitySeries {
                city: city.to_string(),
                dates,
                cases,
                regressors: regressor_series,
            }
        })
        .collect()
}
