use crate::config::{MergeStrategy, RiskConfig};
use crate::error::{AppError, Result};
use crate::features::FeatureMatrix;
use crate::ml::Prediction;
use crate::models::{CitySummary, FeatureImportance, ForecastPoint, RiskCategory, RiskReport};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Combines classifier verdicts and forecasts into per-observation reports
pub struct Reporter {
    config: RiskConfig,
}

impl Reporter {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// One report per feature row, in row order.
    ///
    /// `predictions` must be aligned with `matrix.rows`. A forecast point is
    /// attached when one exists for the exact city and date.
    pub fn build_reports(
        &self,
        matrix: &FeatureMatrix,
        predictions: Vec<Prediction<RiskCategory>>,
        forecasts: &[ForecastPoint],
        importances: &[FeatureImportance],
    ) -> Result<Vec<RiskReport>> {
        if predictions.len() != matrix.len() {
            return Err(AppError::Internal(format!(
                "{} predictions for {} feature rows",
                predictions.len(),
                matrix.len()
            )));
        }

        let mut seen = HashSet::with_capacity(matrix.len());
        for row in &matrix.rows {
            if !seen.insert((row.city.as_str(), row.date)) {
                return Err(AppError::Validation(format!(
                    "duplicate observation for {} on {}",
                    row.city, row.date
                )));
            }
        }

        let forecast_index: HashMap<(&str, NaiveDate), &ForecastPoint> = forecasts
            .iter()
            .map(|p| ((p.city.as_str(), p.date), p))
            .collect();

        let top: Vec<FeatureImportance> = importances
            .iter()
            .take(self.config.top_importances)
            .cloned()
            .collect();

        let reports: Vec<RiskReport> = matrix
            .rows
            .iter()
            .zip(predictions)
            .map(|(row, prediction)| {
                let forecast = forecast_index
                    .get(&(row.city.as_str(), row.date))
                    .map(|p| (*p).clone());
                let forecast_category = forecast
                    .as_ref()
                    .map(|p| self.config.thresholds.categorize(p.likelihood));

                RiskReport {
                    city: row.city.clone(),
                    date: row.date,
                    category: self.merge(prediction.value, forecast_category),
                    risk_score: risk_score(&prediction),
                    classifier: prediction,
                    forecast,
                    forecast_category,
                    feature_importances: top.clone(),
                }
            })
            .collect();

        let with_forecast = reports.iter().filter(|r| r.forecast.is_some()).count();
        info!(
            "Built {} reports ({} with a matching forecast)",
            reports.len(),
            with_forecast
        );

        Ok(reports)
    }

    /// Final category under the configured merge strategy
    pub fn merge(&self, classifier: RiskCategory, forecast: Option<RiskCategory>) -> RiskCategory {
        match (self.config.merge_strategy, forecast) {
            (MergeStrategy::Max, Some(f)) => classifier.max(f),
            (MergeStrategy::Forecast, Some(f)) => f,
            _ => classifier,
        }
    }

    /// Roll reports up per city, sorted by city
    pub fn summarize(&self, reports: &[RiskReport], forecasts: &[ForecastPoint]) -> Vec<CitySummary> {
        let mut by_city: BTreeMap<&str, Vec<&RiskReport>> = BTreeMap::new();
        for report in reports {
            by_city.entry(report.city.as_str()).or_default().push(report);
        }

        let mut peaks: HashMap<&str, &ForecastPoint> = HashMap::new();
        for point in forecasts.iter().filter(|p| p.is_future()) {
            let peak = peaks.entry(point.city.as_str()).or_insert(point);
            if point.likelihood > peak.likelihood {
                *peak = point;
            }
        }

        by_city
            .into_iter()
            .filter_map(|(city, city_reports)| {
                let latest = city_reports.iter().max_by_key(|r| r.date)?;

                let mut category_counts: BTreeMap<RiskCategory, usize> =
                    RiskCategory::ALL.iter().map(|&c| (c, 0)).collect();
                for report in &city_reports {
                    *category_counts.entry(report.category).or_insert(0) += 1;
                }

                let mean_risk_score = city_reports.iter().map(|r| r.risk_score).sum::<f64>()
                    / city_reports.len() as f64;

                let peak_forecast = peaks.get(city).map(|p| (*p).clone());
                let outlook = peak_forecast
                    .as_ref()
                    .map(|p| self.config.thresholds.categorize(p.likelihood));

                debug!("{}: latest {} outlook {:?}", city, latest.category, outlook);

                Some(CitySummary {
                    city: city.to_string(),
                    latest_date: latest.date,
                    latest_category: latest.category,
                    mean_risk_score,
                    category_counts,
                    peak_forecast,
                    outlook,
                })
            })
            .collect()
    }
}

/// `P(Medium) * 0.5 + P(High)`
pub fn risk_score(prediction: &Prediction<RiskCategory>) -> f64 {
    let medium = prediction.probability(&RiskCategory::Medium.to_string());
    let high = prediction.probability(&RiskCategory::High.to_string());
    (medium * 0.5 + high).clamp(0.0, 1.0)
}
