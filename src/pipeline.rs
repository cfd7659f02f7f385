use crate::config::{BalanceStrategy, Config};
use crate::error::{AppError, Result};
use crate::features::{FeatureBuilder, FeatureScore, MutualInfoSelector};
use crate::forecasting::{backtest, BacktestReport, ForecastBatch, SeasonalForecaster, SkippedCity};
use crate::ml::{
    permutation_importance, ImbalanceCorrector, ModelMetadata, ModelMetrics, RiskClassifier,
    TrainingDataset,
};
use crate::models::{
    CitySummary, FeatureImportance, ForecastPoint, LabeledExample, Observation, RiskCategory,
    RiskReport,
};
use crate::reporting::Reporter;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

/// What a training run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,

    /// Labeled examples supplied
    pub n_examples: usize,

    /// Feature rows after dropping unusable cities
    pub n_rows: usize,

    pub n_features_built: usize,
    pub selected_features: Vec<String>,
    pub feature_scores: Vec<FeatureScore>,

    pub class_counts: BTreeMap<RiskCategory, usize>,
    pub balance_strategy: BalanceStrategy,
    pub balanced_counts: BTreeMap<RiskCategory, usize>,
    pub n_synthetic: usize,

    /// Metrics on the (rebalanced) training set
    pub training_metrics: ModelMetrics,

    pub feature_importances: Vec<FeatureImportance>,

    pub forecast_cities: usize,
    pub forecast_skipped: Vec<SkippedCity>,
}

/// Reports and city summaries for one scoring batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskOutcome {
    pub reports: Vec<RiskReport>,
    pub summaries: Vec<CitySummary>,
}

/// Chronological holdout evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,

    /// First date of the test period
    pub cutoff: NaiveDate,

    pub n_train: usize,
    pub n_test: usize,
    pub training: TrainingSummary,

    /// Classifier metrics on the held-out period
    pub test_metrics: ModelMetrics,

    /// Forecast backtest, when forecasting is enabled
    pub forecast: Option<BacktestReport>,
}

/// End-to-end risk pipeline: features, selection, rebalancing, classifier,
/// forecaster and reporter.
pub struct RiskPipeline {
    config: Config,
    builder: FeatureBuilder,
    selector: MutualInfoSelector,
    classifier: RiskClassifier,
    forecaster: SeasonalForecaster,
    reporter: Reporter,
    importances: Vec<FeatureImportance>,
    forecast: ForecastBatch,
    summary: Option<TrainingSummary>,
}

impl RiskPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            builder: FeatureBuilder::new(config.features.clone()),
            selector: MutualInfoSelector::new(config.selection.clone()),
            classifier: RiskClassifier::new(&config.classifier),
            forecaster: SeasonalForecaster::new(config.forecaster.clone()),
            reporter: Reporter::new(config.risk.clone()),
            importances: Vec::new(),
            forecast: ForecastBatch::default(),
            summary: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.classifier.is_trained()
    }

    pub fn training_summary(&self) -> Option<&TrainingSummary> {
        self.summary.as_ref()
    }

    pub fn model_metadata(&self) -> &ModelMetadata {
        self.classifier.metadata()
    }

    /// Forecast points from the most recent training history
    pub fn forecast_points(&self) -> &[ForecastPoint] {
        &self.forecast.points
    }

    /// Fit every stage on labeled history
    pub fn fit(&mut self, examples: &[LabeledExample]) -> Result<TrainingSummary> {
        if examples.is_empty() {
            return Err(AppError::InsufficientData("no training examples".to_string()));
        }

        let observations: Vec<Observation> =
            examples.iter().map(|e| e.observation.clone()).collect();
        let label_of: HashMap<(&str, NaiveDate), RiskCategory> = examples
            .iter()
            .map(|e| ((e.observation.city.as_str(), e.observation.date), e.label))
            .collect();

        let matrix = self.builder.fit(&observations)?;
        if matrix.is_empty() {
            return Err(AppError::InsufficientData(
                "no city has complete enough weather to build features".to_string(),
            ));
        }

        let labels: Vec<RiskCategory> = matrix
            .rows
            .iter()
            .map(|row| {
                label_of
                    .get(&(row.city.as_str(), row.date))
                    .copied()
                    .ok_or_else(|| {
                        AppError::Internal(format!("no label for {} on {}", row.city, row.date))
                    })
            })
            .collect::<Result<_>>()?;

        let label_indices: Vec<usize> = labels.iter().map(|l| l.index()).collect();
        let feature_scores = self
            .selector
            .fit(&matrix.names, &matrix.to_array(), &label_indices)?
            .to_vec();
        let selected = self.selector.transform(&matrix)?;

        let dataset = TrainingDataset::from_matrix(&selected, labels)?;
        let class_counts = dataset.class_counts();

        let corrector = ImbalanceCorrector::new(self.config.imbalance.clone());
        let balanced = corrector.rebalance(&dataset)?;

        let training_metrics = self.classifier.train(&balanced)?;
        info!(
            "Classifier trained: accuracy {:.2}%, macro F1 {:.3}",
            training_metrics.accuracy * 100.0,
            training_metrics.f1_score
        );

        // Importances on the observed rows only
        self.importances = permutation_importance(
            &self.classifier,
            &dataset,
            self.config.classifier.importance_repeats,
            self.config.classifier.seed,
        )?;

        self.fit_forecasts(&observations);

        let summary = TrainingSummary {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            n_examples: examples.len(),
            n_rows: dataset.n_samples,
            n_features_built: matrix.n_features(),
            selected_features: self.selector.selected_names(),
            feature_scores,
            class_counts,
            balance_strategy: corrector.strategy(),
            balanced_counts: balanced.class_counts(),
            n_synthetic: balanced.n_synthetic(),
            training_metrics,
            feature_importances: self.importances.clone(),
            forecast_cities: self.forecast.cities().len(),
            forecast_skipped: self.forecast.skipped.clone(),
        };

        self.summary = Some(summary.clone());
        Ok(summary)
    }

    /// Refit the per-city forecasts on the given history
    pub fn fit_forecasts(&mut self, observations: &[Observation]) {
        self.forecast = if self.config.forecaster.enabled {
            self.forecaster
                .forecast_all(observations, self.config.forecaster.periods)
        } else {
            info!("Forecasting disabled");
            ForecastBatch::default()
        };
    }

    /// Score new observations against the fitted pipeline
    pub fn score(&self, observations: &[Observation]) -> Result<RiskOutcome> {
        if !self.is_trained() {
            return Err(AppError::NotTrained(
                "pipeline must be fitted before scoring".to_string(),
            ));
        }

        let matrix = self.builder.build_with_context(observations)?;
        let dropped = observations.len() - matrix.len();
        if dropped > 0 {
            warn!("{} observations could not be featurized and were not scored", dropped);
        }

        let selected = self.selector.transform(&matrix)?;
        let predictions = if selected.is_empty() {
            Vec::new()
        } else {
            self.classifier.predict_batch(&selected.to_array())?
        };

        let reports = self.reporter.build_reports(
            &selected,
            predictions,
            &self.forecast.points,
            &self.importances,
        )?;
        let summaries = self.reporter.summarize(&reports, &self.forecast.points);

        Ok(RiskOutcome { reports, summaries })
    }

    /// Fit on the earlier part of the history and test on the rest.
    ///
    /// The split is by date so every test observation is later than every
    /// training observation.
    pub fn evaluate(config: Config, examples: &[LabeledExample]) -> Result<EvaluationReport> {
        let dates: BTreeSet<NaiveDate> = examples.iter().map(|e| e.observation.date).collect();
        let dates: Vec<NaiveDate> = dates.into_iter().collect();
        if dates.len() < 2 {
            return Err(AppError::InsufficientData(
                "evaluation needs at least two distinct dates".to_string(),
            ));
        }

        let n_test_dates = ((dates.len() as f64) * config.evaluation.test_size)
            .round()
            .clamp(1.0, (dates.len() - 1) as f64) as usize;
        let cutoff = dates[dates.len() - n_test_dates];

        let (train, test): (Vec<LabeledExample>, Vec<LabeledExample>) = examples
            .iter()
            .cloned()
            .partition(|e| e.observation.date < cutoff);

        info!(
            "Evaluating with {} training and {} test examples (cutoff {})",
            train.len(),
            test.len(),
            cutoff
        );

        let mut pipeline = RiskPipeline::new(config.clone());
        let training = pipeline.fit(&train)?;

        let test_observations: Vec<Observation> =
            test.iter().map(|e| e.observation.clone()).collect();
        let outcome = pipeline.score(&test_observations)?;

        let label_of: HashMap<(&str, NaiveDate), RiskCategory> = test
            .iter()
            .map(|e| ((e.observation.city.as_str(), e.observation.date), e.label))
            .collect();

        let mut y_true = Vec::with_capacity(outcome.reports.len());
        let mut y_pred = Vec::with_capacity(outcome.reports.len());
        for report in &outcome.reports {
            if let Some(label) = label_of.get(&(report.city.as_str(), report.date)) {
                y_true.push(label.index());
                y_pred.push(report.classifier.value.index());
            }
        }

        let test_metrics = ModelMetrics::from_predictions(&y_true, &y_pred, RiskCategory::COUNT);
        info!(
            "Holdout accuracy {:.2}%, macro F1 {:.3}",
            test_metrics.accuracy * 100.0,
            test_metrics.f1_score
        );

        let forecast = if config.forecaster.enabled {
            let observations: Vec<Observation> =
                examples.iter().map(|e| e.observation.clone()).collect();
            let forecaster = SeasonalForecaster::new(config.forecaster.clone());
            Some(backtest(
                &forecaster,
                &observations,
                config.evaluation.backtest_horizon,
            ))
        } else {
            None
        };

        Ok(EvaluationReport {
            run_id: Uuid::new_v4(),
            cutoff,
            n_train: train.len(),
            n_test: y_true.len(),
            training,
            test_metrics,
            forecast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxFeatures;
    use crate::models::WeatherReading;
    use chrono::Duration;

    /// Rainy, warm stretches carry more cases
    fn history(cities: &[&str], days: i64) -> Vec<LabeledExample> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let mut examples = Vec::new();
        for (c, city) in cities.iter().enumerate() {
            for d in 0..days {
                let wet = (d / 10 + c as i64) % 3;
                let rain = wet as f64 * 6.0;
                let t_min = 18.0 + wet as f64 * 2.5;
                let weather = WeatherReading::new(27.0 + wet as f64, t_min, rain, 10.0);
                let cases = match wet {
                    0 => 0.0,
                    1 => 3.0,
                    _ => 9.0,
                };
                let obs = Observation::new(*city, start + Duration::days(d), weather).with_cases(cases);
                examples.push(LabeledExample::from_cases(obs, &Default::default()));
            }
        }
        examples
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.classifier.n_trees = 10;
        config.classifier.max_features = MaxFeatures::All;
        config.classifier.importance_repeats = 1;
        config.forecaster.periods = 10;
        config
    }

    #[test]
    fn test_fit_and_score() {
        let examples = history(&["Recife", "Natal"], 60);
        let mut pipeline = RiskPipeline::new(small_config());
        assert!(!pipeline.is_trained());

        let summary = pipeline.fit(&examples).unwrap();
        assert!(pipeline.is_trained());
        assert_eq!(summary.n_rows, 120);
        assert!(!summary.selected_features.is_empty());
        assert_eq!(summary.forecast_cities, 2);
        assert!(summary.balanced_counts.values().all(|&c| c == summary.balanced_counts[&RiskCategory::Low]));

        let observations: Vec<Observation> =
            examples.iter().map(|e| e.observation.clone()).collect();
        let outcome = pipeline.score(&observations).unwrap();

        assert_eq!(outcome.reports.len(), 120);
        assert_eq!(outcome.summaries.len(), 2);
        assert!(outcome.reports.iter().all(|r| r.forecast.is_some()));
        assert!(outcome
            .reports
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.risk_score)));
    }

    #[test]
    fn test_score_before_fit() {
        let pipeline = RiskPipeline::new(small_config());
        let err = pipeline.score(&[]).unwrap_err();
        assert_eq!(err.error_code(), "NOT_TRAINED");
    }

    #[test]
    fn test_fit_requires_examples() {
        let mut pipeline = RiskPipeline::new(small_config());
        assert!(pipeline.fit(&[]).is_err());
    }

    #[test]
    fn test_evaluate_splits_by_date() {
        let examples = history(&["Recife"], 90);
        let mut config = small_config();
        config.evaluation.backtest_horizon = 10;

        let report = RiskPipeline::evaluate(config, &examples).unwrap();

        assert_eq!(report.n_train + report.n_test, 90);
        assert_eq!(report.n_test, 18);
        assert_eq!(
            report.cutoff,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(72)
        );
        let backtest = report.forecast.unwrap();
        assert_eq!(backtest.cities.len(), 1);
    }

    #[test]
    fn test_disabled_forecaster() {
        let examples = history(&["Recife"], 40);
        let mut config = small_config();
        config.forecaster.enabled = false;

        let mut pipeline = RiskPipeline::new(config);
        let summary = pipeline.fit(&examples).unwrap();
        assert_eq!(summary.forecast_cities, 0);
        assert!(pipeline.forecast_points().is_empty());
    }
}
