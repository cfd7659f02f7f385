use crate::config::Config;
use crate::error::{AppError, Result};
use crate::forecasting::{ForecastBatch, SeasonalForecaster};
use crate::ml::ModelMetadata;
use crate::models::{ForecastPoint, LabeledExample, Observation};
use crate::pipeline::{EvaluationReport, RiskOutcome, RiskPipeline, TrainingSummary};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Async front end for the risk pipeline.
///
/// Fitting and scoring are CPU bound and run on the blocking pool; the fitted
/// pipeline is swapped in atomically so scoring never sees a half-trained model.
pub struct RiskService {
    /// Configuration used for the next training run
    config: Arc<RwLock<Config>>,

    /// Most recently fitted pipeline
    pipeline: Arc<RwLock<Option<Arc<RiskPipeline>>>>,

    /// Completed training runs
    training_runs: Arc<RwLock<usize>>,
}

impl RiskService {
    /// Create a new risk service
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            pipeline: Arc::new(RwLock::new(None)),
            training_runs: Arc::new(RwLock::new(0)),
        }
    }

    /// Fit a new pipeline and make it current
    pub async fn train(&self, examples: Vec<LabeledExample>) -> Result<TrainingSummary> {
        let config = self.config.read().await.clone();

        info!("Training risk pipeline on {} examples", examples.len());

        let (pipeline, summary) = tokio::task::spawn_blocking(move || {
            let mut pipeline = RiskPipeline::new(config);
            let summary = pipeline.fit(&examples)?;
            Ok::<_, AppError>((pipeline, summary))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        *self.pipeline.write().await = Some(Arc::new(pipeline));
        *self.training_runs.write().await += 1;

        info!("✅ Risk pipeline trained (run {})", summary.run_id);

        Ok(summary)
    }

    /// Score observations with the current pipeline
    pub async fn score(&self, observations: Vec<Observation>) -> Result<RiskOutcome> {
        let pipeline = self.current().await?;

        debug!("Scoring {} observations", observations.len());

        tokio::task::spawn_blocking(move || pipeline.score(&observations))
            .await
            .map_err(|e| AppError::Internal(format!("Scoring task failed: {}", e)))?
    }

    /// Forecast observations with the current configuration, independent of training
    pub async fn forecast(&self, observations: Vec<Observation>, periods: usize) -> Result<ForecastBatch> {
        let config = self.config.read().await.forecaster.clone();

        tokio::task::spawn_blocking(move || {
            SeasonalForecaster::new(config).forecast_all(&observations, periods)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Forecast task failed: {}", e)))
    }

    /// Chronological holdout evaluation with the current configuration
    pub async fn evaluate(&self, examples: Vec<LabeledExample>) -> Result<EvaluationReport> {
        let config = self.config.read().await.clone();

        tokio::task::spawn_blocking(move || RiskPipeline::evaluate(config, &examples))
            .await
            .map_err(|e| AppError::Internal(format!("Evaluation task failed: {}", e)))?
    }

    /// Forecast points fitted alongside the current pipeline
    pub async fn forecast_points(&self) -> Result<Vec<ForecastPoint>> {
        Ok(self.current().await?.forecast_points().to_vec())
    }

    /// Metadata of the current classifier
    pub async fn model_metadata(&self) -> Result<ModelMetadata> {
        Ok(self.current().await?.model_metadata().clone())
    }

    /// Get service statistics
    pub async fn stats(&self) -> RiskServiceStats {
        let guard = self.pipeline.read().await;
        let pipeline = guard.as_ref();
        let summary = pipeline.and_then(|p| p.training_summary());

        RiskServiceStats {
            is_trained: pipeline.map(|p| p.is_trained()).unwrap_or(false),
            training_runs: *self.training_runs.read().await,
            n_training_rows: summary.map(|s| s.n_rows).unwrap_or(0),
            n_selected_features: summary.map(|s| s.selected_features.len()).unwrap_or(0),
            n_forecast_points: pipeline.map(|p| p.forecast_points().len()).unwrap_or(0),
            training_accuracy: summary.map(|s| s.training_metrics.accuracy),
        }
    }

    /// Replace the configuration used by later runs; the current pipeline keeps its own
    pub async fn update_config(&self, new_config: Config) -> Result<()> {
        new_config.validate_all()?;
        *self.config.write().await = new_config;
        info!("Risk service configuration updated");
        Ok(())
    }

    async fn current(&self) -> Result<Arc<RiskPipeline>> {
        self.pipeline
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::NotTrained("Risk pipeline not trained".to_string()))
    }
}

/// Risk service statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RiskServiceStats {
    pub is_trained: bool,
    pub training_runs: usize,
    pub n_training_rows: usize,
    pub n_selected_features: usize,
    pub n_forecast_points: usize,
    pub training_accuracy: Option<f64>,
}
