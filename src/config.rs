use crate::error::{AppError, Result};
use crate::models::{RiskThresholds, WEATHER_COLUMNS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig,

    /// Feature builder configuration
    #[serde(default)]
    #[validate(nested)]
    pub features: FeatureConfig,

    /// Mutual-information feature selection
    #[serde(default)]
    #[validate(nested)]
    pub selection: SelectionConfig,

    /// Class imbalance correction
    #[serde(default)]
    #[validate(nested)]
    pub imbalance: ImbalanceConfig,

    /// Risk classifier
    #[serde(default)]
    #[validate(nested)]
    pub classifier: ClassifierConfig,

    /// Outbreak forecaster
    #[serde(default)]
    #[validate(nested)]
    pub forecaster: ForecasterConfig,

    /// Report merging
    #[serde(default)]
    #[validate(nested)]
    pub risk: RiskConfig,

    /// Holdout evaluation
    #[serde(default)]
    #[validate(nested)]
    pub evaluation: EvaluationConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_string_lossy().into_owned(),
            None => std::env::var("ARBO_RISK_CONFIG")
                .unwrap_or_else(|_| "config/arbo-risk.toml".to_string()),
        };

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file; required only when given explicitly
            .add_source(config::File::with_name(&config_path).required(path.is_some()))
            // Override with environment variables (prefix: ARBO_RISK__)
            .add_source(
                config::Environment::with_prefix("ARBO_RISK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate_all()?;
        Ok(config)
    }

    /// Field validation plus the cross-field checks derive macros cannot express
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;
        self.risk.thresholds.validate()?;

        if self.evaluation.test_size <= 0.0 || self.evaluation.test_size >= 1.0 {
            return Err(AppError::Configuration(
                "evaluation.test_size must be strictly between 0 and 1".to_string(),
            ));
        }

        if self.features.mosquito_temp_min > self.features.mosquito_temp_max {
            return Err(AppError::Configuration(
                "features.mosquito_temp_min must not exceed mosquito_temp_max".to_string(),
            ));
        }

        if self.features.rolling_windows.iter().any(|&w| w == 0) {
            return Err(AppError::Configuration(
                "features.rolling_windows must be positive".to_string(),
            ));
        }

        if self.features.breeding_lags.iter().any(|&l| l == 0) {
            return Err(AppError::Configuration(
                "features.breeding_lags must be positive".to_string(),
            ));
        }

        if let Some(unknown) = self
            .forecaster
            .regressors
            .iter()
            .find(|r| !WEATHER_COLUMNS.contains(&r.as_str()))
        {
            return Err(AppError::Configuration(format!(
                "unknown forecaster regressor: {}",
                unknown
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1))]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FeatureConfig {
    /// Trailing window sizes (rows) for rolling mean/std
    #[serde(default = "default_windows")]
    #[validate(length(min = 1))]
    pub rolling_windows: Vec<usize>,

    /// Row lags for the breeding-conditions indicator
    #[serde(default = "default_windows")]
    pub breeding_lags: Vec<usize>,

    /// Lower bound of the optimal mosquito temperature band (°C)
    #[serde(default = "default_mosquito_temp_min")]
    pub mosquito_temp_min: f64,

    /// Upper bound of the optimal mosquito temperature band (°C)
    #[serde(default = "default_mosquito_temp_max")]
    pub mosquito_temp_max: f64,

    /// Minimum temperature above which breeding is possible (°C)
    #[serde(default = "default_breeding_min_temp")]
    pub breeding_min_temp: f64,

    /// Precipitation above which breeding sites form (mm)
    #[serde(default)]
    pub breeding_min_precipitation: f64,

    /// Include calendar features
    #[serde(default = "default_true")]
    pub include_temporal: bool,

    /// Include sin/cos encodings of the calendar features
    #[serde(default = "default_true")]
    pub include_cyclic: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rolling_windows: default_windows(),
            breeding_lags: default_windows(),
            mosquito_temp_min: default_mosquito_temp_min(),
            mosquito_temp_max: default_mosquito_temp_max(),
            breeding_min_temp: default_breeding_min_temp(),
            breeding_min_precipitation: 0.0,
            include_temporal: true,
            include_cyclic: true,
        }
    }
}

impl FeatureConfig {
    /// Number of earlier rows a feature row can depend on
    pub fn lookback(&self) -> usize {
        let window = self.rolling_windows.iter().copied().max().unwrap_or(1);
        let lag = self.breeding_lags.iter().copied().max().unwrap_or(0);
        window.saturating_sub(1).max(lag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SelectionConfig {
    /// Enable mutual-information feature selection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Equal-width bins used to discretize each feature
    #[serde(default = "default_n_bins")]
    #[validate(range(min = 2, max = 256))]
    pub n_bins: usize,

    /// Keep at most this many features
    #[serde(default)]
    pub max_features: Option<usize>,

    /// Drop features scoring below this many nats
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub min_score: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_bins: default_n_bins(),
            max_features: None,
            min_score: 0.0,
        }
    }
}

/// How the training set is rebalanced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    None,
    RandomOversample,
    RandomUndersample,
    #[default]
    Smote,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImbalanceConfig {
    #[serde(default)]
    pub strategy: BalanceStrategy,

    /// Neighbours considered by SMOTE
    #[serde(default = "default_k_neighbors")]
    #[validate(range(min = 1))]
    pub k_neighbors: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ImbalanceConfig {
    fn default() -> Self {
        Self {
            strategy: BalanceStrategy::default(),
            k_neighbors: default_k_neighbors(),
            seed: default_seed(),
        }
    }
}

/// Classifier model type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Bagged ensemble of CART trees
    #[default]
    RandomForest,

    /// Single CART tree on all features
    DecisionTree,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::RandomForest => write!(f, "Random Forest"),
            ModelType::DecisionTree => write!(f, "Decision Tree"),
        }
    }
}

/// Size of the random feature subspace given to each tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    Sqrt,
    Log2,
    All,
    Count(usize),
}

impl MaxFeatures {
    /// Resolve against the number of available features; always in `1..=n_features`
    pub fn resolve(&self, n_features: usize) -> usize {
        if n_features == 0 {
            return 0;
        }
        let n = n_features as f64;
        let m = match self {
            MaxFeatures::Sqrt => n.sqrt().round() as usize,
            MaxFeatures::Log2 => n.log2().round() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(count) => *count,
        };
        m.clamp(1, n_features)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub model: ModelType,

    #[serde(default = "default_n_trees")]
    #[validate(range(min = 1, max = 10000))]
    pub n_trees: usize,

    #[serde(default = "default_max_depth")]
    #[validate(range(min = 1, max = 64))]
    pub max_depth: u16,

    #[serde(default = "default_min_samples_split")]
    #[validate(range(min = 2))]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,

    #[serde(default)]
    pub max_features: MaxFeatures,

    /// Fit each tree on a bootstrap resample
    #[serde(default = "default_true")]
    pub bootstrap: bool,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Shuffles per feature for permutation importance
    #[serde(default = "default_importance_repeats")]
    #[validate(range(min = 1, max = 100))]
    pub importance_repeats: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: ModelType::default(),
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: MaxFeatures::default(),
            bootstrap: true,
            seed: default_seed(),
            importance_repeats: default_importance_repeats(),
        }
    }
}

/// How seasonal and regressor components combine with the trend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    Additive,
    #[default]
    Multiplicative,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ForecasterConfig {
    /// Enable per-city forecasting
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Days forecast past the end of history
    #[serde(default = "default_periods")]
    #[validate(range(min = 1, max = 3650))]
    pub periods: usize,

    #[serde(default)]
    pub seasonality_mode: SeasonalityMode,

    #[serde(default = "default_true")]
    pub yearly_seasonality: bool,

    #[serde(default = "default_yearly_order")]
    #[validate(range(min = 1, max = 50))]
    pub yearly_order: usize,

    #[serde(default = "default_true")]
    pub weekly_seasonality: bool,

    #[serde(default = "default_weekly_order")]
    #[validate(range(min = 1, max = 10))]
    pub weekly_order: usize,

    #[serde(default = "default_n_changepoints")]
    pub n_changepoints: usize,

    /// Share of history in which changepoints may be placed
    #[serde(default = "default_changepoint_range")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub changepoint_range: f64,

    #[serde(default = "default_changepoint_prior_scale")]
    #[validate(range(min = 0.0001))]
    pub changepoint_prior_scale: f64,

    #[serde(default = "default_prior_scale")]
    #[validate(range(min = 0.0001))]
    pub seasonality_prior_scale: f64,

    #[serde(default = "default_prior_scale")]
    #[validate(range(min = 0.0001))]
    pub regressor_prior_scale: f64,

    /// Ridge penalty applied on top of the prior scales
    #[serde(default = "default_regularization")]
    #[validate(range(min = 0.000001))]
    pub regularization: f64,

    /// Weather columns used as extra regressors
    #[serde(default = "default_regressors")]
    pub regressors: Vec<String>,

    /// Nominal coverage of the uncertainty interval
    #[serde(default = "default_interval_width")]
    #[validate(range(min = 0.01, max = 0.99))]
    pub interval_width: f64,

    /// Minimum dated points needed to fit a city
    #[serde(default = "default_min_history")]
    #[validate(range(min = 2))]
    pub min_history: usize,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            periods: default_periods(),
            seasonality_mode: SeasonalityMode::default(),
            yearly_seasonality: true,
            yearly_order: default_yearly_order(),
            weekly_seasonality: true,
            weekly_order: default_weekly_order(),
            n_changepoints: default_n_changepoints(),
            changepoint_range: default_changepoint_range(),
            changepoint_prior_scale: default_changepoint_prior_scale(),
            seasonality_prior_scale: default_prior_scale(),
            regressor_prior_scale: default_prior_scale(),
            regularization: default_regularization(),
            regressors: default_regressors(),
            interval_width: default_interval_width(),
            min_history: default_min_history(),
        }
    }
}

/// How classifier and forecast categories combine into the reported one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// More severe of the two
    #[default]
    Max,
    /// Classifier only
    Classifier,
    /// Forecast when available, classifier otherwise
    Forecast,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RiskConfig {
    #[serde(default)]
    pub thresholds: RiskThresholds,

    #[serde(default)]
    pub merge_strategy: MergeStrategy,

    /// Feature importances attached to each report
    #[serde(default = "default_top_importances")]
    #[validate(range(max = 100))]
    pub top_importances: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            thresholds: RiskThresholds::default(),
            merge_strategy: MergeStrategy::default(),
            top_importances: default_top_importances(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvaluationConfig {
    /// Share of the most recent data held out for testing
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Days held out for the forecast backtest
    #[serde(default = "default_backtest_horizon")]
    #[validate(range(min = 1))]
    pub backtest_horizon: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            backtest_horizon: default_backtest_horizon(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_windows() -> Vec<usize> {
    vec![3, 7, 14]
}

fn default_mosquito_temp_min() -> f64 {
    25.0
}

fn default_mosquito_temp_max() -> f64 {
    35.0
}

fn default_breeding_min_temp() -> f64 {
    20.0
}

fn default_n_bins() -> usize {
    10
}

fn default_k_neighbors() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_n_trees() -> usize {
    100
}

fn default_max_depth() -> u16 {
    10
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_importance_repeats() -> usize {
    3
}

fn default_periods() -> usize {
    90
}

fn default_yearly_order() -> usize {
    10
}

fn default_weekly_order() -> usize {
    3
}

fn default_n_changepoints() -> usize {
    25
}

fn default_changepoint_range() -> f64 {
    0.8
}

fn default_changepoint_prior_scale() -> f64 {
    0.05
}

fn default_prior_scale() -> f64 {
    10.0
}

fn default_regularization() -> f64 {
    1.0
}

fn default_regressors() -> Vec<String> {
    vec![
        "temperature_2m_max".to_string(),
        "precipitation_sum".to_string(),
        "wind_speed_10m_max".to_string(),
    ]
}

fn default_interval_width() -> f64 {
    0.8
}

fn default_min_history() -> usize {
    14
}

fn default_top_importances() -> usize {
    5
}

fn default_test_size() -> f64 {
    0.2
}

fn default_backtest_horizon() -> usize {
    30
}
