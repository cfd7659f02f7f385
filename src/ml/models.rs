use crate::config::ModelType;
use crate::error::{AppError, Result};
use crate::features::FeatureMatrix;
use crate::models::RiskCategory;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Prediction result with confidence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction<T> {
    /// Predicted value
    pub value: T,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// All class probabilities
    pub probabilities: BTreeMap<String, f64>,
}

impl<T> Prediction<T> {
    pub fn new(value: T, confidence: f64) -> Self {
        Self {
            value,
            confidence,
            probabilities: BTreeMap::new(),
        }
    }

    pub fn with_probabilities(mut self, probabilities: BTreeMap<String, f64>) -> Self {
        self.probabilities = probabilities;
        self
    }

    /// Probability of a named class, 0 when absent
    pub fn probability(&self, class: &str) -> f64 {
        self.probabilities.get(class).copied().unwrap_or(0.0)
    }
}

/// Training sample for ML models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Feature vector
    pub features: Vec<f64>,

    /// Risk label
    pub label: RiskCategory,

    /// Generated by the imbalance corrector rather than observed
    pub synthetic: bool,
}

impl TrainingSample {
    pub fn new(features: Vec<f64>, label: RiskCategory) -> Self {
        Self {
            features,
            label,
            synthetic: false,
        }
    }
}

/// Training dataset
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Risk labels
    pub labels: Vec<RiskCategory>,

    /// Synthetic-sample flags
    pub synthetic: Vec<bool>,

    /// Feature names, one per column
    pub feature_names: Vec<String>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    /// Create a new training dataset from samples
    pub fn from_samples(samples: &[TrainingSample], feature_names: Vec<String>) -> Result<Self> {
        let n_samples = samples.len();
        let n_features = feature_names.len();

        let mut features = Array2::zeros((n_samples, n_features));
        let mut labels = Vec::with_capacity(n_samples);
        let mut synthetic = Vec::with_capacity(n_samples);

        for (i, sample) in samples.iter().enumerate() {
            if sample.features.len() != n_features {
                return Err(AppError::Internal(format!(
                    "sample {} has {} features, expected {}",
                    i,
                    sample.features.len(),
                    n_features
                )));
            }
            for (j, &val) in sample.features.iter().enumerate() {
                features[[i, j]] = val;
            }
            labels.push(sample.label);
            synthetic.push(sample.synthetic);
        }

        Ok(Self {
            features,
            labels,
            synthetic,
            feature_names,
            n_samples,
            n_features,
        })
    }

    /// Pair a feature matrix with labels, row for row
    pub fn from_matrix(matrix: &FeatureMatrix, labels: Vec<RiskCategory>) -> Result<Self> {
        if matrix.len() != labels.len() {
            return Err(AppError::Internal(format!(
                "{} labels for {} feature rows",
                labels.len(),
                matrix.len()
            )));
        }

        Ok(Self {
            features: matrix.to_array(),
            synthetic: vec![false; labels.len()],
            labels,
            feature_names: matrix.names.clone(),
            n_samples: matrix.len(),
            n_features: matrix.n_features(),
        })
    }

    /// Class indices (0 = Low) for the models
    pub fn label_indices(&self) -> Vec<usize> {
        self.labels.iter().map(|l| l.index()).collect()
    }

    /// Number of samples per category
    pub fn class_counts(&self) -> BTreeMap<RiskCategory, usize> {
        let mut counts: BTreeMap<RiskCategory, usize> =
            RiskCategory::ALL.iter().map(|&c| (c, 0)).collect();
        for label in &self.labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    pub fn n_synthetic(&self) -> usize {
        self.synthetic.iter().filter(|&&s| s).count()
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Confusion matrix, rows = true class, columns = predicted class
    pub confusion_matrix: Option<Array2<usize>>,

    /// Per-class metrics
    pub per_class_metrics: HashMap<String, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: None,
            per_class_metrics: HashMap::new(),
        }
    }

    /// Score class-index predictions against the truth
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Self {
        let n_samples = y_true.len().min(y_pred.len());
        if n_samples == 0 {
            return Self::new();
        }

        let mut confusion = Array2::<usize>::zeros((n_classes, n_classes));
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            if t < n_classes && p < n_classes {
                confusion[[t, p]] += 1;
            }
        }

        let correct = (0..n_classes).map(|c| confusion[[c, c]]).sum::<usize>();
        let accuracy = correct as f64 / n_samples as f64;

        let mut per_class = HashMap::new();
        for class_idx in 0..n_classes {
            let tp = confusion[[class_idx, class_idx]];
            let fp = confusion.column(class_idx).sum() - tp;
            let fn_count = confusion.row(class_idx).sum() - tp;

            let precision = if tp + fp > 0 {
                tp as f64 / (tp + fp) as f64
            } else {
                0.0
            };

            let recall = if tp + fn_count > 0 {
                tp as f64 / (tp + fn_count) as f64
            } else {
                0.0
            };

            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            let name = RiskCategory::from_index(class_idx)
                .map(|c| c.to_string())
                .unwrap_or_else(|| format!("class_{}", class_idx));

            per_class.insert(
                name,
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1,
                    support: tp + fn_count,
                },
            );
        }

        let avg = |f: fn(&ClassMetrics) -> f64| {
            per_class.values().map(f).sum::<f64>() / n_classes as f64
        };

        Self {
            accuracy,
            precision: avg(|m| m.precision),
            recall: avg(|m| m.recall),
            f1_score: avg(|m| m.f1_score),
            confusion_matrix: Some(confusion),
            per_class_metrics: per_class,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model version
    pub version: String,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples, synthetic included
    pub n_training_samples: usize,

    /// Number of synthetic training samples
    pub n_synthetic_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Feature names in column order
    pub feature_names: Vec<String>,

    /// Training metrics
    pub training_metrics: ModelMetrics,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}
