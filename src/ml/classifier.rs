use crate::config::{ClassifierConfig, MaxFeatures, ModelType};
use crate::error::{AppError, Result};
use crate::ml::models::{ModelMetadata, ModelMetrics, Prediction, TrainingDataset};
use crate::models::RiskCategory;
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train the classifier
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics>;

    /// Predict class indices
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Predict class probabilities (n_samples × n_classes)
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Get model type
    fn model_type(&self) -> ModelType;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

type CartTree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// A fitted tree, or a leaf when its sample held a single class
enum TreeModel {
    Cart(CartTree),
    Constant(usize),
}

/// One ensemble member and the feature subspace it was fitted on
struct ForestTree {
    columns: Vec<usize>,
    model: TreeModel,
}

impl ForestTree {
    fn predict(&self, features: ArrayView2<f64>) -> Result<Vec<usize>> {
        match &self.model {
            TreeModel::Constant(class) => Ok(vec![*class; features.nrows()]),
            TreeModel::Cart(tree) => {
                let x = to_dense_matrix(features, &self.columns);
                let predictions = tree
                    .predict(&x)
                    .map_err(|e| AppError::Prediction(format!("Tree prediction failed: {}", e)))?;
                Ok(predictions.iter().map(|&p| p.max(0) as usize).collect())
            }
        }
    }
}

/// Random Forest over smartcore CART trees.
///
/// Each tree sees a bootstrap resample of the rows and a random subset of the
/// columns; prediction is a majority vote and probabilities are vote shares.
pub struct RandomForestClassifier {
    /// Model metadata
    metadata: ModelMetadata,

    /// Hyperparameters
    config: ClassifierConfig,

    /// Fitted ensemble
    trees: Vec<ForestTree>,

    /// Number of classes
    n_classes: usize,

    /// Is trained
    trained: bool,
}

impl RandomForestClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let config = match config.model {
            ModelType::RandomForest => config,
            // Single tree on every row and column
            ModelType::DecisionTree => ClassifierConfig {
                n_trees: 1,
                bootstrap: false,
                max_features: MaxFeatures::All,
                ..config
            },
        };

        let hyperparameters: HashMap<String, String> = [
            ("n_trees", config.n_trees.to_string()),
            ("max_depth", config.max_depth.to_string()),
            ("min_samples_split", config.min_samples_split.to_string()),
            ("min_samples_leaf", config.min_samples_leaf.to_string()),
            ("max_features", format!("{:?}", config.max_features)),
            ("bootstrap", config.bootstrap.to_string()),
            ("seed", config.seed.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            metadata: ModelMetadata {
                name: config.model.to_string(),
                version: "1.0".to_string(),
                model_type: config.model,
                trained_at: chrono::Utc::now(),
                n_training_samples: 0,
                n_synthetic_samples: 0,
                n_features: 0,
                feature_names: Vec::new(),
                training_metrics: ModelMetrics::new(),
                hyperparameters,
            },
            config,
            trees: Vec::new(),
            n_classes: RiskCategory::COUNT,
            trained: false,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn fit_tree(&self, features: &Array2<f64>, labels: &[usize], seed: u64) -> Result<ForestTree> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_samples = features.nrows();
        let n_features = features.ncols();

        let rows: Vec<usize> = if self.config.bootstrap {
            (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
        } else {
            (0..n_samples).collect()
        };

        let m = self.config.max_features.resolve(n_features);
        let mut columns: Vec<usize> = if m >= n_features {
            (0..n_features).collect()
        } else {
            rand::seq::index::sample(&mut rng, n_features, m).into_vec()
        };
        columns.sort_unstable();

        let y: Vec<i32> = rows.iter().map(|&r| labels[r] as i32).collect();
        if y.iter().all(|&c| c == y[0]) {
            return Ok(ForestTree {
                columns,
                model: TreeModel::Constant(y[0] as usize),
            });
        }

        let sample = features.select(Axis(0), &rows);
        let x = to_dense_matrix(sample.view(), &columns);

        let params = DecisionTreeClassifierParameters::default()
            .with_criterion(SplitCriterion::Gini)
            .with_max_depth(self.config.max_depth)
            .with_min_samples_split(self.config.min_samples_split)
            .with_min_samples_leaf(self.config.min_samples_leaf);

        let tree = DecisionTreeClassifier::fit(&x, &y, params)
            .map_err(|e| AppError::Training(format!("Failed to train decision tree: {}", e)))?;

        Ok(ForestTree {
            columns,
            model: TreeModel::Cart(tree),
        })
    }

    /// Vote counts per class (n_samples × n_classes)
    fn votes(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.trained {
            return Err(AppError::NotTrained("Model not trained".to_string()));
        }
        if features.ncols() != self.metadata.n_features {
            return Err(AppError::Prediction(format!(
                "expected {} features, got {}",
                self.metadata.n_features,
                features.ncols()
            )));
        }

        let per_tree: Vec<Vec<usize>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(features.view()))
            .collect::<Result<_>>()?;

        let mut votes = Array2::zeros((features.nrows(), self.n_classes));
        for predictions in &per_tree {
            for (i, &class) in predictions.iter().enumerate() {
                if class < self.n_classes {
                    votes[[i, class]] += 1.0;
                }
            }
        }

        Ok(votes)
    }
}

impl Classifier for RandomForestClassifier {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        if dataset.n_samples == 0 {
            return Err(AppError::InsufficientData(
                "No training samples provided".to_string(),
            ));
        }
        if dataset.n_features == 0 {
            return Err(AppError::InsufficientData(
                "Training samples have no features".to_string(),
            ));
        }

        let labels = dataset.label_indices();
        let base_seed = self.config.seed;

        info!(
            "Training {} with {} trees on {} samples × {} features",
            self.config.model, self.config.n_trees, dataset.n_samples, dataset.n_features
        );

        // Seeds are per tree so the ensemble is independent of scheduling
        let trees: Vec<ForestTree> = (0..self.config.n_trees)
            .into_par_iter()
            .map(|i| self.fit_tree(&dataset.features, &labels, base_seed.wrapping_add(i as u64)))
            .collect::<Result<_>>()?;

        let constant = trees
            .iter()
            .filter(|t| matches!(t.model, TreeModel::Constant(_)))
            .count();
        debug!("{} of {} trees are single-class leaves", constant, trees.len());

        self.trees = trees;
        self.trained = true;
        self.metadata.n_training_samples = dataset.n_samples;
        self.metadata.n_synthetic_samples = dataset.n_synthetic();
        self.metadata.n_features = dataset.n_features;
        self.metadata.feature_names = dataset.feature_names.clone();

        let predictions = self.predict(&dataset.features)?;
        let metrics = ModelMetrics::from_predictions(&labels, &predictions, self.n_classes);

        self.metadata.trained_at = chrono::Utc::now();
        self.metadata.training_metrics = metrics.clone();

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let votes = self.votes(features)?;
        Ok(votes.axis_iter(Axis(0)).map(|row| argmax(row.iter().copied())).collect())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let votes = self.votes(features)?;
        let n_trees = self.trees.len().max(1) as f64;
        Ok(votes / n_trees)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn model_type(&self) -> ModelType {
        self.config.model
    }

    fn is_trained(&self) -> bool {
        self.trained
    }
}

/// Risk classifier wrapping the configured model
pub struct RiskClassifier {
    /// Primary model
    primary_model: Box<dyn Classifier>,
}

impl RiskClassifier {
    /// Create a new risk classifier for the configured model type
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            primary_model: Box::new(RandomForestClassifier::new(config.clone())),
        }
    }

    /// Train the classifier
    pub fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        self.primary_model.train(dataset)
    }

    /// Predict the risk category for a single feature vector
    pub fn predict_risk(&self, features: &[f64]) -> Result<Prediction<RiskCategory>> {
        let features_array = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))?;

        self.predict_batch(&features_array)?
            .pop()
            .ok_or_else(|| AppError::Prediction("No prediction produced".to_string()))
    }

    /// Predict risk categories for every row
    pub fn predict_batch(&self, features: &Array2<f64>) -> Result<Vec<Prediction<RiskCategory>>> {
        let proba = self.primary_model.predict_proba(features)?;

        proba
            .axis_iter(Axis(0))
            .map(|row| {
                let idx = argmax(row.iter().copied());
                let category = RiskCategory::from_index(idx).ok_or_else(|| {
                    AppError::Prediction(format!("Unknown class index {}", idx))
                })?;

                let probabilities: BTreeMap<String, f64> = RiskCategory::ALL
                    .iter()
                    .map(|c| (c.to_string(), row.get(c.index()).copied().unwrap_or(0.0)))
                    .collect();

                Ok(Prediction::new(category, row[idx]).with_probabilities(probabilities))
            })
            .collect()
    }

    /// Class indices for every row
    pub fn predict_indices(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        self.primary_model.predict(features)
    }

    /// Check if model is trained
    pub fn is_trained(&self) -> bool {
        self.primary_model.is_trained()
    }

    /// Get model metadata
    pub fn metadata(&self) -> &ModelMetadata {
        self.primary_model.metadata()
    }
}

/// Index of the largest value; ties go to the lower index
fn argmax<I: Iterator<Item = f64>>(values: I) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// Row-major copy of the chosen columns into smartcore's matrix type
fn to_dense_matrix(features: ArrayView2<f64>, columns: &[usize]) -> DenseMatrix<f64> {
    let n_rows = features.nrows();
    let mut data = Vec::with_capacity(n_rows * columns.len());
    for row in features.axis_iter(Axis(0)) {
        data.extend(columns.iter().map(|&c| row[c]));
    }
    DenseMatrix::new(n_rows, columns.len(), data, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::TrainingSample;

    /// Three well separated clusters along the first feature
    fn create_test_dataset(n_samples: usize) -> TrainingDataset {
        let samples: Vec<TrainingSample> = (0..n_samples)
            .map(|i| {
                let class = i % 3;
                let features = vec![
                    class as f64 * 10.0 + (i % 5) as f64 * 0.1,
                    (i % 7) as f64,
                    (i % 2) as f64,
                ];
                TrainingSample::new(features, RiskCategory::from_index(class).unwrap())
            })
            .collect();

        TrainingDataset::from_samples(&samples, vec!["a".into(), "b".into(), "c".into()]).unwrap()
    }

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            n_trees: 15,
            max_depth: 5,
            max_features: MaxFeatures::All,
            ..ClassifierConfig::default()
        }
    }

    #[test]
    fn test_random_forest_classifier() {
        let dataset = create_test_dataset(90);
        let mut classifier = RandomForestClassifier::new(small_config());

        assert!(!classifier.is_trained());

        let metrics = classifier.train(&dataset).unwrap();

        assert!(classifier.is_trained());
        assert_eq!(classifier.n_trees(), 15);
        assert!(metrics.accuracy > 0.9);
        assert_eq!(classifier.metadata().n_features, 3);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let dataset = create_test_dataset(60);
        let mut classifier = RandomForestClassifier::new(small_config());
        classifier.train(&dataset).unwrap();

        let proba = classifier.predict_proba(&dataset.features).unwrap();
        assert_eq!(proba.ncols(), RiskCategory::COUNT);
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_decision_tree_baseline() {
        let dataset = create_test_dataset(60);
        let config = ClassifierConfig {
            model: ModelType::DecisionTree,
            ..small_config()
        };
        let mut classifier = RandomForestClassifier::new(config);
        classifier.train(&dataset).unwrap();

        assert_eq!(classifier.n_trees(), 1);
        assert_eq!(classifier.model_type(), ModelType::DecisionTree);
    }

    #[test]
    fn test_single_class_training() {
        let samples: Vec<TrainingSample> = (0..20)
            .map(|i| TrainingSample::new(vec![i as f64], RiskCategory::Low))
            .collect();
        let dataset = TrainingDataset::from_samples(&samples, vec!["x".into()]).unwrap();

        let mut classifier = RandomForestClassifier::new(small_config());
        let metrics = classifier.train(&dataset).unwrap();

        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(classifier.predict(&dataset.features).unwrap(), vec![0; 20]);
    }

    #[test]
    fn test_untrained_prediction_fails() {
        let classifier = RandomForestClassifier::new(small_config());
        let features = Array2::zeros((1, 3));
        let err = classifier.predict(&features).unwrap_err();
        assert_eq!(err.error_code(), "NOT_TRAINED");
    }

    #[test]
    fn test_feature_count_mismatch() {
        let dataset = create_test_dataset(30);
        let mut classifier = RandomForestClassifier::new(small_config());
        classifier.train(&dataset).unwrap();

        assert!(classifier.predict(&Array2::zeros((1, 2))).is_err());
    }

    #[test]
    fn test_risk_classifier() {
        let dataset = create_test_dataset(90);
        let mut classifier = RiskClassifier::new(&small_config());

        classifier.train(&dataset).unwrap();

        let prediction = classifier.predict_risk(&[20.2, 3.0, 1.0]).unwrap();

        assert_eq!(prediction.value, RiskCategory::High);
        assert!(prediction.confidence > 0.5 && prediction.confidence <= 1.0);
        assert_eq!(prediction.probabilities.len(), 3);
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_training_is_deterministic() {
        let dataset = create_test_dataset(60);
        let config = ClassifierConfig {
            max_features: MaxFeatures::Count(2),
            ..small_config()
        };

        let mut a = RandomForestClassifier::new(config.clone());
        let mut b = RandomForestClassifier::new(config);
        a.train(&dataset).unwrap();
        b.train(&dataset).unwrap();

        let columns_a: Vec<Vec<usize>> = a.trees.iter().map(|t| t.columns.clone()).collect();
        let columns_b: Vec<Vec<usize>> = b.trees.iter().map(|t| t.columns.clone()).collect();
        assert_eq!(columns_a, columns_b);
    }

    #[test]
    fn test_argmax_ties() {
        assert_eq!(argmax([0.2, 0.4, 0.4].into_iter()), 1);
        assert_eq!(argmax([0.0, 0.0, 0.0].into_iter()), 0);
    }
}
