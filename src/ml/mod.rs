/// Machine learning for risk classification
///
/// This module provides:
/// - A seeded Random Forest over CART trees, with a single-tree baseline
/// - Class rebalancing (random over/undersampling and SMOTE)
/// - Permutation feature importance
/// - Training datasets and evaluation metrics

pub mod classifier;
pub mod imbalance;
pub mod importance;
pub mod models;

pub use classifier::{Classifier, RandomForestClassifier, RiskClassifier};
pub use imbalance::ImbalanceCorrector;
pub use importance::permutation_importance;
pub use models::{
    ClassMetrics, ModelMetadata, ModelMetrics, Prediction, TrainingDataset, TrainingSample,
};
