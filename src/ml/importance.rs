use crate::error::{AppError, Result};
use crate::ml::classifier::RiskClassifier;
use crate::ml::models::TrainingDataset;
use crate::models::FeatureImportance;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

/// Permutation feature importance.
///
/// For every column, shuffle it `repeats` times and record the mean drop in
/// accuracy against the unshuffled baseline. Results are sorted by importance,
/// highest first, ties kept in column order.
pub fn permutation_importance(
    classifier: &RiskClassifier,
    dataset: &TrainingDataset,
    repeats: usize,
    seed: u64,
) -> Result<Vec<FeatureImportance>> {
    if dataset.n_samples == 0 {
        return Err(AppError::InsufficientData(
            "permutation importance needs at least one sample".to_string(),
        ));
    }

    let labels = dataset.label_indices();
    let baseline = accuracy(&classifier.predict_indices(&dataset.features)?, &labels);
    let repeats = repeats.max(1);

    let mut importances: Vec<FeatureImportance> = (0..dataset.n_features)
        .into_par_iter()
        .map(|column| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(column as u64));
            let mut shuffled = dataset.features.clone();
            let original: Vec<f64> = dataset.features.column(column).to_vec();

            let mut total_drop = 0.0;
            for _ in 0..repeats {
                let mut permuted = original.clone();
                permuted.shuffle(&mut rng);
                for (cell, value) in shuffled.column_mut(column).iter_mut().zip(permuted) {
                    *cell = value;
                }
                let predictions = classifier.predict_indices(&shuffled)?;
                total_drop += baseline - accuracy(&predictions, &labels);
            }

            Ok(FeatureImportance {
                feature: dataset.feature_names[column].clone(),
                importance: total_drop / repeats as f64,
            })
        })
        .collect::<Result<_>>()?;

    importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    Ok(importances)
}

fn accuracy(predictions: &[usize], labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    correct as f64 / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, MaxFeatures};
    use crate::ml::models::TrainingSample;
    use crate::models::RiskCategory;

    #[test]
    fn test_signal_feature_ranks_first() {
        let samples: Vec<TrainingSample> = (0..90)
            .map(|i| {
                let class = i % 3;
                TrainingSample::new(
                    vec![((i * 7) % 11) as f64, class as f64 * 5.0],
                    RiskCategory::from_index(class).unwrap(),
                )
            })
            .collect();
        let dataset =
            TrainingDataset::from_samples(&samples, vec!["noise".into(), "signal".into()]).unwrap();

        let config = ClassifierConfig {
            n_trees: 10,
            max_features: MaxFeatures::All,
            ..ClassifierConfig::default()
        };
        let mut classifier = RiskClassifier::new(&config);
        classifier.train(&dataset).unwrap();

        let importances = permutation_importance(&classifier, &dataset, 3, 7).unwrap();

        assert_eq!(importances.len(), 2);
        assert_eq!(importances[0].feature, "signal");
        assert!(importances[0].importance > 0.3);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 2, 2], &[0, 1, 1, 2]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }
}
