use crate::config::{BalanceStrategy, ImbalanceConfig};
use crate::error::{AppError, Result};
use crate::ml::models::TrainingDataset;
use crate::models::RiskCategory;
use ndarray::{Array1, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Rebalances training data so every present class has the same count
pub struct ImbalanceCorrector {
    config: ImbalanceConfig,
}

impl ImbalanceCorrector {
    pub fn new(config: ImbalanceConfig) -> Self {
        Self { config }
    }

    pub fn strategy(&self) -> BalanceStrategy {
        self.config.strategy
    }

    /// Return a rebalanced copy of the dataset.
    ///
    /// Generated rows are appended after the original ones and flagged as synthetic.
    pub fn rebalance(&self, dataset: &TrainingDataset) -> Result<TrainingDataset> {
        if dataset.n_samples == 0 {
            return Err(AppError::InsufficientData(
                "cannot rebalance an empty dataset".to_string(),
            ));
        }

        let by_class = rows_by_class(dataset);
        let before = dataset.class_counts();

        let balanced = match self.config.strategy {
            BalanceStrategy::None => dataset.clone(),
            BalanceStrategy::RandomUndersample => self.undersample(dataset, &by_class),
            BalanceStrategy::RandomOversample => self.oversample(dataset, &by_class, false)?,
            BalanceStrategy::Smote => self.oversample(dataset, &by_class, true)?,
        };

        info!(
            "Rebalanced with {:?}: {:?} -> {:?} ({} synthetic)",
            self.config.strategy,
            before,
            balanced.class_counts(),
            balanced.n_synthetic()
        );

        Ok(balanced)
    }

    fn undersample(
        &self,
        dataset: &TrainingDataset,
        by_class: &BTreeMap<RiskCategory, Vec<usize>>,
    ) -> TrainingDataset {
        let target = by_class.values().map(Vec::len).min().unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut keep: Vec<usize> = by_class
            .values()
            .flat_map(|rows| {
                rows.choose_multiple(&mut rng, target)
                    .copied()
                    .collect::<Vec<_>>()
            })
            .collect();
        // Original row order survives
        keep.sort_unstable();

        TrainingDataset {
            features: dataset.features.select(Axis(0), &keep),
            labels: keep.iter().map(|&i| dataset.labels[i]).collect(),
            synthetic: keep.iter().map(|&i| dataset.synthetic[i]).collect(),
            feature_names: dataset.feature_names.clone(),
            n_samples: keep.len(),
            n_features: dataset.n_features,
        }
    }

    fn oversample(
        &self,
        dataset: &TrainingDataset,
        by_class: &BTreeMap<RiskCategory, Vec<usize>>,
        smote: bool,
    ) -> Result<TrainingDataset> {
        let target = by_class.values().map(Vec::len).max().unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut new_rows: Vec<Array1<f64>> = Vec::new();
        let mut new_labels: Vec<RiskCategory> = Vec::new();

        for (&class, rows) in by_class {
            let deficit = target - rows.len();
            if deficit == 0 {
                continue;
            }

            let neighbours = if smote && rows.len() > 1 {
                Some(nearest_neighbours(dataset, rows, self.config.k_neighbors))
            } else {
                None
            };

            debug!("Generating {} samples for {}", deficit, class);

            for _ in 0..deficit {
                let pick = rng.gen_range(0..rows.len());
                let base = dataset.features.row(rows[pick]);

                let row = match &neighbours {
                    Some(neighbours) => {
                        let candidates = &neighbours[pick];
                        let other = dataset.features.row(candidates[rng.gen_range(0..candidates.len())]);
                        let gap: f64 = rng.gen();
                        interpolate(base, other, gap)
                    }
                    None => base.to_owned(),
                };

                new_rows.push(row);
                new_labels.push(class);
            }
        }

        let mut balanced = dataset.clone();
        if new_rows.is_empty() {
            return Ok(balanced);
        }

        let views: Vec<ArrayView1<f64>> = new_rows.iter().map(|r| r.view()).collect();
        let extra = ndarray::stack(Axis(0), &views)
            .map_err(|e| AppError::Internal(format!("stacking synthetic rows: {}", e)))?;
        balanced.features = ndarray::concatenate(Axis(0), &[dataset.features.view(), extra.view()])
            .map_err(|e| AppError::Internal(format!("appending synthetic rows: {}", e)))?;
        balanced.synthetic.extend(std::iter::repeat(true).take(new_labels.len()));
        balanced.labels.extend(new_labels);
        balanced.n_samples = balanced.labels.len();

        Ok(balanced)
    }
}

fn rows_by_class(dataset: &TrainingDataset) -> BTreeMap<RiskCategory, Vec<usize>> {
    let mut by_class: BTreeMap<RiskCategory, Vec<usize>> = BTreeMap::new();
    for (i, label) in dataset.labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }
    by_class
}

/// For each row in `rows`, the `k` closest other rows of the same class
fn nearest_neighbours(dataset: &TrainingDataset, rows: &[usize], k: usize) -> Vec<Vec<usize>> {
    rows.iter()
        .map(|&i| {
            let origin = dataset.features.row(i);
            let mut distances: Vec<(f64, usize)> = rows
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (squared_distance(origin, dataset.features.row(j)), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k.max(1)).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn interpolate(a: ArrayView1<f64>, b: ArrayView1<f64>, gap: f64) -> Array1<f64> {
    &a + &((&b - &a) * gap)
}
