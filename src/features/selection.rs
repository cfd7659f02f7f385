use crate::config::SelectionConfig;
use crate::error::{AppError, Result};
use crate::features::builder::FeatureMatrix;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Mutual information of one feature with the label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureScore {
    pub name: String,

    /// Column in the unselected matrix
    pub index: usize,

    /// Mutual information in nats
    pub score: f64,
}

/// Keeps the features most informative about the risk label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutualInfoSelector {
    config: SelectionConfig,
    scores: Vec<FeatureScore>,
    selected: Vec<usize>,
    input_names: Vec<String>,
    is_fitted: bool,
}

impl MutualInfoSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            scores: Vec::new(),
            selected: Vec::new(),
            input_names: Vec::new(),
            is_fitted: false,
        }
    }

    /// Score every feature and choose the columns to keep
    pub fn fit(
        &mut self,
        names: &[String],
        features: &Array2<f64>,
        labels: &[usize],
    ) -> Result<&[FeatureScore]> {
        if features.ncols() != names.len() {
            return Err(AppError::Internal(format!(
                "{} feature names for {} columns",
                names.len(),
                features.ncols()
            )));
        }
        if features.nrows() != labels.len() {
            return Err(AppError::Internal(format!(
                "{} labels for {} rows",
                labels.len(),
                features.nrows()
            )));
        }

        self.input_names = names.to_vec();
        self.scores = features
            .axis_iter(Axis(1))
            .enumerate()
            .map(|(index, column)| FeatureScore {
                name: names[index].clone(),
                index,
                score: mutual_information(column, labels, self.config.n_bins),
            })
            .collect();

        self.selected = if self.config.enabled {
            self.choose()
        } else {
            (0..names.len()).collect()
        };
        self.is_fitted = true;

        info!(
            "Selected {} of {} features by mutual information",
            self.selected.len(),
            names.len()
        );

        Ok(&self.scores)
    }

    fn choose(&self) -> Vec<usize> {
        let mut ranked: Vec<&FeatureScore> = self.scores.iter().collect();
        // Stable sort keeps the original order among ties
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let limit = self.config.max_features.unwrap_or(ranked.len()).max(1);
        let mut chosen: Vec<usize> = ranked
            .iter()
            .filter(|s| s.score >= self.config.min_score)
            .take(limit)
            .map(|s| s.index)
            .collect();

        if chosen.is_empty() {
            if let Some(best) = ranked.first() {
                warn!(
                    "No feature reached min_score {:.4}; keeping {}",
                    self.config.min_score, best.name
                );
                chosen.push(best.index);
            }
        }

        chosen.sort_unstable();
        chosen
    }

    /// Project a matrix onto the selected columns
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix> {
        if !self.is_fitted {
            return Err(AppError::NotTrained(
                "MutualInfoSelector must be fitted before transform".to_string(),
            ));
        }
        if matrix.names != self.input_names {
            return Err(AppError::Validation(
                "feature layout differs from the one the selector was fitted on".to_string(),
            ));
        }
        matrix.select(&self.selected)
    }

    /// All scores in input column order
    pub fn scores(&self) -> &[FeatureScore] {
        &self.scores
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selected
            .iter()
            .map(|&i| self.input_names[i].clone())
            .collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// Mutual information (nats) between a feature discretized into `n_bins`
/// equal-width bins and a discrete label.
pub fn mutual_information(values: ArrayView1<f64>, labels: &[usize], n_bins: usize) -> f64 {
    let n = values.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }

    let n_bins = n_bins.max(1);
    let n_labels = labels.iter().copied().max().unwrap_or(0) + 1;

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;

    let bin_of = |v: f64| -> usize {
        if !span.is_finite() || span <= 0.0 {
            0
        } else {
            (((v - min) / span) * n_bins as f64).floor().clamp(0.0, (n_bins - 1) as f64) as usize
        }
    };

    let mut joint = vec![vec![0usize; n_labels]; n_bins];
    for i in 0..n {
        joint[bin_of(values[i])][labels[i]] += 1;
    }

    let total = n as f64;
    let bin_totals: Vec<usize> = joint.iter().map(|row| row.iter().sum()).collect();
    let label_totals: Vec<usize> = (0..n_labels)
        .map(|l| joint.iter().map(|row| row[l]).sum())
        .collect();

    let mut mi = 0.0;
    for (b, row) in joint.iter().enumerate() {
        for (l, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let p_xy = count as f64 / total;
            let p_x = bin_totals[b] as f64 / total;
            let p_y = label_totals[l] as f64 / total;
            mi += p_xy * (p_xy / (p_x * p_y)).ln();
        }
    }

    mi.max(0.0)
}
