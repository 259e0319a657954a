//! Evaluation metrics and stratified sampling for binary labels.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Counts of a binary confusion matrix, label 1 being the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(truth: &[u8], predicted: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (0, 0) => matrix.true_negative += 1,
                (0, _) => matrix.false_positive += 1,
                (_, 0) => matrix.false_negative += 1,
                _ => matrix.true_positive += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_negative + self.true_positive, self.total())
    }

    /// 0.0 when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// 0.0 when there are no positive samples
    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Summary of a training run.
///
/// Holdout metrics fall back to the training split when no holdout could be
/// drawn; `warnings` says so when that happens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Area under the ROC curve, absent when the evaluated split has one class
    pub auc: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
    pub cv_mean: Option<f64>,
    pub cv_std: Option<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub vocabulary_size: usize,
    pub feature_count: usize,
    pub warnings: Vec<String>,
}

/// ROC AUC via the rank statistic, ties sharing their average rank.
pub fn roc_auc(truth: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = truth.iter().filter(|&&t| t != 0).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let average = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = average;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = truth
        .iter()
        .zip(&ranks)
        .filter(|(t, _)| **t != 0)
        .map(|(_, r)| *r)
        .sum();
    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

fn shuffled_classes(labels: &[u8], seed: u64) -> [Vec<usize>; 2] {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut classes: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        classes[usize::from(label != 0)].push(i);
    }
    for class in classes.iter_mut() {
        class.shuffle(&mut rng);
    }
    classes
}

/// Seeded split keeping the class ratio in both parts.
///
/// Returns `(train, holdout)` sorted indices, or `None` when some class has
/// fewer than two samples or the fraction leaves either part empty.
pub fn stratified_split(labels: &[u8], fraction: f64, seed: u64) -> Option<(Vec<usize>, Vec<usize>)> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return None;
    }
    let classes = shuffled_classes(labels, seed);
    if classes.iter().any(|c| c.len() < 2) {
        return None;
    }

    let mut train = Vec::with_capacity(labels.len());
    let mut holdout = Vec::new();
    for class in &classes {
        let n_holdout = ((class.len() as f64 * fraction).round() as usize).clamp(1, class.len() - 1);
        holdout.extend_from_slice(&class[..n_holdout]);
        train.extend_from_slice(&class[n_holdout..]);
    }
    train.sort_unstable();
    holdout.sort_unstable();
    Some((train, holdout))
}

/// Seeded stratified k-fold assignment, each fold listing its held-out
/// indices. `None` when k < 2 or a class has fewer than k samples.
pub fn stratified_folds(labels: &[u8], k: usize, seed: u64) -> Option<Vec<Vec<usize>>> {
    if k < 2 {
        return None;
    }
    let classes = shuffled_classes(labels, seed);
    if classes.iter().any(|c| c.len() < k) {
        return None;
    }
    let mut folds = vec![Vec::new(); k];
    for class in &classes {
        for (position, &index) in class.iter().enumerate() {
            folds[position % k].push(index);
        }
    }
    for fold in folds.iter_mut() {
        fold.sort_unstable();
    }
    Some(folds)
}

/// Population mean and standard deviation
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
