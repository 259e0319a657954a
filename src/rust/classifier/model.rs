use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1};

use super::scaler::StandardScaler;
use crate::error::{DetectorError, Result};

/// Decision threshold on the phishing probability
pub const DECISION_THRESHOLD: f64 = 0.5;

/// A fitted linear log-odds model over standardized features.
///
/// Only produced by [`ClassifierBuilder::fit`](super::ClassifierBuilder::fit)
/// or rebuilt from persisted parts, so an instance always has weights. It is
/// immutable and can be shared across threads:
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use ndarray::array;
/// use phishguard::ClassifierBuilder;
///
/// let x = array![[0.0, 1.0], [0.2, 0.9], [1.0, 0.0], [0.9, 0.1]];
/// let (model, report) = ClassifierBuilder::new().fit(&x, &[0, 0, 1, 1])?;
/// assert!(report.converged);
/// assert_eq!(model.predict(array![0.95, 0.05].view())?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LinearClassifier {
    scaler: StandardScaler,
    weights: Array1<f64>,
    bias: f64,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<LinearClassifier>();
    }
};

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LinearClassifier {
    /// Rebuilds a classifier from persisted parts, rejecting any length
    /// disagreement between scaler and weights.
    pub fn from_parts(scaler: StandardScaler, weights: Array1<f64>, bias: f64) -> Result<Self> {
        if scaler.dimension() != weights.len() {
            return Err(DetectorError::VocabularyMismatch {
                vocabulary: scaler.dimension(),
                weights: weights.len(),
            });
        }
        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(DetectorError::Persistence("Classifier weights are not finite".into()));
        }
        Ok(Self { scaler, weights, bias })
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Coefficients on standardized features
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn dimension(&self) -> usize {
        self.weights.len()
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        if len != self.dimension() {
            return Err(DetectorError::InvalidInput(format!(
                "Feature vector has {} values, classifier expects {}",
                len,
                self.dimension()
            )));
        }
        Ok(())
    }

    /// Log-odds of the phishing class
    pub fn decision_function(&self, vector: ArrayView1<f64>) -> Result<f64> {
        self.check_dimension(vector.len())?;
        Ok(self.scaler.transform(vector).dot(&self.weights) + self.bias)
    }

    pub fn predict_probability(&self, vector: ArrayView1<f64>) -> Result<f64> {
        Ok(sigmoid(self.decision_function(vector)?))
    }

    /// 1 (phishing) when the probability reaches [`DECISION_THRESHOLD`]
    pub fn predict(&self, vector: ArrayView1<f64>) -> Result<u8> {
        Ok(u8::from(self.predict_probability(vector)? >= DECISION_THRESHOLD))
    }

    pub fn predict_probabilities(&self, matrix: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_dimension(matrix.ncols())?;
        let logits = self.scaler.transform_matrix(matrix).dot(&self.weights) + self.bias;
        Ok(logits.mapv(sigmoid))
    }

    /// Largest positive and most negative coefficients among the first
    /// `lexical_len` columns, as `(column, weight)` pairs.
    ///
    /// Positive coefficients come back in descending order and negative ones
    /// in ascending order; zero weights are in neither list.
    pub fn top_lexical_weights(&self, n: usize, lexical_len: usize) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
        let lexical = lexical_len.min(self.weights.len());
        let mut positive: Vec<(usize, f64)> = Vec::new();
        let mut negative: Vec<(usize, f64)> = Vec::new();
        for (i, &w) in self.weights.iter().take(lexical).enumerate() {
            if w > 0.0 {
                positive.push((i, w));
            } else if w < 0.0 {
                negative.push((i, w));
            }
        }
        positive.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        negative.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        positive.truncate(n);
        negative.truncate(n);
        (positive, negative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn identity_scaler(dim: usize) -> StandardScaler {
        StandardScaler::from_parts(Array1::zeros(dim), Array1::ones(dim)).unwrap()
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(-800.0).is_finite());
    }

    #[test]
    fn test_predict_threshold() {
        let model = LinearClassifier::from_parts(identity_scaler(1), array![1.0], 0.0).unwrap();
        assert_eq!(model.predict_probability(array![0.0].view()).unwrap(), 0.5);
        assert_eq!(model.predict(array![0.0].view()).unwrap(), 1);
        assert_eq!(model.predict(array![-0.1].view()).unwrap(), 0);
    }

    #[test]
    fn test_dimension_checked() {
        let model = LinearClassifier::from_parts(identity_scaler(2), array![1.0, 1.0], 0.0).unwrap();
        assert!(matches!(
            model.predict(array![1.0].view()),
            Err(DetectorError::InvalidInput(_))
        ));
        assert!(matches!(
            LinearClassifier::from_parts(identity_scaler(3), array![1.0], 0.0),
            Err(DetectorError::VocabularyMismatch { vocabulary: 3, weights: 1 })
        ));
    }

    #[test]
    fn test_top_lexical_weights() {
        let weights = array![0.5, -1.0, 2.0, 0.0, -0.2, 9.0];
        let model = LinearClassifier::from_parts(identity_scaler(6), weights, 0.0).unwrap();
        // last column is not lexical
        let (positive, negative) = model.top_lexical_weights(2, 5);
        assert_eq!(positive, vec![(2, 2.0), (0, 0.5)]);
        assert_eq!(negative, vec![(1, -1.0), (4, -0.2)]);
    }

    #[test]
    fn test_batch_matches_single() {
        let model = LinearClassifier::from_parts(identity_scaler(2), array![1.0, -2.0], 0.3).unwrap();
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let batch = model.predict_probabilities(&x).unwrap();
        for (i, row) in x.rows().into_iter().enumerate() {
            assert!((batch[i] - model.predict_probability(row).unwrap()).abs() < 1e-15);
        }
    }
}
