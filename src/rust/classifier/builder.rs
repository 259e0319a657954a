use log::{debug, info, warn};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

use super::model::{sigmoid, LinearClassifier};
use super::optimizer::{minimize, LbfgsSettings};
use super::scaler::StandardScaler;
use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};

/// Outcome of the optimizer for one fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub converged: bool,
    pub iterations: usize,
    pub final_loss: f64,
}

/// Untrained half of the classifier: holds hyperparameters and produces a
/// [`LinearClassifier`] through [`ClassifierBuilder::fit`].
///
/// The model is an L2-regularized logistic regression with balanced class
/// weights, fitted on standardized features.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierBuilder {
    regularization: f64,
    max_iter: usize,
    tolerance: f64,
}

impl Default for ClassifierBuilder {
    fn default() -> Self {
        Self {
            regularization: 1.0,
            max_iter: 2000,
            tolerance: 1e-4,
        }
    }
}

impl ClassifierBuilder {
    /// Creates a builder with default hyperparameters
    ///
    /// # Example
    /// ```
    /// use phishguard::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new()
    ///     .with_regularization(0.5)
    ///     .with_max_iter(500);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            regularization: config.regularization,
            max_iter: config.max_iter,
            tolerance: config.tolerance,
        }
    }

    /// Inverse regularization strength; smaller values regularize more.
    pub fn with_regularization(mut self, c: f64) -> Self {
        self.regularization = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn validate(&self, x: &Array2<f64>, labels: &[u8]) -> Result<()> {
        if !(self.regularization.is_finite() && self.regularization > 0.0) {
            return Err(DetectorError::InvalidInput(format!(
                "Regularization must be positive, got {}",
                self.regularization
            )));
        }
        if x.nrows() != labels.len() {
            return Err(DetectorError::InvalidInput(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                labels.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(DetectorError::InvalidInput("Cannot train on zero samples".into()));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l > 1) {
            return Err(DetectorError::InvalidInput(format!("Label {} is not binary", bad)));
        }
        let positives = labels.iter().filter(|&&l| l == 1).count();
        if positives == 0 || positives == labels.len() {
            return Err(DetectorError::InvalidInput(
                "Training data must contain both classes".into(),
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(DetectorError::InvalidInput("Feature matrix contains non-finite values".into()));
        }
        Ok(())
    }

    /// Fits scaler and weights on `x` / `labels`.
    ///
    /// Failing to converge within `max_iter` is not an error: the model is
    /// returned and the [`FitReport`] carries `converged == false`.
    pub fn fit(&self, x: &Array2<f64>, labels: &[u8]) -> Result<(LinearClassifier, FitReport)> {
        self.validate(x, labels)?;

        let scaler = StandardScaler::fit(x)?;
        let z = scaler.transform_matrix(x);
        let (n, d) = z.dim();

        let positives = labels.iter().filter(|&&l| l == 1).count();
        let class_weight = [
            n as f64 / (2.0 * (n - positives) as f64),
            n as f64 / (2.0 * positives as f64),
        ];
        let sample_weight: Array1<f64> = labels.iter().map(|&l| class_weight[usize::from(l)]).collect();
        let targets: Array1<f64> = labels.iter().map(|&l| f64::from(l)).collect();
        let penalty = 1.0 / (self.regularization * n as f64);
        debug!(
            "Fitting logistic regression on {} x {} (class weights {:.3}/{:.3})",
            n, d, class_weight[0], class_weight[1]
        );

        // theta = [w_0 .. w_{d-1}, bias]
        let objective = |theta: &Array1<f64>| {
            let w = theta.slice(s![..d]);
            let b = theta[d];
            let logits = z.dot(&w) + b;

            let mut loss = 0.0;
            let mut residual = Array1::<f64>::zeros(n);
            for i in 0..n {
                let t = logits[i];
                // softplus(-t) for positives, softplus(t) for negatives
                let margin = if targets[i] > 0.5 { -t } else { t };
                loss += sample_weight[i] * (margin.max(0.0) + (-margin.abs()).exp().ln_1p());
                residual[i] = sample_weight[i] * (sigmoid(t) - targets[i]) / n as f64;
            }
            let value = loss / n as f64 + 0.5 * penalty * w.dot(&w);

            let mut gradient = Array1::<f64>::zeros(d + 1);
            let grad_w = z.t().dot(&residual) + &(&w * penalty);
            gradient.slice_mut(s![..d]).assign(&grad_w);
            gradient[d] = residual.sum();
            (value, gradient)
        };

        let settings = LbfgsSettings {
            max_iter: self.max_iter,
            tolerance: self.tolerance,
            ..LbfgsSettings::default()
        };
        let minimum = minimize(objective, Array1::zeros(d + 1), settings);

        if minimum.converged {
            info!("Classifier converged after {} iterations (loss {:.6})", minimum.iterations, minimum.value);
        } else {
            warn!(
                "Classifier did not converge within {} iterations (loss {:.6})",
                self.max_iter, minimum.value
            );
        }

        let weights = minimum.x.slice(s![..d]).to_owned();
        let bias = minimum.x[d];
        let model = LinearClassifier::from_parts(scaler, weights, bias)?;
        let report = FitReport {
            converged: minimum.converged,
            iterations: minimum.iterations,
            final_loss: minimum.value,
        };
        Ok((model, report))
    }
}
