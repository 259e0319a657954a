use chrono::Utc;
use log::{info, warn};
use ndarray::Array1;

use super::artifact::FORMAT_VERSION;
use super::model::{Detector, ModelMetadata};
use crate::cache::MemoCache;
use crate::classifier::metrics::{mean_std, roc_auc, stratified_folds, stratified_split};
use crate::classifier::{ClassifierBuilder, ConfusionMatrix, FitReport, LinearClassifier, Metrics, DECISION_THRESHOLD};
use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::features::{FeatureExtractor, VocabularyBuilder};
use crate::normalizer::{NormalizedDocument, Normalizer};

/// Trains a [`Detector`] from labelled raw texts.
///
/// This is the untrained side of the detector: it holds configuration only.
/// [`DetectorBuilder::train`] consumes it and returns an immutable, fitted
/// pipeline.
#[derive(Debug, Default)]
pub struct DetectorBuilder {
    config: DetectorConfig,
    cache: Option<MemoCache>,
}

struct FittedPipeline {
    extractor: FeatureExtractor,
    classifier: LinearClassifier,
    report: FitReport,
}

fn select<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

fn predictions(probabilities: &Array1<f64>) -> Vec<u8> {
    probabilities.iter().map(|&p| u8::from(p >= DECISION_THRESHOLD)).collect()
}

impl DetectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Normalization cache to train through; the trained detector keeps it.
    pub fn with_cache(mut self, cache: MemoCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn validate<S: AsRef<str>>(&self, texts: &[S], labels: &[u8]) -> Result<()> {
        if texts.len() != labels.len() {
            return Err(DetectorError::InvalidInput(format!(
                "{} texts but {} labels",
                texts.len(),
                labels.len()
            )));
        }
        if texts.is_empty() {
            return Err(DetectorError::InvalidInput("Training corpus is empty".into()));
        }
        if labels.iter().any(|&l| l > 1) {
            return Err(DetectorError::InvalidInput("Labels must be 0 or 1".into()));
        }
        let positives = labels.iter().filter(|&&l| l == 1).count();
        if positives == 0 || positives == labels.len() {
            return Err(DetectorError::InvalidInput(
                "Training data must contain both classes".into(),
            ));
        }
        let fraction = self.config.holdout_fraction;
        if !(0.0..1.0).contains(&fraction) {
            return Err(DetectorError::InvalidInput(format!(
                "Holdout fraction must be in [0, 1), got {}",
                fraction
            )));
        }
        Ok(())
    }

    /// Vocabulary, scaler and weights fitted on one set of rows.
    fn fit_pipeline(
        &self,
        docs: &[NormalizedDocument],
        texts: &[&str],
        labels: &[u8],
    ) -> Result<FittedPipeline> {
        let vocabulary = VocabularyBuilder::from_config(&self.config).fit(docs)?;
        let extractor = FeatureExtractor::new(vocabulary);
        let x = extractor.extract_batch(docs, texts);
        let (classifier, report) = ClassifierBuilder::from_config(&self.config).fit(&x, labels)?;
        Ok(FittedPipeline { extractor, classifier, report })
    }

    fn cross_validate(
        &self,
        docs: &[NormalizedDocument],
        texts: &[&str],
        labels: &[u8],
        warnings: &mut Vec<String>,
    ) -> Result<Option<(f64, f64)>> {
        let Some(k) = self.config.cv_folds else {
            return Ok(None);
        };
        let Some(folds) = stratified_folds(labels, k, self.config.seed) else {
            let message = format!("Cross-validation skipped: a class has fewer than {} training samples", k);
            warn!("{}", message);
            warnings.push(message);
            return Ok(None);
        };

        let mut scores = Vec::with_capacity(k);
        for (fold, held_out) in folds.iter().enumerate() {
            let train: Vec<usize> = (0..labels.len()).filter(|i| held_out.binary_search(i).is_err()).collect();
            let fitted = self.fit_pipeline(&select(docs, &train), &select(texts, &train), &select(labels, &train))?;
            let x = fitted.extractor.extract_batch(&select(docs, held_out), &select(texts, held_out));
            let predicted = predictions(&fitted.classifier.predict_probabilities(&x)?);
            let accuracy = ConfusionMatrix::from_predictions(&select(labels, held_out), &predicted).accuracy();
            info!("Fold {}/{}: accuracy {:.4}", fold + 1, k, accuracy);
            scores.push(accuracy);
        }
        Ok(mean_std(&scores))
    }

    /// Normalizes the corpus, fits vocabulary and classifier on a stratified
    /// training split, and evaluates on the held-out rows.
    ///
    /// Labels must already be binary (1 = phishing). The returned detector
    /// carries the resulting [`Metrics`].
    pub fn train<S>(mut self, texts: &[S], labels: &[u8]) -> Result<Detector>
    where
        S: AsRef<str> + Sync,
    {
        self.validate(texts, labels)?;
        let mut cache = self
            .cache
            .take()
            .unwrap_or_else(|| MemoCache::with_policy(self.config.cache_policy));
        let config = &self.config;
        info!("Training on {} documents ({} phishing)", texts.len(), labels.iter().filter(|&&l| l == 1).count());

        let normalizer = Normalizer::with_options(config.language, &config.protected_words, config.remove_stopwords);
        cache.bind(&normalizer.fingerprint());
        let docs = normalizer.normalize_batch(texts, &mut cache, config.parallel_threshold);
        let raw: Vec<&str> = texts.iter().map(AsRef::as_ref).collect();

        let mut warnings = Vec::new();
        let (train_idx, test_idx) = match stratified_split(labels, config.holdout_fraction, config.seed) {
            Some(split) => split,
            None => {
                let message = "No holdout split possible; metrics are computed on the training data".to_string();
                warn!("{}", message);
                warnings.push(message);
                ((0..labels.len()).collect(), Vec::new())
            }
        };

        let train_docs = select(&docs, &train_idx);
        let train_texts = select(&raw, &train_idx);
        let train_labels = select(labels, &train_idx);
        let fitted = self.fit_pipeline(&train_docs, &train_texts, &train_labels)?;
        if !fitted.report.converged {
            let message = format!(
                "Classifier did not converge within {} iterations",
                config.max_iter
            );
            warnings.push(message);
        }

        let train_x = fitted.extractor.extract_batch(&train_docs, &train_texts);
        let train_predicted = predictions(&fitted.classifier.predict_probabilities(&train_x)?);
        let train_accuracy = ConfusionMatrix::from_predictions(&train_labels, &train_predicted).accuracy();

        let (eval_docs, eval_texts, eval_labels) = if test_idx.is_empty() {
            (train_docs.clone(), train_texts.clone(), train_labels.clone())
        } else {
            (select(&docs, &test_idx), select(&raw, &test_idx), select(labels, &test_idx))
        };
        let eval_x = fitted.extractor.extract_batch(&eval_docs, &eval_texts);
        let eval_probabilities = fitted.classifier.predict_probabilities(&eval_x)?;
        let confusion_matrix = ConfusionMatrix::from_predictions(&eval_labels, &predictions(&eval_probabilities));
        let auc = roc_auc(&eval_labels, &eval_probabilities.to_vec());

        let cv = self.cross_validate(&train_docs, &train_texts, &train_labels, &mut warnings)?;

        let metrics = Metrics {
            train_accuracy,
            test_accuracy: confusion_matrix.accuracy(),
            precision: confusion_matrix.precision(),
            recall: confusion_matrix.recall(),
            f1: confusion_matrix.f1(),
            auc,
            confusion_matrix,
            cv_mean: cv.map(|(mean, _)| mean),
            cv_std: cv.map(|(_, std)| std),
            converged: fitted.report.converged,
            iterations: fitted.report.iterations,
            train_size: train_idx.len(),
            test_size: test_idx.len(),
            vocabulary_size: fitted.extractor.lexical_len(),
            feature_count: fitted.extractor.dimension(),
            warnings,
        };
        info!(
            "Training complete: accuracy {:.4} (train {:.4}), F1 {:.4}, {} features",
            metrics.test_accuracy, metrics.train_accuracy, metrics.f1, metrics.feature_count
        );

        let metadata = ModelMetadata {
            format_version: FORMAT_VERSION,
            language: config.language,
            max_features: config.max_features,
            vocabulary_size: metrics.vocabulary_size,
            feature_count: metrics.feature_count,
            metrics,
            trained_at: Utc::now(),
            saved_at: None,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let threshold = config.parallel_threshold;
        Ok(Detector::from_components(normalizer, fitted.extractor, fitted.classifier, metadata, cache)?
            .with_parallel_threshold(threshold))
    }
}
