use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::builder::DetectorBuilder;
use super::types::{AnalysisResult, FeatureExplanation, TermWeight};
use crate::cache::{CacheStats, MemoCache};
use crate::classifier::{LinearClassifier, Metrics};
use crate::config::DEFAULT_PARALLEL_THRESHOLD;
use crate::error::{DetectorError, Result};
use crate::features::FeatureExtractor;
use crate::normalizer::{Language, NormalizedDocument, Normalizer};

/// Descriptive record stored alongside a trained pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format_version: u32,
    pub language: Language,
    pub max_features: usize,
    pub vocabulary_size: usize,
    /// Vocabulary size plus the signal features
    pub feature_count: usize,
    pub metrics: Metrics,
    pub trained_at: DateTime<Utc>,
    pub saved_at: Option<DateTime<Utc>>,
    /// Version of the crate that trained the pipeline
    pub crate_version: String,
}

/// A trained phishing detector.
///
/// Holds the whole fitted pipeline (normalizer settings, vocabulary, scaler
/// and weights) and never changes it. The only mutable state is the
/// normalization cache, which sits behind a mutex, so a `Detector` can be
/// shared across threads behind an `Arc`:
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use phishguard::{Detector, DetectorConfig, Verdict};
///
/// let texts = vec![
///     "URGENT! Verify your account now or it will be suspended!",
///     "Your payment failed. Click here immediately to confirm your card!",
///     "Act now! Confirm your bank account at http://secure-login.example",
///     "Hi team, the meeting is moved to Tuesday at 10am.",
///     "Lunch on Friday? Let me know what works for you.",
///     "Attached is the agenda for the Tuesday meeting.",
/// ];
/// let labels = vec![1, 1, 1, 0, 0, 0];
///
/// let detector = Detector::builder()
///     .with_config(DetectorConfig::default().with_holdout_fraction(0.0).with_cv_folds(None))
///     .train(&texts, &labels)?;
///
/// let result = detector.classify("Click here to verify your account now!")?;
/// assert_eq!(result.label, Verdict::Phishing);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Detector {
    normalizer: Normalizer,
    extractor: FeatureExtractor,
    classifier: LinearClassifier,
    metadata: ModelMetadata,
    cache: Mutex<MemoCache>,
    parallel_threshold: usize,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Detector>();
    }
};

impl Detector {
    /// Creates a new DetectorBuilder for training
    pub fn builder() -> DetectorBuilder {
        DetectorBuilder::new()
    }

    /// Assembles a detector, rejecting a vocabulary that does not line up
    /// with the classifier's weights.
    pub(crate) fn from_components(
        normalizer: Normalizer,
        extractor: FeatureExtractor,
        classifier: LinearClassifier,
        metadata: ModelMetadata,
        mut cache: MemoCache,
    ) -> Result<Self> {
        if extractor.dimension() != classifier.dimension() {
            return Err(DetectorError::VocabularyMismatch {
                vocabulary: extractor.lexical_len(),
                weights: classifier.dimension(),
            });
        }
        cache.bind(&normalizer.fingerprint());
        Ok(Self {
            normalizer,
            extractor,
            classifier,
            metadata,
            cache: Mutex::new(cache),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        })
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn classifier(&self) -> &LinearClassifier {
        &self.classifier
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Training metrics recorded when this pipeline was fitted
    pub fn metrics(&self) -> &Metrics {
        &self.metadata.metrics
    }

    pub fn language(&self) -> Language {
        self.normalizer.language()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.extractor.lexical_len()
    }

    pub fn feature_count(&self) -> usize {
        self.extractor.dimension()
    }

    /// Replaces the normalization cache, e.g. with one opened from a snapshot.
    ///
    /// The cache is bound to this detector's normalizer settings; entries
    /// produced under other settings are discarded.
    pub fn with_cache(mut self, mut cache: MemoCache) -> Self {
        cache.bind(&self.normalizer.fingerprint());
        self.cache = Mutex::new(cache);
        self
    }

    /// Batch size from which [`Detector::classify_batch`] normalizes in parallel
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.lock().clear()
    }

    /// Writes the cache snapshot to the path it was opened from.
    pub fn flush_cache(&self) -> Result<()> {
        self.cache.lock().flush()
    }

    /// Cache-checked normalization. The cache lock is not held while
    /// normalizing.
    pub fn normalize(&self, text: &str) -> NormalizedDocument {
        if let Some(doc) = self.cache.lock().get(text) {
            return doc;
        }
        let doc = self.normalizer.normalize(text);
        self.cache.lock().put(text, doc.clone());
        doc
    }

    pub fn classify(&self, text: &str) -> Result<AnalysisResult> {
        self.analyze(text, false)
    }

    /// Like [`Detector::classify`], with the signal features attached.
    pub fn classify_with_features(&self, text: &str) -> Result<AnalysisResult> {
        self.analyze(text, true)
    }

    fn analyze(&self, text: &str, with_features: bool) -> Result<AnalysisResult> {
        let normalized = self.normalize(text);
        let (vector, signals) = self.extractor.extract_with_signals(&normalized, text);
        let probability = self.classifier.predict_probability(vector.view())?;
        let result = AnalysisResult::from_probability(probability, with_features.then_some(signals));
        debug!("Classified as {} (p={:.4}, risk {})", result.label, probability, result.risk);
        Ok(result)
    }

    /// Classifies many documents, normalizing them as one batch.
    pub fn classify_batch<S>(&self, texts: &[S]) -> Result<Vec<AnalysisResult>>
    where
        S: AsRef<str> + Sync,
    {
        let cached: Vec<Option<NormalizedDocument>> = {
            let cache = self.cache.lock();
            texts.iter().map(|t| cache.get(t.as_ref())).collect()
        };
        let missing: Vec<&str> = texts
            .iter()
            .zip(&cached)
            .filter(|(_, doc)| doc.is_none())
            .map(|(text, _)| text.as_ref())
            .collect();

        // Misses are normalized into a private cache and merged afterwards
        let mut fresh = MemoCache::new();
        let mut computed = self
            .normalizer
            .normalize_batch(&missing, &mut fresh, self.parallel_threshold)
            .into_iter();
        self.cache.lock().merge(fresh);

        let normalized: Vec<NormalizedDocument> = cached
            .into_iter()
            .map(|doc| doc.or_else(|| computed.next()).unwrap_or_default())
            .collect();
        let matrix = self.extractor.extract_batch(&normalized, texts);
        let probabilities = self.classifier.predict_probabilities(&matrix)?;
        Ok(probabilities
            .iter()
            .map(|&probability| AnalysisResult::from_probability(probability, None))
            .collect())
    }

    /// Vocabulary terms with the strongest coefficients toward each verdict.
    /// Signal features are never listed.
    pub fn explain_top_features(&self, n: usize) -> FeatureExplanation {
        let (positive, negative) = self
            .classifier
            .top_lexical_weights(n, self.extractor.lexical_len());
        let name = |(index, weight): (usize, f64)| TermWeight {
            term: self.extractor.feature_name(index).unwrap_or_default().to_string(),
            weight,
        };
        FeatureExplanation {
            phishing: positive.into_iter().map(name).collect(),
            legitimate: negative.into_iter().map(name).collect(),
        }
    }
}
