use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::CachePolicy;
use crate::features::{FINANCIAL_KEYWORDS, URGENCY_KEYWORDS};
use crate::normalizer::Language;

pub const DEFAULT_MAX_FEATURES: usize = 3000;
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 100;
pub const ARTIFACT_FILE_NAME: &str = "detector.bin";
pub const CACHE_FILE_NAME: &str = "normalization_cache.json";

/// Settings for every stage of the pipeline, fixed when training starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub language: Language,
    pub remove_stopwords: bool,
    /// Words that survive stopword removal
    pub protected_words: Vec<String>,
    pub max_features: usize,
    pub ngram_range: (usize, usize),
    /// Minimum number of documents a term must occur in
    pub min_df: usize,
    /// Maximum fraction of documents a term may occur in
    pub max_df: f64,
    pub sublinear_tf: bool,
    /// Inverse regularization strength
    pub regularization: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    pub holdout_fraction: f64,
    pub cv_folds: Option<usize>,
    pub seed: u64,
    /// Batch size from which normalization is spread over worker threads
    pub parallel_threshold: usize,
    pub cache_policy: CachePolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            language: Language::English,
            remove_stopwords: true,
            protected_words: default_protected_words(),
            max_features: DEFAULT_MAX_FEATURES,
            ngram_range: (1, 2),
            min_df: 2,
            max_df: 0.8,
            sublinear_tf: true,
            regularization: 1.0,
            max_iter: 2000,
            tolerance: 1e-4,
            holdout_fraction: 0.2,
            cv_folds: Some(5),
            seed: 42,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            cache_policy: CachePolicy::Unbounded,
        }
    }
}

impl DetectorConfig {
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_stopword_removal(mut self, enabled: bool) -> Self {
        self.remove_stopwords = enabled;
        self
    }

    pub fn with_protected_words(mut self, words: Vec<impl Into<String>>) -> Self {
        self.protected_words = words.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_document_frequency(mut self, min_df: usize, max_df: f64) -> Self {
        self.min_df = min_df;
        self.max_df = max_df;
        self
    }

    pub fn with_regularization(mut self, c: f64) -> Self {
        self.regularization = c;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_holdout_fraction(mut self, fraction: f64) -> Self {
        self.holdout_fraction = fraction;
        self
    }

    pub fn with_cv_folds(mut self, folds: Option<usize>) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }
}

/// Urgency and financial terms are kept through stopword removal.
pub fn default_protected_words() -> Vec<String> {
    URGENCY_KEYWORDS
        .iter()
        .chain(FINANCIAL_KEYWORDS.iter())
        .map(|w| w.to_string())
        .collect()
}

pub const HOME_ENV_VAR: &str = "PHISHGUARD_HOME";

/// Returns the directory holding artifacts and cache snapshots
pub fn default_data_dir() -> PathBuf {
    resolve_data_dir(env::var_os(HOME_ENV_VAR).map(PathBuf::from))
}

fn resolve_data_dir(home_override: Option<PathBuf>) -> PathBuf {
    // 1. Check environment variable
    if let Some(path) = home_override {
        return path;
    }

    // 2. Use platform-specific data directory
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("phishguard");
    }

    // 3. Fallback to user's home directory
    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".local").join("share").join("phishguard");
    }

    // 4. If all else fails, use system temp directory
    env::temp_dir().join("phishguard")
}

pub fn default_artifact_path() -> PathBuf {
    default_data_dir().join(ARTIFACT_FILE_NAME)
}

pub fn default_cache_path() -> PathBuf {
    default_data_dir().join(CACHE_FILE_NAME)
}
