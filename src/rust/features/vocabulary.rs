//! TF-IDF vocabulary: fit once on a training corpus, read-only afterwards.

use std::collections::{HashMap, HashSet};

use log::{info, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::{DetectorConfig, DEFAULT_MAX_FEATURES};
use crate::error::{DetectorError, Result};
use crate::normalizer::NormalizedDocument;

/// Settings for fitting a [`Vocabulary`]. This is the untrained half of the
/// pair; only [`VocabularyBuilder::fit`] produces something that can weight
/// documents.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyBuilder {
    max_features: usize,
    ngram_range: (usize, usize),
    min_df: usize,
    max_df: f64,
    sublinear_tf: bool,
}

impl Default for VocabularyBuilder {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            ngram_range: (1, 2),
            min_df: 2,
            max_df: 0.8,
            sublinear_tf: true,
        }
    }
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            max_features: config.max_features,
            ngram_range: config.ngram_range,
            min_df: config.min_df,
            max_df: config.max_df,
            sublinear_tf: config.sublinear_tf,
        }
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_ngram_range(mut self, min_n: usize, max_n: usize) -> Self {
        self.ngram_range = (min_n, max_n);
        self
    }

    /// Terms in fewer than `min_df` documents or in more than `max_df` of
    /// all documents are dropped.
    pub fn with_document_frequency(mut self, min_df: usize, max_df: f64) -> Self {
        self.min_df = min_df;
        self.max_df = max_df;
        self
    }

    pub fn with_sublinear_tf(mut self, sublinear_tf: bool) -> Self {
        self.sublinear_tf = sublinear_tf;
        self
    }

    fn validate(&self) -> Result<()> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(DetectorError::InvalidInput(format!(
                "Invalid n-gram range ({}, {})",
                min_n, max_n
            )));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(DetectorError::InvalidInput(format!(
                "max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        if self.max_features == 0 {
            return Err(DetectorError::InvalidInput("max_features must be positive".into()));
        }
        Ok(())
    }

    /// Builds the term index and IDF statistics from a normalized corpus.
    ///
    /// Surviving terms are ranked by total corpus frequency (ties broken
    /// alphabetically), the top `max_features` are kept, and feature indices
    /// follow alphabetical order of the kept terms.
    pub fn fit(&self, corpus: &[NormalizedDocument]) -> Result<Vocabulary> {
        self.validate()?;
        if corpus.is_empty() {
            return Err(DetectorError::InvalidInput(
                "Cannot fit a vocabulary on an empty corpus".into(),
            ));
        }

        let n_docs = corpus.len();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut corpus_freq: HashMap<String, usize> = HashMap::new();

        for doc in corpus {
            let grams = ngrams(doc, self.ngram_range);
            let mut seen: HashSet<&str> = HashSet::new();
            for gram in &grams {
                *corpus_freq.entry(gram.clone()).or_insert(0) += 1;
                if seen.insert(gram.as_str()) {
                    *doc_freq.entry(gram.clone()).or_insert(0) += 1;
                }
            }
        }

        let max_doc_count = self.max_df * n_docs as f64;
        let mut candidates: Vec<(String, usize, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.min_df && (*df as f64) <= max_doc_count)
            .map(|(term, df)| {
                let tf = corpus_freq.get(&term).copied().unwrap_or(0);
                (term, df, tf)
            })
            .collect();
        candidates.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(self.max_features);
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        if candidates.is_empty() {
            warn!(
                "No terms survived document-frequency filtering ({} documents, min_df={}, max_df={})",
                n_docs, self.min_df, self.max_df
            );
        }

        let mut parts = VocabularyParts {
            terms: Vec::with_capacity(candidates.len()),
            idf: Vec::with_capacity(candidates.len()),
            corpus_frequency: Vec::with_capacity(candidates.len()),
            ngram_range: self.ngram_range,
            sublinear_tf: self.sublinear_tf,
        };
        for (term, df, tf) in candidates {
            parts.terms.push(term);
            parts.idf.push(((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0);
            parts.corpus_frequency.push(tf);
        }

        let vocabulary = Vocabulary::from_parts(parts)?;
        info!("Vocabulary fitted on {} documents: {} terms", n_docs, vocabulary.len());
        Ok(vocabulary)
    }
}

/// Plain-data form of a [`Vocabulary`], used for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyParts {
    pub terms: Vec<String>,
    pub idf: Vec<f64>,
    pub corpus_frequency: Vec<usize>,
    pub ngram_range: (usize, usize),
    pub sublinear_tf: bool,
}

/// Fitted term -> index mapping with IDF weights. Its size never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    parts: VocabularyParts,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn from_parts(parts: VocabularyParts) -> Result<Self> {
        let terms = parts.terms.len();
        if parts.idf.len() != terms || parts.corpus_frequency.len() != terms {
            return Err(DetectorError::VocabularyMismatch {
                vocabulary: terms,
                weights: parts.idf.len(),
            });
        }
        let index: HashMap<String, usize> = parts
            .terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();
        if index.len() != terms {
            return Err(DetectorError::InvalidInput("Vocabulary contains duplicate terms".into()));
        }
        Ok(Self { parts, index })
    }

    pub fn parts(&self) -> &VocabularyParts {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.terms.is_empty()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    pub fn term(&self, index: usize) -> Option<&str> {
        self.parts.terms.get(index).map(String::as_str)
    }

    /// Most frequent vocabulary terms in the training corpus
    pub fn top_terms(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self
            .parts
            .terms
            .iter()
            .cloned()
            .zip(self.parts.corpus_frequency.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// TF-IDF weights of `doc`, L2-normalized. Out-of-vocabulary terms are
    /// ignored; a document with no known terms maps to the zero vector.
    pub fn transform(&self, doc: &NormalizedDocument) -> Array1<f64> {
        let mut weights = Array1::<f64>::zeros(self.len());
        for gram in ngrams(doc, self.parts.ngram_range) {
            if let Some(i) = self.index_of(&gram) {
                weights[i] += 1.0;
            }
        }

        for (i, w) in weights.iter_mut().enumerate() {
            if *w > 0.0 {
                let tf = if self.parts.sublinear_tf { 1.0 + w.ln() } else { *w };
                *w = tf * self.parts.idf[i];
            }
        }

        let norm = weights.dot(&weights).sqrt();
        if norm > 0.0 {
            weights /= norm;
        }
        weights
    }
}

/// Tokens shorter than two characters are not terms.
fn ngrams(doc: &NormalizedDocument, (min_n, max_n): (usize, usize)) -> Vec<String> {
    let tokens: Vec<&str> = doc.tokens().filter(|t| t.chars().count() >= 2).collect();
    let mut grams = Vec::new();
    for n in min_n..=max_n {
        if n == 0 || n > tokens.len() {
            continue;
        }
        grams.extend(tokens.windows(n).map(|w| w.join(" ")));
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> Vec<NormalizedDocument> {
        texts.iter().map(|t| NormalizedDocument::from(t.to_string())).collect()
    }

    #[test]
    fn test_document_frequency_filtering() {
        let docs = corpus(&[
            "common alpha beta",
            "common alpha gamma",
            "common delta beta",
            "common delta epsilon",
            "common zeta eta",
        ]);
        let vocab = VocabularyBuilder::new()
            .with_ngram_range(1, 1)
            .fit(&docs)
            .unwrap();
        // "common" is in 100% of documents, singletons are in one document
        let terms: Vec<&str> = (0..vocab.len()).filter_map(|i| vocab.term(i)).collect();
        assert_eq!(terms, vec!["alpha", "beta", "delta"]);
    }

    #[test]
    fn test_bigrams_and_max_features() {
        let docs = corpus(&[
            "verify account now",
            "verify account today",
            "meeting tuesday",
            "meeting tuesday morning",
            "lunch friday",
        ]);
        let vocab = VocabularyBuilder::new().fit(&docs).unwrap();
        assert!(vocab.index_of("verify account").is_some());
        assert!(vocab.index_of("meeting tuesday").is_some());

        let capped = VocabularyBuilder::new().with_max_features(2).fit(&docs).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_transform_is_normalized_and_fixed_length() {
        let docs = corpus(&["alpha beta", "alpha gamma", "beta gamma", "delta"]);
        let vocab = VocabularyBuilder::new().with_ngram_range(1, 1).fit(&docs).unwrap();
        assert_eq!(vocab.len(), 3);

        let v = vocab.transform(&NormalizedDocument::from("alpha alpha beta".to_string()));
        assert_eq!(v.len(), 3);
        assert!((v.dot(&v).sqrt() - 1.0).abs() < 1e-12);
        assert!(v[0] > v[1]);

        let unknown = vocab.transform(&NormalizedDocument::from("zzz yyy".to_string()));
        assert_eq!(unknown.len(), 3);
        assert!(unknown.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_empty_corpus_rejected() {
        assert!(matches!(
            VocabularyBuilder::new().fit(&[]),
            Err(DetectorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let parts = VocabularyParts {
            terms: vec!["a".into(), "b".into()],
            idf: vec![1.0],
            corpus_frequency: vec![1, 1],
            ngram_range: (1, 1),
            sublinear_tf: true,
        };
        assert!(matches!(
            Vocabulary::from_parts(parts),
            Err(DetectorError::VocabularyMismatch { .. })
        ));
    }

    #[test]
    fn test_top_terms() {
        let docs = corpus(&["alpha alpha beta", "alpha beta", "gamma", "gamma delta"]);
        let vocab = VocabularyBuilder::new().with_ngram_range(1, 1).fit(&docs).unwrap();
        let top = vocab.top_terms(1);
        assert_eq!(top, vec![("alpha".to_string(), 3)]);
    }
}
