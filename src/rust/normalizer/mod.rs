//! Deterministic text normalization.
//!
//! Every document passes through the same five steps, in this order:
//! 1. case folding
//! 2. URL replacement with [`URL_SENTINEL`]
//! 3. removal of punctuation and non-printable characters (the sentinel survives)
//! 4. whitespace collapsing
//! 5. stopword removal, sparing the protected urgency/financial words
//!
//! URL detection has to run before symbol stripping, otherwise `://` and the
//! dots of a domain are gone before the pattern can see them.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::thread;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};

use crate::cache::MemoCache;
use crate::error::DetectorError;

mod stopwords;

/// Placeholder substituted for every URL found in a document
pub const URL_SENTINEL: &str = "url_token";

lazy_static! {
    pub(crate) static ref URL_PATTERN: Regex =
        Regex::new(r#"(?i)(?:https?://|www\.)[^\s<>"']+"#).expect("URL pattern is valid");
}

/// Counts URL-shaped substrings in `text`.
pub fn count_urls(text: &str) -> usize {
    URL_PATTERN.find_iter(text).count()
}

/// Stopword language of the corpus. Supplied by the caller, never detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Portuguese,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::English => write!(f, "english"),
            Self::Portuguese => write!(f, "portuguese"),
        }
    }
}

impl FromStr for Language {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "portuguese" | "pt" => Ok(Self::Portuguese),
            other => Err(DetectorError::InvalidInput(format!(
                "Unsupported language '{}', expected english or portuguese",
                other
            ))),
        }
    }
}

/// Canonical form of a document, the only text the feature extractor sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedDocument(String);

impl NormalizedDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split_whitespace()
    }
}

impl From<String> for NormalizedDocument {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for NormalizedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stateless text normalizer. Output depends only on the input text, the
/// language and the protected word set.
#[derive(Debug, Clone)]
pub struct Normalizer {
    language: Language,
    remove_stopwords: bool,
    protected_words: HashSet<String>,
    stopwords: HashSet<&'static str>,
}

impl Normalizer {
    pub fn new(language: Language, protected_words: &[String]) -> Self {
        Self::with_options(language, protected_words, true)
    }

    pub fn with_options(language: Language, protected_words: &[String], remove_stopwords: bool) -> Self {
        let protected_words: HashSet<String> =
            protected_words.iter().map(|w| w.to_lowercase()).collect();
        let stopwords: HashSet<&'static str> = stopwords::for_language(language)
            .iter()
            .copied()
            .filter(|w| !protected_words.contains(*w))
            .collect();
        info!(
            "Normalizer ready ({}): {} stopwords, {} protected words",
            language,
            stopwords.len(),
            protected_words.len()
        );
        Self {
            language,
            remove_stopwords,
            protected_words,
            stopwords,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn removes_stopwords(&self) -> bool {
        self.remove_stopwords
    }

    /// Protected words in sorted order
    pub fn protected_words(&self) -> Vec<String> {
        let mut words: Vec<String> = self.protected_words.iter().cloned().collect();
        words.sort();
        words
    }

    /// SHA-256 over the settings that determine the output: language,
    /// stopword flag and the sorted protected words. Two normalizers with
    /// equal fingerprints produce identical output for every input.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.language.to_string().as_bytes());
        hasher.update([u8::from(self.remove_stopwords)]);
        for word in self.protected_words() {
            hasher.update([0u8]);
            hasher.update(word.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Runs the full normalization pipeline on one document.
    ///
    /// Empty or whitespace-only input degrades to an empty document instead
    /// of failing.
    pub fn normalize(&self, text: &str) -> NormalizedDocument {
        if text.trim().is_empty() {
            warn!("Empty text received for normalization");
            return NormalizedDocument::default();
        }

        let folded = text.to_lowercase();
        let (with_sentinels, urls) = Self::replace_urls(&folded);
        if urls > 0 {
            debug!("Replaced {} URLs", urls);
        }
        let stripped = Self::strip_symbols(&with_sentinels);
        let collapsed = Self::collapse_whitespace(&stripped);
        NormalizedDocument(self.remove_stopwords(&collapsed))
    }

    /// Normalizes a batch through `cache`, preserving input order.
    ///
    /// When at least `parallel_threshold` documents miss the cache they are
    /// spread over scoped worker threads. Each worker fills a private cache
    /// that is merged into `cache` after all workers have joined.
    pub fn normalize_batch<S>(
        &self,
        texts: &[S],
        cache: &mut MemoCache,
        parallel_threshold: usize,
    ) -> Vec<NormalizedDocument>
    where
        S: AsRef<str> + Sync,
    {
        let mut output: Vec<Option<NormalizedDocument>> =
            texts.iter().map(|t| cache.get(t.as_ref())).collect();
        let misses: Vec<usize> = output
            .iter()
            .enumerate()
            .filter(|(_, doc)| doc.is_none())
            .map(|(i, _)| i)
            .collect();
        info!(
            "Normalizing batch of {} texts ({} cached, {} to process)",
            texts.len(),
            texts.len() - misses.len(),
            misses.len()
        );

        let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        if misses.len() >= parallel_threshold.max(1) && workers > 1 {
            let chunk_size = misses.len().div_ceil(workers);
            debug!("Dispatching {} chunks of up to {} texts", misses.len().div_ceil(chunk_size), chunk_size);

            let results: Vec<(Vec<(usize, NormalizedDocument)>, MemoCache)> = thread::scope(|scope| {
                let handles: Vec<_> = misses
                    .chunks(chunk_size)
                    .map(|indices| {
                        scope.spawn(move || {
                            let mut local = MemoCache::new();
                            let docs = indices
                                .iter()
                                .map(|&i| {
                                    let raw = texts[i].as_ref();
                                    let doc = self.normalize(raw);
                                    local.put(raw, doc.clone());
                                    (i, doc)
                                })
                                .collect();
                            (docs, local)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                    .collect()
            });

            for (docs, local) in results {
                cache.merge(local);
                for (i, doc) in docs {
                    output[i] = Some(doc);
                }
            }
        } else {
            for i in misses {
                let raw = texts[i].as_ref();
                let doc = self.normalize(raw);
                cache.put(raw, doc.clone());
                output[i] = Some(doc);
            }
        }

        output.into_iter().map(Option::unwrap_or_default).collect()
    }

    fn replace_urls(text: &str) -> (String, usize) {
        let count = count_urls(text);
        if count == 0 {
            return (text.to_string(), 0);
        }
        let replaced = URL_PATTERN.replace_all(text, format!(" {} ", URL_SENTINEL).as_str());
        (replaced.into_owned(), count)
    }

    fn strip_symbols(text: &str) -> String {
        text.split(URL_SENTINEL)
            .map(|segment| {
                segment
                    .chars()
                    .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(URL_SENTINEL)
    }

    fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn remove_stopwords(&self, text: &str) -> String {
        if !self.remove_stopwords {
            return text.to_string();
        }
        text.split_whitespace()
            .filter(|word| !self.stopwords.contains(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_protected_words;

    fn english() -> Normalizer {
        Normalizer::new(Language::English, &default_protected_words())
    }

    #[test]
    fn test_fingerprint_tracks_settings() {
        let words = default_protected_words();
        let base = english().fingerprint();
        assert_eq!(base.len(), 64);

        let mut reversed = words.clone();
        reversed.reverse();
        assert_eq!(Normalizer::new(Language::English, &reversed).fingerprint(), base);

        assert_ne!(Normalizer::new(Language::Portuguese, &words).fingerprint(), base);
        assert_ne!(Normalizer::with_options(Language::English, &words, false).fingerprint(), base);
        assert_ne!(Normalizer::new(Language::English, &[]).fingerprint(), base);
    }

    #[test]
    fn test_pipeline_order() {
        let normalizer = english();
        let doc = normalizer.normalize(
            "URGENT! Your account will be SUSPENDED immediately!\nClick here: http://fakephishing.com/verify?id=12345",
        );
        assert_eq!(
            doc.as_str(),
            "urgent account suspended immediately click url_token"
        );
    }

    #[test]
    fn test_protected_words_survive() {
        let normalizer = english();
        // "now" is an English stopword but also an urgency marker
        assert_eq!(normalizer.normalize("Do it NOW").as_str(), "now");

        let unprotected = Normalizer::new(Language::English, &[]);
        assert_eq!(unprotected.normalize("Do it NOW").as_str(), "");
    }

    #[test]
    fn test_sentinel_survives_symbol_stripping() {
        let normalizer = english();
        let doc = normalizer.normalize("see www.example.com/path, and https://a.b/c?d=e!");
        assert_eq!(doc.as_str(), "see url_token url_token");
    }

    #[test]
    fn test_empty_input_degrades() {
        let normalizer = english();
        assert!(normalizer.normalize("").is_empty());
        assert!(normalizer.normalize("   \n\t ").is_empty());
    }

    #[test]
    fn test_determinism() {
        let normalizer = english();
        let text = "Hi John,\tthe   meeting is scheduled for Tuesday at 10am.";
        let first = normalizer.normalize(text);
        for _ in 0..5 {
            assert_eq!(normalizer.normalize(text), first);
        }
        assert_eq!(first.as_str(), "hi john meeting scheduled tuesday 10am");
    }

    #[test]
    fn test_stopword_removal_disabled() {
        let normalizer = Normalizer::with_options(Language::English, &[], false);
        assert_eq!(normalizer.normalize("This is it.").as_str(), "this is it");
    }

    #[test]
    fn test_portuguese_keeps_accents() {
        let normalizer = Normalizer::new(Language::Portuguese, &[]);
        assert_eq!(
            normalizer.normalize("Sua conta não foi verificada!").as_str(),
            "conta verificada"
        );
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::English);
        assert_eq!("portuguese".parse::<Language>().unwrap(), Language::Portuguese);
        assert!(matches!(
            "klingon".parse::<Language>(),
            Err(DetectorError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_batch_matches_single_and_fills_cache() {
        let normalizer = english();
        let texts: Vec<String> = (0..40)
            .map(|i| format!("Message {} - verify your account at http://x{}.com", i, i))
            .collect();

        let mut sequential_cache = MemoCache::new();
        let sequential = normalizer.normalize_batch(&texts, &mut sequential_cache, usize::MAX);
        let mut parallel_cache = MemoCache::new();
        let parallel = normalizer.normalize_batch(&texts, &mut parallel_cache, 1);

        assert_eq!(sequential, parallel);
        assert_eq!(parallel_cache.stats().entry_count, texts.len());
        for (text, doc) in texts.iter().zip(&parallel) {
            assert_eq!(&normalizer.normalize(text), doc);
            assert_eq!(parallel_cache.get(text).as_ref(), Some(doc));
        }
    }

    #[test]
    fn test_count_urls() {
        assert_eq!(count_urls("Visit http://example.com and https://test.org now"), 2);
        assert_eq!(count_urls("no links here"), 0);
    }
}
