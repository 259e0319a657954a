use serde::{Deserialize, Serialize};

use super::{FINANCIAL_KEYWORDS, URGENCY_KEYWORDS};
use crate::normalizer::{count_urls, NormalizedDocument};

pub const SIGNAL_FEATURE_COUNT: usize = 6;

/// Column names of the signal block, in vector order
pub const SIGNAL_FEATURE_NAMES: [&str; SIGNAL_FEATURE_COUNT] = [
    "url_count",
    "uppercase_ratio",
    "special_char_count",
    "urgency_word_count",
    "financial_word_count",
    "word_count",
];

const SPECIAL_CHARS: &[char] = &['!', '?', '$', '%', '&', '*', '@', '#'];

/// Hand-crafted phishing heuristics for one document.
///
/// Case-sensitive signals read the original text; token signals read the
/// normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalFeatures {
    pub url_count: usize,
    pub uppercase_ratio: f64,
    pub special_char_count: usize,
    pub urgency_word_count: usize,
    pub financial_word_count: usize,
    pub word_count: usize,
}

impl SignalFeatures {
    pub fn extract(normalized: &NormalizedDocument, original: &str) -> Self {
        Self {
            url_count: count_urls(original),
            uppercase_ratio: uppercase_ratio(original),
            special_char_count: original.chars().filter(|c| SPECIAL_CHARS.contains(c)).count(),
            urgency_word_count: count_keywords(normalized, URGENCY_KEYWORDS),
            financial_word_count: count_keywords(normalized, FINANCIAL_KEYWORDS),
            word_count: normalized.tokens().count(),
        }
    }

    pub fn to_array(&self) -> [f64; SIGNAL_FEATURE_COUNT] {
        [
            self.url_count as f64,
            self.uppercase_ratio,
            self.special_char_count as f64,
            self.urgency_word_count as f64,
            self.financial_word_count as f64,
            self.word_count as f64,
        ]
    }
}

/// Uppercase letters over all letters, 0.0 for text without letters
fn uppercase_ratio(text: &str) -> f64 {
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(letters, upper), c| {
            (letters + 1, upper + usize::from(c.is_uppercase()))
        });
    if letters == 0 {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}

/// Every token equal to a keyword counts, repeats included.
fn count_keywords(normalized: &NormalizedDocument, keywords: &[&str]) -> usize {
    normalized
        .tokens()
        .filter(|token| keywords.iter().any(|k| k.eq_ignore_ascii_case(token)))
        .count()
}
