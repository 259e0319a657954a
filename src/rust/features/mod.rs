//! Hybrid feature extraction: learned TF-IDF weights followed by six
//! hand-crafted phishing signals.

use ndarray::Array1;

mod extractor;
mod signals;
mod vocabulary;

pub use extractor::FeatureExtractor;
pub use signals::{SignalFeatures, SIGNAL_FEATURE_COUNT, SIGNAL_FEATURE_NAMES};
pub use vocabulary::{Vocabulary, VocabularyBuilder, VocabularyParts};

/// `[lexical weights (vocabulary-sized)] ++ [signal features]`
pub type FeatureVector = Array1<f64>;

/// Words that pressure the reader to act
pub const URGENCY_KEYWORDS: &[&str] = &[
    "urgent", "urgently", "urgency", "immediately", "immediate", "now", "expire",
    "expires", "expired", "expiring", "suspended", "suspend", "verify",
    "verification", "confirm", "click", "act", "limited", "hurry", "quick",
    "quickly",
];

/// Words that ask for money or account details
pub const FINANCIAL_KEYWORDS: &[&str] = &[
    "money", "bank", "banking", "account", "credit", "card", "payment", "invoice",
    "transfer", "wire", "dollar", "dollars", "prize", "winner", "refund",
];
