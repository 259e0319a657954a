use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classifier::DECISION_THRESHOLD;
use crate::features::SignalFeatures;

pub const LOW_RISK_CEILING: f64 = 0.3;
pub const HIGH_RISK_FLOOR: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Legitimate,
    Phishing,
}

impl Verdict {
    pub fn from_label(label: u8) -> Self {
        if label == 0 {
            Self::Legitimate
        } else {
            Self::Phishing
        }
    }

    pub fn is_phishing(&self) -> bool {
        matches!(self, Self::Phishing)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legitimate => write!(f, "LEGITIMATE"),
            Self::Phishing => write!(f, "PHISHING"),
        }
    }
}

/// Ordered risk categories over the phishing probability. Each band
/// includes its lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_probability(probability: f64) -> Self {
        if probability < LOW_RISK_CEILING {
            Self::Low
        } else if probability < HIGH_RISK_FLOOR {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Outcome of classifying one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub label: Verdict,
    /// Probability of the phishing class
    pub probability: f64,
    pub risk: RiskBand,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub features: Option<SignalFeatures>,
}

impl AnalysisResult {
    pub fn from_probability(probability: f64, features: Option<SignalFeatures>) -> Self {
        Self {
            label: Verdict::from_label(u8::from(probability >= DECISION_THRESHOLD)),
            probability,
            risk: RiskBand::from_probability(probability),
            features,
        }
    }
}

/// One vocabulary term and its coefficient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

/// Terms pushing hardest toward each verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureExplanation {
    /// Largest positive coefficients first
    pub phishing: Vec<TermWeight>,
    /// Most negative coefficients first
    pub legitimate: Vec<TermWeight>,
}
