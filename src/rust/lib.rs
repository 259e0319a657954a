//! A deterministic phishing email classifier.
//!
//! Raw text is normalized (with a content-addressed cache in front), turned
//! into TF-IDF weights plus six phishing signals, standardized, and scored by
//! an L2-regularized logistic regression. The result carries a verdict, the
//! phishing probability and a risk band.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use phishguard::{Detector, DetectorConfig, RiskBand};
//!
//! let texts = vec![
//!     "URGENT! Your account will be suspended. Click here NOW!",
//!     "Verify your bank account immediately or lose access!",
//!     "Your payment was declined, confirm your card details now!",
//!     "Hi John, the meeting is scheduled for Tuesday at 10am.",
//!     "Thanks for the report, I will review it tomorrow.",
//!     "Can we move our Tuesday meeting to Wednesday?",
//! ];
//! let labels = vec![1, 1, 1, 0, 0, 0];
//!
//! let config = DetectorConfig::default()
//!     .with_holdout_fraction(0.0)
//!     .with_cv_folds(None);
//! let detector = Detector::builder().with_config(config).train(&texts, &labels)?;
//!
//! let result = detector.classify("Click here to verify your payment information urgently!")?;
//! println!("{} ({:.1}%, risk {})", result.label, result.probability * 100.0, result.risk);
//! assert!(result.risk >= RiskBand::Low);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! A trained [`Detector`] is immutable apart from its mutex-guarded cache and
//! can be shared with `Arc`. [`DetectorHandle`] adds atomic replacement of
//! the serving detector after a retrain:
//!
//! ```rust
//! use phishguard::{DetectorError, DetectorHandle};
//!
//! let handle = DetectorHandle::new();
//! assert!(matches!(handle.classify("hello"), Err(DetectorError::NotTrained(_))));
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod error;
pub mod features;
pub mod normalizer;

pub use cache::{CachePolicy, CacheStats, ContentHash, MemoCache};
pub use classifier::{ClassifierBuilder, ConfusionMatrix, FitReport, LinearClassifier, Metrics, StandardScaler};
pub use config::DetectorConfig;
pub use dataset::{load_dataset, Dataset, KeywordLabelMapper, LabelMapper};
pub use detector::{
    AnalysisResult, Detector, DetectorBuilder, DetectorHandle, FeatureExplanation, ModelMetadata, RiskBand,
    TermWeight, Verdict,
};
pub use error::{DetectorError, Result};
pub use features::{FeatureExtractor, FeatureVector, SignalFeatures, Vocabulary, VocabularyBuilder};
pub use normalizer::{Language, NormalizedDocument, Normalizer};

pub fn init_logger() {
    env_logger::init();
}
