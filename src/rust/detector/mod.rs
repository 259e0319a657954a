//! End-to-end detection: raw text in, verdict with probability and risk band out.

mod artifact;
mod builder;
mod handle;
mod model;
mod types;

pub use artifact::{FORMAT_VERSION, MAGIC};
pub use builder::DetectorBuilder;
pub use handle::DetectorHandle;
pub use model::{Detector, ModelMetadata};
pub use types::{
    AnalysisResult, FeatureExplanation, RiskBand, TermWeight, Verdict, HIGH_RISK_FLOOR, LOW_RISK_CEILING,
};
