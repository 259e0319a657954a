//! Linear phishing classifier over standardized feature vectors.
//!
//! Training goes through [`ClassifierBuilder::fit`], which fits the
//! [`StandardScaler`] and the weights together and returns an immutable
//! [`LinearClassifier`]. There is no way to ask an unfitted classifier for a
//! prediction.

mod builder;
pub mod metrics;
mod model;
mod optimizer;
mod scaler;

pub use builder::{ClassifierBuilder, FitReport};
pub use metrics::{ConfusionMatrix, Metrics};
pub use model::{LinearClassifier, DECISION_THRESHOLD};
pub use scaler::StandardScaler;
