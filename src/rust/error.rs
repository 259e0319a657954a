use std::io;

/// Represents the different types of errors that can occur in the detection pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// The caller supplied data the pipeline cannot work with
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A fitted component was required but none is available
    #[error("Not trained: {0}")]
    NotTrained(String),
    /// The vocabulary and the weight vector of a model disagree in length
    #[error("Vocabulary mismatch: {vocabulary} vocabulary terms + signal features do not match {weights} weights")]
    VocabularyMismatch {
        vocabulary: usize,
        weights: usize,
    },
    /// An artifact or snapshot is missing, unreadable or corrupt
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// An artifact was written by an incompatible pipeline version
    #[error("Incompatible artifact: format version {found}, expected {expected}")]
    IncompatibleArtifact {
        found: u32,
        expected: u32,
    },
    /// Training data could not be loaded or mapped
    #[error("Dataset error: {0}")]
    Dataset(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<csv::Error> for DetectorError {
    fn from(err: csv::Error) -> Self {
        DetectorError::Dataset(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
