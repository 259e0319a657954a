//! Single-file persistence of a trained pipeline.
//!
//! Layout: the 4-byte magic `PHGD`, the format version as a little-endian
//! `u32`, then a bincode payload holding metadata, normalizer settings,
//! vocabulary, scaler statistics, weights and bias. Everything is written
//! and read as one unit.

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::info;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::model::{Detector, ModelMetadata};
use crate::cache::{write_atomically, MemoCache};
use crate::classifier::{LinearClassifier, StandardScaler};
use crate::error::{DetectorError, Result};
use crate::features::{FeatureExtractor, Vocabulary, VocabularyParts};
use crate::normalizer::{Language, Normalizer};

pub const MAGIC: &[u8; 4] = b"PHGD";
pub const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
struct NormalizerSettings {
    language: Language,
    remove_stopwords: bool,
    protected_words: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactPayload {
    metadata: ModelMetadata,
    normalizer: NormalizerSettings,
    vocabulary: VocabularyParts,
    scaler_mean: Vec<f64>,
    scaler_scale: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

fn encode(detector: &Detector, metadata: ModelMetadata) -> Result<Vec<u8>> {
    let normalizer = detector.normalizer();
    let classifier = detector.classifier();
    let payload = ArtifactPayload {
        metadata,
        normalizer: NormalizerSettings {
            language: normalizer.language(),
            remove_stopwords: normalizer.removes_stopwords(),
            protected_words: normalizer.protected_words(),
        },
        vocabulary: detector.extractor().vocabulary().parts().clone(),
        scaler_mean: classifier.scaler().mean().to_vec(),
        scaler_scale: classifier.scaler().scale().to_vec(),
        weights: classifier.weights().to_vec(),
        bias: classifier.bias(),
    };

    let body = bincode::serialize(&payload)
        .map_err(|e| DetectorError::Persistence(format!("Failed to encode artifact: {}", e)))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<Detector> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err(DetectorError::Persistence("Not a detector artifact (bad magic)".into()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let found = u32::from_le_bytes(version);
    if found != FORMAT_VERSION {
        return Err(DetectorError::IncompatibleArtifact { found, expected: FORMAT_VERSION });
    }

    let payload: ArtifactPayload = bincode::deserialize(&bytes[HEADER_LEN..])
        .map_err(|e| DetectorError::Persistence(format!("Corrupt artifact payload: {}", e)))?;

    let vocabulary = Vocabulary::from_parts(payload.vocabulary)?;
    let extractor = FeatureExtractor::new(vocabulary);
    if payload.weights.len() != extractor.dimension() {
        return Err(DetectorError::VocabularyMismatch {
            vocabulary: extractor.lexical_len(),
            weights: payload.weights.len(),
        });
    }
    let metadata = &payload.metadata;
    if metadata.vocabulary_size != extractor.lexical_len() || metadata.feature_count != extractor.dimension() {
        return Err(DetectorError::VocabularyMismatch {
            vocabulary: metadata.vocabulary_size,
            weights: payload.weights.len(),
        });
    }
    let scaler = StandardScaler::from_parts(
        Array1::from(payload.scaler_mean),
        Array1::from(payload.scaler_scale),
    )?;
    let classifier = LinearClassifier::from_parts(scaler, Array1::from(payload.weights), payload.bias)?;
    let settings = payload.normalizer;
    let normalizer = Normalizer::with_options(settings.language, &settings.protected_words, settings.remove_stopwords);

    Detector::from_components(normalizer, extractor, classifier, payload.metadata, MemoCache::new())
}

impl Detector {
    /// Writes the whole pipeline to `path` as one artifact.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so a crash never leaves a half-written artifact behind.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut metadata = self.metadata().clone();
        metadata.saved_at = Some(Utc::now());
        let bytes = encode(self, metadata)?;
        write_atomically(path, &bytes)?;
        info!("Detector saved to {:?} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Restores a pipeline written by [`Detector::save`].
    ///
    /// The loaded detector starts with an empty in-memory cache and its
    /// metadata carries the save time.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            DetectorError::Persistence(format!("Failed to read artifact {:?}: {}", path, e))
        })?;
        let detector = decode(&bytes)?;
        info!(
            "Detector loaded from {:?}: {} ({} features)",
            path,
            detector.language(),
            detector.feature_count()
        );
        Ok(detector)
    }
}
