use std::fs;

use phishguard::detector::{FORMAT_VERSION, MAGIC};
use phishguard::{Detector, DetectorConfig, DetectorError, DetectorHandle};
use tempfile::tempdir;

fn small_detector() -> Detector {
    let texts = [
        "URGENT! Verify your account now!",
        "Click here to confirm your bank payment immediately!",
        "Your account is suspended, verify now!",
        "Meeting notes from Tuesday are attached.",
        "See you at the team meeting on Tuesday.",
        "Notes from the team lunch are attached.",
    ];
    let labels = [1, 1, 1, 0, 0, 0];
    Detector::builder()
        .with_config(DetectorConfig::default().with_holdout_fraction(0.0).with_cv_folds(None))
        .train(&texts, &labels)
        .unwrap()
}

#[test]
fn test_empty_handle_is_not_trained() {
    let handle = DetectorHandle::new();
    assert!(matches!(handle.current(), Err(DetectorError::NotTrained(_))));
    assert!(matches!(handle.classify("verify now"), Err(DetectorError::NotTrained(_))));
}

#[test]
fn test_mismatched_lengths() {
    let result = Detector::builder().train(&["one", "two"], &[1]);
    assert!(matches!(result, Err(DetectorError::InvalidInput(_))));
}

#[test]
fn test_empty_corpus() {
    let texts: [&str; 0] = [];
    let result = Detector::builder().train(&texts, &[]);
    assert!(matches!(result, Err(DetectorError::InvalidInput(_))));
}

#[test]
fn test_single_class() {
    let result = Detector::builder().train(&["a b", "c d", "e f"], &[1, 1, 1]);
    assert!(matches!(result, Err(DetectorError::InvalidInput(_))));
}

#[test]
fn test_non_binary_labels() {
    let result = Detector::builder().train(&["a b", "c d", "e f"], &[0, 1, 2]);
    assert!(matches!(result, Err(DetectorError::InvalidInput(_))));
}

#[test]
fn test_invalid_holdout_fraction() {
    let result = Detector::builder()
        .with_config(DetectorConfig::default().with_holdout_fraction(1.0))
        .train(&["a b", "c d"], &[0, 1]);
    assert!(matches!(result, Err(DetectorError::InvalidInput(_))));
}

#[test]
fn test_missing_artifact() {
    let dir = tempdir().unwrap();
    let result = Detector::load(dir.path().join("missing.bin"));
    assert!(matches!(result, Err(DetectorError::Persistence(_))));
}

#[test]
fn test_corrupt_artifact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("detector.bin");

    fs::write(&path, b"not an artifact at all").unwrap();
    assert!(matches!(Detector::load(&path), Err(DetectorError::Persistence(_))));

    let mut truncated = MAGIC.to_vec();
    truncated.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    truncated.extend_from_slice(&[7, 7, 7]);
    fs::write(&path, &truncated).unwrap();
    assert!(matches!(Detector::load(&path), Err(DetectorError::Persistence(_))));
}

#[test]
fn test_incompatible_artifact_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("detector.bin");
    small_detector().save(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    match Detector::load(&path) {
        Err(DetectorError::IncompatibleArtifact { found, expected }) => {
            assert_eq!(found, FORMAT_VERSION + 1);
            assert_eq!(expected, FORMAT_VERSION);
        }
        other => panic!("unexpected result: {:?}", other.map(|d| d.feature_count())),
    }
}

#[test]
fn test_failed_publish_keeps_current_detector() {
    let dir = tempdir().unwrap();
    let handle = DetectorHandle::with_detector(small_detector());
    let before = handle.classify("verify your account").unwrap();

    let result = handle.publish_from(dir.path().join("missing.bin"));
    assert!(matches!(result, Err(DetectorError::Persistence(_))));
    assert_eq!(handle.classify("verify your account").unwrap(), before);
}

#[test]
fn test_error_messages() {
    let err = DetectorError::VocabularyMismatch { vocabulary: 10, weights: 12 };
    assert!(err.to_string().contains("10"));
    assert!(err.to_string().contains("12"));

    let err = DetectorError::IncompatibleArtifact { found: 2, expected: 1 };
    assert_eq!(err.to_string(), "Incompatible artifact: format version 2, expected 1");
}
