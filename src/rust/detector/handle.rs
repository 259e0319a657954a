use std::path::Path;
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use super::model::Detector;
use super::types::AnalysisResult;
use crate::error::{DetectorError, Result};

/// Shared slot for the detector currently serving requests.
///
/// Readers take a cheap `Arc` snapshot and classify without holding the
/// lock, so a retrained detector can be published while requests are in
/// flight; they finish on the model they started with.
#[derive(Debug, Default)]
pub struct DetectorHandle {
    current: RwLock<Option<Arc<Detector>>>,
}

impl DetectorHandle {
    /// Creates an empty handle; classification fails until a detector is published.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detector(detector: Detector) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(detector))),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.current.read().is_some()
    }

    /// Swaps in a new detector, returning the one it replaces.
    pub fn publish(&self, detector: Detector) -> Option<Arc<Detector>> {
        let previous = self.current.write().replace(Arc::new(detector));
        info!("Published new detector (replaced existing: {})", previous.is_some());
        previous
    }

    /// Loads an artifact and publishes it.
    pub fn publish_from<P: AsRef<Path>>(&self, path: P) -> Result<Option<Arc<Detector>>> {
        let detector = Detector::load(path)?;
        Ok(self.publish(detector))
    }

    pub fn current(&self) -> Result<Arc<Detector>> {
        self.current
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| DetectorError::NotTrained("No detector has been published".into()))
    }

    pub fn classify(&self, text: &str) -> Result<AnalysisResult> {
        self.current()?.classify(text)
    }
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<DetectorHandle>();
    }
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_handle_is_not_trained() {
        let handle = DetectorHandle::new();
        assert!(!handle.is_trained());
        assert!(matches!(handle.classify("anything"), Err(DetectorError::NotTrained(_))));
        assert!(matches!(handle.current(), Err(DetectorError::NotTrained(_))));
    }
}
