use ndarray::{s, Array1, Array2};

use super::signals::{SignalFeatures, SIGNAL_FEATURE_COUNT, SIGNAL_FEATURE_NAMES};
use super::vocabulary::Vocabulary;
use super::FeatureVector;
use crate::normalizer::NormalizedDocument;

/// Turns a document into a fixed-length [`FeatureVector`].
///
/// Can only be constructed from a fitted [`Vocabulary`], so every vector it
/// produces has length `vocabulary.len() + SIGNAL_FEATURE_COUNT`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureExtractor {
    vocabulary: Vocabulary,
}

impl FeatureExtractor {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Number of lexical (vocabulary) columns
    pub fn lexical_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Total vector length
    pub fn dimension(&self) -> usize {
        self.vocabulary.len() + SIGNAL_FEATURE_COUNT
    }

    /// Name of a column: the vocabulary term for lexical columns, the signal
    /// name for the trailing block.
    pub fn feature_name(&self, index: usize) -> Option<&str> {
        let lexical = self.lexical_len();
        if index < lexical {
            self.vocabulary.term(index)
        } else {
            SIGNAL_FEATURE_NAMES.get(index - lexical).copied()
        }
    }

    pub fn extract(&self, normalized: &NormalizedDocument, original: &str) -> FeatureVector {
        self.extract_with_signals(normalized, original).0
    }

    /// Like [`FeatureExtractor::extract`], also handing back the raw signals.
    pub fn extract_with_signals(
        &self,
        normalized: &NormalizedDocument,
        original: &str,
    ) -> (FeatureVector, SignalFeatures) {
        let signals = SignalFeatures::extract(normalized, original);
        let lexical = self.vocabulary.transform(normalized);

        let mut vector = Array1::<f64>::zeros(self.dimension());
        vector.slice_mut(s![..self.lexical_len()]).assign(&lexical);
        vector
            .slice_mut(s![self.lexical_len()..])
            .assign(&Array1::from(signals.to_array().to_vec()));
        (vector, signals)
    }

    /// Stacks the vectors of a batch into a design matrix, one row per document.
    pub fn extract_batch<S: AsRef<str>>(
        &self,
        normalized: &[NormalizedDocument],
        originals: &[S],
    ) -> Array2<f64> {
        debug_assert_eq!(normalized.len(), originals.len());
        let mut matrix = Array2::<f64>::zeros((normalized.len(), self.dimension()));
        for (mut row, (doc, original)) in matrix
            .rows_mut()
            .into_iter()
            .zip(normalized.iter().zip(originals.iter()))
        {
            row.assign(&self.extract(doc, original.as_ref()));
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_protected_words;
    use crate::features::VocabularyBuilder;
    use crate::normalizer::{Language, Normalizer};

    fn fitted() -> (Normalizer, FeatureExtractor) {
        let normalizer = Normalizer::new(Language::English, &default_protected_words());
        let corpus: Vec<NormalizedDocument> = [
            "Verify your account now at http://bank.example",
            "Verify your payment details now",
            "Lunch on Friday with the team",
            "Team lunch moved to Friday",
            "Quarterly report attached",
        ]
        .iter()
        .map(|t| normalizer.normalize(t))
        .collect();
        let vocabulary = VocabularyBuilder::new().fit(&corpus).unwrap();
        (normalizer, FeatureExtractor::new(vocabulary))
    }

    #[test]
    fn test_vector_length_is_vocabulary_plus_signals() {
        let (normalizer, extractor) = fitted();
        let v = extractor.lexical_len();
        assert!(v > 0);
        for text in ["", "completely unseen words", "VERIFY NOW!!! http://x.y", "lunch friday team"] {
            let vector = extractor.extract(&normalizer.normalize(text), text);
            assert_eq!(vector.len(), v + SIGNAL_FEATURE_COUNT);
        }
    }

    #[test]
    fn test_signal_block_is_last() {
        let (normalizer, extractor) = fitted();
        let text = "Visit http://example.com and https://test.org now";
        let (vector, signals) = extractor.extract_with_signals(&normalizer.normalize(text), text);
        let lexical = extractor.lexical_len();
        assert_eq!(signals.url_count, 2);
        assert_eq!(vector[lexical], 2.0);
        assert_eq!(vector[lexical + 5], signals.word_count as f64);
        assert_eq!(extractor.feature_name(lexical), Some("url_count"));
        assert_eq!(extractor.feature_name(extractor.dimension()), None);
    }

    #[test]
    fn test_batch_rows_match_single_extraction() {
        let (normalizer, extractor) = fitted();
        let texts = ["Verify now", "Friday lunch"];
        let docs: Vec<_> = texts.iter().map(|t| normalizer.normalize(t)).collect();
        let matrix = extractor.extract_batch(&docs, &texts);
        assert_eq!(matrix.dim(), (2, extractor.dimension()));
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(matrix.row(i), extractor.extract(&docs[i], text));
        }
    }
}
