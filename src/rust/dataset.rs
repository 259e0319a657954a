//! Training data boundary: CSV loading and mapping of raw labels to {0, 1}.
//!
//! The detector itself only accepts binary labels; everything heuristic
//! about label names lives here behind [`LabelMapper`].

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use csv::ReaderBuilder;
use log::{info, warn};

use crate::error::{DetectorError, Result};

pub const DEFAULT_TEXT_COLUMN: &str = "text";
pub const DEFAULT_LABEL_COLUMN: &str = "label";

/// Turns a raw label into 1 (phishing) or 0 (legitimate).
pub trait LabelMapper {
    /// `distinct` holds every distinct label of the dataset, sorted. `None`
    /// drops the rows carrying this label.
    fn map_label(&self, label: &str, distinct: &[String]) -> Option<u8>;
}

/// Substring keyword matching, positive keywords checked first.
///
/// Labels matching neither list fall back to ordering: the greatest distinct
/// label (numerically when every label is a number) maps to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordLabelMapper {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl Default for KeywordLabelMapper {
    fn default() -> Self {
        Self {
            positive: ["phish", "spam", "malicious", "unsafe", "scam"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            negative: ["safe", "ham", "legitimate", "normal", "legit"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl KeywordLabelMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positive_keywords(mut self, keywords: Vec<impl Into<String>>) -> Self {
        self.positive = keywords.into_iter().map(|k| k.into().to_lowercase()).collect();
        self
    }

    pub fn with_negative_keywords(mut self, keywords: Vec<impl Into<String>>) -> Self {
        self.negative = keywords.into_iter().map(|k| k.into().to_lowercase()).collect();
        self
    }
}

fn compare_labels(a: &str, b: &str, numeric: bool) -> Ordering {
    if numeric {
        if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    a.cmp(b)
}

impl LabelMapper for KeywordLabelMapper {
    fn map_label(&self, label: &str, distinct: &[String]) -> Option<u8> {
        let lower = label.to_lowercase();
        if self.positive.iter().any(|k| lower.contains(k.as_str())) {
            return Some(1);
        }
        if self.negative.iter().any(|k| lower.contains(k.as_str())) {
            return Some(0);
        }
        let numeric = distinct.iter().all(|l| l.parse::<f64>().is_ok());
        let greatest = distinct.iter().max_by(|a, b| compare_labels(a, b, numeric))?;
        Some(u8::from(greatest == label))
    }
}

/// Labelled training texts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub texts: Vec<String>,
    pub labels: Vec<u8>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// `(legitimate, phishing)` counts
    pub fn class_counts(&self) -> (usize, usize) {
        let phishing = self.labels.iter().filter(|&&l| l == 1).count();
        (self.labels.len() - phishing, phishing)
    }
}

/// Reads a headed CSV file and maps its labels through `mapper`.
///
/// Rows where either column is empty are dropped, as are rows whose label the
/// mapper rejects.
pub fn load_dataset<P: AsRef<Path>>(
    path: P,
    text_column: &str,
    label_column: &str,
    mapper: &dyn LabelMapper,
) -> Result<Dataset> {
    let path = path.as_ref();
    info!("Loading dataset from {:?}", path);
    let mut reader = ReaderBuilder::new().has_headers(true).flexible(true).from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let column = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            DetectorError::Dataset(format!(
                "Column '{}' not found. Available columns: {:?}",
                name, headers
            ))
        })
    };
    let text_idx = column(text_column)?;
    let label_idx = column(label_column)?;

    let mut rows: Vec<(String, String)> = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record?;
        let text = record.get(text_idx).unwrap_or_default();
        let label = record.get(label_idx).unwrap_or_default().trim();
        if text.trim().is_empty() || label.is_empty() {
            dropped += 1;
            continue;
        }
        rows.push((text.to_string(), label.to_string()));
    }
    info!("Read {} rows ({} dropped for missing values)", rows.len() + dropped, dropped);

    let distinct: Vec<String> = rows
        .iter()
        .map(|(_, label)| label.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mapping: HashMap<&str, Option<u8>> = distinct
        .iter()
        .map(|label| (label.as_str(), mapper.map_label(label, &distinct)))
        .collect();
    info!("Label mapping: {:?}", mapping);

    let mut dataset = Dataset::default();
    let mut unmapped = 0usize;
    for (text, label) in rows {
        match mapping.get(label.as_str()).copied().flatten() {
            Some(value) => {
                dataset.texts.push(text);
                dataset.labels.push(value);
            }
            None => unmapped += 1,
        }
    }
    if unmapped > 0 {
        warn!("Dropped {} rows with unmapped labels", unmapped);
    }
    if dataset.is_empty() {
        return Err(DetectorError::Dataset(format!("No usable rows in {:?}", path)));
    }

    let (legitimate, phishing) = dataset.class_counts();
    info!("Class distribution: legitimate (0) {} | phishing (1) {}", legitimate, phishing);
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn distinct(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keyword_mapping() {
        let mapper = KeywordLabelMapper::new();
        let labels = distinct(&["Phishing Email", "Safe Email"]);
        assert_eq!(mapper.map_label("Phishing Email", &labels), Some(1));
        assert_eq!(mapper.map_label("Safe Email", &labels), Some(0));
        // positive keywords win over the "safe" inside "unsafe"
        assert_eq!(mapper.map_label("UNSAFE", &labels), Some(1));
        assert_eq!(mapper.map_label("ham", &labels), Some(0));
    }

    #[test]
    fn test_ordering_fallback() {
        let mapper = KeywordLabelMapper::new();
        let binary = distinct(&["0", "1"]);
        assert_eq!(mapper.map_label("1", &binary), Some(1));
        assert_eq!(mapper.map_label("0", &binary), Some(0));

        let numeric = distinct(&["10", "9"]);
        assert_eq!(mapper.map_label("10", &numeric), Some(1));
        assert_eq!(mapper.map_label("9", &numeric), Some(0));

        let words = distinct(&["alpha", "beta"]);
        assert_eq!(mapper.map_label("beta", &words), Some(1));
    }

    #[test]
    fn test_load_dataset() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("emails.csv");
        fs::write(
            &path,
            "id,text,label\n\
             1,\"URGENT, verify your account\",Phishing Email\n\
             2,Meeting at 10am,Safe Email\n\
             3,,Safe Email\n\
             4,Lunch tomorrow?,\n\
             5,Claim your prize now,Phishing Email\n",
        )?;

        let dataset = load_dataset(&path, "text", "label", &KeywordLabelMapper::new())?;
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.texts[0], "URGENT, verify your account");
        assert_eq!(dataset.labels, vec![1, 0, 1]);
        assert_eq!(dataset.class_counts(), (1, 2));
        Ok(())
    }

    #[test]
    fn test_missing_column_names_available_ones() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("emails.csv");
        fs::write(&path, "body,category\nhello,ham\n")?;
        match load_dataset(&path, "text", "label", &KeywordLabelMapper::new()) {
            Err(DetectorError::Dataset(msg)) => assert!(msg.contains("body")),
            other => panic!("unexpected result: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = load_dataset("/nonexistent/emails.csv", "text", "label", &KeywordLabelMapper::new());
        assert!(matches!(result, Err(DetectorError::Dataset(_))));
    }
}
