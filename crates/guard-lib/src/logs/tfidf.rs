//! TF-IDF vectorizer for log messages

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Common English words carrying no signal for log grouping
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "also", "am", "an",
    "and", "any", "are", "around", "as", "at", "be", "became", "because", "been", "before",
    "being", "below", "between", "both", "but", "by", "can", "cannot", "could", "did", "do",
    "does", "doing", "down", "during", "each", "either", "else", "enough", "etc", "even", "ever",
    "every", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here",
    "hers", "him", "his", "how", "however", "i", "ie", "if", "in", "into", "is", "it", "its",
    "itself", "just", "least", "less", "may", "me", "might", "more", "most", "much", "must", "my",
    "neither", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "out", "over", "own", "per", "please", "rather", "same", "she", "should",
    "since", "so", "some", "still", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "though", "through", "thus", "to", "too", "under",
    "until", "up", "upon", "very", "via", "was", "we", "well", "were", "what", "when", "where",
    "whether", "which", "while", "who", "whom", "whose", "why", "will", "with", "within",
    "without", "would", "yet", "you", "your", "yours",
];

/// Lower-cased word tokens of at least two characters, stop words removed
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Term-frequency / inverse-document-frequency vectorizer with smoothed idf
/// and L2-normalised rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Result<Self> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();

        let terms: BTreeSet<&String> = tokenized.iter().flatten().collect();
        if terms.is_empty() {
            return Err(GuardError::EmptyDataset(
                "no terms left after tokenization; documents may only contain stop words"
                    .to_string(),
            ));
        }
        let vocabulary: BTreeMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        let mut document_frequency = vec![0usize; vocabulary.len()];
        for tokens in &tokenized {
            let unique: BTreeSet<&String> = tokens.iter().collect();
            for term in unique {
                if let Some(&i) = vocabulary.get(term) {
                    document_frequency[i] += 1;
                }
            }
        }

        let n = documents.len() as f64;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        Ok(Self { vocabulary, idf })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.keys().map(String::as_str)
    }

    /// One row per document; unknown terms are ignored
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Array2<f64> {
        let mut matrix = Array2::zeros((documents.len(), self.vocabulary.len()));
        for (row, document) in documents.iter().enumerate() {
            for token in tokenize(document.as_ref()) {
                if let Some(&col) = self.vocabulary.get(&token) {
                    matrix[[row, col]] += 1.0;
                }
            }
            let mut norm = 0.0_f64;
            for col in 0..self.idf.len() {
                matrix[[row, col]] *= self.idf[col];
                norm += matrix[[row, col]] * matrix[[row, col]];
            }
            if norm > 0.0 {
                let norm = norm.sqrt();
                matrix.row_mut(row).mapv_inplace(|v| v / norm);
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        let tokens = tokenize("ERROR - Unexpected error occurred in module X");
        assert_eq!(tokens, vec!["error", "unexpected", "error", "occurred", "module"]);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let docs = ["disk usage nearing capacity", "high memory usage detected"];
        let vectorizer = TfidfVectorizer::fit(&docs).unwrap();
        let matrix = vectorizer.transform(&docs);

        for row in matrix.rows() {
            let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_shared_terms_get_lower_idf() {
        let docs = ["usage disk", "usage memory"];
        let vectorizer = TfidfVectorizer::fit(&docs).unwrap();
        let usage = vectorizer.vocabulary["usage"];
        let disk = vectorizer.vocabulary["disk"];
        assert!(vectorizer.idf[usage] < vectorizer.idf[disk]);
        assert!((vectorizer.idf[usage] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_terms_give_zero_row() {
        let vectorizer = TfidfVectorizer::fit(&["database connection"]).unwrap();
        let matrix = vectorizer.transform(&["completely novel"]);
        assert!(matrix.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_only_stop_words_rejected() {
        assert!(TfidfVectorizer::fit(&["the and of", "a"]).is_err());
    }
}
