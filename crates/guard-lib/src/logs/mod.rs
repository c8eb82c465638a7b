//! Log message clustering
//!
//! Application logs arrive as `"<timestamp> - <LEVEL> - <message>"` lines.
//! The timestamp is stripped, the remainder is vectorized with TF-IDF and
//! grouped with k-means so operators can read similar messages together.

mod kmeans;
mod tfidf;

pub use kmeans::{KMeans, KMeansParams};
pub use tfidf::{tokenize, TfidfVectorizer};

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GuardError, Result};

/// Default number of clusters for the offline pipeline
pub const DEFAULT_CLUSTERS: usize = 3;

/// True when `text` begins with a `YYYY-MM-DD` date
fn starts_with_date(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

/// Remove a leading `YYYY-MM-DD ... - ` timestamp prefix
///
/// Everything up to and including the first `" - "` after the date is
/// dropped, so `"2024-05-01 10:00:00 - ERROR - Disk full"` becomes
/// `"ERROR - Disk full"`. Repeated date prefixes are all removed, so the
/// result never needs a second pass. Lines without a leading date come back
/// trimmed.
pub fn strip_timestamp(line: &str) -> String {
    let mut rest = line.trim();
    while starts_with_date(rest) {
        match rest.find(" - ") {
            Some(pos) => rest = rest[pos + 3..].trim(),
            None => break,
        }
    }
    rest.to_string()
}

/// Read a log file, skipping blank lines and stripping timestamps
pub fn preprocess_logs(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<String> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(strip_timestamp)
        .collect();
    info!(path = %path.display(), lines = lines.len(), "Preprocessed log file");
    Ok(lines)
}

/// TF-IDF vocabulary and the centroids fitted on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogClusterer {
    pub vectorizer: TfidfVectorizer,
    pub kmeans: KMeans,
}

impl LogClusterer {
    /// Fit on `lines` and return the model with each line's cluster label
    pub fn fit<S: AsRef<str>>(lines: &[S], k: usize) -> Result<(Self, Vec<usize>)> {
        if lines.is_empty() {
            return Err(GuardError::EmptyDataset("no log lines to cluster".to_string()));
        }
        let vectorizer = TfidfVectorizer::fit(lines)?;
        let matrix = vectorizer.transform(lines);
        let kmeans = KMeans::fit(matrix.view(), k, &KMeansParams::default())?;
        let labels = kmeans.predict(matrix.view())?;
        info!(
            lines = lines.len(),
            clusters = k,
            vocabulary = vectorizer.vocabulary_size(),
            inertia = kmeans.inertia(),
            "Clustered log messages"
        );
        Ok((Self { vectorizer, kmeans }, labels))
    }

    pub fn predict<S: AsRef<str>>(&self, lines: &[S]) -> Result<Vec<usize>> {
        let matrix = self.vectorizer.transform(lines);
        self.kmeans.predict(matrix.view())
    }

    pub fn n_clusters(&self) -> usize {
        self.kmeans.n_clusters()
    }
}

/// Group lines by cluster label as plain text
pub fn render_cluster_report<S: AsRef<str>>(labels: &[usize], lines: &[S]) -> String {
    let mut report = String::new();
    let Some(max) = labels.iter().max() else {
        return report;
    };
    for cluster in 0..=*max {
        let _ = writeln!(report, "Cluster {cluster} Logs:");
        for (label, line) in labels.iter().zip(lines) {
            if *label == cluster {
                let _ = writeln!(report, "- {}", line.as_ref());
            }
        }
        report.push('\n');
    }
    report
}

/// Write the cluster report, creating the parent directory when needed
pub fn save_cluster_report<S: AsRef<str>>(
    path: impl AsRef<Path>,
    labels: &[usize],
    lines: &[S],
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_cluster_report(labels, lines))?;
    info!(path = %path.display(), "Clustered logs saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &[&str] = &[
        "2024-05-01 10:00:00.123456 - ERROR - Disk usage nearing capacity",
        "2024-05-01 10:00:30.123456 - ERROR - Disk usage nearing capacity",
        "2024-05-01 10:01:00.123456 - INFO - Database connection established",
        "2024-05-01 10:01:30.123456 - INFO - Database connection established",
        "2024-05-01 10:02:00.123456 - WARN - Network latency exceeded threshold",
        "2024-05-01 10:02:30.123456 - WARN - Network latency exceeded threshold",
    ];

    #[test]
    fn test_strip_timestamp_keeps_level_and_message() {
        assert_eq!(strip_timestamp(SAMPLE[0]), "ERROR - Disk usage nearing capacity");
    }

    #[test]
    fn test_strip_timestamp_is_idempotent() {
        for line in SAMPLE {
            let once = strip_timestamp(line);
            assert_eq!(strip_timestamp(&once), once);
        }
    }

    #[test]
    fn test_strip_timestamp_nested_dates() {
        let line = "2024-05-01 - 2024-05-02 - x";
        let once = strip_timestamp(line);
        assert_eq!(once, "x");
        assert_eq!(strip_timestamp(&once), once);
        assert_eq!(
            strip_timestamp("2024-05-01 10:00 - 2024-05-02 no separator"),
            "2024-05-02 no separator"
        );
    }

    #[test]
    fn test_strip_timestamp_without_date() {
        assert_eq!(strip_timestamp("  plain message - here  "), "plain message - here");
        assert_eq!(strip_timestamp("2024-05-01 no separator"), "2024-05-01 no separator");
    }

    #[test]
    fn test_preprocess_logs_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", SAMPLE[0]).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   ").unwrap();
        write!(file, "{}", SAMPLE[2]).unwrap();

        let lines = preprocess_logs(file.path()).unwrap();
        assert_eq!(
            lines,
            vec![
                "ERROR - Disk usage nearing capacity",
                "INFO - Database connection established"
            ]
        );
    }

    #[test]
    fn test_clusters_group_identical_messages() {
        let lines: Vec<String> = SAMPLE.iter().map(|l| strip_timestamp(l)).collect();
        let (model, labels) = LogClusterer::fit(&lines, 3).unwrap();

        assert_eq!(labels.len(), lines.len());
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_eq!(labels[4], labels[5]);
        assert_eq!(model.predict(&lines).unwrap(), labels);
    }

    #[test]
    fn test_clusterer_survives_serialization() {
        let lines: Vec<String> = SAMPLE.iter().map(|l| strip_timestamp(l)).collect();
        let (model, labels) = LogClusterer::fit(&lines, 3).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: LogClusterer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.predict(&lines).unwrap(), labels);
    }

    #[test]
    fn test_render_cluster_report() {
        let report = render_cluster_report(&[1, 0, 1], &["a", "b", "c"]);
        assert_eq!(report, "Cluster 0 Logs:\n- b\n\nCluster 1 Logs:\n- a\n- c\n\n");
    }

    #[test]
    fn test_save_cluster_report_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("log_clusters.txt");
        save_cluster_report(&path, &[0], &["only line"]).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "Cluster 0 Logs:\n- only line\n\n"
        );
    }
}
