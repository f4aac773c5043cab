//! Per-class precision, recall, and F1 over flattened tag sequences.

use std::fmt;

/// Scores for a single tag label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Averaged precision/recall/F1 across labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Averages {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Classification report over aligned gold/predicted label sequences.
#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: Averages,
    pub weighted_avg: Averages,
    pub total_support: u64,
}

fn ratio(num: u64, denom: u64) -> f64 {
    if denom == 0 { 0.0 } else { num as f64 / denom as f64 }
}

fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

impl ClassificationReport {
    /// Compute per-class and aggregate scores. `labels` fixes the row
    /// order; zero denominators score 0.
    pub fn compute(gold: &[String], predicted: &[String], labels: &[String]) -> Self {
        let mut classes = Vec::with_capacity(labels.len());
        for label in labels {
            let mut tp = 0u64;
            let mut fp = 0u64;
            let mut missed = 0u64;
            for (g, p) in gold.iter().zip(predicted) {
                match (g == label, p == label) {
                    (true, true) => tp += 1,
                    (false, true) => fp += 1,
                    (true, false) => missed += 1,
                    (false, false) => {}
                }
            }
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, tp + missed);
            classes.push(ClassMetrics {
                label: label.clone(),
                precision,
                recall,
                f1: f1_score(precision, recall),
                support: tp + missed,
            });
        }

        let total_support: u64 = classes.iter().map(|c| c.support).sum();
        let matches = gold.iter().zip(predicted).filter(|(g, p)| g == p).count() as u64;
        let accuracy = ratio(matches, gold.len() as u64);

        let n = classes.len().max(1) as f64;
        let macro_avg = Averages {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
        };

        let total = (total_support as f64).max(1.0);
        let weighted_avg = Averages {
            precision: classes
                .iter()
                .map(|c| c.precision * c.support as f64)
                .sum::<f64>()
                / total,
            recall: classes
                .iter()
                .map(|c| c.recall * c.support as f64)
                .sum::<f64>()
                / total,
            f1: classes.iter().map(|c| c.f1 * c.support as f64).sum::<f64>() / total,
        };

        Self {
            classes,
            accuracy,
            macro_avg,
            weighted_avg,
            total_support,
        }
    }

    /// Scores for one label, if it was reported.
    pub fn class(&self, label: &str) -> Option<&ClassMetrics> {
        self.classes.iter().find(|c| c.label == label)
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label_width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>label_width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>label_width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>label_width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total_support
        )?;
        writeln!(
            f,
            "{:>label_width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "macro avg",
            self.macro_avg.precision,
            self.macro_avg.recall,
            self.macro_avg.f1,
            self.total_support
        )?;
        writeln!(
            f,
            "{:>label_width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "weighted avg",
            self.weighted_avg.precision,
            self.weighted_avg.recall,
            self.weighted_avg.f1,
            self.total_support
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn perfect_predictions_score_one() {
        // Remapped gold for ["aspirin", "is", "safe"] with gold tags
        // ["B-Chemical", "O", "O"]; the model predicted the same.
        let gold = tags(&["B-Drug", "O", "O"]);
        let pred = tags(&["B-Drug", "O", "O"]);
        let labels = tags(&["O", "B-Drug"]);

        let report = ClassificationReport::compute(&gold, &pred, &labels);
        let b_drug = report.class("B-Drug").unwrap();
        assert_eq!(b_drug.precision, 1.0);
        assert_eq!(b_drug.recall, 1.0);
        assert_eq!(b_drug.f1, 1.0);
        assert_eq!(b_drug.support, 1);
        let outside = report.class("O").unwrap();
        assert_eq!(outside.precision, 1.0);
        assert_eq!(outside.recall, 1.0);
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn mixed_predictions_hand_checked() {
        let gold = tags(&["B-Drug", "B-Drug", "O", "O"]);
        let pred = tags(&["B-Drug", "O", "B-Drug", "O"]);
        let labels = tags(&["O", "B-Drug"]);

        let report = ClassificationReport::compute(&gold, &pred, &labels);
        let b_drug = report.class("B-Drug").unwrap();
        assert_eq!(b_drug.precision, 0.5);
        assert_eq!(b_drug.recall, 0.5);
        assert_eq!(b_drug.f1, 0.5);
        assert_eq!(b_drug.support, 2);
        assert_eq!(report.accuracy, 0.5);
        assert_eq!(report.total_support, 4);
    }

    #[test]
    fn absent_label_scores_zero() {
        let gold = tags(&["O", "O"]);
        let pred = tags(&["O", "O"]);
        let labels = tags(&["O", "I-Drug"]);

        let report = ClassificationReport::compute(&gold, &pred, &labels);
        let i_drug = report.class("I-Drug").unwrap();
        assert_eq!(i_drug.precision, 0.0);
        assert_eq!(i_drug.recall, 0.0);
        assert_eq!(i_drug.f1, 0.0);
        assert_eq!(i_drug.support, 0);
    }

    #[test]
    fn weighted_average_uses_support() {
        let gold = tags(&["O", "O", "O", "B-Drug"]);
        let pred = tags(&["O", "O", "O", "O"]);
        let labels = tags(&["O", "B-Drug"]);

        let report = ClassificationReport::compute(&gold, &pred, &labels);
        // O: precision 0.75, recall 1.0, support 3; B-Drug: all 0, support 1.
        assert!((report.weighted_avg.recall - 0.75).abs() < 1e-9);
        assert!((report.macro_avg.recall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn display_renders_table() {
        let gold = tags(&["B-Drug", "O"]);
        let pred = tags(&["B-Drug", "O"]);
        let labels = tags(&["O", "B-Drug"]);
        let rendered = ClassificationReport::compute(&gold, &pred, &labels).to_string();
        assert!(rendered.contains("precision"));
        assert!(rendered.contains("macro avg"));
        assert!(rendered.contains("B-Drug"));
    }
}
