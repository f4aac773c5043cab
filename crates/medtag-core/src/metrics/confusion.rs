//! Confusion matrix over flattened tag sequences.

use std::collections::HashMap;
use std::fmt;

/// Label-ordered confusion matrix. Rows are gold labels, columns are
/// predicted labels; `counts[i][j]` is the number of tokens with gold
/// label `labels[i]` predicted as `labels[j]`.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    /// Count aligned gold/predicted pairs. Pairs involving a label
    /// outside `labels` are ignored.
    pub fn from_pairs(gold: &[String], predicted: &[String], labels: &[String]) -> Self {
        let index: HashMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let mut counts = vec![vec![0u64; labels.len()]; labels.len()];
        for (g, p) in gold.iter().zip(predicted) {
            if let (Some(&gi), Some(&pi)) = (index.get(g.as_str()), index.get(p.as_str())) {
                counts[gi][pi] += 1;
            }
        }
        Self {
            labels: labels.to_vec(),
            counts,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    /// The count for one gold/predicted label pair.
    pub fn count(&self, gold: &str, predicted: &str) -> Option<u64> {
        let gi = self.labels.iter().position(|l| l == gold)?;
        let pi = self.labels.iter().position(|l| l == predicted)?;
        Some(self.counts[gi][pi])
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label_width = self
            .labels
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(4);
        let cell_width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1)
            .max(label_width);

        write!(f, "{:label_width$}", "")?;
        for label in &self.labels {
            write!(f, " {label:>cell_width$}")?;
        }
        writeln!(f)?;
        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{label:label_width$}")?;
            for count in row {
                write!(f, " {count:>cell_width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
