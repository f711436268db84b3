//! Classification metrics over held-out predictions.

use crate::{common::*, dataset::ClassCatalog, error::LeafError};

/// Returns the index of the first maximum score.
///
/// NaN scores never win. Returns `None` for an empty slice or all-NaN input.
pub fn argmax_first(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (index, &score)| match best {
            Some((_, best_score)) if !(score > best_score) => best,
            _ if score.is_nan() => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
}

/// Row-wise first-maximum argmax of a `[batch, num_classes]` tensor.
pub fn batch_argmax(scores: &Tensor) -> Result<Vec<usize>> {
    let (_batch_size, num_classes) = scores.size2()?;
    ensure!(num_classes > 0, "scores must have at least one column");
    let values: Vec<f32> = tch::no_grad(|| {
        Vec::<f32>::from(
            &scores
                .detach()
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .contiguous()
                .view([-1]),
        )
    });
    values
        .chunks(num_classes as usize)
        .map(|row| argmax_first(row).ok_or_else(|| format_err!("row has no comparable score")))
        .collect()
}

/// Accumulates `(true, predicted)` pairs over evaluation batches.
#[derive(Debug, Clone, Default)]
pub struct EvaluationAccumulator {
    y_true: Vec<usize>,
    y_pred: Vec<usize>,
    num_correct: usize,
}

impl EvaluationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a batch of `[batch, num_classes]` scores and `[batch]` labels.
    /// Returns the number of correct predictions in the batch.
    pub fn add_batch(&mut self, scores: &Tensor, labels: &Tensor) -> Result<usize> {
        let predictions = batch_argmax(scores)?;
        let labels: Vec<i64> = Vec::from(&labels.to_device(Device::Cpu).to_kind(Kind::Int64));
        if labels.len() != predictions.len() {
            return Err(LeafError::ShapeMismatch {
                expected: vec![predictions.len() as i64],
                actual: vec![labels.len() as i64],
            }
            .into());
        }

        let num_correct = labels
            .iter()
            .zip(&predictions)
            .filter(|&(&label, &pred)| label as usize == pred)
            .count();
        self.y_true.extend(labels.into_iter().map(|label| label as usize));
        self.y_pred.extend(predictions);
        self.num_correct += num_correct;
        Ok(num_correct)
    }

    pub fn num_correct(&self) -> usize {
        self.num_correct
    }

    pub fn num_samples(&self) -> usize {
        self.y_true.len()
    }

    pub fn y_true(&self) -> &[usize] {
        &self.y_true
    }

    pub fn y_pred(&self) -> &[usize] {
        &self.y_pred
    }

    /// Returns `None` when nothing was accumulated.
    pub fn accuracy(&self) -> Option<f64> {
        (self.num_samples() > 0).then(|| self.num_correct as f64 / self.num_samples() as f64)
    }

    pub fn confusion_matrix(&self, num_classes: usize) -> Result<ConfusionMatrix> {
        ConfusionMatrix::from_predictions(num_classes, &self.y_true, &self.y_pred)
    }
}

/// Counts indexed by `[true class][predicted class]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_predictions(
        num_classes: usize,
        y_true: &[usize],
        y_pred: &[usize],
    ) -> Result<Self> {
        ensure!(
            y_true.len() == y_pred.len(),
            "got {} labels but {} predictions",
            y_true.len(),
            y_pred.len()
        );

        let mut counts = vec![vec![0; num_classes]; num_classes];
        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            ensure!(
                truth < num_classes && pred < num_classes,
                "class index out of range for {} classes",
                num_classes
            );
            counts[truth][pred] += 1;
        }
        Ok(Self { counts })
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, truth: usize, pred: usize) -> usize {
        self.counts[truth][pred]
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.counts[class][class]
    }

    /// Number of samples of the class.
    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    /// Number of samples predicted as the class.
    pub fn predicted(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.num_classes())
            .map(|class| self.true_positives(class))
            .sum();
        correct as f64 / total as f64
    }
}

/// Precision, recall, F1 and support of a class or an average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// A per-class report in the layout of scikit-learn's `classification_report`.
///
/// Zero denominators yield a zero score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: IndexMap<String, ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn new(matrix: &ConfusionMatrix, catalog: &ClassCatalog) -> Result<Self> {
        ensure!(
            matrix.num_classes() == catalog.len(),
            "the matrix has {} classes but the catalog has {}",
            matrix.num_classes(),
            catalog.len()
        );

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        let classes: IndexMap<_, _> = catalog
            .names()
            .enumerate()
            .map(|(class, name)| {
                let tp = matrix.true_positives(class);
                let support = matrix.support(class);
                let precision = ratio(tp, matrix.predicted(class));
                let recall = ratio(tp, support);
                let f1_score = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                let metrics = ClassMetrics {
                    precision,
                    recall,
                    f1_score,
                    support,
                };
                (name.to_string(), metrics)
            })
            .collect();

        let total_support = matrix.total();
        let num_classes = classes.len() as f64;
        let macro_avg = ClassMetrics {
            precision: classes.values().map(|m| m.precision).sum::<f64>() / num_classes,
            recall: classes.values().map(|m| m.recall).sum::<f64>() / num_classes,
            f1_score: classes.values().map(|m| m.f1_score).sum::<f64>() / num_classes,
            support: total_support,
        };
        let weighted = |get: fn(&ClassMetrics) -> f64| {
            if total_support == 0 {
                return 0.0;
            }
            classes
                .values()
                .map(|m| get(m) * m.support as f64)
                .sum::<f64>()
                / total_support as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1_score: weighted(|m| m.f1_score),
            support: total_support,
        };

        Ok(Self {
            accuracy: matrix.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
        })
    }
}

impl Display for ClassificationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .keys()
            .map(|name| name.len())
            .chain([12])
            .max()
            .unwrap_or(12);
        let row = |f: &mut Formatter<'_>, name: &str, m: &ClassMetrics| {
            writeln!(
                f,
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name,
                m.precision,
                m.recall,
                m.f1_score,
                m.support,
                width = width
            )
        };

        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10} {:>10}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        )?;
        writeln!(f)?;
        for (name, metrics) in &self.classes {
            row(f, name, metrics)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support,
            width = width
        )?;
        row(f, "macro avg", &self.macro_avg)?;
        row(f, "weighted avg", &self.weighted_avg)
    }
}
