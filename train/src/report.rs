//! Run artifacts describing the data split and the test results.

use crate::common::*;

/// The subset indexes and per-class distribution written to `split.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSummary {
    pub seed: u64,
    pub distribution: IndexMap<String, IndexMap<String, usize>>,
    pub split: DatasetSplit,
}

impl SplitSummary {
    pub fn new(dataset: &FolderDataset, split: &DatasetSplit, seed: u64) -> Self {
        let catalog = dataset.catalog();
        let targets = dataset.targets();

        let distribution = [SubsetKind::Train, SubsetKind::Val, SubsetKind::Test]
            .into_iter()
            .map(|kind| {
                let counts = split.class_counts(kind, &targets, catalog.len());
                let counts: IndexMap<_, _> = catalog
                    .names()
                    .map(str::to_owned)
                    .zip(counts)
                    .collect();
                (kind.to_string(), counts)
            })
            .collect();

        Self {
            seed,
            distribution,
            split: split.clone(),
        }
    }

    /// Logs the number of samples per class of each subset.
    pub fn log(&self) {
        for (subset, counts) in &self.distribution {
            let total: usize = counts.values().sum();
            info!("{} subset: {} samples", subset, total);
            for (class, count) in counts {
                info!("  {}: {}", class, count);
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// The summary of one training epoch, a row of `history.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub learning_rate: f64,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Appends [EpochRecord]s to a CSV file, flushing after every row.
#[derive(Debug)]
pub struct HistoryWriter {
    writer: csv::Writer<fs::File>,
}

impl HistoryWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, record: &EpochRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads the rows written by [HistoryWriter].
pub fn read_history(path: impl AsRef<Path>) -> Result<Vec<EpochRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let records = reader.deserialize().collect::<Result<Vec<EpochRecord>, _>>()?;
    Ok(records)
}

/// Writes the confusion matrix and the classification report of the test pass.
pub fn write_evaluation_report(
    run_dir: &Path,
    catalog: &ClassCatalog,
    accumulator: &EvaluationAccumulator,
) -> Result<ClassificationReport> {
    let matrix = accumulator.confusion_matrix(catalog.len())?;
    let report = ClassificationReport::new(&matrix, catalog)?;

    write_confusion_matrix(&run_dir.join("confusion_matrix.csv"), &matrix, catalog)?;
    fs::write(
        run_dir.join("classification_report.json"),
        serde_json::to_string_pretty(&report)?,
    )?;
    fs::write(run_dir.join("classification_report.txt"), report.to_string())?;

    Ok(report)
}

/// Rows are true classes and columns are predicted classes.
fn write_confusion_matrix(
    path: &Path,
    matrix: &ConfusionMatrix,
    catalog: &ClassCatalog,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;

    writer.write_record(iter_header(catalog))?;
    for (name, row) in catalog.names().zip(matrix.rows()) {
        let record = std::iter::once(name.to_string()).chain(row.iter().map(|n| n.to_string()));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn iter_header(catalog: &ClassCatalog) -> impl Iterator<Item = &str> + '_ {
    std::iter::once("").chain(catalog.names())
}
