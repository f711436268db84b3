//! Stratified train/validation/test partitioning.

use super::{catalog::ClassCatalog, folder::FolderDataset};
use crate::{common::*, error::LeafError};
use std::cmp::{Ordering, Reverse};

const NUM_SUBSETS: usize = 3;

/// How to treat classes too small to be represented in every subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StratifyPolicy {
    /// Every class keeps at least one sample in each subset. Fails with
    /// [LeafError::DegenerateStratification] when a class has fewer samples
    /// than subsets.
    Strict,
    /// Keep the proportional rounding as is. Small classes may be missing
    /// from any subset.
    Lenient,
}

impl Default for StratifyPolicy {
    fn default() -> Self {
        Self::Strict
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubsetKind {
    Train,
    Val,
    Test,
}

impl SubsetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }
}

impl Display for SubsetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedSplitInit {
    pub train_ratio: Ratio,
    pub val_ratio: Ratio,
    pub seed: u64,
    #[serde(default)]
    pub policy: StratifyPolicy,
}

impl Default for StratifiedSplitInit {
    fn default() -> Self {
        Self {
            train_ratio: Ratio::try_from(0.8).unwrap(),
            val_ratio: Ratio::try_from(0.1).unwrap(),
            seed: 42,
            policy: StratifyPolicy::Strict,
        }
    }
}

impl StratifiedSplitInit {
    pub fn build(self) -> Result<StratifiedSplit, LeafError> {
        let Self {
            train_ratio,
            val_ratio,
            seed,
            policy,
        } = self;

        let invalid = |reason: String| LeafError::InvalidSplit { reason };

        if train_ratio.to_f64() <= 0.0 {
            return Err(invalid("train_ratio must be positive".into()));
        }
        if train_ratio.checked_add(val_ratio).is_err() {
            return Err(invalid(format!(
                "train_ratio ({}) plus val_ratio ({}) exceeds 1",
                train_ratio, val_ratio
            )));
        }

        Ok(StratifiedSplit {
            train_ratio,
            val_ratio,
            seed,
            policy,
        })
    }
}

/// Splits sample indexes into train, validation and test subsets while
/// keeping per-class proportions.
#[derive(Debug, Clone)]
pub struct StratifiedSplit {
    train_ratio: Ratio,
    val_ratio: Ratio,
    seed: u64,
    policy: StratifyPolicy,
}

impl StratifiedSplit {
    /// Subset sizes for a dataset of `num_samples`. The test subset takes
    /// the remainder.
    pub fn subset_sizes(&self, num_samples: usize) -> (usize, usize, usize) {
        let train = (self.train_ratio * num_samples).floor() as usize;
        let val = (self.val_ratio * num_samples).floor() as usize;
        let test = num_samples - train - val;
        (train, val, test)
    }

    pub fn split_dataset(&self, dataset: &FolderDataset) -> Result<DatasetSplit, LeafError> {
        self.split(&dataset.targets())
            .map_err(|err| name_degenerate_class(err, dataset.catalog()))
    }

    /// Partitions `0..targets.len()`, where `targets[i]` is the class of sample `i`.
    pub fn split(&self, targets: &[usize]) -> Result<DatasetSplit, LeafError> {
        let num_samples = targets.len();
        let (num_train, num_val, num_test) = self.subset_sizes(num_samples);
        let class_counts = count_classes(targets);

        if self.policy == StratifyPolicy::Strict {
            if let Some(&(label, count)) = class_counts
                .iter()
                .find(|(_, count)| *count < NUM_SUBSETS)
            {
                return Err(LeafError::DegenerateStratification {
                    class: label.to_string(),
                    count,
                    subsets: NUM_SUBSETS,
                });
            }

            let num_classes = class_counts.len();
            for (kind, size) in [
                (SubsetKind::Train, num_train),
                (SubsetKind::Val, num_val),
                (SubsetKind::Test, num_test),
            ] {
                if size < num_classes {
                    return Err(LeafError::InvalidSplit {
                        reason: format!(
                            "the {} subset has {} samples, fewer than the {} classes",
                            kind, size, num_classes
                        ),
                    });
                }
            }
        }

        if num_train == 0 {
            return Err(LeafError::InvalidSplit {
                reason: format!("{} samples are too few to split", num_samples),
            });
        }

        // minimum per-class draws of (first side, second side) of each cut
        let (train_cut, val_cut) = match self.policy {
            StratifyPolicy::Strict => ((1, 2), (1, 1)),
            StratifyPolicy::Lenient => ((0, 0), (0, 0)),
        };

        let all: Vec<usize> = (0..num_samples).collect();
        let (train, held_out) = {
            let mut rng = StdRng::seed_from_u64(self.seed);
            stratified_shuffle_split(&all, targets, num_train, train_cut, &mut rng)
        };
        let (val, test) = {
            let mut rng = StdRng::seed_from_u64(self.seed);
            stratified_shuffle_split(&held_out, targets, num_val, val_cut, &mut rng)
        };

        Ok(DatasetSplit { train, val, test })
    }
}

/// Sample indexes of the three subsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl DatasetSplit {
    pub fn get(&self, kind: SubsetKind) -> &[usize] {
        match kind {
            SubsetKind::Train => &self.train,
            SubsetKind::Val => &self.val,
            SubsetKind::Test => &self.test,
        }
    }

    /// Number of samples per class within a subset.
    pub fn class_counts(
        &self,
        kind: SubsetKind,
        targets: &[usize],
        num_classes: usize,
    ) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        self.get(kind)
            .iter()
            .for_each(|&index| counts[targets[index]] += 1);
        counts
    }
}

/// Per-class counts sorted by class index.
fn count_classes(targets: &[usize]) -> Vec<(usize, usize)> {
    let mut counts: Vec<_> = targets.iter().copied().counts().into_iter().collect();
    counts.sort_unstable();
    counts
}

fn name_degenerate_class(err: LeafError, catalog: &ClassCatalog) -> LeafError {
    match err {
        LeafError::DegenerateStratification {
            class,
            count,
            subsets,
        } => {
            let class = class
                .parse::<usize>()
                .ok()
                .and_then(|index| catalog.name(index))
                .map(str::to_owned)
                .unwrap_or(class);
            LeafError::DegenerateStratification {
                class,
                count,
                subsets,
            }
        }
        err => err,
    }
}

/// Cuts `indexes` into `num_first` samples and the rest so that each side
/// keeps the class proportions of `indexes`.
///
/// Each class puts at least `min_first` samples on the first side and
/// `min_second` on the second side when its size and the side sizes allow.
fn stratified_shuffle_split(
    indexes: &[usize],
    targets: &[usize],
    num_first: usize,
    (min_first, min_second): (usize, usize),
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let num_second = indexes.len() - num_first;
    let mut groups: Vec<(usize, Vec<usize>)> = indexes
        .iter()
        .map(|&index| (targets[index], index))
        .into_group_map()
        .into_iter()
        .collect();
    groups.sort_unstable_by_key(|(label, _)| *label);

    let class_counts: Vec<usize> = groups.iter().map(|(_, group)| group.len()).collect();
    let mut first_counts = approximate_mode(&class_counts, num_first, rng);
    enforce_minimums(&mut first_counts, &class_counts, min_first, min_second);
    let remaining: Vec<usize> = class_counts
        .iter()
        .zip(&first_counts)
        .map(|(&count, &drawn)| count - drawn)
        .collect();
    let second_counts = approximate_mode(&remaining, num_second, rng);

    let mut first = Vec::with_capacity(num_first);
    let mut second = Vec::with_capacity(num_second);

    for ((_, mut group), (n_first, n_second)) in groups
        .into_iter()
        .zip(first_counts.into_iter().zip(second_counts))
    {
        group.shuffle(rng);
        first.extend_from_slice(&group[..n_first]);
        second.extend_from_slice(&group[n_first..(n_first + n_second)]);
    }

    first.shuffle(rng);
    second.shuffle(rng);
    (first, second)
}

/// Moves draws between classes until each class has at least `min_drawn`
/// drawn and `min_left` left over, keeping the total unchanged.
fn enforce_minimums(
    drawn: &mut [usize],
    class_counts: &[usize],
    min_drawn: usize,
    min_left: usize,
) {
    let lower: Vec<usize> = class_counts
        .iter()
        .map(|&count| min_drawn.min(count))
        .collect();
    let upper: Vec<usize> = class_counts
        .iter()
        .zip(&lower)
        .map(|(&count, &lower)| count.saturating_sub(min_left).max(lower))
        .collect();
    let num_classes = drawn.len();

    while let Some(index) = (0..num_classes).find(|&index| drawn[index] < lower[index]) {
        let donor = (0..num_classes)
            .filter(|&other| drawn[other] > lower[other])
            .max_by_key(|&other| (drawn[other] - lower[other], Reverse(other)));
        match donor {
            Some(donor) => {
                drawn[donor] -= 1;
                drawn[index] += 1;
            }
            None => break,
        }
    }

    while let Some(index) = (0..num_classes).find(|&index| drawn[index] > upper[index]) {
        let receiver = (0..num_classes)
            .filter(|&other| drawn[other] < upper[other])
            .max_by_key(|&other| (upper[other] - drawn[other], Reverse(other)));
        match receiver {
            Some(receiver) => {
                drawn[index] -= 1;
                drawn[receiver] += 1;
            }
            None => break,
        }
    }
}

/// Distributes `num_draws` over classes in proportion to `class_counts`.
///
/// Every class gets the floor of its share. The leftover draws go to the
/// classes with the largest fractional parts, with ties broken at random.
fn approximate_mode(class_counts: &[usize], num_draws: usize, rng: &mut StdRng) -> Vec<usize> {
    let total: usize = class_counts.iter().sum();
    if total == 0 {
        return vec![0; class_counts.len()];
    }

    let continuous: Vec<f64> = class_counts
        .iter()
        .map(|&count| count as f64 / total as f64 * num_draws as f64)
        .collect();
    let mut floored: Vec<usize> = continuous.iter().map(|val| val.floor() as usize).collect();
    let mut need_to_add = num_draws.saturating_sub(floored.iter().sum());

    if need_to_add > 0 {
        let remainder: Vec<f64> = continuous
            .iter()
            .zip(&floored)
            .map(|(&cont, &floor)| cont - floor as f64)
            .collect();
        let mut values = remainder.clone();
        values.sort_by(|lhs, rhs| rhs.partial_cmp(lhs).unwrap_or(Ordering::Equal));
        values.dedup();

        for value in values {
            let candidates: Vec<usize> = remainder
                .iter()
                .positions(|&rem| rem == value)
                .filter(|&index| floored[index] < class_counts[index])
                .collect();
            let add_now = candidates.len().min(need_to_add);
            for &index in candidates.choose_multiple(rng, add_now) {
                floored[index] += 1;
            }
            need_to_add -= add_now;
            if need_to_add == 0 {
                break;
            }
        }
    }

    floored
}
