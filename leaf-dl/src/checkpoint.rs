//! Checkpoint records and the save policy.

use crate::{common::*, error::LeafError, optim::Adamax};

const EPOCH_KEY: &str = "meta.epoch";
const LOSS_KEY: &str = "meta.loss";
const MODEL_PREFIX: &str = "model.";
const OPTIMIZER_PREFIX: &str = "optimizer.";

/// The two checkpoint files kept per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointSlot {
    /// Overwritten at the end of every epoch.
    Latest,
    /// Overwritten when the validation accuracy improves.
    BestValidation,
}

impl CheckpointSlot {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Latest => "last_train_model_state.ckpt",
            Self::BestValidation => "last_best_val_epoch_model_state.ckpt",
        }
    }
}

fn prefixed<'a>(
    prefix: &'a str,
    state: &'a [(String, Tensor)],
) -> impl Iterator<Item = (String, &'a Tensor)> + 'a {
    state
        .iter()
        .map(move |(name, tensor)| (format!("{}{}", prefix, name), tensor))
}

/// A snapshot of the model and optimizer at the end of an epoch.
#[derive(Debug)]
pub struct CheckpointRecord {
    pub epoch: usize,
    pub loss: f64,
    pub model_state: Vec<(String, Tensor)>,
    pub optimizer_state: Vec<(String, Tensor)>,
}

impl CheckpointRecord {
    /// Copies the current state to CPU memory.
    pub fn capture(epoch: usize, loss: f64, vs: &nn::VarStore, optimizer: &Adamax) -> Self {
        let to_cpu = |(name, tensor): (String, Tensor)| {
            let tensor = tch::no_grad(|| tensor.detach().to_device(Device::Cpu).copy());
            (name, tensor)
        };
        let model_state = vs
            .variables()
            .into_iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .map(to_cpu)
            .collect();
        let optimizer_state = optimizer.state().into_iter().map(to_cpu).collect();

        Self {
            epoch,
            loss,
            model_state,
            optimizer_state,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LeafError> {
        let Self {
            epoch,
            loss,
            ref model_state,
            ref optimizer_state,
        } = *self;

        let epoch = Tensor::from(epoch as i64);
        let loss = Tensor::from(loss);
        let entries: Vec<(String, &Tensor)> = vec![
            (EPOCH_KEY.to_string(), &epoch),
            (LOSS_KEY.to_string(), &loss),
        ]
        .into_iter()
        .chain(prefixed(MODEL_PREFIX, model_state))
        .chain(prefixed(OPTIMIZER_PREFIX, optimizer_state))
        .collect();

        Tensor::save_multi(&entries, path)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LeafError> {
        let path = path.as_ref();
        let entries = Tensor::load_multi(path)?;
        let missing = |key: &str| LeafError::MissingCheckpointEntry {
            path: path.to_owned(),
            key: key.to_string(),
        };

        let mut epoch = None;
        let mut loss = None;
        let mut model_state = vec![];
        let mut optimizer_state = vec![];

        for (name, tensor) in entries {
            if name == EPOCH_KEY {
                epoch = Some(i64::from(&tensor) as usize);
            } else if name == LOSS_KEY {
                loss = Some(f64::from(&tensor));
            } else if let Some(name) = name.strip_prefix(MODEL_PREFIX) {
                model_state.push((name.to_string(), tensor));
            } else if let Some(name) = name.strip_prefix(OPTIMIZER_PREFIX) {
                optimizer_state.push((name.to_string(), tensor));
            } else {
                warn!(
                    "ignore unknown entry '{}' in checkpoint '{}'",
                    name,
                    path.display()
                );
            }
        }

        Ok(Self {
            epoch: epoch.ok_or_else(|| missing(EPOCH_KEY))?,
            loss: loss.ok_or_else(|| missing(LOSS_KEY))?,
            model_state,
            optimizer_state,
        })
    }

    /// Copies the model parameters of this record into the var store.
    pub fn restore_model(&self, vs: &mut nn::VarStore) -> Result<()> {
        let state: HashMap<&str, &Tensor> = self
            .model_state
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
            .collect();

        tch::no_grad(|| -> Result<_> {
            for (name, mut var) in vs.variables() {
                let src = state.get(name.as_str()).ok_or_else(|| {
                    format_err!("checkpoint has no parameter '{}{}'", MODEL_PREFIX, name)
                })?;
                if src.size() != var.size() {
                    return Err(LeafError::ShapeMismatch {
                        expected: var.size(),
                        actual: src.size(),
                    }
                    .into());
                }
                var.copy_(&src.to_device(var.device()));
            }
            Ok(())
        })
    }
}

/// Tracks the best validation accuracy of a run.
///
/// Only a strict improvement counts, and the first observation always
/// improves on the empty state.
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<f64>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Records `value` and returns true when it is a new best.
    pub fn update(&mut self, value: f64) -> bool {
        match self.best {
            Some(best) if value <= best => false,
            _ => {
                self.best = Some(value);
                true
            }
        }
    }
}
