use crate::{common::*, config::LearningRateSchedule};

/// Epoch-indexed learning rate.
#[derive(Debug, Clone)]
pub enum LrScheduler {
    Constant {
        lr: f64,
    },
    StepDecay {
        base_lr: f64,
        step_size: usize,
        gamma: f64,
        epoch: usize,
    },
}

impl LrScheduler {
    pub fn new(
        config: &LearningRateSchedule,
        base_lr: R64,
        init_epoch: impl Into<Option<usize>>,
    ) -> Result<Self> {
        ensure!(base_lr >= 0.0, "the lr must be non-negative");
        let base_lr = base_lr.raw();

        let mut scheduler = match *config {
            LearningRateSchedule::Constant => Self::Constant { lr: base_lr },
            LearningRateSchedule::StepDecay { step_size, gamma } => {
                ensure!(gamma > 0.0, "gamma must be positive");
                Self::StepDecay {
                    base_lr,
                    step_size: step_size.get(),
                    gamma: gamma.raw(),
                    epoch: 0,
                }
            }
        };

        if let Some(init_epoch) = init_epoch.into() {
            scheduler.set_epoch(init_epoch);
        }

        Ok(scheduler)
    }

    pub fn set_epoch(&mut self, new_epoch: usize) {
        if let Self::StepDecay { epoch, .. } = self {
            *epoch = new_epoch;
        }
    }

    /// The learning rate of the current epoch.
    pub fn lr(&self) -> f64 {
        match *self {
            Self::Constant { lr } => lr,
            Self::StepDecay {
                base_lr,
                step_size,
                gamma,
                epoch,
            } => base_lr * gamma.powi((epoch / step_size) as i32),
        }
    }

    /// Advances one epoch and returns the new learning rate.
    pub fn next(&mut self) -> f64 {
        if let Self::StepDecay { epoch, .. } = self {
            *epoch += 1;
        }
        self.lr()
    }
}
