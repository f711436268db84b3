//! The Adamax optimizer with serializable state.

use crate::common::*;

/// Adamax options. Defaults match the common `(0.9, 0.999)` betas.
#[derive(Debug, Clone, PartialEq)]
pub struct AdamaxInit {
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamaxInit {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AdamaxInit {
    pub fn build(self, vs: &nn::VarStore, lr: f64) -> Result<Adamax> {
        let Self {
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self;

        ensure!((0.0..1.0).contains(&beta1), "beta1 must be within [0, 1)");
        ensure!((0.0..1.0).contains(&beta2), "beta2 must be within [0, 1)");
        ensure!(eps >= 0.0, "eps must be non-negative");
        ensure!(weight_decay >= 0.0, "weight_decay must be non-negative");
        ensure!(lr >= 0.0, "lr must be non-negative");

        let params: Vec<_> = vs
            .variables()
            .into_iter()
            .filter(|(_name, var)| var.requires_grad())
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .map(|(name, param)| {
                let (exp_avg, exp_inf) = tch::no_grad(|| (param.zeros_like(), param.zeros_like()));
                AdamaxParam {
                    name,
                    param,
                    exp_avg,
                    exp_inf,
                }
            })
            .collect();

        Ok(Adamax {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
            step: 0,
            params,
        })
    }
}

#[derive(Debug)]
struct AdamaxParam {
    name: String,
    param: Tensor,
    exp_avg: Tensor,
    exp_inf: Tensor,
}

/// Adamax over the trainable variables of a var store.
///
/// The state is kept as named tensors: `step`, `exp_avg.<param>` and
/// `exp_inf.<param>`.
#[derive(Debug)]
pub struct Adamax {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    weight_decay: f64,
    step: i64,
    params: Vec<AdamaxParam>,
}

impl Adamax {
    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// The number of optimization steps taken so far.
    pub fn num_steps(&self) -> i64 {
        self.step
    }

    pub fn zero_grad(&mut self) {
        self.params.iter().for_each(|AdamaxParam { param, .. }| {
            let mut grad = param.grad();
            if grad.defined() {
                let _ = grad.detach_();
                let _ = grad.zero_();
            }
        });
    }

    pub fn backward_step(&mut self, loss: &Tensor) {
        self.zero_grad();
        loss.backward();
        self.step();
    }

    pub fn step(&mut self) {
        let Self {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
            ref mut step,
            ref mut params,
        } = *self;

        *step += 1;
        let step_size = lr / (1.0 - beta1.powi(*step as i32));

        tch::no_grad(|| {
            for AdamaxParam {
                param,
                exp_avg,
                exp_inf,
                ..
            } in params.iter_mut()
            {
                let grad = param.grad();
                if !grad.defined() {
                    continue;
                }
                let grad = if weight_decay != 0.0 {
                    grad + &*param * weight_decay
                } else {
                    grad
                };

                *exp_avg = &*exp_avg * beta1 + &grad * (1.0 - beta1);
                *exp_inf = (&*exp_inf * beta2).maximum(&(grad.abs() + eps));

                let update = &*exp_avg / &*exp_inf * step_size;
                let _ = param.copy_(&(&*param - update));
            }
        });
    }

    /// Named copies of the optimizer state.
    pub fn state(&self) -> Vec<(String, Tensor)> {
        tch::no_grad(|| {
            let step = ("step".to_string(), Tensor::from(self.step));
            let moments = self.params.iter().flat_map(
                |AdamaxParam {
                     name,
                     exp_avg,
                     exp_inf,
                     ..
                 }| {
                    [
                        (format!("exp_avg.{}", name), exp_avg.copy()),
                        (format!("exp_inf.{}", name), exp_inf.copy()),
                    ]
                },
            );
            iter::once(step).chain(moments).collect()
        })
    }

    /// Restores the state produced by [Adamax::state].
    pub fn load_state(&mut self, state: &[(String, Tensor)]) -> Result<()> {
        let state: HashMap<&str, &Tensor> = state
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
            .collect();
        let get = |key: &str| {
            state
                .get(key)
                .copied()
                .ok_or_else(|| format_err!("optimizer state has no entry '{}'", key))
        };

        let step = i64::from(get("step")?);
        ensure!(step >= 0, "invalid optimizer step {}", step);

        tch::no_grad(|| -> Result<_> {
            for AdamaxParam {
                name,
                param,
                exp_avg,
                exp_inf,
            } in self.params.iter_mut()
            {
                let avg = get(&format!("exp_avg.{}", name))?;
                let inf = get(&format!("exp_inf.{}", name))?;
                ensure!(
                    avg.size() == param.size() && inf.size() == param.size(),
                    "optimizer state for '{}' does not match the parameter shape",
                    name
                );
                *exp_avg = avg.to_device(param.device()).copy();
                *exp_inf = inf.to_device(param.device()).copy();
            }
            Ok(())
        })?;

        self.step = step;
        Ok(())
    }
}
