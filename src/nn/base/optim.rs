//! First-order optimizers over any [`Parametrized`] model.
//!
//! State is kept per parameter in visit order, so a given optimizer must only
//! ever be stepped against one model.

use ndarray::{Array2, Zip};

use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::topo_error::{Result, TopoModelError};

pub trait Optimizer {
    /// Apply one update from the accumulated gradients. Gradients are left
    /// untouched; call [`Parametrized::zero_grad`] before the next backward.
    fn step(&mut self, model: &mut dyn Parametrized) -> Result<()>;

    fn learning_rate(&self) -> f32;
}

fn check_hyper(lr: f32, weight_decay: f32) -> Result<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(TopoModelError::InvalidConfig(format!(
            "learning rate must be positive, got {lr}"
        )));
    }
    if !(weight_decay.is_finite() && weight_decay >= 0.0) {
        return Err(TopoModelError::InvalidConfig(format!(
            "weight decay must be non-negative, got {weight_decay}"
        )));
    }
    Ok(())
}

/// Walk the parameters, handing each one its slot in `state`.
fn for_each_with_state(
    model: &mut dyn Parametrized,
    state: &mut Vec<Vec<Array2<f32>>>,
    slots: usize,
    mut update: impl FnMut(&mut Parameter, &mut [Array2<f32>]),
) -> Result<()> {
    let mut k = 0;
    let mut mismatch = None;
    model.visit_parameters_mut(&mut |p| {
        if state.len() == k {
            state.push(vec![Array2::zeros(p.value().dim()); slots]);
        }
        let slot = &mut state[k];
        if slot[0].dim() != p.value().dim() {
            mismatch.get_or_insert((slot[0].dim(), p.value().dim()));
        } else {
            update(p, slot);
        }
        k += 1;
    });
    match mismatch {
        Some((left, right)) => Err(TopoModelError::ShapeMismatch {
            op: "optimizer state",
            left,
            right,
        }),
        None => Ok(()),
    }
}

/// Stochastic gradient descent with optional momentum and L2 weight decay.
#[derive(Clone, Debug)]
pub struct Sgd {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocity: Vec<Vec<Array2<f32>>>,
}

impl Sgd {
    pub fn new(lr: f32) -> Result<Self> {
        Self::with_momentum(lr, 0.0, 0.0)
    }

    pub fn with_momentum(lr: f32, momentum: f32, weight_decay: f32) -> Result<Self> {
        check_hyper(lr, weight_decay)?;
        if !(0.0..1.0).contains(&momentum) {
            return Err(TopoModelError::InvalidConfig(format!(
                "momentum must lie in [0, 1), got {momentum}"
            )));
        }
        Ok(Self {
            lr,
            momentum,
            weight_decay,
            velocity: Vec::new(),
        })
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, model: &mut dyn Parametrized) -> Result<()> {
        let (lr, mu, wd) = (self.lr, self.momentum, self.weight_decay);
        for_each_with_state(model, &mut self.velocity, 1, |p, state| {
            let (value, grad) = p.value_and_grad_mut();
            let v = &mut state[0];
            Zip::from(value).and(grad).and(v).for_each(|w, &g, v| {
                let g = g + wd * *w;
                *v = mu * *v + g;
                *w -= lr * *v;
            });
        })
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}

/// Adam (Kingma & Ba) with bias correction and L2 weight decay.
#[derive(Clone, Debug)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: i32,
    moments: Vec<Vec<Array2<f32>>>,
}

impl Adam {
    pub fn new(lr: f32) -> Result<Self> {
        Self::with_betas(lr, 0.9, 0.999, 0.0)
    }

    pub fn with_betas(lr: f32, beta1: f32, beta2: f32, weight_decay: f32) -> Result<Self> {
        check_hyper(lr, weight_decay)?;
        for (name, b) in [("beta1", beta1), ("beta2", beta2)] {
            if !(0.0..1.0).contains(&b) {
                return Err(TopoModelError::InvalidConfig(format!(
                    "{name} must lie in [0, 1), got {b}"
                )));
            }
        }
        Ok(Self {
            lr,
            beta1,
            beta2,
            eps: 1e-8,
            weight_decay,
            t: 0,
            moments: Vec::new(),
        })
    }
}

impl Optimizer for Adam {
    fn step(&mut self, model: &mut dyn Parametrized) -> Result<()> {
        self.t = self.t.saturating_add(1);
        let (b1, b2, eps, wd) = (self.beta1, self.beta2, self.eps, self.weight_decay);
        let c1 = 1.0 - b1.powi(self.t);
        let c2 = 1.0 - b2.powi(self.t);
        let lr = self.lr;
        for_each_with_state(model, &mut self.moments, 2, |p, state| {
            let (value, grad) = p.value_and_grad_mut();
            let (m, v) = state.split_at_mut(1);
            Zip::from(value)
                .and(grad)
                .and(&mut m[0])
                .and(&mut v[0])
                .for_each(|w, &g, m, v| {
                    let g = g + wd * *w;
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *w -= lr * (*m / c1) / ((*v / c2).sqrt() + eps);
                });
        })
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}
