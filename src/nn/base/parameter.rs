//! Trainable parameters and the visitor trait optimizers walk.

use ndarray::Array2;

use crate::topo_error::{Result, TopoModelError};

/// Trainable matrix together with its accumulated gradient.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    name: String,
    value: Array2<f32>,
    grad: Array2<f32>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.dim());
        Self {
            name: name.into(),
            value,
            grad,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Array2<f32> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Array2<f32> {
        &mut self.value
    }

    pub fn grad(&self) -> &Array2<f32> {
        &self.grad
    }

    /// Split borrow used by optimizers: `(value, grad)`.
    pub fn value_and_grad_mut(&mut self) -> (&mut Array2<f32>, &Array2<f32>) {
        (&mut self.value, &self.grad)
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Add `update` to the gradient buffer.
    pub fn accumulate(&mut self, update: &Array2<f32>) -> Result<()> {
        if update.dim() != self.value.dim() {
            return Err(TopoModelError::ShapeMismatch {
                op: "accumulate gradient",
                left: self.value.dim(),
                right: update.dim(),
            });
        }
        self.grad += update;
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// Anything owning [`Parameter`]s.
///
/// Visit order must be stable across calls; optimizers key their state on it.
pub trait Parametrized {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter));

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter));

    fn zero_grad(&mut self) {
        self.visit_parameters_mut(&mut |p| p.zero_grad());
    }

    /// Total number of scalar weights.
    fn num_parameters(&self) -> usize {
        let mut n = 0;
        self.visit_parameters(&mut |p| n += p.len());
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_and_reset() {
        let mut p = Parameter::new("w", Array2::ones((2, 3)));
        p.accumulate(&Array2::from_elem((2, 3), 0.5)).unwrap();
        p.accumulate(&Array2::from_elem((2, 3), 0.5)).unwrap();
        assert_eq!(p.grad()[[1, 2]], 1.0);
        assert!(p.accumulate(&Array2::zeros((3, 2))).is_err());
        p.zero_grad();
        assert_eq!(p.grad().sum(), 0.0);
        assert_eq!(p.name(), "w");
    }
}
