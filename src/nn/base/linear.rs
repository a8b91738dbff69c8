//! Dense affine map `y = xW + b`.

use ndarray::{Array2, Axis};
use rand::rngs::SmallRng;

use crate::nn::base::init::{Initialization, init_matrix};
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::topo_error::{Result, TopoModelError};

/// Fully-connected layer applied row-wise to a feature matrix.
#[derive(Clone, Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Option<Parameter>,
}

impl Linear {
    /// Weight `(in_channels, out_channels)` sampled from `init`; bias starts at zero.
    pub fn new(
        name: &str,
        in_channels: usize,
        out_channels: usize,
        bias: bool,
        init: Initialization,
        gain: f32,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let weight = init_matrix(in_channels, out_channels, init, gain, rng)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: bias
                .then(|| Parameter::new(format!("{name}::bias"), Array2::zeros((1, out_channels)))),
        })
    }

    pub fn in_channels(&self) -> usize {
        self.weight.value().nrows()
    }

    pub fn out_channels(&self) -> usize {
        self.weight.value().ncols()
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }

    fn check_input(&self, x: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.in_channels() {
            return Err(TopoModelError::ShapeMismatch {
                op: "linear",
                left: x.dim(),
                right: self.weight.value().dim(),
            });
        }
        Ok(())
    }

    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_input(x)?;
        let mut y = x.dot(self.weight.value());
        if let Some(b) = &self.bias {
            y += b.value();
        }
        Ok(y)
    }

    /// Accumulate `dW = xᵀ g`, `db = Σ_rows g` and return `g Wᵀ`.
    pub fn backward(&mut self, x: &Array2<f32>, grad_out: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_input(x)?;
        if grad_out.dim() != (x.nrows(), self.out_channels()) {
            return Err(TopoModelError::ShapeMismatch {
                op: "linear backward",
                left: grad_out.dim(),
                right: (x.nrows(), self.out_channels()),
            });
        }
        self.weight.accumulate(&x.t().dot(grad_out))?;
        if let Some(b) = &mut self.bias {
            b.accumulate(&grad_out.sum_axis(Axis(0)).insert_axis(Axis(0)))?;
        }
        Ok(grad_out.dot(&self.weight.value().t()))
    }
}

impl Parametrized for Linear {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        visitor(&self.weight);
        if let Some(b) = &self.bias {
            visitor(b);
        }
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        visitor(&mut self.weight);
        if let Some(b) = &mut self.bias {
            visitor(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn layer(bias: bool) -> Linear {
        let mut rng = SmallRng::seed_from_u64(3);
        Linear::new("fc", 3, 2, bias, Initialization::XavierUniform, 1.0, &mut rng).unwrap()
    }

    #[test]
    fn forward_matches_manual() {
        let fc = layer(true);
        let x = array![[1.0f32, -2.0, 0.5]];
        assert_eq!(fc.forward(&x).unwrap(), x.dot(fc.weight().value()));
        assert!(fc.forward(&Array2::zeros((1, 4))).is_err());
    }

    #[test]
    fn backward_accumulates() {
        let mut fc = layer(true);
        let x = array![[1.0f32, 0.0, 2.0], [0.0, 1.0, 0.0]];
        let g = array![[1.0f32, 0.0], [0.0, 1.0]];
        let gx = fc.backward(&x, &g).unwrap();
        assert_eq!(gx.dim(), (2, 3));
        assert_eq!(fc.weight().grad(), &x.t().dot(&g));
        assert_eq!(fc.bias().unwrap().grad(), &array![[1.0, 1.0]]);
        assert_eq!(fc.num_parameters(), 8);
    }
}
