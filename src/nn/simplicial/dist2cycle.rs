//! Edge network for homology localisation.
//!
//! Messages between edges are weighted by the lower adjacency masked inverse
//! of the shifted lower Laplacian (see
//! [`dist2cycle_operator`](crate::neighborhood::dist2cycle_operator)):
//! `h' = relu(((A↓ ⊙ (I + L↓)^{-1}) h) Θ + b)`.
//!
//! The nonlinearity comes after the linear map, so the operator itself is
//! used unrectified.

use ndarray::Array2;
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::neighborhood::dist2cycle_operator;
use crate::nn::base::activation::Activation;
use crate::nn::base::init::{Initialization, leaky_relu_gain};
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::Complex;
use crate::train::{Differentiable, Model};

#[derive(Clone, Debug)]
pub struct Dist2CycleInput {
    pub x_1: Array2<f32>,
    pub operator: CsrMatrix<f32>,
}

impl Dist2CycleInput {
    pub fn from_complex<C: Complex + ?Sized>(complex: &C, x_1: Array2<f32>) -> Result<Self> {
        let operator = dist2cycle_operator(&complex.incidence_matrix(1, true)?)?;
        if operator.nrows() != x_1.nrows() {
            return Err(TopoModelError::ShapeMismatch {
                op: "dist2cycle features",
                left: operator.shape(),
                right: x_1.dim(),
            });
        }
        Ok(Self { x_1, operator })
    }
}

#[derive(Clone, Debug)]
pub struct Dist2CycleLayer {
    fc_neigh: Linear,
}

impl Dist2CycleLayer {
    /// Θ is Kaiming-uniform with the ReLU gain.
    pub fn new(in_channels: usize, out_channels: usize, rng: &mut SmallRng) -> Result<Self> {
        Ok(Self {
            fc_neigh: Linear::new(
                "dist2cycle::fc_neigh",
                in_channels,
                out_channels,
                true,
                Initialization::KaimingUniform,
                leaky_relu_gain(0.0),
                rng,
            )?,
        })
    }

    /// `(operator · x, Θ-transformed messages)`.
    fn pre_activation(
        &self,
        x: &Array2<f32>,
        operator: &CsrMatrix<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        let m = operator.matmul_dense(x)?;
        let pre = self.fc_neigh.forward(&m)?;
        Ok((m, pre))
    }

    pub fn forward(&self, x: &Array2<f32>, operator: &CsrMatrix<f32>) -> Result<Array2<f32>> {
        let (_, pre) = self.pre_activation(x, operator)?;
        Ok(Activation::Relu.apply(&pre))
    }

    pub fn backward(
        &mut self,
        x: &Array2<f32>,
        operator: &CsrMatrix<f32>,
        grad_out: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        let (m, pre) = self.pre_activation(x, operator)?;
        let g_pre = Activation::Relu.backward(&pre, grad_out);
        let g_m = self.fc_neigh.backward(&m, &g_pre)?;
        operator.transpose_matmul_dense(&g_m)
    }
}

impl Parametrized for Dist2CycleLayer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.fc_neigh.visit_parameters(visitor);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.fc_neigh.visit_parameters_mut(visitor);
    }
}

/// [`Dist2CycleLayer`]s followed by a per-edge linear readout.
#[derive(Clone, Debug)]
pub struct Dist2Cycle {
    layers: Vec<Dist2CycleLayer>,
    readout: Linear,
}

impl Dist2Cycle {
    pub fn new(
        in_channels: usize,
        hidden_channels: usize,
        out_channels: usize,
        n_layers: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(n_layers);
        for l in 0..n_layers {
            let c_in = if l == 0 { in_channels } else { hidden_channels };
            layers.push(Dist2CycleLayer::new(c_in, hidden_channels, rng)?);
        }
        let last = if n_layers == 0 { in_channels } else { hidden_channels };
        let readout = Linear::new(
            "dist2cycle::readout",
            last,
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        Ok(Self { layers, readout })
    }

    fn embeddings(&self, input: &Dist2CycleInput) -> Result<Vec<Array2<f32>>> {
        let mut states = vec![input.x_1.clone()];
        for layer in &self.layers {
            let next = layer.forward(&states[states.len() - 1], &input.operator)?;
            states.push(next);
        }
        Ok(states)
    }
}

impl Parametrized for Dist2Cycle {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.layers.iter().for_each(|l| l.visit_parameters(visitor));
        self.readout.visit_parameters(visitor);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.layers
            .iter_mut()
            .for_each(|l| l.visit_parameters_mut(visitor));
        self.readout.visit_parameters_mut(visitor);
    }
}

impl Model for Dist2Cycle {
    type Input = Dist2CycleInput;

    fn forward(&self, input: &Dist2CycleInput) -> Result<Array2<f32>> {
        let states = self.embeddings(input)?;
        self.readout.forward(&states[states.len() - 1])
    }
}

impl Differentiable for Dist2Cycle {
    fn backward(&mut self, input: &Dist2CycleInput, grad_out: &Array2<f32>) -> Result<()> {
        let states = self.embeddings(input)?;
        let mut g = self.readout.backward(&states[states.len() - 1], grad_out)?;
        for (layer, x) in self.layers.iter_mut().zip(&states).rev() {
            g = layer.backward(x, &input.operator, &g)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SimplicialComplex;
    use rand::SeedableRng;

    fn input() -> Dist2CycleInput {
        // A filled triangle next to an empty square: one 1-cycle.
        let sc = SimplicialComplex::from_simplices([
            vec![0, 1, 2],
            vec![2, 3],
            vec![3, 4],
            vec![4, 5],
            vec![5, 2],
        ])
        .unwrap();
        let scale = [0.2f32, -0.1];
        let x_1 = Array2::from_shape_fn((7, 2), |(i, j)| (i as f32 + 1.0) * scale[j]);
        Dist2CycleInput::from_complex(&sc, x_1).unwrap()
    }

    #[test]
    fn operator_is_masked_by_lower_adjacency() {
        let inp = input();
        for (i, j, _) in inp.operator.triplets() {
            assert_ne!(i, j);
        }
        assert!(inp.operator.is_symmetric(1e-5));
    }

    #[test]
    fn rectifies_after_the_linear_map() {
        let mut rng = SmallRng::seed_from_u64(4);
        let layer = Dist2CycleLayer::new(2, 3, &mut rng).unwrap();
        let inp = input();
        let x = inp.x_1.mapv(|v| v - 0.5);
        let expected = Activation::Relu.apply(
            &layer
                .fc_neigh
                .forward(&inp.operator.matmul_dense(&x).unwrap())
                .unwrap(),
        );
        assert_eq!(layer.forward(&x, &inp.operator).unwrap(), expected);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut rng = SmallRng::seed_from_u64(21);
        let mut layer = Dist2CycleLayer::new(2, 3, &mut rng).unwrap();
        let inp = input();
        let upstream = Array2::from_shape_fn((7, 3), |(i, j)| ((i + j) % 3) as f32 - 0.5);
        let g = layer.backward(&inp.x_1, &inp.operator, &upstream).unwrap();
        let eps = 1e-3;
        for idx in [(0, 0), (3, 1), (6, 0)] {
            let f = |d: f32| {
                let mut x = inp.x_1.clone();
                x[idx] += d;
                (layer.forward(&x, &inp.operator).unwrap() * &upstream).sum()
            };
            let fd = (f(eps) - f(-eps)) / (2.0 * eps);
            assert!((fd - g[idx]).abs() < 1e-2, "{idx:?}: {fd} vs {}", g[idx]);
        }
    }

    #[test]
    fn model_shapes() {
        let mut rng = SmallRng::seed_from_u64(2);
        let model = Dist2Cycle::new(2, 4, 1, 2, &LayerConfig::default(), &mut rng).unwrap();
        assert_eq!(model.forward(&input()).unwrap().dim(), (7, 1));
        assert_eq!(model.num_parameters(), (2 * 4 + 4) + (4 * 4 + 4) + (4 + 1));
    }
}
