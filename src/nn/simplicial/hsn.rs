//! Simplicial high-skip network on nodes and edges.
//!
//! One layer exchanges information between nodes and edges in two levels:
//!
//! ```text
//! level 1:  x0_1 = σ(A0 x0 W00)        x1_1 = σ(B1ᵀ x0 W01)
//! level 2:  x0_2 = A0 x0_1 W'00        x1_2 = B1 x1_1 W'10
//! output:   x0'  = σ(x0_2 + x1_2)
//! ```
//!
//! with `σ` the sigmoid. Channels are preserved.

use ndarray::Array2;
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::nn::base::activation::Activation;
use crate::nn::base::aggregation::{AggrFunc, Aggregation};
use crate::nn::base::conv::Conv;
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::Result;
use crate::topology::Complex;
use crate::train::{Differentiable, Model};

#[derive(Clone, Debug)]
pub struct HsnInput {
    pub x_0: Array2<f32>,
    pub adjacency_0: CsrMatrix<f32>,
    /// Signed `B_1`, nodes × edges.
    pub incidence_1: CsrMatrix<f32>,
    pub incidence_1_t: CsrMatrix<f32>,
}

impl HsnInput {
    pub fn from_complex<C: Complex + ?Sized>(complex: &C, x_0: Array2<f32>) -> Result<Self> {
        let incidence_1 = complex.incidence_matrix(1, true)?;
        Ok(Self {
            x_0,
            adjacency_0: complex.adjacency_matrix(0)?,
            incidence_1_t: incidence_1.transpose(),
            incidence_1,
        })
    }
}

#[derive(Clone, Debug)]
pub struct HsnLayer {
    level1_0_to_0: Conv,
    level1_0_to_1: Conv,
    level2_0_to_0: Conv,
    level2_1_to_0: Conv,
    aggr_on_nodes: Aggregation,
}

struct HsnTrace {
    x0_1: Array2<f32>,
    x1_1: Array2<f32>,
    x0_2: Array2<f32>,
    x1_2: Array2<f32>,
}

impl HsnLayer {
    pub fn new(channels: usize, cfg: &LayerConfig, rng: &mut SmallRng) -> Result<Self> {
        let sig = cfg.plain_conv_options(Activation::Sigmoid);
        let lin = cfg.plain_conv_options(Activation::Identity);
        Ok(Self {
            level1_0_to_0: Conv::new("hsn::level1_0_to_0", channels, channels, sig, rng)?,
            level1_0_to_1: Conv::new("hsn::level1_0_to_1", channels, channels, sig, rng)?,
            level2_0_to_0: Conv::new("hsn::level2_0_to_0", channels, channels, lin, rng)?,
            level2_1_to_0: Conv::new("hsn::level2_1_to_0", channels, channels, lin, rng)?,
            aggr_on_nodes: Aggregation::new(AggrFunc::Sum, Activation::Sigmoid),
        })
    }

    fn trace(&self, x_0: &Array2<f32>, input: &HsnInput) -> Result<HsnTrace> {
        let x0_1 = self.level1_0_to_0.forward(x_0, &input.adjacency_0, None)?;
        let x1_1 = self.level1_0_to_1.forward(x_0, &input.incidence_1_t, None)?;
        let x0_2 = self.level2_0_to_0.forward(&x0_1, &input.adjacency_0, None)?;
        let x1_2 = self.level2_1_to_0.forward(&x1_1, &input.incidence_1, None)?;
        Ok(HsnTrace {
            x0_1,
            x1_1,
            x0_2,
            x1_2,
        })
    }

    /// Node features after one layer; the neighborhoods come from `input`.
    pub fn forward(&self, x_0: &Array2<f32>, input: &HsnInput) -> Result<Array2<f32>> {
        let t = self.trace(x_0, input)?;
        self.aggr_on_nodes.forward(&[&t.x0_2, &t.x1_2])
    }

    pub fn backward(
        &mut self,
        x_0: &Array2<f32>,
        input: &HsnInput,
        grad_out: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        let t = self.trace(x_0, input)?;
        let g = self.aggr_on_nodes.backward(&[&t.x0_2, &t.x1_2], grad_out)?;
        let g_x0_1 = self
            .level2_0_to_0
            .backward(&t.x0_1, &input.adjacency_0, None, &g[0])?
            .source;
        let g_x1_1 = self
            .level2_1_to_0
            .backward(&t.x1_1, &input.incidence_1, None, &g[1])?
            .source;
        let mut g_x0 = self
            .level1_0_to_0
            .backward(x_0, &input.adjacency_0, None, &g_x0_1)?
            .source;
        g_x0 += &self
            .level1_0_to_1
            .backward(x_0, &input.incidence_1_t, None, &g_x1_1)?
            .source;
        Ok(g_x0)
    }

    fn convs(&self) -> [&Conv; 4] {
        [
            &self.level1_0_to_0,
            &self.level1_0_to_1,
            &self.level2_0_to_0,
            &self.level2_1_to_0,
        ]
    }
}

impl Parametrized for HsnLayer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        for c in self.convs() {
            c.visit_parameters(visitor);
        }
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        for c in [
            &mut self.level1_0_to_0,
            &mut self.level1_0_to_1,
            &mut self.level2_0_to_0,
            &mut self.level2_1_to_0,
        ] {
            c.visit_parameters_mut(visitor);
        }
    }
}

/// Stacked [`HsnLayer`]s with a node-level linear readout.
#[derive(Clone, Debug)]
pub struct Hsn {
    layers: Vec<HsnLayer>,
    readout: Linear,
}

impl Hsn {
    pub fn new(
        channels: usize,
        n_layers: usize,
        out_channels: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let layers = (0..n_layers)
            .map(|_| HsnLayer::new(channels, cfg, rng))
            .collect::<Result<Vec<_>>>()?;
        let readout = Linear::new(
            "hsn::readout",
            channels,
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        Ok(Self { layers, readout })
    }

    fn embeddings(&self, input: &HsnInput) -> Result<Vec<Array2<f32>>> {
        let mut states = vec![input.x_0.clone()];
        for layer in &self.layers {
            let next = layer.forward(&states[states.len() - 1], input)?;
            states.push(next);
        }
        Ok(states)
    }
}

impl Parametrized for Hsn {
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

impl Model for Hsn {
    type Input = HsnInput;

    fn forward(&self, input: &HsnInput) -> Result<Array2<f32>> {
        let states = self.embeddings(input)?;
        self.readout.forward(&states[states.len() - 1])
    }
}

impl Differentiable for Hsn {
    fn backward(&mut self, input: &HsnInput, grad_out: &Array2<f32>) -> Result<()> {
        let states = self.embeddings(input)?;
        let mut g = self.readout.backward(&states[states.len() - 1], grad_out)?;
        for (layer, x) in self.layers.iter_mut().zip(&states).rev() {
            g = layer.backward(x, input, &g)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SimplicialComplex;
    use rand::SeedableRng;

    fn input() -> HsnInput {
        let sc = SimplicialComplex::from_simplices([vec![0, 1, 2], vec![2, 3], vec![3, 4]])
            .unwrap();
        let x_0 = Array2::from_shape_fn((5, 3), |(i, j)| ((i + 2 * j) as f32).cos());
        HsnInput::from_complex(&sc, x_0).unwrap()
    }

    #[test]
    fn layer_output_is_a_sigmoid() {
        let mut rng = SmallRng::seed_from_u64(4);
        let layer = HsnLayer::new(3, &LayerConfig::default(), &mut rng).unwrap();
        let inp = input();
        let y = layer.forward(&inp.x_0, &inp).unwrap();
        assert_eq!(y.dim(), (5, 3));
        assert!(y.iter().all(|v| *v > 0.0 && *v < 1.0));
        assert_eq!(layer.num_parameters(), 4 * 9);
    }

    #[test]
    fn layer_input_gradient_matches_finite_differences() {
        let mut rng = SmallRng::seed_from_u64(8);
        let mut layer = HsnLayer::new(3, &LayerConfig::default(), &mut rng).unwrap();
        let inp = input();
        let upstream = Array2::from_shape_fn((5, 3), |(i, j)| (i as f32 - j as f32) * 0.3);
        let g = layer.backward(&inp.x_0, &inp, &upstream).unwrap();
        let eps = 1e-2;
        for idx in [(0, 0), (2, 1), (4, 2)] {
            let f = |d: f32| {
                let mut x = inp.x_0.clone();
                x[idx] += d;
                (layer.forward(&x, &inp).unwrap() * &upstream).sum()
            };
            let fd = (f(eps) - f(-eps)) / (2.0 * eps);
            assert!((fd - g[idx]).abs() < 1e-2, "{idx:?}: {fd} vs {}", g[idx]);
        }
    }

    #[test]
    fn model_output_shape() {
        let mut rng = SmallRng::seed_from_u64(4);
        let model = Hsn::new(3, 2, 2, &LayerConfig::default(), &mut rng).unwrap();
        assert_eq!(model.forward(&input()).unwrap().dim(), (5, 2));
    }
}
