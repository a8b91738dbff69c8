//! CW network: edge update from upper neighbours and boundary vertices.
//!
//! ```text
//! m_up   = A1↑ x1 W_up            (edges sharing a 2-cell)
//! m_bdry = B1ᵀ x0 W_bdry          (the two endpoints of each edge)
//! x1'    = relu(Linear(m_up + m_bdry) + x1 W_skip)
//! ```
//!
//! Node features pass through unchanged so layers can be stacked.

use ndarray::Array2;
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::nn::base::activation::Activation;
use crate::nn::base::conv::Conv;
use crate::nn::base::init::init_matrix;
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::Complex;
use crate::train::Model;

#[derive(Clone, Debug)]
pub struct CwnInput {
    pub x_0: Array2<f32>,
    pub x_1: Array2<f32>,
    /// Upper adjacency of edges.
    pub adjacency_1: CsrMatrix<f32>,
    /// `B1ᵀ`, edges × nodes.
    pub incidence_1_t: CsrMatrix<f32>,
}

impl CwnInput {
    pub fn from_complex<C: Complex + ?Sized>(
        complex: &C,
        x_0: Array2<f32>,
        x_1: Array2<f32>,
    ) -> Result<Self> {
        Ok(Self {
            x_0,
            x_1,
            adjacency_1: complex.adjacency_matrix(1)?,
            incidence_1_t: complex.incidence_matrix(1, true)?.transpose(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct CwnLayer {
    conv_1_to_1: Conv,
    conv_0_to_1: Conv,
    update: Linear,
    skip: Parameter,
}

impl CwnLayer {
    pub fn new(
        in_channels_0: usize,
        in_channels_1: usize,
        out_channels: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let opts = cfg.plain_conv_options(Activation::Identity);
        let conv_1_to_1 = Conv::new("cwn::conv_1_to_1", in_channels_1, out_channels, opts, rng)?;
        let conv_0_to_1 = Conv::new("cwn::conv_0_to_1", in_channels_0, out_channels, opts, rng)?;
        let update = Linear::new(
            "cwn::update",
            out_channels,
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        let skip = init_matrix(in_channels_1, out_channels, cfg.init, cfg.gain, rng)?;
        Ok(Self {
            conv_1_to_1,
            conv_0_to_1,
            update,
            skip: Parameter::new("cwn::skip", skip),
        })
    }

    pub fn forward(
        &self,
        x_0: &Array2<f32>,
        x_1: &Array2<f32>,
        input: &CwnInput,
    ) -> Result<Array2<f32>> {
        if x_1.ncols() != self.skip.value().nrows() {
            return Err(TopoModelError::ShapeMismatch {
                op: "cwn skip",
                left: x_1.dim(),
                right: self.skip.value().dim(),
            });
        }
        let m_up = self.conv_1_to_1.forward(x_1, &input.adjacency_1, None)?;
        let m_bdry = self.conv_0_to_1.forward(x_0, &input.incidence_1_t, None)?;
        let mixed = self.update.forward(&(m_up + m_bdry))?;
        Ok(Activation::Relu.apply(&(mixed + x_1.dot(self.skip.value()))))
    }
}

impl Parametrized for CwnLayer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.conv_1_to_1.visit_parameters(visitor);
        self.conv_0_to_1.visit_parameters(visitor);
        self.update.visit_parameters(visitor);
        visitor(&self.skip);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.conv_1_to_1.visit_parameters_mut(visitor);
        self.conv_0_to_1.visit_parameters_mut(visitor);
        self.update.visit_parameters_mut(visitor);
        visitor(&mut self.skip);
    }
}

/// Stacked [`CwnLayer`]s with an edge-level linear readout.
#[derive(Clone, Debug)]
pub struct Cwn {
    layers: Vec<CwnLayer>,
    readout: Linear,
}

impl Cwn {
    pub fn new(
        in_channels_0: usize,
        in_channels_1: usize,
        hidden_channels: usize,
        out_channels: usize,
        n_layers: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        if n_layers == 0 {
            return Err(TopoModelError::InvalidConfig("CWN needs at least one layer".into()));
        }
        let mut layers = Vec::with_capacity(n_layers);
        for l in 0..n_layers {
            let c1 = if l == 0 { in_channels_1 } else { hidden_channels };
            layers.push(CwnLayer::new(in_channels_0, c1, hidden_channels, cfg, rng)?);
        }
        let readout = Linear::new(
            "cwn::readout",
            hidden_channels,
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        Ok(Self { layers, readout })
    }
}

impl Parametrized for Cwn {
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

impl Model for Cwn {
    type Input = CwnInput;

    fn forward(&self, input: &CwnInput) -> Result<Array2<f32>> {
        let mut x_1 = input.x_1.clone();
        for layer in &self.layers {
            x_1 = layer.forward(&input.x_0, &x_1, input)?;
        }
        self.readout.forward(&x_1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::CellComplex;
    use rand::SeedableRng;

    fn input() -> CwnInput {
        let cx = CellComplex::from_parts(
            [(0, 1), (1, 2), (2, 0), (2, 3)],
            [vec![0, 1, 2]],
        )
        .unwrap();
        CwnInput::from_complex(
            &cx,
            Array2::from_shape_fn((4, 2), |(i, _)| i as f32),
            Array2::from_shape_fn((4, 3), |(i, j)| 0.1 * (i * j) as f32),
        )
        .unwrap()
    }

    #[test]
    fn dangling_edge_has_no_upper_neighbours() {
        let inp = input();
        // edge (2, 3) is not on the triangle
        assert_eq!(inp.adjacency_1.row(3).count(), 0);
        assert_eq!(inp.adjacency_1.row(0).count(), 2);
    }

    #[test]
    fn layer_and_model() {
        let mut rng = SmallRng::seed_from_u64(6);
        let cfg = LayerConfig::default();
        let inp = input();
        let layer = CwnLayer::new(2, 3, 5, &cfg, &mut rng).unwrap();
        let y = layer.forward(&inp.x_0, &inp.x_1, &inp).unwrap();
        assert_eq!(y.dim(), (4, 5));
        assert!(y.iter().all(|v| *v >= 0.0));
        assert!(layer.forward(&inp.x_0, &inp.x_0, &inp).is_err());

        let model = Cwn::new(2, 3, 5, 2, 3, &cfg, &mut rng).unwrap();
        assert_eq!(model.forward(&inp).unwrap().dim(), (4, 2));
    }
}
