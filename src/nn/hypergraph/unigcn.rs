//! UniGCN: graph convolution lifted to hypergraphs.
//!
//! ```text
//! x1  = D_e⁻¹ Bᵀ x0          (hyperedge = mean of its nodes)
//! x0' = D_v⁻¹ B x1 W         (node = mean of its hyperedges, then W)
//! ```

use ndarray::Array2;
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::nn::base::activation::Activation;
use crate::nn::base::conv::{Conv, ConvOptions};
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::Hypergraph;
use crate::train::{Differentiable, Model};

#[derive(Clone, Debug)]
pub struct UniGcnInput {
    pub x_0: Array2<f32>,
    /// Nodes × hyperedges.
    pub incidence_1: CsrMatrix<f32>,
    pub incidence_1_t: CsrMatrix<f32>,
}

impl UniGcnInput {
    pub fn from_hypergraph(hg: &Hypergraph, x_0: Array2<f32>) -> Result<Self> {
        if x_0.nrows() != hg.n_nodes() {
            return Err(TopoModelError::ShapeMismatch {
                op: "unigcn features",
                left: x_0.dim(),
                right: (hg.n_nodes(), x_0.ncols()),
            });
        }
        let incidence_1 = hg.incidence()?;
        Ok(Self {
            x_0,
            incidence_1_t: incidence_1.transpose(),
            incidence_1,
        })
    }
}

#[derive(Clone, Debug)]
pub struct UniGcnLayer {
    conv_level1_0_to_1: Conv,
    conv_level2_1_to_0: Conv,
}

impl UniGcnLayer {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let mean = ConvOptions {
            aggr_norm: true,
            with_linear_transform: false,
            ..cfg.plain_conv_options(Activation::Identity)
        };
        let project = ConvOptions {
            aggr_norm: true,
            ..cfg.plain_conv_options(Activation::Identity)
        };
        Ok(Self {
            conv_level1_0_to_1: Conv::new("unigcn::level1", in_channels, in_channels, mean, rng)?,
            conv_level2_1_to_0: Conv::new("unigcn::level2", in_channels, out_channels, project, rng)?,
        })
    }

    /// Returns `(x0', x1)`.
    pub fn forward(
        &self,
        x_0: &Array2<f32>,
        input: &UniGcnInput,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        let x_1 = self
            .conv_level1_0_to_1
            .forward(x_0, &input.incidence_1_t, None)?;
        let x_0 = self
            .conv_level2_1_to_0
            .forward(&x_1, &input.incidence_1, None)?;
        Ok((x_0, x_1))
    }

    /// Back-propagate a gradient on `x0'`; returns the gradient on `x0`.
    pub fn backward(
        &mut self,
        x_0: &Array2<f32>,
        input: &UniGcnInput,
        grad_x0: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        let x_1 = self
            .conv_level1_0_to_1
            .forward(x_0, &input.incidence_1_t, None)?;
        let g_x1 = self
            .conv_level2_1_to_0
            .backward(&x_1, &input.incidence_1, None, grad_x0)?
            .source;
        Ok(self
            .conv_level1_0_to_1
            .backward(x_0, &input.incidence_1_t, None, &g_x1)?
            .source)
    }
}

impl Parametrized for UniGcnLayer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.conv_level1_0_to_1.visit_parameters(visitor);
        self.conv_level2_1_to_0.visit_parameters(visitor);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.conv_level1_0_to_1.visit_parameters_mut(visitor);
        self.conv_level2_1_to_0.visit_parameters_mut(visitor);
    }
}

/// UniGCN layers with ReLU in between and a node-level linear readout.
#[derive(Clone, Debug)]
pub struct UniGcn {
    layers: Vec<UniGcnLayer>,
    readout: Linear,
}

impl UniGcn {
    pub fn new(
        in_channels: usize,
        hidden_channels: usize,
        out_channels: usize,
        n_layers: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        if n_layers == 0 {
            return Err(TopoModelError::InvalidConfig("UniGCN needs at least one layer".into()));
        }
        let mut layers = Vec::with_capacity(n_layers);
        for l in 0..n_layers {
            let c_in = if l == 0 { in_channels } else { hidden_channels };
            layers.push(UniGcnLayer::new(c_in, hidden_channels, cfg, rng)?);
        }
        let readout = Linear::new(
            "unigcn::readout",
            hidden_channels,
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        Ok(Self { layers, readout })
    }

    /// `states[l]` is the input of layer `l`; `pre[l]` its output before ReLU.
    fn embeddings(&self, input: &UniGcnInput) -> Result<(Vec<Array2<f32>>, Vec<Array2<f32>>)> {
        let mut states = vec![input.x_0.clone()];
        let mut pre = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (x0, _) = layer.forward(&states[states.len() - 1], input)?;
            states.push(Activation::Relu.apply(&x0));
            pre.push(x0);
        }
        Ok((states, pre))
    }
}

impl Parametrized for UniGcn {
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

impl Model for UniGcn {
    type Input = UniGcnInput;

    fn forward(&self, input: &UniGcnInput) -> Result<Array2<f32>> {
        let (states, _) = self.embeddings(input)?;
        self.readout.forward(&states[states.len() - 1])
    }
}

impl Differentiable for UniGcn {
    fn backward(&mut self, input: &UniGcnInput, grad_out: &Array2<f32>) -> Result<()> {
        let (states, pre) = self.embeddings(input)?;
        let mut g = self.readout.backward(&states[states.len() - 1], grad_out)?;
        for ((layer, x), p) in self.layers.iter_mut().zip(&states).zip(&pre).rev() {
            let g_pre = Activation::Relu.backward(p, &g);
            g = layer.backward(x, input, &g_pre)?;
        }
        Ok(())
    }
}
