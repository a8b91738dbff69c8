//! Dynamic hypergraph convolution.
//!
//! Every forward pass infers a hypergraph from the incoming node features
//! (k-NN plus k-means hyperedges, see
//! [`dynamic_hypergraph`](crate::topology::dynamic_topology::dynamic_hypergraph)),
//! optionally merged with a static hypergraph, and then runs
//!
//! ```text
//! h   = x0 Θ + b
//! x1  = D_e⁻¹ Bᵀ h
//! x0' = relu(B x1)
//! ```
//!
//! The inferred topology is treated as a constant by the backward pass.

use ndarray::{Array2, Axis};
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::nn::base::activation::Activation;
use crate::nn::base::conv::{Conv, ConvOptions};
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::Hypergraph;
use crate::topology::dynamic_topology::dynamic_hypergraph;
use crate::train::{Differentiable, Model};

pub const DEFAULT_K_NEIGHBOURS: usize = 3;
pub const DEFAULT_K_CENTROIDS: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct DhgcnInput {
    pub x_0: Array2<f32>,
    /// Hyperedges known up front, merged into every inferred hypergraph.
    pub static_hypergraph: Option<Hypergraph>,
}

impl DhgcnInput {
    pub fn new(x_0: Array2<f32>) -> Self {
        Self {
            x_0,
            static_hypergraph: None,
        }
    }

    pub fn with_static(mut self, hg: Hypergraph) -> Self {
        self.static_hypergraph = Some(hg);
        self
    }
}

#[derive(Clone, Debug)]
pub struct DhgcnLayer {
    fc_layer: Linear,
    conv_dhst_0_to_1: Conv,
    conv_dhst_1_to_0: Conv,
    k_neighbours: usize,
    k_centroids: usize,
}

struct Topology {
    incidence: CsrMatrix<f32>,
    incidence_t: CsrMatrix<f32>,
}

impl DhgcnLayer {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        k_neighbours: usize,
        k_centroids: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let fc_layer = Linear::new(
            "dhgcn::fc",
            in_channels,
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        let mean = ConvOptions {
            aggr_norm: true,
            with_linear_transform: false,
            ..ConvOptions::default()
        };
        let scatter = ConvOptions {
            with_linear_transform: false,
            update: Activation::Relu,
            ..ConvOptions::default()
        };
        Ok(Self {
            fc_layer,
            conv_dhst_0_to_1: Conv::new("dhgcn::0_to_1", out_channels, out_channels, mean, rng)?,
            conv_dhst_1_to_0: Conv::new("dhgcn::1_to_0", out_channels, out_channels, scatter, rng)?,
            k_neighbours,
            k_centroids,
        })
    }

    fn topology(&self, x_0: &Array2<f32>, static_hg: Option<&Hypergraph>) -> Result<Topology> {
        let mut hg = dynamic_hypergraph(x_0, self.k_neighbours, self.k_centroids)?;
        if let Some(st) = static_hg {
            hg.extend(st)?;
        }
        let incidence = hg.incidence()?;
        Ok(Topology {
            incidence_t: incidence.transpose(),
            incidence,
        })
    }

    /// Returns `(x0', x1)`; `x1` lives on the inferred hyperedges.
    pub fn forward(
        &self,
        x_0: &Array2<f32>,
        static_hg: Option<&Hypergraph>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        let topo = self.topology(x_0, static_hg)?;
        let h = self.fc_layer.forward(x_0)?;
        let x_1 = self.conv_dhst_0_to_1.forward(&h, &topo.incidence_t, None)?;
        let x_0 = self.conv_dhst_1_to_0.forward(&x_1, &topo.incidence, None)?;
        Ok((x_0, x_1))
    }

    pub fn backward(
        &mut self,
        x_0: &Array2<f32>,
        static_hg: Option<&Hypergraph>,
        grad_x0: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        let topo = self.topology(x_0, static_hg)?;
        let h = self.fc_layer.forward(x_0)?;
        let x_1 = self.conv_dhst_0_to_1.forward(&h, &topo.incidence_t, None)?;
        let g_x1 = self
            .conv_dhst_1_to_0
            .backward(&x_1, &topo.incidence, None, grad_x0)?
            .source;
        let g_h = self
            .conv_dhst_0_to_1
            .backward(&h, &topo.incidence_t, None, &g_x1)?
            .source;
        self.fc_layer.backward(x_0, &g_h)
    }
}

impl Parametrized for DhgcnLayer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.fc_layer.visit_parameters(visitor);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.fc_layer.visit_parameters_mut(visitor);
    }
}

/// Graph-level DHGCN: `n_layers` layers of constant width, a linear map to
/// one channel and mean pooling over nodes. The output is a `1 × 1` matrix.
#[derive(Clone, Debug)]
pub struct Dhgcn {
    layers: Vec<DhgcnLayer>,
    linear: Linear,
}

impl Dhgcn {
    pub fn new(
        channels_node: usize,
        n_layers: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        let layers = (0..n_layers)
            .map(|_| {
                DhgcnLayer::new(
                    channels_node,
                    channels_node,
                    DEFAULT_K_NEIGHBOURS,
                    DEFAULT_K_CENTROIDS,
                    cfg,
                    rng,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let linear = Linear::new("dhgcn::linear", channels_node, 1, true, cfg.init, cfg.gain, rng)?;
        Ok(Self { layers, linear })
    }

    fn embeddings(&self, input: &DhgcnInput) -> Result<Vec<Array2<f32>>> {
        let static_hg = input.static_hypergraph.as_ref();
        let mut states = vec![input.x_0.clone()];
        for layer in &self.layers {
            let (x0, _) = layer.forward(&states[states.len() - 1], static_hg)?;
            states.push(x0);
        }
        Ok(states)
    }
}

impl Parametrized for Dhgcn {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.layers.iter().for_each(|l| l.visit_parameters(visitor));
        self.linear.visit_parameters(visitor);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.layers
            .iter_mut()
            .for_each(|l| l.visit_parameters_mut(visitor));
        self.linear.visit_parameters_mut(visitor);
    }
}

impl Model for Dhgcn {
    type Input = DhgcnInput;

    fn forward(&self, input: &DhgcnInput) -> Result<Array2<f32>> {
        let states = self.embeddings(input)?;
        let y = self.linear.forward(&states[states.len() - 1])?;
        let pooled = y
            .mean_axis(Axis(0))
            .ok_or(TopoModelError::EmptyInput("node features"))?;
        Ok(pooled.insert_axis(Axis(0)))
    }
}

impl Differentiable for Dhgcn {
    fn backward(&mut self, input: &DhgcnInput, grad_out: &Array2<f32>) -> Result<()> {
        if grad_out.dim() != (1, 1) {
            return Err(TopoModelError::ShapeMismatch {
                op: "dhgcn backward",
                left: grad_out.dim(),
                right: (1, 1),
            });
        }
        let states = self.embeddings(input)?;
        let last = &states[states.len() - 1];
        let g_y = Array2::from_elem((last.nrows(), 1), grad_out[[0, 0]] / last.nrows() as f32);
        let mut g = self.linear.backward(last, &g_y)?;
        let static_hg = input.static_hypergraph.as_ref();
        for (layer, x) in self.layers.iter_mut().zip(&states).rev() {
            g = layer.backward(x, static_hg, &g)?;
        }
        Ok(())
    }
}
