//! Simplicial convolution on ranks 0, 1 and 2.
//!
//! Each rank is convolved independently with its own (normalised) Hodge
//! Laplacian: `x_r' = relu(L_r x_r W_r)`.

use ndarray::Array2;
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::features::RankFeatures;
use crate::neighborhood::{NeighborhoodKind, Normalization, operator};
use crate::nn::base::activation::Activation;
use crate::nn::base::conv::Conv;
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::Complex;
use crate::train::{Differentiable, Model};

/// Features on ranks 0..=2 together with their Laplacians.
#[derive(Clone, Debug)]
pub struct Scn2Input {
    pub x: [Array2<f32>; 3],
    pub laplacians: [CsrMatrix<f32>; 3],
}

impl Scn2Input {
    /// Scaled Hodge Laplacians of ranks 0..=2 of `complex`.
    pub fn from_complex<C: Complex + ?Sized>(complex: &C, features: &RankFeatures) -> Result<Self> {
        features.check_against(&complex.shape())?;
        let lap = |r| {
            operator(
                complex,
                NeighborhoodKind::HodgeLaplacian,
                r,
                Normalization::Scaled,
            )
        };
        Ok(Self {
            x: [
                features.require(0)?.clone(),
                features.require(1)?.clone(),
                features.require(2)?.clone(),
            ],
            laplacians: [lap(0)?, lap(1)?, lap(2)?],
        })
    }
}

#[derive(Clone, Debug)]
pub struct Scn2Layer {
    convs: [Conv; 3],
}

impl Scn2Layer {
    /// `channels[r]` is kept unchanged by the layer on rank `r`.
    pub fn new(channels: [usize; 3], cfg: &LayerConfig, rng: &mut SmallRng) -> Result<Self> {
        let opts = cfg.plain_conv_options(Activation::Relu);
        Ok(Self {
            convs: [
                Conv::new("scn2::rank0", channels[0], channels[0], opts, rng)?,
                Conv::new("scn2::rank1", channels[1], channels[1], opts, rng)?,
                Conv::new("scn2::rank2", channels[2], channels[2], opts, rng)?,
            ],
        })
    }

    pub fn forward(
        &self,
        x: &[Array2<f32>; 3],
        laplacians: &[CsrMatrix<f32>; 3],
    ) -> Result<[Array2<f32>; 3]> {
        Ok([
            self.convs[0].forward(&x[0], &laplacians[0], None)?,
            self.convs[1].forward(&x[1], &laplacians[1], None)?,
            self.convs[2].forward(&x[2], &laplacians[2], None)?,
        ])
    }

    pub fn backward(
        &mut self,
        x: &[Array2<f32>; 3],
        laplacians: &[CsrMatrix<f32>; 3],
        grad_out: &[Array2<f32>; 3],
    ) -> Result<[Array2<f32>; 3]> {
        let mut out = Vec::with_capacity(3);
        for (r, conv) in self.convs.iter_mut().enumerate() {
            out.push(conv.backward(&x[r], &laplacians[r], None, &grad_out[r])?.source);
        }
        into_triple(out)
    }
}

pub(crate) fn into_triple(v: Vec<Array2<f32>>) -> Result<[Array2<f32>; 3]> {
    let n = v.len();
    v.try_into().map_err(|_| TopoModelError::ShapeMismatch {
        op: "rank triple",
        left: (n, 1),
        right: (3, 1),
    })
}

impl Parametrized for Scn2Layer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.convs.iter().for_each(|c| c.visit_parameters(visitor));
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.convs
            .iter_mut()
            .for_each(|c| c.visit_parameters_mut(visitor));
    }
}

/// Stack of [`Scn2Layer`]s with a linear readout on one rank.
#[derive(Clone, Debug)]
pub struct Scn2 {
    layers: Vec<Scn2Layer>,
    readout_rank: usize,
    readout: Linear,
}

impl Scn2 {
    pub fn new(
        channels: [usize; 3],
        n_layers: usize,
        readout_rank: usize,
        out_channels: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        if readout_rank > 2 {
            return Err(TopoModelError::RankOutOfRange {
                rank: readout_rank,
                max: 2,
            });
        }
        let layers = (0..n_layers)
            .map(|_| Scn2Layer::new(channels, cfg, rng))
            .collect::<Result<Vec<_>>>()?;
        let readout = Linear::new(
            "scn2::readout",
            channels[readout_rank],
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        Ok(Self {
            layers,
            readout_rank,
            readout,
        })
    }

    /// Inputs of every layer followed by the final embedding.
    fn embeddings(&self, input: &Scn2Input) -> Result<Vec<[Array2<f32>; 3]>> {
        let mut states = vec![input.x.clone()];
        for layer in &self.layers {
            let next = layer.forward(&states[states.len() - 1], &input.laplacians)?;
            states.push(next);
        }
        Ok(states)
    }
}

impl Parametrized for Scn2 {
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

impl Model for Scn2 {
    type Input = Scn2Input;

    fn forward(&self, input: &Scn2Input) -> Result<Array2<f32>> {
        let states = self.embeddings(input)?;
        let last = &states[states.len() - 1];
        self.readout.forward(&last[self.readout_rank])
    }
}

impl Differentiable for Scn2 {
    fn backward(&mut self, input: &Scn2Input, grad_out: &Array2<f32>) -> Result<()> {
        let states = self.embeddings(input)?;
        let last = &states[states.len() - 1];
        let r = self.readout_rank;
        let mut grads = [
            Array2::zeros(last[0].dim()),
            Array2::zeros(last[1].dim()),
            Array2::zeros(last[2].dim()),
        ];
        grads[r] = self.readout.backward(&last[r], grad_out)?;
        for (layer, x) in self.layers.iter_mut().zip(&states).rev() {
            grads = layer.backward(x, &input.laplacians, &grads)?;
        }
        Ok(())
    }
}
