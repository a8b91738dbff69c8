//! Simplicial attention network.
//!
//! A [`SanLayer`] combines three convolutions on the same rank:
//!
//! * an attentional convolution over the lower Laplacian `L↓`,
//! * an attentional convolution over the upper Laplacian `L↑`,
//! * a plain convolution over the harmonic projection `P = I - εL`.
//!
//! and returns `relu(z↓ + z↑ + z_h)`. An attentional convolution of order
//! `p` learns `W_0 … W_{p-1}` and computes `Σ_k α^{k+1} x W_k`, where `α`
//! is the row-wise softmax of `leaky_relu([h_i ‖ h_j]·a)` over the sparsity
//! pattern of the Laplacian and `h = x W_0`.

use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::neighborhood::{NeighborhoodKind, harmonic_projection};
use crate::nn::base::activation::Activation;
use crate::nn::base::conv::Conv;
use crate::nn::base::init::init_matrix;
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::Complex;
use crate::train::Model;

/// Negative slope of the attention nonlinearity.
const ATTENTION_SLOPE: f32 = 0.2;

/// Default `ε` of the harmonic projection `I - εL`.
pub const DEFAULT_HARMONIC_EPSILON: f32 = 0.1;

#[derive(Clone, Debug)]
pub struct SanInput {
    pub x: Array2<f32>,
    pub laplacian_up: CsrMatrix<f32>,
    pub laplacian_down: CsrMatrix<f32>,
    pub projection: CsrMatrix<f32>,
}

impl SanInput {
    /// Laplacians of `rank` and the harmonic projection of their sum.
    pub fn from_complex<C: Complex + ?Sized>(
        complex: &C,
        rank: usize,
        x: Array2<f32>,
        epsilon: f32,
    ) -> Result<Self> {
        let laplacian_up = complex.neighborhood(NeighborhoodKind::UpLaplacian, rank)?;
        let laplacian_down = complex.neighborhood(NeighborhoodKind::DownLaplacian, rank)?;
        let projection = harmonic_projection(&laplacian_up.add(&laplacian_down)?, epsilon)?;
        Ok(Self {
            x,
            laplacian_up,
            laplacian_down,
            projection,
        })
    }
}

/// Attentional convolution with a power series of attention matrices.
#[derive(Clone, Debug)]
pub struct SanConv {
    out_channels: usize,
    weights: Vec<Parameter>,
    att_weight: Parameter,
}

impl SanConv {
    pub fn new(
        name: &str,
        in_channels: usize,
        out_channels: usize,
        n_filters: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        if n_filters == 0 {
            return Err(TopoModelError::InvalidConfig(format!(
                "{name}: n_filters must be at least 1"
            )));
        }
        let weights = (0..n_filters)
            .map(|k| {
                init_matrix(in_channels, out_channels, cfg.init, cfg.gain, rng)
                    .map(|w| Parameter::new(format!("{name}::weight{k}"), w))
            })
            .collect::<Result<Vec<_>>>()?;
        let att = init_matrix(2 * out_channels, 1, cfg.init, cfg.gain, rng)?;
        Ok(Self {
            out_channels,
            weights,
            att_weight: Parameter::new(format!("{name}::att_weight"), att),
        })
    }

    pub fn n_filters(&self) -> usize {
        self.weights.len()
    }

    /// Row-stochastic attention on the pattern of `nbhd`.
    pub fn attention(&self, h: &Array2<f32>, nbhd: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
        let a = self.att_weight.value();
        let a_i: Array1<f32> = a.column(0).iter().take(self.out_channels).copied().collect();
        let a_j: Array1<f32> = a.column(0).iter().skip(self.out_channels).copied().collect();
        let s_i = h.dot(&a_i);
        let s_j = h.dot(&a_j);
        let act = Activation::LeakyRelu(ATTENTION_SLOPE);
        let mut values = Vec::with_capacity(nbhd.nnz());
        for i in 0..nbhd.nrows() {
            let scores: Vec<f32> = nbhd.row(i).map(|(j, _)| act.scalar(s_i[i] + s_j[j])).collect();
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
            let sum: f32 = exps.iter().sum();
            values.extend(exps.into_iter().map(|e| e / sum));
        }
        nbhd.with_values(values)
    }

    pub fn forward(&self, x: &Array2<f32>, nbhd: &CsrMatrix<f32>) -> Result<Array2<f32>> {
        if !nbhd.is_square() || nbhd.nrows() != x.nrows() {
            return Err(TopoModelError::ShapeMismatch {
                op: "san conv",
                left: nbhd.shape(),
                right: x.dim(),
            });
        }
        let h: Vec<Array2<f32>> = self
            .weights
            .iter()
            .map(|w| {
                if x.ncols() != w.value().nrows() {
                    return Err(TopoModelError::ShapeMismatch {
                        op: "san conv channels",
                        left: x.dim(),
                        right: w.value().dim(),
                    });
                }
                Ok(x.dot(w.value()))
            })
            .collect::<Result<_>>()?;
        let alpha = self.attention(&h[0], nbhd)?;
        // Horner: α(h_0 + α(h_1 + …)) = Σ_k α^{k+1} h_k
        let mut acc = Array2::<f32>::zeros((x.nrows(), self.out_channels));
        for hk in h.iter().rev() {
            acc = alpha.matmul_dense(&(hk + &acc))?;
        }
        Ok(acc)
    }
}

impl Parametrized for SanConv {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.weights.iter().for_each(|w| visitor(w));
        visitor(&self.att_weight);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.weights.iter_mut().for_each(|w| visitor(w));
        visitor(&mut self.att_weight);
    }
}

#[derive(Clone, Debug)]
pub struct SanLayer {
    conv_down: SanConv,
    conv_up: SanConv,
    conv_harmonic: Conv,
}

impl SanLayer {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        n_filters: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        Ok(Self {
            conv_down: SanConv::new("san::down", in_channels, out_channels, n_filters, cfg, rng)?,
            conv_up: SanConv::new("san::up", in_channels, out_channels, n_filters, cfg, rng)?,
            conv_harmonic: Conv::new(
                "san::harmonic",
                in_channels,
                out_channels,
                cfg.plain_conv_options(Activation::Identity),
                rng,
            )?,
        })
    }

    pub fn forward(&self, x: &Array2<f32>, input: &SanInput) -> Result<Array2<f32>> {
        let z_down = self.conv_down.forward(x, &input.laplacian_down)?;
        let z_up = self.conv_up.forward(x, &input.laplacian_up)?;
        let z_har = self.conv_harmonic.forward(x, &input.projection, None)?;
        Ok(Activation::Relu.apply(&(z_down + z_up + z_har)))
    }
}

impl Parametrized for SanLayer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.conv_down.visit_parameters(visitor);
        self.conv_up.visit_parameters(visitor);
        self.conv_harmonic.visit_parameters(visitor);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.conv_down.visit_parameters_mut(visitor);
        self.conv_up.visit_parameters_mut(visitor);
        self.conv_harmonic.visit_parameters_mut(visitor);
    }
}

/// `n_layers` [`SanLayer`]s (`in → hidden → … → hidden`) and a linear readout.
#[derive(Clone, Debug)]
pub struct San {
    layers: Vec<SanLayer>,
    readout: Linear,
}

impl San {
    pub fn new(
        in_channels: usize,
        hidden_channels: usize,
        out_channels: usize,
        n_filters: usize,
        n_layers: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        if n_layers == 0 {
            return Err(TopoModelError::InvalidConfig("SAN needs at least one layer".into()));
        }
        let mut layers = Vec::with_capacity(n_layers);
        for l in 0..n_layers {
            let c_in = if l == 0 { in_channels } else { hidden_channels };
            layers.push(SanLayer::new(c_in, hidden_channels, n_filters, cfg, rng)?);
        }
        let readout = Linear::new(
            "san::readout",
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

impl Parametrized for San {
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

impl Model for San {
    type Input = SanInput;

    fn forward(&self, input: &SanInput) -> Result<Array2<f32>> {
        let mut x = input.x.clone();
        for layer in &self.layers {
            x = layer.forward(&x, input)?;
        }
        self.readout.forward(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SimplicialComplex;
    use rand::SeedableRng;

    fn input(channels: usize) -> SanInput {
        let sc = SimplicialComplex::from_simplices([vec![0, 1, 2], vec![1, 2, 3], vec![3, 4]])
            .unwrap();
        let x = Array2::from_shape_fn((6, channels), |(i, j)| ((i * 3 + j) as f32 * 0.7).sin());
        SanInput::from_complex(&sc, 1, x, DEFAULT_HARMONIC_EPSILON).unwrap()
    }

    #[test]
    fn attention_rows_are_stochastic() {
        let mut rng = SmallRng::seed_from_u64(0);
        let conv = SanConv::new("c", 2, 3, 2, &LayerConfig::default(), &mut rng).unwrap();
        let inp = input(2);
        let h = inp.x.dot(conv.weights[0].value());
        let alpha = conv.attention(&h, &inp.laplacian_down).unwrap();
        for (i, s) in alpha.row_sums().into_iter().enumerate() {
            if inp.laplacian_down.row(i).next().is_some() {
                assert!((s - 1.0).abs() < 1e-5);
            }
        }
        assert!(alpha.values().iter().all(|v| *v > 0.0));
    }

    #[test]
    fn single_filter_is_one_attention_hop() {
        let mut rng = SmallRng::seed_from_u64(3);
        let conv = SanConv::new("c", 2, 2, 1, &LayerConfig::default(), &mut rng).unwrap();
        let inp = input(2);
        let h = inp.x.dot(conv.weights[0].value());
        let alpha = conv.attention(&h, &inp.laplacian_up).unwrap();
        let expected = alpha.matmul_dense(&h).unwrap();
        let got = conv.forward(&inp.x, &inp.laplacian_up).unwrap();
        assert!((got - expected).iter().all(|d| d.abs() < 1e-5));
    }

    #[test]
    fn layer_and_model() {
        let mut rng = SmallRng::seed_from_u64(9);
        let cfg = LayerConfig::default();
        let layer = SanLayer::new(2, 4, 3, &cfg, &mut rng).unwrap();
        let inp = input(2);
        let y = layer.forward(&inp.x, &inp).unwrap();
        assert_eq!(y.dim(), (6, 4));
        assert!(y.iter().all(|v| *v >= 0.0));
        // 2 × (3 filters · 2·4 + 8·1) + 2·4
        assert_eq!(layer.num_parameters(), 2 * (3 * 8 + 8) + 8);

        let model = San::new(2, 4, 3, 2, 2, &cfg, &mut rng).unwrap();
        assert_eq!(model.forward(&inp).unwrap().dim(), (6, 3));
        assert!(SanConv::new("c", 2, 2, 0, &cfg, &mut rng).is_err());
    }
}
