//! Convolutional cell complex network.
//!
//! ```text
//! x0' = relu(A0 x0 W0)
//! x1' = relu(x1)
//! x2' = relu(B2ᵀ x1 W2)          (optionally attention-weighted, targets x2)
//! ```

use ndarray::{Array2, Axis};
use rand::rngs::SmallRng;

use crate::config::LayerConfig;
use crate::features::RankFeatures;
use crate::nn::base::activation::Activation;
use crate::nn::base::conv::Conv;
use crate::nn::base::linear::Linear;
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::Complex;
use crate::train::Model;

#[derive(Clone, Debug)]
pub struct CcxnInput {
    pub x: [Array2<f32>; 3],
    pub adjacency_0: CsrMatrix<f32>,
    /// `B2ᵀ`, faces × edges.
    pub incidence_2_t: CsrMatrix<f32>,
}

impl CcxnInput {
    pub fn from_complex<C: Complex + ?Sized>(complex: &C, features: &RankFeatures) -> Result<Self> {
        features.check_against(&complex.shape())?;
        Ok(Self {
            x: [
                features.require(0)?.clone(),
                features.require(1)?.clone(),
                features.require(2)?.clone(),
            ],
            adjacency_0: complex.adjacency_matrix(0)?,
            incidence_2_t: complex.incidence_matrix(2, true)?.transpose(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct CcxnLayer {
    conv_0_to_0: Conv,
    conv_1_to_2: Conv,
}

impl CcxnLayer {
    /// Node channels are preserved; edge features move to `in_channels_2`
    /// channels on faces. With attention, `x2` is projected by the edge
    /// weight, so it must carry `in_channels_1` channels.
    pub fn new(
        in_channels_0: usize,
        in_channels_1: usize,
        in_channels_2: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        Ok(Self {
            conv_0_to_0: Conv::new(
                "ccxn::conv_0_to_0",
                in_channels_0,
                in_channels_0,
                cfg.conv_options(Activation::Relu),
                rng,
            )?,
            conv_1_to_2: Conv::new(
                "ccxn::conv_1_to_2",
                in_channels_1,
                in_channels_2,
                cfg.conv_options(Activation::Relu),
                rng,
            )?,
        })
    }

    pub fn forward(&self, x: &[Array2<f32>; 3], input: &CcxnInput) -> Result<[Array2<f32>; 3]> {
        let target = self.conv_1_to_2.options().attention.then_some(&x[2]);
        Ok([
            self.conv_0_to_0.forward(&x[0], &input.adjacency_0, None)?,
            Activation::Relu.apply(&x[1]),
            self.conv_1_to_2.forward(&x[1], &input.incidence_2_t, target)?,
        ])
    }
}

impl Parametrized for CcxnLayer {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        self.conv_0_to_0.visit_parameters(visitor);
        self.conv_1_to_2.visit_parameters(visitor);
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        self.conv_0_to_0.visit_parameters_mut(visitor);
        self.conv_1_to_2.visit_parameters_mut(visitor);
    }
}

/// Stacked [`CcxnLayer`]s; the readout is applied to the mean-pooled face
/// embedding, giving one row per complex.
#[derive(Clone, Debug)]
pub struct Ccxn {
    layers: Vec<CcxnLayer>,
    readout: Linear,
}

impl Ccxn {
    pub fn new(
        in_channels_0: usize,
        in_channels_1: usize,
        in_channels_2: usize,
        out_channels: usize,
        n_layers: usize,
        cfg: &LayerConfig,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        if n_layers == 0 {
            return Err(TopoModelError::InvalidConfig("CCXN needs at least one layer".into()));
        }
        let layers = (0..n_layers)
            .map(|_| CcxnLayer::new(in_channels_0, in_channels_1, in_channels_2, cfg, rng))
            .collect::<Result<Vec<_>>>()?;
        let readout = Linear::new(
            "ccxn::readout",
            in_channels_2,
            out_channels,
            true,
            cfg.init,
            cfg.gain,
            rng,
        )?;
        Ok(Self { layers, readout })
    }
}

impl Parametrized for Ccxn {
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

impl Model for Ccxn {
    type Input = CcxnInput;

    fn forward(&self, input: &CcxnInput) -> Result<Array2<f32>> {
        let mut x = input.x.clone();
        for layer in &self.layers {
            x = layer.forward(&x, input)?;
        }
        let pooled = x[2]
            .mean_axis(Axis(0))
            .ok_or(TopoModelError::EmptyInput("faces"))?
            .insert_axis(Axis(0));
        self.readout.forward(&pooled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::CellComplex;
    use rand::SeedableRng;

    fn square_and_triangle() -> CellComplex {
        CellComplex::from_parts(
            [(0, 1), (1, 2), (2, 3), (3, 0), (2, 4), (4, 3)],
            [vec![0, 1, 2, 3], vec![2, 4, 3]],
        )
        .unwrap()
    }

    fn features(c: [usize; 3]) -> RankFeatures {
        RankFeatures::new()
            .with(0, Array2::from_elem((5, c[0]), 1.0))
            .with(1, Array2::from_shape_fn((6, c[1]), |(i, j)| i as f32 - j as f32))
            .with(2, Array2::from_elem((2, c[2]), 0.5))
    }

    #[test]
    fn layer_shapes() {
        let mut rng = SmallRng::seed_from_u64(0);
        let cx = square_and_triangle();
        let inp = CcxnInput::from_complex(&cx, &features([2, 3, 4])).unwrap();
        let layer = CcxnLayer::new(2, 3, 4, &LayerConfig::default(), &mut rng).unwrap();
        let y = layer.forward(&inp.x, &inp).unwrap();
        assert_eq!(y[0].dim(), (5, 2));
        assert_eq!(y[1], Activation::Relu.apply(&inp.x[1]));
        assert_eq!(y[2].dim(), (2, 4));
    }

    #[test]
    fn attention_uses_face_features() {
        let mut rng = SmallRng::seed_from_u64(1);
        let cx = square_and_triangle();
        let cfg = LayerConfig {
            attention: true,
            ..Default::default()
        };
        // with attention, faces must share the edge width
        let inp = CcxnInput::from_complex(&cx, &features([2, 3, 3])).unwrap();
        let layer = CcxnLayer::new(2, 3, 3, &cfg, &mut rng).unwrap();
        let y = layer.forward(&inp.x, &inp).unwrap();
        assert_eq!(y[2].dim(), (2, 3));

        let model = Ccxn::new(2, 3, 3, 4, 2, &cfg, &mut rng).unwrap();
        assert_eq!(model.forward(&inp).unwrap().dim(), (1, 4));
    }
}
