//! Message passing along one neighborhood matrix.
//!
//! For a neighborhood `N` of shape `(n_target, n_source)` the layer computes
//!
//! ```text
//! h   = x_source · W                    (W = I when the transform is off)
//! m   = N' · h                          (N' = N, or N ⊙ α with attention)
//! out = update(D⁻¹ m)                   (D = row sums of |N| when aggr_norm)
//! ```
//!
//! With attention every stored entry `(i, j)` of `N` is reweighted by
//! `α_ij = elu([h_j ‖ h_i] · a)`, where `h_i` is the target cell projected by
//! the same `W`. Without explicit target features the neighborhood must be
//! square and the source features double as targets.

use std::borrow::Cow;

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::nn::base::activation::Activation;
use crate::nn::base::init::{DEFAULT_GAIN, Initialization, init_matrix};
use crate::nn::base::parameter::{Parameter, Parametrized};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};

/// Options shared by every [`Conv`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvOptions {
    /// Divide each target row by its neighborhood degree.
    pub aggr_norm: bool,
    pub update: Activation,
    pub attention: bool,
    /// When `false` no weight is learned and `in_channels` must equal `out_channels`.
    pub with_linear_transform: bool,
    pub init: Initialization,
    pub gain: f32,
}

impl Default for ConvOptions {
    fn default() -> Self {
        Self {
            aggr_norm: false,
            update: Activation::Identity,
            attention: false,
            with_linear_transform: true,
            init: Initialization::XavierUniform,
            gain: DEFAULT_GAIN,
        }
    }
}

/// Gradients with respect to the inputs of [`Conv::forward`].
#[derive(Clone, Debug, PartialEq)]
pub struct ConvGrads {
    pub source: Array2<f32>,
    /// Only present when target features were passed and attention is on.
    pub target: Option<Array2<f32>>,
}

#[derive(Clone, Debug)]
pub struct Conv {
    in_channels: usize,
    out_channels: usize,
    options: ConvOptions,
    weight: Option<Parameter>,
    att_weight: Option<Parameter>,
}

/// Intermediate values of one forward pass, reused by the backward pass.
struct Trace<'a> {
    h_src: Array2<f32>,
    h_tgt: Option<Array2<f32>>,
    /// Attention pre-activations, one per stored entry of the neighborhood.
    scores: Vec<f32>,
    weighted: Cow<'a, CsrMatrix<f32>>,
    inv_deg: Option<Vec<f32>>,
    pre: Array2<f32>,
}

const ATTENTION_ACT: Activation = Activation::Elu(1.0);

impl Conv {
    pub fn new(
        name: &str,
        in_channels: usize,
        out_channels: usize,
        options: ConvOptions,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(TopoModelError::InvalidConfig(format!(
                "{name}: channels must be positive, got {in_channels} -> {out_channels}"
            )));
        }
        let weight = if options.with_linear_transform {
            let w = init_matrix(in_channels, out_channels, options.init, options.gain, rng)?;
            Some(Parameter::new(format!("{name}::weight"), w))
        } else if in_channels != out_channels {
            return Err(TopoModelError::InvalidConfig(format!(
                "{name}: without a linear transform in_channels ({in_channels}) must equal \
                 out_channels ({out_channels})"
            )));
        } else {
            None
        };
        let att_weight = if options.attention {
            let a = init_matrix(2 * out_channels, 1, options.init, options.gain, rng)?;
            Some(Parameter::new(format!("{name}::att_weight"), a))
        } else {
            None
        };
        Ok(Self {
            in_channels,
            out_channels,
            options,
            weight,
            att_weight,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn options(&self) -> &ConvOptions {
        &self.options
    }

    pub fn weight(&self) -> Option<&Parameter> {
        self.weight.as_ref()
    }

    pub fn attention_weight(&self) -> Option<&Parameter> {
        self.att_weight.as_ref()
    }

    fn project(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.in_channels {
            return Err(TopoModelError::ShapeMismatch {
                op: "conv input channels",
                left: x.dim(),
                right: (x.nrows(), self.in_channels),
            });
        }
        Ok(match &self.weight {
            Some(w) => x.dot(w.value()),
            None => x.clone(),
        })
    }

    fn split_attention(&self) -> Option<(ArrayView1<'_, f32>, ArrayView1<'_, f32>)> {
        self.att_weight.as_ref().map(|a| {
            let a = a.value();
            (
                a.slice(s![..self.out_channels, 0]),
                a.slice(s![self.out_channels.., 0]),
            )
        })
    }

    fn trace<'a>(
        &self,
        x_source: &Array2<f32>,
        nbhd: &'a CsrMatrix<f32>,
        x_target: Option<&Array2<f32>>,
    ) -> Result<Trace<'a>> {
        if nbhd.ncols() != x_source.nrows() {
            return Err(TopoModelError::ShapeMismatch {
                op: "conv neighborhood vs source",
                left: nbhd.shape(),
                right: x_source.dim(),
            });
        }
        if let Some(xt) = x_target {
            if xt.nrows() != nbhd.nrows() {
                return Err(TopoModelError::ShapeMismatch {
                    op: "conv neighborhood vs target",
                    left: nbhd.shape(),
                    right: xt.dim(),
                });
            }
        }
        let h_src = self.project(x_source)?;

        let (h_tgt, scores, weighted) = match self.split_attention() {
            None => (None, Vec::new(), Cow::Borrowed(nbhd)),
            Some((a_src, a_tgt)) => {
                let h_tgt = match x_target {
                    Some(xt) => Some(self.project(xt)?),
                    None if nbhd.is_square() => None,
                    None => {
                        return Err(TopoModelError::ShapeMismatch {
                            op: "conv attention without target features",
                            left: nbhd.shape(),
                            right: (nbhd.ncols(), nbhd.ncols()),
                        });
                    }
                };
                let s_src = h_src.dot(&a_src);
                let s_tgt = h_tgt.as_ref().unwrap_or(&h_src).dot(&a_tgt);
                let scores: Vec<f32> = nbhd
                    .triplets()
                    .map(|(i, j, _)| s_src[j] + s_tgt[i])
                    .collect();
                let values = nbhd
                    .values()
                    .iter()
                    .zip(&scores)
                    .map(|(&v, &z)| v * ATTENTION_ACT.scalar(z))
                    .collect();
                (h_tgt, scores, Cow::Owned(nbhd.with_values(values)?))
            }
        };

        let mut pre = weighted.matmul_dense(&h_src)?;
        let inv_deg = self.options.aggr_norm.then(|| {
            nbhd.abs()
                .row_sums()
                .into_iter()
                .map(|d| if d > 0.0 { d.recip() } else { 0.0 })
                .collect::<Vec<f32>>()
        });
        if let Some(inv) = &inv_deg {
            scale_rows(&mut pre, inv);
        }
        Ok(Trace {
            h_src,
            h_tgt,
            scores,
            weighted,
            inv_deg,
            pre,
        })
    }

    /// Messages from `x_source` (`n_source × in`) to the targets of `nbhd`.
    pub fn forward(
        &self,
        x_source: &Array2<f32>,
        nbhd: &CsrMatrix<f32>,
        x_target: Option<&Array2<f32>>,
    ) -> Result<Array2<f32>> {
        let t = self.trace(x_source, nbhd, x_target)?;
        Ok(self.options.update.apply(&t.pre))
    }

    /// Recompute the forward pass, accumulate weight gradients and return the
    /// gradients with respect to the input features.
    pub fn backward(
        &mut self,
        x_source: &Array2<f32>,
        nbhd: &CsrMatrix<f32>,
        x_target: Option<&Array2<f32>>,
        grad_out: &Array2<f32>,
    ) -> Result<ConvGrads> {
        let t = self.trace(x_source, nbhd, x_target)?;
        if grad_out.dim() != t.pre.dim() {
            return Err(TopoModelError::ShapeMismatch {
                op: "conv backward",
                left: grad_out.dim(),
                right: t.pre.dim(),
            });
        }
        let mut g_agg = self.options.update.backward(&t.pre, grad_out);
        if let Some(inv) = &t.inv_deg {
            scale_rows(&mut g_agg, inv);
        }
        let mut g_h_src = t.weighted.transpose_matmul_dense(&g_agg)?;
        let mut g_h_tgt: Option<Array2<f32>> = None;

        if let Some((a_src, a_tgt)) = self.split_attention() {
            let h_tgt = t.h_tgt.as_ref().unwrap_or(&t.h_src);
            let mut g_s_src = Array1::<f32>::zeros(t.h_src.nrows());
            let mut g_s_tgt = Array1::<f32>::zeros(h_tgt.nrows());
            for ((i, j, v), &z) in nbhd.triplets().zip(&t.scores) {
                let g_alpha = v * g_agg.row(i).dot(&t.h_src.row(j));
                let g_z = g_alpha * ATTENTION_ACT.derivative(z);
                g_s_src[j] += g_z;
                g_s_tgt[i] += g_z;
            }
            g_h_src += &outer(&g_s_src, &a_src);
            let from_target = outer(&g_s_tgt, &a_tgt);

            let g_a_src = t.h_src.t().dot(&g_s_src);
            let g_a_tgt = h_tgt.t().dot(&g_s_tgt);
            let out = self.out_channels;
            let g_att = Array2::from_shape_fn((2 * out, 1), |(k, _)| {
                if k < out { g_a_src[k] } else { g_a_tgt[k - out] }
            });
            if let Some(att) = &mut self.att_weight {
                att.accumulate(&g_att)?;
            }

            if t.h_tgt.is_some() {
                g_h_tgt = Some(from_target);
            } else {
                g_h_src += &from_target;
            }
        }

        let (source, target) = match &mut self.weight {
            Some(w) => {
                let mut g_w = x_source.t().dot(&g_h_src);
                let source = g_h_src.dot(&w.value().t());
                let target = match (&g_h_tgt, x_target) {
                    (Some(g), Some(xt)) => {
                        g_w += &xt.t().dot(g);
                        Some(g.dot(&w.value().t()))
                    }
                    _ => None,
                };
                w.accumulate(&g_w)?;
                (source, target)
            }
            None => (g_h_src, g_h_tgt),
        };
        Ok(ConvGrads { source, target })
    }
}

impl Parametrized for Conv {
    fn visit_parameters(&self, visitor: &mut dyn FnMut(&Parameter)) {
        if let Some(w) = &self.weight {
            visitor(w);
        }
        if let Some(a) = &self.att_weight {
            visitor(a);
        }
    }

    fn visit_parameters_mut(&mut self, visitor: &mut dyn FnMut(&mut Parameter)) {
        if let Some(w) = &mut self.weight {
            visitor(w);
        }
        if let Some(a) = &mut self.att_weight {
            visitor(a);
        }
    }
}

fn scale_rows(m: &mut Array2<f32>, factors: &[f32]) {
    for (mut row, &f) in m.axis_iter_mut(Axis(0)).zip(factors) {
        row *= f;
    }
}

fn outer(col: &Array1<f32>, row: &ArrayView1<'_, f32>) -> Array2<f32> {
    Array2::from_shape_fn((col.len(), row.len()), |(i, k)| col[i] * row[k])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn path_adjacency() -> CsrMatrix<f32> {
        CsrMatrix::from_triplets(
            3,
            3,
            [(0, 1, 1.0), (1, 0, 1.0), (1, 2, 1.0), (2, 1, 1.0)],
        )
        .unwrap()
    }

    fn features(rows: usize, cols: usize) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |(i, j)| ((i * cols + j) as f32 * 0.37).sin())
    }

    fn loss(out: &Array2<f32>, upstream: &Array2<f32>) -> f32 {
        (out * upstream).sum()
    }

    fn perturbed(conv: &Conv, param: usize, idx: (usize, usize), delta: f32) -> Conv {
        let mut c = conv.clone();
        let mut k = 0;
        c.visit_parameters_mut(&mut |p| {
            if k == param {
                p.value_mut()[idx] += delta;
            }
            k += 1;
        });
        c
    }

    #[test]
    fn identity_transform_sums_neighbours() {
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = ConvOptions {
            with_linear_transform: false,
            ..Default::default()
        };
        let conv = Conv::new("c", 2, 2, opts, &mut rng).unwrap();
        let x = array![[1.0f32, 0.0], [0.0, 1.0], [2.0, 2.0]];
        let out = conv.forward(&x, &path_adjacency(), None).unwrap();
        assert_eq!(out, array![[0.0, 1.0], [3.0, 2.0], [0.0, 1.0]]);
        assert_eq!(conv.num_parameters(), 0);
    }

    #[test]
    fn aggr_norm_averages() {
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = ConvOptions {
            with_linear_transform: false,
            aggr_norm: true,
            ..Default::default()
        };
        let conv = Conv::new("c", 1, 1, opts, &mut rng).unwrap();
        let x = array![[1.0f32], [4.0], [2.0]];
        let out = conv.forward(&x, &path_adjacency(), None).unwrap();
        assert_eq!(out, array![[4.0], [1.5], [4.0]]);
    }

    #[test]
    fn rejects_bad_shapes() {
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = ConvOptions {
            with_linear_transform: false,
            ..Default::default()
        };
        assert!(Conv::new("c", 2, 3, opts, &mut rng).is_err());
        let conv = Conv::new("c", 2, 4, ConvOptions::default(), &mut rng).unwrap();
        assert!(conv.forward(&features(4, 2), &path_adjacency(), None).is_err());
        assert!(conv.forward(&features(3, 3), &path_adjacency(), None).is_err());
    }

    #[test]
    fn attention_needs_targets_for_rectangular_neighborhoods() {
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = ConvOptions {
            attention: true,
            ..Default::default()
        };
        let conv = Conv::new("c", 2, 2, opts, &mut rng).unwrap();
        let b = CsrMatrix::from_triplets(2, 3, [(0, 0, 1.0), (1, 2, 1.0)]).unwrap();
        assert!(conv.forward(&features(3, 2), &b, None).is_err());
        let out = conv.forward(&features(3, 2), &b, Some(&features(2, 2))).unwrap();
        assert_eq!(out.dim(), (2, 2));
    }

    #[test]
    fn attention_gradients_match_finite_differences() {
        let mut rng = SmallRng::seed_from_u64(11);
        let opts = ConvOptions {
            attention: true,
            aggr_norm: true,
            update: Activation::Tanh,
            ..Default::default()
        };
        let mut conv = Conv::new("c", 3, 2, opts, &mut rng).unwrap();
        let nbhd = CsrMatrix::from_triplets(
            2,
            3,
            [(0, 0, 1.0), (0, 1, -1.0), (1, 1, 1.0), (1, 2, 1.0)],
        )
        .unwrap();
        let xs = features(3, 3);
        let xt = features(2, 3).mapv(|v| v * 0.5 + 0.1);
        let upstream = array![[0.3f32, -0.7], [1.1, 0.4]];

        let grads = conv.backward(&xs, &nbhd, Some(&xt), &upstream).unwrap();
        let analytic: Vec<Array2<f32>> = {
            let mut v = Vec::new();
            conv.visit_parameters(&mut |p| v.push(p.grad().clone()));
            v
        };

        let eps = 1e-2;
        for (param, g) in analytic.iter().enumerate() {
            for idx in [(0, 0), (1, 0), (g.nrows() - 1, g.ncols() - 1)] {
                let f = |d| {
                    let c = perturbed(&conv, param, idx, d);
                    loss(&c.forward(&xs, &nbhd, Some(&xt)).unwrap(), &upstream)
                };
                let fd = (f(eps) - f(-eps)) / (2.0 * eps);
                assert!(
                    (fd - g[idx]).abs() < 2e-2,
                    "param {param} {idx:?}: fd {fd} vs {}",
                    g[idx]
                );
            }
        }

        let target = grads.target.expect("target gradient");
        for idx in [(0, 0), (1, 2)] {
            let f = |d: f32| {
                let mut x = xt.clone();
                x[idx] += d;
                loss(&conv.forward(&xs, &nbhd, Some(&x)).unwrap(), &upstream)
            };
            let fd = (f(eps) - f(-eps)) / (2.0 * eps);
            assert!((fd - target[idx]).abs() < 2e-2);
        }
        for idx in [(0, 1), (2, 2)] {
            let f = |d: f32| {
                let mut x = xs.clone();
                x[idx] += d;
                loss(&conv.forward(&x, &nbhd, Some(&xt)).unwrap(), &upstream)
            };
            let fd = (f(eps) - f(-eps)) / (2.0 * eps);
            assert!((fd - grads.source[idx]).abs() < 2e-2);
        }
    }

    #[test]
    fn self_attention_folds_target_gradient_into_source() {
        let mut rng = SmallRng::seed_from_u64(5);
        let opts = ConvOptions {
            attention: true,
            ..Default::default()
        };
        let mut conv = Conv::new("c", 2, 2, opts, &mut rng).unwrap();
        let x = features(3, 2);
        let upstream = array![[1.0f32, 0.0], [0.0, 1.0], [0.5, 0.5]];
        let grads = conv.backward(&x, &path_adjacency(), None, &upstream).unwrap();
        assert!(grads.target.is_none());
        let eps = 1e-2;
        for idx in [(0, 0), (1, 1), (2, 0)] {
            let f = |d: f32| {
                let mut xp = x.clone();
                xp[idx] += d;
                loss(&conv.forward(&xp, &path_adjacency(), None).unwrap(), &upstream)
            };
            let fd = (f(eps) - f(-eps)) / (2.0 * eps);
            assert!((fd - grads.source[idx]).abs() < 2e-2);
        }
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ConvOptions = serde_json::from_str(r#"{"attention": true}"#).unwrap();
        assert!(opts.attention);
        assert!(opts.with_linear_transform);
        assert_eq!(opts.gain, DEFAULT_GAIN);
    }
}
