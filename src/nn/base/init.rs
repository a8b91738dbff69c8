//! Weight initialisation schemes.
//!
//! A weight of shape `(in, out)` uses `fan_in = in` and `fan_out = out`.
//! All sampling goes through a caller-provided `SmallRng` so a model built from
//! the same seed is bit-identical.

use ndarray::Array2;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::SmallRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::topo_error::{Result, TopoModelError};

/// Gain used when a layer does not specify one (≈ √2, the ReLU gain).
pub const DEFAULT_GAIN: f32 = 1.414;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    /// `U(-b, b)` with `b = gain · √(6 / (fan_in + fan_out))`.
    #[default]
    XavierUniform,
    /// `N(0, σ²)` with `σ = gain · √(2 / (fan_in + fan_out))`.
    XavierNormal,
    /// `U(-b, b)` with `b = gain · √(3 / fan_in)`.
    KaimingUniform,
}

/// Recommended gain for a leaky ReLU with negative slope `a` (`a = 0` is ReLU).
pub fn leaky_relu_gain(a: f32) -> f32 {
    (2.0 / (1.0 + a * a)).sqrt()
}

/// Sample a `(rows, cols)` matrix.
pub fn init_matrix(
    rows: usize,
    cols: usize,
    scheme: Initialization,
    gain: f32,
    rng: &mut SmallRng,
) -> Result<Array2<f32>> {
    if rows == 0 || cols == 0 {
        return Err(TopoModelError::InvalidConfig(format!(
            "cannot initialise a {rows}x{cols} weight"
        )));
    }
    if !gain.is_finite() || gain < 0.0 {
        return Err(TopoModelError::InvalidConfig(format!("invalid gain {gain}")));
    }
    let (fan_in, fan_out) = (rows as f32, cols as f32);
    let out = match scheme {
        Initialization::XavierUniform => {
            uniform(rows, cols, gain * (6.0 / (fan_in + fan_out)).sqrt(), rng)
        }
        Initialization::KaimingUniform => uniform(rows, cols, gain * (3.0 / fan_in).sqrt(), rng),
        Initialization::XavierNormal => {
            let std = gain * (2.0 / (fan_in + fan_out)).sqrt();
            let dist =
                Normal::new(0.0f32, std).map_err(|e| TopoModelError::InvalidConfig(e.to_string()))?;
            Array2::from_shape_simple_fn((rows, cols), || dist.sample(rng))
        }
    };
    Ok(out)
}

fn uniform(rows: usize, cols: usize, bound: f32, rng: &mut SmallRng) -> Array2<f32> {
    if bound == 0.0 {
        return Array2::zeros((rows, cols));
    }
    let dist = Uniform::new_inclusive(-bound, bound);
    Array2::from_shape_simple_fn((rows, cols), || dist.sample(rng))
}
