//! Point-wise nonlinearities used as update functions.

use std::str::FromStr;

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::topo_error::{Result, TopoModelError};

/// Update function applied after aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    /// Leaky ReLU with the given negative slope.
    LeakyRelu(f32),
    Sigmoid,
    Tanh,
    /// ELU with the given `α`.
    Elu(f32),
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl Activation {
    #[inline]
    pub fn scalar(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu(slope) => {
                if x > 0.0 {
                    x
                } else {
                    slope * x
                }
            }
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Elu(alpha) => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
        }
    }

    /// Derivative evaluated at the pre-activation `x`.
    #[inline]
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu(slope) => {
                if x > 0.0 {
                    1.0
                } else {
                    slope
                }
            }
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Activation::Tanh => 1.0 - x.tanh().powi(2),
            Activation::Elu(alpha) => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha * x.exp()
                }
            }
        }
    }

    pub fn apply(self, x: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Identity => x.clone(),
            _ => x.mapv(|v| self.scalar(v)),
        }
    }

    /// Gradient w.r.t. the pre-activation given the gradient w.r.t. the output.
    pub fn backward(self, pre: &Array2<f32>, grad_out: &Array2<f32>) -> Array2<f32> {
        if self == Activation::Identity {
            return grad_out.clone();
        }
        let mut g = grad_out.clone();
        Zip::from(&mut g)
            .and(pre)
            .for_each(|g, &x| *g *= self.derivative(x));
        g
    }
}

impl FromStr for Activation {
    type Err = TopoModelError;

    /// Accepts `identity`/`none`, `relu`, `leaky_relu` (slope 0.01), `sigmoid`,
    /// `tanh` and `elu` (α = 1).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identity" | "none" | "linear" => Ok(Activation::Identity),
            "relu" => Ok(Activation::Relu),
            "leaky_relu" | "leakyrelu" => Ok(Activation::LeakyRelu(0.01)),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "elu" => Ok(Activation::Elu(1.0)),
            _ => Err(TopoModelError::UnknownActivation(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn parse_names() {
        assert_eq!("ReLU".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!("none".parse::<Activation>().unwrap(), Activation::Identity);
        assert!(matches!(
            "swish".parse::<Activation>(),
            Err(TopoModelError::UnknownActivation(_))
        ));
    }

    #[test]
    fn values() {
        let x = array![[-1.0f32, 0.0, 2.0]];
        assert_eq!(Activation::Relu.apply(&x), array![[0.0, 0.0, 2.0]]);
        assert_eq!(Activation::LeakyRelu(0.1).apply(&x), array![[-0.1, 0.0, 2.0]]);
        assert_eq!(Activation::Sigmoid.scalar(0.0), 0.5);
        assert!((Activation::Elu(1.0).scalar(-1.0) - (-0.632_120_6)).abs() < 1e-6);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let acts = [
            Activation::Sigmoid,
            Activation::Tanh,
            Activation::Elu(1.0),
            Activation::LeakyRelu(0.2),
        ];
        for act in acts {
            for &x in &[-1.3f32, -0.2, 0.7, 1.9] {
                let h = 1e-3;
                let fd = (act.scalar(x + h) - act.scalar(x - h)) / (2.0 * h);
                assert!(
                    (fd - act.derivative(x)).abs() < 1e-2,
                    "{act:?} at {x}: fd {fd} vs {}",
                    act.derivative(x)
                );
            }
        }
    }

    #[test]
    fn serde_names() {
        let s = serde_json::to_string(&Activation::LeakyRelu(0.2)).unwrap();
        assert_eq!(s, r#"{"leaky_relu":0.2}"#);
        let back: Activation = serde_json::from_str(r#""sigmoid""#).unwrap();
        assert_eq!(back, Activation::Sigmoid);
    }
}
