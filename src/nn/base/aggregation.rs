//! Inter-neighborhood aggregation: merge messages that reached the same rank
//! through different neighborhoods.

use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::nn::base::activation::Activation;
use crate::topo_error::{Result, TopoModelError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggrFunc {
    #[default]
    Sum,
    Mean,
}

impl FromStr for AggrFunc {
    type Err = TopoModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggrFunc::Sum),
            "mean" => Ok(AggrFunc::Mean),
            _ => Err(TopoModelError::UnknownAggregation(s.to_string())),
        }
    }
}

/// `update(Σ x_k)` or `update(mean x_k)` over same-shaped inputs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Aggregation {
    pub aggr: AggrFunc,
    pub update: Activation,
}

impl Aggregation {
    pub fn new(aggr: AggrFunc, update: Activation) -> Self {
        Self { aggr, update }
    }

    fn reduce(&self, xs: &[&Array2<f32>]) -> Result<Array2<f32>> {
        let first = xs.first().ok_or(TopoModelError::EmptyInput("aggregation inputs"))?;
        let mut acc = (*first).clone();
        for x in &xs[1..] {
            if x.dim() != acc.dim() {
                return Err(TopoModelError::ShapeMismatch {
                    op: "aggregation",
                    left: acc.dim(),
                    right: x.dim(),
                });
            }
            acc += *x;
        }
        if self.aggr == AggrFunc::Mean {
            acc /= xs.len() as f32;
        }
        Ok(acc)
    }

    pub fn forward(&self, xs: &[&Array2<f32>]) -> Result<Array2<f32>> {
        Ok(self.update.apply(&self.reduce(xs)?))
    }

    /// Gradient for each input; all inputs receive the same gradient.
    pub fn backward(&self, xs: &[&Array2<f32>], grad_out: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
        let pre = self.reduce(xs)?;
        let mut g = self.update.backward(&pre, grad_out);
        if self.aggr == AggrFunc::Mean {
            g /= xs.len() as f32;
        }
        Ok(vec![g; xs.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn sum_and_mean() {
        let a = array![[1.0f32, 2.0]];
        let b = array![[3.0f32, -2.0]];
        let sum = Aggregation::new(AggrFunc::Sum, Activation::Identity);
        assert_eq!(sum.forward(&[&a, &b]).unwrap(), array![[4.0, 0.0]]);
        let mean = Aggregation::new(AggrFunc::Mean, Activation::Relu);
        assert_eq!(mean.forward(&[&a, &b]).unwrap(), array![[2.0, 0.0]]);
    }

    #[test]
    fn rejects_empty_and_mismatched() {
        let agg = Aggregation::default();
        assert!(agg.forward(&[]).is_err());
        let a = Array2::<f32>::zeros((2, 2));
        let b = Array2::<f32>::zeros((3, 2));
        assert!(agg.forward(&[&a, &b]).is_err());
    }

    #[test]
    fn mean_backward_splits_gradient() {
        let a = array![[1.0f32]];
        let agg = Aggregation::new(AggrFunc::Mean, Activation::Identity);
        let g = agg.backward(&[&a, &a], &array![[1.0]]).unwrap();
        assert_eq!(g, vec![array![[0.5]], array![[0.5]]]);
    }

    #[test]
    fn parse() {
        assert_eq!("MEAN".parse::<AggrFunc>().unwrap(), AggrFunc::Mean);
        assert!("max".parse::<AggrFunc>().is_err());
    }
}
