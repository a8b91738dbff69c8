//! Losses returning `(value, d value / d prediction)`.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::topo_error::{Result, TopoModelError};

fn check_same(op: &'static str, a: &Array2<f32>, b: &Array2<f32>) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(TopoModelError::ShapeMismatch {
            op,
            left: a.dim(),
            right: b.dim(),
        });
    }
    if a.is_empty() {
        return Err(TopoModelError::EmptyInput("loss prediction"));
    }
    Ok(())
}

/// Mean squared error over every entry.
pub fn mse(pred: &Array2<f32>, target: &Array2<f32>) -> Result<(f32, Array2<f32>)> {
    check_same("mse", pred, target)?;
    let n = pred.len() as f32;
    let diff = pred - target;
    let loss = diff.mapv(|d| d * d).sum() / n;
    Ok((loss, diff * (2.0 / n)))
}

/// Numerically stable row-wise softmax.
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// Softmax cross-entropy averaged over the rows selected by `mask`
/// (all rows when `mask` is `None`).
pub fn softmax_cross_entropy(
    logits: &Array2<f32>,
    labels: &[usize],
    mask: Option<&[bool]>,
) -> Result<(f32, Array2<f32>)> {
    let (rows, classes) = logits.dim();
    if labels.len() != rows {
        return Err(TopoModelError::ShapeMismatch {
            op: "cross entropy labels",
            left: logits.dim(),
            right: (labels.len(), 1),
        });
    }
    if let Some(m) = mask {
        if m.len() != rows {
            return Err(TopoModelError::ShapeMismatch {
                op: "cross entropy mask",
                left: logits.dim(),
                right: (m.len(), 1),
            });
        }
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= classes) {
        return Err(TopoModelError::InvalidConfig(format!(
            "label {bad} out of range for {classes} classes"
        )));
    }
    let active = |i: usize| mask.is_none_or(|m| m[i]);
    let count = (0..rows).filter(|&i| active(i)).count();
    if count == 0 {
        return Err(TopoModelError::EmptyInput("cross entropy rows"));
    }
    let probs = softmax_rows(logits);
    let mut grad = Array2::zeros((rows, classes));
    let mut loss = 0.0;
    for i in (0..rows).filter(|&i| active(i)) {
        loss -= probs[[i, labels[i]]].max(f32::MIN_POSITIVE).ln();
        let mut g = grad.row_mut(i);
        g.assign(&probs.row(i));
        g[labels[i]] -= 1.0;
    }
    let n = count as f32;
    grad /= n;
    Ok((loss / n, grad))
}

/// Binary cross-entropy on raw logits, averaged over every entry.
pub fn bce_with_logits(logits: &Array2<f32>, target: &Array2<f32>) -> Result<(f32, Array2<f32>)> {
    check_same("bce_with_logits", logits, target)?;
    let n = logits.len() as f32;
    let mut loss = 0.0;
    let mut grad = Array2::zeros(logits.dim());
    for ((g, &z), &y) in grad.iter_mut().zip(logits.iter()).zip(target.iter()) {
        // max(z, 0) - z·y + log(1 + e^{-|z|})
        loss += z.max(0.0) - z * y + (-z.abs()).exp().ln_1p();
        let p = if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let e = z.exp();
            e / (1.0 + e)
        };
        *g = (p - y) / n;
    }
    Ok((loss / n, grad))
}

/// Loss selector for [`crate::train::Trainer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    #[default]
    CrossEntropy,
    Mse,
    BceWithLogits,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mse_value_and_grad() {
        let (l, g) = mse(&array![[1.0f32, 3.0]], &array![[0.0, 1.0]]).unwrap();
        assert_eq!(l, 2.5);
        assert_eq!(g, array![[1.0, 2.0]]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let p = softmax_rows(&array![[1000.0f32, 1000.0], [0.0, 1.0]]);
        assert!((p.row(0).sum() - 1.0).abs() < 1e-6);
        assert_eq!(p[[0, 0]], 0.5);
        assert!(p[[1, 1]] > p[[1, 0]]);
    }

    #[test]
    fn masked_cross_entropy_ignores_rows() {
        let logits = array![[0.0f32, 0.0], [5.0, -5.0]];
        let (l, g) = softmax_cross_entropy(&logits, &[0, 1], Some(&[true, false])).unwrap();
        assert!((l - 2.0f32.ln()).abs() < 1e-6);
        assert_eq!(g.row(1).sum(), 0.0);
        assert!((g[[0, 0]] + 0.5).abs() < 1e-6);
        assert!(softmax_cross_entropy(&logits, &[0, 2], None).is_err());
        assert!(softmax_cross_entropy(&logits, &[0, 1], Some(&[false, false])).is_err());
    }

    #[test]
    fn bce_matches_closed_form() {
        let (l, g) = bce_with_logits(&array![[0.0f32]], &array![[1.0]]).unwrap();
        assert!((l - 2.0f32.ln()).abs() < 1e-6);
        assert!((g[[0, 0]] + 0.5).abs() < 1e-6);
    }
}
