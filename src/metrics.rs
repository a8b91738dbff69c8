//! Evaluation metrics.

use ndarray::Array2;

use crate::topo_error::{Result, TopoModelError};

/// Index of the largest entry of every row (first one on ties).
pub fn argmax_rows(x: &Array2<f32>) -> Vec<usize> {
    x.rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 { (i, v) } else { best }
                })
                .0
        })
        .collect()
}

/// Fraction of (unmasked) rows whose argmax equals the label.
pub fn accuracy(logits: &Array2<f32>, labels: &[usize], mask: Option<&[bool]>) -> Result<f32> {
    if labels.len() != logits.nrows() || mask.is_some_and(|m| m.len() != logits.nrows()) {
        return Err(TopoModelError::ShapeMismatch {
            op: "accuracy",
            left: logits.dim(),
            right: (labels.len(), 1),
        });
    }
    let (hits, total) = argmax_rows(logits)
        .into_iter()
        .zip(labels)
        .enumerate()
        .filter(|(i, _)| mask.is_none_or(|m| m[*i]))
        .fold((0usize, 0usize), |(h, t), (_, (p, &l))| {
            (h + usize::from(p == l), t + 1)
        });
    if total == 0 {
        return Err(TopoModelError::EmptyInput("accuracy rows"));
    }
    Ok(hits as f32 / total as f32)
}

/// Fraction of entries where `logit > 0` agrees with `target > 0.5`.
pub fn binary_accuracy(logits: &Array2<f32>, targets: &Array2<f32>) -> Result<f32> {
    if logits.dim() != targets.dim() {
        return Err(TopoModelError::ShapeMismatch {
            op: "binary_accuracy",
            left: logits.dim(),
            right: targets.dim(),
        });
    }
    if logits.is_empty() {
        return Err(TopoModelError::EmptyInput("binary accuracy"));
    }
    let hits = logits
        .iter()
        .zip(targets.iter())
        .filter(|&(&z, &y)| (z > 0.0) == (y > 0.5))
        .count();
    Ok(hits as f32 / logits.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn accuracy_with_mask() {
        let logits = array![[0.9f32, 0.1], [0.2, 0.8], [0.6, 0.4]];
        assert_eq!(argmax_rows(&logits), vec![0, 1, 0]);
        assert_eq!(accuracy(&logits, &[0, 1, 1], None).unwrap(), 2.0 / 3.0);
        assert_eq!(
            accuracy(&logits, &[0, 1, 1], Some(&[true, true, false])).unwrap(),
            1.0
        );
        assert!(accuracy(&logits, &[0], None).is_err());
    }

    #[test]
    fn binary() {
        let acc = binary_accuracy(&array![[1.0f32, -1.0]], &array![[1.0, 1.0]]).unwrap();
        assert_eq!(acc, 0.5);
    }
}
