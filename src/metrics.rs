//! Classification accuracy.
//!
//! Metrics are evaluation helpers (they do not participate in backprop).

use crate::predict::class_of;
use crate::{Dataset, Error, Mlp, Result};

/// Fraction of samples in `data` whose predicted class equals the target class.
///
/// A target with no component exactly equal to `1.0` never counts as a match.
/// Returns a value in `[0, 1]`; fails on an empty dataset or a dimension
/// mismatch.
pub fn accuracy(mlp: &Mlp, data: &Dataset) -> Result<f64> {
    accuracy_head(mlp, data, data.len())
}

/// Accuracy over the first `n` samples of `data` (or all of them if fewer).
pub fn accuracy_head(mlp: &Mlp, data: &Dataset, n: usize) -> Result<f64> {
    if data.is_empty() || n == 0 {
        return Err(Error::InvalidData("dataset must not be empty".to_owned()));
    }
    if data.input_dim() != mlp.input_dim() {
        return Err(Error::InvalidShape(format!(
            "dataset input_dim {} does not match model input_dim {}",
            data.input_dim(),
            mlp.input_dim()
        )));
    }

    let mut cache = mlp.forward_cache();
    let mut total = 0usize;
    let mut correct = 0usize;
    for (input, target) in data.samples(0..n) {
        let pred = mlp.predict_with(input, &mut cache)?;
        if class_of(target) == Some(pred) {
            correct += 1;
        }
        total += 1;
    }

    Ok(correct as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Layer;

    // Always predicts class 1: the output bias dominates a zero hidden layer.
    fn always_one() -> Mlp {
        let hidden = Layer::zeros(2, 2);
        let output = Layer::from_parts(2, 2, vec![0.0; 4], vec![0.0, 3.0]).unwrap();
        Mlp::from_layers(hidden, output).unwrap()
    }

    #[test]
    fn accuracy_is_one_when_every_prediction_matches() {
        let data = Dataset::from_labels(vec![0.1, 0.2, 0.3, 0.4], &[1, 1], 2, 2).unwrap();
        assert_eq!(accuracy(&always_one(), &data).unwrap(), 1.0);
    }

    #[test]
    fn accuracy_is_zero_when_no_prediction_matches() {
        let data = Dataset::from_labels(vec![0.1, 0.2, 0.3, 0.4], &[0, 0], 2, 2).unwrap();
        assert_eq!(accuracy(&always_one(), &data).unwrap(), 0.0);
    }

    #[test]
    fn accuracy_head_only_looks_at_prefix() {
        let data = Dataset::from_labels(vec![0.0; 8], &[1, 0, 0, 0], 2, 2).unwrap();
        let mlp = always_one();
        assert_eq!(accuracy_head(&mlp, &data, 1).unwrap(), 1.0);
        assert_eq!(accuracy_head(&mlp, &data, 2).unwrap(), 0.5);
        assert_eq!(accuracy_head(&mlp, &data, 100).unwrap(), 0.25);
    }

    #[test]
    fn accuracy_rejects_empty_and_mismatched_data() {
        let mlp = always_one();
        let empty = Dataset::from_flat(vec![], vec![], 2, 2).unwrap();
        assert!(accuracy(&mlp, &empty).is_err());

        let wide = Dataset::from_labels(vec![0.0; 3], &[1], 3, 2).unwrap();
        assert!(matches!(
            accuracy(&mlp, &wide),
            Err(Error::InvalidShape(_))
        ));
    }
}
