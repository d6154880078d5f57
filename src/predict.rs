//! Predictor: forward pass followed by argmax.
//!
//! Training-time accuracy checks and standalone inference both go through
//! [`Mlp::predict_with`], so the two paths cannot drift apart.

use crate::{ForwardCache, Mlp, Result};

/// Index of the largest component.
///
/// Uses a strict `>` during a left-to-right scan, so ties resolve to the lowest
/// index. Returns `0` for an empty slice.
pub fn argmax(xs: &[f64]) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in xs.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

/// True class of a one-hot target: the first index whose value is exactly `1.0`.
///
/// Returns `None` when no component equals `1.0`.
pub fn class_of(target: &[f64]) -> Option<usize> {
    target.iter().position(|&v| v == 1.0)
}

impl Mlp {
    /// Predicted class for a single input.
    ///
    /// Allocates a fresh [`ForwardCache`]; use [`Mlp::predict_with`] in loops.
    pub fn predict(&self, input: &[f64]) -> Result<usize> {
        let mut cache = self.forward_cache();
        self.predict_with(input, &mut cache)
    }

    /// Predicted class for a single input, reusing `cache`.
    pub fn predict_with(&self, input: &[f64], cache: &mut ForwardCache) -> Result<usize> {
        let probs = self.forward(input, cache)?;
        Ok(argmax(probs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Layer};

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.4, 0.2, 0.4]), 0);
        assert_eq!(argmax(&[0.25; 4]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn class_of_finds_exact_one() {
        assert_eq!(class_of(&[0.0, 0.0, 1.0]), Some(2));
        assert_eq!(class_of(&[1.0, 1.0]), Some(0));
        assert_eq!(class_of(&[0.0, 0.99]), None);
    }

    #[test]
    fn zero_model_predicts_class_zero() {
        let mlp = Mlp::zeros(3, 2, 4).unwrap();
        assert_eq!(mlp.predict(&[0.3, 0.1, 0.9]).unwrap(), 0);
    }

    #[test]
    fn predict_follows_output_bias() {
        let hidden = Layer::zeros(2, 2);
        let output = Layer::from_parts(2, 3, vec![0.0; 6], vec![0.0, 0.0, 5.0]).unwrap();
        let mlp = Mlp::from_layers(hidden, output).unwrap();
        assert_eq!(mlp.predict(&[1.0, 1.0]).unwrap(), 2);
    }

    #[test]
    fn predict_rejects_wrong_input_len() {
        let mlp = Mlp::zeros(3, 2, 4).unwrap();
        let err = mlp.predict(&[0.0; 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidShape(_)));
    }
}
