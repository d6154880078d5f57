//! Cross-entropy loss.
//!
//! Used for reporting only. The backward pass uses the closed-form gradient of
//! softmax followed by cross-entropy, `dL/dz2 = a2 - y`, and never
//! differentiates this function directly.

/// Added to every probability before taking its log so a zero prediction
/// yields a large finite loss instead of `inf`.
pub const LOG_EPS: f64 = 1e-12;

/// Cross-entropy between a one-hot `target` and a softmax prediction `probs`:
/// `-sum_i target[i] * ln(probs[i] + LOG_EPS)`.
///
/// Shape contract: `probs.len() == target.len()`.
#[inline]
pub fn cross_entropy(probs: &[f64], target: &[f64]) -> f64 {
    debug_assert_eq!(probs.len(), target.len());

    let mut loss = 0.0;
    for (&p, &t) in probs.iter().zip(target) {
        loss -= t * (p + LOG_EPS).ln();
    }
    loss
}
