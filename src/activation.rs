//! Activation kernels.
//!
//! The hidden layer computes a pre-activation `z1 = W1 x + b1` and applies ReLU
//! element-wise. The output layer turns its logits `z2` into a probability
//! distribution with softmax.
//!
//! These are pure functions with no state. Slice variants write into a caller
//! provided buffer so the per-sample hot path stays allocation-free.

/// `max(0, x)`.
#[inline]
pub fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

/// Derivative of ReLU with respect to its input.
///
/// The subgradient at `0` is taken to be `0`.
#[inline]
pub fn relu_grad(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else { 0.0 }
}

/// Element-wise ReLU: `out[i] = relu(z[i])`.
///
/// Shape contract: `z.len() == out.len()`.
#[inline]
pub fn relu_into(z: &[f64], out: &mut [f64]) {
    debug_assert_eq!(z.len(), out.len());
    for (o, &v) in out.iter_mut().zip(z) {
        *o = relu(v);
    }
}

/// Numerically stable softmax.
///
/// Subtracts the maximum logit before exponentiating, so every exponent is
/// `<= 0` and cannot overflow. For finite input the output is finite,
/// non-negative and sums to 1.
///
/// Shape contract: `logits.len() == out.len()` and non-empty.
pub fn softmax_into(logits: &[f64], out: &mut [f64]) {
    debug_assert_eq!(logits.len(), out.len());
    debug_assert!(!logits.is_empty(), "softmax requires at least 1 logit");

    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0;
    for (o, &z) in out.iter_mut().zip(logits) {
        let e = (z - max).exp();
        *o = e;
        sum += e;
    }

    // sum >= 1 because the max logit contributes exp(0).
    let inv = 1.0 / sum;
    for o in out.iter_mut() {
        *o *= inv;
    }
}

/// Allocating convenience wrapper around [`softmax_into`].
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; logits.len()];
    softmax_into(logits, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn relu_shapes() {
        assert_eq!(relu(-2.0), 0.0);
        assert_eq!(relu(0.0), 0.0);
        assert_eq!(relu(3.0), 3.0);

        assert_eq!(relu_grad(-2.0), 0.0);
        assert_eq!(relu_grad(0.0), 0.0);
        assert_eq!(relu_grad(1e-9), 1.0);
    }

    #[test]
    fn relu_into_is_elementwise() {
        let z = [-1.0, 0.0, 0.5, 2.0];
        let mut out = [9.0; 4];
        relu_into(&z, &mut out);
        assert_eq!(out, [0.0, 0.0, 0.5, 2.0]);
    }

    #[test]
    fn softmax_of_equal_logits_is_uniform() {
        let p = softmax(&[0.0; 4]);
        for v in p {
            assert!((v - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn softmax_survives_huge_logits() {
        let p = softmax(&[1000.0, 1000.0, -1000.0]);
        assert!(p.iter().all(|v| v.is_finite()));
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
        assert_eq!(p[2], 0.0);
    }

    proptest! {
        #[test]
        fn softmax_is_a_distribution(z in prop::collection::vec(-500.0f64..500.0, 1..16)) {
            let p = softmax(&z);
            let sum: f64 = p.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
            prop_assert!(p.iter().all(|&v| v >= 0.0 && v.is_finite()));
        }

        #[test]
        fn softmax_is_shift_invariant(
            z in prop::collection::vec(-50.0f64..50.0, 1..16),
            c in -100.0f64..100.0,
        ) {
            let p = softmax(&z);
            let shifted: Vec<f64> = z.iter().map(|v| v + c).collect();
            let q = softmax(&shifted);
            for (a, b) in p.iter().zip(&q) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }

        #[test]
        fn relu_matches_definition(x in -1e6f64..1e6) {
            if x > 0.0 {
                prop_assert_eq!(relu(x), x);
                prop_assert_eq!(relu_grad(x), 1.0);
            } else {
                prop_assert_eq!(relu(x), 0.0);
                prop_assert_eq!(relu_grad(x), 0.0);
            }
        }
    }
}
