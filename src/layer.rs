use rand::Rng;
use rand_distr::StandardNormal;

use crate::{Error, Result};

/// Scale applied to standard-normal draws when initializing weights.
pub const INIT_SCALE: f64 = 0.01;

/// One dense affine layer: `z = W x + b`.
///
/// The activation is not part of the layer; `Mlp` applies ReLU or softmax on
/// top of the affine output.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl Layer {
    /// All-zero weights and biases.
    #[inline]
    pub fn zeros(in_dim: usize, out_dim: usize) -> Self {
        Self {
            in_dim,
            out_dim,
            weights: vec![0.0; in_dim * out_dim],
            biases: vec![0.0; out_dim],
        }
    }

    /// Weights drawn from `N(0, 1) * INIT_SCALE`, biases zero.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let mut layer = Self::zeros(in_dim, out_dim);
        for w in &mut layer.weights {
            let draw: f64 = rng.sample(StandardNormal);
            *w = draw * INIT_SCALE;
        }
        Ok(layer)
    }

    /// Build a layer from raw parameters.
    ///
    /// Validates the buffer lengths and that every parameter is finite.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        weights: Vec<f64>,
        biases: Vec<f64>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidShape(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidShape(
                "parameters must contain only finite values".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f64] {
        &mut self.biases
    }

    /// Weight row feeding output unit `o` (length `in_dim`).
    #[inline]
    pub fn row(&self, o: usize) -> &[f64] {
        let start = o * self.in_dim;
        &self.weights[start..start + self.in_dim]
    }

    /// Computes `out = W * inputs + b`.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `out.len() == self.out_dim`
    #[inline]
    pub fn affine(&self, inputs: &[f64], out: &mut [f64]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(out.len(), self.out_dim);

        for (o, z) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (w, x) in self.row(o).iter().zip(inputs) {
                sum += w * x;
            }
            *z = sum + self.biases[o];
        }
    }

    /// Parameter gradients given `dL/dz` for this layer (overwrite semantics).
    ///
    /// - `d_weights[o][i] = d_z[o] * inputs[i]`
    /// - `d_biases[o] = d_z[o]`
    #[inline]
    pub fn param_grads(
        &self,
        inputs: &[f64],
        d_z: &[f64],
        d_weights: &mut [f64],
        d_biases: &mut [f64],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(d_z.len(), self.out_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        for (o, &dz) in d_z.iter().enumerate() {
            d_biases[o] = dz;
            let row = &mut d_weights[o * self.in_dim..(o + 1) * self.in_dim];
            for (dw, &x) in row.iter_mut().zip(inputs) {
                *dw = dz * x;
            }
        }
    }

    /// Gradient with respect to the layer input: `d_inputs = W^T d_z`
    /// (overwrite semantics).
    #[inline]
    pub fn input_grads(&self, d_z: &[f64], d_inputs: &mut [f64]) {
        debug_assert_eq!(d_z.len(), self.out_dim);
        debug_assert_eq!(d_inputs.len(), self.in_dim);

        d_inputs.fill(0.0);
        for (o, &dz) in d_z.iter().enumerate() {
            for (d, &w) in d_inputs.iter_mut().zip(self.row(o)) {
                *d += w * dz;
            }
        }
    }

    /// Plain gradient descent: `param -= lr * grad`.
    #[inline]
    pub fn sgd_step(&mut self, d_weights: &[f64], d_biases: &[f64], lr: f64) {
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.biases.len());

        for (w, g) in self.weights.iter_mut().zip(d_weights) {
            *w -= lr * g;
        }
        for (b, g) in self.biases.iter_mut().zip(d_biases) {
            *b -= lr * g;
        }
    }
}
