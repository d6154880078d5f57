use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::activation::{relu_grad, relu_into, softmax_into};
use crate::{Error, Layer, Result, loss};

/// Parameter store of a one-hidden-layer perceptron.
///
/// - `hidden`: `W1` (hidden_dim x input_dim) and `b1` (hidden_dim)
/// - `output`: `W2` (output_dim x hidden_dim) and `b2` (output_dim)
///
/// The hidden layer uses ReLU, the output layer softmax. Parameters only change
/// through [`Mlp::sgd_step`]; forward and backward passes borrow the model
/// immutably.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    hidden: Layer,
    output: Layer,
}

/// Intermediate values of one forward pass.
///
/// `Mlp::backward` needs all four of them. Allocate once via
/// `Mlp::forward_cache()` and reuse it across samples.
#[derive(Debug, Clone)]
pub struct ForwardCache {
    pub(crate) z1: Vec<f64>,
    pub(crate) a1: Vec<f64>,
    pub(crate) z2: Vec<f64>,
    pub(crate) a2: Vec<f64>,
}

/// Parameter gradients, shaped like the model.
///
/// The same type serves as the per-sample gradient (overwrite semantics, see
/// `Mlp::backward`) and as the batch accumulator (`zero` / `accumulate` /
/// `scale`).
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    d_w1: Vec<f64>,
    d_b1: Vec<f64>,
    d_w2: Vec<f64>,
    d_b2: Vec<f64>,

    // Backprop intermediates: dL/dz2 and dL/dz1.
    d_z2: Vec<f64>,
    d_z1: Vec<f64>,
}

impl Mlp {
    pub fn new_with_seed(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(input_dim, hidden_dim, output_dim, &mut rng)
    }

    /// Random initialization: weights `0.01 * N(0, 1)`, biases zero.
    pub fn new_with_rng<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let hidden = Layer::new_with_rng(input_dim, hidden_dim, rng)?;
        let output = Layer::new_with_rng(hidden_dim, output_dim, rng)?;
        Ok(Self { hidden, output })
    }

    /// A model with every parameter set to zero.
    pub fn zeros(input_dim: usize, hidden_dim: usize, output_dim: usize) -> Result<Self> {
        if input_dim == 0 || hidden_dim == 0 || output_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "all dims must be > 0, got {input_dim}/{hidden_dim}/{output_dim}"
            )));
        }
        Ok(Self {
            hidden: Layer::zeros(input_dim, hidden_dim),
            output: Layer::zeros(hidden_dim, output_dim),
        })
    }

    /// Assemble a model from its two layers.
    pub fn from_layers(hidden: Layer, output: Layer) -> Result<Self> {
        if hidden.in_dim() == 0 || hidden.out_dim() == 0 || output.out_dim() == 0 {
            return Err(Error::InvalidShape(format!(
                "all dims must be > 0, got {}/{}/{}",
                hidden.in_dim(),
                hidden.out_dim(),
                output.out_dim()
            )));
        }
        if hidden.out_dim() != output.in_dim() {
            return Err(Error::InvalidShape(format!(
                "hidden out_dim {} does not match output in_dim {}",
                hidden.out_dim(),
                output.in_dim()
            )));
        }
        Ok(Self { hidden, output })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.hidden.in_dim()
    }

    #[inline]
    pub fn hidden_dim(&self) -> usize {
        self.hidden.out_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.output.out_dim()
    }

    /// `W1` / `b1`.
    #[inline]
    pub fn hidden(&self) -> &Layer {
        &self.hidden
    }

    /// `W2` / `b2`.
    #[inline]
    pub fn output(&self) -> &Layer {
        &self.output
    }

    pub fn forward_cache(&self) -> ForwardCache {
        ForwardCache::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Forward pass for a single sample.
    ///
    /// Computes `z1 = W1 x + b1`, `a1 = relu(z1)`, `z2 = W2 a1 + b2` and
    /// `a2 = softmax(z2)` into `cache` and returns `a2`.
    ///
    /// Fails with `InvalidShape` if `input` or `cache` do not match the model.
    pub fn forward<'a>(&self, input: &[f64], cache: &'a mut ForwardCache) -> Result<&'a [f64]> {
        self.check_input(input)?;
        self.check_cache(cache)?;
        self.forward_unchecked(input, cache);
        Ok(&cache.a2)
    }

    /// Backward pass for a single sample.
    ///
    /// `cache` must hold the forward pass of the same `input`. Overwrites
    /// `grads` with this sample's gradients:
    ///
    /// - `dZ2 = a2 - y`
    /// - `dW2 = dZ2 a1^T`, `db2 = dZ2`
    /// - `dZ1 = (W2^T dZ2) * relu'(z1)`
    /// - `dW1 = dZ1 x^T`, `db1 = dZ1`
    pub fn backward(
        &self,
        input: &[f64],
        cache: &ForwardCache,
        target: &[f64],
        grads: &mut Gradients,
    ) -> Result<()> {
        self.check_input(input)?;
        self.check_target(target)?;
        self.check_cache(cache)?;
        if grads.d_w1.len() != self.hidden.weights().len()
            || grads.d_w2.len() != self.output.weights().len()
            || grads.d_b1.len() != self.hidden_dim()
            || grads.d_b2.len() != self.output_dim()
        {
            return Err(Error::InvalidShape(
                "gradients were built for a different model".to_owned(),
            ));
        }
        self.backward_unchecked(input, cache, target, grads);
        Ok(())
    }

    /// Cross-entropy of this model's prediction for `input` against `target`.
    pub fn loss(&self, input: &[f64], target: &[f64], cache: &mut ForwardCache) -> Result<f64> {
        self.check_target(target)?;
        let probs = self.forward(input, cache)?;
        Ok(loss::cross_entropy(probs, target))
    }

    /// Applies `param -= lr * grad` to all four parameter containers.
    #[inline]
    pub fn sgd_step(&mut self, grads: &Gradients, lr: f64) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        assert_eq!(
            grads.d_w1.len(),
            self.hidden.weights().len(),
            "gradients were built for a different model"
        );
        assert_eq!(
            grads.d_w2.len(),
            self.output.weights().len(),
            "gradients were built for a different model"
        );

        self.hidden.sgd_step(&grads.d_w1, &grads.d_b1, lr);
        self.output.sgd_step(&grads.d_w2, &grads.d_b2, lr);
    }

    // Hot path. Callers validate shapes once up front.
    #[inline]
    pub(crate) fn forward_unchecked(&self, input: &[f64], cache: &mut ForwardCache) {
        self.hidden.affine(input, &mut cache.z1);
        relu_into(&cache.z1, &mut cache.a1);
        self.output.affine(&cache.a1, &mut cache.z2);
        softmax_into(&cache.z2, &mut cache.a2);
    }

    #[inline]
    pub(crate) fn backward_unchecked(
        &self,
        input: &[f64],
        cache: &ForwardCache,
        target: &[f64],
        grads: &mut Gradients,
    ) {
        // Softmax + cross-entropy combined derivative.
        for ((d, &p), &t) in grads.d_z2.iter_mut().zip(&cache.a2).zip(target) {
            *d = p - t;
        }
        self.output
            .param_grads(&cache.a1, &grads.d_z2, &mut grads.d_w2, &mut grads.d_b2);

        self.output.input_grads(&grads.d_z2, &mut grads.d_z1);
        for (d, &z) in grads.d_z1.iter_mut().zip(&cache.z1) {
            *d *= relu_grad(z);
        }
        self.hidden
            .param_grads(input, &grads.d_z1, &mut grads.d_w1, &mut grads.d_b1);
    }

    pub(crate) fn check_input(&self, input: &[f64]) -> Result<()> {
        if input.len() != self.input_dim() {
            return Err(Error::InvalidShape(format!(
                "input len {} does not match model input_dim {}",
                input.len(),
                self.input_dim()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_target(&self, target: &[f64]) -> Result<()> {
        if target.len() != self.output_dim() {
            return Err(Error::InvalidShape(format!(
                "target len {} does not match model output_dim {}",
                target.len(),
                self.output_dim()
            )));
        }
        Ok(())
    }

    fn check_cache(&self, cache: &ForwardCache) -> Result<()> {
        if cache.z1.len() != self.hidden_dim() || cache.z2.len() != self.output_dim() {
            return Err(Error::InvalidShape(format!(
                "forward cache has dims {}/{}, model has {}/{}",
                cache.z1.len(),
                cache.z2.len(),
                self.hidden_dim(),
                self.output_dim()
            )));
        }
        Ok(())
    }
}

impl ForwardCache {
    pub fn new(mlp: &Mlp) -> Self {
        Self {
            z1: vec![0.0; mlp.hidden_dim()],
            a1: vec![0.0; mlp.hidden_dim()],
            z2: vec![0.0; mlp.output_dim()],
            a2: vec![0.0; mlp.output_dim()],
        }
    }

    /// Hidden pre-activation `z1`.
    #[inline]
    pub fn z1(&self) -> &[f64] {
        &self.z1
    }

    /// Hidden activation `a1`.
    #[inline]
    pub fn a1(&self) -> &[f64] {
        &self.a1
    }

    /// Output logits `z2`.
    #[inline]
    pub fn z2(&self) -> &[f64] {
        &self.z2
    }

    /// Output probabilities `a2` of the most recent forward pass.
    #[inline]
    pub fn output(&self) -> &[f64] {
        &self.a2
    }
}

impl Gradients {
    pub fn new(mlp: &Mlp) -> Self {
        Self {
            d_w1: vec![0.0; mlp.hidden.weights().len()],
            d_b1: vec![0.0; mlp.hidden_dim()],
            d_w2: vec![0.0; mlp.output.weights().len()],
            d_b2: vec![0.0; mlp.output_dim()],
            d_z2: vec![0.0; mlp.output_dim()],
            d_z1: vec![0.0; mlp.hidden_dim()],
        }
    }

    /// Reset every parameter gradient to zero.
    pub fn zero(&mut self) {
        self.d_w1.fill(0.0);
        self.d_b1.fill(0.0);
        self.d_w2.fill(0.0);
        self.d_b2.fill(0.0);
    }

    /// `self += other`, element-wise over the four parameter containers.
    pub fn accumulate(&mut self, other: &Gradients) {
        add_assign(&mut self.d_w1, &other.d_w1);
        add_assign(&mut self.d_b1, &other.d_b1);
        add_assign(&mut self.d_w2, &other.d_w2);
        add_assign(&mut self.d_b2, &other.d_b2);
    }

    /// Multiply every parameter gradient by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in self
            .d_w1
            .iter_mut()
            .chain(&mut self.d_b1)
            .chain(&mut self.d_w2)
            .chain(&mut self.d_b2)
        {
            *v *= factor;
        }
    }

    /// `dW1`, row-major (hidden_dim, input_dim).
    #[inline]
    pub fn d_w1(&self) -> &[f64] {
        &self.d_w1
    }

    #[inline]
    pub fn d_b1(&self) -> &[f64] {
        &self.d_b1
    }

    /// `dW2`, row-major (output_dim, hidden_dim).
    #[inline]
    pub fn d_w2(&self) -> &[f64] {
        &self.d_w2
    }

    #[inline]
    pub fn d_b2(&self) -> &[f64] {
        &self.d_b2
    }
}

#[inline]
fn add_assign(acc: &mut [f64], xs: &[f64]) {
    debug_assert_eq!(acc.len(), xs.len());
    for (a, x) in acc.iter_mut().zip(xs) {
        *a += x;
    }
}
