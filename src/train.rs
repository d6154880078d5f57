//! Mini-batch training loop.
//!
//! Each epoch shuffles an index permutation (never the samples), walks it in
//! contiguous mini-batches, averages the per-sample gradients of each batch and
//! applies one plain gradient-descent step per batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::metrics::{accuracy, accuracy_head};
use crate::{Dataset, Error, ForwardCache, Gradients, Mlp, Result, loss};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Samples per worker task when the `parallel` feature is on.
///
/// Partial sums are reduced in chunk order, so the result does not depend on
/// the number of threads.
#[cfg(feature = "parallel")]
pub const PAR_CHUNK: usize = 8;

/// Sample order used to form mini-batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shuffle {
    /// Keep dataset order every epoch.
    None,
    /// Shuffle with a `StdRng` seeded once per `fit` call.
    Seeded(u64),
    /// Shuffle with a generator seeded from OS entropy.
    Rng,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub lr: f64,
    pub batch_size: usize,
    pub shuffle: Shuffle,
    /// Training accuracy is measured on the first this-many training samples
    /// only, to keep the per-epoch report cheap.
    pub train_eval_subset: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            lr: 0.09,
            batch_size: 50,
            shuffle: Shuffle::Seeded(0),
            train_eval_subset: 10_000,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lr must be finite and > 0, got {}",
                self.lr
            )));
        }
        if self.train_eval_subset == 0 {
            return Err(Error::InvalidConfig(
                "train_eval_subset must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation for [`Mlp::fit_with_cancel`].
///
/// Checked only between epochs: a cancelled run keeps every update of the
/// epochs that finished and none of the epoch that was about to start.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean over batches of the mean per-sample cross-entropy.
    pub mean_loss: f64,
    /// Accuracy on the first `train_eval_subset` training samples.
    pub train_accuracy: f64,
    pub test_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
    /// True if training stopped early on a [`CancelToken`].
    pub cancelled: bool,
}

impl FitReport {
    pub fn last(&self) -> Option<&EpochReport> {
        self.epochs.last()
    }
}

/// Reusable buffers for training a specific `Mlp`.
///
/// Lets a caller drive [`Mlp::train_batch`] without allocating per step.
#[derive(Debug, Clone)]
pub struct TrainBuffers {
    pub cache: ForwardCache,
    /// Per-sample gradients (overwritten by every backward pass).
    pub grads: Gradients,
    /// Batch accumulator: zeroed, summed over the batch, then averaged.
    pub batch: Gradients,
    #[cfg(feature = "parallel")]
    partials: Vec<Partial>,
}

#[cfg(feature = "parallel")]
#[derive(Debug, Clone)]
struct Partial {
    cache: ForwardCache,
    grads: Gradients,
    sum: Gradients,
    loss: f64,
}

impl TrainBuffers {
    pub fn new(mlp: &Mlp, batch_size: usize) -> Self {
        #[cfg(not(feature = "parallel"))]
        let _ = batch_size;

        Self {
            cache: mlp.forward_cache(),
            grads: mlp.gradients(),
            batch: mlp.gradients(),
            #[cfg(feature = "parallel")]
            partials: (0..batch_size.div_ceil(PAR_CHUNK).max(1))
                .map(|_| Partial {
                    cache: mlp.forward_cache(),
                    grads: mlp.gradients(),
                    sum: mlp.gradients(),
                    loss: 0.0,
                })
                .collect(),
        }
    }
}

impl Mlp {
    /// Train on `train` with mini-batch gradient descent.
    ///
    /// After every epoch, reports the mean batch loss, accuracy on a prefix of
    /// the training set and, if `test` is given, accuracy on the full test set.
    pub fn fit(
        &mut self,
        train: &Dataset,
        test: Option<&Dataset>,
        cfg: &FitConfig,
    ) -> Result<FitReport> {
        self.fit_with_cancel(train, test, cfg, &CancelToken::new())
    }

    /// Like [`Mlp::fit`], but stops at the next epoch boundary once `cancel`
    /// is triggered.
    pub fn fit_with_cancel(
        &mut self,
        train: &Dataset,
        test: Option<&Dataset>,
        cfg: &FitConfig,
        cancel: &CancelToken,
    ) -> Result<FitReport> {
        cfg.validate()?;
        if train.is_empty() {
            return Err(Error::InvalidData(
                "train dataset must not be empty".to_owned(),
            ));
        }
        self.check_dataset(train, "train")?;
        if let Some(test) = test {
            if test.is_empty() {
                return Err(Error::InvalidData(
                    "test dataset must not be empty".to_owned(),
                ));
            }
            self.check_dataset(test, "test")?;
        }

        let mut rng = match cfg.shuffle {
            Shuffle::None => None,
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
            Shuffle::Rng => Some(StdRng::from_entropy()),
        };

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut buffers = TrainBuffers::new(self, cfg.batch_size);
        let mut epochs = Vec::with_capacity(cfg.epochs);
        let mut cancelled = false;

        debug!(
            samples = train.len(),
            batch_size = cfg.batch_size,
            lr = cfg.lr,
            epochs = cfg.epochs,
            "starting training"
        );

        for epoch in 1..=cfg.epochs {
            if cancel.is_cancelled() {
                warn!(completed = epoch - 1, "training cancelled");
                cancelled = true;
                break;
            }

            if let Some(rng) = rng.as_mut() {
                order.shuffle(rng);
            }

            let mut loss_sum = 0.0;
            let mut batches = 0usize;
            for batch in order.chunks(cfg.batch_size) {
                loss_sum += self.train_batch_unchecked(train, batch, cfg.lr, &mut buffers);
                batches += 1;
            }
            let mean_loss = loss_sum / batches as f64;

            let train_accuracy = accuracy_head(self, train, cfg.train_eval_subset)?;
            let test_accuracy = test.map(|t| accuracy(self, t)).transpose()?;

            info!(
                epoch,
                loss = mean_loss,
                train_acc = train_accuracy,
                test_acc = ?test_accuracy,
                "epoch complete"
            );

            epochs.push(EpochReport {
                epoch,
                mean_loss,
                train_accuracy,
                test_accuracy,
            });
        }

        Ok(FitReport { epochs, cancelled })
    }

    /// One gradient-descent step on the samples `indices` of `data`.
    ///
    /// Gradients are summed over the batch, divided by `indices.len()` and
    /// applied with `param -= lr * grad`. Returns the mean per-sample loss of
    /// the batch, computed before the update.
    pub fn train_batch(
        &mut self,
        data: &Dataset,
        indices: &[usize],
        lr: f64,
        buffers: &mut TrainBuffers,
    ) -> Result<f64> {
        if indices.is_empty() {
            return Err(Error::InvalidConfig("batch must not be empty".to_owned()));
        }
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lr must be finite and > 0, got {lr}"
            )));
        }
        self.check_dataset(data, "batch")?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= data.len()) {
            return Err(Error::InvalidData(format!(
                "sample index {bad} out of range for {} samples",
                data.len()
            )));
        }
        if buffers.batch.d_b2().len() != self.output_dim()
            || buffers.batch.d_w1().len() != self.hidden().weights().len()
        {
            return Err(Error::InvalidShape(
                "train buffers were built for a different model".to_owned(),
            ));
        }
        Ok(self.train_batch_unchecked(data, indices, lr, buffers))
    }

    /// Mean cross-entropy over every sample of `data`.
    pub fn mean_loss(&self, data: &Dataset) -> Result<f64> {
        if data.is_empty() {
            return Err(Error::InvalidData("dataset must not be empty".to_owned()));
        }
        self.check_dataset(data, "dataset")?;

        let mut cache = self.forward_cache();
        let mut total = 0.0;
        for (input, target) in data.iter() {
            self.forward_unchecked(input, &mut cache);
            total += loss::cross_entropy(cache.output(), target);
        }
        Ok(total / data.len() as f64)
    }

    #[cfg(not(feature = "parallel"))]
    fn train_batch_unchecked(
        &mut self,
        data: &Dataset,
        indices: &[usize],
        lr: f64,
        buffers: &mut TrainBuffers,
    ) -> f64 {
        let TrainBuffers {
            cache,
            grads,
            batch,
        } = buffers;

        batch.zero();
        let mut batch_loss = 0.0;
        for &idx in indices {
            let input = data.input(idx);
            let target = data.target(idx);

            self.forward_unchecked(input, cache);
            batch_loss += loss::cross_entropy(cache.output(), target);

            self.backward_unchecked(input, cache, target, grads);
            batch.accumulate(grads);
        }

        let n = indices.len() as f64;
        batch.scale(1.0 / n);
        self.sgd_step(batch, lr);
        batch_loss / n
    }

    #[cfg(feature = "parallel")]
    fn train_batch_unchecked(
        &mut self,
        data: &Dataset,
        indices: &[usize],
        lr: f64,
        buffers: &mut TrainBuffers,
    ) -> f64 {
        let chunks = indices.len().div_ceil(PAR_CHUNK);
        if buffers.partials.len() < chunks {
            let template = buffers.partials[0].clone();
            buffers.partials.resize(chunks, template);
        }

        let model: &Mlp = self;
        indices
            .par_chunks(PAR_CHUNK)
            .zip(buffers.partials.par_iter_mut())
            .for_each(|(chunk, partial)| {
                partial.sum.zero();
                partial.loss = 0.0;
                for &idx in chunk {
                    let input = data.input(idx);
                    let target = data.target(idx);

                    model.forward_unchecked(input, &mut partial.cache);
                    partial.loss += loss::cross_entropy(partial.cache.output(), target);

                    model.backward_unchecked(input, &partial.cache, target, &mut partial.grads);
                    partial.sum.accumulate(&partial.grads);
                }
            });

        // Reduce in chunk order.
        buffers.batch.zero();
        let mut batch_loss = 0.0;
        for partial in &buffers.partials[..chunks] {
            buffers.batch.accumulate(&partial.sum);
            batch_loss += partial.loss;
        }

        let n = indices.len() as f64;
        buffers.batch.scale(1.0 / n);
        self.sgd_step(&buffers.batch, lr);
        batch_loss / n
    }

    fn check_dataset(&self, data: &Dataset, what: &str) -> Result<()> {
        if data.input_dim() != self.input_dim() {
            return Err(Error::InvalidShape(format!(
                "{what} input_dim {} does not match model input_dim {}",
                data.input_dim(),
                self.input_dim()
            )));
        }
        if data.target_dim() != self.output_dim() {
            return Err(Error::InvalidShape(format!(
                "{what} target_dim {} does not match model output_dim {}",
                data.target_dim(),
                self.output_dim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Dataset {
        let xs = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![0.9, 0.1],
            vec![0.1, 0.9],
            vec![0.8, 0.3],
        ];
        let ys = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
        ];
        Dataset::from_rows(&xs, &ys).unwrap()
    }

    fn cfg(epochs: usize, batch_size: usize) -> FitConfig {
        FitConfig {
            epochs,
            lr: 0.5,
            batch_size,
            shuffle: Shuffle::Seeded(7),
            train_eval_subset: 10_000,
        }
    }

    #[test]
    fn config_validation() {
        assert!(FitConfig::default().validate().is_ok());
        assert!(FitConfig { epochs: 0, ..FitConfig::default() }.validate().is_err());
        assert!(FitConfig { batch_size: 0, ..FitConfig::default() }.validate().is_err());
        assert!(FitConfig { lr: f64::NAN, ..FitConfig::default() }.validate().is_err());
        assert!(FitConfig { lr: -0.1, ..FitConfig::default() }.validate().is_err());
        assert!(
            FitConfig { train_eval_subset: 0, ..FitConfig::default() }
                .validate()
                .is_err()
        );
    }

    #[test]
    fn fit_reports_every_epoch() {
        let train = toy();
        let mut mlp = Mlp::new_with_seed(2, 4, 2, 1).unwrap();
        let report = mlp.fit(&train, Some(&train), &cfg(3, 2)).unwrap();

        assert!(!report.cancelled);
        assert_eq!(report.epochs.len(), 3);
        for (i, e) in report.epochs.iter().enumerate() {
            assert_eq!(e.epoch, i + 1);
            assert!(e.mean_loss.is_finite());
            assert!((0.0..=1.0).contains(&e.train_accuracy));
            assert_eq!(e.test_accuracy, Some(e.train_accuracy));
        }
    }

    #[test]
    fn seeded_fit_is_deterministic() {
        let train = toy();
        let mut a = Mlp::new_with_seed(2, 4, 2, 3).unwrap();
        let mut b = a.clone();
        let ra = a.fit(&train, None, &cfg(2, 2)).unwrap();
        let rb = b.fit(&train, None, &cfg(2, 2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(ra, rb);
    }

    #[test]
    fn train_batch_applies_mean_gradient() {
        let data = toy();
        let mut mlp = Mlp::new_with_seed(2, 3, 2, 11).unwrap();
        let mut expected = mlp.clone();

        let mut buffers = TrainBuffers::new(&mlp, 2);
        let loss = mlp.train_batch(&data, &[0, 3], 0.1, &mut buffers).unwrap();

        let mut cache = expected.forward_cache();
        let mut g = expected.gradients();
        let mut acc = expected.gradients();
        acc.zero();
        let mut manual_loss = 0.0;
        for idx in [0, 3] {
            manual_loss += expected.loss(data.input(idx), data.target(idx), &mut cache).unwrap();
            expected
                .backward(data.input(idx), &cache, data.target(idx), &mut g)
                .unwrap();
            acc.accumulate(&g);
        }
        acc.scale(1.0 / 2.0);
        expected.sgd_step(&acc, 0.1);

        assert_eq!(mlp, expected);
        assert_eq!(loss, manual_loss / 2.0);
    }

    #[test]
    fn train_batch_rejects_bad_indices() {
        let data = toy();
        let mut mlp = Mlp::new_with_seed(2, 3, 2, 0).unwrap();
        let mut buffers = TrainBuffers::new(&mlp, 2);
        assert!(mlp.train_batch(&data, &[], 0.1, &mut buffers).is_err());
        assert!(mlp.train_batch(&data, &[0, 5], 0.1, &mut buffers).is_err());
    }

    #[test]
    fn final_short_batch_is_trained() {
        // 5 samples, batch 2 -> batches of 2, 2, 1.
        let train = toy();
        let mut mlp = Mlp::new_with_seed(2, 3, 2, 5).unwrap();
        let before = mlp.clone();
        let report = mlp
            .fit(
                &train,
                None,
                &FitConfig {
                    shuffle: Shuffle::None,
                    ..cfg(1, 2)
                },
            )
            .unwrap();
        assert_eq!(report.epochs.len(), 1);

        let mut manual = before;
        let mut buffers = TrainBuffers::new(&manual, 2);
        let mut loss_sum = 0.0;
        for batch in [&[0usize, 1][..], &[2, 3], &[4]] {
            loss_sum += manual.train_batch(&train, batch, 0.5, &mut buffers).unwrap();
        }
        assert_eq!(mlp, manual);
        assert_eq!(report.epochs[0].mean_loss, loss_sum / 3.0);
    }

    #[test]
    fn fit_rejects_mismatched_data() {
        let train = toy();
        let mut mlp = Mlp::new_with_seed(3, 3, 2, 0).unwrap();
        let err = mlp.fit(&train, None, &cfg(1, 2)).unwrap_err();
        assert!(matches!(err, Error::InvalidShape(_)));

        let mut mlp = Mlp::new_with_seed(2, 3, 3, 0).unwrap();
        assert!(mlp.fit(&train, None, &cfg(1, 2)).is_err());

        let empty = Dataset::from_flat(vec![], vec![], 2, 2).unwrap();
        let mut mlp = Mlp::new_with_seed(2, 3, 2, 0).unwrap();
        assert!(matches!(
            mlp.fit(&empty, None, &cfg(1, 2)),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn cancelled_before_start_leaves_model_untouched() {
        let train = toy();
        let mut mlp = Mlp::new_with_seed(2, 3, 2, 9).unwrap();
        let before = mlp.clone();

        let token = CancelToken::new();
        token.cancel();
        let report = mlp
            .fit_with_cancel(&train, None, &cfg(5, 2), &token)
            .unwrap();

        assert!(report.cancelled);
        assert!(report.epochs.is_empty());
        assert_eq!(mlp, before);
    }

    #[test]
    fn mean_loss_of_uniform_model_is_ln_k() {
        let mlp = Mlp::zeros(2, 3, 2).unwrap();
        let loss = mlp.mean_loss(&toy()).unwrap();
        assert!((loss - 2.0_f64.ln()).abs() < 1e-9);
    }
}
