/// Training configuration (JSON loading requires the `serialization` feature).
pub mod config;
/// Activation layers and loss functions.
pub mod funcs;
/// Logging utilities for training (requires `logging` feature).
#[cfg(feature = "logging")]
pub mod logger;
/// Metrics for model evaluation.
pub mod metrics;
/// Optimization algorithms (SGD, Adam).
pub mod optim;
/// Parameterized layers and weight initializers.
pub mod params;
/// Progress tracking utilities.
pub mod progress;

/// Appends layers to a network in order, or builds a new one.
///
/// # Example
/// ```ignore
/// let mut net = sequential!([
///     Dense::auto(2, 16),
///     ReLU::new(),
///     Dense::auto(16, 1),
///     Sigmoid::new(),
/// ]);
/// let last = sequential!(net, [Dense::auto(1, 1)]);
/// ```
#[macro_export]
macro_rules! sequential {
    ([$($layer:expr),* $(,)?]) => {{
        let mut net = $crate::ml::NeuralNetwork::new();
        $(
            net.add_layer($layer);
        )*
        net
    }};
    ($net:expr, [$($layer:expr),* $(,)?]) => {{
        let net = &mut $net;
        let mut last = net.len();
        $(
            last = net.add_layer($layer);
        )*
        last
    }};
}

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use num_traits::{Float, NumCast};
use thiserror::Error;
use tracing::{debug, instrument, trace};

pub use crate::tensor::{Tensor, TensorError};

use self::config::{LossKind, OptimizerKind, TrainConfig};
use self::funcs::{BCELoss, MSELoss, ReLU, Sigmoid};
use self::optim::{Adam, SGD};
use self::params::Dense;
use self::progress::{NoopObserver, TrainHistory, TrainObserver};

/// Scalar types the network can be trained in.
pub trait Real: Float + Debug + Display + Send + Sync + 'static {}

impl<T> Real for T where T: Float + Debug + Display + Send + Sync + 'static {}

/// Converts an `f64` constant into `T`.
pub(crate) fn real<T: Real>(v: f64) -> T {
    <T as NumCast>::from(v).unwrap_or_else(T::nan)
}

/// Errors raised by layers, losses, optimizers and the training loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MlError {
    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("{layer}: backward called before forward")]
    BackwardBeforeForward { layer: &'static str },

    #[error("batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("input has {inputs} rows but labels have {labels}")]
    RowMismatch { inputs: usize, labels: usize },
}

pub type Result<T> = std::result::Result<T, MlError>;

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(0);

/// Stable handle naming one trainable tensor.
///
/// Optimizers key their per-parameter state by this handle, so state follows
/// the parameter no matter where its buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    /// Allocates a handle never returned before in this process.
    pub fn next() -> Self {
        ParamId(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A pipeline stage: forward transform, gradient transform, parameter update.
///
/// Inputs and outputs are `[batch, features]` matrices.
pub trait Layer<T: Real> {
    fn forward(&mut self, input: &Tensor<T, 2>) -> Result<Tensor<T, 2>>;
    /// Takes the gradient w.r.t. this layer's output, returns it w.r.t. the input.
    fn backward(&mut self, output_grad: &Tensor<T, 2>) -> Result<Tensor<T, 2>>;
    fn update_params(&mut self, _optimizer: &mut dyn Optimizer<T>) -> Result<()> {
        Ok(())
    }
    fn has_params(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str;
}

/// Trait for optimization algorithms.
pub trait Optimizer<T: Real> {
    fn from_learning_rate(lr: T) -> Self
    where
        Self: Sized;
    /// Applies one update to `params` in place.
    fn update(&mut self, id: ParamId, params: &mut Tensor<T, 2>, grads: &Tensor<T, 2>) -> Result<()>;
    /// Marks the end of one mini-batch.
    fn step(&mut self) {}
}

/// Per-batch loss value and its gradient w.r.t. the predictions.
pub trait Loss<T: Real>: Sized {
    fn new(predictions: &Tensor<T, 2>, targets: &Tensor<T, 2>) -> Result<Self>;
    fn loss(&self) -> T;
    fn loss_gradient(&self) -> Tensor<T, 2>;
}

pub(crate) fn check_same_shape<T>(a: &Tensor<T, 2>, b: &Tensor<T, 2>, what: &str) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(TensorError::IncompatibleShape(format!(
            "{}: shapes {:?} and {:?} differ",
            what,
            a.shape(),
            b.shape()
        ))
        .into());
    }
    Ok(())
}

/// The closed set of layers a [`NeuralNetwork`] can hold.
#[derive(Debug, Clone)]
pub enum AnyLayer<T> {
    Dense(Dense<T>),
    ReLU(ReLU<T>),
    Sigmoid(Sigmoid<T>),
}

impl<T: Real> Layer<T> for AnyLayer<T> {
    fn forward(&mut self, input: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        match self {
            AnyLayer::Dense(l) => l.forward(input),
            AnyLayer::ReLU(l) => l.forward(input),
            AnyLayer::Sigmoid(l) => l.forward(input),
        }
    }

    fn backward(&mut self, output_grad: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        match self {
            AnyLayer::Dense(l) => l.backward(output_grad),
            AnyLayer::ReLU(l) => l.backward(output_grad),
            AnyLayer::Sigmoid(l) => l.backward(output_grad),
        }
    }

    fn update_params(&mut self, optimizer: &mut dyn Optimizer<T>) -> Result<()> {
        match self {
            AnyLayer::Dense(l) => l.update_params(optimizer),
            AnyLayer::ReLU(l) => l.update_params(optimizer),
            AnyLayer::Sigmoid(l) => l.update_params(optimizer),
        }
    }

    fn has_params(&self) -> bool {
        match self {
            AnyLayer::Dense(l) => l.has_params(),
            AnyLayer::ReLU(l) => l.has_params(),
            AnyLayer::Sigmoid(l) => l.has_params(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AnyLayer::Dense(l) => l.name(),
            AnyLayer::ReLU(l) => l.name(),
            AnyLayer::Sigmoid(l) => l.name(),
        }
    }
}

impl<T> From<Dense<T>> for AnyLayer<T> {
    fn from(layer: Dense<T>) -> Self {
        AnyLayer::Dense(layer)
    }
}

impl<T> From<ReLU<T>> for AnyLayer<T> {
    fn from(layer: ReLU<T>) -> Self {
        AnyLayer::ReLU(layer)
    }
}

impl<T> From<Sigmoid<T>> for AnyLayer<T> {
    fn from(layer: Sigmoid<T>) -> Self {
        AnyLayer::Sigmoid(layer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Layers added, nothing run yet.
    Built,
    /// At least one forward pass completed.
    Ready,
}

/// Ordered stack of layers trained with mini-batch gradient descent.
#[derive(Debug, Clone)]
pub struct NeuralNetwork<T> {
    layers: Vec<AnyLayer<T>>,
    output: Option<Tensor<T, 2>>,
}

impl<T: Real> Default for NeuralNetwork<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> NeuralNetwork<T> {
    pub fn new() -> Self {
        NeuralNetwork {
            layers: Vec::new(),
            output: None,
        }
    }

    /// Appends a layer and returns its position.
    pub fn add_layer(&mut self, layer: impl Into<AnyLayer<T>>) -> usize {
        self.layers.push(layer.into());
        self.layers.len() - 1
    }

    pub fn layers(&self) -> &[AnyLayer<T>] {
        &self.layers
    }

    /// Number of layers that own trainable parameters.
    pub fn trainable_layers(&self) -> usize {
        self.layers.iter().filter(|l| l.has_params()).count()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn state(&self) -> NetworkState {
        if self.output.is_some() {
            NetworkState::Ready
        } else {
            NetworkState::Built
        }
    }

    /// Output of the most recent forward pass.
    pub fn last_output(&self) -> Option<&Tensor<T, 2>> {
        self.output.as_ref()
    }

    pub fn forward(&mut self, input: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let mut x = input.clone();
        for layer in self.layers.iter_mut() {
            x = layer.forward(&x)?;
        }
        self.output = Some(x.clone());
        Ok(x)
    }

    /// Runs the gradient through every layer in reverse, returning it w.r.t. the input.
    pub fn backward(&mut self, grad: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let mut g = grad.clone();
        for layer in self.layers.iter_mut().rev() {
            g = layer.backward(&g)?;
        }
        Ok(g)
    }

    pub fn update_params(&mut self, optimizer: &mut dyn Optimizer<T>) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.update_params(optimizer)?;
        }
        Ok(())
    }

    pub fn predict(&mut self, input: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        self.forward(input)
    }

    /// Trains with loss `L` and a fresh optimizer `O` built from `lr`.
    pub fn train<L, O>(
        &mut self,
        inputs: &Tensor<T, 2>,
        labels: &Tensor<T, 2>,
        epochs: usize,
        batch_size: usize,
        lr: T,
    ) -> Result<TrainHistory<T>>
    where
        L: Loss<T>,
        O: Optimizer<T>,
    {
        let mut optimizer = O::from_learning_rate(lr);
        self.train_with::<L, O>(inputs, labels, epochs, batch_size, &mut optimizer, &mut NoopObserver)
    }

    /// Mini-batch training loop.
    ///
    /// Batches are contiguous row ranges in input order; the last one may be
    /// smaller. Each batch runs forward, loss, backward, parameter update and
    /// then `optimizer.step()`.
    #[instrument(level = "debug", skip_all, fields(rows = inputs.shape()[0], epochs = epochs, batch_size = batch_size))]
    pub fn train_with<L, O>(
        &mut self,
        inputs: &Tensor<T, 2>,
        labels: &Tensor<T, 2>,
        epochs: usize,
        batch_size: usize,
        optimizer: &mut O,
        observer: &mut dyn TrainObserver<T>,
    ) -> Result<TrainHistory<T>>
    where
        L: Loss<T>,
        O: Optimizer<T>,
    {
        if batch_size == 0 {
            return Err(MlError::InvalidBatchSize);
        }
        let rows = inputs.shape()[0];
        if rows != labels.shape()[0] {
            return Err(MlError::RowMismatch {
                inputs: rows,
                labels: labels.shape()[0],
            });
        }

        let batches = rows.div_ceil(batch_size);
        let mut history = TrainHistory::new();
        debug!(trainable = self.trainable_layers(), batches, "training started");
        observer.start_training(epochs, batches);

        for epoch in 0..epochs {
            observer.start_epoch(epoch);
            let mut total = T::zero();

            for batch in 0..batches {
                let start = batch * batch_size;
                let len = batch_size.min(rows - start);
                let x = inputs.slice_rows(start, len)?;
                let y = labels.slice_rows(start, len)?;

                let pred = self.forward(&x)?;
                let loss = L::new(&pred, &y)?;
                self.backward(&loss.loss_gradient())?;
                self.update_params(optimizer)?;
                optimizer.step();

                let value = loss.loss();
                trace!(epoch, batch, loss = %value, "batch");
                observer.update_batch(value);
                total = total + value;
            }

            if batches > 0 {
                let mean = total / real::<T>(batches as f64);
                debug!(epoch, loss = %mean, "epoch finished");
                history.push(mean);
                observer.finish_epoch(epoch, mean);
            }
        }

        observer.finish();
        Ok(history)
    }

    /// Trains with the loss and optimizer named in `config`.
    pub fn fit(
        &mut self,
        inputs: &Tensor<T, 2>,
        labels: &Tensor<T, 2>,
        config: &TrainConfig,
        observer: &mut dyn TrainObserver<T>,
    ) -> Result<TrainHistory<T>> {
        let lr = real::<T>(config.learning_rate);
        match config.optimizer {
            OptimizerKind::Sgd => {
                let mut optimizer = SGD::new(lr);
                self.fit_with(inputs, labels, config, &mut optimizer, observer)
            }
            OptimizerKind::Adam {
                beta1,
                beta2,
                epsilon,
            } => {
                let mut optimizer = Adam::with_params(lr, real(beta1), real(beta2), real(epsilon));
                self.fit_with(inputs, labels, config, &mut optimizer, observer)
            }
        }
    }

    fn fit_with<O: Optimizer<T>>(
        &mut self,
        inputs: &Tensor<T, 2>,
        labels: &Tensor<T, 2>,
        config: &TrainConfig,
        optimizer: &mut O,
        observer: &mut dyn TrainObserver<T>,
    ) -> Result<TrainHistory<T>> {
        let (epochs, batch_size) = (config.epochs, config.batch_size);
        match config.loss {
            LossKind::Mse => {
                self.train_with::<MSELoss<T>, O>(inputs, labels, epochs, batch_size, optimizer, observer)
            }
            LossKind::Bce => {
                self.train_with::<BCELoss<T>, O>(inputs, labels, epochs, batch_size, optimizer, observer)
            }
        }
    }

    /// Parameter handles of every trainable layer, keyed by layer position.
    pub fn param_ids(&self) -> HashMap<usize, Vec<ParamId>> {
        let mut ids = HashMap::new();
        for (i, layer) in self.layers.iter().enumerate() {
            if let AnyLayer::Dense(dense) = layer {
                let (w, b) = dense.param_ids();
                ids.insert(i, vec![w, b]);
            }
        }
        ids
    }
}
