#![allow(missing_docs)]
//! Minimal Tensor Algebra and Neural Network Library
//!
//! `minimum_nn` is a small, dependency-light library for training feed-forward
//! networks with hand-written backpropagation. It provides:
//!
//! - Fixed-rank tensors (`Tensor<T, RANK>`) with broadcasting, transposition and batched matrix product
//! - Layers (Dense, ReLU, Sigmoid) with explicit forward and backward passes
//! - Losses (MSE, binary cross entropy)
//! - Optimizers (SGD, Adam) keyed by stable parameter handles
//! - A mini-batch training loop with progress and metric helpers
//!
//! # Features
//!
//! This crate supports optional features to minimize dependencies:
//!
//! - `serialization`: Load `TrainConfig` from JSON with serde (adds `serde`, `serde_json`, `anyhow`)
//! - `logging`: Enable TensorBoard logging (adds `tensorboard-rs`, `chrono`)
//! - `full`: Enable all features
//!
//! By default, **no optional features are enabled**.
//!
//! ```toml
//! [dependencies]
//! minimum_nn = { version = "0.1.0", features = ["serialization"] }
//! ```
//!
//! # Usage Example
//!
//! ```ignore
//! use minimum_nn::ml::funcs::{BCELoss, ReLU, Sigmoid};
//! use minimum_nn::ml::optim::SGD;
//! use minimum_nn::ml::params::{constant, zeros, Dense};
//! use minimum_nn::ml::NeuralNetwork;
//!
//! let mut net = NeuralNetwork::<f32>::new();
//! net.add_layer(Dense::new(4, 16, constant(0.01), zeros()));
//! net.add_layer(ReLU::new());
//! net.add_layer(Dense::new(16, 1, constant(0.01), zeros()));
//! net.add_layer(Sigmoid::new());
//!
//! let history = net.train::<BCELoss<f32>, SGD<f32>>(&x, &y, 20, 8, 0.1)?;
//! let probabilities = net.predict(&x)?;
//! ```

/// Neural network layers, losses, optimizers and the training loop.
pub mod ml;
/// Fixed-rank tensors and their algebra.
pub mod tensor;
/// Utility functions for random number generation.
pub mod utills;

pub use ml::{AnyLayer, Layer, Loss, MlError, NeuralNetwork, Optimizer, ParamId};
pub use tensor::{Tensor, TensorError};

#[cfg(test)]
mod test;
