//! Simple training progress display without external dependencies

use std::io::{self, Write};

use super::Real;

/// Callbacks fired by the training loop.
pub trait TrainObserver<T: Real> {
    fn start_training(&mut self, _epochs: usize, _batches_per_epoch: usize) {}
    fn start_epoch(&mut self, _epoch: usize) {}
    fn update_batch(&mut self, _loss: T) {}
    fn finish_epoch(&mut self, _epoch: usize, _avg_loss: T) {}
    fn finish(&mut self) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<T: Real> TrainObserver<T> for NoopObserver {}

/// Simple training progress tracker
pub struct TrainingProgress {
    num_epochs: usize,
    batches_per_epoch: usize,
    current_epoch: usize,
    current_batch: usize,
    quiet: bool,
}

impl Default for TrainingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingProgress {
    pub fn new() -> Self {
        Self {
            num_epochs: 0,
            batches_per_epoch: 0,
            current_epoch: 0,
            current_batch: 0,
            quiet: false,
        }
    }

    /// Only prints the per-epoch summary lines.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::new()
        }
    }

    /// 1-based index of the running epoch, 0 before the first one starts.
    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }

    /// Batches seen in the running epoch.
    pub fn current_batch(&self) -> usize {
        self.current_batch
    }
}

impl<T: Real> TrainObserver<T> for TrainingProgress {
    fn start_training(&mut self, epochs: usize, batches_per_epoch: usize) {
        self.num_epochs = epochs;
        self.batches_per_epoch = batches_per_epoch;
        self.current_epoch = 0;
    }

    fn start_epoch(&mut self, _epoch: usize) {
        self.current_epoch += 1;
        self.current_batch = 0;
    }

    fn update_batch(&mut self, loss: T) {
        self.current_batch += 1;
        if self.quiet {
            return;
        }
        print!(
            "\r  Epoch [{}/{}] Batch [{}/{}] loss: {:.4}",
            self.current_epoch, self.num_epochs, self.current_batch, self.batches_per_epoch, loss
        );
        io::stdout().flush().ok();
    }

    fn finish_epoch(&mut self, _epoch: usize, avg_loss: T) {
        println!(
            "\r  Epoch [{}/{}] Completed - loss: {:.4}",
            self.current_epoch, self.num_epochs, avg_loss
        );
    }

    fn finish(&mut self) {
        println!("Training complete!");
    }
}

/// Mean training loss of every finished epoch, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainHistory<T> {
    losses: Vec<T>,
}

impl<T: Real> Default for TrainHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> TrainHistory<T> {
    pub fn new() -> Self {
        Self { losses: Vec::new() }
    }

    pub fn push(&mut self, loss: T) {
        self.losses.push(loss);
    }

    pub fn losses(&self) -> &[T] {
        &self.losses
    }

    pub fn first(&self) -> Option<T> {
        self.losses.first().copied()
    }

    pub fn last(&self) -> Option<T> {
        self.losses.last().copied()
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }

    /// Whether the last epoch ended with a lower loss than the first.
    pub fn improved(&self) -> bool {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last < first,
            _ => false,
        }
    }
}
