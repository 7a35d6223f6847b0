use std::path::Path;

use chrono::Local;
use tensorboard_rs::summary_writer::SummaryWriter;

use super::progress::TrainObserver;
use super::Real;

/// Writes training losses as TensorBoard scalars.
///
/// Batch losses are written under `{prefix}/batch_loss` at a global step
/// that advances once per batch; epoch means go to `{prefix}/epoch_loss`
/// at the epoch index.
pub struct TensorBoardLogger {
    writer: SummaryWriter,
    prefix: String,
    step: usize,
}

impl TensorBoardLogger {
    /// Run directory `runs/{timestamp}`.
    pub fn timestamped() -> Self {
        let dir = format!("runs/{}", Local::now().format("%Y%m%d-%H%M%S"));
        Self::with_log_dir(dir)
    }

    pub fn with_log_dir<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            writer: SummaryWriter::new(log_dir.as_ref()),
            prefix: "train".to_string(),
            step: 0,
        }
    }

    /// Tag prefix, `train` unless changed.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Batches logged so far.
    pub fn get_step(&self) -> usize {
        self.step
    }

    fn write(&mut self, name: &str, value: f32, step: usize) {
        let tag = format!("{}/{}", self.prefix, name);
        self.writer.add_scalar(&tag, value, step);
    }
}

impl<T: Real> TrainObserver<T> for TensorBoardLogger {
    fn update_batch(&mut self, loss: T) {
        let step = self.step;
        self.write("batch_loss", loss.to_f32().unwrap_or(f32::NAN), step);
        self.step += 1;
    }

    fn finish_epoch(&mut self, epoch: usize, avg_loss: T) {
        self.write("epoch_loss", avg_loss.to_f32().unwrap_or(f32::NAN), epoch);
    }

    fn finish(&mut self) {
        self.writer.flush();
    }
}

impl Drop for TensorBoardLogger {
    fn drop(&mut self) {
        self.writer.flush();
    }
}
