use super::{check_same_shape, Real, Result, Tensor};

/// Classification metrics for evaluating model performance
pub struct ClassificationMetrics;

impl ClassificationMetrics {
    /// Fraction of elements where `prediction >= threshold` agrees with
    /// `target >= threshold`.
    ///
    /// Both tensors are `[batch, outputs]` of the same shape. An empty batch
    /// scores 0.
    pub fn binary_accuracy<T: Real>(
        predictions: &Tensor<T, 2>,
        targets: &Tensor<T, 2>,
        threshold: T,
    ) -> Result<f64> {
        check_same_shape(predictions, targets, "binary accuracy")?;
        if predictions.size() == 0 {
            return Ok(0.0);
        }
        let correct = predictions
            .iter()
            .zip(targets.iter())
            .filter(|(&p, &y)| (p >= threshold) == (y >= threshold))
            .count();
        Ok(correct as f64 / predictions.size() as f64)
    }

    /// Fraction of rows whose argmax matches the target row's argmax
    /// (one-hot targets).
    pub fn accuracy<T: Real>(predictions: &Tensor<T, 2>, targets: &Tensor<T, 2>) -> Result<f64> {
        check_same_shape(predictions, targets, "accuracy")?;
        let [rows, cols] = *predictions.shape();
        if rows == 0 || cols == 0 {
            return Ok(0.0);
        }
        let pred = predictions.as_slice();
        let truth = targets.as_slice();
        let correct = (0..rows)
            .filter(|&r| argmax(&pred[r * cols..(r + 1) * cols]) == argmax(&truth[r * cols..(r + 1) * cols]))
            .count();
        Ok(correct as f64 / rows as f64)
    }
}

/// Index of the first maximum; NaN never wins.
fn argmax<T: Real>(row: &[T]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Convenience function for thresholded accuracy
pub fn binary_accuracy<T: Real>(predictions: &Tensor<T, 2>, targets: &Tensor<T, 2>, threshold: T) -> Result<f64> {
    ClassificationMetrics::binary_accuracy(predictions, targets, threshold)
}

/// Convenience function for accuracy calculation
pub fn accuracy<T: Real>(predictions: &Tensor<T, 2>, targets: &Tensor<T, 2>) -> Result<f64> {
    ClassificationMetrics::accuracy(predictions, targets)
}
