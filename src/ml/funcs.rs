use super::{check_same_shape, real, Layer, Loss, MlError, Real, Result, Tensor};

/// Scalar rule of an elementwise activation.
pub trait SingleShoot<T: Real> {
    fn single_forward(&self, x: T) -> T;
    /// Local derivative, given the input `x` and the output `y` it produced.
    fn single_backward(&self, x: T, y: T) -> T;
}

fn chain<T: Real>(grad: &Tensor<T, 2>, local: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
    check_same_shape(grad, local, "activation gradient")?;
    Ok(grad.zip_with(local, |g, d| g * d)?)
}

/// `max(0, x)`.
#[derive(Debug, Clone)]
pub struct ReLU<T> {
    input: Option<Tensor<T, 2>>,
}

impl<T: Real> Default for ReLU<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> ReLU<T> {
    pub fn new() -> Self {
        ReLU { input: None }
    }
}

impl<T: Real> SingleShoot<T> for ReLU<T> {
    fn single_forward(&self, x: T) -> T {
        x.max(T::zero())
    }

    fn single_backward(&self, x: T, _: T) -> T {
        if x > T::zero() {
            T::one()
        } else {
            T::zero()
        }
    }
}

impl<T: Real> Layer<T> for ReLU<T> {
    fn forward(&mut self, input: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let out = input.map(|x| self.single_forward(x));
        self.input = Some(input.clone());
        Ok(out)
    }

    fn backward(&mut self, output_grad: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let input = self
            .input
            .as_ref()
            .ok_or(MlError::BackwardBeforeForward { layer: "ReLU" })?;
        let local = input.map(|x| self.single_backward(x, x));
        chain(output_grad, &local)
    }

    fn name(&self) -> &'static str {
        "ReLU"
    }
}

/// `1 / (1 + e^-x)`.
#[derive(Debug, Clone)]
pub struct Sigmoid<T> {
    output: Option<Tensor<T, 2>>,
}

impl<T: Real> Default for Sigmoid<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Sigmoid<T> {
    pub fn new() -> Self {
        Sigmoid { output: None }
    }
}

impl<T: Real> SingleShoot<T> for Sigmoid<T> {
    fn single_forward(&self, x: T) -> T {
        T::one() / (T::one() + (-x).exp())
    }

    fn single_backward(&self, _: T, y: T) -> T {
        y * (T::one() - y)
    }
}

impl<T: Real> Layer<T> for Sigmoid<T> {
    fn forward(&mut self, input: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let out = input.map(|x| self.single_forward(x));
        self.output = Some(out.clone());
        Ok(out)
    }

    fn backward(&mut self, output_grad: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let output = self
            .output
            .as_ref()
            .ok_or(MlError::BackwardBeforeForward { layer: "Sigmoid" })?;
        let local = output.map(|y| self.single_backward(y, y));
        chain(output_grad, &local)
    }

    fn name(&self) -> &'static str {
        "Sigmoid"
    }
}

/// Mean squared error.
#[derive(Debug, Clone)]
pub struct MSELoss<T> {
    loss: T,
    gradient: Tensor<T, 2>,
}

impl<T: Real> Loss<T> for MSELoss<T> {
    fn new(predictions: &Tensor<T, 2>, targets: &Tensor<T, 2>) -> Result<Self> {
        check_same_shape(predictions, targets, "MSELoss")?;
        let diff = (predictions - targets)?;
        let n = real::<T>(diff.size().max(1) as f64);

        let loss = diff.iter().fold(T::zero(), |acc, &d| acc + d * d) / n;
        let two = real::<T>(2.0);
        let gradient = diff.map(|d| two * d / n);
        Ok(Self { loss, gradient })
    }

    fn loss(&self) -> T {
        self.loss
    }

    fn loss_gradient(&self) -> Tensor<T, 2> {
        self.gradient.clone()
    }
}

/// Binary cross entropy over probabilities.
///
/// Predictions are clamped to `[EPS, 1 - EPS]` before both the loss and the
/// gradient are taken.
#[derive(Debug, Clone)]
pub struct BCELoss<T> {
    loss: T,
    gradient: Tensor<T, 2>,
}

impl<T> BCELoss<T> {
    pub const EPS: f64 = 1e-7;
}

impl<T: Real> Loss<T> for BCELoss<T> {
    fn new(predictions: &Tensor<T, 2>, targets: &Tensor<T, 2>) -> Result<Self> {
        check_same_shape(predictions, targets, "BCELoss")?;
        let eps = real::<T>(Self::EPS);
        let one = T::one();
        let clamped = predictions.map(|p| p.max(eps).min(one - eps));
        let n = real::<T>(clamped.size().max(1) as f64);

        let mut total = T::zero();
        for (&p, &y) in clamped.iter().zip(targets.iter()) {
            total = total - (y * p.ln() + (one - y) * (one - p).ln());
        }
        let gradient = clamped.zip_with(targets, |p, y| (p - y) / (p * (one - p) * n))?;

        Ok(Self {
            loss: total / n,
            gradient,
        })
    }

    fn loss(&self) -> T {
        self.loss
    }

    fn loss_gradient(&self) -> Tensor<T, 2> {
        self.gradient.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<f64>) -> Tensor<f64, 2> {
        Tensor::from_vec([1, values.len()], values).unwrap()
    }

    #[test]
    fn test_relu_masks_negative_inputs() {
        let mut relu = ReLU::new();
        let out = relu.forward(&row(vec![-1.0, 0.0, 2.0])).unwrap();
        assert_eq!(out.as_slice(), &[0.0, 0.0, 2.0]);
        let grad = relu.backward(&row(vec![5.0, 5.0, 5.0])).unwrap();
        assert_eq!(grad.as_slice(), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_sigmoid_backward_uses_output() {
        let mut sigmoid = Sigmoid::new();
        let out = sigmoid.forward(&row(vec![0.0])).unwrap();
        assert_eq!(out.as_slice(), &[0.5]);
        let grad = sigmoid.backward(&row(vec![1.0])).unwrap();
        assert!((grad.as_slice()[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_backward_before_forward() {
        let mut sigmoid = Sigmoid::<f32>::new();
        let grad = Tensor::<f32, 2>::new([1, 1]);
        assert_eq!(
            sigmoid.backward(&grad).unwrap_err(),
            MlError::BackwardBeforeForward { layer: "Sigmoid" }
        );
    }

    #[test]
    fn test_mse() {
        let loss = MSELoss::new(&row(vec![1.0, 3.0]), &row(vec![0.0, 1.0])).unwrap();
        assert!((loss.loss() - 2.5).abs() < 1e-12);
        assert_eq!(loss.loss_gradient().as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_bce_clamps_saturated_predictions() {
        let loss = BCELoss::new(&row(vec![1.0, 0.0]), &row(vec![1.0, 0.0])).unwrap();
        assert!(loss.loss().is_finite());
        assert!(loss.loss_gradient().iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_loss_shape_mismatch() {
        let err = MSELoss::new(&row(vec![1.0, 2.0]), &row(vec![1.0])).unwrap_err();
        assert!(matches!(err, MlError::Tensor(_)));
    }
}
