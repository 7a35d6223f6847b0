use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{check_same_shape, real, Layer, MlError, Optimizer, ParamId, Real, Result, Tensor};
use crate::utills::rand::{normal_with, uniform_with};

/// Fully connected layer: `Y = X·W + b`.
///
/// `W` is `[in, out]`, `b` holds one bias per output column.
#[derive(Debug, Clone)]
pub struct Dense<T> {
    weights: Tensor<T, 2>,
    bias: Tensor<T, 1>,
    weight_grad: Tensor<T, 2>,
    bias_grad: Tensor<T, 1>,
    input: Option<Tensor<T, 2>>,
    weight_id: ParamId,
    bias_id: ParamId,
}

impl<T: Real> Dense<T> {
    /// `init_w` fills the `[in, out]` weights, `init_b` fills a `[1, out]` bias row.
    pub fn new<W, B>(in_features: usize, out_features: usize, init_w: W, init_b: B) -> Self
    where
        W: FnOnce(&mut Tensor<T, 2>),
        B: FnOnce(&mut Tensor<T, 2>),
    {
        let mut weights = Tensor::new([in_features, out_features]);
        init_w(&mut weights);

        let mut bias_row = Tensor::<T, 2>::new([1, out_features]);
        init_b(&mut bias_row);
        let mut bias = Tensor::new([out_features]);
        for (b, v) in bias.iter_mut().zip(bias_row.iter()) {
            *b = *v;
        }

        Self {
            weights,
            bias,
            weight_grad: Tensor::new([in_features, out_features]),
            bias_grad: Tensor::new([out_features]),
            input: None,
            weight_id: ParamId::next(),
            bias_id: ParamId::next(),
        }
    }

    /// Xavier-normal weights, zero bias.
    pub fn auto(in_features: usize, out_features: usize) -> Self {
        Self::new(in_features, out_features, xavier_normal(in_features), zeros())
    }

    pub fn in_features(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn weights(&self) -> &Tensor<T, 2> {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut Tensor<T, 2> {
        &mut self.weights
    }

    pub fn bias(&self) -> &Tensor<T, 1> {
        &self.bias
    }

    pub fn bias_mut(&mut self) -> &mut Tensor<T, 1> {
        &mut self.bias
    }

    pub fn weight_grad(&self) -> &Tensor<T, 2> {
        &self.weight_grad
    }

    pub fn bias_grad(&self) -> &Tensor<T, 1> {
        &self.bias_grad
    }

    /// Handles of the weight and bias tensors.
    pub fn param_ids(&self) -> (ParamId, ParamId) {
        (self.weight_id, self.bias_id)
    }

    fn bias_row(bias: &Tensor<T, 1>) -> Result<Tensor<T, 2>> {
        Ok(Tensor::from_vec([1, bias.size()], bias.as_slice().to_vec())?)
    }
}

impl<T: Real> Layer<T> for Dense<T> {
    fn forward(&mut self, input: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let out = input.matmul(&self.weights)?;
        let out = (&out + &Self::bias_row(&self.bias)?)?;
        self.input = Some(input.clone());
        Ok(out)
    }

    fn backward(&mut self, output_grad: &Tensor<T, 2>) -> Result<Tensor<T, 2>> {
        let input = self
            .input
            .as_ref()
            .ok_or(MlError::BackwardBeforeForward { layer: "Dense" })?;

        let weight_grad = input.transpose_2d()?.matmul(output_grad)?;
        let input_grad = output_grad.matmul(&self.weights.transpose_2d()?)?;

        self.weight_grad = weight_grad;
        self.bias_grad = Tensor::from_vec([self.out_features()], output_grad.sum_axis0().into_vec())?;
        Ok(input_grad)
    }

    /// Both tensors are updated on copies and written back together, so a
    /// failed update leaves the layer unchanged.
    fn update_params(&mut self, optimizer: &mut dyn Optimizer<T>) -> Result<()> {
        check_same_shape(&self.weights, &self.weight_grad, "Dense weights")?;
        let mut bias = Self::bias_row(&self.bias)?;
        let bias_grad = Self::bias_row(&self.bias_grad)?;
        check_same_shape(&bias, &bias_grad, "Dense bias")?;

        let mut weights = self.weights.clone();
        optimizer.update(self.weight_id, &mut weights, &self.weight_grad)?;
        optimizer.update(self.bias_id, &mut bias, &bias_grad)?;

        self.weights = weights;
        self.bias.assign(bias.as_slice())?;
        Ok(())
    }

    fn has_params(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Dense"
    }
}

/// Leaves every element at zero.
pub fn zeros<T: Real>() -> impl FnOnce(&mut Tensor<T, 2>) {
    |t| t.fill(T::zero())
}

pub fn constant<T: Real>(value: T) -> impl FnOnce(&mut Tensor<T, 2>) {
    move |t| t.fill(value)
}

/// Normal samples with standard deviation `sqrt(1 / fan_in)`.
pub fn xavier_normal<T: Real>(fan_in: usize) -> impl FnOnce(&mut Tensor<T, 2>) {
    move |t| {
        let mut rng = rand::rng();
        fill_normal(t, fan_in, &mut rng);
    }
}

/// Reproducible [`xavier_normal`].
pub fn xavier_normal_seeded<T: Real>(fan_in: usize, seed: u64) -> impl FnOnce(&mut Tensor<T, 2>) {
    move |t| {
        let mut rng = StdRng::seed_from_u64(seed);
        fill_normal(t, fan_in, &mut rng);
    }
}

/// Uniform samples in `[low, high)`.
pub fn uniform<T: Real>(low: f64, high: f64) -> impl FnOnce(&mut Tensor<T, 2>) {
    move |t| {
        let mut rng = rand::rng();
        fill_uniform(t, low, high, &mut rng);
    }
}

pub fn uniform_seeded<T: Real>(low: f64, high: f64, seed: u64) -> impl FnOnce(&mut Tensor<T, 2>) {
    move |t| {
        let mut rng = StdRng::seed_from_u64(seed);
        fill_uniform(t, low, high, &mut rng);
    }
}

fn fill_normal<T: Real, R: rand::Rng + ?Sized>(t: &mut Tensor<T, 2>, fan_in: usize, rng: &mut R) {
    let sigma = (1.0 / fan_in.max(1) as f64).sqrt();
    let samples = normal_with(rng, t.size(), 0.0, sigma);
    for (v, s) in t.iter_mut().zip(samples) {
        *v = real(s);
    }
}

fn fill_uniform<T: Real, R: rand::Rng + ?Sized>(t: &mut Tensor<T, 2>, low: f64, high: f64, rng: &mut R) {
    let samples = uniform_with(rng, t.size(), low, high);
    for (v, s) in t.iter_mut().zip(samples) {
        *v = real(s);
    }
}
