use std::collections::HashMap;

use super::{check_same_shape, real, Optimizer, ParamId, Real, Result, Tensor};

/// Plain gradient descent: `params -= lr * grads`.
#[derive(Debug, Clone)]
pub struct SGD<T> {
    alpha: T,
}

impl<T: Real> SGD<T> {
    pub fn new(alpha: T) -> Self {
        Self { alpha }
    }

    pub fn learning_rate(&self) -> T {
        self.alpha
    }
}

impl<T: Real> Default for SGD<T> {
    fn default() -> Self {
        Self::new(real(0.01))
    }
}

impl<T: Real> Optimizer<T> for SGD<T> {
    fn from_learning_rate(lr: T) -> Self {
        Self::new(lr)
    }

    fn update(&mut self, _: ParamId, params: &mut Tensor<T, 2>, grads: &Tensor<T, 2>) -> Result<()> {
        check_same_shape(params, grads, "SGD update")?;
        for (p, &g) in params.iter_mut().zip(grads.iter()) {
            *p = *p - self.alpha * g;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Moments<T> {
    m: Tensor<T, 2>,
    v: Tensor<T, 2>,
}

/// Adam with bias-corrected first and second moments.
///
/// Moments are created lazily per [`ParamId`]. The step counter advances in
/// [`Optimizer::step`] only; every update inside one batch uses
/// `t = completed steps + 1`.
#[derive(Debug, Clone)]
pub struct Adam<T> {
    alpha: T,
    beta1: T,
    beta2: T,
    epsilon: T,
    t: u64,
    moments: HashMap<ParamId, Moments<T>>,
}

impl<T: Real> Adam<T> {
    pub fn new(alpha: T) -> Self {
        Self::with_params(alpha, real(0.9), real(0.999), real(1e-8))
    }

    pub fn with_params(alpha: T, beta1: T, beta2: T, epsilon: T) -> Self {
        Adam {
            alpha,
            beta1,
            beta2,
            epsilon,
            t: 0,
            moments: HashMap::new(),
        }
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.t
    }

    /// Drops all moment state and restarts the step counter.
    pub fn reset(&mut self) {
        self.t = 0;
        self.moments.clear();
    }

    /// Number of parameters with moment state.
    pub fn tracked_params(&self) -> usize {
        self.moments.len()
    }

    /// First moment of `id`, if it has been updated.
    pub fn first_moment(&self, id: ParamId) -> Option<&Tensor<T, 2>> {
        self.moments.get(&id).map(|s| &s.m)
    }

    pub fn second_moment(&self, id: ParamId) -> Option<&Tensor<T, 2>> {
        self.moments.get(&id).map(|s| &s.v)
    }
}

impl<T: Real> Default for Adam<T> {
    fn default() -> Self {
        Self::new(real(0.001))
    }
}

impl<T: Real> Optimizer<T> for Adam<T> {
    fn from_learning_rate(lr: T) -> Self {
        Self::new(lr)
    }

    fn update(&mut self, id: ParamId, params: &mut Tensor<T, 2>, grads: &Tensor<T, 2>) -> Result<()> {
        check_same_shape(params, grads, "Adam update")?;

        let shape = *params.shape();
        let state = self.moments.entry(id).or_insert_with(|| Moments {
            m: Tensor::new(shape),
            v: Tensor::new(shape),
        });
        check_same_shape(&state.m, params, "Adam moments")?;

        let one = T::one();
        let t = real::<T>((self.t + 1) as f64);
        let correction1 = one - self.beta1.powf(t);
        let correction2 = one - self.beta2.powf(t);

        let (b1, b2) = (self.beta1, self.beta2);
        let m_data = state.m.as_mut_slice();
        let v_data = state.v.as_mut_slice();
        let p_data = params.as_mut_slice();
        let g_data = grads.as_slice();

        for i in 0..g_data.len() {
            let g = g_data[i];
            m_data[i] = b1 * m_data[i] + (one - b1) * g;
            v_data[i] = b2 * v_data[i] + (one - b2) * g * g;

            let m_hat = m_data[i] / correction1;
            let v_hat = v_data[i] / correction2;
            p_data[i] = p_data[i] - self.alpha * m_hat / (v_hat.sqrt() + self.epsilon);
        }
        Ok(())
    }

    fn step(&mut self) {
        self.t += 1;
    }
}
