pub mod rand {
    //! Sampling helpers over `rand`/`rand_distr`.
    //!
    //! The `*_with` variants take any generator so tests and initializers can
    //! pass a seeded [`StdRng`].

    use ::rand::rngs::StdRng;
    use ::rand::seq::SliceRandom;
    use ::rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    pub fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    pub fn normal_with<R: Rng + ?Sized>(rng: &mut R, size: usize, mu: f64, sigma: f64) -> Vec<f64> {
        (0..size)
            .map(|_| {
                let z: f64 = rng.sample(StandardNormal);
                mu + sigma * z
            })
            .collect()
    }

    /// Uniform samples in `[low, high)`; `low` when the range is empty.
    pub fn uniform_with<R: Rng + ?Sized>(rng: &mut R, size: usize, low: f64, high: f64) -> Vec<f64> {
        let span = (high - low).max(0.0);
        (0..size).map(|_| low + span * rng.random::<f64>()).collect()
    }

    /// Random permutation of `0..n`.
    pub fn permutation<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..n).collect();
        idx.shuffle(rng);
        idx
    }
}
