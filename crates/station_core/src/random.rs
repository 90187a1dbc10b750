//! Normally-distributed samples for every stochastic decision in a cycle.
//!
//! The engine only ever asks for `Normal(mean, stddev)` draws through
//! [`NormalSource`], so a run is fully determined by the source it was given.

use std::collections::VecDeque;
use std::f64::consts::PI;

use rand::Rng;

pub trait NormalSource: Send {
    /// Draw one sample from `Normal(mean, stddev)`.
    fn sample(&mut self, mean: f64, stddev: f64) -> f64;
}

/// Standard-normal variate from two uniform draws.
///
/// `u1` must lie in `(0, 1]`; `u2` in `[0, 1)`.
#[inline]
pub fn box_muller(u1: f64, u2: f64) -> f64 {
    debug_assert!(u1 > 0.0 && u1 <= 1.0, "u1 out of range: {u1}");
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).sin()
}

/// Box–Muller sampler over any uniform generator.
#[derive(Debug, Clone)]
pub struct BoxMuller<R> {
    rng: R,
}

impl<R: Rng> BoxMuller<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn into_inner(self) -> R {
        self.rng
    }
}

impl<R: Rng + Send> NormalSource for BoxMuller<R> {
    fn sample(&mut self, mean: f64, stddev: f64) -> f64 {
        // gen::<f64>() is [0, 1); flip it so ln() never sees zero.
        let u1 = 1.0 - self.rng.gen::<f64>();
        let u2 = self.rng.gen::<f64>();
        mean + stddev * box_muller(u1, u2)
    }
}

/// Replays a fixed queue of standard-normal values, then yields the mean.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNormals {
    values: VecDeque<f64>,
    drawn: usize,
}

impl ScriptedNormals {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().collect(),
            drawn: 0,
        }
    }

    pub fn push(&mut self, z: f64) {
        self.values.push_back(z);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = f64>) {
        self.values.extend(values);
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    /// Number of samples handed out so far, scripted or not.
    pub fn drawn(&self) -> usize {
        self.drawn
    }
}

impl NormalSource for ScriptedNormals {
    fn sample(&mut self, mean: f64, stddev: f64) -> f64 {
        self.drawn += 1;
        let z = self.values.pop_front().unwrap_or(0.0);
        mean + stddev * z
    }
}

impl<N: NormalSource + ?Sized> NormalSource for Box<N> {
    fn sample(&mut self, mean: f64, stddev: f64) -> f64 {
        (**self).sample(mean, stddev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn box_muller_zero_at_quarter_turn_boundaries() {
        assert!(box_muller(0.5, 0.0).abs() < 1e-12);
        assert!(box_muller(0.5, 0.5).abs() < 1e-12);
    }

    #[test]
    fn box_muller_u1_one_is_zero() {
        assert!(box_muller(1.0, 0.25).abs() < 1e-12);
    }

    #[test]
    fn box_muller_peak_at_quarter() {
        let u1 = (-0.5f64).exp();
        // sqrt(-2 ln u1) == 1, sin(pi/2) == 1
        assert!((box_muller(u1, 0.25) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn seeded_sampler_is_reproducible() {
        let mut a = BoxMuller::new(ChaCha8Rng::seed_from_u64(7));
        let mut b = BoxMuller::new(ChaCha8Rng::seed_from_u64(7));
        for _ in 0..100 {
            assert!((a.sample(0.0, 1.0) - b.sample(0.0, 1.0)).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn samples_are_finite_and_scaled() {
        let mut normals = BoxMuller::new(ChaCha8Rng::seed_from_u64(11));
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| normals.sample(10.0, 2.0)).collect();
        assert!(samples.iter().all(|s| s.is_finite()));

        let mean = samples.iter().sum::<f64>() / f64::from(n);
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / f64::from(n);
        assert!((mean - 10.0).abs() < 0.1, "mean was {mean}");
        assert!((variance.sqrt() - 2.0).abs() < 0.1, "stddev was {}", variance.sqrt());
    }

    #[test]
    fn scripted_normals_replay_then_return_mean() {
        let mut normals = ScriptedNormals::new([1.0, -2.0]);
        assert!((normals.sample(100.0, 10.0) - 110.0).abs() < f64::EPSILON);
        assert!((normals.sample(0.0, 0.5) + 1.0).abs() < f64::EPSILON);
        assert!((normals.sample(3.0, 50.0) - 3.0).abs() < f64::EPSILON);
        assert_eq!(normals.drawn(), 3);
        assert_eq!(normals.remaining(), 0);
    }
}
