//! Temperature sampling over the decoder's output distribution.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{ChatError, ChatResult};

/// Added to every probability before taking the log.
pub const PROB_EPSILON: f64 = 1e-8;

/// Sampling temperature in (0, 1].
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Temperature(f64);

impl Temperature {
    pub fn new(value: f64) -> ChatResult<Self> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(ChatError::InvalidTemperature(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Temperature {
    type Error = ChatError;

    fn try_from(value: f64) -> ChatResult<Self> {
        Self::new(value)
    }
}

/// Rescale `probs` by temperature: `exp(ln(p + eps) / t)`, normalised.
pub fn apply_temperature(probs: &[f32], temperature: Temperature) -> Vec<f64> {
    let scaled: Vec<f64> = probs
        .iter()
        .map(|&p| (f64::from(p) + PROB_EPSILON).ln() / temperature.0)
        .collect();
    // Shifting by the max leaves the normalised result unchanged.
    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scaled.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

/// Shannon entropy in nats.
pub fn entropy(dist: &[f64]) -> f64 {
    dist.iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}

/// Weighted draw over a fixed distribution. Built once per decode step and
/// reused for every redraw in that step.
pub struct Sampler {
    dist: WeightedIndex<f64>,
}

impl Sampler {
    pub fn new(probs: &[f32], temperature: Temperature) -> ChatResult<Self> {
        let weights = apply_temperature(probs, temperature);
        let dist = WeightedIndex::new(&weights).map_err(|e| ChatError::Sampling(e.to_string()))?;
        Ok(Self { dist })
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.dist.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn skewed() -> Vec<f32> {
        vec![0.5, 0.2, 0.15, 0.1, 0.05, 0.0]
    }

    #[test]
    fn temperature_bounds() {
        assert!(Temperature::new(0.1).is_ok());
        assert!(Temperature::new(1.0).is_ok());
        assert!(Temperature::new(0.0).is_err());
        assert!(Temperature::new(1.01).is_err());
        assert!(Temperature::new(f64::NAN).is_err());
        assert!(Temperature::try_from(-0.5).is_err());
    }

    #[test]
    fn scaled_distribution_sums_to_one() {
        for step in 1..=100 {
            let t = Temperature::new(step as f64 / 100.0).unwrap();
            let dist = apply_temperature(&skewed(), t);
            let sum: f64 = dist.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "t={} sum={}", t.value(), sum);
        }
    }

    #[test]
    fn unit_temperature_preserves_distribution() {
        let dist = apply_temperature(&skewed(), Temperature::new(1.0).unwrap());
        for (p, q) in skewed().iter().zip(&dist) {
            assert!((f64::from(*p) - q).abs() < 1e-6);
        }
    }

    #[test]
    fn low_temperature_is_more_peaked() {
        let cold = apply_temperature(&skewed(), Temperature::new(0.1).unwrap());
        let warm = apply_temperature(&skewed(), Temperature::new(1.0).unwrap());
        assert!(entropy(&cold) < entropy(&warm));
        assert!(cold[0] > warm[0]);
    }

    #[test]
    fn draws_follow_the_mass() {
        let sampler = Sampler::new(&[0.0, 0.0, 1.0, 0.0], Temperature::new(0.7).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(sampler.draw(&mut rng), 2);
        }
    }

    #[test]
    fn draws_are_not_argmax() {
        let sampler = Sampler::new(&[0.5, 0.5], Temperature::new(1.0).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let ones = (0..200).filter(|_| sampler.draw(&mut rng) == 1).count();
        assert!(ones > 50 && ones < 150, "ones={ones}");
    }

    #[test]
    fn empty_distribution_is_an_error() {
        let err = Sampler::new(&[], Temperature::new(0.5).unwrap()).err().unwrap();
        assert!(matches!(err, ChatError::Sampling(_)));
    }
}
