use rand::prelude::*;
use rand_distr::StandardNormal;

/// The single generator behind every stochastic decision of a run.
pub type SimRng = StdRng;

/// Draws from Normal(mean, std).
#[inline(always)]
pub fn normal(rng: &mut SimRng, mean: f64, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + std * z
}

/// Normal draw truncated toward zero to whole ticks, never below `min`.
#[inline(always)]
pub fn normal_ticks(rng: &mut SimRng, mean: f64, std: f64, min: i32) -> i32 {
    (normal(rng, mean, std) as i32).max(min)
}

/// Bernoulli trial that never panics on out-of-range probabilities.
#[inline(always)]
pub fn chance(rng: &mut SimRng, p: f64) -> bool {
    if p <= 0.0 {
        false
    } else if p >= 1.0 {
        true
    } else {
        rng.random::<f64>() < p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_std_is_deterministic() {
        let mut rng = SimRng::seed_from_u64(3);
        for _ in 0..10 {
            assert_eq!(normal_ticks(&mut rng, 12.0, 0.0, 1), 12);
        }
    }

    #[test]
    fn ticks_respect_floor() {
        let mut rng = SimRng::seed_from_u64(3);
        for _ in 0..200 {
            assert!(normal_ticks(&mut rng, 0.0, 5.0, 1) >= 1);
        }
    }

    #[test]
    fn certain_and_impossible_events() {
        let mut rng = SimRng::seed_from_u64(9);
        assert!(chance(&mut rng, 1.0));
        assert!(!chance(&mut rng, 0.0));
        assert!(!chance(&mut rng, -0.5));
    }
}
