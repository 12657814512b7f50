//! Shared statistical primitives: Beta posterior sampling and Monte Carlo
//! comparison of arms.
//!
//! Sampling is seedable so that selection and analysis are reproducible in
//! tests. Default construction of the services uses a fixed seed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};

/// Draw one sample from Beta(alpha, beta).
///
/// Falls back to the posterior mean when the parameters cannot form a valid
/// distribution (degenerate inputs are rejected upstream, this is a guard).
pub fn sample_beta(rng: &mut StdRng, alpha: f64, beta: f64) -> f64 {
    match Beta::new(alpha, beta) {
        Ok(dist) => dist.sample(rng),
        Err(_) => alpha / (alpha + beta).max(f64::MIN_POSITIVE),
    }
}

/// Monte Carlo estimate of each arm's probability of being the best arm.
///
/// `posteriors` holds one (alpha, beta) pair per arm. Returns one probability
/// per arm, in input order, summing to ~1.0.
pub fn probability_of_best(posteriors: &[(f64, f64)], draws: u32, seed: u64) -> Vec<f64> {
    if posteriors.is_empty() {
        return Vec::new();
    }
    if posteriors.len() == 1 {
        return vec![1.0];
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut wins = vec![0u64; posteriors.len()];

    for _ in 0..draws {
        let mut best_idx = 0;
        let mut best_sample = f64::NEG_INFINITY;
        for (idx, &(alpha, beta)) in posteriors.iter().enumerate() {
            let sample = sample_beta(&mut rng, alpha, beta);
            if sample > best_sample {
                best_sample = sample;
                best_idx = idx;
            }
        }
        wins[best_idx] += 1;
    }

    wins.iter().map(|&w| w as f64 / f64::from(draws)).collect()
}

/// Monte Carlo credible interval for the difference treatment - control.
///
/// Returns (lower, upper, mean) of the sampled difference at the given
/// central credibility level (e.g. 0.95).
pub fn credible_interval_diff(
    treatment: (f64, f64),
    control: (f64, f64),
    draws: u32,
    seed: u64,
    level: f64,
) -> (f64, f64, f64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut diffs: Vec<f64> = (0..draws)
        .map(|_| {
            let t = sample_beta(&mut rng, treatment.0, treatment.1);
            let c = sample_beta(&mut rng, control.0, control.1);
            t - c
        })
        .collect();
    diffs.sort_by(|a, b| a.total_cmp(b));

    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let tail = (1.0 - level) / 2.0;
    let lo_idx = ((diffs.len() as f64) * tail).floor() as usize;
    let hi_idx = (((diffs.len() as f64) * (1.0 - tail)).ceil() as usize).min(diffs.len()) - 1;
    (diffs[lo_idx], diffs[hi_idx], mean)
}

/// Normal-approximation confidence interval half-width for a sample mean.
pub fn normal_ci_half_width(std_dev: f64, n: u64, z: f64) -> f64 {
    if n == 0 {
        return f64::INFINITY;
    }
    z * std_dev / (n as f64).sqrt()
}

/// Sample mean and (population) standard deviation.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_beta_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let s = sample_beta(&mut rng, 3.0, 5.0);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_probability_of_best_prefers_stronger_arm() {
        // 300/10000 vs 200/10000 clicks: treatment should dominate.
        let probs = probability_of_best(&[(201.0, 9801.0), (301.0, 9701.0)], 10_000, 42);
        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[1] > 0.95, "treatment prob_best was {}", probs[1]);
    }

    #[test]
    fn test_probability_of_best_uniform_when_identical() {
        let probs = probability_of_best(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)], 30_000, 1);
        for p in probs {
            assert!((p - 1.0 / 3.0).abs() < 0.05);
        }
    }

    #[test]
    fn test_credible_interval_excludes_zero_for_clear_effect() {
        let (lo, hi, mean) =
            credible_interval_diff((301.0, 9701.0), (201.0, 9801.0), 10_000, 11, 0.95);
        assert!(lo > 0.0);
        assert!(hi > lo);
        assert!(mean > 0.0);
    }

    #[test]
    fn test_mean_and_std() {
        let (mean, std) = mean_and_std(&[1.0, 2.0, 3.0, 4.0]);
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((std - (1.25f64).sqrt()).abs() < 1e-12);
    }
}
