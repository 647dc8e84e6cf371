//! Value samplers bound to parameter models
//!
//! Three strategies share one RNG-owning wrapper. All are deterministic for
//! a given seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

use crate::core::error::{BenchError, BenchResult};
use crate::domain::params::ParameterValueDistribution;

const COMPONENT: &str = "sampler";

#[derive(Debug, Clone, PartialEq)]
pub enum SamplerKind {
    /// Draw proportionally to observed frequency
    Weighted,
    /// Draw the rank from a Zipf law with the fitted exponent
    Zipf,
    /// With probability `probability` pick uniformly from `hotspots`,
    /// otherwise behave like `Zipf`
    Hotspot {
        hotspots: Vec<String>,
        probability: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Sampler {
    kind: SamplerKind,
    rng: StdRng,
}

impl Sampler {
    pub fn new(kind: SamplerKind, seed: u64) -> Self {
        Self {
            kind,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn weighted(seed: u64) -> Self {
        Self::new(SamplerKind::Weighted, seed)
    }

    pub fn zipf(seed: u64) -> Self {
        Self::new(SamplerKind::Zipf, seed)
    }

    pub fn hotspot(hotspots: Vec<String>, probability: f64, seed: u64) -> Self {
        Self::new(
            SamplerKind::Hotspot {
                hotspots,
                probability: probability.clamp(0.0, 1.0),
            },
            seed,
        )
    }

    pub fn kind(&self) -> &SamplerKind {
        &self.kind
    }

    /// Draw one value from `dist`
    pub fn sample<'a>(&mut self, dist: &'a ParameterValueDistribution) -> BenchResult<&'a str> {
        if dist.is_empty() || dist.total == 0 {
            return Err(BenchError::invalid_input(
                COMPONENT,
                format!("cannot sample empty distribution '{}'", dist.name),
            ));
        }

        match &self.kind {
            SamplerKind::Weighted => Ok(sample_weighted(&mut self.rng, dist)),
            SamplerKind::Zipf => sample_zipf(&mut self.rng, dist),
            SamplerKind::Hotspot {
                hotspots,
                probability,
            } => {
                if !hotspots.is_empty() && self.rng.r#gen::<f64>() < *probability {
                    let i = self.rng.gen_range(0..hotspots.len());
                    // Hotspots come from the same model; resolve to its storage
                    let chosen = &hotspots[i];
                    if let Some((value, _)) = dist.value_counts.get_key_value(chosen.as_str()) {
                        return Ok(value.as_str());
                    }
                }
                sample_zipf(&mut self.rng, dist)
            }
        }
    }
}

fn sample_weighted<'a>(rng: &mut StdRng, dist: &'a ParameterValueDistribution) -> &'a str {
    let r: f64 = rng.r#gen();
    let total = dist.total as f64;
    let mut cumulative = 0.0;
    let mut last = "";
    for (value, count) in &dist.value_counts {
        cumulative += *count as f64 / total;
        last = value.as_str();
        if cumulative >= r {
            return last;
        }
    }
    // Floating point shortfall on the final bucket
    last
}

fn sample_zipf<'a>(rng: &mut StdRng, dist: &'a ParameterValueDistribution) -> BenchResult<&'a str> {
    let n = dist.top_values.len();
    if n == 0 {
        return Err(BenchError::invalid_input(
            COMPONENT,
            format!("distribution '{}' has no ranked values", dist.name),
        ));
    }
    if n == 1 {
        return Ok(dist.top_values[0].as_str());
    }

    let zipf = Zipf::new(n as u64, dist.zipf_s.max(0.0)).map_err(|e| {
        BenchError::invalid_input(COMPONENT, format!("invalid Zipf parameters: {}", e))
    })?;
    let rank = zipf.sample(rng) as usize;
    let index = rank.clamp(1, n) - 1;
    Ok(dist.top_values[index].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn dist(counts: &[(&str, u64)], s: f64) -> ParameterValueDistribution {
        let mut d = ParameterValueDistribution::new("t", "p1", 1000);
        for (v, n) in counts {
            for _ in 0..*n {
                d.record(v);
            }
        }
        d.fit(100);
        d.zipf_s = s;
        d
    }

    #[test]
    fn test_empty_distribution_rejected() {
        let d = ParameterValueDistribution::new("t", "p1", 10);
        for mut sampler in [Sampler::weighted(1), Sampler::zipf(1), Sampler::hotspot(vec![], 0.3, 1)] {
            let err = sampler.sample(&d).unwrap_err();
            assert_eq!(err.kind, crate::core::error::ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn test_weighted_converges_to_frequencies() {
        let d = dist(&[("a", 70), ("b", 20), ("c", 10)], 0.0);
        let mut sampler = Sampler::weighted(7);
        let mut counts: HashMap<&str, u32> = HashMap::new();
        let n = 20_000;
        for _ in 0..n {
            *counts.entry(sampler.sample(&d).unwrap()).or_default() += 1;
        }
        let share = |v: &str| counts.get(v).copied().unwrap_or(0) as f64 / n as f64;
        assert!((share("a") - 0.7).abs() < 0.02);
        assert!((share("b") - 0.2).abs() < 0.02);
        assert!((share("c") - 0.1).abs() < 0.02);
    }

    #[test]
    fn test_zipf_single_value() {
        let d = dist(&[("only", 3)], 1.5);
        let mut sampler = Sampler::zipf(3);
        for _ in 0..100 {
            assert_eq!(sampler.sample(&d).unwrap(), "only");
        }
    }

    #[test]
    fn test_zipf_rank_ratio() {
        let counts: Vec<(String, u64)> = (0..20).map(|i| (format!("v{:02}", i), 20 - i)).collect();
        let refs: Vec<(&str, u64)> = counts.iter().map(|(v, c)| (v.as_str(), *c)).collect();
        let d = dist(&refs, 1.0);
        assert_eq!(d.top_values[0], "v00");
        assert_eq!(d.top_values[1], "v01");

        let mut sampler = Sampler::zipf(11);
        let (mut first, mut second) = (0u32, 0u32);
        for _ in 0..100_000 {
            match sampler.sample(&d).unwrap() {
                "v00" => first += 1,
                "v01" => second += 1,
                _ => {}
            }
        }
        // P(rank 1) / P(rank 2) = 2^s
        let ratio = first as f64 / second as f64;
        assert!((ratio - 2.0).abs() < 0.15, "ratio = {}", ratio);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let d = dist(&[("a", 5), ("b", 3), ("c", 1)], 1.0);
        let draw = |seed| {
            let mut s = Sampler::zipf(seed);
            (0..50).map(|_| s.sample(&d).unwrap().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(draw(99), draw(99));
    }

    #[test]
    fn test_hotspot_injection_rate() {
        let counts: Vec<(String, u64)> = (0..50).map(|i| (format!("v{:02}", i), 1)).collect();
        let refs: Vec<(&str, u64)> = counts.iter().map(|(v, c)| (v.as_str(), *c)).collect();
        let d = dist(&refs, 0.0);

        let mut sampler = Sampler::hotspot(vec!["v42".to_string()], 0.5, 5);
        let n = 20_000;
        let hits = (0..n)
            .filter(|_| sampler.sample(&d).unwrap() == "v42")
            .count();
        // 0.5 injected + 0.5 * 1/50 from the uniform fallback
        let expected = 0.5 + 0.5 / 50.0;
        assert!((hits as f64 / n as f64 - expected).abs() < 0.02);
    }
}
