//! Operation mix policy: weighted selection of the next operation kind.

use crate::error::ConfigError;
use crate::operation::OperationKind;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Configured weight per operation kind. Kinds without an entry weigh 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationWeights {
    weights: BTreeMap<OperationKind, u32>,
}

impl OperationWeights {
    /// No kind selected; add weights with [`OperationWeights::with`].
    pub fn empty() -> Self {
        Self {
            weights: BTreeMap::new(),
        }
    }

    /// Weight 1 for every kind.
    pub fn uniform() -> Self {
        OperationKind::ALL
            .into_iter()
            .fold(Self::empty(), |weights, kind| weights.with(kind, 1))
    }

    pub fn with(mut self, kind: OperationKind, weight: u32) -> Self {
        self.weights.insert(kind, weight);
        self
    }

    pub fn weight(&self, kind: OperationKind) -> u32 {
        self.weights.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.weights.values().map(|w| u64::from(*w)).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total() == 0 {
            return Err(ConfigError::InvalidWeights(
                "at least one operation kind needs a positive weight".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Parses `read=1,write=3`.
impl FromStr for OperationWeights {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut weights = Self::empty();

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, weight) = entry.split_once('=').ok_or_else(|| {
                ConfigError::InvalidWeights(format!("expected kind=weight, got '{entry}'"))
            })?;
            let kind: OperationKind = name.parse()?;
            let weight: u32 = weight.trim().parse().map_err(|_| {
                ConfigError::InvalidWeights(format!("weight for {kind} is not a whole number"))
            })?;
            if weights.weights.contains_key(&kind) {
                return Err(ConfigError::InvalidWeights(format!(
                    "{kind} listed more than once"
                )));
            }
            weights = weights.with(kind, weight);
        }

        weights.validate()?;
        Ok(weights)
    }
}

impl fmt::Display for OperationWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .weights
            .iter()
            .map(|(kind, weight)| format!("{kind}={weight}"))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Weighted sampler over the kinds with a positive weight.
///
/// The sampler holds no RNG state; each worker draws from its own RNG so the
/// mix can be shared read-only across workers.
#[derive(Debug, Clone)]
pub struct OperationMix {
    kinds: Vec<OperationKind>,
    index: WeightedIndex<u32>,
    weights: OperationWeights,
}

impl OperationMix {
    pub fn new(weights: &OperationWeights) -> Result<Self, ConfigError> {
        weights.validate()?;

        let (kinds, values): (Vec<OperationKind>, Vec<u32>) = OperationKind::ALL
            .into_iter()
            .map(|kind| (kind, weights.weight(kind)))
            .filter(|(_, weight)| *weight > 0)
            .unzip();

        let index = WeightedIndex::new(&values)
            .map_err(|e| ConfigError::InvalidWeights(e.to_string()))?;

        Ok(Self {
            kinds,
            index,
            weights: weights.clone(),
        })
    }

    /// Draw the kind for the next iteration.
    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> OperationKind {
        self.kinds[self.index.sample(rng)]
    }

    /// Expected long-run share of `kind`.
    pub fn probability(&self, kind: OperationKind) -> f64 {
        f64::from(self.weights.weight(kind)) / self.weights.total() as f64
    }

    pub fn weights(&self) -> &OperationWeights {
        &self.weights
    }
}

/// RNG for one worker.
///
/// With a seed, every worker gets a distinct deterministic stream; without
/// one the RNG is seeded from OS entropy.
pub fn worker_rng(seed: Option<u64>, worker_id: usize) -> StdRng {
    match seed {
        Some(seed) => {
            let offset = (worker_id as u64).wrapping_mul(0x9E3779B97F4A7C15);
            StdRng::seed_from_u64(seed.wrapping_add(offset))
        }
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weights() {
        let weights: OperationWeights = "read=1, write=3".parse().unwrap();
        assert_eq!(weights.weight(OperationKind::Read), 1);
        assert_eq!(weights.weight(OperationKind::Write), 3);
        assert_eq!(weights.total(), 4);
        assert_eq!(weights.to_string(), "read=1,write=3");
    }

    #[test]
    fn test_parse_weights_omitted_kind_is_zero() {
        let weights: OperationWeights = "write=5".parse().unwrap();
        assert_eq!(weights.weight(OperationKind::Read), 0);
        assert_eq!(weights.weight(OperationKind::Write), 5);
    }

    #[test]
    fn test_parse_weights_errors() {
        assert!("read".parse::<OperationWeights>().is_err());
        assert!("read=x".parse::<OperationWeights>().is_err());
        assert!("read=-1".parse::<OperationWeights>().is_err());
        assert!("read=0,write=0".parse::<OperationWeights>().is_err());
        assert!("read=1,read=2".parse::<OperationWeights>().is_err());
        assert_eq!(
            "scan=1".parse::<OperationWeights>(),
            Err(ConfigError::UnknownOperation("scan".to_string()))
        );
        assert!("".parse::<OperationWeights>().is_err());
    }

    #[test]
    fn test_mix_rejects_zero_total() {
        assert!(OperationMix::new(&OperationWeights::empty()).is_err());
    }

    #[test]
    fn test_read_fraction_converges() {
        let weights = OperationWeights::uniform();
        let mix = OperationMix::new(&weights).unwrap();
        let mut rng = worker_rng(Some(42), 0);

        let draws = 2000;
        let reads = (0..draws)
            .filter(|_| mix.next(&mut rng) == OperationKind::Read)
            .count();
        let fraction = reads as f64 / draws as f64;

        assert!(
            (0.45..=0.55).contains(&fraction),
            "read fraction {fraction} outside tolerance"
        );
        assert_eq!(mix.probability(OperationKind::Read), 0.5);
    }

    #[test]
    fn test_skewed_weights() {
        let weights: OperationWeights = "read=1,write=3".parse().unwrap();
        let mix = OperationMix::new(&weights).unwrap();
        let mut rng = worker_rng(Some(7), 1);

        let draws = 4000;
        let writes = (0..draws)
            .filter(|_| mix.next(&mut rng) == OperationKind::Write)
            .count();
        let fraction = writes as f64 / draws as f64;

        assert!((0.70..=0.80).contains(&fraction), "write fraction {fraction}");
    }

    #[test]
    fn test_single_kind_always_drawn() {
        let weights = OperationWeights::empty().with(OperationKind::Write, 2);
        let mix = OperationMix::new(&weights).unwrap();
        let mut rng = worker_rng(Some(1), 0);

        assert!((0..100).all(|_| mix.next(&mut rng) == OperationKind::Write));
    }

    #[test]
    fn test_seeded_rng_is_deterministic_per_worker() {
        let mix = OperationMix::new(&OperationWeights::uniform()).unwrap();

        let draw = |worker_id| {
            let mut rng = worker_rng(Some(99), worker_id);
            (0..32).map(|_| mix.next(&mut rng)).collect::<Vec<_>>()
        };

        assert_eq!(draw(0), draw(0));
        assert_ne!(draw(0), draw(1));
    }
}
