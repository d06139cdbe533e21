//! Pure weighted partitioning of work items across resource pools
//!
//! Items are split into contiguous, order-preserving runs whose lengths
//! follow the weight of each pool. No I/O happens here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative share of work each resource pool receives.
///
/// Pools missing from the table have weight 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolWeights(BTreeMap<String, u32>);

impl PoolWeights {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, pool: impl Into<String>, weight: u32) -> Self {
        self.0.insert(pool.into(), weight);
        self
    }

    pub fn weight(&self, pool: &str) -> u32 {
        self.0.get(pool).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(pool, weight)| (pool.as_str(), *weight))
    }
}

impl Default for PoolWeights {
    fn default() -> Self {
        Self::new()
            .with("bigmem", 3)
            .with("ycga_bigmem", 1)
            .with("scavenge", 2)
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for PoolWeights {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Pure: split `items` into one contiguous run per entry of `pools`.
///
/// The cursor after pool `i` sits at `round(len * cumulative_weight_i / total_weight)`,
/// so rounding drift is carried into later pools and the last cursor lands
/// exactly on `items.len()`. Unknown pools get an empty run. When no pool
/// carries weight every run is empty.
pub fn partition_by_weight<T: Clone>(
    items: &[T],
    pools: &[String],
    weights: &PoolWeights,
) -> Vec<Vec<T>> {
    let total: u64 = pools.iter().map(|p| u64::from(weights.weight(p))).sum();
    if total == 0 {
        if !items.is_empty() {
            tracing::warn!(
                "None of the pools {:?} has a weight; {} items are not assigned",
                pools,
                items.len()
            );
        }
        return vec![Vec::new(); pools.len()];
    }

    let len = items.len() as u64;
    let mut cumulative = 0u64;
    let mut start = 0usize;

    pools
        .iter()
        .map(|pool| {
            cumulative += u64::from(weights.weight(pool));
            let end = rounded_cursor(len, cumulative, total);
            let chunk = items[start..end].to_vec();
            start = end;
            chunk
        })
        .collect()
}

/// Pure: nearest integer to `len * cumulative / total`, halves rounding up.
fn rounded_cursor(len: u64, cumulative: u64, total: u64) -> usize {
    ((2 * len * cumulative + total) / (2 * total)) as usize
}
