//! Batch size tuning
//!
//! Searches an integer range for the batch size with the lowest cost. Each
//! step measures the midpoint and its lower neighbour and keeps the smaller
//! size only when it wins by more than `tolerance`, so a single noisy sample
//! does not flip the search back and forth. The cost function is assumed to
//! fall and then flatten out; for anything else the result is a local
//! optimum.

use serde::Serialize;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info};

pub type CostError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum TuneError {
    #[error("Invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: usize, max: usize },

    #[error("Tolerance must be in [0, 1), got {0}")]
    InvalidTolerance(f64),

    #[error("Cost function failed at batch size {batch_size}: {source}")]
    Cost {
        batch_size: usize,
        #[source]
        source: CostError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The smaller size won; the upper bound moved below the midpoint.
    Shrink,
    /// The midpoint was accepted; the lower bound moved above it.
    Accept,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Probe {
    pub batch_size: usize,
    pub cost: f64,
    /// Cost at `batch_size - 1`, absent when the midpoint is 0.
    pub cost_below: Option<f64>,
    pub decision: Decision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TuneState {
    Searching { min: usize, max: usize },
    Converged { exhausted_budget: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuneOutcome {
    pub best: usize,
    pub iterations: usize,
    pub state: TuneState,
    pub probes: Vec<Probe>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSizeTuner {
    pub min: usize,
    pub max: usize,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for BatchSizeTuner {
    fn default() -> Self {
        Self {
            min: 1,
            max: 1024,
            tolerance: 0.05,
            max_iterations: 10,
        }
    }
}

impl BatchSizeTuner {
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run the search with an infallible cost function.
    pub fn tune<F>(&self, mut cost: F) -> Result<TuneOutcome, TuneError>
    where
        F: FnMut(usize) -> f64,
    {
        self.try_tune(|size| Ok::<f64, CostError>(cost(size)))
    }

    pub fn try_tune<F, E>(&self, mut cost: F) -> Result<TuneOutcome, TuneError>
    where
        F: FnMut(usize) -> Result<f64, E>,
        E: Into<CostError>,
    {
        let mut search = Search::start(self)?;
        while let Some(mid) = search.next_probe() {
            let measure = |size: usize, value: Result<f64, E>| {
                value.map_err(|e| TuneError::Cost {
                    batch_size: size,
                    source: e.into(),
                })
            };
            let at_mid = measure(mid, cost(mid))?;
            let below = match mid.checked_sub(1) {
                Some(smaller) => Some(measure(smaller, cost(smaller))?),
                None => None,
            };
            search.record(mid, at_mid, below);
        }
        Ok(search.finish())
    }

    pub async fn tune_async<F, Fut, E>(&self, mut cost: F) -> Result<TuneOutcome, TuneError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<f64, E>>,
        E: Into<CostError>,
    {
        let mut search = Search::start(self)?;
        while let Some(mid) = search.next_probe() {
            let at_mid = cost(mid).await.map_err(|e| TuneError::Cost {
                batch_size: mid,
                source: e.into(),
            })?;
            let below = match mid.checked_sub(1) {
                Some(smaller) => Some(cost(smaller).await.map_err(|e| TuneError::Cost {
                    batch_size: smaller,
                    source: e.into(),
                })?),
                None => None,
            };
            search.record(mid, at_mid, below);
        }
        Ok(search.finish())
    }
}

/// Bounds and bookkeeping of one search.
struct Search {
    min: usize,
    max: usize,
    tolerance: f64,
    budget: usize,
    best: Option<usize>,
    probes: Vec<Probe>,
}

impl Search {
    fn start(tuner: &BatchSizeTuner) -> Result<Self, TuneError> {
        if tuner.min > tuner.max {
            return Err(TuneError::InvalidRange {
                min: tuner.min,
                max: tuner.max,
            });
        }
        if !(0.0..1.0).contains(&tuner.tolerance) {
            return Err(TuneError::InvalidTolerance(tuner.tolerance));
        }
        Ok(Self {
            min: tuner.min,
            max: tuner.max,
            tolerance: tuner.tolerance,
            budget: tuner.max_iterations,
            best: None,
            probes: Vec::new(),
        })
    }

    fn state(&self) -> TuneState {
        if self.max <= self.min {
            TuneState::Converged {
                exhausted_budget: false,
            }
        } else if self.probes.len() >= self.budget {
            TuneState::Converged {
                exhausted_budget: true,
            }
        } else {
            TuneState::Searching {
                min: self.min,
                max: self.max,
            }
        }
    }

    /// Midpoint to measure next, or `None` once converged.
    fn next_probe(&self) -> Option<usize> {
        match self.state() {
            TuneState::Searching { min, max } => Some(min + (max - min) / 2),
            TuneState::Converged { .. } => None,
        }
    }

    fn record(&mut self, mid: usize, cost: f64, cost_below: Option<f64>) {
        let shrink = cost_below.is_some_and(|below| below < cost * (1.0 - self.tolerance));
        let decision = if shrink {
            self.max = mid.saturating_sub(1);
            Decision::Shrink
        } else {
            self.best = Some(mid);
            self.min = mid + 1;
            Decision::Accept
        };

        debug!(
            "Batch size {}: cost {:.4}, cost at {} {:?} -> {:?} (range {}..={})",
            mid,
            cost,
            mid.saturating_sub(1),
            cost_below,
            decision,
            self.min,
            self.max
        );

        self.probes.push(Probe {
            batch_size: mid,
            cost,
            cost_below,
            decision,
        });
    }

    fn finish(self) -> TuneOutcome {
        let state = self.state();
        let best = self.best.unwrap_or(self.min);
        info!(
            "Batch size search finished after {} iterations: best {}",
            self.probes.len(),
            best
        );
        TuneOutcome {
            best,
            iterations: self.probes.len(),
            state,
            probes: self.probes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn convex(m: usize) -> impl FnMut(usize) -> f64 {
        move |x| {
            let d = x as f64 - m as f64;
            d * d + 1.0
        }
    }

    fn budget_for(min: usize, max: usize) -> usize {
        let span = max - min;
        if span <= 1 {
            0
        } else {
            (usize::BITS - (span - 1).leading_zeros()) as usize
        }
    }

    #[test]
    fn test_min_equals_max_returns_min() {
        let outcome = BatchSizeTuner::new(7, 7).tune(|_| panic!("no probe expected")).unwrap();
        assert_eq!(outcome.best, 7);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(
            outcome.state,
            TuneState::Converged {
                exhausted_budget: false
            }
        );
    }

    #[test]
    fn test_invalid_range() {
        let result = BatchSizeTuner::new(10, 2).tune(|x| x as f64);
        assert!(matches!(
            result,
            Err(TuneError::InvalidRange { min: 10, max: 2 })
        ));
    }

    #[test]
    fn test_invalid_tolerance() {
        let result = BatchSizeTuner::new(1, 10).with_tolerance(1.0).tune(|x| x as f64);
        assert!(matches!(result, Err(TuneError::InvalidTolerance(_))));

        let result = BatchSizeTuner::new(1, 10).with_tolerance(-0.1).tune(|x| x as f64);
        assert!(matches!(result, Err(TuneError::InvalidTolerance(_))));
    }

    #[test]
    fn test_decreasing_cost_climbs_to_max() {
        let outcome = BatchSizeTuner::new(1, 64)
            .with_tolerance(0.0)
            .tune(|x| 1000.0 / x as f64)
            .unwrap();
        assert!(outcome.best >= 63);
        assert!(outcome.probes.iter().all(|p| p.decision == Decision::Accept));
    }

    #[test]
    fn test_tolerance_ignores_small_improvements() {
        // The smaller size is always 1% cheaper; a 5% margin never shrinks.
        let outcome = BatchSizeTuner::new(1, 100)
            .with_tolerance(0.05)
            .tune(|x| 100.0 + x as f64 * 0.01)
            .unwrap();
        assert!(outcome.probes.iter().all(|p| p.decision == Decision::Accept));
        assert!(outcome.best >= 99);
    }

    #[test]
    fn test_zero_midpoint_is_accepted() {
        let outcome = BatchSizeTuner::new(0, 1).tune(|x| x as f64).unwrap();
        assert_eq!(outcome.probes[0].batch_size, 0);
        assert_eq!(outcome.probes[0].cost_below, None);
        assert_eq!(outcome.probes[0].decision, Decision::Accept);
        assert_eq!(outcome.best, 0);
    }

    #[test]
    fn test_budget_exhaustion() {
        let outcome = BatchSizeTuner::new(1, 1000)
            .with_max_iterations(2)
            .tune(|x| x as f64)
            .unwrap();
        assert_eq!(outcome.iterations, 2);
        assert_eq!(
            outcome.state,
            TuneState::Converged {
                exhausted_budget: true
            }
        );
    }

    #[test]
    fn test_cost_error_is_propagated() {
        let result = BatchSizeTuner::new(1, 10).try_tune(|x| {
            if x == 4 {
                Err("probe failed")
            } else {
                Ok(x as f64)
            }
        });
        match result {
            Err(TuneError::Cost { batch_size, .. }) => assert_eq!(batch_size, 4),
            other => panic!("expected cost error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tune_async_matches_sync() {
        let tuner = BatchSizeTuner::new(1, 200).with_tolerance(0.0).with_max_iterations(20);
        let sync = tuner.tune(convex(37)).unwrap();
        let asynchronous = tuner
            .tune_async(|x| async move {
                let d = x as f64 - 37.0;
                Ok::<f64, CostError>(d * d + 1.0)
            })
            .await
            .unwrap();
        assert_eq!(sync, asynchronous);
    }

    proptest! {
        #[test]
        fn prop_convex_cost_converges_near_minimum(
            min in 0usize..200,
            span in 0usize..500,
            offset in 0usize..500,
        ) {
            let max = min + span;
            let m = min + offset % (span + 1);
            let budget = budget_for(min, max);

            let outcome = BatchSizeTuner::new(min, max)
                .with_tolerance(0.0)
                .with_max_iterations(budget)
                .tune(convex(m))
                .unwrap();

            prop_assert!(outcome.best.abs_diff(m) <= 1, "best {} vs minimum {}", outcome.best, m);
            prop_assert!(outcome.iterations <= budget);
        }
    }
}
