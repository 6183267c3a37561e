//! Load balancer
//!
//! Selects a storage account for each write. Candidates are pre-filtered on
//! capacity: an account must be active and either unsynced (`total_space ==
//! 0`, treated as unconstrained) or have `required_bytes` free. An empty
//! filtered set is the distinct `STORAGE_FULL` outcome.
//!
//! One mutex guards both the round-robin counter and the RNG; the RNG is
//! seeded at construction so tests can pin the weighted strategy.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use driveshard_core::config::BalanceStrategy;
use driveshard_core::domain::StorageAccount;
use driveshard_core::StorageError;

struct BalancerState {
    counter: usize,
    rng: StdRng,
}

/// Account selector shared by every writer
pub struct LoadBalancer {
    strategy: BalanceStrategy,
    state: Mutex<BalancerState>,
}

impl LoadBalancer {
    /// Creates a balancer with an entropy-seeded RNG
    pub fn new(strategy: BalanceStrategy) -> Self {
        Self {
            strategy,
            state: Mutex::new(BalancerState {
                counter: 0,
                rng: StdRng::from_entropy(),
            }),
        }
    }

    /// Creates a balancer with a fixed RNG seed (for tests)
    pub fn with_seed(strategy: BalanceStrategy, seed: u64) -> Self {
        Self {
            strategy,
            state: Mutex::new(BalancerState {
                counter: 0,
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    /// The configured strategy
    pub fn strategy(&self) -> BalanceStrategy {
        self.strategy
    }

    /// Select an account able to hold `required_bytes`
    ///
    /// # Errors
    /// `StorageError::StorageFull` when no candidate passes the capacity
    /// filter.
    pub fn select(
        &self,
        candidates: &[StorageAccount],
        required_bytes: u64,
    ) -> Result<StorageAccount, StorageError> {
        let eligible: Vec<&StorageAccount> = candidates
            .iter()
            .filter(|a| {
                a.is_active()
                    && (a.total_space == 0 || a.available_space() >= required_bytes as i64)
            })
            .collect();

        if eligible.is_empty() {
            return Err(StorageError::StorageFull {
                required: required_bytes,
            });
        }

        let chosen = match self.strategy {
            BalanceStrategy::LeastUsed => Self::least_used(&eligible),
            BalanceStrategy::RoundRobin => self.round_robin(&eligible),
            BalanceStrategy::Weighted => self.weighted(&eligible),
        };

        debug!(
            account = %chosen.id,
            strategy = ?self.strategy,
            required_bytes,
            "selected storage account"
        );
        Ok(chosen.clone())
    }

    /// Lowest used/total ratio wins; unsynced accounts rank as 0.0 usage.
    /// Ties keep the earliest candidate, so selection is deterministic for
    /// a given input order.
    fn least_used<'a>(eligible: &[&'a StorageAccount]) -> &'a StorageAccount {
        let mut best = eligible[0];
        let mut best_ratio = best.usage_ratio();
        for account in &eligible[1..] {
            let ratio = account.usage_ratio();
            if ratio < best_ratio {
                best = account;
                best_ratio = ratio;
            }
        }
        best
    }

    fn round_robin<'a>(&self, eligible: &[&'a StorageAccount]) -> &'a StorageAccount {
        let mut state = self.state.lock().unwrap();
        let index = state.counter % eligible.len();
        state.counter = state.counter.wrapping_add(1);
        eligible[index]
    }

    /// Weighted random over non-negative priorities; all-zero weights fall
    /// back to a uniform pick
    fn weighted<'a>(&self, eligible: &[&'a StorageAccount]) -> &'a StorageAccount {
        let weights: Vec<u64> = eligible.iter().map(|a| a.priority.max(0) as u64).collect();
        let total: u64 = weights.iter().sum();

        let mut state = self.state.lock().unwrap();
        if total == 0 {
            let index = state.rng.gen_range(0..eligible.len());
            return eligible[index];
        }

        let mut ticket = state.rng.gen_range(0..total);
        for (account, weight) in eligible.iter().zip(&weights) {
            if ticket < *weight {
                return account;
            }
            ticket -= weight;
        }
        eligible[eligible.len() - 1]
    }
}
