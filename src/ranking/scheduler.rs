//! Pair scheduling.
//!
//! Small lists are compared exhaustively. Large lists (and capped budgets) are
//! sampled in matching rounds that always favour the candidates with the
//! fewest comparisons so far, so coverage stays even across the list.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::types::{Pair, RankingConfig};

/// Number of unique unordered pairs among `n` candidates.
pub fn unique_pair_count(n: usize) -> usize {
    n.saturating_mul(n.saturating_sub(1)) / 2
}

/// Total pairs a run over `n` candidates will dispatch.
pub fn pair_budget(n: usize, config: &RankingConfig) -> usize {
    if n <= 1 {
        return 0;
    }
    let base = if n > config.large_list_threshold {
        n.saturating_mul(config.min_comparisons_per_candidate)
    } else {
        unique_pair_count(n)
    };
    match config.pair_budget_cap {
        Some(cap) => base.min(cap),
        None => base,
    }
}

/// Deterministic schedule of pairs for one group.
#[derive(Debug, Clone)]
pub struct PairScheduler {
    n: usize,
    budget: usize,
    rng: StdRng,
}

impl PairScheduler {
    pub fn new(n: usize, config: &RankingConfig) -> Self {
        Self {
            n,
            budget: pair_budget(n, config),
            rng: StdRng::seed_from_u64(config.rng_seed),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Produce the schedule. Slots are numbered in dispatch order.
    pub fn schedule(mut self) -> Vec<Pair> {
        if self.budget == 0 {
            return Vec::new();
        }

        let mut unordered = if self.budget == unique_pair_count(self.n) {
            exhaustive_pairs(self.n)
        } else {
            sampled_pairs(self.n, self.budget, &mut self.rng)
        };

        unordered.shuffle(&mut self.rng);

        unordered
            .into_iter()
            .enumerate()
            .map(|(slot, (a, b))| {
                if self.rng.gen_bool(0.5) {
                    Pair::new(slot, a, b)
                } else {
                    Pair::new(slot, b, a)
                }
            })
            .collect()
    }
}

fn exhaustive_pairs(n: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(unique_pair_count(n));
    for a in 0..n {
        for b in (a + 1)..n {
            pairs.push((a, b));
        }
    }
    pairs
}

/// Least-participation-first sampling.
///
/// Each round shuffles the candidates, stably sorts them by participation
/// count and greedily pairs each one with the next candidate it has not met
/// yet. When no unused pair is left anywhere, pairs are drawn again with
/// replacement, still least-participating first.
fn sampled_pairs(n: usize, budget: usize, rng: &mut StdRng) -> Vec<(usize, usize)> {
    let total_unique = unique_pair_count(n);
    let mut participation = vec![0usize; n];
    let mut used: HashSet<(usize, usize)> = HashSet::with_capacity(budget.min(total_unique));
    let mut pairs = Vec::with_capacity(budget);

    while pairs.len() < budget {
        let order = least_participating_order(&participation, rng);
        let resample = used.len() >= total_unique;
        let mut taken = vec![false; n];
        let mut progressed = false;

        for (pos, &a) in order.iter().enumerate() {
            if pairs.len() >= budget {
                break;
            }
            if taken[a] {
                continue;
            }
            let partner = order[pos + 1..]
                .iter()
                .copied()
                .find(|&b| !taken[b] && (resample || !used.contains(&key(a, b))));
            let Some(b) = partner else {
                continue;
            };

            taken[a] = true;
            taken[b] = true;
            used.insert(key(a, b));
            participation[a] += 1;
            participation[b] += 1;
            pairs.push((a, b));
            progressed = true;
        }

        // A fresh round with any unused pair left always pairs someone.
        assert!(progressed, "pair sampling stalled at {} of {budget}", pairs.len());
    }

    pairs
}

fn least_participating_order(participation: &[usize], rng: &mut StdRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..participation.len()).collect();
    order.shuffle(rng);
    order.sort_by_key(|&i| participation[i]);
    order
}

fn key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Per-candidate participation counts for a schedule.
pub fn participation_counts(n: usize, pairs: &[Pair]) -> Vec<usize> {
    let mut counts = vec![0usize; n];
    for pair in pairs {
        counts[pair.first] += 1;
        counts[pair.second] += 1;
    }
    counts
}
