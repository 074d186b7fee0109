//! Offline evaluation harness for the ranking engine.
//!
//! Runs synthetic cases through the real `rank_group` loop, replacing the
//! external judge with a deterministic simulator that knows a hidden score
//! for every candidate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::comparison::{Judge, JudgeError};
use super::hooks::{MemoryStore, NoopProgressSink};
use super::run::{rank_group, RankingError};
use super::types::{
    Candidate, CandidatePayload, ComparisonContext, GroupKey, RankingConfig, RankingRequest,
};

// =============================================================================
// Simulated judge
// =============================================================================

/// Judge that answers from hidden scores, indexed by `Candidate::index`.
pub struct SyntheticJudge {
    scores: Vec<f64>,
    noise_sigma: f64,
    abstain_rate: f64,
    failure_rate: f64,
    seed: u64,
    calls: Mutex<HashMap<(usize, usize), u64>>,
}

impl SyntheticJudge {
    pub fn new(scores: Vec<f64>, seed: u64) -> Self {
        Self {
            scores,
            noise_sigma: 0.0,
            abstain_rate: 0.0,
            failure_rate: 0.0,
            seed,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_noise(mut self, noise_sigma: f64) -> Self {
        self.noise_sigma = noise_sigma;
        self
    }

    pub fn with_abstain_rate(mut self, abstain_rate: f64) -> Self {
        self.abstain_rate = abstain_rate;
        self
    }

    /// Fraction of attempts that fail with a transient error.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    /// Seeds each call from (seed, pair, nth call for that pair) so answers
    /// do not depend on arrival order across pairs.
    fn call_rng(&self, first: usize, second: usize) -> StdRng {
        let key = (first.min(second), first.max(second));
        let nth = {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            let counter = calls.entry(key).or_insert(0);
            *counter += 1;
            *counter
        };
        let mixed = self.seed
            ^ (key.0 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (key.1 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
            ^ nth.wrapping_mul(0x1656_67B1_9E37_79F9);
        StdRng::seed_from_u64(mixed)
    }
}

#[async_trait::async_trait]
impl Judge for SyntheticJudge {
    async fn judge(
        &self,
        _context: &ComparisonContext,
        first: &Candidate,
        second: &Candidate,
    ) -> Result<String, JudgeError> {
        let mut rng = self.call_rng(first.index, second.index);

        if self.failure_rate > 0.0 && rng.gen::<f64>() < self.failure_rate {
            return Err(JudgeError::Transient("simulated outage".to_string()));
        }
        if self.abstain_rate > 0.0 && rng.gen::<f64>() < self.abstain_rate {
            return Ok("Neither".to_string());
        }

        let (Some(a), Some(b)) = (self.scores.get(first.index), self.scores.get(second.index))
        else {
            return Err(JudgeError::Fatal(format!(
                "no hidden score for pair ({}, {})",
                first.index, second.index
            )));
        };

        let diff = a - b + sample_normal(&mut rng, 0.0, self.noise_sigma);
        let answer = if diff > 0.0 {
            "Answer: First"
        } else if diff < 0.0 {
            "Answer: Second"
        } else {
            "Answer: Neither"
        };
        Ok(answer.to_string())
    }
}

fn sample_normal(rng: &mut impl Rng, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return mean;
    }
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z0 * std
}

// =============================================================================
// Synthetic case definitions
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyntheticCase {
    pub name: &'static str,
    /// Hidden score per candidate; higher is better.
    pub scores: Vec<f64>,
    pub noise_sigma: f64,
    pub abstain_rate: f64,
    pub failure_rate: f64,
    pub config: RankingConfig,
    pub seed: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationMetrics {
    pub kendall_tau: f64,
    pub spearman_rho: f64,
    pub top1_hit: bool,
    pub pairs_scheduled: usize,
    pub pairs_evaluated: usize,
    pub neither_votes: usize,
    pub retries_used: usize,
    pub latency_ms: u128,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationResult {
    pub case_name: String,
    pub candidates: usize,
    pub metrics: EvaluationMetrics,
}

pub fn synthetic_cases() -> Vec<SyntheticCase> {
    vec![
        SyntheticCase {
            name: "clean_ordering_10",
            scores: descending(10),
            noise_sigma: 0.0,
            abstain_rate: 0.0,
            failure_rate: 0.0,
            config: eval_config(),
            seed: 42,
        },
        SyntheticCase {
            name: "noisy_ordering_40",
            scores: descending(40),
            noise_sigma: 1.5,
            abstain_rate: 0.0,
            failure_rate: 0.0,
            config: eval_config(),
            seed: 43,
        },
        SyntheticCase {
            name: "abstaining_judge_20",
            scores: descending(20),
            noise_sigma: 0.5,
            abstain_rate: 0.3,
            failure_rate: 0.0,
            config: eval_config(),
            seed: 44,
        },
        SyntheticCase {
            name: "clustered_scores_30",
            scores: [vec![10.0; 10], vec![5.0; 10], vec![0.0; 10]].concat(),
            noise_sigma: 0.2,
            abstain_rate: 0.0,
            failure_rate: 0.0,
            config: eval_config(),
            seed: 45,
        },
        SyntheticCase {
            name: "flaky_judge_15",
            scores: descending(15),
            noise_sigma: 0.3,
            abstain_rate: 0.0,
            failure_rate: 0.1,
            config: RankingConfig {
                max_retries: 5,
                ..eval_config()
            },
            seed: 46,
        },
        SyntheticCase {
            name: "capped_budget_30",
            scores: descending(30),
            noise_sigma: 0.3,
            abstain_rate: 0.0,
            failure_rate: 0.0,
            config: RankingConfig {
                pair_budget_cap: Some(90),
                ..eval_config()
            },
            seed: 47,
        },
        SyntheticCase {
            name: "large_list_sampled_150",
            scores: descending(150),
            noise_sigma: 2.0,
            abstain_rate: 0.05,
            failure_rate: 0.0,
            config: RankingConfig {
                min_comparisons_per_candidate: 8,
                ..eval_config()
            },
            seed: 48,
        },
    ]
}

fn descending(n: usize) -> Vec<f64> {
    (0..n).map(|i| (n - i) as f64).collect()
}

fn eval_config() -> RankingConfig {
    RankingConfig {
        retry_base_delay_ms: 0,
        concurrency: 8,
        ..RankingConfig::default()
    }
}

// =============================================================================
// Public API
// =============================================================================

pub async fn run_synthetic_suite(
    filter: Option<&str>,
) -> Result<Vec<EvaluationResult>, RankingError> {
    let cases = synthetic_cases();
    let selected: Vec<SyntheticCase> = match filter {
        Some(name) => cases.into_iter().filter(|c| c.name == name).collect(),
        None => cases,
    };

    let mut results = Vec::with_capacity(selected.len());
    for case in &selected {
        results.push(run_synthetic_case(case).await?);
    }
    Ok(results)
}

pub async fn run_synthetic_case(case: &SyntheticCase) -> Result<EvaluationResult, RankingError> {
    let mut rng = StdRng::seed_from_u64(case.seed);

    // Present candidates in a shuffled order so the run has work to do.
    let mut presented: Vec<usize> = (0..case.scores.len()).collect();
    presented.shuffle(&mut rng);
    let truth: Vec<f64> = presented.iter().map(|&id| case.scores[id]).collect();

    let candidates: Vec<CandidatePayload> = presented
        .iter()
        .map(|id| CandidatePayload::new(format!("candidate {id}")))
        .collect();

    let judge = Arc::new(
        SyntheticJudge::new(truth.clone(), case.seed)
            .with_noise(case.noise_sigma)
            .with_abstain_rate(case.abstain_rate)
            .with_failure_rate(case.failure_rate),
    );
    let store = MemoryStore::with_group(GroupKey::TOP_LEVEL, candidates.clone());
    let req = RankingRequest {
        group: GroupKey::TOP_LEVEL,
        candidates,
        context: ComparisonContext::new(format!("synthetic case {}", case.name)),
        config: RankingConfig {
            rng_seed: case.seed,
            ..case.config.clone()
        },
    };

    let outcome = rank_group(judge, &store, &NoopProgressSink, req, None).await?;

    let n = truth.len();
    // Position 0 is best; convert to a score so higher means better.
    let mut predicted = vec![0.0; n];
    for (position, &index) in outcome.order.iter().enumerate() {
        predicted[index] = (n - position) as f64;
    }

    let best_truth = truth.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let top1_hit = outcome
        .order
        .first()
        .map(|&i| truth[i] == best_truth)
        .unwrap_or(false);

    Ok(EvaluationResult {
        case_name: case.name.to_string(),
        candidates: n,
        metrics: EvaluationMetrics {
            kendall_tau: kendall_tau_b(&predicted, &truth),
            spearman_rho: spearman_rho(&predicted, &truth),
            top1_hit,
            pairs_scheduled: outcome.report.pairs_scheduled,
            pairs_evaluated: outcome.report.pairs_evaluated,
            neither_votes: outcome.report.neither_vote_count,
            retries_used: outcome.report.retries_used,
            latency_ms: outcome.report.latency_ms,
        },
    })
}

// =============================================================================
// Rank correlation
// =============================================================================

pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return 0.0;
    }

    let mut concordant = 0f64;
    let mut discordant = 0f64;
    let mut ties_x = 0f64;
    let mut ties_y = 0f64;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];

            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                ties_x += 1.0;
            } else if dy == 0.0 {
                ties_y += 1.0;
            } else if (dx > 0.0) == (dy > 0.0) {
                concordant += 1.0;
            } else {
                discordant += 1.0;
            }
        }
    }

    let denom = ((concordant + discordant + ties_x) * (concordant + discordant + ties_y)).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (concordant - discordant) / denom
    }
}

pub fn spearman_rho(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return 0.0;
    }
    let rx = ranks_with_ties(x);
    let ry = ranks_with_ties(y);

    let mean_x = rx.iter().sum::<f64>() / n as f64;
    let mean_y = ry.iter().sum::<f64>() / n as f64;

    let (mut num, mut den_x, mut den_y) = (0.0, 0.0, 0.0);
    for (a, b) in rx.iter().zip(&ry) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }

    if den_x == 0.0 || den_y == 0.0 {
        0.0
    } else {
        num / (den_x.sqrt() * den_y.sqrt())
    }
}

/// Average ranks, ties sharing the mean of their positions.
fn ranks_with_ties(scores: &[f64]) -> Vec<f64> {
    let n = scores.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0usize;
    while i < n {
        let score = scores[indices[i]];
        let mut j = i + 1;
        while j < n && scores[indices[j]] == score {
            j += 1;
        }
        let avg_rank = (i + j - 1) as f64 / 2.0;
        for &idx in &indices[i..j] {
            ranks[idx] = avg_rank;
        }
        i = j;
    }

    ranks
}
