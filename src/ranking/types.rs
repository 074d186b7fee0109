//! Core types for pairwise ranking runs.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Groups and candidates
// =============================================================================

/// Scope of one ranking run.
///
/// Two groups never share pairs or tallies. `-1` addresses the top-level list;
/// non-negative values address a nested list (e.g. the entities of sub-problem 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(pub i64);

impl GroupKey {
    pub const TOP_LEVEL: GroupKey = GroupKey(-1);

    pub fn nested(index: usize) -> Self {
        GroupKey(index as i64)
    }

    pub fn is_top_level(&self) -> bool {
        self.0 == -1
    }

    pub fn is_valid(&self) -> bool {
        self.0 >= -1
    }
}

impl Default for GroupKey {
    fn default() -> Self {
        Self::TOP_LEVEL
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_top_level() {
            write!(f, "top-level")
        } else {
            write!(f, "group {}", self.0)
        }
    }
}

/// Opaque item payload as held by the caller's store.
///
/// Unknown fields are preserved in `extra` so a ranking run never drops data
/// attached by other stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CandidatePayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Text shown to the judge.
    pub fn render_text(&self) -> String {
        match self.description.as_deref() {
            Some(desc) if !desc.trim().is_empty() => format!("{}\n{}", self.title, desc),
            _ => self.title.clone(),
        }
    }
}

/// A candidate inside one run. Identity is `index`, never content.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub payload: CandidatePayload,
}

// =============================================================================
// Pairs and verdicts
// =============================================================================

/// One scheduled comparison.
///
/// `slot` is the pair's position in the schedule. Resampled pairs get their own
/// slot, so each contributes an independent vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pair {
    pub slot: usize,
    pub first: usize,
    pub second: usize,
}

impl Pair {
    pub fn new(slot: usize, first: usize, second: usize) -> Self {
        assert_ne!(first, second, "self-pair scheduled for candidate {first}");
        Self {
            slot,
            first,
            second,
        }
    }

    /// Orientation-free key used for de-duplication.
    pub fn unordered(&self) -> (usize, usize) {
        if self.first < self.second {
            (self.first, self.second)
        } else {
            (self.second, self.first)
        }
    }
}

/// Outcome of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    FirstWins,
    SecondWins,
    /// No usable signal. Ambiguous or off-vocabulary answers land here.
    Neither,
}

impl Verdict {
    /// Normalize a raw judge answer. Anything outside the vocabulary is `Neither`.
    pub fn from_raw(raw: &str) -> Self {
        let tail = raw.rsplit(':').next().unwrap_or(raw);
        let token = tail
            .trim()
            .trim_matches(|c: char| {
                c.is_whitespace() || matches!(c, '*' | '_' | '`' | '"' | '\'' | '.' | '!' | '(' | ')')
            })
            .to_ascii_lowercase();

        match token.as_str() {
            "first" | "one" | "1" | "a" => Verdict::FirstWins,
            "second" | "two" | "2" | "b" => Verdict::SecondWins,
            _ => Verdict::Neither,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::FirstWins => "First",
            Verdict::SecondWins => "Second",
            Verdict::Neither => "Neither",
        }
    }
}

// =============================================================================
// Request / configuration
// =============================================================================

/// What the judge is told about the group being ranked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonContext {
    /// The broader item this group belongs to (e.g. the parent problem statement).
    pub subject: String,
    /// Optional caller-supplied ranking instructions.
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

impl ComparisonContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            custom_instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    pub fn instructions(&self) -> Option<&str> {
        self.custom_instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub const MAX_CONCURRENCY: usize = 64;

/// Tunables for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_min_comparisons")]
    pub min_comparisons_per_candidate: usize,
    /// Lists larger than this are sampled at `n * min_comparisons_per_candidate` pairs.
    #[serde(default = "default_large_list_threshold")]
    pub large_list_threshold: usize,
    /// Hard ceiling on pairs per run. `None` = uncapped.
    #[serde(default)]
    pub pair_budget_cap: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub comparator_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// In-flight comparator calls. 1 = sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
}

fn default_min_comparisons() -> usize {
    2
}

fn default_large_list_threshold() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    1
}

fn default_rng_seed() -> u64 {
    0x5EED
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_comparisons_per_candidate: default_min_comparisons(),
            large_list_threshold: default_large_list_threshold(),
            pair_budget_cap: None,
            comparator_timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            concurrency: default_concurrency(),
            rng_seed: default_rng_seed(),
        }
    }
}

impl RankingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_comparisons_per_candidate == 0 {
            return Err("min_comparisons_per_candidate must be >= 1".into());
        }
        if self.comparator_timeout_secs == 0 {
            return Err("comparator_timeout_secs must be >= 1".into());
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "concurrency must be in 1..={MAX_CONCURRENCY}, got {}",
                self.concurrency
            ));
        }
        Ok(())
    }
}

/// Everything needed to rank one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRequest {
    #[serde(default)]
    pub group: GroupKey,
    pub candidates: Vec<CandidatePayload>,
    pub context: ComparisonContext,
    #[serde(default)]
    pub config: RankingConfig,
}

// =============================================================================
// Progress / results
// =============================================================================

/// How far a run has got through its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressCursor {
    pub scheduled: usize,
    pub processed: usize,
}

impl ProgressCursor {
    pub fn fraction(&self) -> f64 {
        if self.scheduled == 0 {
            1.0
        } else {
            (self.processed as f64 / self.scheduled as f64).min(1.0)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.scheduled
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub pairs_scheduled: usize,
    pub pairs_evaluated: usize,
    pub neither_vote_count: usize,
    /// Comparator attempts beyond the first, summed over all pairs.
    pub retries_used: usize,
    pub latency_ms: u128,
}

/// Final standing of one candidate, listed in ranked order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    /// Index into the input list.
    pub index: usize,
    pub wins: u64,
    pub participations: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingOutcome {
    pub group: GroupKey,
    /// Permutation of input indices, best first.
    pub order: Vec<usize>,
    /// The input payloads in ranked order (what was committed).
    pub candidates: Vec<CandidatePayload>,
    pub standings: Vec<Standing>,
    pub report: CompletionReport,
}

/// Lifecycle of a run.
///
/// `InFlight` and `Tallying` overlap in practice: verdicts are tallied as they
/// arrive. The run enters `Tallying` on the first recorded verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Scheduled,
    InFlight,
    Tallying,
    Extracted,
    Committed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Committed | RunState::Failed | RunState::Cancelled)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Scheduled, InFlight) => true,
            // Zero-pair runs go straight to extraction.
            (Scheduled, Extracted) => true,
            (InFlight, Tallying) => true,
            (InFlight | Tallying, Extracted) => true,
            (Extracted, Committed) => true,
            (Scheduled | InFlight | Tallying | Extracted, Failed) => true,
            (Scheduled | InFlight | Tallying, Cancelled) => true,
            _ => false,
        }
    }
}
