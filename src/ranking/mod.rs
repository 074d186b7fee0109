//! Pairwise ranking engine.
//!
//! Orders a group of candidates by asking an external judge which of two
//! candidates is better, over a bounded budget of pairs:
//! - Exhaustive pairs for small groups, coverage-biased sampling for large ones
//! - Bounded retries with timeouts around every judge call
//! - Commutative vote tally, win-count ordering, single atomic commit
//!
//! Entry points are [`rank_group`] and [`rank_stored_group`].

pub mod comparison;
pub mod evaluation;
pub mod extract;
pub mod hooks;
pub mod run;
pub mod scheduler;
pub mod tally;
pub mod trace;
pub mod types;

pub use comparison::{ComparatorGateway, ComparisonError, GatewayConfig, Judge, JudgeError, JudgedPair};
pub use hooks::{
    CandidateStore, MemoryStore, NoopProgressSink, ProgressError, ProgressSink, StoreError,
    TracingProgressSink,
};
pub use run::{
    rank_group, rank_group_with_trace, rank_stored_group, validate_ranking_request, RankingError,
};
pub use scheduler::{pair_budget, participation_counts, unique_pair_count, PairScheduler};
pub use trace::{ComparisonTrace, JsonlTraceSink, TraceError, TraceSink};
pub use types::*;
