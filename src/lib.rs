#![forbid(unsafe_code)]

//! # pairwise-rankings
//!
//! Orders a list of candidates by asking a judge, usually an LLM, which of
//! two candidates is better, one pair at a time.
//!
//! Small groups get every unique pair. Large groups get a sampled budget of
//! pairs biased toward candidates that have been compared least. Votes are
//! tallied as they arrive and the final order is most-wins-first, ties kept
//! in input order. The new order is committed to the caller's store in one
//! step, or not at all.

pub mod gateway;
pub mod prompts;
pub mod ranking;

pub use gateway::{ChatJudge, HttpJudgeClient, ProviderError};
pub use ranking::{
    rank_group, rank_group_with_trace, rank_stored_group, CandidatePayload, CandidateStore,
    ComparisonContext, ComparisonTrace, GroupKey, JsonlTraceSink, Judge, JudgeError, MemoryStore,
    ProgressSink, RankingConfig, RankingError, RankingOutcome, RankingRequest, TraceError,
    TraceSink, Verdict,
};
