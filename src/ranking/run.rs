//! Ranking run orchestrator.
//!
//! Wires together:
//! - PairScheduler (which pairs to ask about)
//! - ComparatorGateway (one judged verdict per pair, with retries)
//! - VoteTally (commutative accumulation as verdicts arrive)
//! - Order extraction and a single commit to the caller's store
//!
//! Core loop:
//! 1. Validate the request and snapshot the candidate list.
//! 2. Schedule the pair budget for the group.
//! 3. Dispatch pairs through the gateway, `concurrency` at a time, stopping
//!    intake as soon as the cancel flag is observed.
//! 4. Record each verdict and report progress.
//! 5. Once every slot is recorded, extract the order and commit it.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use futures::future;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::comparison::{ComparatorGateway, ComparisonError, GatewayConfig, Judge};
use super::extract::{extract_order, standings};
use super::hooks::{CandidateStore, ProgressSink, StoreError};
use super::scheduler::PairScheduler;
use super::tally::VoteTally;
use super::trace::{now_epoch_ms, payload_hash, ComparisonTrace, TraceError, TraceSink};
use super::types::{
    Candidate, ComparisonContext, CompletionReport, GroupKey, Pair, RankingConfig,
    RankingOutcome, RankingRequest, RunState,
};

// =============================================================================
// Error type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Comparator unavailable for {group} pair ({first}, {second}): {source}")]
    ComparatorUnavailable {
        group: GroupKey,
        first: usize,
        second: usize,
        #[source]
        source: ComparisonError,
    },
    #[error("Ranking of {group} cancelled after {pairs_evaluated} of {pairs_scheduled} pairs")]
    Cancelled {
        group: GroupKey,
        pairs_evaluated: usize,
        pairs_scheduled: usize,
    },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

impl RankingError {
    /// Terminal state a run ends in when it returns this error.
    pub fn terminal_state(&self) -> RunState {
        match self {
            Self::Cancelled { .. } => RunState::Cancelled,
            _ => RunState::Failed,
        }
    }
}

// =============================================================================
// State tracking
// =============================================================================

struct RunPhase {
    group: GroupKey,
    state: RunState,
}

impl RunPhase {
    fn new(group: GroupKey) -> Self {
        Self {
            group,
            state: RunState::Scheduled,
        }
    }

    fn advance(&mut self, next: RunState) {
        assert!(
            self.state.can_transition_to(next),
            "illegal ranking state transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(group = %self.group, from = ?self.state, to = ?next, "Ranking state");
        self.state = next;
    }

    fn fail(&mut self, err: RankingError) -> RankingError {
        self.advance(err.terminal_state());
        err
    }
}

// =============================================================================
// Validation
// =============================================================================

pub fn validate_ranking_request(req: &RankingRequest) -> Result<(), RankingError> {
    if !req.group.is_valid() {
        return Err(RankingError::InvalidInput(format!(
            "group key must be >= -1, got {}",
            req.group.0
        )));
    }
    req.config.validate().map_err(RankingError::InvalidInput)?;

    if req.candidates.is_empty() && req.config.pair_budget_cap != Some(0) {
        return Err(RankingError::InvalidInput(format!(
            "{} has no candidates to rank",
            req.group
        )));
    }
    if req.context.subject.trim().is_empty() {
        return Err(RankingError::InvalidInput(
            "context.subject must not be empty".into(),
        ));
    }
    Ok(())
}

fn trace_event(
    group: GroupKey,
    comparison_index: usize,
    pair: Pair,
    hashes: &[String],
    attempts: u32,
) -> ComparisonTrace {
    ComparisonTrace {
        timestamp_ms: now_epoch_ms(),
        group,
        comparison_index,
        slot: pair.slot,
        first_index: pair.first,
        second_index: pair.second,
        first_hash: hashes[pair.first].clone(),
        second_hash: hashes[pair.second].clone(),
        verdict: None,
        raw_answer: None,
        attempts,
        error: None,
    }
}

fn is_cancelled(flag: Option<&AtomicBool>) -> bool {
    flag.map(|f| f.load(AtomicOrdering::Relaxed))
        .unwrap_or(false)
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Rank one candidate group and commit the new order to `store`.
///
/// On any error the store is left untouched.
pub async fn rank_group<J: Judge + ?Sized>(
    judge: Arc<J>,
    store: &dyn CandidateStore,
    progress: &dyn ProgressSink,
    req: RankingRequest,
    cancel_flag: Option<&AtomicBool>,
) -> Result<RankingOutcome, RankingError> {
    rank_group_with_trace(judge, store, progress, req, None, cancel_flag).await
}

/// Snapshot the group's list from `store`, rank it, and commit the result.
pub async fn rank_stored_group<J: Judge + ?Sized>(
    judge: Arc<J>,
    store: &dyn CandidateStore,
    progress: &dyn ProgressSink,
    group: GroupKey,
    context: ComparisonContext,
    config: RankingConfig,
    cancel_flag: Option<&AtomicBool>,
) -> Result<RankingOutcome, RankingError> {
    let candidates = store.snapshot(group).await?;
    let req = RankingRequest {
        group,
        candidates,
        context,
        config,
    };
    rank_group(judge, store, progress, req, cancel_flag).await
}

/// Rank one candidate group with optional per-comparison trace output.
///
/// The group's trace rows are finished before the commit on success. On
/// failure they are finished afterwards, best-effort.
pub async fn rank_group_with_trace<J: Judge + ?Sized>(
    judge: Arc<J>,
    store: &dyn CandidateStore,
    progress: &dyn ProgressSink,
    req: RankingRequest,
    trace: Option<&dyn TraceSink>,
    cancel_flag: Option<&AtomicBool>,
) -> Result<RankingOutcome, RankingError> {
    let group = req.group;
    let result = run_ranking(judge, store, progress, req, trace, cancel_flag).await;
    if let (Some(sink), Err(_)) = (trace, &result) {
        if let Err(e) = sink.finish_group(group) {
            warn!(group = %group, error = %e, "Trace flush failed");
        }
    }
    result
}

async fn run_ranking<J: Judge + ?Sized>(
    judge: Arc<J>,
    store: &dyn CandidateStore,
    progress: &dyn ProgressSink,
    req: RankingRequest,
    trace: Option<&dyn TraceSink>,
    cancel_flag: Option<&AtomicBool>,
) -> Result<RankingOutcome, RankingError> {
    validate_ranking_request(&req)?;

    let RankingRequest {
        group,
        candidates,
        context,
        config,
    } = req;

    let start_time = Instant::now();
    let mut phase = RunPhase::new(group);

    // The run works on its own copy; the store is only touched at commit.
    let snapshot: Vec<Candidate> = candidates
        .into_iter()
        .enumerate()
        .map(|(index, payload)| Candidate { index, payload })
        .collect();

    let pairs = PairScheduler::new(snapshot.len(), &config).schedule();
    let pairs_scheduled = pairs.len();
    let tally = VoteTally::new(snapshot.len(), pairs_scheduled);
    let gateway = ComparatorGateway::new(judge, GatewayConfig::from(&config));

    info!(
        group = %group,
        candidates = snapshot.len(),
        pairs = pairs_scheduled,
        concurrency = config.concurrency,
        "Starting ranking run"
    );

    if is_cancelled(cancel_flag) {
        return Err(phase.fail(RankingError::Cancelled {
            group,
            pairs_evaluated: 0,
            pairs_scheduled,
        }));
    }

    let traced: Option<(&dyn TraceSink, Vec<String>)> = trace.map(|sink| {
        let hashes = snapshot.iter().map(|c| payload_hash(&c.payload)).collect();
        (sink, hashes)
    });

    let mut retries_used: usize = 0;

    if pairs_scheduled > 0 {
        phase.advance(RunState::InFlight);

        let gateway = &gateway;
        let context = &context;
        let snapshot_ref = &snapshot;

        let mut results = stream::iter(pairs.iter().copied())
            .take_while(|_| future::ready(!is_cancelled(cancel_flag)))
            .map(move |pair| async move {
                let judged = gateway
                    .compare(
                        context,
                        &snapshot_ref[pair.first],
                        &snapshot_ref[pair.second],
                    )
                    .await;
                (pair, judged)
            })
            .buffer_unordered(config.concurrency);

        let mut comparison_index: usize = 0;

        while let Some((pair, judged)) = results.next().await {
            comparison_index += 1;

            match judged {
                Ok(judged) => {
                    tally.record(&pair, judged.verdict);
                    retries_used += judged.attempts.saturating_sub(1) as usize;
                    if phase.state == RunState::InFlight {
                        phase.advance(RunState::Tallying);
                    }

                    if let Some((sink, hashes)) = &traced {
                        let mut event =
                            trace_event(group, comparison_index, pair, hashes, judged.attempts);
                        event.verdict = Some(judged.verdict.as_str().to_string());
                        event.raw_answer = Some(judged.raw_answer.clone());
                        if let Err(e) = sink.record(event) {
                            return Err(phase.fail(e.into()));
                        }
                    }

                    let fraction = tally.cursor().fraction();
                    if let Err(e) = progress.report(group, fraction).await {
                        warn!(group = %group, error = %e, "Progress report failed");
                    }
                }
                Err(err) => {
                    let ComparisonError::Unavailable { attempts, .. } = &err;
                    if let Some((sink, hashes)) = &traced {
                        let mut event =
                            trace_event(group, comparison_index, pair, hashes, *attempts);
                        event.error = Some(err.to_string());
                        // The comparator error is what the caller needs to see.
                        let _ = sink.record(event);
                    }
                    warn!(
                        group = %group,
                        first = pair.first,
                        second = pair.second,
                        error = %err,
                        "Comparator unavailable; aborting ranking run"
                    );
                    return Err(phase.fail(RankingError::ComparatorUnavailable {
                        group,
                        first: pair.first,
                        second: pair.second,
                        source: err,
                    }));
                }
            }
        }
    } else if let Err(e) = progress.report(group, 1.0).await {
        warn!(group = %group, error = %e, "Progress report failed");
    }

    let cursor = tally.cursor();
    if !cursor.is_complete() || is_cancelled(cancel_flag) {
        info!(
            group = %group,
            processed = cursor.processed,
            scheduled = cursor.scheduled,
            "Ranking run cancelled"
        );
        return Err(phase.fail(RankingError::Cancelled {
            group,
            pairs_evaluated: cursor.processed,
            pairs_scheduled,
        }));
    }

    let final_tally = tally.finish();
    let order = extract_order(&final_tally);
    phase.advance(RunState::Extracted);

    if let Some(sink) = trace {
        if let Err(e) = sink.finish_group(group) {
            return Err(phase.fail(e.into()));
        }
    }

    let committed = match store.commit(group, &order).await {
        Ok(list) => list,
        Err(e) => return Err(phase.fail(e.into())),
    };
    phase.advance(RunState::Committed);

    let report = CompletionReport {
        pairs_scheduled,
        pairs_evaluated: final_tally.verdicts,
        neither_vote_count: final_tally.neither,
        retries_used,
        latency_ms: start_time.elapsed().as_millis(),
    };

    info!(
        group = %group,
        pairs_evaluated = report.pairs_evaluated,
        neither = report.neither_vote_count,
        retries = report.retries_used,
        latency_ms = report.latency_ms as u64,
        "Ranking committed"
    );

    Ok(RankingOutcome {
        group,
        standings: standings(&final_tally, &order),
        order,
        candidates: committed,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::types::CandidatePayload;

    fn request(n: usize) -> RankingRequest {
        RankingRequest {
            group: GroupKey::TOP_LEVEL,
            candidates: (0..n)
                .map(|i| CandidatePayload::new(format!("item {i}")))
                .collect(),
            context: ComparisonContext::new("pick the best"),
            config: RankingConfig::default(),
        }
    }

    #[test]
    fn validate_rejects_invalid_group() {
        let mut req = request(3);
        req.group = GroupKey(-7);
        assert!(matches!(
            validate_ranking_request(&req),
            Err(RankingError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_group_with_budget() {
        assert!(validate_ranking_request(&request(0)).is_err());
    }

    #[test]
    fn validate_accepts_empty_group_with_zero_budget() {
        let mut req = request(0);
        req.config.pair_budget_cap = Some(0);
        assert!(validate_ranking_request(&req).is_ok());
    }

    #[test]
    fn validate_rejects_blank_subject() {
        let mut req = request(3);
        req.context.subject = "   ".into();
        assert!(validate_ranking_request(&req).is_err());
    }

    #[test]
    fn validate_rejects_bad_config() {
        let mut req = request(3);
        req.config.concurrency = 500;
        assert!(validate_ranking_request(&req).is_err());
    }

    #[test]
    fn terminal_state_distinguishes_cancellation() {
        let cancelled = RankingError::Cancelled {
            group: GroupKey::TOP_LEVEL,
            pairs_evaluated: 0,
            pairs_scheduled: 3,
        };
        assert_eq!(cancelled.terminal_state(), RunState::Cancelled);
        assert_eq!(
            RankingError::InvalidInput("x".into()).terminal_state(),
            RunState::Failed
        );
    }

    #[test]
    #[should_panic(expected = "illegal ranking state transition")]
    fn phase_rejects_commit_without_extraction() {
        let mut phase = RunPhase::new(GroupKey::TOP_LEVEL);
        phase.advance(RunState::Committed);
    }
}
