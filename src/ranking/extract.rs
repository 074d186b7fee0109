//! Order extraction from a completed tally.

use std::cmp::Reverse;

use super::tally::TallySnapshot;
use super::types::{CandidatePayload, Standing};

/// Strict total order over candidate indices, most wins first.
///
/// Ties keep their input order (stable sort), so a run with no decisive
/// verdicts returns the input order unchanged.
pub fn extract_order(tally: &TallySnapshot) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tally.wins.len()).collect();
    order.sort_by_key(|&i| Reverse(tally.wins[i]));
    order
}

pub fn standings(tally: &TallySnapshot, order: &[usize]) -> Vec<Standing> {
    order
        .iter()
        .map(|&index| Standing {
            index,
            wins: tally.wins[index],
            participations: tally.participations[index],
        })
        .collect()
}

/// Rebuild the candidate list in `order`. `order` must be a permutation of
/// `0..candidates.len()`.
pub fn apply_order(candidates: &[CandidatePayload], order: &[usize]) -> Vec<CandidatePayload> {
    assert_eq!(
        candidates.len(),
        order.len(),
        "order length does not match candidate count"
    );
    let mut seen = vec![false; candidates.len()];
    order
        .iter()
        .map(|&i| {
            assert!(!std::mem::replace(&mut seen[i], true), "index {i} repeated in order");
            candidates[i].clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(wins: Vec<u64>) -> TallySnapshot {
        let n = wins.len();
        TallySnapshot {
            verdicts: wins.iter().sum::<u64>() as usize,
            wins,
            participations: vec![0; n],
            neither: 0,
        }
    }

    #[test]
    fn sorts_by_descending_wins() {
        assert_eq!(extract_order(&snapshot(vec![0, 2, 1])), vec![1, 2, 0]);
    }

    #[test]
    fn ties_keep_input_order() {
        assert_eq!(extract_order(&snapshot(vec![1, 3, 1, 3, 0])), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn all_ties_return_input_order() {
        assert_eq!(extract_order(&snapshot(vec![0; 5])), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_tally_gives_empty_order() {
        assert!(extract_order(&snapshot(Vec::new())).is_empty());
    }

    #[test]
    fn apply_order_permutes_payloads() {
        let items: Vec<_> = ["a", "b", "c"].into_iter().map(CandidatePayload::new).collect();
        let ranked = apply_order(&items, &[2, 0, 1]);
        let titles: Vec<_> = ranked.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
    }

    #[test]
    #[should_panic(expected = "repeated")]
    fn apply_order_rejects_duplicates() {
        let items: Vec<_> = ["a", "b"].into_iter().map(CandidatePayload::new).collect();
        let _ = apply_order(&items, &[0, 0]);
    }
}
