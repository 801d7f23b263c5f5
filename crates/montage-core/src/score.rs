//! Composite relevance scoring of search hits against queries.
//!
//! # Scoring Algorithm
//!
//! 1. Start from the backend's `base_score`.
//! 2. Soft tag penalty: `× 0.8` when the query requires tags, the candidate
//!    has tags, and the two sets are disjoint.
//! 3. Excluded terms: `× 0.5` when any excluded term occurs in the text,
//!    and `× 0.5` again when any occurs in a tag.
//! 4. Duration bonus: up to `0.1`, falling linearly to zero at half the
//!    query's target duration away from it.
//! 5. Tag bonus: `0.15 × matched / required`.
//! 6. Kind bonus: `0.05` when the hit's kind is the one the query asked for.
//! 7. Everything is scaled by `priority / 10`.
//!
//! Tag and term matching is case-insensitive. The formula is deterministic;
//! the same `(candidate, query)` always yields the same bits.

use std::collections::BTreeSet;

use crate::error::CoreResult;
use crate::models::{Candidate, Query, ScoredCandidate};

pub const TAG_MISMATCH_PENALTY: f64 = 0.8;
pub const EXCLUDED_TERM_PENALTY: f64 = 0.5;
pub const DURATION_BONUS_WEIGHT: f64 = 0.1;
pub const TAG_BONUS_WEIGHT: f64 = 0.15;
pub const KIND_BONUS: f64 = 0.05;

/// Compute the composite score of `candidate` for `query`.
///
/// Assumes both have been validated; see [`select_per_query`] for the
/// validating entry point.
pub fn score(candidate: &Candidate, query: &Query) -> f64 {
    let candidate_tags = lowercase_set(&candidate.tags);
    let required_tags = lowercase_set(&query.required_tags);

    let matched = required_tags
        .iter()
        .filter(|t| candidate_tags.contains(*t))
        .count();

    let mut adjusted = candidate.base_score;

    if !required_tags.is_empty() && !candidate_tags.is_empty() && matched == 0 {
        adjusted *= TAG_MISMATCH_PENALTY;
    }

    let excluded: Vec<String> = query
        .excluded_terms
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if !excluded.is_empty() {
        let text = candidate.text.to_lowercase();
        if excluded.iter().any(|term| text.contains(term.as_str())) {
            adjusted *= EXCLUDED_TERM_PENALTY;
        }
        if excluded
            .iter()
            .any(|term| candidate_tags.iter().any(|tag| tag.contains(term.as_str())))
        {
            adjusted *= EXCLUDED_TERM_PENALTY;
        }
    }

    let duration_bonus = duration_bonus(candidate.duration(), query.target_duration);

    let tag_bonus = if required_tags.is_empty() {
        0.0
    } else {
        (matched as f64 / required_tags.len() as f64) * TAG_BONUS_WEIGHT
    };

    let kind_bonus = match query.desired_kind {
        Some(kind) if kind == candidate.kind => KIND_BONUS,
        _ => 0.0,
    };

    (adjusted + duration_bonus + tag_bonus + kind_bonus) * (query.priority as f64 / 10.0)
}

/// Linear closeness bonus in `[0, 0.1]`; zero when the query has no target.
pub fn duration_bonus(duration: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    let max_deviation = target * 0.5;
    let diff = (duration - target).abs();
    ((max_deviation - diff) / max_deviation).max(0.0) * DURATION_BONUS_WEIGHT
}

/// Score every candidate for one query, keep the best `max_results`.
///
/// Sorting is stable: equal scores keep the backend's original order.
///
/// # Errors
///
/// Returns an input error if the query or any candidate violates its
/// invariants (priority range, `end > start`, ...).
pub fn select_per_query(
    candidates: &[Candidate],
    query: &Query,
    query_index: usize,
    max_results: usize,
) -> CoreResult<Vec<ScoredCandidate>> {
    query.validate()?;
    for c in candidates {
        c.validate()?;
    }

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|c| ScoredCandidate {
            composite_score: score(c, query),
            candidate: c.clone(),
            query_index,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(max_results);

    Ok(scored)
}

fn lowercase_set(set: &BTreeSet<String>) -> BTreeSet<String> {
    set.iter().map(|s| s.to_lowercase()).collect()
}
