//! Duration-bounded, diversity-capped greedy segment selection.
//!
//! Eligible segments are ranked by score (stable on ties) and walked once.
//! A segment from a source that already reached `max_per_source` is skipped.
//! A segment that would push the running duration past
//! `max_total_duration` ends the walk under [`OverflowPolicy::Stop`], or is
//! skipped under [`OverflowPolicy::ContinueScanning`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{PairedSegment, SelectedSegment, Selection, SelectionBudget};

/// What to do with the first segment that does not fit the duration budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Stop selecting entirely. Lower-ranked segments are never considered,
    /// even if they would fit.
    #[default]
    Stop,
    /// Skip the overflowing segment and keep scanning for smaller ones.
    /// Packs the budget more tightly at the cost of ranking order.
    #[serde(alias = "continue")]
    ContinueScanning,
}

/// Choose segments for the output within `budget`.
///
/// `cumulative_start_offset` of each accepted segment is the running sum of
/// the durations accepted before it, so offsets are non-decreasing in
/// selection order. Re-running on identical input yields identical output.
pub fn select_for_budget(
    segments: &[PairedSegment],
    budget: &SelectionBudget,
    policy: OverflowPolicy,
) -> Selection {
    let mut ranked: Vec<&PairedSegment> = segments.iter().filter(|s| s.is_eligible()).collect();
    ranked.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut running_duration = 0.0;
    let mut per_source: HashMap<&str, usize> = HashMap::new();
    let mut selected: Vec<SelectedSegment> = Vec::new();

    for segment in ranked {
        let duration = segment.duration();
        if running_duration + duration > budget.max_total_duration {
            match policy {
                OverflowPolicy::Stop => break,
                OverflowPolicy::ContinueScanning => continue,
            }
        }

        let count = per_source.entry(segment.source_id()).or_insert(0);
        if *count >= budget.max_per_source {
            continue;
        }

        selected.push(SelectedSegment {
            segment: segment.clone(),
            cumulative_start_offset: running_duration,
        });
        running_duration += duration;
        *count += 1;
    }

    let unique_source_count = selected
        .iter()
        .map(|s| s.segment.source_id())
        .collect::<HashSet<_>>()
        .len();

    Selection {
        segments: selected,
        total_duration: running_duration,
        unique_source_count,
    }
}
