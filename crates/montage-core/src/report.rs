//! Per-segment failure bookkeeping.
//!
//! Recoverable failures (one narration request, one clip) never abort a
//! compilation. They are recorded here and returned next to whatever
//! partial output survived, so the caller can decide if it is acceptable.

use serde::Serialize;
use std::collections::BTreeMap;

/// Pipeline step at which a segment was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Narration,
    Probe,
    SyncPlan,
    Render,
    Mux,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentFailure {
    /// Position of the segment in the selection.
    pub segment_index: usize,
    pub source_id: String,
    pub stage: FailureStage,
    pub reason: String,
    /// False when the segment still made it into the timeline (e.g. a
    /// narration failure with fallback to the clip's own duration).
    pub dropped: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureSummary {
    pub failures: Vec<SegmentFailure>,
}

impl FailureSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        segment_index: usize,
        source_id: &str,
        stage: FailureStage,
        reason: impl Into<String>,
        dropped: bool,
    ) {
        self.failures.push(SegmentFailure {
            segment_index,
            source_id: source_id.to_string(),
            stage,
            reason: reason.into(),
            dropped,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Number of segments excluded from the timeline.
    pub fn dropped_count(&self) -> usize {
        self.failures.iter().filter(|f| f.dropped).count()
    }

    pub fn counts_by_stage(&self) -> BTreeMap<FailureStage, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.failures {
            *counts.entry(f.stage).or_insert(0) += 1;
        }
        counts
    }
}
