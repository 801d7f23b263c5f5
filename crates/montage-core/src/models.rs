//! Core data models used throughout Montage.
//!
//! These types represent the search hits, queries, selections, and timeline
//! entries that flow from retrieval through selection to final assembly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::error::{CoreError, CoreResult};

/// Which search collection a candidate came from.
///
/// Query files may also name the desired kind by query style:
/// `"instruction"` maps to narration-derived hits and `"movement"` to
/// visual-derived hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandidateKind {
    #[serde(rename = "narration", alias = "instruction")]
    NarrationDerived,
    #[serde(rename = "visual", alias = "movement")]
    VisualDerived,
}

impl CandidateKind {
    pub const ALL: [CandidateKind; 2] = [CandidateKind::NarrationDerived, CandidateKind::VisualDerived];

    /// Configuration key for this kind (`"narration"` or `"visual"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::NarrationDerived => "narration",
            CandidateKind::VisualDerived => "visual",
        }
    }
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hit from the similarity search, before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Opaque id of the originating media.
    pub source_id: String,
    pub kind: CandidateKind,
    /// Window start within the source, in seconds.
    pub start_offset: f64,
    /// Window end within the source, in seconds. Must exceed `start_offset`.
    pub end_offset: f64,
    /// Similarity reported by the search backend.
    pub base_score: f64,
    /// Content snippet (transcript text or scene description).
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Collaborator fields carried through untouched.
    #[serde(default)]
    pub raw_attributes: serde_json::Map<String, serde_json::Value>,
}

impl Candidate {
    pub fn duration(&self) -> f64 {
        self.end_offset - self.start_offset
    }

    pub fn key(&self) -> SegmentKey {
        SegmentKey {
            source_id: self.source_id.clone(),
            start_offset: self.start_offset,
            end_offset: self.end_offset,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidCandidate {
            source_id: self.source_id.clone(),
            reason,
        };
        if self.source_id.is_empty() {
            return Err(invalid("empty source id".to_string()));
        }
        if !self.start_offset.is_finite() || !self.end_offset.is_finite() {
            return Err(invalid("non-finite time bounds".to_string()));
        }
        if self.end_offset <= self.start_offset {
            return Err(invalid(format!(
                "end {} is not after start {}",
                self.end_offset, self.start_offset
            )));
        }
        if !self.base_score.is_finite() {
            return Err(invalid("non-finite base score".to_string()));
        }
        Ok(())
    }
}

/// One retrieval intent produced by the script/query generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Importance in `1..=10`; scales every composite score for this query.
    pub priority: u8,
    /// Preferred clip length in seconds; `0` means no preference.
    #[serde(default)]
    pub target_duration: f64,
    #[serde(default)]
    pub required_tags: BTreeSet<String>,
    #[serde(default)]
    pub excluded_terms: BTreeSet<String>,
    #[serde(default)]
    pub desired_kind: Option<CandidateKind>,
}

impl Query {
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidQuery {
            text: self.text.clone(),
            reason,
        };
        if !(1..=10).contains(&self.priority) {
            return Err(invalid(format!("priority {} outside 1..=10", self.priority)));
        }
        if !self.target_duration.is_finite() || self.target_duration < 0.0 {
            return Err(invalid(format!(
                "target duration {} must be >= 0",
                self.target_duration
            )));
        }
        Ok(())
    }
}

/// A candidate scored against one query. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub composite_score: f64,
    /// Position of the query that produced this score in the input query list.
    pub query_index: usize,
}

/// Grouping key for co-located hits: `(source_id, start, end)`.
///
/// Offsets compare by bit pattern, so only hits reporting the exact same
/// window group together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentKey {
    pub source_id: String,
    pub start_offset: f64,
    pub end_offset: f64,
}

impl SegmentKey {
    pub fn duration(&self) -> f64 {
        self.end_offset - self.start_offset
    }
}

impl PartialEq for SegmentKey {
    fn eq(&self, other: &Self) -> bool {
        self.source_id == other.source_id
            && self.start_offset.to_bits() == other.start_offset.to_bits()
            && self.end_offset.to_bits() == other.end_offset.to_bits()
    }
}

impl Eq for SegmentKey {}

impl Hash for SegmentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_id.hash(state);
        self.start_offset.to_bits().hash(state);
        self.end_offset.to_bits().hash(state);
    }
}

/// Narration-derived and visual-derived hits for the same source window.
///
/// Only segments with a visual member can be selected: the visual clip is
/// mandatory, narration text is optional enrichment for the script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedSegment {
    pub key: SegmentKey,
    pub visual: Option<ScoredCandidate>,
    pub narration: Option<ScoredCandidate>,
}

impl PairedSegment {
    pub fn is_eligible(&self) -> bool {
        self.visual.is_some()
    }

    /// Higher of the member composite scores.
    pub fn ranking_score(&self) -> f64 {
        let v = self.visual.as_ref().map(|s| s.composite_score);
        let n = self.narration.as_ref().map(|s| s.composite_score);
        match (v, n) {
            (Some(v), Some(n)) => v.max(n),
            (Some(s), None) | (None, Some(s)) => s,
            (None, None) => f64::NEG_INFINITY,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.key.source_id
    }

    pub fn duration(&self) -> f64 {
        self.key.duration()
    }

    /// Text to narrate: the narration member's text when present, else the
    /// visual description.
    pub fn script_text(&self) -> Option<&str> {
        self.narration
            .as_ref()
            .or(self.visual.as_ref())
            .map(|s| s.candidate.text.as_str())
    }

    /// Kind of the member that supplies [`script_text`](Self::script_text).
    pub fn script_kind(&self) -> Option<CandidateKind> {
        self.narration
            .as_ref()
            .or(self.visual.as_ref())
            .map(|s| s.candidate.kind)
    }
}

/// Limits applied during selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionBudget {
    /// Ceiling on the summed duration of selected segments, in seconds.
    pub max_total_duration: f64,
    /// Diversity cap: most segments any one `source_id` may contribute.
    pub max_per_source: usize,
    pub max_results_per_query: usize,
}

/// A segment chosen for output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedSegment {
    pub segment: PairedSegment,
    /// Running sum of the window durations accepted before this one, at
    /// selection time. Narration re-timing and dropped segments are not
    /// reflected here; see [`TimelineEntry::start`].
    pub cumulative_start_offset: f64,
}

/// Result of [`select_for_budget`](crate::select::select_for_budget).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub segments: Vec<SelectedSegment>,
    pub total_duration: f64,
    pub unique_source_count: usize,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Fail with [`CoreError::EmptySelection`] when nothing was selected.
    pub fn ensure_non_empty(self) -> CoreResult<Self> {
        if self.segments.is_empty() {
            Err(CoreError::EmptySelection)
        } else {
            Ok(self)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Synthesized audio bytes and their container format (file extension).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub format: String,
}

/// Outcome of one narration request.
#[derive(Debug, Clone, Serialize)]
pub struct NarrationResult {
    pub script_text: String,
    /// Length of the synthesized audio. Authoritative for the segment's
    /// target duration once the request succeeded.
    pub audio_duration: f64,
    #[serde(skip)]
    pub audio: Option<AudioPayload>,
    pub status: NarrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NarrationResult {
    pub fn pending(script_text: impl Into<String>) -> Self {
        Self {
            script_text: script_text.into(),
            audio_duration: 0.0,
            audio: None,
            status: NarrationStatus::Pending,
            error: None,
        }
    }

    pub fn succeeded(script_text: impl Into<String>, audio: AudioPayload, audio_duration: f64) -> Self {
        Self {
            script_text: script_text.into(),
            audio_duration,
            audio: Some(audio),
            status: NarrationStatus::Succeeded,
            error: None,
        }
    }

    pub fn failed(script_text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            script_text: script_text.into(),
            audio_duration: 0.0,
            audio: None,
            status: NarrationStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == NarrationStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    Loop,
    Trim,
    SpeedAdjust,
}

/// How the caller wants source video reconciled with the target duration.
///
/// `Cut` re-cuts the clip (trim or loop). `SpeedAdjust` keeps the clip's
/// window fixed and changes playback speed within bounds, padding the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Cut,
    SpeedAdjust,
}

/// Reconciliation of a source clip's natural length with a target length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub source_clip_duration: f64,
    pub target_duration: f64,
    pub strategy: SyncStrategy,
    /// Times the clip is repeated before trimming (`Loop` only, else 1).
    pub loop_count: u32,
    /// Playback speed multiplier (`SpeedAdjust` only, else 1.0).
    pub speed_factor: f64,
    pub padding_before: f64,
    pub padding_after: f64,
}

/// One positioned entry of the final timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub segment: SelectedSegment,
    pub plan: SyncPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<NarrationResult>,
    /// Position on the output timeline, in seconds. This is authoritative
    /// over `segment.cumulative_start_offset`, which predates re-timing.
    pub start: f64,
}

impl TimelineEntry {
    pub fn end(&self) -> f64 {
        self.start + self.plan.target_duration
    }
}

/// Ordered, gap-free sequence of fixed-duration entries.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crossfade: Option<f64>,
    pub total_duration: f64,
}
