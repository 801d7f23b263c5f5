//! Collaborator abstractions for Montage.
//!
//! The core never talks to a search index, a speech service, or a media
//! encoder directly. It goes through the traits defined here, and the
//! calling application supplies already-initialized implementations for one
//! compilation run.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`SimilaritySearch`] | Retrieve candidate windows for a query text |
//! | [`NarrationSynth`] | Turn script text into narration audio |
//! | [`MediaToolchain`] | Probe, cut/loop, mux, and concatenate media |
//! | [`QueryGenerator`] | Produce the query list for a compilation |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::models::{AudioPayload, Candidate, CandidateKind, Query, SyncPlan};

/// Similarity search over one collection per [`CandidateKind`].
///
/// Returned `base_score`s are expected to be normalized by the backend.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, query_text: &str, limit: usize, kind: CandidateKind) -> Result<Vec<Candidate>>;
}

/// Audio returned by a [`NarrationSynth`].
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub audio: AudioPayload,
    /// Length of `audio` in seconds.
    pub audio_duration: f64,
}

/// Speech synthesis for narration scripts.
///
/// Timeouts, if any, are enforced by the implementation; callers add none.
#[async_trait]
pub trait NarrationSynth: Send + Sync {
    async fn synthesize(&self, script_text: &str, voice_id: &str) -> Result<SynthesizedAudio>;
}

/// A window of a source video file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipRef {
    pub path: PathBuf,
    pub in_point: f64,
    pub out_point: f64,
}

impl ClipRef {
    pub fn window_duration(&self) -> f64 {
        self.out_point - self.in_point
    }
}

/// A rendered media file of known duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaUnit {
    pub path: PathBuf,
    pub duration: f64,
}

/// External media decode/encode/probe toolchain.
///
/// Every method may suspend; `output` paths live in a working area owned by
/// the caller.
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Render `clip` according to `plan` into a unit of exactly
    /// `plan.target_duration`, optionally burning in `label`.
    async fn cut_or_loop(
        &self,
        clip: &ClipRef,
        plan: &SyncPlan,
        label: Option<&str>,
        output: &Path,
    ) -> Result<MediaUnit>;

    /// Replace the unit's audio track with `audio`.
    async fn mux(&self, unit: &MediaUnit, audio: &AudioPayload, output: &Path) -> Result<MediaUnit>;

    /// Join `units` in order, overlapping boundaries by `crossfade` seconds if given.
    async fn concat(&self, units: &[MediaUnit], crossfade: Option<f64>, output: &Path) -> Result<MediaUnit>;
}

/// Upstream producer of the queries for one compilation.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn queries(&self) -> Result<Vec<Query>>;
}
