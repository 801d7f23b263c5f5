//! The compile pipeline: queries in, narrated video and report out.
//!
//! ```text
//! queries ─▶ search (per query, per kind) ─▶ score ─▶ pair ─▶ select
//!                                                              │
//!        report ◀─ concat ◀─ render/mux ◀─ plan ◀─ narrate ◀───┘
//! ```
//!
//! Search and input errors abort the run. Per-segment failures during
//! narration and assembly are collected into the report's
//! [`FailureSummary`] instead.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use montage_core::collab::{MediaToolchain, MediaUnit, NarrationSynth, QueryGenerator, SimilaritySearch};
use montage_core::models::{CandidateKind, Query, ScoredCandidate, Selection, SyncMode, Timeline};
use montage_core::pair::pair_segments;
use montage_core::report::FailureSummary;
use montage_core::score::select_per_query;
use montage_core::select::select_for_budget;
use montage_core::sync::plan_for;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::assemble::{assemble_timeline, AssemblyOptions};
use crate::config::{Config, NarrationConfig};
use crate::media::FfmpegToolchain;
use crate::narration::create_narrator;
use crate::queries::QueryFile;
use crate::scheduler::{NarrationBatch, NarrationRequest, NarrationScheduler};
use crate::search_client::create_search;

/// Already-initialized collaborators for one run.
pub struct Collaborators<'a> {
    pub search: &'a dyn SimilaritySearch,
    pub narrator: Option<&'a dyn NarrationSynth>,
    pub toolchain: &'a dyn MediaToolchain,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionStats {
    pub query_count: usize,
    pub candidate_count: usize,
    pub segment_count: usize,
    pub total_duration: f64,
    pub unique_source_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NarrationStats {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success: bool,
}

impl NarrationStats {
    fn from_batch(batch: &NarrationBatch) -> Self {
        Self {
            requested: batch.results.len(),
            succeeded: batch.succeeded(),
            failed: batch.failed(),
            success: batch.success(),
        }
    }
}

/// Everything a compile run produced.
#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub selection: SelectionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<NarrationStats>,
    pub timeline: Timeline,
    pub artifact: MediaUnit,
    pub failures: FailureSummary,
}

/// Search every query against every kind and score the hits.
pub async fn gather_candidates(
    search: &dyn SimilaritySearch,
    queries: &[Query],
    max_results_per_query: usize,
) -> Result<Vec<ScoredCandidate>> {
    let mut scored = Vec::new();

    for (index, query) in queries.iter().enumerate() {
        query.validate()?;
        for kind in CandidateKind::ALL {
            let hits = search
                .search(&query.text, max_results_per_query, kind)
                .await
                .with_context(|| format!("search failed for query '{}' ({})", query.text, kind))?;
            let ranked = select_per_query(&hits, query, index, max_results_per_query)?;
            info!(
                query = index,
                kind = %kind,
                hits = hits.len(),
                kept = ranked.len(),
                "query scored"
            );
            scored.extend(ranked);
        }
    }

    Ok(scored)
}

/// Search, score, pair and select. Fails with
/// [`CoreError::EmptySelection`](montage_core::error::CoreError::EmptySelection)
/// when nothing fits.
pub async fn select(
    search: &dyn SimilaritySearch,
    queries: &[Query],
    config: &Config,
) -> Result<(Selection, SelectionStats)> {
    let budget = config.selection.budget();
    let scored = gather_candidates(search, queries, budget.max_results_per_query).await?;
    let paired = pair_segments(&scored);
    let selection = select_for_budget(&paired, &budget, config.selection.overflow);

    let stats = SelectionStats {
        query_count: queries.len(),
        candidate_count: scored.len(),
        segment_count: selection.segments.len(),
        total_duration: selection.total_duration,
        unique_source_count: selection.unique_source_count,
    };
    info!(
        groups = paired.len(),
        selected = stats.segment_count,
        duration = stats.total_duration,
        sources = stats.unique_source_count,
        "selection complete"
    );

    Ok((selection.ensure_non_empty()?, stats))
}

/// One request per selected segment that has script text.
pub fn narration_requests(selection: &Selection, config: &NarrationConfig) -> Vec<NarrationRequest> {
    selection
        .segments
        .iter()
        .enumerate()
        .filter_map(|(index, s)| {
            let script = s.segment.script_text()?.trim();
            if script.is_empty() {
                return None;
            }
            Some(NarrationRequest {
                segment_index: index,
                script_text: script.to_string(),
                voice_id: config.voice_for(s.segment.script_kind()).to_string(),
            })
        })
        .collect()
}

/// Run the whole pipeline for `queries`, writing the video to `output`.
pub async fn compile(
    config: &Config,
    collab: &Collaborators<'_>,
    queries: &[Query],
    output: &Path,
) -> Result<CompileReport> {
    let run_id = Uuid::new_v4().to_string();
    info!(run = %run_id, queries = queries.len(), "compile started");

    let (selection, selection_stats) = select(collab.search, queries, config).await?;

    let batch = match collab.narrator {
        Some(narrator) => {
            let requests = narration_requests(&selection, &config.narration);
            let batch = NarrationScheduler::from_config(&config.narration)
                .run(narrator, &requests)
                .await;
            if !batch.success() {
                warn!(
                    succeeded = batch.succeeded(),
                    failed = batch.failed(),
                    "narration incomplete"
                );
            }
            Some(batch)
        }
        None => None,
    };

    let mut failures = FailureSummary::new();
    let assembly = assemble_timeline(
        collab.toolchain,
        &selection,
        batch.as_ref(),
        &AssemblyOptions::from_config(config),
        output,
        &mut failures,
    )
    .await?;

    if !failures.is_empty() {
        warn!(
            failures = failures.len(),
            dropped = failures.dropped_count(),
            "some segments failed"
        );
    }
    info!(
        run = %run_id,
        duration = assembly.timeline.total_duration,
        output = %assembly.artifact.path.display(),
        "compile finished"
    );

    Ok(CompileReport {
        run_id,
        generated_at: Utc::now(),
        selection: selection_stats,
        narration: batch.as_ref().map(NarrationStats::from_batch),
        timeline: assembly.timeline,
        artifact: assembly.artifact,
        failures,
    })
}

/// `montage compile`: build the configured collaborators and run.
pub async fn run_compile(
    config: &Config,
    queries_path: &Path,
    output: &Path,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let queries = QueryFile::new(queries_path).queries().await?;
    let search = create_search(&config.search)?;
    let narrator = create_narrator(&config.narration)?;
    let toolchain = FfmpegToolchain::from_config(&config.assembly);

    let collab = Collaborators {
        search: search.as_ref(),
        narrator: narrator.as_deref(),
        toolchain: &toolchain,
    };
    let report = compile(config, &collab, &queries, output).await?;

    let json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = report_path {
        std::fs::write(&path, &json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }
    println!("{}", json);
    Ok(())
}

/// `montage select`: print the selection without rendering anything.
pub async fn run_select(config: &Config, queries_path: &Path) -> Result<()> {
    let queries = QueryFile::new(queries_path).queries().await?;
    let search = create_search(&config.search)?;
    let (selection, _) = select(search.as_ref(), &queries, config).await?;
    println!("{}", serde_json::to_string_pretty(&selection)?);
    Ok(())
}

/// `montage plan-sync`: print the plan for one clip/target pair.
pub fn run_plan_sync(source: f64, target: f64, speed_adjust: bool) -> Result<()> {
    let mode = if speed_adjust {
        SyncMode::SpeedAdjust
    } else {
        SyncMode::Cut
    };
    let plan = plan_for(mode, source, target)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
