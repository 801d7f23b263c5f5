//! Turning a selection into a rendered, narrated video.
//!
//! Each selected segment goes through five steps, in selection order:
//!
//! 1. **Target duration**: the narration's audio length when narration
//!    succeeded, otherwise the segment's own window length.
//! 2. **Clip resolution**: `video_path` from the hit's raw attributes, or
//!    `<media_root>/<source_id>.<clip_extension>`.
//! 3. **Probe**: the usable window is clamped to the file's real length.
//! 4. **Plan and render**: [`plan_for`] with the configured [`SyncMode`],
//!    then `cut_or_loop` into the work directory.
//! 5. **Mux** the narration audio over the rendered unit.
//!
//! A failing step records a [`SegmentFailure`](montage_core::report::SegmentFailure)
//! and the segment is skipped; the rest of the video is still produced.
//! Only when no segment survives does assembly fail, with
//! [`CoreError::EmptyTimeline`].

use anyhow::{Context, Result};
use montage_core::collab::{ClipRef, MediaToolchain, MediaUnit};
use montage_core::error::CoreError;
use montage_core::models::{
    NarrationResult, PairedSegment, SelectedSegment, Selection, SyncMode, Timeline,
};
use montage_core::report::{FailureStage, FailureSummary};
use montage_core::sync::plan_for;
use montage_core::timeline::TimelinePart;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::scheduler::NarrationBatch;

/// Everything assembly needs from the configuration.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub media_root: PathBuf,
    pub clip_extension: String,
    pub work_dir: PathBuf,
    pub sync_mode: SyncMode,
    pub crossfade: Option<f64>,
    pub debug_labels: bool,
    /// Drop segments whose narration failed.
    pub narration_mandatory: bool,
}

impl AssemblyOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            media_root: config.assembly.media_root.clone(),
            clip_extension: config.assembly.clip_extension.clone(),
            work_dir: config.assembly.work_dir.clone(),
            sync_mode: config.assembly.sync_mode,
            crossfade: config.assembly.crossfade(),
            debug_labels: config.assembly.debug_labels,
            narration_mandatory: config.narration.mandatory,
        }
    }
}

/// The rendered video and the timeline describing it.
#[derive(Debug, Clone, Serialize)]
pub struct Assembly {
    pub timeline: Timeline,
    pub artifact: MediaUnit,
}

/// Source file and window for a segment.
pub fn resolve_clip(segment: &PairedSegment, media_root: &Path, clip_extension: &str) -> ClipRef {
    let explicit = [segment.visual.as_ref(), segment.narration.as_ref()]
        .into_iter()
        .flatten()
        .find_map(|m| m.candidate.raw_attributes.get("video_path"))
        .and_then(|v| v.as_str())
        .map(PathBuf::from);

    let path = explicit.unwrap_or_else(|| {
        media_root.join(format!("{}.{}", segment.source_id(), clip_extension))
    });

    ClipRef {
        path,
        in_point: segment.key.start_offset,
        out_point: segment.key.end_offset,
    }
}

/// Render every surviving segment and join them into `output`.
///
/// Per-segment failures are appended to `failures`.
pub async fn assemble_timeline(
    toolchain: &dyn MediaToolchain,
    selection: &Selection,
    narration: Option<&NarrationBatch>,
    options: &AssemblyOptions,
    output: &Path,
    failures: &mut FailureSummary,
) -> Result<Assembly> {
    tokio::fs::create_dir_all(&options.work_dir)
        .await
        .with_context(|| format!("Failed to create work dir {}", options.work_dir.display()))?;

    let mut parts = Vec::new();
    let mut units = Vec::new();
    // A lone unit is never crossfaded.
    let crossfade = options.crossfade.filter(|_| selection.segments.len() > 1);

    for (index, selected) in selection.segments.iter().enumerate() {
        let source_id = selected.segment.source_id().to_string();
        let narrated = narration.and_then(|b| b.for_segment(index));

        match render_segment(toolchain, index, selected, narrated, crossfade, options, failures)
            .await
        {
            Some((part, unit)) => {
                parts.push(part);
                units.push(unit);
            }
            None => warn!(segment = index, source = %source_id, "segment dropped"),
        }
    }

    if parts.is_empty() {
        return Err(CoreError::EmptyTimeline.into());
    }

    let timeline = Timeline::build(parts, options.crossfade)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output dir {}", parent.display()))?;
    }
    let artifact = toolchain
        .concat(&units, timeline.crossfade, output)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        entries = timeline.entries.len(),
        duration = timeline.total_duration,
        output = %artifact.path.display(),
        "timeline assembled"
    );

    Ok(Assembly { timeline, artifact })
}

/// Run one segment through target resolution, probe, plan, render and mux.
/// Returns `None` when the segment is dropped.
async fn render_segment(
    toolchain: &dyn MediaToolchain,
    index: usize,
    selected: &SelectedSegment,
    narrated: Option<&NarrationResult>,
    crossfade: Option<f64>,
    options: &AssemblyOptions,
    failures: &mut FailureSummary,
) -> Option<(TimelinePart, MediaUnit)> {
    let segment = &selected.segment;
    let source_id = segment.source_id();

    let mut narration = narrated.cloned();
    let target = match narrated {
        Some(n) if n.is_succeeded() => n.audio_duration,
        Some(n) => {
            let reason = n.error.clone().unwrap_or_else(|| "narration failed".to_string());
            failures.record(
                index,
                source_id,
                FailureStage::Narration,
                reason,
                options.narration_mandatory,
            );
            if options.narration_mandatory {
                return None;
            }
            segment.duration()
        }
        None => segment.duration(),
    };

    if let Some(c) = crossfade.filter(|c| target <= *c) {
        failures.record(
            index,
            source_id,
            FailureStage::SyncPlan,
            format!("duration {} is not longer than crossfade {}", target, c),
            true,
        );
        return None;
    }

    let mut clip = resolve_clip(segment, &options.media_root, &options.clip_extension);
    let probed = match toolchain.probe_duration(&clip.path).await {
        Ok(d) => d,
        Err(e) => {
            failures.record(index, source_id, FailureStage::Probe, format!("{:#}", e), true);
            return None;
        }
    };
    clip.out_point = clip.out_point.min(probed);
    let natural = clip.window_duration();
    if !natural.is_finite() || natural <= 0.0 {
        failures.record(
            index,
            source_id,
            FailureStage::Probe,
            format!(
                "window starts at {} but {} is {} long",
                clip.in_point,
                clip.path.display(),
                probed
            ),
            true,
        );
        return None;
    }

    let plan = match plan_for(options.sync_mode, natural, target) {
        Ok(p) => p,
        Err(e) => {
            failures.record(index, source_id, FailureStage::SyncPlan, e.to_string(), true);
            return None;
        }
    };

    let label = options.debug_labels.then_some(source_id);
    let rendered_path = options.work_dir.join(format!("unit-{:03}.mp4", index));
    let mut unit = match toolchain.cut_or_loop(&clip, &plan, label, &rendered_path).await {
        Ok(u) => u,
        Err(e) => {
            failures.record(index, source_id, FailureStage::Render, format!("{:#}", e), true);
            return None;
        }
    };

    if let Some(audio) = narration.as_ref().and_then(|n| n.audio.as_ref()) {
        let muxed_path = options.work_dir.join(format!("unit-{:03}.narrated.mp4", index));
        match toolchain.mux(&unit, audio, &muxed_path).await {
            Ok(muxed) => unit = muxed,
            Err(e) => {
                failures.record(
                    index,
                    source_id,
                    FailureStage::Mux,
                    format!("{:#}", e),
                    options.narration_mandatory,
                );
                if options.narration_mandatory {
                    return None;
                }
                narration = None;
            }
        }
    }

    Some((
        TimelinePart {
            segment: selected.clone(),
            plan,
            narration,
        },
        unit,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use montage_core::models::{
        AudioPayload, Candidate, CandidateKind, ScoredCandidate, SyncPlan, SyncStrategy,
    };
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    /// Knows the duration of a fixed set of files; fails renders of any
    /// path containing "broken".
    struct FakeToolchain {
        durations: HashMap<PathBuf, f64>,
        renders: Mutex<Vec<(PathBuf, SyncPlan, Option<String>)>>,
        fail_mux: bool,
    }

    impl FakeToolchain {
        fn new(files: &[(&str, f64)]) -> Self {
            Self {
                durations: files.iter().map(|(p, d)| (PathBuf::from(p), *d)).collect(),
                renders: Mutex::new(Vec::new()),
                fail_mux: false,
            }
        }
    }

    #[async_trait]
    impl MediaToolchain for FakeToolchain {
        async fn probe_duration(&self, path: &Path) -> Result<f64> {
            match self.durations.get(path) {
                Some(d) => Ok(*d),
                None => bail!("no such file: {}", path.display()),
            }
        }

        async fn cut_or_loop(
            &self,
            clip: &ClipRef,
            plan: &SyncPlan,
            label: Option<&str>,
            output: &Path,
        ) -> Result<MediaUnit> {
            if clip.path.to_string_lossy().contains("broken") {
                bail!("decoder error");
            }
            self.renders
                .lock()
                .unwrap()
                .push((clip.path.clone(), plan.clone(), label.map(str::to_string)));
            Ok(MediaUnit {
                path: output.to_path_buf(),
                duration: plan.target_duration,
            })
        }

        async fn mux(&self, unit: &MediaUnit, _audio: &AudioPayload, output: &Path) -> Result<MediaUnit> {
            if self.fail_mux {
                bail!("mux failed");
            }
            Ok(MediaUnit {
                path: output.to_path_buf(),
                duration: unit.duration,
            })
        }

        async fn concat(&self, units: &[MediaUnit], crossfade: Option<f64>, output: &Path) -> Result<MediaUnit> {
            Ok(MediaUnit {
                path: output.to_path_buf(),
                duration: crate::media::joined_duration(units, crossfade),
            })
        }
    }

    fn selected(source: &str, start: f64, end: f64, video_path: Option<&str>) -> SelectedSegment {
        let mut raw = serde_json::Map::new();
        if let Some(p) = video_path {
            raw.insert("video_path".to_string(), serde_json::json!(p));
        }
        let candidate = Candidate {
            source_id: source.to_string(),
            kind: CandidateKind::VisualDerived,
            start_offset: start,
            end_offset: end,
            base_score: 0.5,
            text: format!("{} scene", source),
            tags: BTreeSet::new(),
            raw_attributes: raw,
        };
        SelectedSegment {
            segment: PairedSegment {
                key: candidate.key(),
                visual: Some(ScoredCandidate {
                    candidate,
                    composite_score: 0.5,
                    query_index: 0,
                }),
                narration: None,
            },
            cumulative_start_offset: 0.0,
        }
    }

    fn selection(segments: Vec<SelectedSegment>) -> Selection {
        let total_duration = segments.iter().map(|s| s.segment.duration()).sum();
        Selection {
            unique_source_count: segments.len(),
            segments,
            total_duration,
        }
    }

    fn options(dir: &Path) -> AssemblyOptions {
        AssemblyOptions {
            media_root: PathBuf::from("/media"),
            clip_extension: "mp4".to_string(),
            work_dir: dir.join("work"),
            sync_mode: SyncMode::Cut,
            crossfade: None,
            debug_labels: false,
            narration_mandatory: false,
        }
    }

    fn audio(duration: f64) -> NarrationResult {
        NarrationResult::succeeded(
            "script",
            AudioPayload {
                bytes: vec![0; 4],
                format: "mp3".to_string(),
            },
            duration,
        )
    }

    #[test]
    fn test_resolve_clip_prefers_video_path() {
        let seg = selected("vid-1", 3.0, 8.0, Some("/elsewhere/v.mkv"));
        let clip = resolve_clip(&seg.segment, Path::new("/media"), "mp4");
        assert_eq!(clip.path, PathBuf::from("/elsewhere/v.mkv"));
        assert_eq!(clip.in_point, 3.0);

        let seg = selected("vid-2", 0.0, 4.0, None);
        let clip = resolve_clip(&seg.segment, Path::new("/media"), "webm");
        assert_eq!(clip.path, PathBuf::from("/media/vid-2.webm"));
    }

    #[tokio::test]
    async fn test_narration_duration_is_authoritative() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[("/media/a.mp4", 60.0), ("/media/b.mp4", 60.0)]);
        let sel = selection(vec![selected("a", 10.0, 15.0, None), selected("b", 0.0, 20.0, None)]);
        let batch = NarrationBatch {
            results: vec![(0, audio(12.0)), (1, audio(7.5))],
        };
        let mut failures = FailureSummary::new();

        let out = dir.path().join("out.mp4");
        let assembly = assemble_timeline(&tools, &sel, Some(&batch), &options(dir.path()), &out, &mut failures)
            .await
            .unwrap();

        assert!(failures.is_empty());
        let tl = &assembly.timeline;
        assert_eq!(tl.entries[0].plan.strategy, SyncStrategy::Loop);
        assert_eq!(tl.entries[0].plan.loop_count, 3);
        assert_eq!(tl.entries[1].plan.strategy, SyncStrategy::Trim);
        assert!((tl.entries[1].start - 12.0).abs() < 1e-9);
        assert!((tl.total_duration - 19.5).abs() < 1e-9);
        assert!((assembly.artifact.duration - 19.5).abs() < 1e-9);
        assert!(tl.is_contiguous(1e-9));
        assert!(dir.path().join("work").is_dir());
    }

    #[tokio::test]
    async fn test_failed_narration_falls_back_to_clip_duration() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[("/media/a.mp4", 60.0)]);
        let sel = selection(vec![selected("a", 10.0, 16.0, None)]);
        let batch = NarrationBatch {
            results: vec![(0, NarrationResult::failed("script", "429 Too Many Requests"))],
        };
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(
            &tools,
            &sel,
            Some(&batch),
            &options(dir.path()),
            &dir.path().join("out.mp4"),
            &mut failures,
        )
        .await
        .unwrap();

        assert!((assembly.timeline.total_duration - 6.0).abs() < 1e-9);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.failures[0].stage, FailureStage::Narration);
        assert!(!failures.failures[0].dropped);
    }

    #[tokio::test]
    async fn test_mandatory_narration_drops_segment() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[("/media/a.mp4", 60.0), ("/media/b.mp4", 60.0)]);
        let sel = selection(vec![selected("a", 0.0, 5.0, None), selected("b", 0.0, 5.0, None)]);
        let batch = NarrationBatch {
            results: vec![(0, NarrationResult::failed("s", "boom")), (1, audio(4.0))],
        };
        let mut opts = options(dir.path());
        opts.narration_mandatory = true;
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(&tools, &sel, Some(&batch), &opts, &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap();

        assert_eq!(assembly.timeline.entries.len(), 1);
        assert_eq!(assembly.timeline.entries[0].segment.segment.source_id(), "b");
        assert_eq!(failures.dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failures_keep_survivors_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[
            ("/media/a.mp4", 60.0),
            ("/media/broken.mp4", 60.0),
            ("/media/c.mp4", 60.0),
        ]);
        let sel = selection(vec![
            selected("a", 0.0, 5.0, None),
            selected("missing", 0.0, 5.0, None),
            selected("broken", 0.0, 5.0, None),
            selected("c", 0.0, 3.0, None),
        ]);
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(&tools, &sel, None, &options(dir.path()), &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap();

        assert_eq!(assembly.timeline.entries.len(), 2);
        assert!((assembly.timeline.entries[1].start - 5.0).abs() < 1e-9);
        assert!(assembly.timeline.is_contiguous(1e-9));
        let stages = failures.counts_by_stage();
        assert_eq!(stages[&FailureStage::Probe], 1);
        assert_eq!(stages[&FailureStage::Render], 1);
    }

    #[tokio::test]
    async fn test_window_clamped_to_probed_length() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[("/media/a.mp4", 12.0), ("/media/b.mp4", 4.0)]);
        let sel = selection(vec![selected("a", 10.0, 20.0, None), selected("b", 5.0, 9.0, None)]);
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(&tools, &sel, None, &options(dir.path()), &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap();

        // a: only 2s of media remain past the in-point, looped to 10s.
        let plan = &assembly.timeline.entries[0].plan;
        assert!((plan.source_clip_duration - 2.0).abs() < 1e-9);
        assert_eq!(plan.strategy, SyncStrategy::Loop);
        // b: window starts past the end of the file.
        assert_eq!(failures.failures[0].source_id, "b");
        assert_eq!(failures.failures[0].stage, FailureStage::Probe);
    }

    #[tokio::test]
    async fn test_nothing_survives_is_empty_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[]);
        let sel = selection(vec![selected("a", 0.0, 5.0, None)]);
        let mut failures = FailureSummary::new();

        let err = assemble_timeline(&tools, &sel, None, &options(dir.path()), &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<CoreError>(), Some(&CoreError::EmptyTimeline));
    }

    #[tokio::test]
    async fn test_labels_and_mux_failure_keep_silent_unit() {
        let dir = tempfile::tempdir().unwrap();
        let mut tools = FakeToolchain::new(&[("/media/a.mp4", 30.0)]);
        tools.fail_mux = true;
        let sel = selection(vec![selected("a", 0.0, 5.0, None)]);
        let batch = NarrationBatch {
            results: vec![(0, audio(6.0))],
        };
        let mut opts = options(dir.path());
        opts.debug_labels = true;
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(&tools, &sel, Some(&batch), &opts, &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap();

        assert!(assembly.timeline.entries[0].narration.is_none());
        assert_eq!(failures.failures[0].stage, FailureStage::Mux);
        let renders = tools.renders.lock().unwrap();
        assert_eq!(renders[0].2.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_crossfade_total() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[("/media/a.mp4", 60.0), ("/media/b.mp4", 60.0)]);
        let sel = selection(vec![selected("a", 0.0, 10.0, None), selected("b", 0.0, 10.0, None)]);
        let mut opts = options(dir.path());
        opts.crossfade = Some(0.5);
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(&tools, &sel, None, &opts, &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap();
        assert!((assembly.timeline.total_duration - 19.5).abs() < 1e-9);
        assert!((assembly.artifact.duration - 19.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_segment_shorter_than_crossfade_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[
            ("/media/a.mp4", 60.0),
            ("/media/b.mp4", 60.0),
            ("/media/c.mp4", 60.0),
        ]);
        let sel = selection(vec![
            selected("a", 0.0, 5.0, None),
            selected("b", 0.0, 5.0, None),
            selected("c", 0.0, 5.0, None),
        ]);
        let batch = NarrationBatch {
            results: vec![(0, audio(8.0)), (1, audio(0.4)), (2, audio(6.0))],
        };
        let mut opts = options(dir.path());
        opts.crossfade = Some(0.5);
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(&tools, &sel, Some(&batch), &opts, &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap();

        let tl = &assembly.timeline;
        assert_eq!(tl.entries.len(), 2);
        assert_eq!(tl.entries[1].segment.segment.source_id(), "c");
        // Unequal targets: 8 + 6 - 0.5.
        assert!((tl.entries[1].start - 7.5).abs() < 1e-9);
        assert!((tl.total_duration - 13.5).abs() < 1e-9);
        assert!(tl.is_contiguous(1e-9));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.failures[0].source_id, "b");
        assert_eq!(failures.failures[0].stage, FailureStage::SyncPlan);
        assert!(failures.failures[0].dropped);
        // Never rendered.
        assert_eq!(tools.renders.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_single_short_segment_ignores_crossfade() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeToolchain::new(&[("/media/a.mp4", 60.0)]);
        let sel = selection(vec![selected("a", 0.0, 5.0, None)]);
        let batch = NarrationBatch {
            results: vec![(0, audio(0.4))],
        };
        let mut opts = options(dir.path());
        opts.crossfade = Some(0.5);
        let mut failures = FailureSummary::new();

        let assembly = assemble_timeline(&tools, &sel, Some(&batch), &opts, &dir.path().join("o.mp4"), &mut failures)
            .await
            .unwrap();
        assert!(failures.is_empty());
        assert!((assembly.timeline.total_duration - 0.4).abs() < 1e-9);
    }
}
