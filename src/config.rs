//! TOML configuration for Montage.
//!
//! One file describes every collaborator handle for a compilation run: the
//! search collection for each candidate kind, the narration voice for each
//! kind, the selection budget, and the media toolchain settings.

use anyhow::{Context, Result};
use montage_core::models::{CandidateKind, SelectionBudget, SyncMode};
use montage_core::select::OverflowPolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub search: SearchConfig,
    pub selection: SelectionConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// JSON array of candidates, for `provider = "fixture"`.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
    /// Collection name searched for each candidate kind, keyed by
    /// `"narration"` / `"visual"`.
    #[serde(default = "default_collections")]
    pub collections: BTreeMap<String, String>,
}

fn default_search_provider() -> String {
    "http".to_string()
}
fn default_search_timeout() -> u64 {
    30
}
fn default_collections() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("narration".to_string(), "transcripts".to_string()),
        ("visual".to_string(), "scenes".to_string()),
    ])
}

impl SearchConfig {
    pub fn collection_for(&self, kind: CandidateKind) -> Option<&str> {
        self.collections.get(kind.as_str()).map(String::as_str)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectionConfig {
    pub max_total_duration: f64,
    #[serde(default = "default_max_per_source")]
    pub max_per_source: usize,
    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_max_per_source() -> usize {
    2
}
fn default_max_results_per_query() -> usize {
    5
}

impl SelectionConfig {
    pub fn budget(&self) -> SelectionBudget {
        SelectionBudget {
            max_total_duration: self.max_total_duration,
            max_per_source: self.max_per_source,
            max_results_per_query: self.max_results_per_query,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NarrationConfig {
    #[serde(default = "default_narration_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Voice used when the script text comes from a hit of this kind.
    #[serde(default)]
    pub voices: BTreeMap<String, String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Drop segments whose narration failed instead of falling back to the
    /// clip's own duration.
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default = "default_narration_timeout")]
    pub timeout_secs: u64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            provider: default_narration_provider(),
            base_url: None,
            default_voice: default_voice(),
            voices: BTreeMap::new(),
            concurrency: default_concurrency(),
            request_delay_ms: default_request_delay_ms(),
            mandatory: false,
            timeout_secs: default_narration_timeout(),
        }
    }
}

fn default_narration_provider() -> String {
    "disabled".to_string()
}
fn default_voice() -> String {
    "narrator".to_string()
}
fn default_concurrency() -> usize {
    3
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_narration_timeout() -> u64 {
    60
}

impl NarrationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn voice_for(&self, kind: Option<CandidateKind>) -> &str {
        kind.and_then(|k| self.voices.get(k.as_str()))
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssemblyConfig {
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_clip_extension")]
    pub clip_extension: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default)]
    pub crossfade_secs: f64,
    /// Burn the source id into each unit.
    #[serde(default)]
    pub debug_labels: bool,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            media_root: default_media_root(),
            clip_extension: default_clip_extension(),
            work_dir: default_work_dir(),
            sync_mode: SyncMode::default(),
            crossfade_secs: 0.0,
            debug_labels: false,
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}
fn default_clip_extension() -> String {
    "mp4".to_string()
}
fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

impl AssemblyConfig {
    pub fn crossfade(&self) -> Option<f64> {
        if self.crossfade_secs > 0.0 {
            Some(self.crossfade_secs)
        } else {
            None
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate search
    match config.search.provider.as_str() {
        "http" => {
            if config.search.base_url.is_none() {
                anyhow::bail!("search.base_url must be set when provider is 'http'");
            }
            for kind in CandidateKind::ALL {
                if config.search.collection_for(kind).is_none() {
                    anyhow::bail!("search.collections.{} must be set", kind);
                }
            }
        }
        "fixture" => {
            if config.search.fixture.is_none() {
                anyhow::bail!("search.fixture must be set when provider is 'fixture'");
            }
        }
        other => anyhow::bail!(
            "Unknown search provider: '{}'. Must be http or fixture.",
            other
        ),
    }

    // Validate selection
    let max_total = config.selection.max_total_duration;
    if !max_total.is_finite() || max_total <= 0.0 {
        anyhow::bail!("selection.max_total_duration must be > 0");
    }
    if config.selection.max_per_source == 0 {
        anyhow::bail!("selection.max_per_source must be >= 1");
    }
    if config.selection.max_results_per_query == 0 {
        anyhow::bail!("selection.max_results_per_query must be >= 1");
    }

    // Validate narration
    match config.narration.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.narration.base_url.is_none() {
                anyhow::bail!("narration.base_url must be set when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown narration provider: '{}'. Must be disabled or http.",
            other
        ),
    }
    if config.narration.concurrency == 0 {
        anyhow::bail!("narration.concurrency must be >= 1");
    }

    // Validate assembly
    if !config.assembly.crossfade_secs.is_finite() || config.assembly.crossfade_secs < 0.0 {
        anyhow::bail!("assembly.crossfade_secs must be >= 0");
    }

    Ok(config)
}
