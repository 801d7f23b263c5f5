//! ffmpeg/ffprobe media toolchain.
//!
//! Every rendered unit is re-encoded to one uniform format (H.264 at
//! 1280x720/30fps, stereo AAC at 44.1 kHz) so units can be joined with the
//! concat demuxer without another encode. Units always carry an audio track:
//! a silent one until narration is muxed in.
//!
//! The `*_args` functions only build argument lists; the
//! [`FfmpegToolchain`] methods run them.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use montage_core::collab::{ClipRef, MediaToolchain, MediaUnit};
use montage_core::models::{AudioPayload, SyncPlan, SyncStrategy};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::config::AssemblyConfig;

const FRAME_FILTER: &str = "scale=1280:720:force_original_aspect_ratio=decrease,\
pad=1280:720:(ow-iw)/2:(oh-ih)/2,setsar=1,fps=30";
const SILENCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

pub struct FfmpegToolchain {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegToolchain {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self::new(config.ffmpeg.clone(), config.ffprobe.clone())
    }

    async fn run_ffmpeg(&self, args: &[String], what: &str) -> Result<()> {
        debug!(args = %args.join(" "), "running ffmpeg");
        let output = Command::new(&self.ffmpeg)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run {} to {}", self.ffmpeg, what))?;

        if !output.status.success() {
            bail!(
                "ffmpeg failed to {}: {}",
                what,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args(probe_args(path))
            .output()
            .await
            .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

        if !output.status.success() {
            bail!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<f64>()
            .with_context(|| format!("Failed to parse ffprobe duration '{}'", text.trim()))
    }

    async fn cut_or_loop(
        &self,
        clip: &ClipRef,
        plan: &SyncPlan,
        label: Option<&str>,
        output: &Path,
    ) -> Result<MediaUnit> {
        match plan.strategy {
            SyncStrategy::Loop => {
                let window = window_path(output);
                self.run_ffmpeg(&extract_window_args(clip, &window), "extract clip window")
                    .await?;
                let result = self
                    .run_ffmpeg(&loop_args(&window, plan, label, output), "loop clip")
                    .await;
                let _ = tokio::fs::remove_file(&window).await;
                result?;
            }
            SyncStrategy::Trim | SyncStrategy::SpeedAdjust => {
                self.run_ffmpeg(&render_args(clip, plan, label, output), "render clip")
                    .await?;
            }
        }

        Ok(MediaUnit {
            path: output.to_path_buf(),
            duration: plan.output_duration(),
        })
    }

    async fn mux(&self, unit: &MediaUnit, audio: &AudioPayload, output: &Path) -> Result<MediaUnit> {
        let audio_path = output.with_extension(&audio.format);
        tokio::fs::write(&audio_path, &audio.bytes)
            .await
            .with_context(|| format!("Failed to write narration audio {}", audio_path.display()))?;

        let result = self
            .run_ffmpeg(&mux_args(unit, &audio_path, output), "mux narration")
            .await;
        let _ = tokio::fs::remove_file(&audio_path).await;
        result?;

        Ok(MediaUnit {
            path: output.to_path_buf(),
            duration: unit.duration,
        })
    }

    async fn concat(&self, units: &[MediaUnit], crossfade: Option<f64>, output: &Path) -> Result<MediaUnit> {
        if units.is_empty() {
            return Err(anyhow!("nothing to concatenate"));
        }

        match crossfade.filter(|c| *c > 0.0 && units.len() > 1) {
            Some(c) => {
                self.run_ffmpeg(&crossfade_args(units, c, output), "crossfade units")
                    .await?;
            }
            None => {
                let cwd = std::env::current_dir().context("Failed to read current directory")?;
                let list = output.with_extension("txt");
                tokio::fs::write(&list, concat_list(units, &cwd))
                    .await
                    .with_context(|| format!("Failed to write concat list {}", list.display()))?;
                let result = self
                    .run_ffmpeg(&concat_args(&list, output), "concatenate units")
                    .await;
                let _ = tokio::fs::remove_file(&list).await;
                result?;
            }
        }

        Ok(MediaUnit {
            path: output.to_path_buf(),
            duration: joined_duration(units, crossfade),
        })
    }
}

/// Total length of `units` joined with the given overlap.
pub fn joined_duration(units: &[MediaUnit], crossfade: Option<f64>) -> f64 {
    let sum: f64 = units.iter().map(|u| u.duration).sum();
    let overlap = crossfade.unwrap_or(0.0).max(0.0);
    sum - overlap * units.len().saturating_sub(1) as f64
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn window_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unit".to_string());
    output.with_file_name(format!("{}.window.mp4", stem))
}

pub fn probe_args(path: &Path) -> Vec<String> {
    let mut args = strings(&[
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]);
    args.push(path_arg(path));
    args
}

/// Escape text for a `drawtext` filter value.
pub fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '\'' | ':' | '%' | ',' | ';' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn video_filter(prefix: Option<String>, label: Option<&str>) -> String {
    let mut filters: Vec<String> = Vec::new();
    if let Some(p) = prefix {
        filters.push(p);
    }
    filters.push(FRAME_FILTER.to_string());
    if let Some(text) = label {
        filters.push(format!(
            "drawtext=text='{}':x=20:y=20:fontsize=28:fontcolor=white:box=1:boxcolor=black@0.5",
            escape_drawtext(text)
        ));
    }
    filters.join(",")
}

/// Encoder settings shared by every rendered unit; cuts output to `duration`.
fn encode_args(duration: f64, output: &Path) -> Vec<String> {
    let mut args = strings(&[
        "-map", "0:v:0", "-map", "1:a:0", "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt",
        "yuv420p", "-c:a", "aac", "-ar", "44100", "-ac", "2", "-t",
    ]);
    args.push(secs(duration));
    args.push(path_arg(output));
    args
}

/// Trim or speed-adjust a clip straight from the source file.
pub fn render_args(clip: &ClipRef, plan: &SyncPlan, label: Option<&str>, output: &Path) -> Vec<String> {
    let mut args = strings(&["-y", "-hide_banner", "-loglevel", "error", "-ss"]);
    args.push(secs(clip.in_point));
    args.push("-t".to_string());

    let prefix = match plan.strategy {
        SyncStrategy::SpeedAdjust => {
            args.push(secs(plan.source_clip_duration));
            Some(format!(
                "setpts=PTS/{:.4},tpad=start_duration={}:start_mode=clone:stop_duration={}:stop_mode=clone",
                plan.speed_factor,
                secs(plan.padding_before),
                secs(plan.padding_after)
            ))
        }
        _ => {
            args.push(secs(plan.target_duration));
            None
        }
    };

    args.push("-i".to_string());
    args.push(path_arg(&clip.path));
    args.extend(strings(&["-f", "lavfi", "-i", SILENCE, "-vf"]));
    args.push(video_filter(prefix, label));
    args.extend(encode_args(plan.target_duration, output));
    args
}

/// First step of a loop render: cut the source window into its own file.
pub fn extract_window_args(clip: &ClipRef, window: &Path) -> Vec<String> {
    let mut args = strings(&["-y", "-hide_banner", "-loglevel", "error", "-ss"]);
    args.push(secs(clip.in_point));
    args.push("-t".to_string());
    args.push(secs(clip.window_duration()));
    args.push("-i".to_string());
    args.push(path_arg(&clip.path));
    args.extend(strings(&["-an", "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p"]));
    args.push(path_arg(window));
    args
}

/// Second step of a loop render: repeat the window and cut to the target.
pub fn loop_args(window: &Path, plan: &SyncPlan, label: Option<&str>, output: &Path) -> Vec<String> {
    let mut args = strings(&["-y", "-hide_banner", "-loglevel", "error", "-stream_loop"]);
    args.push(plan.loop_count.saturating_sub(1).to_string());
    args.push("-i".to_string());
    args.push(path_arg(window));
    args.extend(strings(&["-f", "lavfi", "-i", SILENCE, "-vf"]));
    args.push(video_filter(None, label));
    args.extend(encode_args(plan.target_duration, output));
    args
}

/// Replace a unit's silent track with narration, padding short audio with
/// silence and cutting at the unit's length.
pub fn mux_args(unit: &MediaUnit, audio: &Path, output: &Path) -> Vec<String> {
    let mut args = strings(&["-y", "-hide_banner", "-loglevel", "error", "-i"]);
    args.push(path_arg(&unit.path));
    args.push("-i".to_string());
    args.push(path_arg(audio));
    args.extend(strings(&[
        "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-af", "apad", "-c:a", "aac", "-ar",
        "44100", "-ac", "2", "-t",
    ]));
    args.push(secs(unit.duration));
    args.push(path_arg(output));
    args
}

/// Concat demuxer list file contents.
///
/// The demuxer resolves relative entries against the list file's directory,
/// so relative unit paths are made absolute against `cwd` first.
pub fn concat_list(units: &[MediaUnit], cwd: &Path) -> String {
    units
        .iter()
        .map(|u| {
            let path = path_arg(&cwd.join(&u.path));
            format!("file '{}'\n", path.replace('\'', "'\\''"))
        })
        .collect()
}

pub fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    let mut args = strings(&["-y", "-hide_banner", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"]);
    args.push(path_arg(list));
    args.extend(strings(&["-c", "copy"]));
    args.push(path_arg(output));
    args
}

/// `xfade`/`acrossfade` chain over at least two units.
pub fn crossfade_filter(units: &[MediaUnit], crossfade: f64) -> String {
    let n = units.len();
    let mut parts = Vec::new();

    let mut prev = "0:v".to_string();
    let mut offset = 0.0;
    for i in 1..n {
        offset += units[i - 1].duration - crossfade;
        let out = if i == n - 1 { "outv".to_string() } else { format!("v{}", i) };
        parts.push(format!(
            "[{}][{}:v]xfade=transition=fade:duration={}:offset={}[{}]",
            prev,
            i,
            secs(crossfade),
            secs(offset),
            out
        ));
        prev = out;
    }

    let mut prev = "0:a".to_string();
    for i in 1..n {
        let out = if i == n - 1 { "outa".to_string() } else { format!("a{}", i) };
        parts.push(format!(
            "[{}][{}:a]acrossfade=d={}:c1=tri:c2=tri[{}]",
            prev,
            i,
            secs(crossfade),
            out
        ));
        prev = out;
    }

    parts.join(";")
}

pub fn crossfade_args(units: &[MediaUnit], crossfade: f64, output: &Path) -> Vec<String> {
    let mut args = strings(&["-y", "-hide_banner", "-loglevel", "error"]);
    for unit in units {
        args.push("-i".to_string());
        args.push(path_arg(&unit.path));
    }
    args.push("-filter_complex".to_string());
    args.push(crossfade_filter(units, crossfade));
    args.extend(strings(&[
        "-map", "[outv]", "-map", "[outa]", "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt",
        "yuv420p", "-c:a", "aac", "-ar", "44100", "-ac", "2",
    ]));
    args.push(path_arg(output));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_core::sync::{plan_speed_adjust, plan_sync};

    fn clip() -> ClipRef {
        ClipRef {
            path: PathBuf::from("/media/vid-1.mp4"),
            in_point: 30.0,
            out_point: 35.0,
        }
    }

    fn unit(name: &str, duration: f64) -> MediaUnit {
        MediaUnit {
            path: PathBuf::from(name),
            duration,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let pos = args.iter().position(|a| a == flag).unwrap();
        &args[pos + 1]
    }

    #[test]
    fn test_trim_args() {
        let plan = plan_sync(5.0, 3.5).unwrap();
        let args = render_args(&clip(), &plan, None, Path::new("out.mp4"));
        assert_eq!(value_after(&args, "-ss"), "30.000");
        assert_eq!(value_after(&args, "-t"), "3.500");
        assert_eq!(args.last().unwrap(), "out.mp4");
        assert!(!value_after(&args, "-vf").contains("drawtext"));
        // Output is cut to the target too.
        let t_count = args.iter().filter(|a| *a == "-t").count();
        assert_eq!(t_count, 2);
    }

    #[test]
    fn test_speed_adjust_args() {
        let plan = plan_speed_adjust(10.0, 8.0).unwrap();
        let args = render_args(&clip(), &plan, Some("vid-1"), Path::new("out.mp4"));
        let vf = value_after(&args, "-vf");
        assert!(vf.starts_with("setpts=PTS/1.2500,tpad="));
        assert!(vf.contains("drawtext=text='vid-1'"));
        assert_eq!(value_after(&args, "-t"), "10.000");
    }

    #[test]
    fn test_loop_args() {
        let plan = plan_sync(5.0, 12.0).unwrap();
        let window = window_path(Path::new("/work/unit-000.mp4"));
        assert_eq!(window, PathBuf::from("/work/unit-000.window.mp4"));

        let extract = extract_window_args(&clip(), &window);
        assert_eq!(value_after(&extract, "-t"), "5.000");

        let args = loop_args(&window, &plan, None, Path::new("/work/unit-000.mp4"));
        assert_eq!(value_after(&args, "-stream_loop"), "2");
        assert_eq!(value_after(&args, "-t"), "12.000");
    }

    #[test]
    fn test_mux_args_pad_and_cut() {
        let args = mux_args(&unit("u.mp4", 4.2), Path::new("u.mp3"), Path::new("m.mp4"));
        assert_eq!(value_after(&args, "-af"), "apad");
        assert_eq!(value_after(&args, "-t"), "4.200");
        assert_eq!(value_after(&args, "-c:v"), "copy");
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[unit("/w/a.mp4", 1.0), unit("/w/it's.mp4", 1.0)], Path::new("/run"));
        assert_eq!(list, "file '/w/a.mp4'\nfile '/w/it'\\''s.mp4'\n");
    }

    #[tokio::test]
    async fn test_mux_and_concat_remove_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        // `true` accepts any arguments and exits 0.
        let tools = FfmpegToolchain::new("true", "true");
        let rendered = unit(dir.path().join("unit-000.mp4").to_str().unwrap(), 4.0);
        let audio = AudioPayload {
            bytes: vec![1, 2, 3],
            format: "mp3".to_string(),
        };

        let muxed_path = dir.path().join("unit-000.narrated.mp4");
        let muxed = tools.mux(&rendered, &audio, &muxed_path).await.unwrap();
        assert_eq!(muxed.path, muxed_path);
        assert!(!dir.path().join("unit-000.narrated.mp3").exists());

        let output = dir.path().join("final.mp4");
        let joined = tools.concat(&[rendered.clone(), muxed], None, &output).await.unwrap();
        assert!((joined.duration - 8.0).abs() < 1e-9);
        assert!(!dir.path().join("final.txt").exists());
    }

    #[test]
    fn test_concat_list_entries_independent_of_list_location() {
        // The list lands next to renders/final.mp4, the units under work/.
        let list = concat_list(&[unit("work/unit-000.mp4", 1.0)], Path::new("/home/me/project"));
        assert_eq!(list, "file '/home/me/project/work/unit-000.mp4'\n");

        let entry = list.trim_end().trim_start_matches("file '").trim_end_matches('\'');
        let list_dir = Path::new("/home/me/project/renders");
        assert_eq!(list_dir.join(entry), PathBuf::from("/home/me/project/work/unit-000.mp4"));
    }

    #[test]
    fn test_crossfade_filter_offsets() {
        let units = [unit("a", 10.0), unit("b", 8.0), unit("c", 6.0)];
        let filter = crossfade_filter(&units, 0.5);
        assert!(filter.contains("[0:v][1:v]xfade=transition=fade:duration=0.500:offset=9.500[v1]"));
        assert!(filter.contains("[v1][2:v]xfade=transition=fade:duration=0.500:offset=17.000[outv]"));
        assert!(filter.contains("[a1][2:a]acrossfade=d=0.500:c1=tri:c2=tri[outa]"));
        assert!((joined_duration(&units, Some(0.5)) - 23.0).abs() < 1e-9);
        assert!((joined_duration(&units, None) - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("a:b'c"), "a\\:b\\'c");
    }

    #[test]
    fn test_probe_args_end_with_path() {
        let args = probe_args(Path::new("x.mp4"));
        assert_eq!(args.last().unwrap(), "x.mp4");
        assert_eq!(value_after(&args, "-show_entries"), "format=duration");
    }
}
