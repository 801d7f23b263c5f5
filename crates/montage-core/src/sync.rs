//! Reconciling a source clip's natural length with a target length.
//!
//! The target is the narration's audio duration when narration exists, so
//! video is always adapted to audio, never the reverse.
//!
//! | Mode | Condition | Strategy |
//! |------|-----------|----------|
//! | `Cut` | source ≥ target | `Trim` to the target from the clip's in-point |
//! | `Cut` | source < target | `Loop` `floor(target / source) + 1` times, then trim |
//! | `SpeedAdjust` | any | speed `clamp(source / target, 0.7, 1.3)`, pad the remainder |

use crate::error::{CoreError, CoreResult};
use crate::models::{SyncMode, SyncPlan, SyncStrategy};

pub const MIN_SPEED_FACTOR: f64 = 0.7;
pub const MAX_SPEED_FACTOR: f64 = 1.3;

/// Plan a re-cut (trim or loop) of the source clip to exactly `target_duration`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidDuration`] if either duration is not a
/// positive finite number.
pub fn plan_sync(source_clip_duration: f64, target_duration: f64) -> CoreResult<SyncPlan> {
    check_durations(source_clip_duration, target_duration)?;

    if source_clip_duration >= target_duration {
        return Ok(SyncPlan {
            source_clip_duration,
            target_duration,
            strategy: SyncStrategy::Trim,
            loop_count: 1,
            speed_factor: 1.0,
            padding_before: 0.0,
            padding_after: 0.0,
        });
    }

    let loop_count = (target_duration / source_clip_duration).floor() as u32 + 1;
    Ok(SyncPlan {
        source_clip_duration,
        target_duration,
        strategy: SyncStrategy::Loop,
        loop_count,
        speed_factor: 1.0,
        padding_before: 0.0,
        padding_after: 0.0,
    })
}

/// Plan a bounded speed change for a clip whose window must not be re-cut.
///
/// The clip is played at `speed_factor` and whatever time is left is split
/// evenly before and after it. When the clamp leaves the clip longer than
/// the target, no padding is added and the renderer trims the overrun.
pub fn plan_speed_adjust(source_clip_duration: f64, target_duration: f64) -> CoreResult<SyncPlan> {
    check_durations(source_clip_duration, target_duration)?;

    let speed_factor =
        (source_clip_duration / target_duration).clamp(MIN_SPEED_FACTOR, MAX_SPEED_FACTOR);
    let adjusted = source_clip_duration / speed_factor;
    let remaining = target_duration - adjusted;
    let padding_before = (remaining / 2.0).max(0.0);
    let padding_after = (remaining - padding_before).max(0.0);

    Ok(SyncPlan {
        source_clip_duration,
        target_duration,
        strategy: SyncStrategy::SpeedAdjust,
        loop_count: 1,
        speed_factor,
        padding_before,
        padding_after,
    })
}

/// Dispatch on the caller's chosen [`SyncMode`].
pub fn plan_for(mode: SyncMode, source_clip_duration: f64, target_duration: f64) -> CoreResult<SyncPlan> {
    match mode {
        SyncMode::Cut => plan_sync(source_clip_duration, target_duration),
        SyncMode::SpeedAdjust => plan_speed_adjust(source_clip_duration, target_duration),
    }
}

impl SyncPlan {
    /// Length of the clip after the speed change, before padding.
    pub fn adjusted_duration(&self) -> f64 {
        self.source_clip_duration / self.speed_factor
    }

    /// Length of the looped material before it is trimmed to the target.
    pub fn looped_duration(&self) -> f64 {
        self.source_clip_duration * self.loop_count as f64
    }

    /// Length of the rendered unit. Always the target: every strategy either
    /// cuts exactly, or pads and trims to it.
    pub fn output_duration(&self) -> f64 {
        self.target_duration
    }
}

fn check_durations(source: f64, target: f64) -> CoreResult<()> {
    if !source.is_finite() || source <= 0.0 {
        return Err(CoreError::InvalidDuration {
            reason: format!("source clip duration {} must be > 0", source),
        });
    }
    if !target.is_finite() || target <= 0.0 {
        return Err(CoreError::InvalidDuration {
            reason: format!("target duration {} must be > 0", target),
        });
    }
    Ok(())
}
