//! Laying synchronized segments end-to-end on the output timeline.
//!
//! Entries are placed back to back in selection order. With a crossfade of
//! `c` seconds each boundary overlaps by `c`, so the total is
//! `Σ target − c × (n − 1)`.

use crate::error::{CoreError, CoreResult};
use crate::models::{NarrationResult, SelectedSegment, SyncPlan, Timeline, TimelineEntry};

/// A segment ready to be placed: its plan and (optional) narration.
#[derive(Debug, Clone)]
pub struct TimelinePart {
    pub segment: SelectedSegment,
    pub plan: SyncPlan,
    pub narration: Option<NarrationResult>,
}

impl Timeline {
    /// Place `parts` in order.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EmptyTimeline`] when `parts` is empty.
    /// - [`CoreError::InvalidDuration`] when the crossfade is negative or not
    ///   shorter than every entry it would overlap.
    pub fn build(parts: Vec<TimelinePart>, crossfade: Option<f64>) -> CoreResult<Timeline> {
        if parts.is_empty() {
            return Err(CoreError::EmptyTimeline);
        }

        let crossfade = match crossfade {
            Some(c) if !c.is_finite() || c < 0.0 => {
                return Err(CoreError::InvalidDuration {
                    reason: format!("crossfade {} must be >= 0", c),
                })
            }
            Some(c) if c == 0.0 => None,
            other => other,
        };

        if let Some(c) = crossfade {
            if parts.len() > 1 {
                if let Some(short) = parts.iter().find(|p| p.plan.target_duration <= c) {
                    return Err(CoreError::InvalidDuration {
                        reason: format!(
                            "crossfade {} is not shorter than segment duration {}",
                            c, short.plan.target_duration
                        ),
                    });
                }
            }
        }

        let overlap = crossfade.unwrap_or(0.0);
        let mut cursor = 0.0;
        let mut entries = Vec::with_capacity(parts.len());

        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                cursor -= overlap;
            }
            let start = cursor;
            cursor += part.plan.output_duration();
            entries.push(TimelineEntry {
                segment: part.segment,
                plan: part.plan,
                narration: part.narration,
                start,
            });
        }

        Ok(Timeline {
            entries,
            crossfade,
            total_duration: cursor,
        })
    }

    /// Sum of entry target durations, ignoring crossfade overlap.
    pub fn naive_duration(&self) -> f64 {
        self.entries.iter().map(|e| e.plan.target_duration).sum()
    }

    /// True when every entry starts where the previous one ends (less the
    /// crossfade), within `tolerance` seconds.
    pub fn is_contiguous(&self, tolerance: f64) -> bool {
        let overlap = self.crossfade.unwrap_or(0.0);
        self.entries
            .windows(2)
            .all(|w| (w[0].end() - overlap - w[1].start).abs() <= tolerance)
    }
}
