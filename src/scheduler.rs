//! Bounded-concurrency narration requests.
//!
//! At most `concurrency` requests are in flight at once, and each request
//! waits `request_delay` after getting its slot before it is sent, which
//! keeps bursts away from the speech service's rate limits. Every request
//! runs to completion; a failure never cancels the others.

use futures::future::join_all;
use montage_core::collab::NarrationSynth;
use montage_core::models::{NarrationResult, NarrationStatus};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::NarrationConfig;

/// One script to synthesize, for the segment at `segment_index`.
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub segment_index: usize,
    pub script_text: String,
    pub voice_id: String,
}

/// Results in request order.
#[derive(Debug, Clone, Serialize)]
pub struct NarrationBatch {
    pub results: Vec<(usize, NarrationResult)>,
}

impl NarrationBatch {
    pub fn succeeded(&self) -> usize {
        self.count(NarrationStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(NarrationStatus::Failed)
    }

    /// True only when something succeeded and nothing failed.
    pub fn success(&self) -> bool {
        self.succeeded() > 0 && self.failed() == 0
    }

    /// Result for a segment, if one was requested.
    pub fn for_segment(&self, segment_index: usize) -> Option<&NarrationResult> {
        self.results
            .iter()
            .find(|(i, _)| *i == segment_index)
            .map(|(_, r)| r)
    }

    fn count(&self, status: NarrationStatus) -> usize {
        self.results.iter().filter(|(_, r)| r.status == status).count()
    }
}

pub struct NarrationScheduler {
    concurrency: usize,
    request_delay: Duration,
}

impl NarrationScheduler {
    pub const DEFAULT_CONCURRENCY: usize = 3;
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

    pub fn new(concurrency: usize, request_delay: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            request_delay,
        }
    }

    pub fn from_config(config: &NarrationConfig) -> Self {
        Self::new(
            config.concurrency,
            Duration::from_millis(config.request_delay_ms),
        )
    }

    /// Issue every request and wait for all of them.
    pub async fn run(&self, synth: &dyn NarrationSynth, requests: &[NarrationRequest]) -> NarrationBatch {
        let semaphore = Semaphore::new(self.concurrency);
        let delay = self.request_delay;

        let futures = requests.iter().map(|req| {
            let semaphore = &semaphore;
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(p) => p,
                    Err(e) => {
                        return (
                            req.segment_index,
                            NarrationResult::failed(req.script_text.clone(), e.to_string()),
                        )
                    }
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let result = match synth.synthesize(&req.script_text, &req.voice_id).await {
                    Ok(audio) if audio.audio_duration.is_finite() && audio.audio_duration > 0.0 => {
                        debug!(
                            segment = req.segment_index,
                            duration = audio.audio_duration,
                            "narration synthesized"
                        );
                        NarrationResult::succeeded(
                            req.script_text.clone(),
                            audio.audio,
                            audio.audio_duration,
                        )
                    }
                    Ok(audio) => NarrationResult::failed(
                        req.script_text.clone(),
                        format!("invalid audio duration {}", audio.audio_duration),
                    ),
                    Err(e) => NarrationResult::failed(req.script_text.clone(), format!("{:#}", e)),
                };

                if let Some(err) = &result.error {
                    warn!(segment = req.segment_index, error = %err, "narration failed");
                }
                (req.segment_index, result)
            }
        });

        NarrationBatch {
            results: join_all(futures).await,
        }
    }
}

impl Default for NarrationScheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONCURRENCY, Self::DEFAULT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use montage_core::collab::SynthesizedAudio;
    use montage_core::models::AudioPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Fails any script containing "fail"; audio lasts one second per word.
    struct FakeSynth {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        hold: Duration,
    }

    impl FakeSynth {
        fn new(hold: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                hold,
            }
        }
    }

    #[async_trait]
    impl NarrationSynth for FakeSynth {
        async fn synthesize(&self, script_text: &str, _voice_id: &str) -> Result<SynthesizedAudio> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if script_text.contains("fail") {
                bail!("synthesis rejected");
            }
            Ok(SynthesizedAudio {
                audio: AudioPayload {
                    bytes: vec![1, 2, 3],
                    format: "mp3".to_string(),
                },
                audio_duration: script_text.split_whitespace().count() as f64,
            })
        }
    }

    fn requests(scripts: &[&str]) -> Vec<NarrationRequest> {
        scripts
            .iter()
            .enumerate()
            .map(|(i, s)| NarrationRequest {
                segment_index: i,
                script_text: s.to_string(),
                voice_id: "v".to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_partial_failure_returns_all_results() {
        let synth = FakeSynth::new(Duration::from_millis(1));
        let scheduler = NarrationScheduler::new(3, Duration::ZERO);
        let batch = scheduler
            .run(&synth, &requests(&["one two", "please fail", "three four five"]))
            .await;

        assert_eq!(batch.results.len(), 3);
        assert_eq!(batch.succeeded(), 2);
        assert_eq!(batch.failed(), 1);
        assert!(!batch.success());

        let second = batch.for_segment(1).unwrap();
        assert_eq!(second.status, NarrationStatus::Failed);
        assert!(second.error.as_deref().unwrap().contains("rejected"));
        assert!((batch.for_segment(2).unwrap().audio_duration - 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_all_succeeded_is_success() {
        let synth = FakeSynth::new(Duration::from_millis(1));
        let batch = NarrationScheduler::new(2, Duration::ZERO)
            .run(&synth, &requests(&["a b", "c"]))
            .await;
        assert!(batch.success());
        let order: Vec<usize> = batch.results.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_success() {
        let synth = FakeSynth::new(Duration::ZERO);
        let batch = NarrationScheduler::default().run(&synth, &[]).await;
        assert!(batch.results.is_empty());
        assert!(!batch.success());
    }

    #[tokio::test]
    async fn test_zero_duration_audio_is_failure() {
        let synth = FakeSynth::new(Duration::ZERO);
        // No words: the fake reports a zero-length clip.
        let batch = NarrationScheduler::new(1, Duration::ZERO)
            .run(&synth, &requests(&["   "]))
            .await;
        assert_eq!(batch.failed(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let synth = FakeSynth::new(Duration::from_millis(20));
        let scripts = ["a", "b", "c", "d", "e", "f", "g"];
        let batch = NarrationScheduler::new(2, Duration::ZERO)
            .run(&synth, &requests(&scripts))
            .await;
        assert_eq!(batch.succeeded(), scripts.len());
        let max = synth.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 2, "max in flight was {}", max);
        assert!(max >= 1);
    }

    #[tokio::test]
    async fn test_request_delay_applies_per_request() {
        let synth = FakeSynth::new(Duration::ZERO);
        let started = Instant::now();
        NarrationScheduler::new(1, Duration::from_millis(25))
            .run(&synth, &requests(&["a", "b", "c"]))
            .await;
        assert!(started.elapsed() >= Duration::from_millis(75));
    }
}
