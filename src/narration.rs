//! Narration synthesis backends.
//!
//! - **Disabled**: no narration, every segment keeps its own duration.
//! - **[`HttpNarrator`]** calls a text-to-speech service over HTTP.
//!
//! The service answers
//! `{"audio_base64": "...", "duration_secs": 4.2, "format": "mp3"}`.
//! `audio_base64` and `duration_secs` are mandatory; `format` defaults to
//! `mp3`. Timeouts come from `narration.timeout_secs` on the HTTP client;
//! nothing is retried here.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use montage_core::collab::{NarrationSynth, SynthesizedAudio};
use montage_core::models::AudioPayload;
use serde_json::Value;
use std::time::Duration;

use crate::config::NarrationConfig;

/// Build the narrator configured in `[narration]`, or `None` when disabled.
pub fn create_narrator(config: &NarrationConfig) -> Result<Option<Box<dyn NarrationSynth>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "http" => Ok(Some(Box::new(HttpNarrator::new(config)?))),
        other => bail!("Unknown narration provider: {}", other),
    }
}

/// Text-to-speech client: `POST {base_url}/synthesize` with `{"text", "voice"}`.
pub struct HttpNarrator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNarrator {
    pub fn new(config: &NarrationConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| anyhow!("narration.base_url required for http provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NarrationSynth for HttpNarrator {
    async fn synthesize(&self, script_text: &str, voice_id: &str) -> Result<SynthesizedAudio> {
        let body = serde_json::json!({
            "text": script_text,
            "voice": voice_id,
        });

        let resp = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&body)
            .send()
            .await
            .context("narration request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("narration service returned {}: {}", status, text);
        }

        let json: Value = resp.json().await.context("invalid narration response body")?;
        translate_synthesis(&json)
    }
}

/// Map the service's response onto [`SynthesizedAudio`].
pub fn translate_synthesis(json: &Value) -> Result<SynthesizedAudio> {
    let encoded = json
        .get("audio_base64")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("narration response missing audio_base64"))?;
    let audio_duration = json
        .get("duration_secs")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("narration response missing duration_secs"))?;
    let format = json
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("mp3")
        .to_string();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("narration audio is not valid base64")?;
    if bytes.is_empty() {
        bail!("narration audio is empty");
    }

    Ok(SynthesizedAudio {
        audio: AudioPayload { bytes, format },
        audio_duration,
    })
}
