//! Similarity search backends.
//!
//! - **[`HttpSearch`]** calls a vector search service over HTTP, one named
//!   collection per candidate kind.
//! - **Fixture** search serves hits from a JSON file through
//!   [`InMemorySearch`].
//!
//! Use [`create_search`] to build the backend named in the configuration.
//!
//! # Response Translation
//!
//! The service answers `{"hits": [...]}`. Each hit is mapped onto a
//! [`Candidate`] by [`translate_hit`]: the source id (`source_id` or
//! `video_id`), `start`, `end`, `score`, and `text` are mandatory and a hit
//! missing any of them fails the whole call. `tags` defaults to empty and
//! every other field is carried as a raw attribute.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use montage_core::collab::memory::InMemorySearch;
use montage_core::collab::SimilaritySearch;
use montage_core::models::{Candidate, CandidateKind};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;

use crate::config::SearchConfig;

/// Build the search backend configured in `[search]`.
pub fn create_search(config: &SearchConfig) -> Result<Box<dyn SimilaritySearch>> {
    match config.provider.as_str() {
        "http" => Ok(Box::new(HttpSearch::new(config)?)),
        "fixture" => {
            let path = config
                .fixture
                .as_ref()
                .ok_or_else(|| anyhow!("search.fixture required for fixture provider"))?;
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read search fixture: {}", path.display()))?;
            Ok(Box::new(InMemorySearch::from_json_str(&content)?))
        }
        other => bail!("Unknown search provider: {}", other),
    }
}

/// Search client for an HTTP vector index.
///
/// Sends `POST {base_url}/search` with `{"query", "limit", "collection"}`.
pub struct HttpSearch {
    client: reqwest::Client,
    base_url: String,
    collections: BTreeMap<CandidateKind, String>,
}

impl HttpSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| anyhow!("search.base_url required for http provider"))?;

        let mut collections = BTreeMap::new();
        for kind in CandidateKind::ALL {
            let name = config
                .collection_for(kind)
                .ok_or_else(|| anyhow!("search.collections.{} must be set", kind))?;
            collections.insert(kind, name.to_string());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collections,
        })
    }
}

#[async_trait]
impl SimilaritySearch for HttpSearch {
    async fn search(&self, query_text: &str, limit: usize, kind: CandidateKind) -> Result<Vec<Candidate>> {
        let collection = self
            .collections
            .get(&kind)
            .ok_or_else(|| anyhow!("no collection configured for {}", kind))?;

        let body = serde_json::json!({
            "query": query_text,
            "limit": limit,
            "collection": collection,
        });

        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("search request to collection '{}' failed", collection))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("search service returned {}: {}", status, text);
        }

        let json: Value = resp.json().await.context("invalid search response body")?;
        let hits = translate_response(&json, kind)?;
        debug!(collection = %collection, hits = hits.len(), "search returned");
        Ok(hits)
    }
}

/// Translate a `{"hits": [...]}` response body.
pub fn translate_response(json: &Value, kind: CandidateKind) -> Result<Vec<Candidate>> {
    let hits = json
        .get("hits")
        .and_then(|h| h.as_array())
        .ok_or_else(|| anyhow!("search response missing 'hits' array"))?;

    hits.iter()
        .enumerate()
        .map(|(i, hit)| translate_hit(hit, kind).with_context(|| format!("hit #{}", i)))
        .collect()
}

/// Map one collaborator hit onto a [`Candidate`], failing fast on missing
/// mandatory fields.
pub fn translate_hit(hit: &Value, kind: CandidateKind) -> Result<Candidate> {
    let obj = hit
        .as_object()
        .ok_or_else(|| anyhow!("hit is not an object"))?;

    let source_id = ["source_id", "video_id"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("missing source_id"))?;

    let number = |key: &str| -> Result<f64> {
        obj.get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow!("missing numeric field '{}'", key))
    };

    let start_offset = number("start")?;
    let end_offset = number("end")?;
    let base_score = number("score")?;
    let text = obj
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing text"))?
        .to_string();

    let tags: BTreeSet<String> = match obj.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    };

    const CONSUMED: [&str; 7] = ["source_id", "video_id", "start", "end", "score", "text", "tags"];
    let raw_attributes = obj
        .iter()
        .filter(|(k, _)| !CONSUMED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let candidate = Candidate {
        source_id,
        kind,
        start_offset,
        end_offset,
        base_score,
        text,
        tags,
        raw_attributes,
    };
    candidate.validate()?;
    Ok(candidate)
}
