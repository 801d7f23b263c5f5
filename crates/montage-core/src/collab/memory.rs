//! In-memory [`SimilaritySearch`] implementation for testing and offline runs.
//!
//! Holds a fixed list of hits. A query matches a hit when they share at
//! least one word (case-insensitive) in the hit's text or tags. Matches are
//! returned by `base_score` descending, ties in stored order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::{Candidate, CandidateKind};

use super::SimilaritySearch;

/// Fixed-content search backend.
pub struct InMemorySearch {
    hits: Vec<Candidate>,
}

impl InMemorySearch {
    pub fn new(hits: Vec<Candidate>) -> Self {
        Self { hits }
    }

    /// Load hits from a JSON array of candidates, validating each one.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let hits: Vec<Candidate> =
            serde_json::from_str(json).context("Failed to parse search fixture")?;
        for hit in &hits {
            hit.validate()?;
        }
        Ok(Self::new(hits))
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(|w| w.to_lowercase())
        .collect()
}

#[async_trait]
impl SimilaritySearch for InMemorySearch {
    async fn search(&self, query_text: &str, limit: usize, kind: CandidateKind) -> Result<Vec<Candidate>> {
        let query_words = words(query_text);
        if query_words.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<&Candidate> = self
            .hits
            .iter()
            .filter(|c| c.kind == kind)
            .filter(|c| {
                let mut hit_words = words(&c.text);
                for tag in &c.tags {
                    hit_words.extend(words(tag));
                }
                !hit_words.is_disjoint(&query_words)
            })
            .collect();

        matches.sort_by(|a, b| {
            b.base_score
                .partial_cmp(&a.base_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);

        Ok(matches.into_iter().cloned().collect())
    }
}
