//! Loading the query list for a compilation.
//!
//! Queries normally come from an upstream script generator. Montage reads
//! them from a JSON array; beyond the field constraints checked during
//! selection, no validation happens here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use montage_core::collab::QueryGenerator;
use montage_core::models::Query;
use std::path::{Path, PathBuf};

/// [`QueryGenerator`] backed by a JSON file.
pub struct QueryFile {
    path: PathBuf,
}

impl QueryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse a JSON array of queries.
pub fn parse_queries(json: &str) -> Result<Vec<Query>> {
    serde_json::from_str(json).context("Failed to parse query list")
}

#[async_trait]
impl QueryGenerator for QueryFile {
    async fn queries(&self) -> Result<Vec<Query>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read query file: {}", self.path.display()))?;
        parse_queries(&content)
    }
}
