//! # Montage Core
//!
//! Runtime-free logic for Montage: data models, candidate scoring, pairing,
//! budgeted selection, AV sync planning, timeline layout, and the
//! collaborator traits the application implements.
//!
//! This crate contains no tokio, HTTP client, process spawning, or other
//! I/O dependencies. Everything except the collaborator traits is a pure,
//! synchronous computation over in-memory data.
//!
//! ## Pipeline
//!
//! ```text
//! queries ─▶ score::select_per_query ─▶ pair::pair_segments ─▶ select::select_for_budget
//!                                                                     │
//!        timeline::Timeline::build ◀── sync::plan_for ◀── narration ◀─┘
//! ```

pub mod collab;
pub mod error;
pub mod models;
pub mod pair;
pub mod report;
pub mod score;
pub mod select;
pub mod sync;
pub mod timeline;
