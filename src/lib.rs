//! # Montage
//!
//! Assembles a short narrated video from similarity-search hits.
//!
//! Queries are run against two search collections (transcript-derived and
//! scene-derived hits), scored, paired by source window, and selected
//! greedily under a duration budget with a per-source diversity cap. Each
//! selected segment is narrated, re-timed so the video matches the audio,
//! and the rendered units are joined into one file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌────────────┐   ┌──────────┐
//! │ Queries  │──▶│ Search + Score │──▶│ Pair+Select│──▶│ Narrate  │
//! └──────────┘   └────────────────┘   └────────────┘   └────┬─────┘
//!                                                           ▼
//!                                   ┌──────────┐      ┌──────────┐
//!                                   │  Concat  │◀─────│ Sync+Cut │
//!                                   └──────────┘      └──────────┘
//! ```
//!
//! The pure parts (scoring, selection, sync planning, timeline layout) live
//! in `montage-core`; this crate supplies the HTTP clients, the ffmpeg
//! toolchain, configuration, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`compile`] | The end-to-end pipeline and its report |
//! | [`search_client`] | HTTP and fixture search backends |
//! | [`narration`] | Text-to-speech backend |
//! | [`scheduler`] | Bounded-concurrency narration requests |
//! | [`media`] | ffmpeg/ffprobe toolchain |
//! | [`assemble`] | Per-segment render and timeline assembly |
//! | [`queries`] | Query list loading |
//! | [`logging`] | `tracing` subscriber setup |

pub mod assemble;
pub mod compile;
pub mod config;
pub mod logging;
pub mod media;
pub mod narration;
pub mod queries;
pub mod scheduler;
pub mod search_client;
