//! # Montage CLI (`montage`)
//!
//! ## Usage
//!
//! ```bash
//! montage --config ./config/montage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `montage compile --queries <file>` | Search, select, narrate, and render a video |
//! | `montage select --queries <file>` | Print the selection without rendering |
//! | `montage plan-sync <source> <target>` | Print the sync plan for one clip |
//!
//! ## Examples
//!
//! ```bash
//! # Render a compilation and keep the report
//! montage compile --queries squat.json --out squat.mp4 --report squat.report.json
//!
//! # Check what would be selected under the current budget
//! montage select --queries squat.json
//!
//! # How would a 5s clip be fitted to 12s of narration?
//! montage plan-sync 5 12
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use montage::compile;
use montage::config;
use montage::logging::{self, LogFormat};

/// Montage CLI: assemble narrated videos from similarity-search hits.
///
/// Commands that touch search, narration, or media read a TOML
/// configuration file. See `config/montage.example.toml`.
#[derive(Parser)]
#[command(
    name = "montage",
    about = "Montage: assemble narrated videos from similarity-search hits",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/montage.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines (the default when stderr is not a terminal).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline and print the JSON report.
    Compile {
        /// JSON array of queries.
        #[arg(long)]
        queries: PathBuf,

        /// Output video path.
        #[arg(long, default_value = "montage.mp4")]
        out: PathBuf,

        /// Also write the report to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Search, score, pair and select only; print the selection.
    Select {
        /// JSON array of queries.
        #[arg(long)]
        queries: PathBuf,
    },

    /// Print the sync plan fitting a clip of `source` seconds to `target` seconds.
    PlanSync {
        source: f64,
        target: f64,

        /// Change playback speed instead of re-cutting.
        #[arg(long)]
        speed_adjust: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::default_for_tty()
    };
    logging::init_tracing(format);

    // Commands that don't require config
    if let Commands::PlanSync {
        source,
        target,
        speed_adjust,
    } = cli.command
    {
        return compile::run_plan_sync(source, target, speed_adjust);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Compile {
            queries,
            out,
            report,
        } => {
            compile::run_compile(&cfg, &queries, &out, report).await?;
        }
        Commands::Select { queries } => {
            compile::run_select(&cfg, &queries).await?;
        }
        Commands::PlanSync { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
