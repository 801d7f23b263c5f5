//! Structured logging setup.
//!
//! Events go to **stderr** so stdout stays parseable for scripts (reports and
//! selections are printed there as JSON). The filter is read from the
//! `MONTAGE_LOG` environment variable and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the `EnvFilter` directive.
pub const LOG_ENV: &str = "MONTAGE_LOG";

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    /// Human-readable when stderr is a TTY, JSON lines otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            LogFormat::Human
        } else {
            LogFormat::Json
        }
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Human => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
