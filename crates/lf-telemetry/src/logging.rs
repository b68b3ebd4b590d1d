use tracing_subscriber::{fmt, EnvFilter};

/// Output shape of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines for terminals.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// `RUST_LOG` when it is set and parses, otherwise `default_level`
/// (e.g. `"info"` or `"lf_engine=debug,warn"`), otherwise `info`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns `false` when one was already installed; the call is then a no-op,
/// which keeps repeated initialisation in tests harmless.
pub fn init(service_name: &str, default_level: &str, format: LogFormat) -> bool {
    let filter = env_filter(default_level);
    let installed = match format {
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_level(true)
            .try_init()
            .is_ok(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .with_level(true)
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(service = service_name, ?format, "logging initialised");
    }
    installed
}

pub fn init_logging(service_name: &str, default_level: &str) -> bool {
    init(service_name, default_level, LogFormat::Pretty)
}

pub fn init_logging_json(service_name: &str, default_level: &str) -> bool {
    init(service_name, default_level, LogFormat::Json)
}
