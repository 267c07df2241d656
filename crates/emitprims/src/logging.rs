use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with a full filter directive when set.
pub const LOG_ENV: &str = "EMITPRIMS_LOG";

const CRATES: [&str; 3] = ["emitprims", "emitprims_spark", "emitprims_frame"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Directive scoping `self` to our crates; everything else stays at warn.
    pub fn directive(self) -> String {
        let mut directive = String::from("warn");
        for name in CRATES {
            directive.push(',');
            directive.push_str(name);
            directive.push('=');
            directive.push_str(self.as_str());
        }
        directive
    }
}

fn build_filter(env_value: Option<String>, level: LogLevel) -> EnvFilter {
    env_value
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(level.directive()))
}

/// Install the stderr subscriber. Reader and ack-timer threads are named
/// after their spark, so thread names stay on.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = build_filter(std::env::var(LOG_ENV).ok(), level);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
