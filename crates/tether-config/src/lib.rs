//! Configuration for Tether binaries.
//!
//! The file format is TOML with two tables:
//!
//! ```toml
//! [logging]
//! level = "debug"
//! json = false
//!
//! [debugger]
//! hide_system_threads = true
//! break_on_uncaught = false
//! system_threads = ["Watchdog"]
//! wait_timeout_ms = 5000
//! ```
//!
//! Unknown keys are rejected so typos surface as errors instead of being
//! silently ignored.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

/// Environment variable consulted for a config path when none is given.
pub const CONFIG_ENV_VAR: &str = "TETHER_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub debugger: DebuggerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file as well. If the file cannot be opened the
    /// other sinks stay active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level, with `RUST_LOG` merged on
    /// top when it is set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        self.env_filter_with(env_directives.as_deref())
    }

    fn env_filter_with(&self, env_directives: Option<&str>) -> tracing_subscriber::EnvFilter {
        let config_directives = Self::normalize_level_directives(&self.level);
        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Leave known system threads out of thread listings.
    #[serde(default = "DebuggerConfig::default_hide_system_threads")]
    pub hide_system_threads: bool,

    /// Suspend the thread when an exception escapes a task.
    #[serde(default)]
    pub break_on_uncaught: bool,

    /// Extra thread names treated as system threads, on top of every thread
    /// in the `system` group.
    #[serde(default)]
    pub system_threads: Vec<String>,

    /// Upper bound for the blocking `wait_*` helpers.
    #[serde(default = "DebuggerConfig::default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl DebuggerConfig {
    fn default_hide_system_threads() -> bool {
        true
    }

    fn default_wait_timeout_ms() -> u64 {
        5_000
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            hide_system_threads: Self::default_hide_system_threads(),
            break_on_uncaught: false,
            system_threads: Vec::new(),
            wait_timeout_ms: Self::default_wait_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Keep the message only; the default `Display` quotes the offending
        // source text.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl TetherConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`, falling back to `$TETHER_CONFIG`, then to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => match std::env::var_os(CONFIG_ENV_VAR) {
                Some(path) if !path.is_empty() => Self::load_from_path(PathBuf::from(path)),
                _ => Ok(Self::default()),
            },
        }
    }
}

static TRACING_INIT: Once = Once::new();

#[derive(Clone)]
struct MutexFileMakeWriter {
    file: Arc<Mutex<File>>,
}

struct MutexFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for MutexFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            file: self.file.clone(),
        }
    }
}

/// Install the global tracing subscriber. Only the first call in a process
/// has an effect; later calls return `false`.
pub fn init_tracing(logging: &LoggingConfig) -> bool {
    let mut installed = false;
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let file = logging.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = logging.file.is_some() && file.is_none();

        let mut make_writer = if logging.stderr {
            // `cargo test` only captures output written through the stdlib
            // print macros, which `TestWriter` uses.
            if cfg!(debug_assertions) {
                BoxMakeWriter::new(tracing_subscriber::fmt::writer::TestWriter::with_stderr)
            } else {
                BoxMakeWriter::new(io::stderr)
            }
        } else {
            BoxMakeWriter::new(io::sink)
        };
        if let Some(file) = file {
            let file = MutexFileMakeWriter {
                file: Arc::new(Mutex::new(file)),
            };
            make_writer = BoxMakeWriter::new(make_writer.and(file));
        }

        let layer: Box<dyn Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        installed = tracing::subscriber::set_global_default(subscriber).is_ok();
        if installed && file_open_failed {
            if let Some(path) = logging.file.as_ref() {
                tracing::warn!(
                    target: "tether.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
    installed
}
