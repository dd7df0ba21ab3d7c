// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide logging setup on top of `tracing`.
//!
//! Logs go to stderr and, when a directory is configured, to hourly rotated
//! files plus a separate error-only file.

use std::{
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once, PoisonError},
};

use bon::Builder;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for rotated log files. Empty disables file logging.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Log level filter string such as `"info"` or `"info,flatq_queue=debug"`.
    ///
    /// Falls back to `RUST_LOG`, then to `"info"`.
    pub level: Option<String>,

    /// Output format for log messages.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated log files to retain. The default keeps 30
    /// days of hourly files.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to also write logs to stderr.
    #[default = true]
    #[builder(default = true)]
    pub append_stderr: bool,
}

/// Available log output formats.
#[derive(
    Clone,
    Debug,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Default,
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with span context.
    ///
    /// ```json
    /// {"timestamp":"2025-01-01T12:00:00Z","level":"INFO","target":"flatq_queue::queue","fields":{"message":"Queue initialized"}}
    /// ```
    Json,

    /// Human-readable lines.
    ///
    /// ```text
    /// 2025-01-01T12:00:00.123Z  INFO flatq_queue::queue: Queue initialized
    /// ```
    #[default]
    Text,
}

/// Initialize tracing with default configuration: text to stderr, no files.
#[must_use]
pub fn init_tracing_subscriber(app_name: &str) -> Vec<WorkerGuard> {
    init_global_logging(app_name, &LoggingOptions::default())
}

/// Initialize logging for unit and integration tests.
///
/// Logs are written under `UNITTEST_LOG_DIR` (default
/// `/tmp/__unittest_logs`) at `UNITTEST_LOG_LEVEL` (default `debug`). Safe to
/// call from every test; only the first call does anything.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let mut g = GLOBAL_UT_LOG_GUARD
            .as_ref()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            append_stderr: false,
            ..Default::default()
        };
        *g = Some(init_global_logging("unittest", &opts));

        tracing::info!("logs dir = {}", dir);
    });
}

/// Keeps the unit test writers alive for the whole test binary.
static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Fallback filter when neither `level` nor `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Initialize the global subscriber.
///
/// `app_name` prefixes the rotated file names (`<app_name>.<hour>` and
/// `<app_name>-err.<hour>`). The returned guards flush the non-blocking
/// writers when dropped and must live as long as logging is needed.
///
/// Only the first call in a process installs a subscriber; later calls
/// return no guards.
///
/// # Panics
///
/// Panics if the log directory cannot be used, the level string does not
/// parse, or another global subscriber was already installed.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().unwrap_or_else(|e| panic!("log tracer must be valid: {e}"));

        let stderr_logging_layer = opts.append_stderr.then(|| {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            guards.push(guard);
            fmt_layer(writer, opts.log_format, std::io::stderr().is_terminal())
        });

        let file_logging_layer = (!opts.dir.is_empty()).then(|| {
            let (writer, guard) = rolling_writer(app_name, opts);
            guards.push(guard);
            fmt_layer(writer, opts.log_format, false)
        });

        let err_file_logging_layer = (!opts.dir.is_empty()).then(|| {
            let (writer, guard) = rolling_writer(&format!("{app_name}-err"), opts);
            guards.push(guard);
            fmt_layer(writer, opts.log_format, false)
                .with_filter(filter::LevelFilter::ERROR)
                .boxed()
        });

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .unwrap_or_else(|e| panic!("error parsing log level string: {e}"));

        let subscriber = Registry::default()
            .with(filter)
            .with(stderr_logging_layer)
            .with(file_logging_layer)
            .with(err_file_logging_layer);

        tracing::subscriber::set_global_default(subscriber)
            .unwrap_or_else(|e| panic!("error setting global tracing subscriber: {e}"));
    });

    guards
}

fn rolling_writer(file_prefix: &str, opts: &LoggingOptions) -> (NonBlocking, WorkerGuard) {
    let rolling_appender = RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(file_prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| {
            panic!(
                "initializing rolling file appender at {} failed: {}",
                &opts.dir, e
            )
        });
    tracing_appender::non_blocking(rolling_appender)
}

fn fmt_layer<S, W>(writer: W, format: LogFormat, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}
