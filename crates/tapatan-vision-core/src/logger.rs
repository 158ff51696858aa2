//! Process-wide logging setup.
//!
//! Library code only emits through the `log` facade. A binary builds a
//! [`LogConfig`] once at startup and hands it to [`init_logging`]: records
//! from the `tapatan_vision*` crates and from everything else (image codecs,
//! argument parsing) get separate ceilings, so `-vv` shows the calibration
//! pipeline without drowning it in decoder chatter.

use std::fmt;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

const OWN_TARGET: &str = "tapatan_vision";

/// Verbosity and output shape of the process logger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// Ceiling for records whose target starts with `tapatan_vision`.
    pub level: LevelFilter,
    /// Ceiling for every other target.
    pub dependency_level: LevelFilter,
    /// JSON lines instead of text; needs the `tracing` feature.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Warn,
            dependency_level: LevelFilter::Warn,
            json: false,
        }
    }
}

impl LogConfig {
    /// Map a `-v` count: 0 warn, 1 info, 2 debug, 3+ trace.
    ///
    /// Dependencies stay at warn until the trace level.
    pub fn from_verbosity(verbose: u8, json: bool) -> Self {
        let level = match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        let dependency_level = if verbose >= 3 {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        };
        Self {
            level,
            dependency_level,
            json,
        }
    }

    fn ceiling(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_TARGET) {
            self.level
        } else {
            self.dependency_level
        }
    }

    fn max_level(&self) -> LevelFilter {
        self.level.max(self.dependency_level)
    }

    #[cfg(feature = "tracing")]
    fn env_filter_directive(&self) -> String {
        format!("{},{OWN_TARGET}={}", self.dependency_level, self.level)
    }
}

/// `tapatan_vision_calib::orchestrator` -> `calib::orchestrator`,
/// `tapatan_vision::coords` -> `coords`.
fn short_target(target: &str) -> &str {
    target
        .strip_prefix(OWN_TARGET)
        .map(|rest| rest.trim_start_matches(['_', ':']))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(target)
}

fn render_line(elapsed_s: f64, level: Level, target: &str, args: fmt::Arguments<'_>) -> String {
    format!(
        "[{elapsed_s:8.3}s {level:>5} {}] {args}",
        short_target(target)
    )
}

struct StderrLogger {
    config: LogConfig,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.config.ceiling(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = render_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            *record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

fn install_stderr(config: LogConfig) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        config,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(config.max_level());
    Ok(())
}

/// Install the process logger described by `config`.
///
/// With the `tracing` feature this is a `tracing-subscriber` pipeline (which
/// honours `RUST_LOG` over `config`); otherwise the stderr logger, and a
/// JSON request is reported and ignored.
pub fn init_logging(config: LogConfig) {
    #[cfg(feature = "tracing")]
    init_tracing(&config);

    #[cfg(not(feature = "tracing"))]
    {
        let _ = install_stderr(config);
        if config.json {
            log::warn!("JSON logs need the `tracing` feature, using plain text");
        }
    }
}

/// Install a `tracing` subscriber that also reports span timings.
///
/// `RUST_LOG` wins over the ceilings in `config` when it is set.
#[cfg(feature = "tracing")]
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.env_filter_directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);
    if config.json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_own_crates_first() {
        let quiet = LogConfig::from_verbosity(0, false);
        assert_eq!(quiet, LogConfig::default());

        let debug = LogConfig::from_verbosity(2, false);
        assert_eq!(debug.ceiling("tapatan_vision_aruco::detector"), LevelFilter::Debug);
        assert_eq!(debug.ceiling("png::decoder"), LevelFilter::Warn);
        assert_eq!(debug.max_level(), LevelFilter::Debug);

        let trace = LogConfig::from_verbosity(5, true);
        assert_eq!(trace.level, LevelFilter::Trace);
        assert_eq!(trace.dependency_level, LevelFilter::Debug);
        assert!(trace.json);
    }

    #[test]
    fn lines_carry_elapsed_level_and_short_target() {
        let line = render_line(
            1.25,
            Level::Info,
            "tapatan_vision_calib::orchestrator",
            format_args!("calibrated, confidence {:.2}", 0.5),
        );
        assert_eq!(line, "[   1.250s  INFO calib::orchestrator] calibrated, confidence 0.50");

        assert_eq!(short_target("tapatan_vision"), "tapatan_vision");
        assert_eq!(short_target("tapatan_vision::coords"), "coords");
        assert_eq!(short_target("image::codecs"), "image::codecs");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn env_filter_directive_names_both_ceilings() {
        let cfg = LogConfig::from_verbosity(1, false);
        assert_eq!(cfg.env_filter_directive(), "WARN,tapatan_vision=INFO");
    }
}
