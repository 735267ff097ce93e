//! Colored stderr logging behind the `log` facade.
//!
//! Severities are `abort > error > warn > info`. Aborts are logged with
//! `target: ABORT_TARGET` at error level; the verbosity threshold hides
//! everything below it.

use crate::cli::Verbosity;
use std::io::Write;
use std::sync::OnceLock;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Log target that marks a record as an abort
pub const ABORT_TARGET: &str = "abort";

const PREFIX: &str = env!("CARGO_PKG_NAME");

struct ConvertLogger {
    threshold: Verbosity,
}

impl ConvertLogger {
    fn severity(metadata: &log::Metadata) -> Verbosity {
        if metadata.target() == ABORT_TARGET {
            return Verbosity::Abort;
        }
        match metadata.level() {
            log::Level::Error => Verbosity::Error,
            log::Level::Warn => Verbosity::Warn,
            log::Level::Info | log::Level::Debug | log::Level::Trace => Verbosity::Info,
        }
    }

    fn label(severity: Verbosity) -> (&'static str, Color) {
        match severity {
            Verbosity::Abort => ("ABRT", Color::Magenta),
            Verbosity::Error => ("ERR", Color::Red),
            Verbosity::Warn => ("WRN", Color::Yellow),
            Verbosity::Info | Verbosity::None => ("INFO", Color::Cyan),
        }
    }
}

impl log::Log for ConvertLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.threshold != Verbosity::None && Self::severity(metadata) <= self.threshold
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let (label, color) = Self::label(Self::severity(record.metadata()));
        let mut stderr = StandardStream::stderr(ColorChoice::Auto);
        // A failing stderr has nowhere to report to
        let _ = stderr.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(stderr, "{PREFIX} ({label}):");
        let _ = stderr.reset();
        let _ = writeln!(stderr, " {}", record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<ConvertLogger> = OnceLock::new();

fn level_filter(verbosity: Verbosity) -> log::LevelFilter {
    match verbosity {
        Verbosity::None => log::LevelFilter::Off,
        Verbosity::Abort | Verbosity::Error => log::LevelFilter::Error,
        Verbosity::Warn => log::LevelFilter::Warn,
        Verbosity::Info => log::LevelFilter::Info,
    }
}

/// Install the logger; only the first call has an effect
pub fn init(verbosity: Verbosity) -> Result<(), log::SetLoggerError> {
    let logger = LOGGER.get_or_init(|| ConvertLogger {
        threshold: verbosity,
    });
    log::set_logger(logger).map(|()| log::set_max_level(level_filter(logger.threshold)))
}
