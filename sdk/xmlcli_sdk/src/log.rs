//! Logging for the access layer
//!
//! Every crate in the workspace logs through the `log` facade with a per-component target (`xmlcli_access`,
//! `mailbox`, `handshake`). This module provides a [`Logger`] that renders records in one of the [`Format`]s and
//! hands the bytes to a [`LogSink`].
//!
//! ## Examples
//!
//! ```rust ignore
//! use xmlcli_sdk::log::{Format, Logger, Terminal};
//!
//! static FILTERS: [(&str, log::LevelFilter); 1] = [("handshake", log::LevelFilter::Debug)];
//!
//! xmlcli_sdk::log::init(Logger::new(Format::Standard, &FILTERS, log::LevelFilter::Info, Terminal))?;
//! ```
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::io::Write as _;

use crate::error::{AccessError, Result};

/// A destination for rendered log lines.
pub trait LogSink: Send + Sync {
    /// Writes a fully rendered log line.
    fn write(&self, buffer: &[u8]);
}

/// Writes log lines to the process standard output.
pub struct Terminal;

impl LogSink for Terminal {
    fn write(&self, buffer: &[u8]) {
        // Nothing sensible can be done when stdout is gone.
        let _ = std::io::stdout().write_all(buffer);
    }
}

/// Enum to describe the format of the log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Standard text format containing the log level and message.
    Standard,
    /// JSON blob containing the log level and message.
    Json,
    /// Verbose JSON blob containing the log level, message, target, and file path and line number.
    VerboseJson,
}

impl Format {
    /// Formats the log message and writes it to the target.
    pub fn write<T: core::fmt::Write>(&self, target: &mut T, record: &log::Record) -> core::fmt::Result {
        match self {
            Format::Standard if record.level() == log::Level::Trace => writeln!(
                target,
                "TRACE - {}:{}: {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            ),
            Format::Standard => writeln!(target, "{} - {}", record.level(), record.args()),
            Format::Json => {
                writeln!(target, "{{\"level\": \"{}\", \"message\": \"{}\"}}", record.level(), record.args())
            }
            Format::VerboseJson => writeln!(
                target,
                "{{\"level\": \"{}\", \"target\": \"{}\", \"message\": \"{}\", \"file\": \"{}\", \"line\": \"{}\"}}",
                record.level(),
                record.target(),
                record.args(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0)
            ),
        }
    }
}

/// A `log` implementation writing to a [`LogSink`].
///
/// Records are filtered by the first entry of `target_filters` whose name prefixes the record target, falling
/// back to `max_level`.
pub struct Logger<'a, S>
where
    S: LogSink,
{
    sink: S,
    target_filters: &'a [(&'a str, log::LevelFilter)],
    max_level: log::LevelFilter,
    format: Format,
}

impl<'a, S> Logger<'a, S>
where
    S: LogSink,
{
    pub const fn new(
        format: Format,
        target_filters: &'a [(&'a str, log::LevelFilter)],
        max_level: log::LevelFilter,
        sink: S,
    ) -> Self {
        Self { sink, target_filters, max_level, format }
    }

    /// The most verbose level any target of this logger can emit.
    fn ceiling(&self) -> log::LevelFilter {
        self.target_filters.iter().map(|(_, level)| *level).fold(self.max_level, core::cmp::max)
    }
}

impl<S> log::Log for Logger<'_, S>
where
    S: LogSink,
{
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level().to_level_filter()
            <= self
                .target_filters
                .iter()
                .find(|(name, _)| metadata.target().starts_with(name))
                .map(|(_, level)| *level)
                .unwrap_or(self.max_level)
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let mut line = String::new();
            if self.format.write(&mut line, record).is_ok() {
                self.sink.write(line.as_bytes());
            }
        }
    }

    fn flush(&self) {}
}

/// Installs `logger` as the process-wide `log` implementation.
///
/// Fails with [`AccessError::Configuration`] when a logger was already installed.
pub fn init<S>(logger: Logger<'static, S>) -> Result<()>
where
    S: LogSink + 'static,
{
    let ceiling = logger.ceiling();
    let logger: &'static Logger<'static, S> = Box::leak(Box::new(logger));
    log::set_logger(logger).map_err(|err| AccessError::Configuration(err.to_string()))?;
    log::set_max_level(ceiling);
    Ok(())
}
