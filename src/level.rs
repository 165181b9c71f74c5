// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of tracing-gelf.
//
// tracing-gelf is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// tracing-gelf is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with tracing-gelf.  If
// not, see <http://www.gnu.org/licenses/>.

//! Record severities & their syslog equivalents.
//!
//! Log records carry an ordinal [`Severity`]: a plain integer where bigger means "more severe",
//! with named points at the familiar levels. GELF, however, speaks syslog: its `level` field is
//! one of the eight severities defined in `<syslog.h>`, modelled here by [`Level`]. The mapping
//! from the former to the latter is a step function over four buckets (see
//! [`Severity::as_syslog_level`]).

type StdResult<T, E> = std::result::Result<T, E>;

/// The ordinal severity of a log record.
///
/// The named constants leave gaps between them so that callers bridging from other logging
/// systems can slot in levels of their own; any `u8` is a legal severity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Severity(pub u8);

impl Severity {
    pub const TRACE: Severity = Severity(5);
    pub const DEBUG: Severity = Severity(10);
    pub const INFO: Severity = Severity(20);
    pub const WARNING: Severity = Severity(30);
    pub const ERROR: Severity = Severity(40);
    pub const CRITICAL: Severity = Severity(50);

    /// The upper-case name of this severity, as sent in the GELF `severity` field
    pub fn name(&self) -> String {
        match *self {
            Severity::TRACE => "TRACE".to_string(),
            Severity::DEBUG => "DEBUG".to_string(),
            Severity::INFO => "INFO".to_string(),
            Severity::WARNING => "WARNING".to_string(),
            Severity::ERROR => "ERROR".to_string(),
            Severity::CRITICAL => "CRITICAL".to_string(),
            Severity(n) => format!("Level {}", n),
        }
    }

    /// Map this severity onto the syslog scale.
    ///
    /// Only four syslog levels are ever produced: anything at or above [`Severity::CRITICAL`] is
    /// [`Level::LOG_CRIT`], at or above [`Severity::ERROR`] is [`Level::LOG_ERR`], at or above
    /// [`Severity::INFO`] is [`Level::LOG_INFO`] and everything else is [`Level::LOG_DEBUG`]. In
    /// particular, warnings are reported as informational.
    pub fn as_syslog_level(&self) -> Level {
        if *self >= Severity::CRITICAL {
            Level::LOG_CRIT
        } else if *self >= Severity::ERROR {
            Level::LOG_ERR
        } else if *self >= Severity::INFO {
            Level::LOG_INFO
        } else {
            Level::LOG_DEBUG
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "{}", self.name())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Severity::TRACE,
            tracing::Level::DEBUG => Severity::DEBUG,
            tracing::Level::INFO => Severity::INFO,
            tracing::Level::WARN => Severity::WARNING,
            tracing::Level::ERROR => Severity::ERROR,
        }
    }
}

/// RFCs [5424] & [3164] define eight severity levels for messages, and GELF borrows them for its
/// `level` field. The enumeration values duplicate the constants documented as per the `syslog()`
/// manual [page] & defined in `<syslog.h>`.
///
/// [5424]: https://datatracker.ietf.org/doc/html/rfc5424
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    /// system is unusable
    LOG_EMERG,
    /// action must be take immediately
    LOG_ALERT,
    /// critical conditions
    LOG_CRIT,
    /// error conditions
    LOG_ERR,
    /// warning conditions
    LOG_WARNING,
    /// normal, but significant condition
    LOG_NOTICE,
    /// informational message
    LOG_INFO,
    /// debug-level message
    LOG_DEBUG,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::LOG_EMERG => "LOG_EMERG",
                Level::LOG_ALERT => "LOG_ALERT",
                Level::LOG_CRIT => "LOG_CRIT",
                Level::LOG_ERR => "LOG_ERR",
                Level::LOG_WARNING => "LOG_WARNING",
                Level::LOG_NOTICE => "LOG_NOTICE",
                Level::LOG_INFO => "LOG_INFO",
                Level::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}
