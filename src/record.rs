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

//! The log record: everything we know about one log event before it becomes GELF.
//!
//! [`LogRecord`] is deliberately independent of [`tracing`]; the [`Layer`] builds them from
//! [`Event`]s, but any other logging system can populate one & hand it to a [`Handler`].
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Layer`]: crate::layer::Layer
//! [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html
//! [`Handler`]: crate::handler::Handler

use crate::level::Severity;

use chrono::prelude::*;
use serde::Serialize;
use serde_json::Value;

/// The message carried by a [`LogRecord`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A plain, human-readable message
    Message(String),
    /// Named fields, in the order they were recorded; one of them (the "summary" field) supplies
    /// the GELF `short_message`
    Structured(Vec<(String, Value)>),
}

/// One log event.
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// The name of the logger (the [`tracing`] target) that produced this record
    ///
    /// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
    pub logger: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub process: u32,
    pub process_name: String,
    pub thread: u64,
    pub thread_name: String,
    pub payload: Payload,
    /// A rendered failure description, if this record is reporting one
    pub exception: Option<String>,
}

impl LogRecord {
    /// Construct a record stamped with the current time, process & thread.
    pub fn new<S: Into<String>>(severity: Severity, logger: S, payload: Payload) -> LogRecord {
        let thread = std::thread::current();
        LogRecord {
            severity,
            timestamp: Utc::now(),
            logger: logger.into(),
            file: None,
            line: None,
            function: None,
            process: std::process::id(),
            process_name: process_name(),
            thread: thread_id(&thread),
            thread_name: thread.name().unwrap_or("unnamed").to_string(),
            payload,
            exception: None,
        }
    }
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> LogRecord {
        self.timestamp = timestamp;
        self
    }
    pub fn with_call_site(
        mut self,
        file: Option<&str>,
        line: Option<u32>,
        function: Option<&str>,
    ) -> LogRecord {
        self.file = file.map(String::from);
        self.line = line;
        self.function = function.map(String::from);
        self
    }
    pub fn with_exception<S: Into<String>>(mut self, exception: S) -> LogRecord {
        self.exception = Some(exception.into());
        self
    }
}

/// Convert `value` to a JSON value, falling back to its [`Debug`] representation for anything
/// JSON can't express (non-finite floats, maps with non-string keys, failing [`Serialize`]
/// implementations & so on).
pub fn field_value<T: Serialize + std::fmt::Debug + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        // serde_json quietly turns NaN & the infinities into null
        Ok(Value::Null) => {
            let text = format!("{:?}", value);
            if text == "()" || text == "None" {
                Value::Null
            } else {
                Value::String(text)
            }
        }
        Ok(val) => val,
        Err(_) => Value::String(format!("{:?}", value)),
    }
}

/// The file name of the current executable, or "-" if that can't be had.
fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|pbuf| {
            pbuf.file_name()
                .map(|os_str| os_str.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "-".to_string())
}

/// `ThreadId::as_u64()` is still unstable, but the `Debug` format ("ThreadId(N)") is not.
fn thread_id(thread: &std::thread::Thread) -> u64 {
    format!("{:?}", thread.id())
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn new_record() {
        let rec = LogRecord::new(Severity::INFO, "test", Payload::Message("hello".to_string()))
            .with_call_site(Some("src/record.rs"), Some(12), Some("new_record"))
            .with_timestamp(std::time::UNIX_EPOCH.into());

        assert_eq!(rec.process, std::process::id());
        assert!(rec.thread > 0);
        assert_eq!(rec.file.as_deref(), Some("src/record.rs"));
        assert_eq!(rec.line, Some(12));
        assert_eq!(rec.timestamp.timestamp(), 0);
        assert!(rec.exception.is_none());
    }

    #[test]
    fn textual_fallback() {
        assert_eq!(field_value(&42), serde_json::json!(42));
        assert_eq!(field_value("x"), serde_json::json!("x"));
        assert_eq!(field_value(&f64::NAN), serde_json::json!("NaN"));
        assert_eq!(field_value(&f64::INFINITY), serde_json::json!("inf"));
        assert_eq!(field_value(&Option::<u8>::None), Value::Null);

        let mut map = std::collections::BTreeMap::new();
        map.insert((1, 2), "a");
        assert_eq!(field_value(&map), serde_json::json!("{(1, 2): \"a\"}"));
    }
}
