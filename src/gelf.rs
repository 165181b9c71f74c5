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

//! GELF documents, and the encoder that produces them from [`LogRecord`]s.
//!
//! A GELF 1.1 message is a flat JSON object. A handful of keys are fixed (`version`, `host`,
//! `short_message`, `timestamp`, `level`); anything else the sender cares to add must begin with
//! an underscore. We add a few fixed keys of our own describing the call site, process & thread.
//! Strictly speaking they ought to carry the underscore, too, but leaving it off guarantees they
//! can never collide with user-supplied fields, which always get one.
//!
//! See <https://go2docs.graylog.org/current/getting_in_log_data/gelf.html>.

use crate::{
    error::{Error, Result},
    record::{LogRecord, Payload},
};

use backtrace::Backtrace;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// The only GELF version we speak
pub const GELF_VERSION: &str = "1.1";

/// The structured field that supplies `short_message`, by default
pub const DEFAULT_SUMMARY_FIELD: &str = "event";

/// The extension field naming the originating logger for plain-text records
pub const LOGGER_FIELD: &str = "_logger";

/// One GELF message, ready for serialization.
///
/// Built once per log event by [`Encoder::encode`], serialized, then dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct GelfDocument {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub host: String,
    /// The syslog level (0-7)
    pub level: u8,
    /// The record's severity name ("INFO", "ERROR", ...)
    pub severity: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub process: u32,
    pub process_name: String,
    pub thread: u64,
    pub thread_name: String,
    pub exception: Option<String>,
    pub short_message: String,
    extensions: Vec<(String, Value)>,
}

impl GelfDocument {
    /// The user-supplied fields, with their leading underscores, in insertion order
    pub fn extensions(&self) -> &[(String, Value)] {
        &self.extensions
    }
    /// Look-up an extension field; `name` must include the leading underscore
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extensions
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, val)| val)
    }
    /// Add (or replace) an extension field; an underscore is prepended to `name`
    pub fn add_extension(&mut self, name: &str, value: Value) {
        let key = format!("_{}", name);
        match self.extensions.iter_mut().find(|(k, _)| *k == key) {
            Some((_, val)) => *val = value,
            None => self.extensions.push((key, value)),
        }
    }
}

impl Serialize for GelfDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("version", GELF_VERSION)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("host", &self.host)?;
        map.serialize_entry("level", &self.level)?;
        map.serialize_entry("severity", &self.severity)?;
        map.serialize_entry("file", &self.file)?;
        map.serialize_entry("line", &self.line)?;
        map.serialize_entry("function", &self.function)?;
        map.serialize_entry("process", &self.process)?;
        map.serialize_entry("process_name", &self.process_name)?;
        map.serialize_entry("thread", &self.thread)?;
        map.serialize_entry("thread_name", &self.thread_name)?;
        if let Some(exception) = &self.exception {
            map.serialize_entry("exception", exception)?;
        }
        map.serialize_entry("short_message", &self.short_message)?;
        for (key, value) in &self.extensions {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Resolve the local host name.
///
/// We try [gethostname()] first, then fall back to the local IP address, and finally to
/// "localhost". This is evaluated on every call; the host name can change over the lifetime of a
/// long-running process.
///
/// [gethostname()]: https://man7.org/linux/man-pages/man2/gethostname.2.html
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|hn| hn.into_string().ok())
        .filter(|hn| !hn.is_empty())
        .or_else(|| local_ip_address::local_ip().ok().map(|ip| ip.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Turns [`LogRecord`]s into [`GelfDocument`]s.
///
/// Encoding is a pure function of the record, save for the host name, which is looked-up at
/// encode time unless one was fixed via [`EncoderBuilder::hostname`].
#[derive(Clone, Debug)]
pub struct Encoder {
    summary_field: String,
    hostname: Option<String>,
}

impl std::default::Default for Encoder {
    fn default() -> Self {
        Encoder {
            summary_field: DEFAULT_SUMMARY_FIELD.to_string(),
            hostname: None,
        }
    }
}

pub struct EncoderBuilder {
    imp: Encoder,
}

impl EncoderBuilder {
    /// Name the structured field that supplies `short_message`
    pub fn summary_field<S: Into<String>>(mut self, name: S) -> Self {
        self.imp.summary_field = name.into();
        self
    }
    /// Report `hostname` rather than resolving the local host name on each encode
    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.imp.hostname = Some(hostname.into());
        self
    }
    pub fn build(self) -> Encoder {
        self.imp
    }
}

impl Encoder {
    pub fn builder() -> EncoderBuilder {
        EncoderBuilder {
            imp: Encoder::default(),
        }
    }

    pub fn summary_field(&self) -> &str {
        &self.summary_field
    }

    pub fn encode(&self, record: &LogRecord) -> Result<GelfDocument> {
        let (short_message, extensions) = match &record.payload {
            Payload::Message(msg) => (
                msg.clone(),
                vec![(LOGGER_FIELD.to_string(), Value::String(record.logger.clone()))],
            ),
            Payload::Structured(fields) => {
                let summary = fields
                    .iter()
                    .find(|(name, _)| *name == self.summary_field)
                    .map(|(_, val)| val)
                    .ok_or_else(|| Error::NoSummaryField {
                        field: self.summary_field.clone(),
                        back: Backtrace::new(),
                    })?;
                let short_message = match summary {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let mut doc_fields: Vec<(String, Value)> = Vec::with_capacity(fields.len());
                for (name, val) in fields.iter().filter(|(name, _)| *name != self.summary_field)
                {
                    let key = format!("_{}", name);
                    // A later field of the same name wins.
                    match doc_fields.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, v)) => *v = val.clone(),
                        None => doc_fields.push((key, val.clone())),
                    }
                }
                (short_message, doc_fields)
            }
        };

        Ok(GelfDocument {
            timestamp: record.timestamp.timestamp() as f64
                + record.timestamp.timestamp_subsec_micros() as f64 / 1_000_000.0,
            host: self.hostname.clone().unwrap_or_else(local_hostname),
            level: record.severity.as_syslog_level() as u8,
            severity: record.severity.name(),
            file: record.file.clone(),
            line: record.line,
            function: record.function.clone(),
            process: record.process,
            process_name: record.process_name.clone(),
            thread: record.thread,
            thread_name: record.thread_name.clone(),
            exception: record.exception.clone(),
            short_message,
            extensions,
        })
    }
}
