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

//! Primitives for mapping [`tracing`] entities to [`LogRecord`]s.
//!
//! [`TracingFormatter`] implementations decide whether a [`tracing`] [`Event`] becomes a log
//! record and, if so, what it holds. This module provides one implementation,
//! [`DefaultTracingFormatter`].
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html

use crate::{
    error::Result,
    gelf::DEFAULT_SUMMARY_FIELD,
    level::Severity,
    record::{field_value, LogRecord, Payload},
};

use serde_json::Value;

// When the tracing-log feature is enabled, use NormalizeEvent to extract file/line metadata
// from events that originated from the `log` crate. This follows the same pattern used by
// tracing-subscriber's fmt layer.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Build [`LogRecord`]s from [`tracing`] [`Event`]s.
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
/// [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html
///
/// The translation from [`tracing`] events to GELF occurs in three parts:
///
/// 1. building a [`LogRecord`] from the event
///
/// 2. formatting that record as a serialized GELF document
///
/// 3. transporting that document to Graylog
///
/// Trait [`TracingFormatter`] formally defines step 1. Returning `Ok(None)` means "this event
/// shouldn't be logged".
pub trait TracingFormatter<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(
        &self,
        event: &tracing::Event,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> Result<Option<LogRecord>>;
}

/// The stock [`TracingFormatter`].
///
/// An event carrying nothing but a message (`info!("hello")`) becomes a plain-text record. An
/// event with other fields (`info!(pid = 42, "started")`) becomes a structured record, with the
/// message stored under the summary field (`"event"`, by default) unless the event names that
/// field itself (`info!(event = "started", pid = 42)`). A field recorded as a `dyn Error` becomes
/// the record's exception, rendered along with its chain of sources.
///
/// An event with fields but neither a message nor the summary field (`info!(pid = 42)`) has
/// nothing to put in `short_message`: it becomes a structured record that will fail to encode
/// (with [`Error::NoSummaryField`](crate::error::Error::NoSummaryField)), & so is reported to the
/// error hook & dropped.
pub struct DefaultTracingFormatter {
    summary_field: String,
}

impl std::default::Default for DefaultTracingFormatter {
    fn default() -> Self {
        DefaultTracingFormatter {
            summary_field: DEFAULT_SUMMARY_FIELD.to_string(),
        }
    }
}

impl DefaultTracingFormatter {
    /// `name` should match the summary field of the [`Encoder`](crate::gelf::Encoder) in use
    pub fn with_summary_field<S: Into<String>>(name: S) -> Self {
        DefaultTracingFormatter {
            summary_field: name.into(),
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, Value)>,
    exception: Option<String>,
}

impl FieldVisitor {
    fn push(&mut self, field: &tracing::field::Field, value: Value) {
        // Events bridged from the `log` crate carry their call site in `log.*` fields; that
        // information is already in the (normalized) metadata.
        if !field.name().starts_with("log.") {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.push(field, field_value(&value));
    }
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.push(field, Value::from(value));
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.push(field, Value::from(value));
    }
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.push(field, Value::from(value));
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push(field, Value::from(value));
        }
    }
    fn record_error(
        &mut self,
        _field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        let mut text = value.to_string();
        let mut source = value.source();
        while let Some(err) = source {
            text.push_str(": ");
            text.push_str(&err.to_string());
            source = err.source();
        }
        self.exception = Some(text);
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // The tracing macros "pre-format" the `message` field so that `value` refers to a
            // `std::fmt::Arguments` instance, which prints without enclosing double-quotes.
            self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, Value::String(format!("{:?}", value)));
        }
    }
}

impl<S> TracingFormatter<S> for DefaultTracingFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(
        &self,
        event: &tracing::Event,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> Result<Option<LogRecord>> {
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        Ok(Some(self.build_record(meta, visitor)))
    }
}

impl DefaultTracingFormatter {
    fn build_record(&self, meta: &tracing::Metadata<'_>, visitor: FieldVisitor) -> LogRecord {
        let FieldVisitor {
            message,
            mut fields,
            exception,
        } = visitor;

        let payload = if fields.is_empty() {
            Payload::Message(message.unwrap_or_default())
        } else {
            if let Some(message) = message {
                let name = if fields.iter().any(|(name, _)| *name == self.summary_field) {
                    "message".to_string()
                } else {
                    self.summary_field.clone()
                };
                fields.insert(0, (name, Value::String(message)));
            }
            Payload::Structured(fields)
        };

        let record = LogRecord::new(Severity::from(meta.level()), meta.target(), payload)
            .with_call_site(meta.file(), meta.line(), meta.module_path());
        match exception {
            Some(text) => record.with_exception(text),
            None => record,
        }
    }
}
