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

//! The emission boundary: format a record, send it, and swallow any failure.
//!
//! Logging must never crash, nor otherwise alter the control flow of, the application doing the
//! logging. [`Handler::emit`] therefore returns nothing: any error raised while formatting or
//! sending a record is handed to an error hook, and the record is dropped.

use crate::{
    error::{Error, Result},
    formatter::{Formatter, GelfFormatter},
    record::LogRecord,
    serializer::Gelf,
    transport::Transport,
};

type ErrorHook = Box<dyn Fn(&Error) + Send + Sync>;

/// Report `err` as a [`tracing`] event under this crate's own target (which our [`Layer`]
/// ignores, so a broken transport can't feed on its own error reports).
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
/// [`Layer`]: crate::layer::Layer
fn default_error_hook(err: &Error) {
    tracing::error!("failed to emit a GELF message: {}", err);
}

/// Pairs a [`Formatter`] with a [`Transport`].
pub struct Handler<F: Formatter, T: Transport> {
    formatter: F,
    transport: T,
    on_error: ErrorHook,
}

impl<T: Transport> Handler<GelfFormatter, T> {
    /// A [`Handler`] that formats records with the stock [`GelfFormatter`]
    pub fn with_transport(transport: T) -> Self {
        Handler::new(GelfFormatter::default(), transport)
    }
}

impl<F: Formatter, T: Transport> Handler<F, T> {
    pub fn new(formatter: F, transport: T) -> Self {
        Handler {
            formatter,
            transport,
            on_error: Box::new(default_error_hook),
        }
    }

    /// Replace the error hook; `hook` will be invoked once for each record that couldn't be sent
    pub fn with_error_handler<H>(mut self, hook: H) -> Self
    where
        H: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Box::new(hook);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Format one record to bytes
    pub fn format(&self, record: &LogRecord) -> Result<Gelf> {
        self.formatter.format(record)
    }

    /// Hand `err` to the error hook
    pub(crate) fn report(&self, err: &Error) {
        (self.on_error)(err);
    }

    /// Format & send one record; failures go to the error hook
    pub fn emit(&self, record: &LogRecord) {
        if let Err(err) = self
            .formatter
            .format(record)
            .and_then(|gelf| self.transport.send(&gelf))
        {
            self.report(&err);
        }
    }
}
