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

//! GELF formatting primitives.
//!
//! This module defines the [`Formatter`] trait & its stock implementation, [`GelfFormatter`].

use crate::{
    error::Result,
    gelf::Encoder,
    record::LogRecord,
    serializer::{Gelf, Serializer},
};

/// Operations all formatters must support
/// ======================================
///
/// # Introduction
///
/// The translation from log records to bytes on the wire occurs in three parts:
///
/// 1. building a [`LogRecord`] from whatever the logging system hands us (a [`tracing`] event,
///    say)
///
/// 2. formatting that record as a serialized GELF document
///
/// 3. transporting that document to Graylog
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
///
/// [`Formatter`] implements step 2 in this process.
///
/// # Design
///
/// The return type is [`Gelf`] rather than a `Vec<u8>` because [`Transport`]s accept nothing
/// else: whatever is handed to a transport must have come out of a formatter.
///
/// [`Transport`]: crate::transport::Transport
pub trait Formatter {
    fn format(&self, record: &LogRecord) -> Result<Gelf>;
}

/// The stock [`Formatter`]: an [`Encoder`] paired with a [`Serializer`].
#[derive(Clone, Debug, Default)]
pub struct GelfFormatter {
    encoder: Encoder,
    serializer: Serializer,
}

impl GelfFormatter {
    pub fn new(encoder: Encoder, serializer: Serializer) -> GelfFormatter {
        GelfFormatter {
            encoder,
            serializer,
        }
    }
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }
}

impl Formatter for GelfFormatter {
    fn format(&self, record: &LogRecord) -> Result<Gelf> {
        self.serializer.serialize(&self.encoder.encode(record)?)
    }
}
