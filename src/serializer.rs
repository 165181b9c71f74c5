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

//! Rendering [`GelfDocument`]s to bytes.
//!
//! GELF is JSON, and JSON is UTF-8, but some of the paths a GELF message takes on its way to
//! Graylog are only 7-bit clean. [`Serializer`] therefore escapes every non-ASCII character
//! (`"世界"` goes out as `"\u4e16\u754c"`); the JSON is otherwise compact.

use crate::{
    error::{Error, Result},
    gelf::GelfDocument,
};

use backtrace::Backtrace;
use serde::Serialize;

use std::{
    io::{self, Write},
    ops::Deref,
};

/// One serialized GELF document: compact, ASCII-only JSON.
///
/// Only a [`Serializer`] can make one of these, so a [`Transport`] can't be handed anything
/// other than a serialized GELF document.
///
/// [`Transport`]: crate::transport::Transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gelf(Vec<u8>);

impl Gelf {
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Gelf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Gelf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A [`serde_json`] formatter that writes compact JSON, escaping all non-ASCII text.
#[derive(Clone, Copy, Debug, Default)]
struct AsciiFormatter;

impl serde_json::ser::Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                // Anything outside the BMP becomes a surrogate pair.
                for unit in c.encode_utf16(&mut units).iter() {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serializes [`GelfDocument`]s to ASCII-clean JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct Serializer;

impl Serializer {
    pub fn serialize(&self, doc: &GelfDocument) -> Result<Gelf> {
        let mut buf = Vec::with_capacity(512);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiFormatter);
        doc.serialize(&mut ser).map_err(|err| Error::Serialization {
            source: err,
            back: Backtrace::new(),
        })?;
        Ok(Gelf(buf))
    }
}
