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
//! [tracing-gelf](crate) errors

use backtrace::Backtrace;

/// [tracing-gelf](crate) error type
///
/// [tracing-gelf](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of
/// a straightforward enumeration with a few match arms chosen on the basis what the caller will
/// need to repond.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A structured record lacked the field that supplies `short_message`
    NoSummaryField {
        field: String,
        back: Backtrace,
    },
    /// A GELF document couldn't be rendered to JSON
    Serialization {
        source: serde_json::Error,
        back: Backtrace,
    },
    /// The (possibly compressed) payload would need more than 127 chunks
    PayloadTooLarge {
        size: usize,
        chunks: usize,
        back: Backtrace,
    },
    /// An MTU too small to carry a chunk header plus at least one byte of payload
    BadMtu {
        mtu: usize,
    },
    /// zlib compression failed
    Compression {
        source: std::io::Error,
        back: Backtrace,
    },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl Error {
    /// Wrap any error coming out of a socket or message-queue client
    pub fn transport<E>(err: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Error::Transport {
            source: err.into(),
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NoSummaryField { field, .. } => write!(
                f,
                "Structured record had no '{}' field, and so could not be formatted as GELF",
                field
            ),
            Error::Serialization { source, .. } => {
                write!(f, "While serializing a GELF document, got {}", source)
            }
            Error::PayloadTooLarge { size, chunks, .. } => write!(
                f,
                "A {}-byte GELF payload would need {} chunks; at most 127 are allowed",
                size, chunks
            ),
            Error::BadMtu { mtu } => write!(
                f,
                "An MTU of {} bytes leaves no room for a chunk after its 12-byte header",
                mtu
            ),
            Error::Compression { source, .. } => {
                write!(f, "While compressing a GELF payload, got {}", source)
            }
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            _ => write!(f, "Other tracing-gelf error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NoSummaryField { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Serialization { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::PayloadTooLarge { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadMtu { .. } => write!(f, "{}", self),
            Error::Compression { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "tracing-gelf error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization { source, .. } => Some(source),
            Error::Compression { source, .. } => Some(source),
            Error::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
