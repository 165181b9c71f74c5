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

//! Chunked GELF: splitting one payload across several UDP datagrams.
//!
//! For the most part GELF is a near-trivial format, merely specifying which fields to put in a
//! JSON object. Chunking is the exception. A message too large for one datagram is split into at
//! most 127 chunks, each prefixed with a twelve-byte header:
//!
//! ```text
//!  0      2                              10   11   12
//!  +------+------------------------------+----+----+----------------
//!  | 1e0f | message id (8 bytes)         | n  | N  | payload slice n
//!  +------+------------------------------+----+----+----------------
//! ```
//!
//! where `n` is the zero-based index of this chunk & `N` the total number of chunks. The
//! receiver gathers chunks by message id and reassembles the payload once it has all `N`.
//!
//! See <https://go2docs.graylog.org/current/getting_in_log_data/gelf.html#chunking>.

use crate::{
    error::{Error, Result},
    gelf::local_hostname,
};

use backtrace::Backtrace;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};

/// Marks a datagram as a GELF chunk
pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];
/// Size of the header prefixed to each chunk
pub const CHUNK_HEADER_LEN: usize = 12;
/// The most chunks a single message may be split into
pub const MAX_CHUNKS: usize = 127;
/// Any UDP payload this size or smaller is guaranteed to be deliverable over IP (though not
/// guaranteed to be delivered). ~1200 would do for IPv6, but we can't assume that.
pub const DEFAULT_MTU: usize = 508;

/// Identifies the chunks belonging to one message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

impl MessageId {
    /// Generate a fresh message id.
    ///
    /// The id is a hash of the current time, the host name & a per-process sequence number.
    /// That's enough to keep concurrent messages from one process apart, and to make collisions
    /// between hosts unlikely; it is not a cryptographic guarantee.
    pub fn generate() -> MessageId {
        let mut hasher = DefaultHasher::new();
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
            .hash(&mut hasher);
        local_hostname().hash(&mut hasher);
        std::process::id().hash(&mut hasher);
        SEQUENCE.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
        MessageId(hasher.finish())
    }
}

/// The twelve bytes at the front of every chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub message_id: MessageId,
    /// Zero-based index of this chunk
    pub sequence: u8,
    /// Number of chunks in the message
    pub total: u8,
}

impl ChunkHeader {
    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_LEN] {
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        buf[..2].copy_from_slice(&CHUNK_MAGIC);
        buf[2..10].copy_from_slice(&self.message_id.0.to_be_bytes());
        buf[10] = self.sequence;
        buf[11] = self.total;
        buf
    }
    /// Read the header off the front of `chunk`, if it is one.
    pub fn parse(chunk: &[u8]) -> Option<ChunkHeader> {
        if chunk.len() < CHUNK_HEADER_LEN || chunk[..2] != CHUNK_MAGIC {
            return None;
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&chunk[2..10]);
        Some(ChunkHeader {
            message_id: MessageId(u64::from_be_bytes(id)),
            sequence: chunk[10],
            total: chunk[11],
        })
    }
}

/// Splits payloads into GELF chunks no larger than a given MTU.
#[derive(Copy, Clone, Debug)]
pub struct GelfChunker {
    mtu: usize,
}

impl std::default::Default for GelfChunker {
    fn default() -> Self {
        GelfChunker { mtu: DEFAULT_MTU }
    }
}

impl GelfChunker {
    /// `mtu` must leave room for the header and at least one byte of payload.
    pub fn new(mtu: usize) -> Result<GelfChunker> {
        if mtu <= CHUNK_HEADER_LEN {
            return Err(Error::BadMtu { mtu });
        }
        Ok(GelfChunker { mtu })
    }
    pub fn mtu(&self) -> usize {
        self.mtu
    }
    /// The number of payload bytes carried by each chunk (save perhaps the last)
    pub fn chunk_size(&self) -> usize {
        self.mtu - CHUNK_HEADER_LEN
    }
    /// The number of chunks a payload of `len` bytes would need
    pub fn chunk_count(&self, len: usize) -> usize {
        (len + self.chunk_size() - 1) / self.chunk_size()
    }
    /// Split `payload` into chunks under a freshly generated message id.
    ///
    /// Callers should only chunk payloads that won't fit in a single datagram; this will happily
    /// produce a one-chunk message otherwise.
    pub fn chunks<'a>(&self, payload: &'a [u8]) -> Result<Chunks<'a>> {
        self.chunks_with_id(payload, MessageId::generate())
    }
    /// Split `payload` into chunks under message id `message_id`.
    pub fn chunks_with_id<'a>(
        &self,
        payload: &'a [u8],
        message_id: MessageId,
    ) -> Result<Chunks<'a>> {
        let total = self.chunk_count(payload.len());
        if total > MAX_CHUNKS {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                chunks: total,
                back: Backtrace::new(),
            });
        }

        trace!(
            message_id = message_id.0,
            chunk_count = total,
            chunk_size = self.chunk_size(),
            "Generating chunks for GELF."
        );

        Ok(Chunks {
            payload,
            chunk_size: self.chunk_size(),
            message_id,
            sequence: 0,
            total: total as u8,
        })
    }
}

/// The chunks of one message, in order; each is ready to go out as a datagram.
pub struct Chunks<'a> {
    payload: &'a [u8],
    chunk_size: usize,
    message_id: MessageId,
    sequence: u8,
    total: u8,
}

impl<'a> Chunks<'a> {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.sequence >= self.total {
            return None;
        }
        let start = self.sequence as usize * self.chunk_size;
        let end = std::cmp::min(start + self.chunk_size, self.payload.len());
        let header = ChunkHeader {
            message_id: self.message_id,
            sequence: self.sequence,
            total: self.total,
        };

        let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + end - start);
        buf.put_slice(&header.to_bytes());
        buf.put_slice(&self.payload[start..end]);

        self.sequence += 1;
        Some(buf.freeze())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.sequence) as usize;
        (left, Some(left))
    }
}

impl<'a> ExactSizeIterator for Chunks<'a> {}
