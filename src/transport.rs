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

//! The GELF transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, as well
//! as the TCP & UDP implementations. The AMQP implementation lives in [`amqp`](crate::amqp).
//!
//! # Examples
//!
//! To send GELF over UDP to a collector listening on port 12201 (the default) on localhost:
//!
//! ```rust
//! use tracing_gelf::transport::UdpTransport;
//! let transpo = UdpTransport::local().unwrap();
//! ```
//!
//! Uncompressed, with a larger MTU, on another host:
//!
//! ```rust
//! use tracing_gelf::transport::UdpTransport;
//! let transpo = UdpTransport::builder()
//!     .mtu(1420)
//!     .compressed(false)
//!     .build("some-host.domain.io:12201");
//! assert!(transpo.is_err()); // no such host, after all
//! ```

use crate::{
    chunk::{GelfChunker, DEFAULT_MTU},
    error::{Error, Result},
    serializer::Gelf,
};

use backtrace::Backtrace;
use flate2::{write::ZlibEncoder, Compression};
use tracing::trace;

use std::{
    io::Write,
    net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    sync::{Mutex, PoisonError},
};

/// The port Graylog's GELF inputs listen on by default
pub const DEFAULT_GELF_PORT: u16 = 12201;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all transport layers must support.
pub trait Transport {
    /// Deliver one serialized GELF document, or say why not.
    ///
    /// A failure affects this message only; the next call starts afresh.
    fn send(&self, msg: &Gelf) -> Result<()>;
    /// Targets (module paths) of events that must never be sent through this transport.
    ///
    /// A transport built on libraries that log through `tracing` (possibly from threads of their
    /// own, while a `send` is in progress) lists their crates here; the [`Layer`] drops their
    /// events rather than feeding them back in.
    ///
    /// [`Layer`]: crate::layer::Layer
    fn ignored_targets(&self) -> &[&'static str] {
        &[]
    }
}

/// True if `target` is `module` or lies beneath it
pub fn is_within(target: &str, module: &str) -> bool {
    target
        .strip_prefix(module)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

/// Sending GELF via TCP streams
///
/// Each message is terminated by a delimiter (a single NUL byte, by default); messages are never
/// chunked or compressed.
///
/// The connection is made at construction. If a write fails, the stream is dropped (along with
/// any partial message on it) and the next [`send`](Transport::send) connects again.
pub struct TcpTransport {
    addrs: Vec<SocketAddr>,
    socket: Mutex<Option<TcpStream>>,
    delimiter: Vec<u8>,
}

pub struct TcpTransportBuilder {
    delimiter: Vec<u8>,
}

impl TcpTransportBuilder {
    /// Terminate each message with `delimiter` rather than `\0`
    pub fn delimiter<B: Into<Vec<u8>>>(mut self, delimiter: B) -> Self {
        self.delimiter = delimiter.into();
        self
    }
    pub fn build<A: ToSocketAddrs>(self, addr: A) -> Result<TcpTransport> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(Error::transport)?
            .collect();
        let socket = TcpStream::connect(&addrs[..]).map_err(Error::transport)?;
        Ok(TcpTransport {
            addrs,
            socket: Mutex::new(Some(socket)),
            delimiter: self.delimiter,
        })
    }
}

impl TcpTransport {
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder {
            delimiter: vec![0],
        }
    }
    /// Construct a [`Transport`] implementation via TCP at `addr`.
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<TcpTransport> {
        TcpTransport::builder().build(addr)
    }
    /// Construct a [`Transport`] implementation via TCP at localhost:12201
    pub fn try_default() -> Result<TcpTransport> {
        TcpTransport::new(("localhost", DEFAULT_GELF_PORT))
    }
}

impl Transport for TcpTransport {
    fn send(&self, msg: &Gelf) -> Result<()> {
        let mut guard = self.socket.lock().unwrap_or_else(PoisonError::into_inner);
        let mut socket = match guard.take() {
            Some(socket) => socket,
            None => {
                trace!("Reconnecting to the GELF collector.");
                TcpStream::connect(&self.addrs[..]).map_err(Error::transport)?
            }
        };
        let mut buf = Vec::with_capacity(msg.len() + self.delimiter.len());
        buf.extend_from_slice(msg);
        buf.extend_from_slice(&self.delimiter);
        // On failure `socket` is dropped here, so we're disconnected until the next message.
        socket
            .write_all(&buf)
            .and_then(|_| socket.flush())
            .map_err(Error::transport)?;
        *guard = Some(socket);
        Ok(())
    }
}

/// Sending GELF via UDP datagrams
///
/// Payloads are zlib-compressed (unless configured otherwise); those that still won't fit in the
/// MTU are split into GELF chunks & sent one datagram per chunk.
pub struct UdpTransport {
    socket: UdpSocket,
    chunker: GelfChunker,
    compressed: bool,
}

pub struct UdpTransportBuilder {
    mtu: usize,
    compressed: bool,
}

impl UdpTransportBuilder {
    /// The largest datagram we'll send, in bytes
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }
    /// Whether to zlib-compress payloads before sizing them
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }
    pub fn build<A: ToSocketAddrs>(self, addr: A) -> Result<UdpTransport> {
        let chunker = GelfChunker::new(self.mtu)?;
        let peer = addr
            .to_socket_addrs()
            .map_err(Error::transport)?
            .next()
            .ok_or_else(|| Error::transport("address resolved to nothing"))?;
        // Bind to any available port on the wildcard address of the peer's family...
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => ([0u8; 4], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };
        let socket = UdpSocket::bind(local).map_err(Error::transport)?;
        // and connect to the collector:
        socket.connect(peer).map_err(Error::transport)?;
        Ok(UdpTransport {
            socket,
            chunker,
            compressed: self.compressed,
        })
    }
}

impl UdpTransport {
    pub fn builder() -> UdpTransportBuilder {
        UdpTransportBuilder {
            mtu: DEFAULT_MTU,
            compressed: true,
        }
    }
    /// Construct a [`Transport`] implementation via UDP at `addr`.
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<UdpTransport> {
        UdpTransport::builder().build(addr)
    }
    /// Construct a [`Transport`] implementation via UDP at localhost:12201
    pub fn local() -> Result<UdpTransport> {
        UdpTransport::new(("localhost", DEFAULT_GELF_PORT))
    }
    pub fn mtu(&self) -> usize {
        self.chunker.mtu()
    }
    fn send_datagram(&self, buf: &[u8]) -> Result<()> {
        self.socket.send(buf).map_err(Error::transport)?;
        Ok(())
    }
}

/// zlib-compress `buf`
pub fn compress(buf: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(buf.len() / 2), Compression::default());
    encoder
        .write_all(buf)
        .and_then(|_| encoder.finish())
        .map_err(|err| Error::Compression {
            source: err,
            back: Backtrace::new(),
        })
}

impl Transport for UdpTransport {
    fn send(&self, msg: &Gelf) -> Result<()> {
        let compressed;
        let body: &[u8] = if self.compressed {
            compressed = compress(msg)?;
            &compressed
        } else {
            msg
        };

        if body.len() <= self.chunker.mtu() {
            return self.send_datagram(body);
        }
        // No pacing, no acknowledgement: the chunks go out in order & the network does what it
        // will with them.
        for chunk in self.chunker.chunks(body)? {
            self.send_datagram(&chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::{
        chunk::{ChunkHeader, CHUNK_HEADER_LEN},
        formatter::{Formatter, GelfFormatter},
        gelf::Encoder,
        level::Severity,
        record::{LogRecord, Payload},
        serializer::Serializer,
    };

    use flate2::read::ZlibDecoder;
    use serde_json::{json, Value};

    use std::{io::Read, net::TcpListener, time::Duration};

    fn gelf(msg: &str) -> Gelf {
        GelfFormatter::new(Encoder::builder().hostname("bree.local").build(), Serializer)
            .format(&LogRecord::new(
                Severity::INFO,
                "transport",
                Payload::Message(msg.to_string()),
            ))
            .unwrap()
    }

    fn receiver() -> UdpSocket {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        sock
    }

    fn recv(sock: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 65536];
        let n = sock.recv(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    fn inflate(buf: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ZlibDecoder::new(buf).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn udp_single_datagram() {
        let rx = receiver();
        let tx = UdpTransport::new(rx.local_addr().unwrap()).unwrap();
        assert_eq!(tx.mtu(), 508);

        let msg = gelf("Hello, world!");
        tx.send(&msg).unwrap();

        let val: Value = serde_json::from_slice(&inflate(&recv(&rx))).unwrap();
        assert_eq!(val["short_message"], json!("Hello, world!"));
    }

    #[test]
    fn udp_uncompressed() {
        let rx = receiver();
        let tx = UdpTransport::builder()
            .compressed(false)
            .build(rx.local_addr().unwrap())
            .unwrap();

        let msg = gelf("Hello, 世界!");
        tx.send(&msg).unwrap();
        assert_eq!(recv(&rx), msg.to_vec());
    }

    #[test]
    fn udp_chunked() {
        let rx = receiver();
        let tx = UdpTransport::builder()
            .compressed(false)
            .mtu(128)
            .build(rx.local_addr().unwrap())
            .unwrap();

        let msg = gelf(&"x".repeat(1000));
        tx.send(&msg).unwrap();

        let total = (msg.len() + 115) / 116;
        let mut whole = Vec::new();
        let mut id = None;
        for i in 0..total {
            let chunk = recv(&rx);
            assert!(chunk.len() <= 128);
            let hdr = ChunkHeader::parse(&chunk).unwrap();
            assert_eq!(hdr.sequence as usize, i);
            assert_eq!(hdr.total as usize, total);
            assert_eq!(*id.get_or_insert(hdr.message_id), hdr.message_id);
            whole.extend_from_slice(&chunk[CHUNK_HEADER_LEN..]);
        }
        assert_eq!(whole, msg.to_vec());
    }

    #[test]
    fn udp_compressed_chunked() {
        let rx = receiver();
        let tx = UdpTransport::builder()
            .mtu(64)
            .build(rx.local_addr().unwrap())
            .unwrap();

        // Pseudo-random text so that it doesn't compress below the MTU
        let text: String = (0..2000u32)
            .map(|i| (b'a' + (i.wrapping_mul(2654435761) >> 27) as u8 % 26) as char)
            .collect();
        let msg = gelf(&text);
        tx.send(&msg).unwrap();

        let first = recv(&rx);
        let hdr = ChunkHeader::parse(&first).unwrap();
        let mut whole = first[CHUNK_HEADER_LEN..].to_vec();
        for _ in 1..hdr.total {
            whole.extend_from_slice(&recv(&rx)[CHUNK_HEADER_LEN..]);
        }
        assert_eq!(inflate(&whole), msg.to_vec());
    }

    #[test]
    fn udp_too_large() {
        let rx = receiver();
        let tx = UdpTransport::builder()
            .compressed(false)
            .mtu(13)
            .build(rx.local_addr().unwrap())
            .unwrap();
        match tx.send(&gelf("this will need far more than 127 one-byte chunks")) {
            Err(Error::PayloadTooLarge { .. }) => (),
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
        // ...and not one chunk went out.
        rx.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(
            rx.recv(&mut buf).unwrap_err().kind(),
            std::io::ErrorKind::WouldBlock
        );
    }

    #[test]
    fn tcp_delimited() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let tx = TcpTransport::new(addr).unwrap();
        let (mut conn, _) = listener.accept().unwrap();

        let first = gelf("one");
        let second = gelf("two");
        tx.send(&first).unwrap();
        tx.send(&second).unwrap();
        drop(tx);

        let mut buf = Vec::new();
        conn.read_to_end(&mut buf).unwrap();
        let mut expected = first.to_vec();
        expected.push(0);
        expected.extend_from_slice(&second);
        expected.push(0);
        assert_eq!(buf, expected);
    }

    #[test]
    fn tcp_custom_delimiter() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tx = TcpTransport::builder()
            .delimiter("\r\n")
            .build(listener.local_addr().unwrap())
            .unwrap();
        let (mut conn, _) = listener.accept().unwrap();

        tx.send(&gelf("crlf")).unwrap();
        drop(tx);

        let mut buf = Vec::new();
        conn.read_to_end(&mut buf).unwrap();
        assert!(buf.ends_with(b"}\r\n"));
    }

    #[test]
    fn tcp_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tx = TcpTransport::new(listener.local_addr().unwrap()).unwrap();
        let (conn, _) = listener.accept().unwrap();
        drop(conn);

        // The first write after the collector hangs up may well "succeed"; the failure shows up
        // once the reset has come back.
        let mut failed = false;
        for _ in 0..50 {
            if tx.send(&gelf("lost")).is_err() {
                failed = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(failed);

        // The collector is still listening, so the next message goes out on a fresh connection.
        let msg = gelf("found");
        tx.send(&msg).unwrap();
        let (mut conn, _) = listener.accept().unwrap();
        drop(tx);

        let mut buf = Vec::new();
        conn.read_to_end(&mut buf).unwrap();
        let mut expected = msg.to_vec();
        expected.push(0);
        assert_eq!(buf, expected);
    }

    #[test]
    fn within() {
        assert!(is_within("lapin", "lapin"));
        assert!(is_within("lapin::io_loop", "lapin"));
        assert!(!is_within("lapinou", "lapin"));
        assert!(!is_within("app::lapin", "lapin"));
    }

    #[test]
    fn tcp_refused() {
        // Grab a free port, then let it go so that nobody's listening
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        assert!(TcpTransport::new(addr).is_err());
    }
}
