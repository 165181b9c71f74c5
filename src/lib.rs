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
//! A [`tracing-subscriber`] [`Layer`] implementation for sending [`tracing`] [`Event`]s to
//! [Graylog] as [GELF]
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html
//! [Graylog]: https://graylog.org
//! [GELF]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html
//!
//! # Introduction
//!
//! GELF, the Graylog Extended Log Format, is a structured log format: each message is a flat JSON
//! object with a few well-known keys (`host`, `short_message`, `timestamp`, `level`) plus any
//! number of additional fields, whose names begin with an underscore. Graylog accepts GELF over
//! TCP (each message terminated by a NUL byte), over UDP (optionally compressed, and split into
//! "chunks" when too large for one datagram), and from AMQP exchanges.
//!
//! This crate turns [`tracing`] events into GELF in three steps:
//!
//! 1. the event becomes a [`LogRecord`] (see [`tracing`](crate::tracing))
//!
//! 2. the record is encoded as a [`GelfDocument`] & serialized to ASCII-clean JSON
//!    (see [`Formatter`])
//!
//! 3. the result is handed to a [`Transport`]: [`TcpTransport`], [`UdpTransport`] or
//!    [`AmqpTransport`]
//!
//! Failures at any step are reported to an error hook & the event is dropped; logging never
//! fails the caller, and nothing is retried.
//!
//! [`LogRecord`]: crate::record::LogRecord
//! [`GelfDocument`]: crate::gelf::GelfDocument
//! [`Formatter`]: crate::formatter::Formatter
//! [`Transport`]: crate::transport::Transport
//! [`TcpTransport`]: crate::transport::TcpTransport
//! [`UdpTransport`]: crate::transport::UdpTransport
//! [`AmqpTransport`]: crate::amqp::AmqpTransport
//!
//! # Usage
//!
//! [`tracing-gelf`](crate)'s [`Layer`] comes with sane defaults:
//!
//! ```rust
//! use tracing::info;
//! use tracing_gelf::{formatter::GelfFormatter, layer::Layer, tracing::DefaultTracingFormatter,
//!                    transport::UdpTransport};
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! // The default configuration is to send compressed GELF via UDP to port 12201 on the
//! // localhost, chunking anything larger than 508 bytes.
//! let subscriber = Registry::default()
//!     .with(Layer::<Registry, GelfFormatter, DefaultTracingFormatter, UdpTransport>::try_default().unwrap());
//!
//! info!("Hello, world!");
//! ```
//!
//! Structured fields become GELF additional fields:
//!
//! ```no_run
//! use tracing::info;
//! use tracing_gelf::layer::Layer;
//! use tracing_gelf::transport::TcpTransport;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let subscriber = Registry::default().with(Layer::with_transport(
//!     TcpTransport::new("graylog.local:12201").unwrap()));
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! // {"version":"1.1", ..., "short_message":"started","_pid":42}
//! info!(pid = 42, "started");
//! ```
//!
//! Records needn't come from [`tracing`]: build a [`LogRecord`] & hand it to a
//! [`Handler`](crate::handler::Handler).

pub mod amqp;
pub mod chunk;
pub mod error;
pub mod formatter;
pub mod gelf;
pub mod handler;
pub mod layer;
pub mod level;
pub mod record;
pub mod serializer;
pub mod tracing;
pub mod transport;
