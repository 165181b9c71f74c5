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

//! Sending GELF over AMQP.
//!
//! Graylog can consume GELF from an AMQP exchange. The wrinkle is connection management: a
//! logger may sit idle for hours, and the broker may go away & come back in the meantime. We
//! handle that as simply as possible. The channel is opened lazily, on the first message. Any
//! failure while publishing tears it down, and the next message opens it again. There's no
//! backoff & no retry: a message that fails is reported & lost.
//!
//! The message-queue client itself is abstracted behind the [`Broker`] & [`BrokerChannel`]
//! traits; with the `amqp` feature enabled, [`LapinBroker`] implements them on top of [lapin].
//!
//! [lapin]: https://docs.rs/lapin

use crate::{error::Result, serializer::Gelf, transport::Transport};

use tracing::{debug, trace};

use std::sync::{Mutex, PoisonError};

/// The port AMQP brokers listen on by default
pub const DEFAULT_AMQP_PORT: u16 = 5672;

/// Crates beneath an AMQP client that log through `tracing`, some from their own I/O threads
/// while a publish is waiting on them (& holding our lock).
pub const AMQP_CLIENT_TARGETS: &[&str] = &[
    "lapin",
    "amq_protocol",
    "amq_protocol_tcp",
    "amq_protocol_types",
    "amq_protocol_uri",
    "pinky_swear",
    "async_io",
    "async_executor",
    "async_global_executor",
    "polling",
    "tcp_stream",
    "rustls",
];

/// A live channel to a message broker.
pub trait BrokerChannel {
    /// Confirm that `exchange` exists, without creating it.
    fn declare_exchange_passive(&mut self, exchange: &str) -> Result<()>;
    fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()>;
    fn is_open(&self) -> bool;
    /// Release the channel & whatever underlies it. Called on any channel we're done with,
    /// including those already closed by the broker, so implementations should close only what
    /// is still open.
    fn close(&mut self) -> Result<()>;
}

/// Something that can open [`BrokerChannel`]s.
pub trait Broker {
    type Channel: BrokerChannel;
    /// Connect to the broker & open a channel.
    fn connect(&self) -> Result<Self::Channel>;
}

/// Where a [`ReconnectingChannel`] stands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connected,
}

/// A channel to a fixed exchange that connects on first use & after every failure.
///
/// All state transitions happen under one lock; publishing is serialized, which is fine for
/// logging.
pub struct ReconnectingChannel<B: Broker> {
    broker: B,
    exchange: String,
    channel: Mutex<Option<B::Channel>>,
}

impl<B: Broker> ReconnectingChannel<B> {
    /// No connection is attempted until the first call to [`publish`](Self::publish).
    pub fn new<S: Into<String>>(broker: B, exchange: S) -> ReconnectingChannel<B> {
        ReconnectingChannel {
            broker,
            exchange: exchange.into(),
            channel: Mutex::new(None),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn state(&self) -> ChannelState {
        match &*self.channel.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(_) => ChannelState::Connected,
            None => ChannelState::Disconnected,
        }
    }

    /// Connect, and check that our exchange exists, in one step.
    fn connect(&self) -> Result<B::Channel> {
        let mut channel = self.broker.connect()?;
        if let Err(err) = channel.declare_exchange_passive(&self.exchange) {
            let _ = channel.close();
            return Err(err);
        }
        debug!(exchange = %self.exchange, "Connected to AMQP broker.");
        Ok(channel)
    }

    /// Publish `payload` to our exchange under `routing_key`.
    ///
    /// If we're disconnected (or our channel has been closed from the far end), connect first;
    /// if that fails we stay disconnected. If the publish fails, close the channel & disconnect.
    /// Either way the error is returned and nothing is retried; the next call will reconnect.
    pub fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<()> {
        let mut guard = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        let mut channel = match guard.take() {
            Some(channel) if channel.is_open() => channel,
            stale => {
                if let Some(mut stale) = stale {
                    trace!(exchange = %self.exchange, "AMQP channel closed remotely; reconnecting.");
                    let _ = stale.close();
                }
                self.connect()?
            }
        };
        match channel.publish(&self.exchange, routing_key, payload) {
            Ok(()) => {
                *guard = Some(channel);
                Ok(())
            }
            Err(err) => {
                let _ = channel.close();
                trace!(exchange = %self.exchange, "AMQP publish failed; disconnected.");
                Err(err)
            }
        }
    }

    /// Close the channel, if any. The next [`publish`](Self::publish) will reconnect.
    pub fn close(&self) -> Result<()> {
        match self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(mut channel) => channel.close(),
            None => Ok(()),
        }
    }
}

/// Sending GELF to an AMQP exchange
///
/// Messages are published whole (never chunked or compressed) to a fixed exchange & routing key.
pub struct AmqpTransport<B: Broker> {
    channel: ReconnectingChannel<B>,
    routing_key: String,
}

impl<B: Broker> AmqpTransport<B> {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        broker: B,
        exchange: S1,
        routing_key: S2,
    ) -> AmqpTransport<B> {
        AmqpTransport {
            channel: ReconnectingChannel::new(broker, exchange),
            routing_key: routing_key.into(),
        }
    }
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }
    pub fn close(&self) -> Result<()> {
        self.channel.close()
    }
}

impl<B: Broker> Transport for AmqpTransport<B> {
    fn send(&self, msg: &Gelf) -> Result<()> {
        self.channel.publish(&self.routing_key, msg)
    }
    fn ignored_targets(&self) -> &[&'static str] {
        AMQP_CLIENT_TARGETS
    }
}

/// Where to find the broker, and what to publish to.
#[derive(Clone, Debug)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub exchange: String,
    pub routing_key: String,
    pub user: String,
    pub password: String,
}

impl std::default::Default for AmqpConfig {
    fn default() -> Self {
        AmqpConfig {
            host: "localhost".to_string(),
            port: DEFAULT_AMQP_PORT,
            vhost: "/".to_string(),
            exchange: "log-messages".to_string(),
            routing_key: "#".to_string(),
            user: "guest".to_string(),
            password: "guest".to_string(),
        }
    }
}

#[cfg(feature = "amqp")]
pub use self::lapin_broker::{LapinBroker, LapinChannel};

#[cfg(feature = "amqp")]
mod lapin_broker {

    use super::{AmqpConfig, AmqpTransport, Broker, BrokerChannel};

    use crate::error::{Error, Result};

    use futures::executor::block_on;
    use lapin::{
        options::{BasicPublishOptions, ExchangeDeclareOptions},
        types::FieldTable,
        uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo},
        BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    };

    /// A [`Broker`] speaking AMQP 0.9.1 through [lapin](https://docs.rs/lapin).
    ///
    /// Heartbeats are disabled so that an idle logger isn't disconnected; we rely on TCP
    /// keep-alive instead.
    pub struct LapinBroker {
        uri: AMQPUri,
    }

    impl LapinBroker {
        pub fn new(config: &AmqpConfig) -> LapinBroker {
            LapinBroker {
                uri: AMQPUri {
                    scheme: AMQPScheme::AMQP,
                    authority: AMQPAuthority {
                        userinfo: AMQPUserInfo {
                            username: config.user.clone(),
                            password: config.password.clone(),
                        },
                        host: config.host.clone(),
                        port: config.port,
                    },
                    vhost: config.vhost.clone(),
                    query: AMQPQueryString {
                        heartbeat: Some(0),
                        ..Default::default()
                    },
                },
            }
        }
    }

    pub struct LapinChannel {
        connection: Connection,
        channel: Channel,
    }

    impl Broker for LapinBroker {
        type Channel = LapinChannel;
        fn connect(&self) -> Result<LapinChannel> {
            block_on(async {
                let connection =
                    Connection::connect_uri(self.uri.clone(), ConnectionProperties::default())
                        .await?;
                let channel = connection.create_channel().await?;
                Ok::<_, lapin::Error>(LapinChannel {
                    connection,
                    channel,
                })
            })
            .map_err(Error::transport)
        }
    }

    impl BrokerChannel for LapinChannel {
        fn declare_exchange_passive(&mut self, exchange: &str) -> Result<()> {
            block_on(self.channel.exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    passive: true,
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            ))
            .map_err(Error::transport)
        }
        fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
            block_on(async {
                let confirm = self
                    .channel
                    .basic_publish(
                        exchange,
                        routing_key,
                        BasicPublishOptions::default(),
                        payload,
                        BasicProperties::default(),
                    )
                    .await?;
                confirm.await?;
                Ok::<(), lapin::Error>(())
            })
            .map_err(Error::transport)
        }
        fn is_open(&self) -> bool {
            self.channel.status().connected()
        }
        fn close(&mut self) -> Result<()> {
            // The broker may have closed the channel alone; the connection (& its I/O thread)
            // still has to go.
            block_on(async {
                let channel = if self.channel.status().connected() {
                    self.channel.close(200, "OK").await
                } else {
                    Ok(())
                };
                let connection = if self.connection.status().connected() {
                    self.connection.close(200, "OK").await
                } else {
                    Ok(())
                };
                channel.and(connection)
            })
            .map_err(Error::transport)
        }
    }

    impl AmqpTransport<LapinBroker> {
        /// Construct a [`Transport`](crate::transport::Transport) publishing to the broker,
        /// exchange & routing key named in `config`; the connection is made on first use.
        pub fn from_config(config: &AmqpConfig) -> AmqpTransport<LapinBroker> {
            AmqpTransport::new(
                LapinBroker::new(config),
                config.exchange.clone(),
                config.routing_key.clone(),
            )
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::error::Error;

    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
    };

    /// Shared knobs & counters for the mock broker
    #[derive(Default)]
    struct Script {
        connects: AtomicUsize,
        closes: AtomicUsize,
        refuse_connect: AtomicBool,
        no_exchange: AtomicBool,
        // Outcomes of successive publishes; an empty queue means success
        outcomes: Mutex<VecDeque<bool>>,
        published: Mutex<Vec<(String, String, Vec<u8>)>>,
        // Flipped to simulate the broker closing the channel
        remote_close: AtomicBool,
        // Whether a failed publish also closes the channel
        close_on_failure: AtomicBool,
    }

    struct MockBroker(Arc<Script>);

    struct MockChannel {
        script: Arc<Script>,
        open: bool,
    }

    impl Broker for MockBroker {
        type Channel = MockChannel;
        fn connect(&self) -> Result<MockChannel> {
            self.0.connects.fetch_add(1, Ordering::SeqCst);
            if self.0.refuse_connect.load(Ordering::SeqCst) {
                return Err(Error::transport("connection refused"));
            }
            self.0.remote_close.store(false, Ordering::SeqCst);
            Ok(MockChannel {
                script: self.0.clone(),
                open: true,
            })
        }
    }

    impl BrokerChannel for MockChannel {
        fn declare_exchange_passive(&mut self, _exchange: &str) -> Result<()> {
            if self.script.no_exchange.load(Ordering::SeqCst) {
                self.open = false;
                Err(Error::transport("NOT_FOUND - no exchange"))
            } else {
                Ok(())
            }
        }
        fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
            assert!(self.is_open(), "publish on a closed channel");
            let ok = self.script.outcomes.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                self.script.published.lock().unwrap().push((
                    exchange.to_string(),
                    routing_key.to_string(),
                    payload.to_vec(),
                ));
                Ok(())
            } else {
                if self.script.close_on_failure.load(Ordering::SeqCst) {
                    self.open = false;
                }
                Err(Error::transport("broken pipe"))
            }
        }
        fn is_open(&self) -> bool {
            self.open && !self.script.remote_close.load(Ordering::SeqCst)
        }
        fn close(&mut self) -> Result<()> {
            self.script.closes.fetch_add(1, Ordering::SeqCst);
            self.open = false;
            Ok(())
        }
    }

    fn channel() -> (Arc<Script>, ReconnectingChannel<MockBroker>) {
        let script = Arc::new(Script::default());
        let chan = ReconnectingChannel::new(MockBroker(script.clone()), "log-messages");
        (script, chan)
    }

    #[test]
    fn lazy_connect() {
        let (script, chan) = channel();
        assert_eq!(chan.state(), ChannelState::Disconnected);
        assert_eq!(script.connects.load(Ordering::SeqCst), 0);

        chan.publish("#", b"{}").unwrap();
        assert_eq!(chan.state(), ChannelState::Connected);
        assert_eq!(script.connects.load(Ordering::SeqCst), 1);
        assert_eq!(
            script.published.lock().unwrap()[0],
            ("log-messages".to_string(), "#".to_string(), b"{}".to_vec())
        );
    }

    #[test]
    fn one_reconnect_per_failure() {
        let (script, chan) = channel();
        script
            .outcomes
            .lock()
            .unwrap()
            .extend([true, true, false, true]);

        let mut states = Vec::new();
        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(chan.publish("#", b"{}").is_ok());
            states.push(chan.state());
        }

        assert_eq!(results, vec![true, true, false, true]);
        assert_eq!(
            states,
            vec![
                ChannelState::Connected,
                ChannelState::Connected,
                ChannelState::Disconnected,
                ChannelState::Connected
            ]
        );
        // The initial connection, plus exactly one reconnect following the failure
        assert_eq!(script.connects.load(Ordering::SeqCst), 2);
        assert_eq!(script.closes.load(Ordering::SeqCst), 1);
        assert_eq!(script.published.lock().unwrap().len(), 3);
    }

    #[test]
    fn connect_failure() {
        let (script, chan) = channel();
        script.refuse_connect.store(true, Ordering::SeqCst);

        assert!(chan.publish("#", b"{}").is_err());
        assert_eq!(chan.state(), ChannelState::Disconnected);
        // No retry within the call
        assert_eq!(script.connects.load(Ordering::SeqCst), 1);

        script.refuse_connect.store(false, Ordering::SeqCst);
        chan.publish("#", b"{}").unwrap();
        assert_eq!(chan.state(), ChannelState::Connected);
        assert_eq!(script.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_exchange() {
        let (script, chan) = channel();
        script.no_exchange.store(true, Ordering::SeqCst);

        assert!(chan.publish("#", b"{}").is_err());
        assert_eq!(chan.state(), ChannelState::Disconnected);
        assert!(script.published.lock().unwrap().is_empty());
    }

    #[test]
    fn closed_remotely() {
        let (script, chan) = channel();
        chan.publish("#", b"first").unwrap();
        script.remote_close.store(true, Ordering::SeqCst);

        chan.publish("#", b"second").unwrap();
        assert_eq!(chan.state(), ChannelState::Connected);
        assert_eq!(script.connects.load(Ordering::SeqCst), 2);
        assert_eq!(script.published.lock().unwrap().len(), 2);
        // The dead channel was still released, so its connection doesn't linger
        assert_eq!(script.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_channel_released() {
        let (script, chan) = channel();
        script.close_on_failure.store(true, Ordering::SeqCst);
        script.outcomes.lock().unwrap().push_back(false);

        assert!(chan.publish("#", b"{}").is_err());
        assert_eq!(chan.state(), ChannelState::Disconnected);
        assert_eq!(script.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_close() {
        let (script, chan) = channel();
        chan.publish("#", b"{}").unwrap();
        chan.close().unwrap();
        assert_eq!(chan.state(), ChannelState::Disconnected);
        assert_eq!(script.closes.load(Ordering::SeqCst), 1);
        // Closing again is a no-op
        chan.close().unwrap();
        assert_eq!(script.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_publishers() {
        let script = Arc::new(Script::default());
        let transport = Arc::new(AmqpTransport::new(
            MockBroker(script.clone()),
            "log-messages",
            "graylog",
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let transport = transport.clone();
                std::thread::spawn(move || {
                    for _ in 0..16 {
                        transport.channel.publish(&transport.routing_key, b"{}").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(script.connects.load(Ordering::SeqCst), 1);
        assert_eq!(script.published.lock().unwrap().len(), 128);
        assert_eq!(transport.state(), ChannelState::Connected);
    }

    #[test]
    fn client_targets_ignored() {
        let transport = AmqpTransport::new(
            MockBroker(Arc::new(Script::default())),
            "log-messages",
            "#",
        );
        let ignored = transport.ignored_targets();
        assert!(ignored.contains(&"lapin"));
        assert!(ignored.contains(&"pinky_swear"));
    }

    #[test]
    fn defaults() {
        let config = AmqpConfig::default();
        assert_eq!(config.port, 5672);
        assert_eq!(config.vhost, "/");
        assert_eq!(config.exchange, "log-messages");
        assert_eq!(config.routing_key, "#");
    }
}
