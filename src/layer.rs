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

//! [tracing-gelf](crate) [`Layer`] implementations.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! A basic struct [`Layer`] is defined, but convenience constructors are provided only for a few
//! (sensible) combinations of type parameters. Consumers of this crate are of course free to
//! implement the [`TracingFormatter`], [`Formatter`] and [`Transport`] traits for themselves &
//! provide their own implementations.

use crate::{
    error::{Error, Result},
    formatter::{Formatter, GelfFormatter},
    handler::Handler,
    tracing::{DefaultTracingFormatter, TracingFormatter},
    transport::{is_within, TcpTransport, Transport, UdpTransport},
};

use tracing::Event;
use tracing_subscriber::layer::Context;

/// The target under which this crate's own diagnostics are emitted
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

fn is_own_target(target: &str) -> bool {
    is_within(target, OWN_TARGET)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Layer                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that will send [`Event`]s to
/// Graylog as GELF.
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html
pub struct Layer<S, F1: Formatter, F2: TracingFormatter<S>, T: Transport>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    handler: Handler<F1, T>,
    tracing_formatter: F2,
    // I need the Subscriber implementation type as a type parameter to transmit it to the
    // TracingFormatter trait. 👇 gets the compiler to shut-up about unused type parameters.
    subscriber_type: std::marker::PhantomData<fn(S)>,
}

/// A [`Layer`] implementation that sends compressed (& if need be, chunked) GELF over UDP.
impl<S> Layer<S, GelfFormatter, DefaultTracingFormatter, UdpTransport>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    /// Attempt to construct a [`Layer`] that will send GELF via UDP to port 12201 on localhost
    pub fn try_default() -> Result<Self> {
        Ok(Layer::with_transport(UdpTransport::local()?))
    }
}

/// A [`Layer`] implementation that sends NUL-delimited GELF over TCP.
impl<S> Layer<S, GelfFormatter, DefaultTracingFormatter, TcpTransport>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    /// Attempt to construct a [`Layer`] that will send GELF via TCP to port 12201 on localhost
    pub fn try_default() -> Result<Self> {
        Ok(Layer::with_transport(TcpTransport::try_default()?))
    }
}

impl<S, F1, F2, T> Layer<S, F1, F2, T>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    F1: Formatter,
    F2: TracingFormatter<S>,
    T: Transport,
{
    /// construct Layer with custom inners
    pub fn new(formatter: F1, tracing_formatter: F2, transport: T) -> Self {
        Layer {
            handler: Handler::new(formatter, transport),
            tracing_formatter,
            subscriber_type: std::marker::PhantomData,
        }
    }

    /// Replace the hook invoked for each event that couldn't be formatted or sent (by default,
    /// such failures are reported as `tracing` errors which this layer itself ignores)
    pub fn with_error_handler<H>(mut self, hook: H) -> Self
    where
        H: Fn(&Error) + Send + Sync + 'static,
    {
        self.handler = self.handler.with_error_handler(hook);
        self
    }

    pub fn handler(&self) -> &Handler<F1, T> {
        &self.handler
    }
}

impl<S, T: Transport> Layer<S, GelfFormatter, DefaultTracingFormatter, T>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    /// Construct a Layer that will send GELF via transport `transport`
    pub fn with_transport(transport: T) -> Self {
        Layer::new(
            GelfFormatter::default(),
            DefaultTracingFormatter::default(),
            transport,
        )
    }

    /// Construct a Layer that will send GELF via transport `transport`, formatted by `formatter`
    pub fn with_transport_and_formatter(transport: T, formatter: GelfFormatter) -> Self {
        let tracing_formatter =
            DefaultTracingFormatter::with_summary_field(formatter.encoder().summary_field());
        Layer::new(formatter, tracing_formatter, transport)
    }
}

/// This is the Big Tuna-- the [`Layer`] implementation.
///
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
impl<S, F1, F2, T> tracing_subscriber::layer::Layer<S> for Layer<S, F1, F2, T>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    F1: Formatter + 'static,
    F2: TracingFormatter<S> + 'static,
    T: Transport + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if is_own_target(target)
            || self
                .handler
                .transport()
                .ignored_targets()
                .iter()
                .any(|module| is_within(target, module))
        {
            return;
        }
        match self.tracing_formatter.on_event(event, ctx) {
            Ok(Some(record)) => self.handler.emit(&record),
            Ok(None) => (),
            Err(err) => self.handler.report(&err),
        }
    }
}

#[cfg(test)]
mod smoke {

    use super::*;

    use crate::{
        amqp::{AmqpTransport, Broker, BrokerChannel},
        gelf::Encoder,
        serializer::{Gelf, Serializer},
    };

    use serde_json::{json, Value};
    use tracing::{error, info, warn};
    use tracing_subscriber::{
        layer::SubscriberExt, // Needed to get `with()`
        registry::Registry,
    };

    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc, Mutex,
        },
        time::Duration,
    };

    #[derive(Clone, Default)]
    struct Capture {
        sent: Arc<Mutex<Vec<Value>>>,
        fail: bool,
    }

    impl Transport for Capture {
        fn send(&self, msg: &Gelf) -> Result<()> {
            if self.fail {
                return Err(Error::transport("connection refused"));
            }
            self.sent
                .lock()
                .unwrap()
                .push(serde_json::from_slice(msg).unwrap());
            Ok(())
        }
    }

    fn formatter() -> GelfFormatter {
        GelfFormatter::new(Encoder::builder().hostname("bree.local").build(), Serializer)
    }

    #[test]
    fn own_targets() {
        assert!(is_own_target("tracing_gelf"));
        assert!(is_own_target("tracing_gelf::handler"));
        assert!(!is_own_target("tracing_gelfish"));
        assert!(!is_own_target("app"));
    }

    #[test]
    fn events_to_gelf() {
        let capture = Capture::default();
        let subscriber = Registry::default().with(Layer::with_transport_and_formatter(
            capture.clone(),
            formatter(),
        ));
        let _guard = tracing::subscriber::set_default(subscriber);

        // Events from within this crate are ignored, so name a target of our own.
        info!(target: "app", "hello");
        info!(target: "app", event = "ok", pid = 42);
        warn!(target: "app", attempt = 3, "retrying");
        // Our own diagnostics never come back around
        error!(target: "tracing_gelf::handler", "ignored");

        let sent = capture.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);

        assert_eq!(sent[0]["version"], json!("1.1"));
        assert_eq!(sent[0]["level"], json!(6));
        assert_eq!(sent[0]["severity"], json!("INFO"));
        assert_eq!(sent[0]["short_message"], json!("hello"));
        assert_eq!(sent[0]["host"], json!("bree.local"));
        assert_eq!(sent[0]["_logger"], json!("app"));
        assert_eq!(sent[0]["file"], json!(file!()));

        assert_eq!(sent[1]["short_message"], json!("ok"));
        assert_eq!(sent[1]["_pid"], json!(42));
        assert!(sent[1].get("pid").is_none());
        assert!(sent[1].get("_logger").is_none());

        assert_eq!(sent[2]["short_message"], json!("retrying"));
        assert_eq!(sent[2]["severity"], json!("WARNING"));
        assert_eq!(sent[2]["level"], json!(6));
        assert_eq!(sent[2]["_attempt"], json!(3));
    }

    #[test]
    fn exceptions() {
        let capture = Capture::default();
        let subscriber = Registry::default().with(Layer::with_transport_and_formatter(
            capture.clone(),
            formatter(),
        ));
        let _guard = tracing::subscriber::set_default(subscriber);

        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        error!(
            target: "app",
            error = &err as &(dyn std::error::Error + 'static),
            "write failed"
        );

        let sent = capture.sent.lock().unwrap();
        assert_eq!(sent[0]["level"], json!(3));
        assert_eq!(sent[0]["exception"], json!("disk full"));
        assert_eq!(sent[0]["short_message"], json!("write failed"));
    }

    #[test]
    fn failures_are_reported() {
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        let subscriber = Registry::default().with(
            Layer::with_transport(Capture {
                fail: true,
                ..Default::default()
            })
            .with_error_handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let _guard = tracing::subscriber::set_default(subscriber);

        info!(target: "app", "one");
        info!(target: "app", "two");
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_hook_does_not_recurse() {
        let subscriber = Registry::default().with(Layer::with_transport(Capture {
            fail: true,
            ..Default::default()
        }));
        let _guard = tracing::subscriber::set_default(subscriber);

        // The failure is reported via `tracing::error!`, which this layer then ignores.
        info!(target: "app", "lost");
    }

    #[test]
    fn fields_without_summary() {
        let capture = Capture::default();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        let subscriber = Registry::default().with(
            Layer::with_transport_and_formatter(capture.clone(), formatter()).with_error_handler(
                move |err| {
                    seen.lock()
                        .unwrap()
                        .push(matches!(err, Error::NoSummaryField { .. }))
                },
            ),
        );
        let _guard = tracing::subscriber::set_default(subscriber);

        info!(target: "app", pid = 42);
        assert_eq!(*errors.lock().unwrap(), vec![true]);
        assert!(capture.sent.lock().unwrap().is_empty());
    }

    // A broker whose channel, like a real AMQP client's, waits on an I/O thread that logs while
    // the message goes out.
    struct ChattyBroker {
        dispatch: Arc<Mutex<Option<tracing::Dispatch>>>,
    }

    struct ChattyChannel {
        dispatch: Arc<Mutex<Option<tracing::Dispatch>>>,
    }

    impl Broker for ChattyBroker {
        type Channel = ChattyChannel;
        fn connect(&self) -> Result<ChattyChannel> {
            Ok(ChattyChannel {
                dispatch: self.dispatch.clone(),
            })
        }
    }

    impl BrokerChannel for ChattyChannel {
        fn declare_exchange_passive(&mut self, _exchange: &str) -> Result<()> {
            Ok(())
        }
        fn publish(&mut self, _exchange: &str, _routing_key: &str, _payload: &[u8]) -> Result<()> {
            let dispatch = self.dispatch.lock().unwrap().clone().unwrap();
            std::thread::spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    tracing::trace!(target: "lapin::io_loop", "wrote frame");
                })
            })
            .join()
            .unwrap();
            Ok(())
        }
        fn is_open(&self) -> bool {
            true
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn amqp_client_threads_do_not_block() {
        let slot = Arc::new(Mutex::new(None));
        let transport = AmqpTransport::new(
            ChattyBroker {
                dispatch: slot.clone(),
            },
            "log-messages",
            "#",
        );
        let dispatch =
            tracing::Dispatch::new(Registry::default().with(Layer::with_transport(transport)));
        *slot.lock().unwrap() = Some(dispatch.clone());

        // Were the client's own events fed back to the transport, the I/O thread would block on
        // the channel lock held by the publisher, which is waiting on the I/O thread.
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || info!(target: "app", "hello"));
            let _ = tx.send(());
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
