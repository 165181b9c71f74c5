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

//! Test publishing GELF to the "log-messages" exchange on a RabbitMQ broker on the local host.
//!
//! The exchange must already exist; it is checked, never created.

use tracing::{error, info, warn};
use tracing_gelf::{
    amqp::{AmqpConfig, AmqpTransport},
    layer::Layer,
};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let transport = AmqpTransport::from_config(&AmqpConfig::default());
    let subscriber = Registry::default().with(
        Layer::with_transport(transport)
            .with_error_handler(|err| eprintln!("failed to publish: {}", err)),
    );
    let _guard = tracing::subscriber::set_default(subscriber);

    info!("Hello, AMQP.");
    warn!(attempt = 3, "Hello, AMQP.");
    error!(event = "Hello, AMQP.", pid = std::process::id());
}
