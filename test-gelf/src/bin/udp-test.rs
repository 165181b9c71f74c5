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

//! Test writing GELF over UDP to port 12201 on the local host.

use tracing::{debug, error, info, trace, warn};
use tracing_gelf::{
    formatter::GelfFormatter, layer::Layer, tracing::DefaultTracingFormatter,
    transport::UdpTransport,
};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    // Setup the real subsriber...
    let subscriber = Registry::default().with(
        Layer::<Registry, GelfFormatter, DefaultTracingFormatter, UdpTransport>::try_default()
            .unwrap(),
    );
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!("Hello, 世界!");
    warn!(attempt = 3, "Hello, 世界!");
    error!(event = "Hello, 世界!", pid = std::process::id());
    // Large enough to be chunked, even compressed
    let big: String = (0..4000u32)
        .map(|i| (b'a' + (i.wrapping_mul(2654435761) >> 27) as u8 % 26) as char)
        .collect();
    info!(payload = big.as_str(), "a chunked message");
}
