// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TLS server plumbing
//!
//! The TLS handshake is not part of this library: accept and
//! authenticate the connection with the TLS implementation of your
//! choice, then hand the established stream to [`serve_stream`]. The
//! framing transfers bare PDUs, client identity is a property of the
//! connection.

use std::{fmt, io};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::{codec, server::Service};

use super::process;

/// Serve Modbus requests on an established TLS stream until the peer
/// disconnects.
pub async fn serve_stream<T, S>(stream: T, service: S) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug,
    S: Service,
{
    let framed = Framed::new(stream, codec::tls::ServerCodec::default());
    process(framed, service).await
}
