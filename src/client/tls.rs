// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TLS client connections
//!
//! The TLS handshake is not part of this library. Establish the secure
//! stream with the TLS implementation of your choice and attach the
//! client context to it; the framing transfers bare PDUs and identifies
//! the peer through the connection itself, so the unit and transaction
//! ids are pinned to zero.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    codec,
    slave::Slave,
    transaction::{TransactionManager, TransactionOptions},
};

use super::*;

/// Attach a new client context to an established TLS stream.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_with_options(transport, TransactionOptions::default())
}

/// Attach a new client context with explicit transaction options.
pub fn attach_with_options<T>(transport: T, options: TransactionOptions) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    let client = TransactionManager::with_options(
        transport,
        codec::tls::ClientCodec::default(),
        false,
        Slave(0),
        options,
    );
    Context {
        client: Box::new(client),
    }
}
