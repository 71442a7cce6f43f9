// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ASCII client connections

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    codec,
    slave::Slave,
    transaction::{TransactionManager, TransactionOptions},
};

use super::*;

/// Attach a new client context to a serial connection using the
/// plain text ASCII framing.
pub fn attach_slave<T>(transport: T, slave: Slave) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_slave_with_options(transport, slave, TransactionOptions::default())
}

/// Attach a new client context with explicit transaction options.
pub fn attach_slave_with_options<T>(
    transport: T,
    slave: Slave,
    options: TransactionOptions,
) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    let client = TransactionManager::with_options(
        transport,
        codec::ascii::ClientCodec::default(),
        false,
        slave,
        options,
    );
    Context {
        client: Box::new(client),
    }
}
