// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU client connections

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    codec,
    slave::Slave,
    transaction::{TransactionManager, TransactionOptions},
};

use super::*;

/// Attach a new client context to a shared serial connection,
/// selecting the broadcast address until a slave is selected.
pub fn attach<T>(transport: T) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_slave(transport, Slave::broadcast())
}

/// Attach a new client context to a serial connection.
pub fn attach_slave<T>(transport: T, slave: Slave) -> Context
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug + 'static,
{
    attach_slave_with_options(transport, slave, TransactionOptions::default())
}

/// Attach a new client context with explicit transaction options,
/// e.g. for serial adapters that echo their own output.
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
        codec::rtu::ClientCodec::default(),
        false,
        slave,
        options,
    );
    Context {
        client: Box::new(client),
    }
}
