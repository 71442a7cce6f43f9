// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP client connections (blocking)

use std::{io::Error, net::SocketAddr};

use crate::slave::Slave;

use super::{runtime, Context};

/// Establish a direct connection to a Modbus TCP coupler.
pub fn connect(socket_addr: SocketAddr) -> std::result::Result<Context, Error> {
    connect_slave(socket_addr, Slave::tcp_device())
}

/// Connect to any kind of Modbus slave device, probably through
/// a Modbus TCP gateway.
pub fn connect_slave(socket_addr: SocketAddr, slave: Slave) -> std::result::Result<Context, Error> {
    let runtime = runtime()?;
    let async_ctx =
        runtime.block_on(crate::client::tcp::connect_slave(socket_addr, slave))?;
    Ok(Context {
        runtime,
        async_ctx,
        timeout: None,
    })
}
