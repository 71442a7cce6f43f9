// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU client connections (blocking)

use std::io::Error;

use tokio_serial::{SerialPortBuilder, SerialStream};

use crate::slave::Slave;

use super::{runtime, Context};

/// Connect to no particular Modbus slave device for sending
/// broadcast messages.
pub fn connect(builder: &SerialPortBuilder) -> std::result::Result<Context, Error> {
    connect_slave(builder, Slave::broadcast())
}

/// Connect to the given Modbus slave device.
pub fn connect_slave(
    builder: &SerialPortBuilder,
    slave: Slave,
) -> std::result::Result<Context, Error> {
    let runtime = runtime()?;
    // SerialStream::open requires a runtime context to register
    // the port with the reactor.
    let serial = {
        let _guard = runtime.enter();
        SerialStream::open(builder)?
    };
    let async_ctx = crate::client::rtu::attach_slave(serial, slave);
    Ok(Context {
        runtime,
        async_ctx,
        timeout: None,
    })
}
