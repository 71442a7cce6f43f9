// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus ASCII server skeleton

use std::{io, path::Path};

use tokio_serial::SerialStream;
use tokio_util::codec::Framed;

use crate::{codec, server::Service};

use super::process;

#[derive(Debug)]
pub struct Server {
    serial: SerialStream,
}

impl Server {
    /// Set up a new server instance from an interface path and baud rate.
    pub fn new_from_path<P: AsRef<Path>>(p: P, baud_rate: u32) -> io::Result<Self> {
        let serial =
            SerialStream::open(&tokio_serial::new(p.as_ref().to_string_lossy(), baud_rate))?;
        Ok(Server { serial })
    }

    /// Set up a new server instance based on a pre-configured serial stream.
    #[must_use]
    pub fn new(serial: SerialStream) -> Self {
        Server { serial }
    }

    /// Serve Modbus ASCII requests based on the provided service until it
    /// finishes.
    pub async fn serve_forever<S>(self, service: S)
    where
        S: Service + 'static,
    {
        self.serve_until(service, futures_util::future::pending())
            .await;
    }

    /// Serve Modbus ASCII requests until a shutdown signal is received.
    pub async fn serve_until<S, Sd>(self, service: S, shutdown_signal: Sd)
    where
        S: Service + 'static,
        Sd: std::future::Future<Output = ()> + Send + Unpin + 'static,
    {
        let framed = Framed::new(self.serial, codec::ascii::ServerCodec::default());

        tokio::select! {
            res = process(framed, service) => if let Err(err) = res {
                log::error!("Serving failed: {err}");
            },
            _ = shutdown_signal => log::trace!("Shutdown signal received"),
        }
    }
}

/// Serve Modbus ASCII requests on any established byte stream.
pub async fn serve_stream<T, S>(stream: T, service: S) -> io::Result<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    S: Service,
{
    let framed = Framed::new(stream, codec::ascii::ServerCodec::default());
    process(framed, service).await
}
