// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server skeleton

use std::{io, net::SocketAddr};

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

use crate::{codec, server::Service};

use super::process;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    socket_addr: SocketAddr,
}

impl Server {
    /// Set the address for the server (mandatory).
    #[must_use]
    pub fn new(socket_addr: SocketAddr) -> Self {
        Self { socket_addr }
    }

    /// Start an async Modbus TCP server task.
    ///
    /// Each accepted connection is served by its own task with a clone
    /// of the service.
    pub async fn serve<S>(&self, service: S) -> io::Result<()>
    where
        S: Service + Clone + 'static,
    {
        let listener = listener(self.socket_addr)?;

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            log::debug!("Accepted connection from {peer_addr}");
            let framed = Framed::new(stream, codec::tcp::ServerCodec::default());
            let service = service.clone();

            tokio::spawn(async move {
                if let Err(err) = process(framed, service).await {
                    log::error!("Serving {peer_addr} failed: {err}");
                }
            });
        }
    }

    /// Start a Modbus TCP server that blocks the current thread until
    /// a shutdown is requested.
    pub fn serve_until<S, Sd>(self, service: S, shutdown_signal: Sd) -> io::Result<()>
    where
        S: Service + Clone + 'static,
        Sd: std::future::Future<Output = ()> + Send + Unpin + 'static,
    {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_io()
            .build()?;

        rt.block_on(async {
            tokio::select! {
                res = self.serve(service) => if let Err(err) = res {
                    log::error!("Server failed: {err}");
                },
                _ = shutdown_signal => log::trace!("Shutdown signal received"),
            }
        });
        Ok(())
    }

    /// Start a Modbus TCP server that blocks the current thread forever.
    pub fn serve_forever<S>(self, service: S) -> io::Result<()>
    where
        S: Service + Clone + 'static,
    {
        self.serve_until(service, futures_util::future::pending())
    }
}

/// Serve Modbus TCP requests on an established stream until the peer
/// disconnects, e.g. on a connection accepted elsewhere.
pub async fn serve_stream<T, S>(stream: T, service: S) -> io::Result<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    S: Service,
{
    let framed = Framed::new(stream, codec::tcp::ServerCodec::default());
    process(framed, service).await
}

/// Start TCP listener - configure and open TCP socket
fn listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => Socket::new(Domain::IPV4, Type::STREAM, None)?,
        SocketAddr::V6(_) => Socket::new(Domain::IPV6, Type::STREAM, None)?,
    };
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datastore::{ServerContext, SlaveContext},
        server::DatastoreService,
    };

    #[tokio::test]
    async fn listener_binds_an_ephemeral_port() {
        let listener = listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn server_accepts_connections() {
        let listener = listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = Server::new(addr);
        let service = DatastoreService::new(ServerContext::single(SlaveContext::default()));
        let server_task = tokio::spawn(async move { server.serve(service).await });

        // Poll until the listener is up
        let mut connected = false;
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(addr).await.is_ok() {
                connected = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(connected);
        server_task.abort();
    }
}
