// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry and disconnect behavior against silent devices.

use std::{
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use modbus_stack::{
    codec,
    frame::Request,
    slave::Slave,
    transaction::{TransactionManager, TransactionOptions},
    Error,
};

/// A transport that accepts writes but never produces a response.
#[derive(Debug, Default)]
struct SilentTransport {
    frames_sent: Arc<AtomicUsize>,
}

impl AsyncRead for SilentTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        _: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // No data, ever. The per-attempt timeout has to fire.
        Poll::Pending
    }
}

impl AsyncWrite for SilentTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.frames_sent.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn silent_manager(
    retries: usize,
) -> (
    TransactionManager<SilentTransport, codec::tcp::ClientCodec>,
    Arc<AtomicUsize>,
) {
    let transport = SilentTransport::default();
    let frames_sent = Arc::clone(&transport.frames_sent);
    let options = TransactionOptions {
        timeout: Duration::from_millis(50),
        retries,
        ..TransactionOptions::default()
    };
    let mgr = TransactionManager::with_options(
        transport,
        codec::tcp::ClientCodec::default(),
        true,
        Slave(1),
        options,
    );
    (mgr, frames_sent)
}

#[tokio::test(start_paused = true)]
async fn silent_device_triggers_n_plus_one_attempts() {
    for retries in [0usize, 1, 3] {
        let (mut mgr, frames_sent) = silent_manager(retries);
        let err = mgr
            .execute(false, Request::ReadCoils(0, 1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(frames_sent.load(Ordering::SeqCst), retries + 1);
        assert!(mgr.is_connected());
    }
}

#[tokio::test(start_paused = true)]
async fn persistent_silence_forces_a_disconnect() {
    let retries = 1;
    let (mut mgr, _) = silent_manager(retries);

    // The disconnect budget is retries + 3 failed requests
    for _ in 0..retries + 3 {
        let err = mgr
            .execute(false, Request::ReadCoils(0, 1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(_)));
        assert!(mgr.is_connected());
    }

    let err = mgr
        .execute(false, Request::ReadCoils(0, 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Io(_)));
    assert!(!mgr.is_connected());

    // Once disconnected, requests fail without touching the wire
    let err = mgr
        .execute(false, Request::ReadCoils(0, 1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test(start_paused = true)]
async fn successful_broadcast_skips_the_wait() {
    let transport = SilentTransport::default();
    let frames_sent = Arc::clone(&transport.frames_sent);
    let mut mgr = TransactionManager::with_options(
        transport,
        codec::tcp::ClientCodec::default(),
        true,
        Slave::broadcast(),
        TransactionOptions {
            timeout: Duration::from_millis(50),
            broadcast_enable: true,
            ..TransactionOptions::default()
        },
    );
    let rsp = mgr
        .execute(true, Request::WriteSingleCoil(0, true))
        .await
        .unwrap();
    assert!(rsp.unwrap_err().is_no_response());
    // Sent exactly once, no retries and no waiting
    assert_eq!(frames_sent.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn trace_packet_observes_every_attempt() {
    use modbus_stack::transaction::Trace;

    let (mut mgr, _) = silent_manager(2);
    let outgoing = Arc::new(AtomicUsize::new(0));
    let outgoing_in_hook = Arc::clone(&outgoing);
    mgr.set_trace(Trace {
        packet: Some(Box::new(move |is_outgoing, bytes| {
            if is_outgoing {
                outgoing_in_hook.fetch_add(1, Ordering::SeqCst);
            }
            bytes
        })),
        ..Trace::default()
    });
    let _ = mgr.execute(false, Request::ReadCoils(0, 1)).await;
    // One outgoing packet per attempt: the initial send and two retries
    assert_eq!(outgoing.load(Ordering::SeqCst), 3);
}
