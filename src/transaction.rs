// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response lifecycle on a single connection
//!
//! [`TransactionManager`] owns the transport and the framing codec of one
//! connection and correlates requests with responses: transaction id
//! assignment, per-attempt timeouts, retries, and the disconnect budget
//! for persistently silent devices. The algorithm is written once and
//! instantiated with every framer; the blocking client wraps it in a
//! private runtime.

use std::{fmt, io, time::Duration};

use bytes::{Buf, Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    frame::{
        ExceptionResponse, Header, Request, RequestAdu, RequestPdu, Response, ResponseAdu,
        ResponsePdu, TransactionId,
    },
    slave::{Slave, SlaveId},
    Error,
};

/// The transaction id sequence wraps back to 1 after this value,
/// 0 is reserved for the framers that do not transport one.
const MAX_TRANSACTION_ID: TransactionId = 65000;

/// Tunable behavior of a [`TransactionManager`].
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// Upper bound for a single wait on a response.
    pub timeout: Duration,
    /// Number of re-sends after a missing response.
    pub retries: usize,
    /// Also retry when the peer closes the stream without an answer.
    pub retry_on_empty: bool,
    /// Allow requests to the broadcast address 0.
    pub broadcast_enable: bool,
    /// Discard the locally echoed request bytes before decoding the
    /// response (serial adapters with local echo).
    pub handle_local_echo: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retries: 3,
            retry_on_empty: false,
            broadcast_enable: false,
            handle_local_echo: false,
        }
    }
}

type PacketTraceFn = Box<dyn FnMut(bool, Bytes) -> Bytes + Send>;
type RequestTraceFn = Box<dyn FnMut(Request) -> Request + Send>;
type ResponseTraceFn = Box<dyn FnMut(ResponsePdu) -> ResponsePdu + Send>;
type ConnectTraceFn = Box<dyn FnMut(bool) + Send>;

/// Inline observation hooks.
///
/// Each hook returns the (possibly transformed) item and runs inline on
/// the calling task, so it must not block. The `bool` of the packet hook
/// is `true` for outgoing data.
#[derive(Default)]
pub struct Trace {
    pub packet: Option<PacketTraceFn>,
    pub request: Option<RequestTraceFn>,
    pub response: Option<ResponseTraceFn>,
    pub connect: Option<ConnectTraceFn>,
}

impl Trace {
    fn packet(&mut self, outgoing: bool, bytes: Bytes) -> Bytes {
        match &mut self.packet {
            Some(hook) => hook(outgoing, bytes),
            None => bytes,
        }
    }

    fn request(&mut self, request: Request) -> Request {
        match &mut self.request {
            Some(hook) => hook(request),
            None => request,
        }
    }

    fn response(&mut self, response: ResponsePdu) -> ResponsePdu {
        match &mut self.response {
            Some(hook) => hook(response),
            None => response,
        }
    }

    fn connect(&mut self, connected: bool) {
        if let Some(hook) = &mut self.connect {
            hook(connected);
        }
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("packet", &self.packet.is_some())
            .field("request", &self.request.is_some())
            .field("response", &self.response.is_some())
            .field("connect", &self.connect.is_some())
            .finish()
    }
}

/// Drives requests over one connection and hands matching responses back.
#[derive(Debug)]
pub struct TransactionManager<T, C> {
    transport: T,
    codec: C,
    read_buf: BytesMut,
    slave_id: SlaveId,
    next_tid: TransactionId,
    uses_tid: bool,
    options: TransactionOptions,
    trace: Trace,
    count_until_disconnect: i32,
    max_until_disconnect: i32,
    connected: bool,
    pending_echo: usize,
}

impl<T, C> TransactionManager<T, C>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
    C: Decoder<Item = ResponseAdu, Error = io::Error>
        + Encoder<RequestAdu, Error = io::Error>
        + Send,
{
    /// Attach a manager to an established transport.
    ///
    /// `uses_tid` selects whether the codec transports transaction ids
    /// (Modbus TCP) or pins them to zero (serial and TLS framers).
    pub fn new(transport: T, codec: C, uses_tid: bool, slave: Slave) -> Self {
        Self::with_options(transport, codec, uses_tid, slave, TransactionOptions::default())
    }

    pub fn with_options(
        transport: T,
        codec: C,
        uses_tid: bool,
        slave: Slave,
        options: TransactionOptions,
    ) -> Self {
        // Devices that stay silent for retries + 3 consecutive requests
        // are considered gone and the connection is dropped.
        let max_until_disconnect = options.retries as i32 + 3;
        let mut this = Self {
            transport,
            codec,
            read_buf: BytesMut::with_capacity(512),
            slave_id: slave.into(),
            next_tid: 0,
            uses_tid,
            options,
            trace: Trace::default(),
            count_until_disconnect: max_until_disconnect,
            max_until_disconnect,
            connected: true,
            pending_echo: 0,
        };
        this.trace.connect(true);
        this
    }

    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = trace;
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut TransactionOptions {
        &mut self.options
    }

    pub fn slave(&self) -> Slave {
        Slave(self.slave_id)
    }

    pub fn set_slave(&mut self, slave: Slave) {
        self.slave_id = slave.into();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Drop the connection and notify the connect trace.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.trace.connect(false);
        }
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        if !self.uses_tid {
            return 0;
        }
        if self.next_tid >= MAX_TRANSACTION_ID {
            self.next_tid = 1;
        } else {
            self.next_tid += 1;
        }
        self.next_tid
    }

    /// Issue one request and wait for the matching response.
    ///
    /// With `no_response_expected` (broadcast) the frame is sent once and
    /// the synthetic [`ExceptionResponse::no_response`] marker is returned
    /// without waiting. Otherwise every attempt waits up to the configured
    /// timeout, and exhausted retries count against the disconnect budget.
    pub async fn execute(
        &mut self,
        no_response_expected: bool,
        request: Request,
    ) -> crate::Result<Response> {
        if !self.connected {
            return Err(Error::Connection(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is disconnected",
            )));
        }
        request.validate()?;
        let request = self.trace.request(request);
        log::debug!("Call {request:?}");

        let hdr = Header::new(self.next_transaction_id(), self.slave_id);
        let mut frame_buf = BytesMut::new();
        self.codec.encode(
            RequestAdu {
                hdr,
                pdu: RequestPdu(request),
            },
            &mut frame_buf,
        )?;
        let encoded = frame_buf.freeze();

        let retries = self.options.retries;
        for attempt in 0..=retries {
            // A response to this request can only arrive after the send,
            // whatever is still buffered belongs to an earlier exchange.
            self.read_buf.clear();

            let frame = self.trace.packet(true, encoded.clone());
            if let Err(err) = self.transport.write_all(&frame).await {
                self.disconnect();
                return Err(Error::Connection(err));
            }
            self.pending_echo = if self.options.handle_local_echo {
                frame.len()
            } else {
                0
            };

            if no_response_expected {
                return Ok(Err(ExceptionResponse::no_response()));
            }

            match timeout(self.options.timeout, Self::recv_response(
                &mut self.transport,
                &mut self.codec,
                &mut self.read_buf,
                &mut self.trace,
                &mut self.pending_echo,
                self.uses_tid,
                hdr,
            ))
            .await
            {
                Ok(Ok(Some(pdu))) => {
                    self.count_until_disconnect = self.max_until_disconnect;
                    return Ok(pdu.into());
                }
                Ok(Ok(None)) => {
                    if self.options.retry_on_empty && attempt < retries {
                        log::warn!("Empty response, retrying");
                        continue;
                    }
                    self.disconnect();
                    return Err(Error::Connection(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "connection closed by peer",
                    )));
                }
                Ok(Err(err)) => {
                    return Err(Error::Io(err));
                }
                Err(_elapsed) => {
                    log::warn!(
                        "No response within {:?}, {} attempt(s) left",
                        self.options.timeout,
                        retries - attempt
                    );
                }
            }
        }

        self.count_until_disconnect -= 1;
        if self.count_until_disconnect < 0 {
            self.disconnect();
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "no response to consecutive requests, closing connection",
            )));
        }
        Err(Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no response after {retries} retries"),
        )))
    }

    #[allow(clippy::too_many_arguments)]
    async fn recv_response(
        transport: &mut T,
        codec: &mut C,
        read_buf: &mut BytesMut,
        trace: &mut Trace,
        pending_echo: &mut usize,
        uses_tid: bool,
        req_hdr: Header,
    ) -> io::Result<Option<ResponsePdu>> {
        loop {
            while let Some(ResponseAdu { hdr, pdu }) = codec.decode(read_buf)? {
                let pdu = trace.response(pdu);
                if hdr.unit_id != req_hdr.unit_id {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "Invalid response header: expected unit id = {}, actual = {}",
                            req_hdr.unit_id, hdr.unit_id
                        ),
                    ));
                }
                if uses_tid && hdr.transaction_id != req_hdr.transaction_id {
                    // A late answer to a request that has already been
                    // given up on. Drop it and keep reading.
                    log::debug!(
                        "Discarding response with stale transaction id {}",
                        hdr.transaction_id
                    );
                    continue;
                }
                return Ok(Some(pdu));
            }

            let mut chunk = BytesMut::with_capacity(512);
            let n = transport.read_buf(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            let mut bytes = trace.packet(false, chunk.freeze());
            if *pending_echo > 0 {
                let skip = (*pending_echo).min(bytes.len());
                bytes.advance(skip);
                *pending_echo -= skip;
            }
            read_buf.extend_from_slice(&bytes);
        }
    }
}
