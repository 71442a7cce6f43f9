// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TLS framing
//!
//! Modbus Security transfers the bare PDU: no MBAP prefix and no
//! checksum, integrity and identity are provided by the TLS transport.
//! The expected PDU size is derived through the PDU registry, the
//! transaction and unit id are pinned to zero.

use std::{
    io::{Error, Result},
    sync::Arc,
};

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::registry::PduRegistry,
    frame::{Header, RequestAdu, ResponseAdu},
};

/// Codec for the client side of a Modbus TLS connection.
#[derive(Debug, Default)]
pub struct ClientCodec {
    registry: Arc<PduRegistry>,
}

impl ClientCodec {
    #[must_use]
    pub fn new(registry: Arc<PduRegistry>) -> Self {
        Self { registry }
    }
}

/// Codec for the server side of a Modbus TLS connection.
#[derive(Debug, Default)]
pub struct ServerCodec {
    registry: Arc<PduRegistry>,
}

impl ServerCodec {
    #[must_use]
    pub fn new(registry: Arc<PduRegistry>) -> Self {
        Self { registry }
    }
}

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseAdu>> {
        let Some(pdu_len) = self.registry.response_pdu_len(buf)? else {
            return Ok(None);
        };
        if buf.len() < pdu_len {
            return Ok(None);
        }
        let pdu_data = buf.split_to(pdu_len).freeze();
        let pdu = self.registry.decode_response(pdu_data)?;
        Ok(Some(ResponseAdu {
            hdr: Header::new(0, 0),
            pdu,
        }))
    }
}

impl Decoder for ServerCodec {
    type Item = RequestAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestAdu>> {
        let Some(pdu_len) = self.registry.request_pdu_len(buf)? else {
            return Ok(None);
        };
        if buf.len() < pdu_len {
            return Ok(None);
        }
        let pdu_data = buf.split_to(pdu_len).freeze();
        let request = self.registry.decode_request(pdu_data)?;
        Ok(Some(RequestAdu {
            hdr: Header::new(0, 0),
            pdu: request.into(),
        }))
    }
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> Result<()> {
        let pdu_data: Bytes = adu.pdu.into();
        buf.reserve(pdu_data.len());
        buf.put_slice(&pdu_data);
        Ok(())
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<()> {
        let pdu_data: Bytes = adu.pdu.into();
        buf.reserve(pdu_data.len());
        buf.put_slice(&pdu_data);
        Ok(())
    }
}
