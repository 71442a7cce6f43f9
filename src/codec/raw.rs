// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw passthrough framing
//!
//! `[unit id (1 byte)][transaction id (1 byte)][payload]` without any
//! delimiters or checksums. Each decode call consumes the whole buffer
//! as one frame. Only intended for tests and non-Modbus plumbing.

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

const MIN_FRAME_LEN: usize = 3;

/// Codec for the client side of a raw connection.
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

/// Codec for the server side of a raw connection.
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

fn split_frame(buf: &mut BytesMut) -> Option<(Header, Bytes)> {
    if buf.len() < MIN_FRAME_LEN {
        return None;
    }
    let prefix = buf.split_to(2);
    let hdr = Header::new(u16::from(prefix[1]), prefix[0]);
    let pdu_data = buf.split().freeze();
    Some((hdr, pdu_data))
}

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseAdu>> {
        let Some((hdr, pdu_data)) = split_frame(buf) else {
            return Ok(None);
        };
        let pdu = self.registry.decode_response(pdu_data)?;
        Ok(Some(ResponseAdu { hdr, pdu }))
    }
}

impl Decoder for ServerCodec {
    type Item = RequestAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestAdu>> {
        let Some((hdr, pdu_data)) = split_frame(buf) else {
            return Ok(None);
        };
        let request = self.registry.decode_request(pdu_data)?;
        Ok(Some(RequestAdu {
            hdr,
            pdu: request.into(),
        }))
    }
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> Result<()> {
        let RequestAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        buf.reserve(2 + pdu_data.len());
        buf.put_u8(hdr.unit_id);
        buf.put_u8((hdr.transaction_id & 0xFF) as u8);
        buf.put_slice(&pdu_data);
        Ok(())
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<()> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        buf.reserve(2 + pdu_data.len());
        buf.put_u8(hdr.unit_id);
        buf.put_u8((hdr.transaction_id & 0xFF) as u8);
        buf.put_slice(&pdu_data);
        Ok(())
    }
}
