// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus ASCII framing
//!
//! Frames are transferred as plain text: a `:` start delimiter, the
//! hex-encoded unit id, PDU and LRC checksum, and a CRLF end delimiter.
//! Anything before the start delimiter is discarded, frames with an
//! invalid checksum or broken hex encoding are skipped silently.

use std::{
    io::{Error, Result},
    sync::Arc,
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::registry::PduRegistry,
    frame::{Header, RequestAdu, ResponseAdu},
    slave::SlaveId,
};

const FRAME_START: u8 = b':';
const FRAME_END: &[u8] = b"\r\n";

// Start delimiter + hex-encoded unit id, maximum PDU and LRC + CRLF
const MAX_FRAME_LEN: usize = 1 + 2 * (1 + 253 + 1) + 2;

/// The 8 bit longitudinal redundancy check: the two's complement of the
/// byte sum.
pub(crate) fn compute_lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |lrc, byte| lrc.wrapping_add(*byte))
        .wrapping_neg()
}

fn decode_frame(buf: &mut BytesMut) -> Option<(SlaveId, Bytes)> {
    loop {
        let Some(start) = buf.iter().position(|&byte| byte == FRAME_START) else {
            // No frame start in sight, everything buffered is noise
            if !buf.is_empty() {
                log::debug!("Skipping {} byte(s) without frame start", buf.len());
                buf.clear();
            }
            return None;
        };
        if start > 0 {
            log::debug!("Skipping {start} byte(s) before frame start");
            buf.advance(start);
        }

        let Some(end) = buf.windows(2).position(|window| window == FRAME_END) else {
            if buf.len() > MAX_FRAME_LEN {
                // Runaway frame, drop the start delimiter and rescan
                buf.advance(1);
                continue;
            }
            // Incomplete frame
            return None;
        };

        let frame_len = end + 2;
        let msg = hex::decode(&buf[1..end]);
        buf.advance(frame_len);

        match msg {
            Ok(msg) if msg.len() >= 3 => {
                let (payload, lrc) = msg.split_at(msg.len() - 1);
                if compute_lrc(payload) != lrc[0] {
                    log::warn!(
                        "Invalid LRC: expected = 0x{:0>2X}, actual = 0x{:0>2X}",
                        lrc[0],
                        compute_lrc(payload)
                    );
                    continue;
                }
                let slave_id = payload[0];
                let pdu_data = Bytes::copy_from_slice(&payload[1..]);
                return Some((slave_id, pdu_data));
            }
            _ => {
                log::warn!("Skipping frame with broken hex encoding");
                continue;
            }
        }
    }
}

fn encode_frame(buf: &mut BytesMut, slave_id: SlaveId, pdu_data: &[u8]) {
    let mut msg = Vec::with_capacity(2 + pdu_data.len());
    msg.push(slave_id);
    msg.extend_from_slice(pdu_data);
    msg.push(compute_lrc(&msg));

    let body = hex::encode_upper(&msg);
    buf.reserve(3 + body.len());
    buf.put_u8(FRAME_START);
    buf.put_slice(body.as_bytes());
    buf.put_slice(FRAME_END);
}

/// Codec for the client side of a Modbus ASCII connection.
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

/// Codec for the server side of a Modbus ASCII connection.
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
        while let Some((slave_id, pdu_data)) = decode_frame(buf) {
            match self.registry.decode_response(pdu_data) {
                Ok(pdu) => {
                    let hdr = Header::new(0, slave_id);
                    return Ok(Some(ResponseAdu { hdr, pdu }));
                }
                Err(err) => {
                    // Checksummed but undecodable, skip the frame
                    log::warn!("Failed to decode response PDU: {err}");
                }
            }
        }
        Ok(None)
    }
}

impl Decoder for ServerCodec {
    type Item = RequestAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestAdu>> {
        while let Some((slave_id, pdu_data)) = decode_frame(buf) {
            match self.registry.decode_request(pdu_data) {
                Ok(request) => {
                    let hdr = Header::new(0, slave_id);
                    return Ok(Some(RequestAdu {
                        hdr,
                        pdu: request.into(),
                    }));
                }
                Err(err) => {
                    // Checksummed but undecodable, skip the frame
                    log::warn!("Failed to decode request PDU: {err}");
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> Result<()> {
        let RequestAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_frame(buf, hdr.unit_id, &pdu_data);
        Ok(())
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<()> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        encode_frame(buf, hdr.unit_id, &pdu_data);
        Ok(())
    }
}
