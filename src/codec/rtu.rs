// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU framing
//!
//! An RTU frame has no start or end delimiter, only a trailing CRC:
//! the expected frame size is derived from the function code through the
//! PDU registry. A frame that fails the CRC check drops one byte and
//! rescans (hunting mode) until a valid frame or the end of the buffer
//! is reached.

use std::{
    io::{Cursor, Error, ErrorKind, Result},
    sync::Arc,
};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::registry::PduRegistry,
    frame::{Header, RequestAdu, ResponseAdu},
    slave::SlaveId,
};

// [Modbus over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a Modbus RTU frame is 256 bytes."
const MAX_FRAME_LEN: usize = 256;

type DroppedBytes = SmallVec<[u8; MAX_FRAME_LEN]>;

#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    dropped_bytes: DroppedBytes,
}

impl FrameDecoder {
    pub(crate) fn decode(
        &mut self,
        buf: &mut BytesMut,
        pdu_len: usize,
    ) -> Result<Option<(SlaveId, Bytes)>> {
        const CRC_BYTE_COUNT: usize = 2;

        let adu_len = 1 + pdu_len;

        if buf.len() < adu_len + CRC_BYTE_COUNT {
            // Incomplete frame
            return Ok(None);
        }

        let mut adu_buf = buf.split_to(adu_len);
        let crc_buf = buf.split_to(CRC_BYTE_COUNT);

        // Read trailing CRC and verify ADU
        let crc_result = Cursor::new(&crc_buf)
            .read_u16::<BigEndian>()
            .and_then(|crc| check_crc(&adu_buf, crc));

        if let Err(err) = crc_result {
            // CRC is invalid - restore the input buffer
            let rem_buf = buf.split();
            debug_assert!(buf.is_empty());
            buf.unsplit(adu_buf);
            buf.unsplit(crc_buf);
            buf.unsplit(rem_buf);

            return Err(err);
        }

        if !self.dropped_bytes.is_empty() {
            log::warn!(
                "Successfully decoded frame after dropping {} byte(s): {:X?}",
                self.dropped_bytes.len(),
                self.dropped_bytes
            );
            self.dropped_bytes.clear();
        }
        let slave_id = adu_buf.split_to(1)[0];
        let pdu_data = adu_buf.freeze();

        Ok(Some((slave_id, pdu_data)))
    }

    pub(crate) fn recover_on_error(&mut self, buf: &mut BytesMut) {
        // If decoding failed the buffer cannot be empty
        debug_assert!(!buf.is_empty());
        // Skip and record the first byte of the buffer
        {
            let first = buf.first().unwrap();
            log::debug!("Dropped first byte: {:X?}", first);
            if self.dropped_bytes.len() >= MAX_FRAME_LEN {
                log::error!(
                    "Giving up to decode frame after dropping {} byte(s): {:X?}",
                    self.dropped_bytes.len(),
                    self.dropped_bytes
                );
                self.dropped_bytes.clear();
            }
            self.dropped_bytes.push(*first);
        }
        buf.advance(1);
    }
}

/// Decoder half of the RTU client codec, consuming response frames.
#[derive(Debug, Default)]
pub struct ClientCodec {
    frame_decoder: FrameDecoder,
    registry: Arc<PduRegistry>,
}

impl ClientCodec {
    #[must_use]
    pub fn new(registry: Arc<PduRegistry>) -> Self {
        Self {
            frame_decoder: FrameDecoder::default(),
            registry,
        }
    }
}

/// Decoder half of the RTU server codec, consuming request frames.
#[derive(Debug, Default)]
pub struct ServerCodec {
    frame_decoder: FrameDecoder,
    registry: Arc<PduRegistry>,
}

impl ServerCodec {
    #[must_use]
    pub fn new(registry: Arc<PduRegistry>) -> Self {
        Self {
            frame_decoder: FrameDecoder::default(),
            registry,
        }
    }
}

fn decode<F>(
    pdu_type: &str,
    frame_decoder: &mut FrameDecoder,
    get_pdu_len: F,
    buf: &mut BytesMut,
) -> Result<Option<(SlaveId, Bytes)>>
where
    F: Fn(&[u8]) -> Result<Option<usize>>,
{
    // Each iteration either produces a result or drops one leading byte,
    // so the scan is bounded by the frame size limit.
    for _ in 0..=MAX_FRAME_LEN {
        if buf.len() < 2 {
            // Wait for at least the slave address and the function code
            return Ok(None);
        }
        let result = get_pdu_len(&buf[1..]).and_then(|pdu_len| {
            let Some(pdu_len) = pdu_len else {
                // Incomplete frame
                return Ok(None);
            };
            frame_decoder.decode(buf, pdu_len)
        });

        if let Err(err) = result {
            log::warn!("Failed to decode {pdu_type} frame: {err}");
            frame_decoder.recover_on_error(buf);
            continue;
        }

        return result;
    }

    // The scan limit is only reachable with a buffer full of garbage.
    // Whatever is left is reconsidered when more data arrives.
    Ok(None)
}

pub(crate) fn calc_crc(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            let crc_odd = (crc & 0x0001) != 0;
            crc >>= 1;
            if crc_odd {
                crc ^= 0xA001;
            }
        }
    }
    crc << 8 | crc >> 8
}

fn check_crc(adu_data: &[u8], expected_crc: u16) -> Result<()> {
    let actual_crc = calc_crc(adu_data);
    if expected_crc != actual_crc {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("Invalid CRC: expected = 0x{expected_crc:0>4X}, actual = 0x{actual_crc:0>4X}"),
        ));
    }
    Ok(())
}

impl Decoder for ClientCodec {
    type Item = ResponseAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ResponseAdu>> {
        let registry = Arc::clone(&self.registry);
        loop {
            let Some((slave_id, pdu_data)) = decode(
                "response",
                &mut self.frame_decoder,
                |pdu| registry.response_pdu_len(pdu),
                buf,
            )?
            else {
                return Ok(None);
            };

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
    }
}

impl Decoder for ServerCodec {
    type Item = RequestAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestAdu>> {
        let registry = Arc::clone(&self.registry);
        loop {
            let Some((slave_id, pdu_data)) = decode(
                "request",
                &mut self.frame_decoder,
                |pdu| registry.request_pdu_len(pdu),
                buf,
            )?
            else {
                return Ok(None);
            };

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
    }
}

impl Encoder<RequestAdu> for ClientCodec {
    type Error = Error;

    fn encode(&mut self, adu: RequestAdu, buf: &mut BytesMut) -> Result<()> {
        let RequestAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        buf.reserve(pdu_data.len() + 3);
        let start = buf.len();
        buf.put_u8(hdr.unit_id);
        buf.put_slice(&pdu_data);
        let crc = calc_crc(&buf[start..]);
        buf.put_u16(crc);
        Ok(())
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<()> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_data: Bytes = pdu.into();
        buf.reserve(pdu_data.len() + 3);
        let start = buf.len();
        buf.put_u8(hdr.unit_id);
        buf.put_slice(&pdu_data);
        let crc = calc_crc(&buf[start..]);
        buf.put_u16(crc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Request, RequestPdu, Response, ResponsePdu};

    #[test]
    fn test_calc_crc() {
        let msg = [0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(calc_crc(&msg), 0xB663);

        let msg = [0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(calc_crc(&msg), 0xFBF9);

        let msg = [0x01, 0x03, 0x00, 0x00, 0x00, 0x05];
        assert_eq!(calc_crc(&msg), 0x85C9);
    }

    #[test]
    fn crc_of_empty_input_is_the_initial_value() {
        // The byte-swapped emit turns the initial 0xFFFF into itself
        assert_eq!(calc_crc(&[]), 0xFFFF);
    }

    mod client {
        use super::*;

        #[test]
        fn decode_partly_received_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x12, // slave address
                    0x02, // function code
                    0x03, // byte count
                    0x00, // data
                    0x00, // data
                    0x00, // data
                    0x00, // CRC first byte
                          // missing crc second byte
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 7);
        }

        #[test]
        fn decode_empty_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::new();
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(0, buf.len());
        }

        #[test]
        fn decode_single_byte_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(&[0x00][..]);
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(1, buf.len());
        }

        #[test]
        fn decode_rtu_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x01, // slave address
                    0x03, // function code
                    0x04, // byte count
                    0x89, //
                    0x02, //
                    0x42, //
                    0xC7, //
                    0x00, // crc
                    0x9D, // crc
                    0x00,
                ][..],
            );
            let ResponseAdu { hdr, pdu } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(buf.len(), 1);
            assert_eq!(hdr.unit_id, 0x01);
            assert_eq!(hdr.transaction_id, 0);
            if let Ok(Response::ReadHoldingRegisters(data)) = pdu.into() {
                assert_eq!(data, vec![0x8902, 0x42C7]);
            } else {
                panic!("unexpected response")
            }
        }

        #[test]
        fn decode_rtu_response_drop_invalid_bytes() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x42, // dropped byte
                    0x43, // dropped byte
                    0x01, // slave address
                    0x03, // function code
                    0x04, // byte count
                    0x89, //
                    0x02, //
                    0x42, //
                    0xC7, //
                    0x00, // crc
                    0x9D, // crc
                    0x00,
                ][..],
            );
            let ResponseAdu { hdr, pdu } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(buf.len(), 1);
            assert_eq!(hdr.unit_id, 0x01);
            if let Ok(Response::ReadHoldingRegisters(data)) = pdu.into() {
                assert_eq!(data, vec![0x8902, 0x42C7]);
            } else {
                panic!("unexpected response")
            }
        }

        #[test]
        fn decode_exception_message() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x66, //
                    0x82, // exception = 0x80 + 0x02
                    0x03, //
                    0xB1, // crc
                    0x7E, // crc
                ][..],
            );

            let ResponseAdu { pdu, .. } = codec.decode(&mut buf).unwrap().unwrap();
            if let ResponsePdu(Err(err)) = pdu {
                assert_eq!(format!("{err}"), "Modbus function 2: Illegal data value");
                assert_eq!(buf.len(), 0);
            } else {
                panic!("unexpected response")
            }
        }

        #[test]
        fn decode_skips_checksummed_but_undecodable_frames() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x01, // slave address
                    0x05, // function code
                    0x00, // address
                    0x01, //
                    0x12, // invalid coil value
                    0x34, //
                    0x91, // crc
                    0x7D, // crc
                ][..],
            );
            // The frame passes the CRC check but the PDU is malformed:
            // it is dropped, not a connection error.
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert!(buf.is_empty());

            // A valid frame behind a dropped one still decodes
            buf.extend_from_slice(&[0x01, 0x05, 0x00, 0x01, 0x12, 0x34, 0x91, 0x7D]);
            buf.extend_from_slice(&[0x01, 0x05, 0x00, 0x01, 0xFF, 0x00, 0xDD, 0xFA]);
            let ResponseAdu { pdu, .. } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(pdu, ResponsePdu(Ok(Response::WriteSingleCoil(0x01, true))));
            assert!(buf.is_empty());
        }

        #[test]
        fn decode_with_fixed_size_function() {
            let mut codec = ClientCodec::default();
            // Read Exception Status response: fc + status + crc
            let mut buf = BytesMut::from(&[0x01, 0x07, 0x2A, 0xA3, 0xEF][..]);
            let ResponseAdu { pdu, .. } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(pdu, ResponsePdu(Ok(Response::ReadExceptionStatus(0x2A))));
            assert!(buf.is_empty());
        }

        #[test]
        fn encode_read_request() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::new();
            let req = Request::ReadHoldingRegisters(0x082B, 2);
            let adu = RequestAdu {
                hdr: Header::new(0, 0x01),
                pdu: RequestPdu(req),
            };
            codec.encode(adu, &mut buf).unwrap();

            assert_eq!(
                buf,
                Bytes::from_static(&[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02, 0xB6, 0x63])
            );
        }

        #[test]
        fn encode_does_not_checksum_stale_buffer_contents() {
            let mut codec = ClientCodec::default();
            let mut buf = BytesMut::new();
            buf.put_slice(&[0xDE, 0xAD]);
            let adu = RequestAdu {
                hdr: Header::new(0, 0x01),
                pdu: RequestPdu(Request::ReadHoldingRegisters(0x082B, 2)),
            };
            codec.encode(adu, &mut buf).unwrap();
            assert_eq!(
                &buf[2..],
                &[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02, 0xB6, 0x63][..]
            );
        }
    }

    mod server {
        use super::*;

        #[test]
        fn decode_partly_received_request_0x16() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x12, // slave address
                    0x16, // function code
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 2);
        }

        #[test]
        fn decode_partly_received_request_0x0f() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x12, // slave address
                    0x0F, // function code
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 2);
        }

        #[test]
        fn decode_read_request() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87][..]);
            let RequestAdu { hdr, pdu } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(hdr.unit_id, 0x11);
            assert_eq!(pdu, RequestPdu(Request::ReadHoldingRegisters(0x6B, 3)));
            assert!(buf.is_empty());
        }

        #[test]
        fn decode_single_byte_request_frames() {
            let mut codec = ServerCodec::default();
            // Report Slave Id request: slave + fc + crc
            let mut buf = BytesMut::from(&[0x01, 0x11, 0xC0, 0x2C][..]);
            let RequestAdu { pdu, .. } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(pdu, RequestPdu(Request::ReportSlaveId));
        }

        #[test]
        fn decode_skips_checksummed_but_undecodable_requests() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x11, // slave address
                    0x05, // function code
                    0x00, // address
                    0x01, //
                    0x12, // invalid coil value
                    0x34, //
                    0x93, // crc
                    0xED, // crc
                    0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87,
                ][..],
            );
            let RequestAdu { hdr, pdu } = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(hdr.unit_id, 0x11);
            assert_eq!(pdu, RequestPdu(Request::ReadHoldingRegisters(0x6B, 3)));
            assert!(buf.is_empty());
        }

        #[test]
        fn encode_exception_response() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::new();
            let adu = ResponseAdu {
                hdr: Header::new(0, 0x01),
                pdu: ResponsePdu(Err(crate::frame::ExceptionResponse {
                    function: 0x03,
                    exception: crate::frame::Exception::IllegalDataAddress,
                })),
            };
            codec.encode(adu, &mut buf).unwrap();
            assert_eq!(buf, Bytes::from_static(&[0x01, 0x83, 0x02, 0xC0, 0xF1]));
        }
    }
}
