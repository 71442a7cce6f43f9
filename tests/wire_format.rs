// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bit-exact frame encodings against reference byte sequences.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use modbus_stack::codec;
use modbus_stack::frame::{
    Exception, ExceptionResponse, Header, Request, RequestAdu, RequestPdu, Response, ResponseAdu,
    ResponsePdu,
};

fn encode_tcp_request(request: Request, tid: u16, unit: u8) -> BytesMut {
    let mut codec = codec::tcp::ClientCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(
            RequestAdu {
                hdr: Header::new(tid, unit),
                pdu: RequestPdu(request),
            },
            &mut buf,
        )
        .unwrap();
    buf
}

fn encode_tcp_response(response: ResponsePdu, tid: u16, unit: u8) -> BytesMut {
    let mut codec = codec::tcp::ServerCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(
            ResponseAdu {
                hdr: Header::new(tid, unit),
                pdu: response,
            },
            &mut buf,
        )
        .unwrap();
    buf
}

#[test]
fn tcp_read_coils_request() {
    let buf = encode_tcp_request(Request::ReadCoils(1, 1), 0, 1);
    assert_eq!(
        &buf[..],
        &[0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x01, 0x00, 0x01]
    );
}

#[test]
fn tcp_read_coils_response() {
    let coils = vec![true, false, false, false, false, false, false, false];
    let buf = encode_tcp_response(ResponsePdu(Ok(Response::ReadCoils(coils))), 0, 1);
    assert_eq!(
        &buf[..],
        &[0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01]
    );
}

#[test]
fn tcp_write_single_coil_echo() {
    let request = encode_tcp_request(Request::WriteSingleCoil(1, true), 0, 1);
    assert_eq!(&request[6..], &[0x01, 0x05, 0x00, 0x01, 0xFF, 0x00]);

    let response = encode_tcp_response(ResponsePdu(Ok(Response::WriteSingleCoil(1, true))), 0, 1);
    // The response payload is identical to the request payload
    assert_eq!(&response[..], &request[..]);
}

#[test]
fn tcp_write_multiple_coils_alternating_bits() {
    let bits = vec![true, false, true, false, true, false, true, false, true, false];
    let request = encode_tcp_request(Request::WriteMultipleCoils(0, bits), 0, 1);
    assert_eq!(
        &request[6..],
        &[0x01, 0x0F, 0x00, 0x00, 0x00, 0x0A, 0x02, 0x55, 0x01]
    );

    let response =
        encode_tcp_response(ResponsePdu(Ok(Response::WriteMultipleCoils(0, 10))), 0, 1);
    assert_eq!(&response[6..], &[0x01, 0x0F, 0x00, 0x00, 0x00, 0x0A]);
}

#[test]
fn tcp_exception_response() {
    let response = encode_tcp_response(
        ResponsePdu(Err(ExceptionResponse {
            function: 0x03,
            exception: Exception::IllegalDataAddress,
        })),
        0,
        1,
    );
    assert_eq!(
        &response[..],
        &[0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02]
    );
}

#[test]
fn rtu_request_carries_the_crc() {
    let mut codec = codec::rtu::ClientCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(
            RequestAdu {
                hdr: Header::new(0, 0x01),
                pdu: RequestPdu(Request::ReadHoldingRegisters(0x0000, 5)),
            },
            &mut buf,
        )
        .unwrap();
    assert_eq!(&buf[..], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x05, 0x85, 0xC9]);
}

#[test]
fn ascii_request_carries_the_lrc() {
    let mut codec = codec::ascii::ClientCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(
            RequestAdu {
                hdr: Header::new(0, 0x01),
                pdu: RequestPdu(Request::ReadHoldingRegisters(0x0000, 5)),
            },
            &mut buf,
        )
        .unwrap();
    // LRC = (-(0x01 + 0x03 + 0x00 + 0x00 + 0x00 + 0x05)) & 0xFF = 0xF7
    assert_eq!(&buf[..], b":010300000005F7\r\n");
}

#[test]
fn registered_custom_functions_frame_on_rtu() {
    use std::sync::Arc;

    use modbus_stack::codec::registry::{CustomFunction, FrameLen, PduRegistry};

    let mut registry = PduRegistry::new();
    registry
        .register(CustomFunction {
            function_code: 0x41,
            sub_function: None,
            request_len: FrameLen::Fixed(3),
            response_len: FrameLen::Fixed(3),
            decode_request: Arc::new(|pdu| Ok(Request::Custom(pdu[0], pdu[1..].to_vec()))),
            decode_response: Arc::new(|pdu| Ok(Response::Custom(pdu[0], pdu[1..].to_vec()))),
        })
        .unwrap();

    let mut server = codec::rtu::ServerCodec::default();
    let mut buf = BytesMut::new();
    server
        .encode(
            ResponseAdu {
                hdr: Header::new(0, 0x01),
                pdu: ResponsePdu(Ok(Response::Custom(0x41, vec![0xAB, 0xCD]))),
            },
            &mut buf,
        )
        .unwrap();

    // A client without the registration cannot frame the response: the
    // length of function code 0x41 is unknown, so the bytes are hunted
    // through without producing a frame.
    let mut plain = codec::rtu::ClientCodec::default();
    assert!(plain.decode(&mut buf.clone()).unwrap().is_none());

    let mut custom = codec::rtu::ClientCodec::new(Arc::new(registry));
    let adu = custom.decode(&mut buf).unwrap().unwrap();
    assert_eq!(adu.pdu, ResponsePdu(Ok(Response::Custom(0x41, vec![0xAB, 0xCD]))));
}

#[test]
fn every_framer_round_trips_its_own_frames() {
    let request = Request::ReadHoldingRegisters(0x082B, 2);

    let mut client = codec::tcp::ClientCodec::default();
    let mut server = codec::tcp::ServerCodec::default();
    let mut buf = BytesMut::new();
    client
        .encode(
            RequestAdu {
                hdr: Header::new(0x2A, 0x11),
                pdu: RequestPdu(request.clone()),
            },
            &mut buf,
        )
        .unwrap();
    let frame_len = buf.len();
    let adu = server.decode(&mut buf).unwrap().unwrap();
    assert!(buf.is_empty(), "decode consumed {frame_len} bytes");
    assert_eq!(adu.hdr, Header::new(0x2A, 0x11));
    assert_eq!(adu.pdu, RequestPdu(request.clone()));

    let mut client = codec::rtu::ClientCodec::default();
    let mut server = codec::rtu::ServerCodec::default();
    let mut buf = BytesMut::new();
    client
        .encode(
            RequestAdu {
                hdr: Header::new(0, 0x11),
                pdu: RequestPdu(request.clone()),
            },
            &mut buf,
        )
        .unwrap();
    let adu = server.decode(&mut buf).unwrap().unwrap();
    assert!(buf.is_empty());
    assert_eq!(adu.hdr, Header::new(0, 0x11));
    assert_eq!(adu.pdu, RequestPdu(request.clone()));

    let mut client = codec::ascii::ClientCodec::default();
    let mut server = codec::ascii::ServerCodec::default();
    let mut buf = BytesMut::new();
    client
        .encode(
            RequestAdu {
                hdr: Header::new(0, 0x11),
                pdu: RequestPdu(request.clone()),
            },
            &mut buf,
        )
        .unwrap();
    let adu = server.decode(&mut buf).unwrap().unwrap();
    assert!(buf.is_empty());
    assert_eq!(adu.hdr, Header::new(0, 0x11));
    assert_eq!(adu.pdu, RequestPdu(request.clone()));

    let mut client = codec::tls::ClientCodec::default();
    let mut server = codec::tls::ServerCodec::default();
    let mut buf = BytesMut::new();
    client
        .encode(
            RequestAdu {
                hdr: Header::new(0, 0),
                pdu: RequestPdu(request.clone()),
            },
            &mut buf,
        )
        .unwrap();
    let adu = server.decode(&mut buf).unwrap().unwrap();
    assert!(buf.is_empty());
    assert_eq!(adu.pdu, RequestPdu(request.clone()));

    let mut client = codec::raw::ClientCodec::default();
    let mut server = codec::raw::ServerCodec::default();
    let mut buf = BytesMut::new();
    client
        .encode(
            RequestAdu {
                hdr: Header::new(0x17, 0x2A),
                pdu: RequestPdu(request.clone()),
            },
            &mut buf,
        )
        .unwrap();
    let adu = server.decode(&mut buf).unwrap().unwrap();
    assert!(buf.is_empty());
    assert_eq!(adu.hdr, Header::new(0x17, 0x2A));
    assert_eq!(adu.pdu, RequestPdu(request));
}
