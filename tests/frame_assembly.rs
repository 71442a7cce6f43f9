// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reassembly of fragmented and polluted byte streams.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use modbus_stack::codec;
use modbus_stack::frame::{Header, Request, RequestAdu, RequestPdu};

fn rtu_frame() -> Vec<u8> {
    let mut codec = codec::rtu::ClientCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(
            RequestAdu {
                hdr: Header::new(0, 0x11),
                pdu: RequestPdu(Request::ReadHoldingRegisters(0x6B, 3)),
            },
            &mut buf,
        )
        .unwrap();
    buf.to_vec()
}

fn ascii_frame() -> Vec<u8> {
    b":010300000005F7\r\n".to_vec()
}

fn tcp_frame() -> Vec<u8> {
    let mut codec = codec::tcp::ClientCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(
            RequestAdu {
                hdr: Header::new(7, 0x11),
                pdu: RequestPdu(Request::ReadCoils(1, 1)),
            },
            &mut buf,
        )
        .unwrap();
    buf.to_vec()
}

/// Deliver a frame byte by byte and expect exactly one decode at the end.
fn assert_split_assembly<C>(mut decoder: C, frame: &[u8])
where
    C: Decoder<Item = RequestAdu, Error = std::io::Error>,
{
    let mut buf = BytesMut::new();
    let mut decoded = Vec::new();
    for &byte in frame {
        buf.extend_from_slice(&[byte]);
        if let Some(adu) = decoder.decode(&mut buf).unwrap() {
            decoded.push(adu);
        }
    }
    assert_eq!(decoded.len(), 1);
    assert!(buf.is_empty());
}

#[test]
fn split_frame_assembly() {
    assert_split_assembly(codec::tcp::ServerCodec::default(), &tcp_frame());
    assert_split_assembly(codec::rtu::ServerCodec::default(), &rtu_frame());
    assert_split_assembly(codec::ascii::ServerCodec::default(), &ascii_frame());
}

#[test]
fn rtu_decodes_after_leading_garbage() {
    let mut decoder = codec::rtu::ServerCodec::default();
    let garbage = [0x42u8, 0x13, 0x99, 0xFE, 0x00, 0x77];
    for n in 1..=garbage.len() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&garbage[..n]);
        buf.extend_from_slice(&rtu_frame());
        let before = buf.len();
        let adu = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(adu.pdu, RequestPdu(Request::ReadHoldingRegisters(0x6B, 3)));
        // The skipped prefix and the frame have both been consumed
        assert_eq!(before - buf.len(), n + rtu_frame().len());
        assert!(buf.is_empty());
    }
}

#[test]
fn ascii_decodes_after_leading_garbage() {
    let mut decoder = codec::ascii::ServerCodec::default();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"\x00\xFFnoise");
    buf.extend_from_slice(&ascii_frame());
    let adu = decoder.decode(&mut buf).unwrap().unwrap();
    assert_eq!(
        adu.pdu,
        RequestPdu(Request::ReadHoldingRegisters(0x0000, 5))
    );
    assert!(buf.is_empty());
}

#[test]
fn concatenated_frames_decode_one_by_one() {
    // TCP
    let mut decoder = codec::tcp::ServerCodec::default();
    let mut buf = BytesMut::new();
    for _ in 0..3 {
        buf.extend_from_slice(&tcp_frame());
    }
    for _ in 0..3 {
        assert!(decoder.decode(&mut buf).unwrap().is_some());
    }
    assert!(decoder.decode(&mut buf).unwrap().is_none());
    assert!(buf.is_empty());

    // RTU
    let mut decoder = codec::rtu::ServerCodec::default();
    let mut buf = BytesMut::new();
    for _ in 0..3 {
        buf.extend_from_slice(&rtu_frame());
    }
    for _ in 0..3 {
        assert!(decoder.decode(&mut buf).unwrap().is_some());
    }
    assert!(decoder.decode(&mut buf).unwrap().is_none());
    assert!(buf.is_empty());
}

#[test]
fn rtu_bad_crc_enters_hunting_mode() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut decoder = codec::rtu::ServerCodec::default();
    let mut corrupted = rtu_frame();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;

    let mut buf = BytesMut::new();
    buf.extend_from_slice(&corrupted);
    buf.extend_from_slice(&rtu_frame());
    // The corrupted frame is skipped byte by byte, the valid frame
    // behind it still decodes.
    let adu = decoder.decode(&mut buf).unwrap().unwrap();
    assert_eq!(adu.pdu, RequestPdu(Request::ReadHoldingRegisters(0x6B, 3)));
}
