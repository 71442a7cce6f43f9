// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encoding and decoding of protocol data units
//!
//! The submodules frame byte streams for the individual transports. This
//! module holds the transport independent PDU layer: the bidirectional
//! mapping between the typed [`Request`]/[`Response`] values and their wire
//! representation.

pub mod ascii;

pub mod raw;

pub mod registry;

pub mod rtu;

pub mod tcp;

pub mod tls;

use std::convert::TryFrom;
use std::io::{self, Cursor, Error, ErrorKind, Read as _};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use crate::frame::{mei::READ_DEVICE_ID, *};

impl From<Request> for Bytes {
    fn from(req: Request) -> Bytes {
        let cnt = request_byte_count(&req);
        let mut data = BytesMut::with_capacity(cnt);
        use crate::frame::Request::*;
        data.put_u8(req.function_code());
        match req {
            ReadCoils(address, quantity)
            | ReadDiscreteInputs(address, quantity)
            | ReadInputRegisters(address, quantity)
            | ReadHoldingRegisters(address, quantity) => {
                data.put_u16(address);
                data.put_u16(quantity);
            }
            WriteSingleCoil(address, state) => {
                data.put_u16(address);
                data.put_u16(bool_to_coil(state));
            }
            WriteMultipleCoils(address, coils) => {
                data.put_u16(address);
                data.put_u16(u16_len(coils.len()));
                let packed_coils = pack_coils(&coils);
                data.put_u8(u8_len(packed_coils.len()));
                for b in packed_coils {
                    data.put_u8(b);
                }
            }
            WriteSingleRegister(address, word) => {
                data.put_u16(address);
                data.put_u16(word);
            }
            WriteMultipleRegisters(address, words) => {
                data.put_u16(address);
                data.put_u16(u16_len(words.len()));
                data.put_u8(u8_len(words.len() * 2));
                for w in words {
                    data.put_u16(w);
                }
            }
            MaskWriteRegister(address, and_mask, or_mask) => {
                data.put_u16(address);
                data.put_u16(and_mask);
                data.put_u16(or_mask);
            }
            ReadWriteMultipleRegisters(read_address, quantity, write_address, words) => {
                data.put_u16(read_address);
                data.put_u16(quantity);
                data.put_u16(write_address);
                data.put_u16(u16_len(words.len()));
                data.put_u8(u8_len(words.len() * 2));
                for w in words {
                    data.put_u16(w);
                }
            }
            ReadExceptionStatus | GetCommEventCounter | GetCommEventLog | ReportSlaveId => (),
            Diagnostics(sub, words) => {
                data.put_u16(sub.code());
                for w in words {
                    data.put_u16(w);
                }
            }
            ReadFileRecord(refs) => {
                data.put_u8(u8_len(refs.len() * 7));
                for r in refs {
                    data.put_u8(FILE_REFERENCE_TYPE);
                    data.put_u16(r.file_number);
                    data.put_u16(r.record_number);
                    data.put_u16(r.record_length);
                }
            }
            WriteFileRecord(records) => {
                let total: usize = records.iter().map(|r| 7 + r.record_data.len()).sum();
                data.put_u8(u8_len(total));
                for r in records {
                    data.put_u8(FILE_REFERENCE_TYPE);
                    data.put_u16(r.file_number);
                    data.put_u16(r.record_number);
                    data.put_u16(r.record_length());
                    data.put_slice(&r.record_data);
                }
            }
            ReadFifoQueue(address) => {
                data.put_u16(address);
            }
            ReadDeviceInformation(read_code, object_id) => {
                data.put_u8(READ_DEVICE_ID);
                data.put_u8(read_code as u8);
                data.put_u8(object_id);
            }
            Custom(_, custom_data) => {
                data.put_slice(&custom_data);
            }
        }
        data.freeze()
    }
}

impl From<RequestPdu> for Bytes {
    fn from(pdu: RequestPdu) -> Bytes {
        pdu.0.into()
    }
}

impl From<Response> for Bytes {
    fn from(rsp: Response) -> Bytes {
        let cnt = response_byte_count(&rsp);
        let mut data = BytesMut::with_capacity(cnt);
        use crate::frame::Response::*;
        data.put_u8(rsp.function_code());
        match rsp {
            ReadCoils(coils) | ReadDiscreteInputs(coils) => {
                let packed_coils = pack_coils(&coils);
                data.put_u8(u8_len(packed_coils.len()));
                for b in packed_coils {
                    data.put_u8(b);
                }
            }
            ReadInputRegisters(registers)
            | ReadHoldingRegisters(registers)
            | ReadWriteMultipleRegisters(registers) => {
                data.put_u8(u8_len(registers.len() * 2));
                for r in registers {
                    data.put_u16(r);
                }
            }
            WriteSingleCoil(address, state) => {
                data.put_u16(address);
                data.put_u16(bool_to_coil(state));
            }
            WriteMultipleCoils(address, quantity) | WriteMultipleRegisters(address, quantity) => {
                data.put_u16(address);
                data.put_u16(quantity);
            }
            WriteSingleRegister(address, word) => {
                data.put_u16(address);
                data.put_u16(word);
            }
            MaskWriteRegister(address, and_mask, or_mask) => {
                data.put_u16(address);
                data.put_u16(and_mask);
                data.put_u16(or_mask);
            }
            ReadExceptionStatus(status) => {
                data.put_u8(status);
            }
            Diagnostics(sub, words) => {
                data.put_u16(sub.code());
                for w in words {
                    data.put_u16(w);
                }
            }
            GetCommEventCounter(status, event_count) => {
                data.put_u16(if status { STATUS_READY } else { STATUS_WAITING });
                data.put_u16(event_count);
            }
            GetCommEventLog(log) => {
                data.put_u8(u8_len(6 + log.events.len()));
                data.put_u16(if log.status { STATUS_READY } else { STATUS_WAITING });
                data.put_u16(log.event_count);
                data.put_u16(log.message_count);
                data.put_slice(&log.events);
            }
            ReportSlaveId(identifier, run_status) => {
                data.put_u8(u8_len(identifier.len() + 1));
                data.put_slice(&identifier);
                data.put_u8(if run_status { SLAVE_ON } else { SLAVE_OFF });
            }
            ReadFileRecord(records) => {
                let total: usize = records.iter().map(|r| 2 + r.len()).sum();
                data.put_u8(u8_len(total));
                for r in records {
                    data.put_u8(u8_len(r.len() + 1));
                    data.put_u8(FILE_REFERENCE_TYPE);
                    data.put_slice(&r);
                }
            }
            WriteFileRecord(records) => {
                let total: usize = records.iter().map(|r| 7 + r.record_data.len()).sum();
                data.put_u8(u8_len(total));
                for r in records {
                    data.put_u8(FILE_REFERENCE_TYPE);
                    data.put_u16(r.file_number);
                    data.put_u16(r.record_number);
                    data.put_u16(r.record_length());
                    data.put_slice(&r.record_data);
                }
            }
            ReadFifoQueue(words) => {
                data.put_u16(u16_len(2 + words.len() * 2));
                data.put_u16(u16_len(words.len()));
                for w in words {
                    data.put_u16(w);
                }
            }
            ReadDeviceInformation(info) => {
                data.put_u8(READ_DEVICE_ID);
                data.put_u8(info.read_code as u8);
                data.put_u8(info.conformity);
                data.put_u8(if info.more_follows { 0xFF } else { 0x00 });
                data.put_u8(info.next_object_id);
                data.put_u8(u8_len(info.objects.len()));
                for (object_id, value) in info.objects {
                    data.put_u8(object_id);
                    data.put_u8(u8_len(value.len()));
                    data.put_slice(&value);
                }
            }
            Custom(_, custom_data) => {
                data.put_slice(&custom_data);
            }
        }
        data.freeze()
    }
}

impl From<ExceptionResponse> for Bytes {
    fn from(ex: ExceptionResponse) -> Bytes {
        let mut data = BytesMut::with_capacity(2);
        debug_assert!(ex.function < 0x80);
        data.put_u8(ex.function + 0x80);
        data.put_u8(ex.exception as u8);
        data.freeze()
    }
}

impl From<ResponsePdu> for Bytes {
    fn from(pdu: ResponsePdu) -> Bytes {
        pdu.0.map_or_else(Into::into, Into::into)
    }
}

impl TryFrom<Bytes> for Request {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Request::*;
        let mut rdr = Cursor::new(&bytes);
        let fn_code = rdr.read_u8()?;
        let req = match fn_code {
            0x01 => ReadCoils(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?),
            0x02 => ReadDiscreteInputs(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?),
            0x03 => {
                ReadHoldingRegisters(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?)
            }
            0x04 => ReadInputRegisters(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?),
            0x05 => WriteSingleCoil(
                rdr.read_u16::<BigEndian>()?,
                coil_to_bool(rdr.read_u16::<BigEndian>()?)?,
            ),
            0x06 => WriteSingleRegister(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?),
            0x07 => ReadExceptionStatus,
            0x08 => {
                let sub = SubFunction::from(rdr.read_u16::<BigEndian>()?);
                let words = read_remaining_words(&mut rdr, &bytes)?;
                Diagnostics(sub, words)
            }
            0x0B => GetCommEventCounter,
            0x0C => GetCommEventLog,
            0x0F => {
                let address = rdr.read_u16::<BigEndian>()?;
                let quantity = rdr.read_u16::<BigEndian>()?;
                let byte_count = rdr.read_u8()?;
                if usize::from(byte_count) != packed_coils_len(usize::from(quantity))
                    || bytes.len() < 6 + usize::from(byte_count)
                {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                WriteMultipleCoils(address, unpack_coils(&bytes[6..], quantity))
            }
            0x10 => {
                let address = rdr.read_u16::<BigEndian>()?;
                let quantity = rdr.read_u16::<BigEndian>()?;
                let byte_count = rdr.read_u8()?;
                if usize::from(byte_count) != usize::from(quantity) * 2
                    || bytes.len() < 6 + usize::from(byte_count)
                {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let mut data = Vec::with_capacity(quantity.into());
                for _ in 0..quantity {
                    data.push(rdr.read_u16::<BigEndian>()?);
                }
                WriteMultipleRegisters(address, data)
            }
            0x11 => ReportSlaveId,
            0x14 => {
                let byte_count = rdr.read_u8()?;
                if byte_count % 7 != 0 || bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let mut refs = Vec::with_capacity(usize::from(byte_count) / 7);
                for _ in 0..byte_count / 7 {
                    read_file_reference_type(&mut rdr)?;
                    refs.push(FileSubRequest {
                        file_number: rdr.read_u16::<BigEndian>()?,
                        record_number: rdr.read_u16::<BigEndian>()?,
                        record_length: rdr.read_u16::<BigEndian>()?,
                    });
                }
                ReadFileRecord(refs)
            }
            0x15 => {
                let byte_count = rdr.read_u8()?;
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let mut records = Vec::new();
                let end = 2 + u64::from(byte_count);
                while rdr.position() < end {
                    read_file_reference_type(&mut rdr)?;
                    let file_number = rdr.read_u16::<BigEndian>()?;
                    let record_number = rdr.read_u16::<BigEndian>()?;
                    let record_length = rdr.read_u16::<BigEndian>()?;
                    let mut record_data = vec![0u8; usize::from(record_length) * 2];
                    rdr.read_exact(&mut record_data)?;
                    records.push(FileRecord {
                        file_number,
                        record_number,
                        record_data,
                    });
                }
                WriteFileRecord(records)
            }
            0x16 => MaskWriteRegister(
                rdr.read_u16::<BigEndian>()?,
                rdr.read_u16::<BigEndian>()?,
                rdr.read_u16::<BigEndian>()?,
            ),
            0x17 => {
                let read_address = rdr.read_u16::<BigEndian>()?;
                let read_quantity = rdr.read_u16::<BigEndian>()?;
                let write_address = rdr.read_u16::<BigEndian>()?;
                let write_quantity = rdr.read_u16::<BigEndian>()?;
                let byte_count = rdr.read_u8()?;
                if usize::from(byte_count) != usize::from(write_quantity) * 2
                    || bytes.len() < 10 + usize::from(byte_count)
                {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let mut data = Vec::with_capacity(write_quantity.into());
                for _ in 0..write_quantity {
                    data.push(rdr.read_u16::<BigEndian>()?);
                }
                ReadWriteMultipleRegisters(read_address, read_quantity, write_address, data)
            }
            0x18 => ReadFifoQueue(rdr.read_u16::<BigEndian>()?),
            0x2B => {
                let mei_type = rdr.read_u8()?;
                if mei_type != READ_DEVICE_ID {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        format!("Unsupported MEI type: 0x{mei_type:0>2X}"),
                    ));
                }
                let read_code = ReadDeviceCode::new(rdr.read_u8()?).ok_or_else(|| {
                    Error::new(ErrorKind::InvalidData, "Invalid device read code")
                })?;
                ReadDeviceInformation(read_code, rdr.read_u8()?)
            }
            fn_code if fn_code < 0x80 => Custom(fn_code, bytes[1..].into()),
            fn_code => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("Invalid function code: 0x{fn_code:0>2X}"),
                ));
            }
        };
        Ok(req)
    }
}

impl TryFrom<Bytes> for RequestPdu {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let pdu = Request::try_from(bytes)?.into();
        Ok(pdu)
    }
}

impl TryFrom<Bytes> for Response {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Response::*;
        let mut rdr = Cursor::new(&bytes);
        let fn_code = rdr.read_u8()?;
        let rsp = match fn_code {
            0x01 | 0x02 => {
                let byte_count = rdr.read_u8()?;
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                // The response does not carry the requested quantity, so
                // all bits of the transferred bytes are unpacked.
                let quantity = u16::from(byte_count) * 8;
                let coils = unpack_coils(&bytes[2..], quantity);
                if fn_code == 0x01 {
                    ReadCoils(coils)
                } else {
                    ReadDiscreteInputs(coils)
                }
            }
            0x03 | 0x04 | 0x17 => {
                let byte_count = rdr.read_u8()?;
                let quantity = u16::from(byte_count) / 2;
                let mut data = Vec::with_capacity(quantity.into());
                for _ in 0..quantity {
                    data.push(rdr.read_u16::<BigEndian>()?);
                }
                match fn_code {
                    0x03 => ReadHoldingRegisters(data),
                    0x04 => ReadInputRegisters(data),
                    _ => ReadWriteMultipleRegisters(data),
                }
            }
            0x05 => WriteSingleCoil(
                rdr.read_u16::<BigEndian>()?,
                coil_to_bool(rdr.read_u16::<BigEndian>()?)?,
            ),
            0x06 => WriteSingleRegister(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?),
            0x07 => ReadExceptionStatus(rdr.read_u8()?),
            0x08 => {
                let sub = SubFunction::from(rdr.read_u16::<BigEndian>()?);
                let words = read_remaining_words(&mut rdr, &bytes)?;
                Diagnostics(sub, words)
            }
            0x0B => {
                let status = rdr.read_u16::<BigEndian>()?;
                GetCommEventCounter(status == STATUS_READY, rdr.read_u16::<BigEndian>()?)
            }
            0x0C => {
                let byte_count = rdr.read_u8()?;
                if byte_count < 6 || bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let status = rdr.read_u16::<BigEndian>()? == STATUS_READY;
                let event_count = rdr.read_u16::<BigEndian>()?;
                let message_count = rdr.read_u16::<BigEndian>()?;
                let events = bytes[8..2 + usize::from(byte_count)].to_vec();
                GetCommEventLog(CommEventLog {
                    status,
                    event_count,
                    message_count,
                    events,
                })
            }
            0x0F => WriteMultipleCoils(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?),
            0x10 => {
                WriteMultipleRegisters(rdr.read_u16::<BigEndian>()?, rdr.read_u16::<BigEndian>()?)
            }
            0x11 => {
                let byte_count = rdr.read_u8()?;
                if byte_count == 0 || bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let identifier = bytes[2..1 + usize::from(byte_count)].to_vec();
                let run_status = bytes[1 + usize::from(byte_count)] == SLAVE_ON;
                ReportSlaveId(identifier, run_status)
            }
            0x14 => {
                let byte_count = rdr.read_u8()?;
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let mut records = Vec::new();
                let end = 2 + u64::from(byte_count);
                while rdr.position() < end {
                    let record_length = rdr.read_u8()?;
                    if record_length == 0 {
                        return Err(Error::new(ErrorKind::InvalidData, "Invalid record length"));
                    }
                    read_file_reference_type(&mut rdr)?;
                    let mut record_data = vec![0u8; usize::from(record_length) - 1];
                    rdr.read_exact(&mut record_data)?;
                    records.push(record_data);
                }
                ReadFileRecord(records)
            }
            0x15 => {
                let byte_count = rdr.read_u8()?;
                if bytes.len() < 2 + usize::from(byte_count) {
                    return Err(Error::new(ErrorKind::InvalidData, "Invalid byte count"));
                }
                let mut records = Vec::new();
                let end = 2 + u64::from(byte_count);
                while rdr.position() < end {
                    read_file_reference_type(&mut rdr)?;
                    let file_number = rdr.read_u16::<BigEndian>()?;
                    let record_number = rdr.read_u16::<BigEndian>()?;
                    let record_length = rdr.read_u16::<BigEndian>()?;
                    let mut record_data = vec![0u8; usize::from(record_length) * 2];
                    rdr.read_exact(&mut record_data)?;
                    records.push(FileRecord {
                        file_number,
                        record_number,
                        record_data,
                    });
                }
                WriteFileRecord(records)
            }
            0x16 => MaskWriteRegister(
                rdr.read_u16::<BigEndian>()?,
                rdr.read_u16::<BigEndian>()?,
                rdr.read_u16::<BigEndian>()?,
            ),
            0x18 => {
                let _byte_count = rdr.read_u16::<BigEndian>()?;
                let fifo_count = rdr.read_u16::<BigEndian>()?;
                let mut data = Vec::with_capacity(fifo_count.into());
                for _ in 0..fifo_count {
                    data.push(rdr.read_u16::<BigEndian>()?);
                }
                ReadFifoQueue(data)
            }
            0x2B => {
                let mei_type = rdr.read_u8()?;
                if mei_type != READ_DEVICE_ID {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        format!("Unsupported MEI type: 0x{mei_type:0>2X}"),
                    ));
                }
                let read_code = ReadDeviceCode::new(rdr.read_u8()?).ok_or_else(|| {
                    Error::new(ErrorKind::InvalidData, "Invalid device read code")
                })?;
                let conformity = rdr.read_u8()?;
                let more_follows = rdr.read_u8()? == 0xFF;
                let next_object_id = rdr.read_u8()?;
                let number_of_objects = rdr.read_u8()?;
                let mut objects = Vec::with_capacity(number_of_objects.into());
                for _ in 0..number_of_objects {
                    let object_id = rdr.read_u8()?;
                    let len = rdr.read_u8()?;
                    let mut value = vec![0u8; len.into()];
                    rdr.read_exact(&mut value)?;
                    objects.push((object_id, value));
                }
                ReadDeviceInformation(DeviceInformation {
                    read_code,
                    conformity,
                    more_follows,
                    next_object_id,
                    objects,
                })
            }
            _ => Custom(fn_code, bytes[1..].into()),
        };
        Ok(rsp)
    }
}

impl TryFrom<Bytes> for ExceptionResponse {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let mut rdr = Cursor::new(&bytes);
        let fn_err_code = rdr.read_u8()?;
        if fn_err_code < 0x80 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Invalid exception function code",
            ));
        }
        let function = fn_err_code - 0x80;
        let exception = Exception::try_from(rdr.read_u8()?)?;
        Ok(ExceptionResponse {
            function,
            exception,
        })
    }
}

impl TryFrom<u8> for Exception {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use crate::frame::Exception::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => {
                return Err(Error::new(ErrorKind::InvalidData, "Invalid exception code"));
            }
        };
        Ok(ex)
    }
}

impl TryFrom<Bytes> for ResponsePdu {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let fn_code = Cursor::new(&bytes).read_u8()?;
        let pdu = if fn_code < 0x80 {
            Response::try_from(bytes)?.into()
        } else {
            ExceptionResponse::try_from(bytes)?.into()
        };
        Ok(pdu)
    }
}

/// Reference type of all standard file record accesses.
const FILE_REFERENCE_TYPE: u8 = 0x06;

/// Device status word: ready to process requests.
const STATUS_READY: u16 = 0x0000;

/// Device status word: a previously issued program command is in progress.
const STATUS_WAITING: u16 = 0xFFFF;

const SLAVE_ON: u8 = 0xFF;
const SLAVE_OFF: u8 = 0x00;

fn read_file_reference_type(rdr: &mut Cursor<&Bytes>) -> io::Result<()> {
    let reference_type = rdr.read_u8()?;
    if reference_type != FILE_REFERENCE_TYPE {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("Invalid file reference type: 0x{reference_type:0>2X}"),
        ));
    }
    Ok(())
}

fn read_remaining_words(rdr: &mut Cursor<&Bytes>, bytes: &Bytes) -> io::Result<Vec<Word>> {
    let remaining = bytes.len() as u64 - rdr.position();
    if remaining % 2 != 0 {
        return Err(Error::new(ErrorKind::InvalidData, "Odd data length"));
    }
    let mut words = Vec::with_capacity((remaining / 2) as usize);
    for _ in 0..remaining / 2 {
        words.push(rdr.read_u16::<BigEndian>()?);
    }
    Ok(words)
}

fn bool_to_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

fn coil_to_bool(coil: u16) -> io::Result<bool> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::new(
            ErrorKind::InvalidData,
            format!("Invalid coil value: 0x{coil:0>4X}"),
        )),
    }
}

pub(crate) fn packed_coils_len(bitcount: usize) -> usize {
    (bitcount + 7) / 8
}

pub(crate) fn pack_coils(coils: &[Coil]) -> Vec<u8> {
    let packed_size = packed_coils_len(coils.len());
    let mut res = vec![0; packed_size];
    for (i, b) in coils.iter().enumerate() {
        let v = u8::from(*b);
        res[i / 8] |= v << (i % 8);
    }
    res
}

pub(crate) fn unpack_coils(bytes: &[u8], count: u16) -> Vec<Coil> {
    let mut res = Vec::with_capacity(count.into());
    for i in 0..count {
        res.push((bytes[usize::from(i) / 8] >> (i % 8)) & 0b1 > 0);
    }
    res
}

pub(crate) fn u16_len(len: usize) -> u16 {
    // Length checks have been applied before, the cast cannot truncate.
    debug_assert!(len <= usize::from(u16::MAX));
    len as u16
}

pub(crate) fn u8_len(len: usize) -> u8 {
    // Length checks have been applied before, the cast cannot truncate.
    debug_assert!(len <= usize::from(u8::MAX));
    len as u8
}

fn request_byte_count(req: &Request) -> usize {
    use crate::frame::Request::*;
    match *req {
        ReadCoils(_, _)
        | ReadDiscreteInputs(_, _)
        | ReadInputRegisters(_, _)
        | ReadHoldingRegisters(_, _)
        | WriteSingleRegister(_, _)
        | WriteSingleCoil(_, _) => 5,
        WriteMultipleCoils(_, ref coils) => 6 + packed_coils_len(coils.len()),
        WriteMultipleRegisters(_, ref data) => 6 + data.len() * 2,
        MaskWriteRegister(_, _, _) => 7,
        ReadWriteMultipleRegisters(_, _, _, ref data) => 10 + data.len() * 2,
        ReadExceptionStatus | GetCommEventCounter | GetCommEventLog | ReportSlaveId => 1,
        Diagnostics(_, ref data) => 3 + data.len() * 2,
        ReadFileRecord(ref refs) => 2 + refs.len() * 7,
        WriteFileRecord(ref records) => {
            2 + records
                .iter()
                .map(|r| 7 + r.record_data.len())
                .sum::<usize>()
        }
        ReadFifoQueue(_) => 3,
        ReadDeviceInformation(_, _) => 4,
        Custom(_, ref data) => 1 + data.len(),
    }
}

fn response_byte_count(rsp: &Response) -> usize {
    use crate::frame::Response::*;
    match *rsp {
        ReadCoils(ref coils) | ReadDiscreteInputs(ref coils) => 2 + packed_coils_len(coils.len()),
        WriteSingleCoil(_, _)
        | WriteMultipleCoils(_, _)
        | WriteMultipleRegisters(_, _)
        | WriteSingleRegister(_, _) => 5,
        MaskWriteRegister(_, _, _) => 7,
        ReadInputRegisters(ref data)
        | ReadHoldingRegisters(ref data)
        | ReadWriteMultipleRegisters(ref data) => 2 + data.len() * 2,
        ReadExceptionStatus(_) => 2,
        Diagnostics(_, ref data) => 3 + data.len() * 2,
        GetCommEventCounter(_, _) => 5,
        GetCommEventLog(ref log) => 8 + log.events.len(),
        ReportSlaveId(ref id, _) => 3 + id.len(),
        ReadFileRecord(ref records) => 2 + records.iter().map(|r| 2 + r.len()).sum::<usize>(),
        WriteFileRecord(ref records) => {
            2 + records
                .iter()
                .map(|r| 7 + r.record_data.len())
                .sum::<usize>()
        }
        ReadFifoQueue(ref data) => 5 + data.len() * 2,
        ReadDeviceInformation(ref info) => {
            7 + info.objects.iter().map(|(_, v)| 2 + v.len()).sum::<usize>()
        }
        Custom(_, ref data) => 1 + data.len(),
    }
}
