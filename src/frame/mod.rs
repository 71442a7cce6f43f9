// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol data units and their envelopes

pub mod diagnostics;

pub mod mei;

use std::{error, fmt};

use crate::{
    slave::{Slave, SlaveId},
    Error,
};

pub use self::{
    diagnostics::SubFunction,
    mei::{DeviceInformation, ReadDeviceCode},
};

/// A Modbus function code is represented by an unsigned 8 bit integer.
pub type FunctionCode = u8;

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *coil address* or
/// *register address* is often specified as a number with 1-based indexing.
/// Please consult the specification of your devices if 1-based coil/register
/// addresses need to be converted to 0-based protocol addresses by subtracting 1.
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// A transaction identifier correlating a response with its request.
///
/// Only the Modbus TCP framer transports it on the wire. The serial and TLS
/// framers pin it to `0`.
pub type TransactionId = u16;

/// The largest quantity of coils/discrete inputs in a single read.
pub(crate) const MAX_READ_BITS: Quantity = 2000;

/// The largest quantity of registers in a single read.
pub(crate) const MAX_READ_WORDS: Quantity = 125;

/// The largest quantity of coils in a single write.
pub(crate) const MAX_WRITE_BITS: Quantity = 1968;

/// The largest quantity of registers in a single write.
pub(crate) const MAX_WRITE_WORDS: Quantity = 123;

/// The largest write quantity of a combined read/write request.
pub(crate) const MAX_READ_WRITE_WORDS: Quantity = 121;

/// The largest depth of a FIFO queue read.
pub(crate) const MAX_FIFO_WORDS: Quantity = 31;

/// A sub-request of a Read File Record request: which record to read and
/// how many 16 bit words of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSubRequest {
    pub file_number: u16,
    pub record_number: u16,
    pub record_length: u16,
}

/// A file record and its data.
///
/// The data length on the wire is counted in 16 bit words, so
/// `record_data` must have an even number of bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_number: u16,
    pub record_number: u16,
    pub record_data: Vec<u8>,
}

impl FileRecord {
    pub fn new(
        file_number: u16,
        record_number: u16,
        record_data: Vec<u8>,
    ) -> Result<Self, Error> {
        if record_data.len() % 2 != 0 {
            return Err(Error::Parameter(
                "file record data must be a multiple of 2 bytes",
            ));
        }
        Ok(Self {
            file_number,
            record_number,
            record_data,
        })
    }

    /// Length of the record data in 16 bit words.
    #[must_use]
    pub fn record_length(&self) -> u16 {
        (self.record_data.len() / 2) as u16
    }
}

/// The payload of a Get Comm Event Log response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommEventLog {
    /// `true` if the device is ready to process requests.
    pub status: bool,
    pub event_count: u16,
    pub message_count: u16,
    /// Most recent event bytes, newest first.
    pub events: Vec<u8>,
}

/// A request represents a message from the client (master) to the server (slave).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// FC 0x01
    ReadCoils(Address, Quantity),
    /// FC 0x02
    ReadDiscreteInputs(Address, Quantity),
    /// FC 0x05
    WriteSingleCoil(Address, Coil),
    /// FC 0x0F
    WriteMultipleCoils(Address, Vec<Coil>),
    /// FC 0x04
    ReadInputRegisters(Address, Quantity),
    /// FC 0x03
    ReadHoldingRegisters(Address, Quantity),
    /// FC 0x06
    WriteSingleRegister(Address, Word),
    /// FC 0x10
    WriteMultipleRegisters(Address, Vec<Word>),
    /// FC 0x16
    MaskWriteRegister(Address, Word, Word),
    /// FC 0x17
    ReadWriteMultipleRegisters(Address, Quantity, Address, Vec<Word>),
    /// FC 0x07
    ReadExceptionStatus,
    /// FC 0x08
    Diagnostics(SubFunction, Vec<Word>),
    /// FC 0x0B
    GetCommEventCounter,
    /// FC 0x0C
    GetCommEventLog,
    /// FC 0x11
    ReportSlaveId,
    /// FC 0x14
    ReadFileRecord(Vec<FileSubRequest>),
    /// FC 0x15
    WriteFileRecord(Vec<FileRecord>),
    /// FC 0x18
    ReadFifoQueue(Address),
    /// FC 0x2B, MEI type 0x0E
    ReadDeviceInformation(ReadDeviceCode, u8),
    /// A request with a function code registered by the user or unknown to
    /// the built-in catalog. The payload excludes the function code byte.
    Custom(FunctionCode, Vec<u8>),
}

/// The data of a successful request.
///
/// `ReadCoils`/`ReadDiscreteInputs`: The length of the result `Vec` is always
/// a multiple of 8. Only the values of the first bits/coils that have
/// actually been requested are defined. The value of the remaining bits
/// depends on the server implementation and those coils should be ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadCoils(Vec<Coil>),
    ReadDiscreteInputs(Vec<Coil>),
    WriteSingleCoil(Address, Coil),
    WriteMultipleCoils(Address, Quantity),
    ReadInputRegisters(Vec<Word>),
    ReadHoldingRegisters(Vec<Word>),
    WriteSingleRegister(Address, Word),
    WriteMultipleRegisters(Address, Quantity),
    MaskWriteRegister(Address, Word, Word),
    ReadWriteMultipleRegisters(Vec<Word>),
    /// One status bit per pending output.
    ReadExceptionStatus(u8),
    Diagnostics(SubFunction, Vec<Word>),
    /// Device status (`true` = ready) and event count.
    GetCommEventCounter(bool, u16),
    GetCommEventLog(CommEventLog),
    /// Device-defined identifier and run status (`true` = on).
    ReportSlaveId(Vec<u8>, bool),
    /// The data of each requested record, in request order.
    ReadFileRecord(Vec<Vec<u8>>),
    WriteFileRecord(Vec<FileRecord>),
    ReadFifoQueue(Vec<Word>),
    ReadDeviceInformation(DeviceInformation),
    Custom(FunctionCode, Vec<u8>),
}

impl Request {
    /// The function code of this request on the wire.
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        use Request::*;
        match self {
            ReadCoils(_, _) => 0x01,
            ReadDiscreteInputs(_, _) => 0x02,
            ReadHoldingRegisters(_, _) => 0x03,
            ReadInputRegisters(_, _) => 0x04,
            WriteSingleCoil(_, _) => 0x05,
            WriteSingleRegister(_, _) => 0x06,
            ReadExceptionStatus => 0x07,
            Diagnostics(_, _) => 0x08,
            GetCommEventCounter => 0x0B,
            GetCommEventLog => 0x0C,
            WriteMultipleCoils(_, _) => 0x0F,
            WriteMultipleRegisters(_, _) => 0x10,
            ReportSlaveId => 0x11,
            ReadFileRecord(_) => 0x14,
            WriteFileRecord(_) => 0x15,
            MaskWriteRegister(_, _, _) => 0x16,
            ReadWriteMultipleRegisters(_, _, _, _) => 0x17,
            ReadFifoQueue(_) => 0x18,
            ReadDeviceInformation(_, _) => 0x2B,
            Custom(code, _) => *code,
        }
    }

    /// Check the request arguments against the protocol limits.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        use Request::*;
        match self {
            ReadCoils(_, cnt) | ReadDiscreteInputs(_, cnt) => {
                if !(1..=MAX_READ_BITS).contains(cnt) {
                    return Err(Error::Parameter("bit read quantity out of range 1..=2000"));
                }
            }
            ReadHoldingRegisters(_, cnt) | ReadInputRegisters(_, cnt) => {
                if !(1..=MAX_READ_WORDS).contains(cnt) {
                    return Err(Error::Parameter(
                        "register read quantity out of range 1..=125",
                    ));
                }
            }
            WriteMultipleCoils(_, coils) => {
                if coils.is_empty() || coils.len() > usize::from(MAX_WRITE_BITS) {
                    return Err(Error::Parameter("coil write quantity out of range 1..=1968"));
                }
            }
            WriteMultipleRegisters(_, words) => {
                if words.is_empty() || words.len() > usize::from(MAX_WRITE_WORDS) {
                    return Err(Error::Parameter(
                        "register write quantity out of range 1..=123",
                    ));
                }
            }
            ReadWriteMultipleRegisters(_, read_cnt, _, words) => {
                if !(1..=MAX_READ_WORDS).contains(read_cnt) {
                    return Err(Error::Parameter(
                        "register read quantity out of range 1..=125",
                    ));
                }
                if words.is_empty() || words.len() > usize::from(MAX_READ_WRITE_WORDS) {
                    return Err(Error::Parameter(
                        "register write quantity out of range 1..=121",
                    ));
                }
            }
            ReadFileRecord(refs) => {
                if refs.is_empty() || refs.len() > 35 {
                    return Err(Error::Parameter("file sub-request count out of range 1..=35"));
                }
            }
            WriteFileRecord(records) => {
                if records.is_empty() {
                    return Err(Error::Parameter("file record list must not be empty"));
                }
                let total: usize = records
                    .iter()
                    .map(|r| 7 + r.record_data.len())
                    .sum();
                if total > 251 {
                    return Err(Error::Parameter("file record data exceeds one PDU"));
                }
            }
            Diagnostics(_, data) => {
                if data.len() > usize::from(MAX_READ_WORDS) {
                    return Err(Error::Parameter("diagnostic data exceeds one PDU"));
                }
            }
            Custom(_, data) => {
                if data.len() > 252 {
                    return Err(Error::Parameter("custom request data exceeds one PDU"));
                }
            }
            _ => (),
        }
        Ok(())
    }
}

impl Response {
    /// The function code of this response on the wire.
    #[must_use]
    pub fn function_code(&self) -> FunctionCode {
        use Response::*;
        match self {
            ReadCoils(_) => 0x01,
            ReadDiscreteInputs(_) => 0x02,
            ReadHoldingRegisters(_) => 0x03,
            ReadInputRegisters(_) => 0x04,
            WriteSingleCoil(_, _) => 0x05,
            WriteSingleRegister(_, _) => 0x06,
            ReadExceptionStatus(_) => 0x07,
            Diagnostics(_, _) => 0x08,
            GetCommEventCounter(_, _) => 0x0B,
            GetCommEventLog(_) => 0x0C,
            WriteMultipleCoils(_, _) => 0x0F,
            WriteMultipleRegisters(_, _) => 0x10,
            ReportSlaveId(_, _) => 0x11,
            ReadFileRecord(_) => 0x14,
            WriteFileRecord(_) => 0x15,
            MaskWriteRegister(_, _, _) => 0x16,
            ReadWriteMultipleRegisters(_) => 0x17,
            ReadFifoQueue(_) => 0x18,
            ReadDeviceInformation(_) => 0x2B,
            Custom(code, _) => *code,
        }
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl Exception {
    pub(crate) fn description(&self) -> &str {
        use crate::frame::Exception::*;

        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            NegativeAcknowledge => "Negative acknowledge",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }
}

/// A server (slave) exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: Exception,
}

impl ExceptionResponse {
    /// The synthetic response the client returns for broadcast requests.
    ///
    /// Broadcast requests never receive a reply, so after sending the frame
    /// the client resolves immediately with this marker. It only exists
    /// locally and is never encoded on the wire, hence the out-of-range
    /// function code.
    #[must_use]
    pub const fn no_response() -> Self {
        Self {
            function: 0xFF,
            exception: Exception::Acknowledge,
        }
    }

    /// Check whether this is the synthetic broadcast marker.
    #[must_use]
    pub fn is_no_response(&self) -> bool {
        self.function == 0xFF
    }
}

/// Represents a message from the client (master) to the server (slave).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPdu(pub Request);

impl From<Request> for RequestPdu {
    fn from(from: Request) -> Self {
        RequestPdu(from)
    }
}

impl From<RequestPdu> for Request {
    fn from(from: RequestPdu) -> Self {
        from.0
    }
}

/// Represents a message from the server (slave) to the client (master).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePdu(pub Result<Response, ExceptionResponse>);

impl From<Response> for ResponsePdu {
    fn from(from: Response) -> Self {
        ResponsePdu(Ok(from))
    }
}

impl From<ExceptionResponse> for ResponsePdu {
    fn from(from: ExceptionResponse) -> Self {
        ResponsePdu(Err(from))
    }
}

impl From<Result<Response, ExceptionResponse>> for ResponsePdu {
    fn from(from: Result<Response, ExceptionResponse>) -> Self {
        ResponsePdu(from)
    }
}

impl From<ResponsePdu> for Result<Response, ExceptionResponse> {
    fn from(from: ResponsePdu) -> Self {
        from.0
    }
}

/// The envelope metadata every framer attaches to a PDU.
///
/// The TCP framer transports both fields in its MBAP prefix. The serial
/// framers transport the unit id only and pin the transaction id to `0`,
/// the TLS framer pins both to `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: SlaveId,
}

impl Header {
    #[must_use]
    pub const fn new(transaction_id: TransactionId, unit_id: SlaveId) -> Self {
        Self {
            transaction_id,
            unit_id,
        }
    }
}

/// A request PDU together with its envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAdu {
    pub hdr: Header,
    pub pdu: RequestPdu,
}

/// A response PDU together with its envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseAdu {
    pub hdr: Header,
    pub pdu: ResponsePdu,
}

impl From<RequestAdu> for Request {
    fn from(from: RequestAdu) -> Self {
        from.pdu.into()
    }
}

/// A request as surfaced to a server service, i.e. with the slave address
/// it was directed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveRequest {
    pub slave: Slave,
    pub request: Request,
}

impl From<RequestAdu> for SlaveRequest {
    fn from(from: RequestAdu) -> Self {
        Self {
            slave: Slave(from.hdr.unit_id),
            request: from.pdu.into(),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for Exception {}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus function {}: {}", self.function, self.exception)
    }
}

impl error::Error for ExceptionResponse {}
