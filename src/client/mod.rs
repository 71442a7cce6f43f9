// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous Modbus clients

pub mod ascii;

pub mod rtu;

pub mod sync;

pub mod tcp;

pub mod tls;

pub mod util;

use std::{fmt, io};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    frame::*,
    slave::Slave,
    transaction::TransactionManager,
    Error, Result,
};

/// A transport independent asynchronous client trait.
#[async_trait]
pub trait Client: Send + fmt::Debug {
    /// Issue the request and return the device's answer.
    ///
    /// The inner result carries the exception response a device may
    /// report instead of the expected response.
    async fn call(&mut self, request: Request) -> Result<Response>;

    /// Select the slave device for all subsequent outgoing requests.
    fn set_slave(&mut self, slave: Slave);

    /// Drop the connection.
    fn disconnect(&mut self);
}

#[async_trait]
impl<T, C> Client for TransactionManager<T, C>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + fmt::Debug,
    C: Decoder<Item = ResponseAdu, Error = io::Error>
        + Encoder<RequestAdu, Error = io::Error>
        + Send
        + fmt::Debug,
{
    async fn call(&mut self, request: Request) -> Result<Response> {
        let broadcast = self.slave().is_broadcast();
        if broadcast && !self.options().broadcast_enable {
            return Err(Error::Parameter("broadcast requests are disabled"));
        }
        self.execute(broadcast, request).await
    }

    fn set_slave(&mut self, slave: Slave) {
        TransactionManager::set_slave(self, slave);
    }

    fn disconnect(&mut self) {
        TransactionManager::disconnect(self);
    }
}

/// An asynchronous Modbus reader.
#[async_trait]
pub trait Reader: Client {
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    async fn read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>>;

    async fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    async fn read_holding_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>>;

    async fn read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>>;
}

/// An asynchronous Modbus writer.
#[async_trait]
pub trait Writer: Client {
    async fn write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<()>;

    async fn write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<()>;

    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<()>;

    async fn write_multiple_registers(&mut self, addr: Address, words: &[Word]) -> Result<()>;

    async fn mask_write_register(
        &mut self,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<()>;
}

/// An asynchronous Modbus client context.
#[derive(Debug)]
pub struct Context {
    client: Box<dyn Client>,
}

impl From<Box<dyn Client>> for Context {
    fn from(client: Box<dyn Client>) -> Self {
        Self { client }
    }
}

impl From<Context> for Box<dyn Client> {
    fn from(from: Context) -> Self {
        from.client
    }
}

fn unexpected_response() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        "unexpected response",
    ))
}

fn invalid_response() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        "invalid response",
    ))
}

#[async_trait]
impl Client for Context {
    async fn call(&mut self, request: Request) -> Result<Response> {
        self.client.call(request).await
    }

    fn set_slave(&mut self, slave: Slave) {
        self.client.set_slave(slave);
    }

    fn disconnect(&mut self) {
        self.client.disconnect();
    }
}

impl Context {
    /// FC 0x07: one status bit per pending output.
    pub async fn read_exception_status(&mut self) -> Result<u8> {
        let rsp = self.client.call(Request::ReadExceptionStatus).await?;
        match rsp {
            Ok(Response::ReadExceptionStatus(status)) => Ok(Ok(status)),
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x08: run a diagnostic sub-function and return its data words.
    pub async fn diagnostics(
        &mut self,
        sub: SubFunction,
        data: Vec<Word>,
    ) -> Result<Vec<Word>> {
        let rsp = self.client.call(Request::Diagnostics(sub, data)).await?;
        match rsp {
            Ok(Response::Diagnostics(rsp_sub, words)) => {
                if rsp_sub != sub {
                    return Err(invalid_response());
                }
                Ok(Ok(words))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x0B: device status and communication event count.
    pub async fn get_comm_event_counter(&mut self) -> Result<(bool, u16)> {
        let rsp = self.client.call(Request::GetCommEventCounter).await?;
        match rsp {
            Ok(Response::GetCommEventCounter(status, count)) => Ok(Ok((status, count))),
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x0C: device status, counters and the recent event log.
    pub async fn get_comm_event_log(&mut self) -> Result<CommEventLog> {
        let rsp = self.client.call(Request::GetCommEventLog).await?;
        match rsp {
            Ok(Response::GetCommEventLog(log)) => Ok(Ok(log)),
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x11: the device-defined identifier and run status.
    pub async fn report_slave_id(&mut self) -> Result<(Vec<u8>, bool)> {
        let rsp = self.client.call(Request::ReportSlaveId).await?;
        match rsp {
            Ok(Response::ReportSlaveId(id, run_status)) => Ok(Ok((id, run_status))),
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x14: read file records.
    pub async fn read_file_record(
        &mut self,
        refs: Vec<FileSubRequest>,
    ) -> Result<Vec<Vec<u8>>> {
        let expected: Vec<_> = refs.iter().map(|r| usize::from(r.record_length) * 2).collect();
        let rsp = self.client.call(Request::ReadFileRecord(refs)).await?;
        match rsp {
            Ok(Response::ReadFileRecord(records)) => {
                if records.len() != expected.len()
                    || records
                        .iter()
                        .zip(&expected)
                        .any(|(record, len)| record.len() != *len)
                {
                    return Err(invalid_response());
                }
                Ok(Ok(records))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x15: write file records. The response echoes the request.
    pub async fn write_file_record(&mut self, records: Vec<FileRecord>) -> Result<()> {
        let req = records.clone();
        let rsp = self.client.call(Request::WriteFileRecord(records)).await?;
        match rsp {
            Ok(Response::WriteFileRecord(echoed)) => {
                if echoed != req {
                    return Err(invalid_response());
                }
                Ok(Ok(()))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x18: drain the FIFO queue at the given pointer address.
    pub async fn read_fifo_queue(&mut self, addr: Address) -> Result<Vec<Word>> {
        let rsp = self.client.call(Request::ReadFifoQueue(addr)).await?;
        match rsp {
            Ok(Response::ReadFifoQueue(words)) => Ok(Ok(words)),
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    /// FC 0x2B/0x0E: read device identification objects.
    pub async fn read_device_information(
        &mut self,
        read_code: ReadDeviceCode,
        object_id: u8,
    ) -> Result<DeviceInformation> {
        let rsp = self
            .client
            .call(Request::ReadDeviceInformation(read_code, object_id))
            .await?;
        match rsp {
            Ok(Response::ReadDeviceInformation(info)) => Ok(Ok(info)),
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }
}

#[async_trait]
impl Reader for Context {
    async fn read_coils(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        let rsp = self.client.call(Request::ReadCoils(addr, cnt)).await?;
        match rsp {
            Ok(Response::ReadCoils(mut coils)) => {
                if coils.len() < cnt.into() {
                    return Err(invalid_response());
                }
                coils.truncate(cnt.into());
                Ok(Ok(coils))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn read_discrete_inputs(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Coil>> {
        let rsp = self
            .client
            .call(Request::ReadDiscreteInputs(addr, cnt))
            .await?;
        match rsp {
            Ok(Response::ReadDiscreteInputs(mut inputs)) => {
                if inputs.len() < cnt.into() {
                    return Err(invalid_response());
                }
                inputs.truncate(cnt.into());
                Ok(Ok(inputs))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn read_input_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        let rsp = self
            .client
            .call(Request::ReadInputRegisters(addr, cnt))
            .await?;
        match rsp {
            Ok(Response::ReadInputRegisters(words)) => {
                if words.len() != cnt as usize {
                    return Err(invalid_response());
                }
                Ok(Ok(words))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn read_holding_registers(&mut self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        let rsp = self
            .client
            .call(Request::ReadHoldingRegisters(addr, cnt))
            .await?;
        match rsp {
            Ok(Response::ReadHoldingRegisters(words)) => {
                if words.len() != cnt as usize {
                    return Err(invalid_response());
                }
                Ok(Ok(words))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn read_write_multiple_registers(
        &mut self,
        read_addr: Address,
        read_count: Quantity,
        write_addr: Address,
        write_data: &[Word],
    ) -> Result<Vec<Word>> {
        let rsp = self
            .client
            .call(Request::ReadWriteMultipleRegisters(
                read_addr,
                read_count,
                write_addr,
                write_data.to_vec(),
            ))
            .await?;
        match rsp {
            Ok(Response::ReadWriteMultipleRegisters(words)) => {
                if words.len() != read_count as usize {
                    return Err(invalid_response());
                }
                Ok(Ok(words))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }
}

#[async_trait]
impl Writer for Context {
    async fn write_single_coil(&mut self, addr: Address, coil: Coil) -> Result<()> {
        let rsp = self
            .client
            .call(Request::WriteSingleCoil(addr, coil))
            .await?;
        match rsp {
            Ok(Response::WriteSingleCoil(rsp_addr, rsp_coil)) => {
                if rsp_addr != addr || rsp_coil != coil {
                    return Err(invalid_response());
                }
                Ok(Ok(()))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn write_multiple_coils(&mut self, addr: Address, coils: &[Coil]) -> Result<()> {
        let cnt = coils.len();
        let rsp = self
            .client
            .call(Request::WriteMultipleCoils(addr, coils.to_vec()))
            .await?;
        match rsp {
            Ok(Response::WriteMultipleCoils(rsp_addr, rsp_cnt)) => {
                if rsp_addr != addr || usize::from(rsp_cnt) != cnt {
                    return Err(invalid_response());
                }
                Ok(Ok(()))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn write_single_register(&mut self, addr: Address, word: Word) -> Result<()> {
        let rsp = self
            .client
            .call(Request::WriteSingleRegister(addr, word))
            .await?;
        match rsp {
            Ok(Response::WriteSingleRegister(rsp_addr, rsp_word)) => {
                if rsp_addr != addr || rsp_word != word {
                    return Err(invalid_response());
                }
                Ok(Ok(()))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn write_multiple_registers(&mut self, addr: Address, words: &[Word]) -> Result<()> {
        let cnt = words.len();
        let rsp = self
            .client
            .call(Request::WriteMultipleRegisters(addr, words.to_vec()))
            .await?;
        match rsp {
            Ok(Response::WriteMultipleRegisters(rsp_addr, rsp_cnt)) => {
                if rsp_addr != addr || usize::from(rsp_cnt) != cnt {
                    return Err(invalid_response());
                }
                Ok(Ok(()))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }

    async fn mask_write_register(
        &mut self,
        addr: Address,
        and_mask: Word,
        or_mask: Word,
    ) -> Result<()> {
        let rsp = self
            .client
            .call(Request::MaskWriteRegister(addr, and_mask, or_mask))
            .await?;
        match rsp {
            Ok(Response::MaskWriteRegister(rsp_addr, rsp_and, rsp_or)) => {
                if rsp_addr != addr || rsp_and != and_mask || rsp_or != or_mask {
                    return Err(invalid_response());
                }
                Ok(Ok(()))
            }
            Ok(_) => Err(unexpected_response()),
            Err(exc) => Ok(Err(exc)),
        }
    }
}
