// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution of requests against a slave data model
//!
//! Every request is validated against the protocol limits, then runs
//! against the data blocks or the control block of the slave context.
//! Failures turn into the exception response reported to the client.

use crate::{
    datastore::{BlockKind, DataBlock, SlaveContext},
    frame::{
        diagnostics::SubFunction, mei::ReadDeviceCode, Address, CommEventLog, DeviceInformation,
        Exception, ExceptionResponse, FileRecord, FileSubRequest, Quantity, Request, Response,
        ResponsePdu, Word, MAX_FIFO_WORDS, MAX_READ_BITS, MAX_READ_WORDS, MAX_READ_WRITE_WORDS,
        MAX_WRITE_BITS, MAX_WRITE_WORDS,
    },
};

// Communication event bytes: a successfully processed incoming
// request and the response sent back.
const EVENT_RECEIVE: u8 = 0x80;
const EVENT_SEND: u8 = 0x40;

/// Run one request against the data model and build the response.
///
/// The returned PDU is either the matching response or an exception
/// response carrying the failure code.
pub async fn update_datastore(ctx: &mut SlaveContext, request: Request) -> ResponsePdu {
    let function = request.function_code();
    {
        let counters = &mut ctx.control_mut().counters;
        counters.bus_message = counters.bus_message.wrapping_add(1);
        counters.server_message = counters.server_message.wrapping_add(1);
    }
    ctx.control_mut().record_event(EVENT_RECEIVE);

    match dispatch(ctx, request).await {
        Ok(response) => {
            ctx.control_mut().record_event(EVENT_SEND);
            response.into()
        }
        Err(exception) => {
            let counters = &mut ctx.control_mut().counters;
            counters.bus_exception_error = counters.bus_exception_error.wrapping_add(1);
            ExceptionResponse {
                function,
                exception,
            }
            .into()
        }
    }
}

async fn dispatch(ctx: &mut SlaveContext, request: Request) -> Result<Response, Exception> {
    use Request::*;
    match request {
        ReadCoils(addr, cnt) => {
            check_quantity(cnt, MAX_READ_BITS)?;
            let bits = read_bits(ctx, BlockKind::Coils, addr, cnt).await?;
            Ok(Response::ReadCoils(bits))
        }
        ReadDiscreteInputs(addr, cnt) => {
            check_quantity(cnt, MAX_READ_BITS)?;
            let bits = read_bits(ctx, BlockKind::DiscreteInputs, addr, cnt).await?;
            Ok(Response::ReadDiscreteInputs(bits))
        }
        ReadHoldingRegisters(addr, cnt) => {
            check_quantity(cnt, MAX_READ_WORDS)?;
            let words = read_words(ctx, BlockKind::HoldingRegisters, addr, cnt).await?;
            Ok(Response::ReadHoldingRegisters(words))
        }
        ReadInputRegisters(addr, cnt) => {
            check_quantity(cnt, MAX_READ_WORDS)?;
            let words = read_words(ctx, BlockKind::InputRegisters, addr, cnt).await?;
            Ok(Response::ReadInputRegisters(words))
        }
        WriteSingleCoil(addr, coil) => {
            write_bits(ctx, addr, &[coil]).await?;
            Ok(Response::WriteSingleCoil(addr, coil))
        }
        WriteSingleRegister(addr, word) => {
            write_words(ctx, addr, &[word]).await?;
            Ok(Response::WriteSingleRegister(addr, word))
        }
        WriteMultipleCoils(addr, coils) => {
            check_quantity(crate::codec::u16_len(coils.len()), MAX_WRITE_BITS)?;
            write_bits(ctx, addr, &coils).await?;
            Ok(Response::WriteMultipleCoils(
                addr,
                crate::codec::u16_len(coils.len()),
            ))
        }
        WriteMultipleRegisters(addr, words) => {
            check_quantity(crate::codec::u16_len(words.len()), MAX_WRITE_WORDS)?;
            write_words(ctx, addr, &words).await?;
            Ok(Response::WriteMultipleRegisters(
                addr,
                crate::codec::u16_len(words.len()),
            ))
        }
        MaskWriteRegister(addr, and_mask, or_mask) => {
            let block = ctx.holding_registers_mut();
            let current = block.get_values_async(addr, 1).await?[0];
            let value = (current & and_mask) | (or_mask & !and_mask);
            block.set_values_async(addr, &[value]).await?;
            Ok(Response::MaskWriteRegister(addr, and_mask, or_mask))
        }
        ReadWriteMultipleRegisters(read_addr, read_cnt, write_addr, words) => {
            check_quantity(read_cnt, MAX_READ_WORDS)?;
            check_quantity(crate::codec::u16_len(words.len()), MAX_READ_WRITE_WORDS)?;
            // The write is performed before the read
            write_words(ctx, write_addr, &words).await?;
            let words = read_words(ctx, BlockKind::HoldingRegisters, read_addr, read_cnt).await?;
            Ok(Response::ReadWriteMultipleRegisters(words))
        }
        ReadExceptionStatus => Ok(Response::ReadExceptionStatus(
            ctx.control().counters.summary(),
        )),
        Diagnostics(sub, data) => diagnostics(ctx, sub, data),
        GetCommEventCounter => Ok(Response::GetCommEventCounter(
            true,
            ctx.control().event_count(),
        )),
        GetCommEventLog => {
            let control = ctx.control();
            Ok(Response::GetCommEventLog(CommEventLog {
                status: true,
                event_count: control.event_count(),
                message_count: control.counters.bus_message,
                events: control.events().to_vec(),
            }))
        }
        ReportSlaveId => Ok(Response::ReportSlaveId(
            ctx.control().identity.identifier(),
            true,
        )),
        ReadFileRecord(refs) => read_file_records(ctx, &refs),
        WriteFileRecord(records) => write_file_records(ctx, records),
        ReadFifoQueue(addr) => read_fifo_queue(ctx, addr).await,
        ReadDeviceInformation(read_code, object_id) => {
            let objects = ctx.control().identity.objects(read_code, object_id);
            if read_code == ReadDeviceCode::Specific && objects.is_empty() {
                return Err(Exception::IllegalDataAddress);
            }
            Ok(Response::ReadDeviceInformation(DeviceInformation::new(
                read_code, objects,
            )))
        }
        Custom(_, _) => Err(Exception::IllegalFunction),
    }
}

fn check_quantity(cnt: Quantity, max: Quantity) -> Result<(), Exception> {
    if cnt == 0 || cnt > max {
        return Err(Exception::IllegalDataValue);
    }
    Ok(())
}

async fn read_bits(
    ctx: &mut SlaveContext,
    kind: BlockKind,
    addr: Address,
    cnt: Quantity,
) -> Result<Vec<bool>, Exception> {
    let block = match kind {
        BlockKind::Coils => ctx.coils_mut(),
        _ => ctx.discrete_inputs_mut(),
    };
    block.get_values_async(addr, cnt).await
}

async fn read_words(
    ctx: &mut SlaveContext,
    kind: BlockKind,
    addr: Address,
    cnt: Quantity,
) -> Result<Vec<Word>, Exception> {
    let block = match kind {
        BlockKind::InputRegisters => ctx.input_registers_mut(),
        _ => ctx.holding_registers_mut(),
    };
    block.get_values_async(addr, cnt).await
}

async fn write_bits(ctx: &mut SlaveContext, addr: Address, bits: &[bool]) -> Result<(), Exception> {
    ctx.coils_mut().set_values_async(addr, bits).await
}

async fn write_words(
    ctx: &mut SlaveContext,
    addr: Address,
    words: &[Word],
) -> Result<(), Exception> {
    ctx.holding_registers_mut().set_values_async(addr, words).await
}

fn diagnostics(
    ctx: &mut SlaveContext,
    sub: SubFunction,
    data: Vec<Word>,
) -> Result<Response, Exception> {
    use SubFunction::*;
    let echo = |data: Vec<Word>| Ok(Response::Diagnostics(sub, data));
    let counter = |value: Word| Ok(Response::Diagnostics(sub, vec![value]));
    match sub {
        ReturnQueryData => echo(data),
        RestartCommunicationsOption => {
            // A data field of 0xFF00 also clears the event log
            let clear_log = data.first() == Some(&0xFF00);
            ctx.control_mut().restart_communications(clear_log);
            echo(data)
        }
        ReturnDiagnosticRegister => counter(ctx.control().diagnostic_register),
        ChangeAsciiInputDelimiter => {
            let word = data.first().copied().unwrap_or_default();
            ctx.control_mut().delimiter = (word >> 8) as u8;
            echo(data)
        }
        ForceListenOnlyMode => {
            ctx.control_mut().listen_only = true;
            echo(data)
        }
        ClearCounters => {
            ctx.control_mut().clear_counters();
            echo(data)
        }
        ReturnBusMessageCount => counter(ctx.control().counters.bus_message),
        ReturnBusCommunicationErrorCount => {
            counter(ctx.control().counters.bus_communication_error)
        }
        ReturnBusExceptionErrorCount => counter(ctx.control().counters.bus_exception_error),
        ReturnServerMessageCount => counter(ctx.control().counters.server_message),
        ReturnServerNoResponseCount => counter(ctx.control().counters.server_no_response),
        ReturnServerNakCount => counter(ctx.control().counters.server_nak),
        ReturnServerBusyCount => counter(ctx.control().counters.server_busy),
        ReturnBusCharacterOverrunCount => counter(ctx.control().counters.character_overrun),
        ClearOverrunCounter => {
            ctx.control_mut().counters.character_overrun = 0;
            echo(data)
        }
        // No Modbus Plus statistics are maintained
        GetClearModbusPlus => counter(0x0000),
        Custom(_) => Err(Exception::IllegalFunction),
    }
}

fn read_file_records(
    ctx: &mut SlaveContext,
    refs: &[FileSubRequest],
) -> Result<Response, Exception> {
    if refs.is_empty() || refs.len() > 35 {
        return Err(Exception::IllegalDataValue);
    }
    let mut records = Vec::with_capacity(refs.len());
    for r in refs {
        let file = ctx
            .file(r.file_number)
            .ok_or(Exception::IllegalDataAddress)?;
        let words = file.get_values(r.record_number, r.record_length)?;
        records.push(words.iter().flat_map(|word| word.to_be_bytes()).collect());
    }
    Ok(Response::ReadFileRecord(records))
}

fn write_file_records(
    ctx: &mut SlaveContext,
    records: Vec<FileRecord>,
) -> Result<Response, Exception> {
    if records.is_empty() {
        return Err(Exception::IllegalDataValue);
    }
    for record in &records {
        let words: Vec<Word> = record
            .record_data
            .chunks_exact(2)
            .map(|chunk| Word::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        ctx.file_mut(record.file_number)
            .set_values(record.record_number, &words)?;
    }
    Ok(Response::WriteFileRecord(records))
}

async fn read_fifo_queue(ctx: &mut SlaveContext, addr: Address) -> Result<Response, Exception> {
    let block = ctx.holding_registers_mut();
    let count = block.get_values_async(addr, 1).await?[0];
    if count > MAX_FIFO_WORDS {
        return Err(Exception::IllegalDataValue);
    }
    let values = if count > 0 {
        block.get_values_async(addr + 1, count).await?
    } else {
        Vec::new()
    };
    Ok(Response::ReadFifoQueue(values))
}
