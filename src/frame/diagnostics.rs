// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic (function code 0x08) sub-functions

/// The sub-function of a diagnostic request/response.
///
/// Diagnostic frames carry a 16 bit sub-function code directly after the
/// function code, followed by 16 bit data words. Most sub-functions either
/// echo their data or return a single counter word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubFunction {
    /// 0x00: loop back the request data
    ReturnQueryData,
    /// 0x01: restart the communication option, clearing counters and log
    RestartCommunicationsOption,
    /// 0x02: return the 16 bit diagnostic register
    ReturnDiagnosticRegister,
    /// 0x03: change the ASCII input frame delimiter
    ChangeAsciiInputDelimiter,
    /// 0x04: stop responding until communications are restarted
    ForceListenOnlyMode,
    /// 0x0A: clear all counters and the diagnostic register
    ClearCounters,
    /// 0x0B
    ReturnBusMessageCount,
    /// 0x0C
    ReturnBusCommunicationErrorCount,
    /// 0x0D
    ReturnBusExceptionErrorCount,
    /// 0x0E
    ReturnServerMessageCount,
    /// 0x0F
    ReturnServerNoResponseCount,
    /// 0x10
    ReturnServerNakCount,
    /// 0x11
    ReturnServerBusyCount,
    /// 0x12
    ReturnBusCharacterOverrunCount,
    /// 0x14: clear the character overrun counter and error flag
    ClearOverrunCounter,
    /// 0x15: get or clear the Modbus Plus network statistics
    GetClearModbusPlus,
    /// A sub-function outside the standard catalog.
    Custom(u16),
}

impl SubFunction {
    /// The 16 bit sub-function code on the wire.
    #[must_use]
    pub fn code(&self) -> u16 {
        use SubFunction::*;
        match self {
            ReturnQueryData => 0x00,
            RestartCommunicationsOption => 0x01,
            ReturnDiagnosticRegister => 0x02,
            ChangeAsciiInputDelimiter => 0x03,
            ForceListenOnlyMode => 0x04,
            ClearCounters => 0x0A,
            ReturnBusMessageCount => 0x0B,
            ReturnBusCommunicationErrorCount => 0x0C,
            ReturnBusExceptionErrorCount => 0x0D,
            ReturnServerMessageCount => 0x0E,
            ReturnServerNoResponseCount => 0x0F,
            ReturnServerNakCount => 0x10,
            ReturnServerBusyCount => 0x11,
            ReturnBusCharacterOverrunCount => 0x12,
            ClearOverrunCounter => 0x14,
            GetClearModbusPlus => 0x15,
            Custom(code) => *code,
        }
    }
}

impl From<u16> for SubFunction {
    fn from(code: u16) -> Self {
        use SubFunction::*;
        match code {
            0x00 => ReturnQueryData,
            0x01 => RestartCommunicationsOption,
            0x02 => ReturnDiagnosticRegister,
            0x03 => ChangeAsciiInputDelimiter,
            0x04 => ForceListenOnlyMode,
            0x0A => ClearCounters,
            0x0B => ReturnBusMessageCount,
            0x0C => ReturnBusCommunicationErrorCount,
            0x0D => ReturnBusExceptionErrorCount,
            0x0E => ReturnServerMessageCount,
            0x0F => ReturnServerNoResponseCount,
            0x10 => ReturnServerNakCount,
            0x11 => ReturnServerBusyCount,
            0x12 => ReturnBusCharacterOverrunCount,
            0x14 => ClearOverrunCounter,
            0x15 => GetClearModbusPlus,
            code => Custom(code),
        }
    }
}
