// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Library error types

use crate::{frame::ExceptionResponse, slave::SlaveId};

/// Protocol-stack errors.
///
/// Modbus exception responses reported by a remote device are *not* part of
/// this enum. They are regular responses carried in the inner result of
/// [`Result`] so that callers can inspect the exception code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not be connected or was lost mid-request.
    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// Malformed response, checksum failure without recoverable bytes, or
    /// missing response after all retries.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An argument was out of range, e.g. a quantity exceeding the protocol
    /// limit for the requested function.
    #[error("invalid parameter: {0}")]
    Parameter(&'static str),

    /// An attempt to register a custom function under a reserved code.
    #[error("invalid registration: {0}")]
    Registration(&'static str),

    /// Server-side request for an unconfigured unit id.
    #[error("no slave configured with id {0}")]
    NoSuchSlave(SlaveId),
}

/// Combined result of a Modbus call.
///
/// The outer result carries [`Error`], the inner one the
/// [`ExceptionResponse`] a device may answer with instead of the expected
/// response.
pub type Result<T> = std::result::Result<std::result::Result<T, ExceptionResponse>, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_no_such_slave() {
        let err = Error::NoSuchSlave(17);
        assert_eq!(format!("{err}"), "no slave configured with id 17");
    }

    #[test]
    fn io_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no response");
        let err = Error::from(io);
        assert!(format!("{err}").contains("no response"));
    }
}
