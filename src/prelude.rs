// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types

///////////////////////////////////////////////////////////////////
// Modules
///////////////////////////////////////////////////////////////////
pub use crate::client;

#[allow(missing_docs)]
pub mod sync {
    pub use crate::client::sync::*;
}

#[allow(missing_docs)]
pub mod rtu {
    pub use crate::client::rtu::*;
}

#[allow(missing_docs)]
pub mod tcp {
    pub use crate::client::tcp::*;
}

pub use crate::{datastore, server};

///////////////////////////////////////////////////////////////////
// Structs
///////////////////////////////////////////////////////////////////
pub use crate::frame::{
    Exception, ExceptionResponse, FileRecord, FileSubRequest, Request, Response, SlaveRequest,
    SubFunction,
};

pub use crate::slave::{Slave, SlaveId};

pub use crate::datastore::{
    DataBlock, SequentialDataBlock, ServerContext, SlaveContext, SparseDataBlock,
};

pub use crate::transaction::{Trace, TransactionOptions};

pub use crate::{Error, Result};

///////////////////////////////////////////////////////////////////
// Traits
///////////////////////////////////////////////////////////////////
pub use crate::client::{Client, Reader, Writer};

pub use crate::client::sync::Client as SyncClient;

pub use crate::client::sync::Reader as SyncReader;

pub use crate::client::sync::Writer as SyncWriter;

pub use crate::server::{DatastoreService, Service};
