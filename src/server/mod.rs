// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus servers

pub mod ascii;

pub mod dispatch;

pub mod rtu;

pub mod tcp;

pub mod tls;

mod service;

pub use self::service::{DatastoreService, Service};

use std::io;

use futures_util::{sink::SinkExt as _, stream::StreamExt as _};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::{
    frame::{RequestAdu, ResponseAdu, SlaveRequest},
    slave::Slave,
};

/// The request-response loop shared by all server transports.
pub(crate) async fn process<T, C, S>(mut framed: Framed<T, C>, service: S) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    C: Decoder<Item = RequestAdu, Error = io::Error> + Encoder<ResponseAdu, Error = io::Error>,
    S: Service,
{
    loop {
        let Some(request) = framed.next().await else {
            // Transport closed
            break;
        };
        let RequestAdu { hdr, pdu } = request?;
        let slave_request = SlaveRequest {
            slave: Slave(hdr.unit_id),
            request: pdu.into(),
        };
        match service.call(slave_request).await {
            Some(pdu) => framed.send(ResponseAdu { hdr, pdu }).await?,
            None => log::debug!("No response for request {hdr:?}"),
        }
    }
    Ok(())
}
