// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    datastore::ServerContext,
    frame::{Exception, ExceptionResponse, ResponsePdu, SlaveRequest},
    server::dispatch,
};

/// A Modbus server service.
///
/// Implementations answer one request at a time. Returning `None`
/// sends nothing back, which is required for broadcast requests and
/// devices in listen-only mode.
#[async_trait]
pub trait Service: Send + Sync {
    async fn call(&self, request: SlaveRequest) -> Option<ResponsePdu>;
}

/// The standard service: requests run against a [`ServerContext`].
///
/// Routing follows the context: in single mode every unit id is
/// answered, in multi mode unknown ids are rejected with an illegal
/// data address exception. Broadcast requests execute against every
/// registered slave and are never answered.
#[derive(Debug, Clone)]
pub struct DatastoreService {
    context: Arc<Mutex<ServerContext>>,
}

impl DatastoreService {
    #[must_use]
    pub fn new(context: ServerContext) -> Self {
        Self {
            context: Arc::new(Mutex::new(context)),
        }
    }

    /// Access to the shared context, e.g. for updating process values
    /// while the server is running.
    #[must_use]
    pub fn context(&self) -> Arc<Mutex<ServerContext>> {
        Arc::clone(&self.context)
    }
}

#[async_trait]
impl Service for DatastoreService {
    async fn call(&self, request: SlaveRequest) -> Option<ResponsePdu> {
        let SlaveRequest { slave, request } = request;
        let mut context = self.context.lock().await;

        if slave.is_broadcast() {
            for slave_ctx in context.iter_mut() {
                let _ = dispatch::update_datastore(slave_ctx, request.clone()).await;
            }
            return None;
        }

        if !context.contains(slave) {
            log::warn!("Request for unknown slave {slave}");
            return Some(
                ExceptionResponse {
                    function: request.function_code(),
                    exception: Exception::IllegalDataAddress,
                }
                .into(),
            );
        }

        let slave_ctx = context.get_mut(slave).ok()?;
        let listen_only_before = slave_ctx.control().listen_only;
        let response = dispatch::update_datastore(slave_ctx, request).await;
        if listen_only_before || slave_ctx.control().listen_only {
            // The device keeps processing but stays silent from the
            // switch into listen-only mode until communications are
            // restarted.
            return None;
        }
        Some(response)
    }
}
