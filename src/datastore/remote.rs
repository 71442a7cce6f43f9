// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote slave contexts for forwarder/bridge scenarios
//!
//! A remote slave context looks like a local data model but forwards
//! every access through a Modbus client connection to another device.
//! A server built on top of it acts as a gateway: requests arriving on
//! one transport are answered with data read from a device on another.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    client::{Context, Reader as _, Writer as _},
    frame::{Address, Coil, Exception, Quantity, Word},
    slave::Slave,
};

use super::{BlockKind, DataBlock, DataResult, SlaveContext};

type SharedClient = Arc<Mutex<Context>>;

/// Build a slave context that forwards all data access to the given
/// slave behind the client connection.
///
/// Validation is left to the remote device, the auxiliary function
/// codes (diagnostics, event counters, identification) are answered
/// locally.
pub fn connect_slave(mut client: Context, slave: Slave) -> SlaveContext {
    use crate::client::Client as _;
    client.set_slave(slave);
    let client = Arc::new(Mutex::new(client));
    SlaveContext::new(
        Box::new(RemoteBitBlock {
            client: Arc::clone(&client),
            kind: BlockKind::DiscreteInputs,
        }),
        Box::new(RemoteBitBlock {
            client: Arc::clone(&client),
            kind: BlockKind::Coils,
        }),
        Box::new(RemoteWordBlock {
            client: Arc::clone(&client),
            kind: BlockKind::InputRegisters,
        }),
        Box::new(RemoteWordBlock {
            client,
            kind: BlockKind::HoldingRegisters,
        }),
    )
}

fn gateway_error(err: &crate::Error) -> Exception {
    log::warn!("Forwarded request failed: {err}");
    Exception::GatewayTargetDevice
}

#[derive(Debug)]
struct RemoteBitBlock {
    client: SharedClient,
    kind: BlockKind,
}

#[async_trait]
impl DataBlock<Coil> for RemoteBitBlock {
    fn validate(&self, _address: Address, _count: Quantity) -> bool {
        // Only the remote device knows its address layout
        true
    }

    fn get_values(&self, _address: Address, _count: Quantity) -> DataResult<Vec<Coil>> {
        // Blocking access through an async client is not available
        Err(Exception::GatewayPathUnavailable)
    }

    fn set_values(&mut self, _address: Address, _values: &[Coil]) -> DataResult<()> {
        Err(Exception::GatewayPathUnavailable)
    }

    fn reset(&mut self) {}

    async fn get_values_async(
        &mut self,
        address: Address,
        count: Quantity,
    ) -> DataResult<Vec<Coil>> {
        let mut client = self.client.lock().await;
        let result = match self.kind {
            BlockKind::Coils => client.read_coils(address, count).await,
            BlockKind::DiscreteInputs => client.read_discrete_inputs(address, count).await,
            _ => unreachable!("bit block with register kind"),
        };
        match result {
            Ok(Ok(bits)) => Ok(bits),
            Ok(Err(exc)) => Err(exc.exception),
            Err(err) => Err(gateway_error(&err)),
        }
    }

    async fn set_values_async(&mut self, address: Address, values: &[Coil]) -> DataResult<()> {
        if self.kind != BlockKind::Coils {
            return Err(Exception::IllegalFunction);
        }
        let mut client = self.client.lock().await;
        match client.write_multiple_coils(address, values).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(exc)) => Err(exc.exception),
            Err(err) => Err(gateway_error(&err)),
        }
    }
}

#[derive(Debug)]
struct RemoteWordBlock {
    client: SharedClient,
    kind: BlockKind,
}

#[async_trait]
impl DataBlock<Word> for RemoteWordBlock {
    fn validate(&self, _address: Address, _count: Quantity) -> bool {
        // Only the remote device knows its address layout
        true
    }

    fn get_values(&self, _address: Address, _count: Quantity) -> DataResult<Vec<Word>> {
        Err(Exception::GatewayPathUnavailable)
    }

    fn set_values(&mut self, _address: Address, _values: &[Word]) -> DataResult<()> {
        Err(Exception::GatewayPathUnavailable)
    }

    fn reset(&mut self) {}

    async fn get_values_async(
        &mut self,
        address: Address,
        count: Quantity,
    ) -> DataResult<Vec<Word>> {
        let mut client = self.client.lock().await;
        let result = match self.kind {
            BlockKind::HoldingRegisters => client.read_holding_registers(address, count).await,
            BlockKind::InputRegisters => client.read_input_registers(address, count).await,
            _ => unreachable!("word block with bit kind"),
        };
        match result {
            Ok(Ok(words)) => Ok(words),
            Ok(Err(exc)) => Err(exc.exception),
            Err(err) => Err(gateway_error(&err)),
        }
    }

    async fn set_values_async(&mut self, address: Address, values: &[Word]) -> DataResult<()> {
        if self.kind != BlockKind::HoldingRegisters {
            return Err(Exception::IllegalFunction);
        }
        let mut client = self.client.lock().await;
        match client.write_multiple_registers(address, values).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(exc)) => Err(exc.exception),
            Err(err) => Err(gateway_error(&err)),
        }
    }
}
