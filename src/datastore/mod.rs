// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-side data model
//!
//! A [`SlaveContext`] holds one data block per access kind: discrete
//! inputs and coils for bits, input and holding registers for words.
//! Blocks are either sequential (a contiguous range) or sparse (only
//! the populated addresses answer). A [`ServerContext`] routes unit
//! ids to slave contexts, either answering every id with a single
//! context or through an explicit id map.

pub mod control;

pub mod remote;

use std::{collections::BTreeMap, collections::HashMap, fmt};

use async_trait::async_trait;

use crate::{
    frame::{Address, Coil, Exception, FunctionCode, Quantity, Word},
    slave::{Slave, SlaveId},
    Error,
};

pub use self::control::{ControlBlock, Counters, DeviceIdentity};

/// Result of a data access. Failures map directly to the exception
/// code reported to the requesting client.
pub type DataResult<T> = Result<T, Exception>;

/// Storage for one kind of data items.
///
/// The asynchronous accessors default to the synchronous ones and only
/// need to be overridden by implementations with a remote or otherwise
/// non-blocking backing store. `get_values`/`set_values` are atomic
/// with respect to a single `(address, count)` extent.
#[async_trait]
pub trait DataBlock<T>: fmt::Debug + Send + Sync
where
    T: Copy + Send + Sync + 'static,
{
    /// Check whether the full extent is backed by storage.
    fn validate(&self, address: Address, count: Quantity) -> bool;

    /// Copy the values of the extent out of the store.
    fn get_values(&self, address: Address, count: Quantity) -> DataResult<Vec<T>>;

    /// Overwrite the extent starting at `address`.
    fn set_values(&mut self, address: Address, values: &[T]) -> DataResult<()>;

    /// Restore the state captured at construction.
    fn reset(&mut self);

    async fn get_values_async(&mut self, address: Address, count: Quantity) -> DataResult<Vec<T>> {
        self.get_values(address, count)
    }

    async fn set_values_async(&mut self, address: Address, values: &[T]) -> DataResult<()> {
        self.set_values(address, values)
    }
}

/// A contiguous block of values starting at a base address.
#[derive(Debug, Clone)]
pub struct SequentialDataBlock<T> {
    address: Address,
    values: Vec<T>,
    snapshot: Vec<T>,
}

impl<T> SequentialDataBlock<T>
where
    T: Copy + Send + Sync + 'static,
{
    pub fn new(address: Address, values: Vec<T>) -> Self {
        let snapshot = values.clone();
        Self {
            address,
            values,
            snapshot,
        }
    }

    /// A block of `count` identical values.
    pub fn filled(address: Address, count: usize, value: T) -> Self {
        Self::new(address, vec![value; count])
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl<T> DataBlock<T> for SequentialDataBlock<T>
where
    T: Copy + fmt::Debug + Send + Sync + 'static,
{
    fn validate(&self, address: Address, count: Quantity) -> bool {
        let base = u32::from(self.address);
        let start = u32::from(address);
        start >= base && start + u32::from(count) <= base + self.values.len() as u32
    }

    fn get_values(&self, address: Address, count: Quantity) -> DataResult<Vec<T>> {
        if !self.validate(address, count) {
            return Err(Exception::IllegalDataAddress);
        }
        let start = usize::from(address - self.address);
        Ok(self.values[start..start + usize::from(count)].to_vec())
    }

    fn set_values(&mut self, address: Address, values: &[T]) -> DataResult<()> {
        let count = crate::codec::u16_len(values.len());
        if !self.validate(address, count) {
            return Err(Exception::IllegalDataAddress);
        }
        let start = usize::from(address - self.address);
        self.values[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }

    fn reset(&mut self) {
        self.values.clone_from(&self.snapshot);
    }
}

/// A block backed by an address map, allowing arbitrary gaps.
///
/// Many field devices implement their register map this way: a read
/// covering an unpopulated address fails instead of returning filler
/// values. Unless the block is `mutable`, writes are confined to the
/// populated addresses as well.
#[derive(Debug, Clone)]
pub struct SparseDataBlock<T> {
    values: BTreeMap<Address, T>,
    snapshot: BTreeMap<Address, T>,
    mutable: bool,
}

impl<T> SparseDataBlock<T>
where
    T: Copy + Send + Sync + 'static,
{
    /// A mutable sparse block: writes may register new addresses.
    pub fn new(values: impl IntoIterator<Item = (Address, T)>) -> Self {
        Self::with_mutability(values, true)
    }

    /// An immutable sparse block: the populated addresses are final.
    pub fn immutable(values: impl IntoIterator<Item = (Address, T)>) -> Self {
        Self::with_mutability(values, false)
    }

    fn with_mutability(values: impl IntoIterator<Item = (Address, T)>, mutable: bool) -> Self {
        let values: BTreeMap<_, _> = values.into_iter().collect();
        let snapshot = values.clone();
        Self {
            values,
            snapshot,
            mutable,
        }
    }

    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl<T> DataBlock<T> for SparseDataBlock<T>
where
    T: Copy + fmt::Debug + Send + Sync + 'static,
{
    fn validate(&self, address: Address, count: Quantity) -> bool {
        (0..u32::from(count)).all(|offset| {
            let addr = u32::from(address) + offset;
            addr <= u32::from(Address::MAX) && self.values.contains_key(&(addr as Address))
        })
    }

    fn get_values(&self, address: Address, count: Quantity) -> DataResult<Vec<T>> {
        if !self.validate(address, count) {
            return Err(Exception::IllegalDataAddress);
        }
        Ok((0..count)
            .map(|offset| self.values[&(address + offset)])
            .collect())
    }

    fn set_values(&mut self, address: Address, values: &[T]) -> DataResult<()> {
        let count = crate::codec::u16_len(values.len());
        if u32::from(address) + u32::from(count) > u32::from(Address::MAX) + 1 {
            return Err(Exception::IllegalDataAddress);
        }
        if !self.mutable && !self.validate(address, count) {
            return Err(Exception::IllegalDataAddress);
        }
        for (offset, value) in values.iter().enumerate() {
            self.values.insert(address + offset as Address, *value);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.values.clone_from(&self.snapshot);
    }
}

/// The four access kinds of the Modbus data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Coils,
    DiscreteInputs,
    HoldingRegisters,
    InputRegisters,
}

impl BlockKind {
    /// The block a function code operates on.
    #[must_use]
    pub fn of_function(fn_code: FunctionCode) -> Option<Self> {
        let kind = match fn_code {
            0x01 | 0x05 | 0x0F => Self::Coils,
            0x02 => Self::DiscreteInputs,
            0x03 | 0x06 | 0x10 | 0x16 | 0x17 => Self::HoldingRegisters,
            0x04 => Self::InputRegisters,
            0x18 => Self::HoldingRegisters,
            _ => return None,
        };
        Some(kind)
    }
}

/// The data model of one slave device.
#[derive(Debug)]
pub struct SlaveContext {
    discrete_inputs: Box<dyn DataBlock<Coil>>,
    coils: Box<dyn DataBlock<Coil>>,
    input_registers: Box<dyn DataBlock<Word>>,
    holding_registers: Box<dyn DataBlock<Word>>,
    control: ControlBlock,
    files: HashMap<u16, SparseDataBlock<Word>>,
}

impl Default for SlaveContext {
    /// A context covering the full address space, initialized to zero.
    fn default() -> Self {
        Self::new(
            Box::new(SequentialDataBlock::filled(0, 0x10000, false)),
            Box::new(SequentialDataBlock::filled(0, 0x10000, false)),
            Box::new(SequentialDataBlock::filled(0, 0x10000, 0)),
            Box::new(SequentialDataBlock::filled(0, 0x10000, 0)),
        )
    }
}

impl SlaveContext {
    pub fn new(
        discrete_inputs: Box<dyn DataBlock<Coil>>,
        coils: Box<dyn DataBlock<Coil>>,
        input_registers: Box<dyn DataBlock<Word>>,
        holding_registers: Box<dyn DataBlock<Word>>,
    ) -> Self {
        Self {
            discrete_inputs,
            coils,
            input_registers,
            holding_registers,
            control: ControlBlock::new(DeviceIdentity::default()),
            files: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.control.identity = identity;
        self
    }

    pub fn control(&self) -> &ControlBlock {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut ControlBlock {
        &mut self.control
    }

    pub fn coils_mut(&mut self) -> &mut dyn DataBlock<Coil> {
        self.coils.as_mut()
    }

    pub fn discrete_inputs_mut(&mut self) -> &mut dyn DataBlock<Coil> {
        self.discrete_inputs.as_mut()
    }

    pub fn holding_registers_mut(&mut self) -> &mut dyn DataBlock<Word> {
        self.holding_registers.as_mut()
    }

    pub fn input_registers_mut(&mut self) -> &mut dyn DataBlock<Word> {
        self.input_registers.as_mut()
    }

    /// The bit block of the given kind, if it is a bit kind.
    pub fn bit_block_mut(&mut self, kind: BlockKind) -> Option<&mut dyn DataBlock<Coil>> {
        match kind {
            BlockKind::Coils => Some(self.coils.as_mut()),
            BlockKind::DiscreteInputs => Some(self.discrete_inputs.as_mut()),
            BlockKind::HoldingRegisters | BlockKind::InputRegisters => None,
        }
    }

    /// The word block of the given kind, if it is a register kind.
    pub fn word_block_mut(&mut self, kind: BlockKind) -> Option<&mut dyn DataBlock<Word>> {
        match kind {
            BlockKind::HoldingRegisters => Some(self.holding_registers.as_mut()),
            BlockKind::InputRegisters => Some(self.input_registers.as_mut()),
            BlockKind::Coils | BlockKind::DiscreteInputs => None,
        }
    }

    /// The word-addressed record store of one file, created on first
    /// write access.
    pub fn file_mut(&mut self, file_number: u16) -> &mut SparseDataBlock<Word> {
        self.files
            .entry(file_number)
            .or_insert_with(|| SparseDataBlock::new([]))
    }

    #[must_use]
    pub fn file(&self, file_number: u16) -> Option<&SparseDataBlock<Word>> {
        self.files.get(&file_number)
    }

    /// Restore all blocks to their construction snapshots.
    pub fn reset(&mut self) {
        self.discrete_inputs.reset();
        self.coils.reset();
        self.input_registers.reset();
        self.holding_registers.reset();
        for file in self.files.values_mut() {
            file.reset();
        }
    }
}

/// The slave devices served by one server.
#[derive(Debug)]
pub enum ServerContext {
    /// One context answers every unit id.
    Single(SlaveContext),
    /// Explicit unit id routing; requests for unlisted ids fail.
    Multi(HashMap<SlaveId, SlaveContext>),
}

impl ServerContext {
    #[must_use]
    pub fn single(context: SlaveContext) -> Self {
        Self::Single(context)
    }

    pub fn with_slaves(contexts: impl IntoIterator<Item = (SlaveId, SlaveContext)>) -> Self {
        Self::Multi(contexts.into_iter().collect())
    }

    /// Check whether requests for the unit id can be served.
    ///
    /// The broadcast id is always contained.
    #[must_use]
    pub fn contains(&self, slave: Slave) -> bool {
        match self {
            Self::Single(_) => true,
            Self::Multi(contexts) => {
                slave.is_broadcast() || contexts.contains_key(&SlaveId::from(slave))
            }
        }
    }

    pub fn get_mut(&mut self, slave: Slave) -> Result<&mut SlaveContext, Error> {
        match self {
            Self::Single(context) => Ok(context),
            Self::Multi(contexts) => contexts
                .get_mut(&SlaveId::from(slave))
                .ok_or(Error::NoSuchSlave(slave.into())),
        }
    }

    /// All registered contexts, e.g. for executing a broadcast request.
    pub fn iter_mut(&mut self) -> Box<dyn Iterator<Item = &mut SlaveContext> + Send + '_> {
        match self {
            Self::Single(context) => Box::new(std::iter::once(context)),
            Self::Multi(contexts) => Box::new(contexts.values_mut()),
        }
    }
}
