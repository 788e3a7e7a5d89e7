// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted bus and delay doubles for the tests.
//!
//! The bus records every addressed exchange in order and serves
//! register reads and raw FIFO reads from scripted values, so tests can
//! assert both the transaction log and the driver-visible data.

use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, Operation};
use std::collections::{BTreeMap, VecDeque};
use std::vec::Vec;

/// One observed, successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exchange {
    /// A plain write: bus address and the bytes written. Covers both
    /// register writes (`[register, value]`) and raw FIFO writes.
    Write(u8, Vec<u8>),
    /// A register read: bus address and register number.
    WriteRead(u8, u8),
    /// A raw FIFO read: bus address and length.
    Read(u8, usize),
}

/// Transport error returned by the scripted bus.
#[derive(Debug)]
pub struct Fault;

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scripted bus fault")
    }
}

impl i2c::Error for Fault {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// An I2C bus whose register and FIFO contents are scripted.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    /// Every successful exchange, in order.
    pub log: Vec<Exchange>,
    /// Fail this many upcoming transactions (without logging them).
    pub fail_transactions: u32,
    /// One-shot register values, served before the defaults.
    queued: BTreeMap<(u8, u8), VecDeque<u8>>,
    /// Persistent register values; unset registers read 0.
    defaults: BTreeMap<(u8, u8), u8>,
    /// Bytes served by raw reads, per bus address; exhausted reads
    /// yield 0.
    fifo: BTreeMap<u8, VecDeque<u8>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the persistent value a register reads as.
    pub fn set_register(&mut self, address: u8, register: u8, value: u8) {
        self.defaults.insert((address, register), value);
    }

    /// Queues a one-shot register value, served before the persistent
    /// one.
    pub fn queue_register(&mut self, address: u8, register: u8, value: u8) {
        self.queued.entry((address, register)).or_default().push_back(value);
    }

    /// Queues bytes to be served by raw reads at `address`.
    pub fn queue_fifo(&mut self, address: u8, data: &[u8]) {
        self.fifo.entry(address).or_default().extend(data);
    }

    fn register_value(&mut self, address: u8, register: u8) -> u8 {
        self.queued
            .get_mut(&(address, register))
            .and_then(VecDeque::pop_front)
            .or_else(|| self.defaults.get(&(address, register)).copied())
            .unwrap_or(0)
    }
}

impl ErrorType for ScriptedBus {
    type Error = Fault;
}

impl I2c for ScriptedBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Fault> {
        if self.fail_transactions > 0 {
            self.fail_transactions -= 1;
            return Err(Fault);
        }
        match operations {
            [Operation::Write(data)] => {
                self.log.push(Exchange::Write(address, data.to_vec()));
                Ok(())
            }
            [Operation::Write(request), Operation::Read(response)] if request.len() == 1 => {
                let register = request[0];
                let value = self.register_value(address, register);
                for slot in response.iter_mut() {
                    *slot = value;
                }
                self.log.push(Exchange::WriteRead(address, register));
                Ok(())
            }
            [Operation::Read(response)] => {
                let queue = self.fifo.entry(address).or_default();
                for slot in response.iter_mut() {
                    *slot = queue.pop_front().unwrap_or(0);
                }
                self.log.push(Exchange::Read(address, response.len()));
                Ok(())
            }
            _ => Err(Fault),
        }
    }
}

/// Delay provider that only counts how often it was asked to yield.
#[derive(Debug, Default)]
pub struct NoopDelay {
    /// Number of yields observed.
    pub delays: u32,
}

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {
        self.delays += 1;
    }
}
