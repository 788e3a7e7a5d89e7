// SPDX-License-Identifier: MIT OR Apache-2.0

//! # wk2132_driver
//!
//! Driver for the [WK2132][wk2132] I2C dual-UART bridge: two
//! independent serial channels behind one slow, transaction-oriented
//! bus.
//!
//! The WK2132 is unusual in that the bus address itself — not a
//! register offset — selects what is being addressed: the global
//! register bank, one of the two channels' register banks, or a
//! channel's raw FIFO. Within a channel bank, a global page selector
//! further multiplexes which physical registers answer at register
//! numbers `0x04..=0x08`. This crate hides all of that behind the
//! familiar five-operation serial contract ([`SerialPort`]) while
//! keeping the number of bus transactions low: received bytes are
//! pulled out of the hardware FIFO in bulk — one addressed exchange —
//! and cached in a local ring buffer, so clients reading one byte at a
//! time do not pay one bus round-trip per byte.
//!
//! ## Features
//!
//! - ✅ Both UART channels, each with independent line configuration
//! - ✅ `no_std`-compatible and allocation-free by design
//! - ✅ Generic over any [`embedded_hal::i2c::I2c`] bus and
//!   [`embedded_hal::delay::DelayNs`] yield source
//! - ✅ Bulk FIFO draining with a local receive cache, so
//!   byte-at-a-time client loops stay efficient
//! - ✅ Register layout and programming sequences derived directly from
//!   the datasheet, typed via `bitflags`
//!
//! ## Focus, Scope & Limitations
//!
//! The driver composes addressed bus exchanges; bus arbitration, clock
//! stretching and multi-device scheduling belong to the bus
//! implementation. All waiting is bounded-time polling — there is no
//! interrupt-driven I/O. Parity and stop bits are *programmed*, never
//! decoded.
//!
//! ## Example
//!
//! ```ignore
//! use wk2132_driver::{ChannelConfig, SerialPort, Wk2132};
//!
//! let configs = [ChannelConfig { baud_rate: 9600, ..Default::default() }; 2];
//! let mut device = Wk2132::new(i2c, delay, 0x70, 14_745_600, configs);
//! device.initialize()?;
//!
//! let mut port = device.channel(0);
//! port.write(b"hello")?;
//! port.flush()?;
//! while port.available() > 0 {
//!     // cheap: served from the local cache, not the bus
//!     let mut byte = [0u8; 1];
//!     port.read(&mut byte)?;
//! }
//! ```
//!
//! [wk2132]: http://www.wkmic.com/

#![no_std]
#![deny(
    clippy::all,
    clippy::cargo,
    clippy::must_use_candidate,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks
)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::all)]

#[cfg(test)]
extern crate std;

use core::fmt;

pub use crate::channel::{Channel, SerialPort};
pub use crate::config::{ChannelConfig, Parity, StopBits};
pub use crate::error::*;
use crate::channel::ChannelState;
use crate::spec::registers::{GENA, GRST, global};
use crate::spec::{CHANNEL_COUNT, Page, bus_address};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};

pub mod spec;

mod buffer;
mod channel;
mod config;
mod error;
#[cfg(test)]
mod mock;

/// One WK2132 device: the shared bus endpoint, the global page
/// selector, and both UART channels.
///
/// The device owns the bus handle and a delay provider (the explicit
/// yield point of the bounded polling loops). Channel operations are
/// reached through [`Wk2132::channel`], which returns a borrowing
/// [`Channel`] handle implementing [`SerialPort`].
///
/// # Page discipline
///
/// Exactly one register page is selected at any time and the selector
/// is shared by *both* channels, so it is owned here and mutated only
/// through one internal entry point. Page 0 is the resting state; every
/// sequence that needs page 1 restores page 0 before returning.
pub struct Wk2132<I2C, D> {
    bus: I2C,
    delay: D,
    /// Bus sub-address granted by the external address-select pins.
    base_address: u8,
    /// Clock reference for the baud-rate arithmetic.
    crystal_hz: u32,
    page: Page,
    /// Last bus address an exchange was issued to. Diagnostic only.
    last_bus_address: u8,
    comm_warning: bool,
    failed: bool,
    channels: [ChannelState; CHANNEL_COUNT],
}

impl<I2C, D> fmt::Debug for Wk2132<I2C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wk2132")
            .field("base_address", &self.base_address)
            .field("crystal_hz", &self.crystal_hz)
            .field("page", &self.page)
            .field("last_bus_address", &self.last_bus_address)
            .field("comm_warning", &self.comm_warning)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl<I2C: I2c, D: DelayNs> Wk2132<I2C, D> {
    /// Creates a driver for the device reachable at `base_address`.
    ///
    /// `crystal_hz` is the frequency of the crystal feeding the chip
    /// (commonly 14.7456 MHz). `configs` holds the line configuration
    /// of channel 0 and channel 1, in that order. Nothing is touched on
    /// the bus until [`Self::initialize`] is called.
    pub fn new(
        bus: I2C,
        delay: D,
        base_address: u8,
        crystal_hz: u32,
        configs: [ChannelConfig; CHANNEL_COUNT],
    ) -> Self {
        Self {
            bus,
            delay,
            base_address,
            crystal_hz,
            page: Page::Page0,
            last_bus_address: bus_address(base_address, 0, false),
            comm_warning: false,
            failed: false,
            channels: configs.map(ChannelState::new),
        }
    }

    /// Performs the one-time reset/enable sequence and configures both
    /// channels.
    ///
    /// The sequence is: probe the device by reading the global enable
    /// register, enable both channel clocks, soft-reset both channels,
    /// select page 0, then run each channel's setup in index order.
    ///
    /// A failed probe marks this device instance failed and configures
    /// nothing — fatal for this device only, other devices on the bus
    /// are unaffected. Later register write failures are logged and
    /// raise the warning flag but do not abort the remaining steps:
    /// partial configuration beats halting startup.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        log::info!(
            "setting up wk2132 with {CHANNEL_COUNT} uarts at @{:#04x}",
            self.base_address
        );

        if let Err(e) = self.read_register(0, global::GENA) {
            self.failed = true;
            log::error!("wk2132 at @{:#04x} does not answer, giving up", self.base_address);
            return Err(InitError::ProbeFailed(e));
        }

        // Enable both channel clocks.
        let _ = self.write_register(0, global::GENA, (GENA::C1EN | GENA::C2EN).bits());
        // Soft-reset both channels.
        let _ = self.write_register(0, global::GRST, (GRST::C1RST | GRST::C2RST).bits());
        // Establish the resting page.
        let _ = self.write_register(0, global::SPAGE, Page::Page0.bits());
        self.page = Page::Page0;

        for index in 0..CHANNEL_COUNT {
            self.setup_channel(index);
        }
        Ok(())
    }

    /// Drains every channel's hardware FIFO into its local receive
    /// buffer and returns the total number of bytes moved.
    ///
    /// Meant to be invoked once per scheduler tick to keep the caches
    /// warm. The returned total is diagnostic: correctness never
    /// depends on this being called, since the data-path operations
    /// also drain on demand.
    pub fn drain_all(&mut self) -> usize {
        let mut transferred = 0;
        for index in 0..CHANNEL_COUNT {
            transferred += self.drain_fifo_to_buffer(index);
        }
        if transferred > 0 {
            log::trace!("transferred {transferred} bytes from fifo to buffer");
        }
        transferred
    }

    /// Returns the handle for one UART channel.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid channel number.
    pub fn channel(&mut self, index: usize) -> Channel<'_, I2C, D> {
        assert!(index < CHANNEL_COUNT, "no such channel: {index}");
        Channel::new(self, index)
    }

    /// Whether the last bus exchange failed.
    ///
    /// Set on every transport failure and cleared again by the next
    /// successful exchange; the driver keeps operating either way.
    #[must_use]
    pub fn has_warning(&self) -> bool {
        self.comm_warning
    }

    /// Whether the initial communication probe failed.
    ///
    /// A failed device has no configured channels and will not recover
    /// without re-initialization.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// The bus address of the most recent exchange, for diagnostics.
    #[must_use]
    pub fn last_bus_address(&self) -> u8 {
        self.last_bus_address
    }

    /// Consumes the driver and hands back the bus and delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.bus, self.delay)
    }

    /* ----- Page selection -------------------------------------------------- */

    /// Selects the register page, skipping the bus write when the page
    /// is already current.
    ///
    /// The skip is a pure optimization — the write is idempotent — but
    /// every page change must come through here so the cached state
    /// stays the single source of truth.
    pub(crate) fn select_page(&mut self, page: Page) {
        if self.page == page {
            return;
        }
        let _ = self.write_register(0, global::SPAGE, page.bits());
        self.page = page;
    }

    /* ----- Register access ------------------------------------------------- */

    /// Reads one channel-bank (or global) register.
    ///
    /// One addressed exchange; no retry. Failures are logged, recorded
    /// in the warning flag and returned to the caller.
    pub(crate) fn read_register(&mut self, channel: u8, register: u8) -> Result<u8, BusError> {
        let address = bus_address(self.base_address, channel, false);
        self.last_bus_address = address;
        let mut value = [0u8];
        match self.bus.write_read(address, &[register], &mut value) {
            Ok(()) => {
                self.clear_warning();
                log::trace!(
                    "read @{address:#04x} r={register:#04x} ch={channel} -> {:#04x}",
                    value[0]
                );
                Ok(value[0])
            }
            Err(e) => {
                let e = BusError(e.kind());
                self.set_warning();
                log::error!("read @{address:#04x} r={register:#04x} ch={channel}: {e}");
                Err(e)
            }
        }
    }

    /// Writes one channel-bank (or global) register.
    pub(crate) fn write_register(
        &mut self,
        channel: u8,
        register: u8,
        value: u8,
    ) -> Result<(), BusError> {
        let address = bus_address(self.base_address, channel, false);
        self.last_bus_address = address;
        match self.bus.write(address, &[register, value]) {
            Ok(()) => {
                self.clear_warning();
                log::trace!("write @{address:#04x} r={register:#04x} ch={channel} <- {value:#04x}");
                Ok(())
            }
            Err(e) => {
                let e = BusError(e.kind());
                self.set_warning();
                log::error!(
                    "write @{address:#04x} r={register:#04x} ch={channel} <- {value:#04x}: {e}"
                );
                Err(e)
            }
        }
    }

    /// Read-modify-write of one register.
    ///
    /// Sequential, not atomic: the current value is read, `f` applied,
    /// and the result written back. A failed read skips the write and
    /// propagates the failure.
    pub(crate) fn modify_register(
        &mut self,
        channel: u8,
        register: u8,
        f: impl FnOnce(u8) -> u8,
    ) -> Result<(), BusError> {
        let value = self.read_register(channel, register)?;
        self.write_register(channel, register, f(value))
    }

    /* ----- Raw FIFO transport ---------------------------------------------- */

    /// Reads `buffer.len()` bytes straight out of a channel's hardware
    /// FIFO in one addressed exchange, bypassing register numbering.
    pub(crate) fn fifo_read(&mut self, channel: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        let address = bus_address(self.base_address, channel, true);
        self.last_bus_address = address;
        match self.bus.read(address, buffer) {
            Ok(()) => {
                self.clear_warning();
                Ok(())
            }
            Err(e) => {
                let e = BusError(e.kind());
                self.set_warning();
                log::error!("fifo read @{address:#04x} ch={channel} len={}: {e}", buffer.len());
                Err(e)
            }
        }
    }

    /// Writes `data` straight into a channel's hardware FIFO in one
    /// addressed exchange.
    pub(crate) fn fifo_write(&mut self, channel: u8, data: &[u8]) -> Result<(), BusError> {
        let address = bus_address(self.base_address, channel, true);
        self.last_bus_address = address;
        match self.bus.write(address, data) {
            Ok(()) => {
                self.clear_warning();
                Ok(())
            }
            Err(e) => {
                let e = BusError(e.kind());
                self.set_warning();
                log::error!("fifo write @{address:#04x} ch={channel} len={}: {e}", data.len());
                Err(e)
            }
        }
    }

    /* ----- Warning flag ---------------------------------------------------- */

    fn set_warning(&mut self) {
        if !self.comm_warning {
            log::warn!("wk2132 at @{:#04x}: bus communication degraded", self.base_address);
            self.comm_warning = true;
        }
    }

    fn clear_warning(&mut self) {
        self.comm_warning = false;
    }
}
