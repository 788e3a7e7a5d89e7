// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel driver logic: setup, the five-operation byte-stream
//! contract, and the FIFO drain that keeps it cheap.
//!
//! All bus traffic of a channel routes through the owning [`Wk2132`],
//! which holds the shared page selector; a channel never tracks the
//! page itself.

use crate::buffer::RingBuffer;
use crate::config::{ChannelConfig, StopBits};
use crate::error::{FlushTimeout, ReadUnderrun, WriteError};
use crate::spec::registers::{FCR, FSR, LCR, SCR, page0, page1};
use crate::spec::{FIFO_SIZE, Page, XFER_MAX_SIZE, baud_divisor};
use crate::Wk2132;
use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// Wall-clock budget of the bounded waits (flush, safe-mode reads and
/// writes).
const POLL_BUDGET_MS: u32 = 100;
/// The quantum yielded to the delay provider between two polls.
const POLL_INTERVAL_US: u32 = 1_000;
/// Number of polls that fit the budget.
const POLL_ATTEMPTS: u32 = POLL_BUDGET_MS * 1_000 / POLL_INTERVAL_US;

/// Per-channel state owned by the device.
pub(crate) struct ChannelState {
    pub(crate) config: ChannelConfig,
    /// Local cache of bytes drained from the hardware receive FIFO.
    /// Holds exactly one bus transaction's worth.
    pub(crate) rx_buffer: RingBuffer<XFER_MAX_SIZE>,
}

impl ChannelState {
    pub(crate) fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            rx_buffer: RingBuffer::new(),
        }
    }
}

/// The byte-stream contract of one UART channel.
///
/// This is the whole consumer-facing surface: check, peek, read, write,
/// flush. Framework bindings adapt this trait; the driver itself stays
/// framework-free.
pub trait SerialPort {
    /// Number of received bytes ready to be read.
    ///
    /// If the local cache is empty, one drain of the hardware FIFO is
    /// attempted first.
    fn available(&mut self) -> usize;

    /// The next received byte, without consuming it.
    ///
    /// Drains once if the local cache is empty.
    fn peek_byte(&mut self) -> Option<u8>;

    /// Copies received bytes into `buffer`, consuming them.
    ///
    /// Fills the whole buffer or reports a [`ReadUnderrun`] carrying
    /// how much was actually copied. The caller is expected to have
    /// sized the request via [`Self::available`]; this call does not
    /// wait for more data to arrive (unless the channel is in safe
    /// mode, where it waits a bounded time for the full request).
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, ReadUnderrun>;

    /// Hands `data` to the device's transmit FIFO in one bus
    /// transaction and returns how many bytes were accepted.
    ///
    /// Requests beyond the single-transfer limit are truncated (and
    /// logged). There is no local transmit buffering — back-pressure is
    /// the caller's job, via [`Self::flush`].
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError>;

    /// Waits (bounded) until the transmit FIFO has fully drained.
    ///
    /// Best effort: on timeout the transmitter keeps sending on its
    /// own and [`FlushTimeout`] reports the residual byte count.
    fn flush(&mut self) -> Result<(), FlushTimeout>;
}

/// Borrowing handle to one UART channel of a [`Wk2132`].
///
/// Obtained from [`Wk2132::channel`]; implements [`SerialPort`].
pub struct Channel<'a, I2C, D> {
    device: &'a mut Wk2132<I2C, D>,
    index: usize,
}

impl<I2C, D> fmt::Debug for Channel<'_, I2C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<'a, I2C: I2c, D: DelayNs> Channel<'a, I2C, D> {
    pub(crate) fn new(device: &'a mut Wk2132<I2C, D>, index: usize) -> Self {
        Self { device, index }
    }

    /// The channel number, 0 or 1.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The line configuration this channel was created with.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.device.channels[self.index].config
    }

    /// Drains the hardware receive FIFO into the local cache.
    ///
    /// Returns the number of bytes moved. The data-path operations do
    /// this on demand; calling it proactively merely keeps the cache
    /// warm.
    pub fn drain(&mut self) -> usize {
        self.device.drain_fifo_to_buffer(self.index)
    }
}

impl<I2C: I2c, D: DelayNs> SerialPort for Channel<'_, I2C, D> {
    fn available(&mut self) -> usize {
        self.device.channel_available(self.index)
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.device.channel_peek(self.index)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, ReadUnderrun> {
        self.device.channel_read(self.index, buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        self.device.channel_write(self.index, data)
    }

    fn flush(&mut self) -> Result<(), FlushTimeout> {
        self.device.channel_flush(self.index)
    }
}

impl<I2C: I2c, D: DelayNs> Wk2132<I2C, D> {
    /* ----- Setup ----------------------------------------------------------- */

    /// Runs the per-channel setup sequence once.
    ///
    /// Each step is attempted even if an earlier register write failed;
    /// the failures are logged and reflected in the warning flag.
    pub(crate) fn setup_channel(&mut self, index: usize) {
        let ch = index as u8;
        log::info!("setting up uart channel {ch}");
        // Enable transmit and receive.
        let _ = self.write_register(ch, page0::SCR, (SCR::RXEN | SCR::TXEN).bits());
        // Reset and enable both FIFOs in a single write.
        let _ = self.write_register(
            ch,
            page0::FCR,
            (FCR::TFEN | FCR::RFEN | FCR::TFRST | FCR::RFRST).bits(),
        );
        self.channels[index].rx_buffer.clear();
        self.set_line_param(index);
        self.set_baud_rate(index);
    }

    /// Programs stop bits and parity into the line-configuration
    /// register.
    fn set_line_param(&mut self, index: usize) {
        let ch = index as u8;
        let config = self.channels[index].config;
        if config.data_bits != 8 {
            log::warn!(
                "channel {ch}: {} data bits not supported, using 8",
                config.data_bits
            );
        }
        let stop = match config.stop_bits {
            StopBits::One => LCR::empty(),
            StopBits::Two => LCR::STPL,
        };
        let parity = config.parity.lcr_bits();
        // Clear the low nibble (stop length and parity fields), keep
        // the rest.
        let _ = self.modify_register(ch, page0::LCR, |lcr| {
            (lcr & 0xF0) | stop.bits() | parity.bits()
        });
        log::debug!(
            "channel {ch}: line config 8 data bits, {:?} stop bits, parity {:?}",
            config.stop_bits,
            config.parity
        );
    }

    /// Programs the baud-rate registers.
    ///
    /// The three registers only exist under page 1, whose numbers alias
    /// unrelated page-0 registers — selecting the page here is
    /// mandatory, and page 0 is restored unconditionally afterwards so
    /// the next operation on either channel finds the resting state.
    fn set_baud_rate(&mut self, index: usize) {
        let ch = index as u8;
        let baud = self.channels[index].config.baud_rate;
        let (divisor, frac) = baud_divisor(self.crystal_hz, baud);

        self.select_page(Page::Page1);
        let _ = self.write_register(ch, page1::BRH, (divisor >> 8) as u8);
        let _ = self.write_register(ch, page1::BRL, (divisor & 0xFF) as u8);
        let _ = self.write_register(ch, page1::BRD, frac);
        self.select_page(Page::Page0);

        log::debug!(
            "channel {ch}: crystal={} baud={baud} -> registers [{} {} {frac}]",
            self.crystal_hz,
            divisor >> 8,
            divisor & 0xFF
        );
    }

    /* ----- FIFO occupancy -------------------------------------------------- */

    /// Number of bytes waiting in the hardware receive FIFO.
    ///
    /// The count register is 8 bits wide while the FIFO holds 256
    /// bytes, so a full FIFO reads 0; the status register's emptiness
    /// flag disambiguates.
    fn rx_fifo_level(&mut self, index: usize) -> usize {
        let ch = index as u8;
        let count = self.read_register(ch, page0::RFCNT).unwrap_or(0) as usize;
        if count == 0 {
            let fsr = FSR::from_bits_retain(self.read_register(ch, page0::FSR).unwrap_or(0));
            if fsr.contains(FSR::RFEMPTY) {
                return FIFO_SIZE;
            }
        }
        count
    }

    /// Number of bytes waiting in the hardware transmit FIFO, with the
    /// same 256-reads-as-0 disambiguation as [`Self::rx_fifo_level`].
    fn tx_fifo_level(&mut self, index: usize) -> usize {
        let ch = index as u8;
        let count = self.read_register(ch, page0::TFCNT).unwrap_or(0) as usize;
        if count == 0 {
            let fsr = FSR::from_bits_retain(self.read_register(ch, page0::FSR).unwrap_or(0));
            if fsr.contains(FSR::TFFULL) {
                return FIFO_SIZE;
            }
        }
        count
    }

    fn tx_fifo_not_empty(&mut self, index: usize) -> bool {
        let ch = index as u8;
        FSR::from_bits_retain(self.read_register(ch, page0::FSR).unwrap_or(0))
            .contains(FSR::TFEMPTY)
    }

    /* ----- Drain ------------------------------------------------------------ */

    /// Moves waiting bytes from the hardware receive FIFO into the
    /// channel's local cache with a single bus transaction.
    ///
    /// Returns the number of bytes moved; 0 when there is nothing to do
    /// or no room, which is not an error.
    pub(crate) fn drain_fifo_to_buffer(&mut self, index: usize) -> usize {
        let ch = index as u8;
        let in_fifo = self.rx_fifo_level(index);
        let free = self.channels[index].rx_buffer.free();
        // Whatever does not fit now is picked up by the next drain.
        let amount = in_fifo.min(free).min(XFER_MAX_SIZE);
        if amount == 0 {
            return 0;
        }

        let mut data = [0u8; XFER_MAX_SIZE];
        if self.fifo_read(ch, &mut data[..amount]).is_err() {
            return 0;
        }
        for &byte in &data[..amount] {
            let pushed = self.channels[index].rx_buffer.push(byte);
            // `amount` was clamped to the cache's free space; a failed
            // push means the single-context access rule was broken.
            assert!(pushed, "receive cache overflow during drain");
        }
        log::trace!("channel {ch}: drained {amount} bytes into the local cache");
        amount
    }

    /* ----- Data path -------------------------------------------------------- */

    pub(crate) fn channel_available(&mut self, index: usize) -> usize {
        if self.channels[index].rx_buffer.is_empty() {
            self.drain_fifo_to_buffer(index);
        }
        self.channels[index].rx_buffer.count()
    }

    pub(crate) fn channel_peek(&mut self, index: usize) -> Option<u8> {
        if self.channels[index].rx_buffer.is_empty() {
            self.drain_fifo_to_buffer(index);
        }
        self.channels[index].rx_buffer.peek()
    }

    pub(crate) fn channel_read(
        &mut self,
        index: usize,
        buffer: &mut [u8],
    ) -> Result<usize, ReadUnderrun> {
        let ch = index as u8;
        let requested = buffer.len();

        if self.channels[index].config.safe_mode {
            // Wait (bounded) until the full request is cached.
            let mut attempts = POLL_ATTEMPTS;
            while self.channels[index].rx_buffer.count() < requested {
                self.drain_fifo_to_buffer(index);
                if self.channels[index].rx_buffer.count() >= requested || attempts == 0 {
                    break;
                }
                attempts -= 1;
                self.delay.delay_us(POLL_INTERVAL_US);
            }
        }

        let available = self.channels[index].rx_buffer.count();
        let copied = requested.min(available);
        for slot in &mut buffer[..copied] {
            let Some(byte) = self.channels[index].rx_buffer.pop() else {
                unreachable!("copied was clamped to the cached count");
            };
            *slot = byte;
        }

        if copied < requested {
            log::warn!(
                "channel {ch}: read underrun, requested {requested} bytes only {copied} available"
            );
            return Err(ReadUnderrun {
                requested,
                available: copied,
            });
        }
        Ok(copied)
    }

    pub(crate) fn channel_write(
        &mut self,
        index: usize,
        data: &[u8],
    ) -> Result<usize, WriteError> {
        let ch = index as u8;
        let mut len = data.len();
        if len > XFER_MAX_SIZE {
            log::error!(
                "channel {ch}: write of {len} bytes exceeds the {XFER_MAX_SIZE}-byte transfer \
                 limit, truncating"
            );
            len = XFER_MAX_SIZE;
        }

        if self.channels[index].config.safe_mode {
            // Wait (bounded) for enough room in the transmit FIFO; on
            // timeout send as much as fits.
            let mut attempts = POLL_ATTEMPTS;
            loop {
                let room = FIFO_SIZE - self.tx_fifo_level(index);
                if room >= len {
                    break;
                }
                if attempts == 0 {
                    log::error!(
                        "channel {ch}: transmit FIFO still has room for only {room} of {len} \
                         bytes, truncating"
                    );
                    len = room;
                    break;
                }
                attempts -= 1;
                self.delay.delay_us(POLL_INTERVAL_US);
            }
        }

        if len == 0 {
            return Ok(0);
        }
        match self.fifo_write(ch, &data[..len]) {
            Ok(()) => Ok(len),
            Err(e) => Err(WriteError::Bus(e)),
        }
    }

    pub(crate) fn channel_flush(&mut self, index: usize) -> Result<(), FlushTimeout> {
        let ch = index as u8;
        let mut attempts = POLL_ATTEMPTS;
        while self.tx_fifo_not_empty(index) {
            if attempts == 0 {
                let remaining = self.tx_fifo_level(index);
                log::error!("channel {ch}: flush timed out, still {remaining} bytes not sent");
                return Err(FlushTimeout { remaining });
            }
            attempts -= 1;
            // Yield the quantum so other cooperative work can run.
            self.delay.delay_us(POLL_INTERVAL_US);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Exchange, NoopDelay, ScriptedBus};
    use crate::spec::registers::page0;
    use std::vec;
    use std::vec::Vec;

    const BASE: u8 = 0x70;

    fn device(bus: ScriptedBus) -> Wk2132<ScriptedBus, NoopDelay> {
        Wk2132::new(
            bus,
            NoopDelay::default(),
            BASE,
            14_745_600,
            [ChannelConfig::default(); 2],
        )
    }

    fn safe_device(bus: ScriptedBus) -> Wk2132<ScriptedBus, NoopDelay> {
        let config = ChannelConfig {
            safe_mode: true,
            ..Default::default()
        };
        Wk2132::new(bus, NoopDelay::default(), BASE, 14_745_600, [config; 2])
    }

    #[test]
    fn drain_is_clamped_by_cache_room() {
        let mut bus = ScriptedBus::new();
        bus.set_register(BASE, page0::RFCNT, 50);
        bus.queue_fifo(0x71, &(0..50u8).collect::<Vec<u8>>());
        let mut dev = device(bus);
        // Leave room for exactly 20 bytes.
        for _ in 0..XFER_MAX_SIZE - 20 {
            dev.channels[0].rx_buffer.push(0xEE);
        }

        assert_eq!(dev.drain_fifo_to_buffer(0), 20);
        assert_eq!(dev.channels[0].rx_buffer.count(), XFER_MAX_SIZE);
        let (bus, _) = dev.release();
        assert_eq!(*bus.log.last().unwrap(), Exchange::Read(0x71, 20));
    }

    #[test]
    fn drain_of_idle_channel_does_nothing() {
        let mut dev = device(ScriptedBus::new());
        assert_eq!(dev.drain_fifo_to_buffer(0), 0);
        let (bus, _) = dev.release();
        // Only the count register was consulted, no FIFO transaction.
        assert_eq!(
            bus.log,
            vec![
                Exchange::WriteRead(BASE, page0::RFCNT),
                Exchange::WriteRead(BASE, page0::FSR),
            ]
        );
    }

    #[test]
    fn full_fifo_reads_zero_but_drains_a_full_transfer() {
        let mut bus = ScriptedBus::new();
        // RFCNT = 0 but the status register says "not empty": the
        // 8-bit counter cannot represent 256.
        bus.set_register(BASE, page0::FSR, FSR::RFEMPTY.bits());
        bus.queue_fifo(0x71, &[0xAB; 256]);
        let mut dev = device(bus);

        assert_eq!(dev.drain_fifo_to_buffer(0), XFER_MAX_SIZE);
        assert_eq!(dev.channels[0].rx_buffer.count(), XFER_MAX_SIZE);
    }

    #[test]
    fn transmit_fifo_level_disambiguates_full_from_empty() {
        let mut bus = ScriptedBus::new();
        bus.set_register(BASE, page0::FSR, FSR::TFFULL.bits());
        let mut dev = device(bus);
        assert_eq!(dev.tx_fifo_level(0), FIFO_SIZE);
    }

    #[test]
    fn available_drains_once_when_cache_is_empty() {
        let mut bus = ScriptedBus::new();
        bus.set_register(BASE, page0::RFCNT, 3);
        bus.queue_fifo(0x71, &[1, 2, 3]);
        let mut dev = device(bus);
        assert_eq!(dev.channel(0).available(), 3);
        // Cached now: no further bus traffic.
        let traffic = dev.bus.log.len();
        assert_eq!(dev.channel(0).available(), 3);
        assert_eq!(dev.bus.log.len(), traffic);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut bus = ScriptedBus::new();
        bus.set_register(BASE, page0::RFCNT, 1);
        bus.queue_fifo(0x71, &[0x42]);
        let mut dev = device(bus);
        let mut port = dev.channel(0);
        assert_eq!(port.peek_byte(), Some(0x42));
        assert_eq!(port.peek_byte(), Some(0x42));
        assert_eq!(port.available(), 1);
    }

    #[test]
    fn short_read_copies_what_exists_and_reports_the_shortfall() {
        let mut dev = device(ScriptedBus::new());
        for byte in [10, 11, 12, 13, 14] {
            dev.channels[0].rx_buffer.push(byte);
        }
        let mut out = [0u8; 10];
        let result = dev.channel(0).read(&mut out);
        assert_eq!(
            result,
            Err(ReadUnderrun {
                requested: 10,
                available: 5
            })
        );
        assert_eq!(&out[..5], &[10, 11, 12, 13, 14]);
        assert!(dev.channels[0].rx_buffer.is_empty());
    }

    #[test]
    fn read_does_not_touch_the_bus() {
        let mut dev = device(ScriptedBus::new());
        dev.channels[0].rx_buffer.push(1);
        let mut out = [0u8; 1];
        assert_eq!(dev.channel(0).read(&mut out), Ok(1));
        let (bus, _) = dev.release();
        assert!(bus.log.is_empty());
    }

    #[test]
    fn safe_mode_read_waits_for_the_full_request() {
        let mut bus = ScriptedBus::new();
        // Nothing on the first level check, three bytes on the second.
        bus.queue_register(BASE, page0::RFCNT, 0);
        bus.set_register(BASE, page0::RFCNT, 3);
        bus.queue_fifo(0x71, &[7, 8, 9]);
        let mut dev = safe_device(bus);
        let mut out = [0u8; 3];
        assert_eq!(dev.channel(0).read(&mut out), Ok(3));
        assert_eq!(out, [7, 8, 9]);
    }

    #[test]
    fn safe_mode_read_times_out_short() {
        let mut bus = ScriptedBus::new();
        bus.queue_register(BASE, page0::RFCNT, 1);
        bus.queue_fifo(0x71, &[0x55]);
        let mut dev = safe_device(bus);
        let mut out = [0u8; 3];
        assert_eq!(
            dev.channel(0).read(&mut out),
            Err(ReadUnderrun {
                requested: 3,
                available: 1
            })
        );
        assert_eq!(out[0], 0x55);
        let (_, delay) = dev.release();
        assert_eq!(delay.delays, POLL_ATTEMPTS);
    }

    #[test]
    fn write_goes_straight_to_the_fifo_address() {
        let mut dev = device(ScriptedBus::new());
        assert_eq!(dev.channel(1).write(&[0xDE, 0xAD]), Ok(2));
        let (bus, _) = dev.release();
        assert_eq!(bus.log, vec![Exchange::Write(0x73, vec![0xDE, 0xAD])]);
    }

    #[test]
    fn oversized_write_is_truncated_to_one_transfer() {
        let mut dev = device(ScriptedBus::new());
        let data = [0x33u8; 300];
        assert_eq!(dev.channel(0).write(&data), Ok(XFER_MAX_SIZE));
        let (bus, _) = dev.release();
        match &bus.log[0] {
            Exchange::Write(address, bytes) => {
                assert_eq!(*address, 0x71);
                assert_eq!(bytes.len(), XFER_MAX_SIZE);
            }
            other => panic!("unexpected exchange: {other:?}"),
        }
    }

    #[test]
    fn safe_mode_write_waits_for_fifo_room() {
        let mut bus = ScriptedBus::new();
        // 250 bytes pending on the first check, 100 on the second.
        bus.queue_register(BASE, page0::TFCNT, 250);
        bus.set_register(BASE, page0::TFCNT, 100);
        let mut dev = safe_device(bus);
        assert_eq!(dev.channel(0).write(&[0u8; 10]), Ok(10));
        let (_, delay) = dev.release();
        assert_eq!(delay.delays, 1);
    }

    #[test]
    fn safe_mode_write_truncates_on_timeout() {
        let mut bus = ScriptedBus::new();
        bus.set_register(BASE, page0::TFCNT, 250);
        let mut dev = safe_device(bus);
        assert_eq!(dev.channel(0).write(&[0u8; 10]), Ok(6));
        let (bus, delay) = dev.release();
        assert_eq!(delay.delays, POLL_ATTEMPTS);
        match bus.log.last().unwrap() {
            Exchange::Write(address, bytes) => {
                assert_eq!(*address, 0x71);
                assert_eq!(bytes.len(), 6);
            }
            other => panic!("unexpected exchange: {other:?}"),
        }
    }

    #[test]
    fn flush_returns_once_the_transmitter_is_empty() {
        let mut bus = ScriptedBus::new();
        // Busy twice, then drained.
        bus.queue_register(BASE, page0::FSR, FSR::TFEMPTY.bits());
        bus.queue_register(BASE, page0::FSR, FSR::TFEMPTY.bits());
        let mut dev = device(bus);
        assert_eq!(dev.channel(0).flush(), Ok(()));
        let (_, delay) = dev.release();
        assert_eq!(delay.delays, 2);
    }

    #[test]
    fn flush_gives_up_after_its_budget() {
        let mut bus = ScriptedBus::new();
        bus.set_register(BASE, page0::FSR, FSR::TFEMPTY.bits());
        bus.set_register(BASE, page0::TFCNT, 3);
        let mut dev = device(bus);
        assert_eq!(dev.channel(0).flush(), Err(FlushTimeout { remaining: 3 }));
        let (_, delay) = dev.release();
        assert_eq!(delay.delays, POLL_ATTEMPTS);
    }

    #[test]
    fn baud_programming_selects_page_1_and_restores_page_0() {
        let mut dev = device(ScriptedBus::new());
        dev.set_baud_rate(0);
        // Exactly one page-select write of each value, bracketing the
        // three baud registers.
        assert_eq!(
            dev.bus.log,
            vec![
                Exchange::Write(BASE, vec![0x03, 0x01]),
                Exchange::Write(BASE, vec![0x04, 0x00]),
                Exchange::Write(BASE, vec![0x05, 0x07]),
                Exchange::Write(BASE, vec![0x06, 0x00]),
                Exchange::Write(BASE, vec![0x03, 0x00]),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "no such channel")]
    fn channel_index_is_checked() {
        let mut dev = device(ScriptedBus::new());
        let _ = dev.channel(2);
    }
}
