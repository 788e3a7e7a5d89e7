// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Constants, Bus Addressing, and Register Bits.
//!
//! Models the raw low-level details as of the WK2132 datasheet, and
//! avoids too opinionated abstractions.
//!
//! The WK2132 uses an unusual addressing scheme: the register number is
//! never combined with the channel. Instead, the *bus address* selects
//! what is being talked to — the global register bank, one channel's
//! register bank, or that channel's raw FIFO — and a global page
//! selector decides which physical registers are visible at register
//! numbers `0x04..=0x08` within a channel bank. See [`bus_address`].

/// Size of one WK2132 hardware FIFO (transmit and receive each, per
/// channel).
pub const FIFO_SIZE: usize = 256;

/// The maximum number of bytes moved in one addressed bus exchange.
///
/// The local receive cache uses exactly this capacity, so a single
/// drain transaction can always fill it from empty.
pub const XFER_MAX_SIZE: usize = 255;

/// Number of UART channels on the chip.
pub const CHANNEL_COUNT: usize = 2;

/// Computes the bus address used to reach one facet of the device.
///
/// ```text
///  -------------------------------------------------------------------------
///  |   b7   |   b6   |   b5   |   b4   |   b3   |   b2   |   b1   |   b0   |
///  -------------------------------------------------------------------------
///  |    0   |   A1   |   A0   |    1   |    0   |   C1   |   C0   |    F   |
///  -------------------------------------------------------------------------
/// ```
///
/// `A1..A0` come from the external address-select pins and are part of
/// `base_address`; `C1..C0` is the channel number; `F` selects between
/// the register bank (`false`) and the raw FIFO (`true`).
///
/// For a base address of `0x70` this yields `0x70` (channel 0
/// registers), `0x71` (channel 0 FIFO), `0x72` (channel 1 registers)
/// and `0x73` (channel 1 FIFO).
#[must_use]
pub const fn bus_address(base_address: u8, channel: u8, fifo: bool) -> u8 {
    base_address | channel << 1 | fifo as u8
}

/// The register page currently selected through
/// [`registers::global::SPAGE`].
///
/// The selector is global to the chip: it switches the visible register
/// set for *both* channel banks at once. Page 0 is the resting state;
/// page 1 exposes the baud-rate registers at numbers that alias
/// unrelated page-0 registers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Page {
    /// Serial control, FIFO and status registers.
    #[default]
    Page0,
    /// Baud-rate configuration registers.
    Page1,
}

impl Page {
    /// The value written to the page-select register.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Page0 => 0,
            Self::Page1 => 1,
        }
    }
}

/// Register numbers and register bit typing.
///
/// The bitflags types operate exclusively on raw bit representations
/// within the local computing context; they do not perform hardware
/// access.
pub mod registers {
    use bitflags::bitflags;

    /// Registers reachable at the base bus address regardless of the
    /// selected page.
    pub mod global {
        /// Global control register (channel clock enables).
        pub const GENA: u8 = 0x00;
        /// Global reset register (channel soft resets).
        pub const GRST: u8 = 0x01;
        /// Global master channel control register (not used).
        pub const GMUT: u8 = 0x02;
        /// Global page select register (bit 0 = page).
        pub const SPAGE: u8 = 0x03;
        /// Global interrupt enable register (not used).
        pub const GIR: u8 = 0x10;
        /// Global interrupt flag register (not used).
        pub const GIFR: u8 = 0x11;
    }

    /// Channel-bank registers visible while page 0 is selected.
    pub mod page0 {
        /// Serial control register.
        pub const SCR: u8 = 0x04;
        /// Line configuration register.
        pub const LCR: u8 = 0x05;
        /// FIFO control register.
        pub const FCR: u8 = 0x06;
        /// Serial interrupt enable register (not used).
        pub const SIER: u8 = 0x07;
        /// Serial interrupt flag register (not used).
        pub const SIFR: u8 = 0x08;
        /// Number of bytes waiting in the transmitter FIFO.
        pub const TFCNT: u8 = 0x09;
        /// Number of bytes waiting in the receiver FIFO.
        pub const RFCNT: u8 = 0x0A;
        /// FIFO status register.
        pub const FSR: u8 = 0x0B;
        /// Line status register (not used, the FIFO path is used
        /// instead).
        pub const LSR: u8 = 0x0C;
        /// FIFO data register (not used, raw FIFO addressing is used
        /// instead).
        pub const FDAT: u8 = 0x0D;
    }

    /// Channel-bank registers visible while page 1 is selected.
    ///
    /// These numbers alias [`page0`] registers; accessing them with the
    /// wrong page selected silently reads or writes the other set.
    pub mod page1 {
        /// Baud rate divisor, high byte.
        pub const BRH: u8 = 0x04;
        /// Baud rate divisor, low byte.
        pub const BRL: u8 = 0x05;
        /// Baud rate fractional digit.
        pub const BRD: u8 = 0x06;
        /// Receive FIFO interrupt trigger level (not used).
        pub const RFI: u8 = 0x07;
        /// Transmit FIFO interrupt trigger level (not used).
        pub const TFI: u8 = 0x08;
    }

    bitflags! {
        /// Typing of the global control register ([`global::GENA`]).
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct GENA: u8 {
            /// Channel 1 clock enable (0: disable, 1: enable).
            const C1EN = 1 << 0;
            /// Channel 2 clock enable (0: disable, 1: enable).
            const C2EN = 1 << 1;
        }
    }

    bitflags! {
        /// Typing of the global reset register ([`global::GRST`]).
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct GRST: u8 {
            /// Channel 1 soft reset (0: not reset, 1: reset).
            const C1RST = 1 << 0;
            /// Channel 2 soft reset (0: not reset, 1: reset).
            const C2RST = 1 << 1;
            /// Channel 1 sleep (not used).
            const C1SLEEP = 1 << 4;
            /// Channel 2 sleep (not used).
            const C2SLEEP = 1 << 5;
        }
    }

    bitflags! {
        /// Typing of the serial control register ([`page0::SCR`]).
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct SCR: u8 {
            /// Receive enable.
            const RXEN = 1 << 0;
            /// Transmit enable.
            const TXEN = 1 << 1;
            /// Sleep enable (not used).
            const SLEEPEN = 1 << 2;
        }
    }

    bitflags! {
        /// Typing of the line configuration register ([`page0::LCR`]).
        ///
        /// The lower nibble carries the stop-bit length, the 2-bit
        /// parity selector and the parity enable. The word length is
        /// fixed at 8 bits by the hardware and has no field here.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct LCR: u8 {
            /// Stop-bit length (0: 1 bit, 1: 2 bits).
            const STPL = 1 << 0;
            /// Parity select: odd.
            const PAR_ODD = 0b01 << 1;
            /// Parity select: even.
            const PAR_EVEN = 0b10 << 1;
            /// Parity select: forced 1 (not used).
            const PAR_1 = 0b11 << 1;
            /// Parity enable (0: no check, 1: check).
            const PAEN = 1 << 3;
            /// IrDA enable (not used).
            const IREN = 1 << 4;
            /// Line-break control (not used).
            const BREAK = 1 << 5;
        }
    }

    bitflags! {
        /// Typing of the FIFO control register ([`page0::FCR`]).
        ///
        /// `TFRST` and `RFRST` both carry bit 3 here, matching the
        /// value the reference register map assigns them; the combined
        /// setup write is therefore `0x0C`, not `0x0F`.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct FCR: u8 {
            /// Receiver FIFO enable.
            const RFEN = 1 << 2;
            /// Transmitter FIFO enable.
            const TFEN = 1 << 3;
            /// Transmitter FIFO reset.
            const TFRST = 1 << 3;
            /// Receiver FIFO reset.
            const RFRST = 1 << 3;
        }
    }

    bitflags! {
        /// Typing of the FIFO status register ([`page0::FSR`]).
        ///
        /// Note the polarity of the emptiness flags: a set bit means
        /// the FIFO is *not* empty.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct FSR: u8 {
            /// Transmitter busy (0: idle, 1: sending).
            const TBUSY = 1 << 0;
            /// Transmitter FIFO full (0: not full, 1: full).
            const TFFULL = 1 << 1;
            /// Transmitter FIFO state (0: empty, 1: not empty).
            const TFEMPTY = 1 << 2;
            /// Receiver FIFO state (0: empty, 1: not empty).
            const RFEMPTY = 1 << 3;
            /// Receiver parity error.
            const RFPE = 1 << 4;
            /// Receiver framing error.
            const RFFE = 1 << 5;
            /// Receiver line break.
            const RFLB = 1 << 6;
            /// Receiver FIFO overflow. Cleared by the read itself, so
            /// an ongoing overflow is reported once.
            const RFOE = 1 << 7;
        }
    }
}

/// Computes the two baud-rate register values for a crystal frequency
/// and a requested baud rate.
///
/// Returns the 16-bit integer divisor (`crystal / (baud * 16) - 1`,
/// split into [`registers::page1::BRH`] and [`registers::page1::BRL`]
/// by the caller) and the fractional digit written to
/// [`registers::page1::BRD`].
///
/// The fractional digit starts from the remainder ratio
/// `(crystal % (baud * 16)) / (baud * 16)` — an integer division that
/// truncates to 0 whenever the remainder is smaller than the scaled
/// baud rate, which it always is — and is then reduced by 10 while
/// greater than 10 so it fits one decimal digit. The truncation happens
/// *before* the reduction; reordering the two steps would produce a
/// different digit and a different wire rate than what deployed devices
/// have been programmed with. The resulting digit is pinned by the
/// tests in this module.
#[must_use]
pub fn baud_divisor(crystal_hz: u32, baud_rate: u32) -> (u16, u8) {
    let scale = baud_rate * 16;
    let integral = (crystal_hz / scale - 1) as u16;
    let mut frac = (crystal_hz % scale) / scale;
    while frac > 10 {
        frac /= 10;
    }
    (integral, frac as u8)
}

#[cfg(test)]
mod tests {
    use super::registers::{FCR, LCR};
    use super::*;

    #[test]
    fn bus_address_selects_channel_and_fifo() {
        assert_eq!(bus_address(0x70, 0, false), 0x70);
        assert_eq!(bus_address(0x70, 0, true), 0x71);
        assert_eq!(bus_address(0x70, 1, false), 0x72);
        assert_eq!(bus_address(0x70, 1, true), 0x73);
    }

    #[test]
    fn bus_address_other_base() {
        assert_eq!(bus_address(0x10, 1, true), 0x13);
    }

    #[test]
    fn baud_divisor_typical_crystal() {
        // 14.7456 MHz, the usual pairing for this chip.
        assert_eq!(baud_divisor(14_745_600, 9600), (95, 0));
        assert_eq!(baud_divisor(14_745_600, 115_200), (7, 0));
        assert_eq!(baud_divisor(14_745_600, 19_200), (47, 0));
        assert_eq!(baud_divisor(14_745_600, 4800), (191, 0));
    }

    #[test]
    fn baud_fraction_truncates_before_reduction() {
        // The remainder ratio is formed with integer division, so the
        // digit is 0 even when the division is inexact. This pins the
        // established programming sequence; do not "fix" the order
        // without verifying a corrected digit against hardware.
        assert_eq!(baud_divisor(14_745_600, 7000), (130, 0));
        assert_eq!(baud_divisor(14_745_600, 2500), (367, 0));
    }

    #[test]
    fn fifo_setup_pattern_keeps_aliased_reset_bits() {
        let fcr = FCR::TFEN | FCR::RFEN | FCR::TFRST | FCR::RFRST;
        assert_eq!(fcr.bits(), 0x0C);
    }

    #[test]
    fn line_config_encodings() {
        assert_eq!((LCR::PAEN | LCR::PAR_ODD).bits(), 0b1010);
        assert_eq!((LCR::PAEN | LCR::PAR_EVEN).bits(), 0b1100);
        assert_eq!(LCR::STPL.bits(), 0b0001);
    }

    #[test]
    fn page_bits() {
        assert_eq!(Page::Page0.bits(), 0);
        assert_eq!(Page::Page1.bits(), 1);
    }
}
