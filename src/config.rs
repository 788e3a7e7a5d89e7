// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel line configuration for [`Wk2132`].
//!
//! [`Wk2132`]: crate::Wk2132

use crate::spec::registers::LCR;

/// Number of stop bits appended to each transmitted word.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StopBits {
    /// One stop bit.
    #[default]
    One,
    /// Two stop bits.
    Two,
}

/// Parity mode for each transmitted and received word.
///
/// Parity bits are *programmed* here; detecting parity errors on
/// reception is the remote's problem and outside this driver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Parity {
    /// No parity bit is transmitted nor expected.
    #[default]
    None,
    /// The number of set bits including the parity bit must be odd.
    Odd,
    /// The number of set bits including the parity bit must be even.
    Even,
}

impl Parity {
    /// The line-configuration bits selecting this parity mode.
    ///
    /// Selecting odd or even also raises the parity-enable bit; `None`
    /// contributes nothing.
    #[must_use]
    pub const fn lcr_bits(self) -> LCR {
        match self {
            Self::None => LCR::empty(),
            Self::Odd => LCR::PAEN.union(LCR::PAR_ODD),
            Self::Even => LCR::PAEN.union(LCR::PAR_EVEN),
        }
    }
}

/// Configuration of one UART channel.
///
/// Supplied once at construction and programmed into the device by the
/// initialization sequence. Please note that sender and receiver
/// **must agree** on the transmission settings, otherwise you receive
/// garbage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelConfig {
    /// The baud rate to use.
    pub baud_rate: u32,
    /// The length of each transmitted word.
    ///
    /// The hardware only supports 8; any other value is coerced to 8
    /// with a logged warning when the line parameters are programmed.
    pub data_bits: u8,
    /// The number of stop bits.
    pub stop_bits: StopBits,
    /// The parity mode.
    pub parity: Parity,
    /// When set, `read` and `write` wait (bounded) until the full
    /// requested byte count is satisfiable instead of returning a short
    /// result immediately.
    pub safe_mode: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        // 115200 8N1, returning short results immediately.
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
            safe_mode: false,
        }
    }
}
