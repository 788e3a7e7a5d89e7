// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors that can happen when working with [`Wk2132`] and its
//! channels.
//!
//! None of these unwind past the operation that produced them: the
//! driver logs, reflects transport trouble in the device's warning
//! flag, and keeps operating. Only [`InitError`] is fatal, and only
//! for the one device instance that failed its probe.
//!
//! [`Wk2132`]: crate::Wk2132

use core::error::Error;
use core::fmt::{self, Display, Formatter};
use embedded_hal::i2c::ErrorKind;

/// A single addressed bus exchange failed at the transport level.
///
/// Carries the transport's error code. This layer performs no retry;
/// the device's warning flag records the failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusError(
    /// The transport's error code.
    pub ErrorKind,
);

impl Display for BusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "bus exchange failed: {}", self.0)
    }
}

impl Error for BusError {}

/// The device could not be initialized.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitError {
    /// The initial communication probe (reading the global enable
    /// register) failed. The device is marked failed and none of its
    /// channels are configured; other devices on the bus are
    /// unaffected.
    ProbeFailed(BusError),
}

impl Display for InitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeFailed(e) => {
                write!(f, "device probe failed: {e}")
            }
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ProbeFailed(e) => Some(e),
        }
    }
}

/// Fewer bytes were buffered than the caller asked for.
///
/// The bytes that *were* available have still been copied into the
/// caller's buffer; this error reports the shortfall.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadUnderrun {
    /// How many bytes the caller requested.
    pub requested: usize,
    /// How many bytes were available and copied.
    pub available: usize,
}

impl Display for ReadUnderrun {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read underrun: requested {} bytes, only {} available",
            self.requested, self.available
        )
    }
}

impl Error for ReadUnderrun {}

/// The raw FIFO write transaction failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteError {
    /// The transport rejected the exchange.
    Bus(BusError),
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "{e}"),
        }
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bus(e) => Some(e),
        }
    }
}

/// The bounded wait for the transmitter to empty expired.
///
/// Flushing is a best-effort synchronization primitive: on timeout the
/// transmitter keeps draining on its own, this error merely reports
/// that emptiness was not observed within the budget.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlushTimeout {
    /// Bytes still waiting in the transmit FIFO when the budget ran
    /// out.
    pub remaining: usize,
}

impl Display for FlushTimeout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flush timed out: still {} bytes not sent",
            self.remaining
        )
    }
}

impl Error for FlushTimeout {}
