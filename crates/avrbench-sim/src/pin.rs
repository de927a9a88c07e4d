//! Port pins and level-change events.

use std::fmt;
use std::str::FromStr;

use crate::SimError;

/// One bit of an AVR IO port, e.g. `B0` (`PB0` in datasheet naming).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PinId {
    port: u8,
    bit: u8,
}

impl PinId {
    /// Port B bit 0, where benchmark firmware pulses each measurement boundary.
    pub const BEGIN: Self = Self { port: b'B', bit: 0 };
    /// Port B bit 1, raised once the benchmark has finished.
    pub const STOP: Self = Self { port: b'B', bit: 1 };

    /// Create a pin from a port letter (A-L, either case) and bit index (0-7).
    pub fn new(port: char, bit: u8) -> Result<Self, SimError> {
        let upper = port.to_ascii_uppercase();
        if !('A'..='L').contains(&upper) || bit > 7 {
            return Err(SimError::InvalidPin(format!("{port}{bit}")));
        }
        Ok(Self {
            port: upper as u8,
            bit,
        })
    }

    /// Port letter, always upper case.
    pub const fn port(self) -> char {
        self.port as char
    }

    /// Bit index within the port.
    pub const fn bit(self) -> u8 {
        self.bit
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.port(), self.bit)
    }
}

impl FromStr for PinId {
    type Err = SimError;

    /// Accepts `B0`, `b0` and `PB0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SimError::InvalidPin(s.to_string());
        let trimmed = s.trim();
        let name = if trimmed.len() == 3 {
            trimmed
                .strip_prefix('P')
                .or_else(|| trimmed.strip_prefix('p'))
                .ok_or_else(invalid)?
        } else {
            trimmed
        };

        let mut chars = name.chars();
        let (Some(port), Some(bit), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(invalid());
        };
        let bit = bit.to_digit(10).ok_or_else(invalid)?;
        Self::new(port, bit as u8).map_err(|_| invalid())
    }
}

/// A level change observed on a subscribed pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinChange {
    pub pin: PinId,
    /// New level as reported by the simulator (0 = low).
    pub value: u32,
    /// Simulated cycle at which the change was observed.
    pub cycle: u64,
}

/// Callback invoked from inside [`Mcu::advance`](crate::Mcu::advance).
pub type PinHandler = Box<dyn FnMut(PinChange)>;
