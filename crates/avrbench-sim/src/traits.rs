//! Mcu trait: the harness's view of a simulator.

use crate::{PinHandler, PinId, SimError};

/// A simulated microcontroller with firmware loaded.
///
/// Construction is backend-specific. Once built, the harness subscribes to
/// pins and then calls [`advance`](Mcu::advance) until it has what it needs.
pub trait Mcu {
    /// Run an implementation-defined number of cycles.
    ///
    /// Pin handlers fire synchronously from inside this call, in the order
    /// the changes happened. Changes on the same cycle are delivered in
    /// subscription order.
    fn advance(&mut self) -> Result<(), SimError>;

    /// Current simulated cycle. Never decreases.
    fn cycle(&self) -> u64;

    /// Size in bytes of the firmware programmed into flash.
    fn firmware_size(&self) -> u32;

    /// Call `handler` whenever `pin` changes level.
    fn subscribe(&mut self, pin: PinId, handler: PinHandler) -> Result<(), SimError>;
}
