//! Simulated AVR microcontrollers.
//!
//! The harness only needs a narrow view of a simulator: advance it, read
//! its cycle counter and firmware size, and be told when a port pin
//! changes level. [`Mcu`] is that view. Two engines implement it:
//!
//! - [`simavr::SimavrMcu`] drives libsimavr through a small C shim that is
//!   compiled on first use and loaded with `libloading`.
//! - [`scripted::ScriptedMcu`] replays a fixed list of pin changes and is
//!   what the test suites run against.

mod error;
mod pin;
pub mod scripted;
pub mod simavr;
mod traits;

pub use error::SimError;
pub use pin::{PinChange, PinHandler, PinId};
pub use scripted::ScriptedMcu;
pub use simavr::{ShimBuildConfig, ShimLibrary, SimavrMcu, SimavrOptions};
pub use traits::Mcu;
