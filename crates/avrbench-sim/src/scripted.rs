//! Deterministic engine that replays a fixed list of pin changes.
//!
//! Stands in for a real simulator wherever the exact cycle of each event
//! must be known in advance: the harness test suites, and dry runs of the
//! result pipeline on machines without libsimavr.

use std::path::Path;

use avrbench_elf::FirmwareImage;
use tracing::trace;

use crate::{Mcu, PinChange, PinHandler, PinId, SimError};

/// Cycles covered by one `advance` unless overridden.
pub const DEFAULT_QUANTUM: u64 = 1000;

#[derive(Clone, Copy, Debug)]
struct ScriptedEvent {
    cycle: u64,
    pin: PinId,
    value: u32,
}

/// Engine that emits pre-recorded pin changes at fixed cycles.
pub struct ScriptedMcu {
    firmware_size: u32,
    events: Vec<ScriptedEvent>,
    next_event: usize,
    cycle: u64,
    quantum: u64,
    fault_at: Option<u64>,
    subscriptions: Vec<(PinId, PinHandler)>,
}

impl ScriptedMcu {
    /// Create an engine reporting `firmware_size` with no events.
    pub fn new(firmware_size: u32) -> Self {
        Self {
            firmware_size,
            events: Vec::new(),
            next_event: 0,
            cycle: 0,
            quantum: DEFAULT_QUANTUM,
            fault_at: None,
            subscriptions: Vec::new(),
        }
    }

    /// Create an engine whose firmware size comes from a real image on disk.
    pub fn load(firmware_path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = firmware_path.as_ref();
        if !path.exists() {
            return Err(SimError::FirmwareNotFound(path.to_path_buf()));
        }
        let image = FirmwareImage::load(path)?;
        Ok(Self::new(image.flash_size()))
    }

    /// Schedule a level change. Events may be added in any order.
    #[must_use]
    pub fn with_event(mut self, cycle: u64, pin: PinId, value: u32) -> Self {
        let event = ScriptedEvent { cycle, pin, value };
        // Keep insertion order among equal cycles.
        let at = self.events.partition_point(|e| e.cycle <= cycle);
        self.events.insert(at, event);
        self
    }

    /// Schedule a low pulse: drive `pin` low at `cycle` and high one cycle later.
    #[must_use]
    pub fn with_low_pulse(self, cycle: u64, pin: PinId) -> Self {
        self.with_event(cycle, pin, 0).with_event(cycle + 1, pin, 1)
    }

    /// Cycles covered by each `advance` (minimum 1).
    #[must_use]
    pub fn with_quantum(mut self, quantum: u64) -> Self {
        self.quantum = quantum.max(1);
        self
    }

    /// Make the core crash when execution reaches `cycle`.
    #[must_use]
    pub fn with_fault_at(mut self, cycle: u64) -> Self {
        self.fault_at = Some(cycle);
        self
    }

    /// Events not yet delivered.
    pub fn pending_events(&self) -> usize {
        self.events.len() - self.next_event
    }

    /// Deliver every event scheduled at `cycle`, in subscription order.
    fn deliver_group(&mut self, cycle: u64) {
        let start = self.next_event;
        let end = start + self.events[start..].partition_point(|e| e.cycle == cycle);
        self.next_event = end;
        self.cycle = cycle;

        let group = &self.events[start..end];
        for (pin, handler) in &mut self.subscriptions {
            for event in group.iter().filter(|e| e.pin == *pin) {
                trace!(pin = %event.pin, value = event.value, cycle, "scripted pin change");
                handler(PinChange {
                    pin: event.pin,
                    value: event.value,
                    cycle,
                });
            }
        }
    }
}

impl Mcu for ScriptedMcu {
    fn advance(&mut self) -> Result<(), SimError> {
        let end = self.cycle.saturating_add(self.quantum);

        while let Some(event) = self.events.get(self.next_event) {
            if event.cycle > end {
                break;
            }
            if let Some(fault) = self.fault_at
                && fault <= event.cycle
            {
                break;
            }
            self.deliver_group(event.cycle);
        }

        if let Some(fault) = self.fault_at
            && fault <= end
        {
            self.cycle = self.cycle.max(fault);
            return Err(SimError::Crashed { cycle: self.cycle });
        }

        self.cycle = end;
        Ok(())
    }

    fn cycle(&self) -> u64 {
        self.cycle
    }

    fn firmware_size(&self) -> u32 {
        self.firmware_size
    }

    fn subscribe(&mut self, pin: PinId, handler: PinHandler) -> Result<(), SimError> {
        self.subscriptions.push((pin, handler));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn recorder(mcu: &mut ScriptedMcu, pin: PinId) -> Rc<RefCell<Vec<PinChange>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        mcu.subscribe(pin, Box::new(move |c| sink.borrow_mut().push(c)))
            .unwrap();
        seen
    }

    #[test]
    fn test_events_delivered_in_cycle_order() {
        let mut mcu = ScriptedMcu::new(0)
            .with_event(30, PinId::BEGIN, 0)
            .with_event(10, PinId::BEGIN, 0)
            .with_event(20, PinId::BEGIN, 1);
        let seen = recorder(&mut mcu, PinId::BEGIN);

        mcu.advance().unwrap();

        let cycles: Vec<u64> = seen.borrow().iter().map(|c| c.cycle).collect();
        assert_eq!(cycles, vec![10, 20, 30]);
        assert_eq!(mcu.cycle(), DEFAULT_QUANTUM);
    }

    #[test]
    fn test_same_cycle_follows_subscription_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut mcu = ScriptedMcu::new(0)
            .with_event(5, PinId::STOP, 1)
            .with_event(5, PinId::BEGIN, 0);

        for pin in [PinId::BEGIN, PinId::STOP] {
            let order = Rc::clone(&order);
            mcu.subscribe(pin, Box::new(move |c| order.borrow_mut().push(c.pin)))
                .unwrap();
        }
        mcu.advance().unwrap();

        assert_eq!(*order.borrow(), vec![PinId::BEGIN, PinId::STOP]);
    }

    #[test]
    fn test_quantum_bounds_delivery() {
        let mut mcu = ScriptedMcu::new(0)
            .with_quantum(100)
            .with_event(50, PinId::BEGIN, 0)
            .with_event(150, PinId::BEGIN, 0);
        let seen = recorder(&mut mcu, PinId::BEGIN);

        mcu.advance().unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(mcu.pending_events(), 1);

        mcu.advance().unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(mcu.cycle(), 200);
    }

    #[test]
    fn test_unsubscribed_pins_are_dropped() {
        let mut mcu = ScriptedMcu::new(0).with_low_pulse(10, PinId::new('D', 2).unwrap());
        let seen = recorder(&mut mcu, PinId::BEGIN);
        mcu.advance().unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(mcu.pending_events(), 0);
    }

    #[test]
    fn test_fault_stops_delivery() {
        let mut mcu = ScriptedMcu::new(0)
            .with_event(10, PinId::BEGIN, 0)
            .with_event(90, PinId::BEGIN, 0)
            .with_fault_at(50);
        let seen = recorder(&mut mcu, PinId::BEGIN);

        let err = mcu.advance().unwrap_err();
        assert!(matches!(err, SimError::Crashed { cycle: 50 }));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_load_missing_firmware() {
        let err = ScriptedMcu::load("/nonexistent/opt-sort.avr").err().unwrap();
        assert!(matches!(err, SimError::FirmwareNotFound(_)));
    }
}
