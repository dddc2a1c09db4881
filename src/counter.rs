use log::info;

use crate::device::types::AppEvent;

/// The count shown to the user. Only lives as long as the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    count: u32,
}

impl Counter {
    pub fn new() -> Self {
        Counter { count: 0 }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Manual reset, independent of the peripheral.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Apply one event and return the new count.
    pub fn apply(&mut self, event: AppEvent) -> u32 {
        match event {
            AppEvent::Reset => self.count = 0,
            AppEvent::CountUp => self.count = self.count.saturating_add(1),
            AppEvent::Unknown(code) => info!("unknown event: {}", code),
        }

        self.count
    }
}
