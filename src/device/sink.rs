use log::{debug, warn};

use crate::device::types::AppEvent;

pub trait Observer: Send {
    fn on_event(&mut self, event: AppEvent);
}

impl<F> Observer for F
where
    F: FnMut(AppEvent) + Send,
{
    fn on_event(&mut self, event: AppEvent) {
        self(event)
    }
}

#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyRegistered,
}

/// Single subscriber slot for decoded events. The first observer stays registered for the lifetime of
/// the sink.
#[derive(Default)]
pub struct EventSink {
    observer: Option<Box<dyn Observer>>,
}

impl EventSink {
    pub fn new() -> Self {
        EventSink { observer: None }
    }

    pub fn register(&mut self, observer: Box<dyn Observer>) -> Registration {
        if self.observer.is_some() {
            warn!("Observer already registered");
            return Registration::AlreadyRegistered;
        }

        self.observer = Some(observer);
        Registration::Registered
    }

    pub fn deliver(&mut self, event: AppEvent) {
        // events that arrive before an observer is attached are dropped
        if let Some(observer) = self.observer.as_mut() {
            debug!("Event received: {:?}", event);
            observer.on_event(event);
        }
    }
}
