use std::fmt::Debug;

use crate::device::types::CharacteristicInfo;

/// Capability interface over the platform's radio primitives.
///
/// None of these operations block or return a result. Completions are posted later as
/// [`LinkEvent`](crate::device::types::LinkEvent)s through the dispatcher the implementation was
/// constructed with. Implementations keep no state about "the" session; every call names its device.
pub trait RadioLink: Send {
    /// Platform handle identifying one discovered peripheral.
    type Device: Clone + Debug + PartialEq + Send + 'static;

    fn start_scan(&mut self);

    fn stop_scan(&mut self);

    fn connect(&mut self, device: &Self::Device);

    fn discover_services(&mut self, device: &Self::Device);

    /// Write the configuration descriptor of `characteristic` and arm local notification delivery.
    fn enable_notification(&mut self, device: &Self::Device, characteristic: &CharacteristicInfo);

    /// The session with `device` has ended. Stop everything still running on its behalf, notification
    /// delivery in particular, so a later session with the same device starts clean.
    fn release(&mut self, device: &Self::Device);
}
