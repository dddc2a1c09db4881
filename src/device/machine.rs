use log::{debug, info, warn};
use uuid::Uuid;

use crate::device::constants::{make_client_characteristic_config_uuid, make_uart_rx_uuid, make_uart_service_uuid, PERIPHERAL_NAME};
use crate::device::decoder::decode;
use crate::device::link::RadioLink;
use crate::device::sink::{EventSink, Observer, Registration};
use crate::device::types::{CharacteristicInfo, LinkEvent, LinkPhase, LinkStatus, ServiceInfo};

/// One attempt to reach the peripheral, from the matching advertisement until disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSession<D> {
    device: D,
    service: Option<ServiceInfo>,
    characteristic: Option<CharacteristicInfo>,
}

impl<D> LinkSession<D> {
    fn new(device: D) -> Self {
        LinkSession { device, service: None, characteristic: None }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn service(&self) -> Option<&ServiceInfo> {
        self.service.as_ref()
    }

    pub fn characteristic(&self) -> Option<&CharacteristicInfo> {
        self.characteristic.as_ref()
    }
}

pub struct ConnectionStateMachine<L: RadioLink> {
    link: L,
    events: EventSink,
    phase: LinkPhase,
    scanning: bool,
    session: Option<LinkSession<L::Device>>,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
}

impl<L: RadioLink> ConnectionStateMachine<L> {
    pub fn new(link: L) -> Self {
        ConnectionStateMachine {
            link,
            events: EventSink::new(),
            phase: LinkPhase::Idle,
            scanning: false,
            session: None,
            service_uuid: make_uart_service_uuid(),
            characteristic_uuid: make_uart_rx_uuid(),
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn session(&self) -> Option<&LinkSession<L::Device>> {
        self.session.as_ref()
    }

    /// Take back the radio link once the machine is no longer driven.
    pub fn into_link(self) -> L {
        self.link
    }

    pub fn register_observer(&mut self, observer: Box<dyn Observer>) -> Registration {
        self.events.register(observer)
    }

    pub fn start_scan(&mut self) {
        if self.scanning {
            debug!("Already scanning");
            return;
        }

        if self.phase.is_connected() {
            warn!("Already connected to the peripheral, not scanning");
            return;
        }

        info!("Start scanning for {:?}", PERIPHERAL_NAME);
        self.link.start_scan();
        self.scanning = true;

        if self.session.is_none() {
            self.set_phase(LinkPhase::Scanning);
        }
    }

    pub fn stop_scan(&mut self) {
        if !self.scanning {
            return;
        }

        info!("Stop scanning");
        self.link.stop_scan();
        self.scanning = false;

        if self.phase == LinkPhase::Scanning {
            self.set_phase(LinkPhase::Idle);
        }
    }

    /// Advance the state machine for one radio callback.
    pub fn handle(&mut self, event: LinkEvent<L::Device>) {
        match event {
            LinkEvent::Advertisement { device, name } => self.on_advertisement(device, name),
            LinkEvent::ScanFailed { reason, no_permission } => self.on_scan_failed(reason, no_permission),
            LinkEvent::Connected { device } => self.on_connected(device),
            LinkEvent::Disconnected { device } => self.on_disconnected(device),
            LinkEvent::ServicesDiscovered { device, status, services } => {
                self.on_services_discovered(device, status, services)
            },
            LinkEvent::NotificationArmed { device, status } => self.on_notification_armed(device, status),
            LinkEvent::Notification { device, characteristic, value } => {
                self.on_notification(device, characteristic, value)
            },
        }
    }

    fn set_phase(&mut self, phase: LinkPhase) {
        if self.phase != phase {
            info!("{} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn is_session_device(&self, device: &L::Device) -> bool {
        match &self.session {
            Some(session) => session.device.eq(device),
            None => false,
        }
    }

    fn on_advertisement(&mut self, device: L::Device, name: String) {
        if name != PERIPHERAL_NAME {
            return;
        }

        if self.phase != LinkPhase::Scanning {
            debug!("Ignoring advertisement of {:?} while {}", device, self.phase);
            return;
        }

        info!("Peripheral found: {:?}; Connecting...", device);
        self.link.connect(&device);
        self.session = Some(LinkSession::new(device));
        self.set_phase(LinkPhase::Connecting);
    }

    fn on_scan_failed(&mut self, reason: String, no_permission: bool) {
        if no_permission {
            warn!("Not allowed to access Bluetooth: {}", reason);
        } else {
            warn!("Scanning failed: {}", reason);
        }

        self.scanning = false;
        if self.phase == LinkPhase::Scanning {
            self.set_phase(LinkPhase::Idle);
        }
    }

    fn on_connected(&mut self, device: L::Device) {
        if self.phase != LinkPhase::Connecting || !self.is_session_device(&device) {
            debug!("Ignoring connection of {:?} while {}", device, self.phase);
            return;
        }

        info!("Connected; Discovering services...");
        // stop scanning first, scanning and service discovery contend for the radio
        self.stop_scan();
        self.link.discover_services(&device);
        self.set_phase(LinkPhase::ServiceDiscovery);
    }

    fn on_services_discovered(&mut self, device: L::Device, status: LinkStatus, services: Vec<ServiceInfo>) {
        if self.phase != LinkPhase::ServiceDiscovery || !self.is_session_device(&device) {
            debug!("Ignoring discovered services of {:?} while {}", device, self.phase);
            return;
        }

        if let LinkStatus::Failed(reason) = status {
            warn!("Service discovery failed: {}; Waiting for reconnect", reason);
            return;
        }

        let service = match services.into_iter().find(|service| service.uuid.eq(&self.service_uuid)) {
            Some(service) => service,
            None => {
                warn!("Peripheral has no UART service {}; Waiting for reconnect", self.service_uuid);
                return;
            },
        };

        let characteristic = match service.characteristic(&self.characteristic_uuid) {
            Some(characteristic) => characteristic.clone(),
            None => {
                warn!("UART service has no RX characteristic {}; Waiting for reconnect", self.characteristic_uuid);
                return;
            },
        };

        if !characteristic.descriptors.is_empty()
            && !characteristic.descriptors.contains(&make_client_characteristic_config_uuid()) {
            debug!("RX characteristic does not list a configuration descriptor: {:?}", characteristic.descriptors);
        }

        info!("Subscribing to characteristic {:?} {:?}", service.uuid, characteristic.uuid);
        self.link.enable_notification(&device, &characteristic);

        if let Some(session) = self.session.as_mut() {
            session.service = Some(service);
            session.characteristic = Some(characteristic);
        }
        self.set_phase(LinkPhase::SubscribingNotify);
    }

    fn on_notification_armed(&mut self, device: L::Device, status: LinkStatus) {
        if self.phase != LinkPhase::SubscribingNotify || !self.is_session_device(&device) {
            debug!("Ignoring notification arm of {:?} while {}", device, self.phase);
            return;
        }

        match status {
            LinkStatus::Success => {
                info!("UART RX notification enabled; Peripheral ready");
                self.set_phase(LinkPhase::Ready);
            },
            LinkStatus::Failed(reason) => {
                warn!("Enabling UART RX notification failed: {}; Waiting for reconnect", reason);
            },
        }
    }

    fn on_notification(&mut self, device: L::Device, characteristic: Uuid, value: Vec<u8>) {
        // the local side is armed as soon as the subscribe request is issued, so a notification may
        // overtake the arm acknowledgement
        let armed = matches!(self.phase, LinkPhase::SubscribingNotify | LinkPhase::Ready);

        if !armed || !self.is_session_device(&device) || !characteristic.eq(&self.characteristic_uuid) {
            debug!("Ignoring notification from {:?} {} while {}", device, characteristic, self.phase);
            return;
        }

        self.events.deliver(decode(&value));
    }

    fn on_disconnected(&mut self, device: L::Device) {
        if !self.is_session_device(&device) {
            debug!("Ignoring disconnect of {:?}", device);
            return;
        }

        warn!("Peripheral disconnected while {}", self.phase);
        self.link.release(&device);
        self.stop_scan();
        self.session = None;
        self.set_phase(LinkPhase::Disconnected);
    }
}
