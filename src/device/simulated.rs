use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use log::{debug, info};
use tokio::spawn;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{make_client_characteristic_config_uuid, make_uart_rx_uuid, make_uart_service_uuid, PERIPHERAL_NAME};
use crate::device::dispatcher::DispatchSender;
use crate::device::link::RadioLink;
use crate::device::types::{CharacteristicInfo, LinkEvent, LinkStatus, ServiceInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimulatedDevice(pub u32);

/// The Bluefruit peripheral played by a responsive [`SimulatedRadioLink`].
pub const SIMULATED_PERIPHERAL: SimulatedDevice = SimulatedDevice(1);

/// A request that the state machine issued to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRequest {
    StartScan,
    StopScan,
    Connect(SimulatedDevice),
    DiscoverServices(SimulatedDevice),
    EnableNotification(SimulatedDevice, Uuid),
    Release(SimulatedDevice),
}

/// Shared journal of every [`LinkRequest`], readable after the link has been moved into a state machine.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    requests: Arc<Mutex<Vec<LinkRequest>>>,
}

impl RequestLog {
    fn push(&self, request: LinkRequest) {
        self.requests.lock().expect("Failed to lock RequestLog").push(request);
    }

    pub fn requests(&self) -> Vec<LinkRequest> {
        self.requests.lock().expect("Failed to lock RequestLog").clone()
    }

    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&LinkRequest) -> bool,
    {
        self.requests.lock().expect("Failed to lock RequestLog").iter().filter(|request| predicate(*request)).count()
    }
}

/// The GATT layout of a Bluefruit LE: the Nordic UART service with its TX and RX characteristics.
pub fn uart_services() -> Vec<ServiceInfo> {
    let service_uuid = make_uart_service_uuid();
    let tx_uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

    vec![ServiceInfo {
        uuid: service_uuid,
        characteristics: vec![
            CharacteristicInfo {
                uuid: tx_uuid,
                service_uuid,
                descriptors: vec![],
            },
            CharacteristicInfo {
                uuid: make_uart_rx_uuid(),
                service_uuid,
                descriptors: vec![make_client_characteristic_config_uuid()],
            },
        ],
    }]
}

struct Responder {
    callbacks: DispatchSender<SimulatedDevice>,
    payloads: Vec<Vec<u8>>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Responder {
    /// Playback stops when `cancel` fires.
    fn play_notifications(&self, device: SimulatedDevice, characteristic: Uuid, cancel: CancellationToken) {
        let payloads = self.payloads.clone();
        let callbacks = self.callbacks.clone();

        let notification = move |value: Vec<u8>| LinkEvent::Notification { device, characteristic, value };

        if self.interval.is_zero() {
            for value in payloads {
                callbacks.post(notification(value));
            }
            return;
        }

        let interval = self.interval;
        spawn(async move {
            for value in payloads {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return;
                    },
                    _ = sleep(interval) => {
                        debug!("Simulated peripheral sends {:?}", value);
                        callbacks.post(notification(value));
                    },
                }
            }
        });
    }
}

/// Radio link without hardware. Passive links only record requests, responsive links also answer them
/// the way a Bluefruit LE in range would.
pub struct SimulatedRadioLink {
    log: RequestLog,
    responder: Option<Responder>,
    playing: HashMap<SimulatedDevice, CancellationToken>,
}

impl SimulatedRadioLink {
    pub fn passive() -> (Self, RequestLog) {
        let log = RequestLog::default();
        (SimulatedRadioLink { log: log.clone(), responder: None, playing: HashMap::new() }, log)
    }

    /// After notifications are enabled, `payloads` are sent one by one, `interval` apart. A zero
    /// `interval` posts them all at once.
    pub fn responsive(
        callbacks: DispatchSender<SimulatedDevice>,
        payloads: Vec<Vec<u8>>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, RequestLog) {
        let log = RequestLog::default();
        let responder = Responder { callbacks, payloads, interval, cancel };
        (SimulatedRadioLink { log: log.clone(), responder: Some(responder), playing: HashMap::new() }, log)
    }
}

impl RadioLink for SimulatedRadioLink {
    type Device = SimulatedDevice;

    fn start_scan(&mut self) {
        self.log.push(LinkRequest::StartScan);

        if let Some(responder) = &self.responder {
            info!("Simulated scan started");
            responder.callbacks.post(LinkEvent::Advertisement {
                device: SimulatedDevice(0),
                name: "Simulated Heart Rate Sensor".to_string(),
            });
            responder.callbacks.post(LinkEvent::Advertisement {
                device: SIMULATED_PERIPHERAL,
                name: PERIPHERAL_NAME.to_string(),
            });
        }
    }

    fn stop_scan(&mut self) {
        self.log.push(LinkRequest::StopScan);
    }

    fn connect(&mut self, device: &SimulatedDevice) {
        self.log.push(LinkRequest::Connect(*device));

        if let Some(responder) = &self.responder {
            responder.callbacks.post(LinkEvent::Connected { device: *device });
        }
    }

    fn discover_services(&mut self, device: &SimulatedDevice) {
        self.log.push(LinkRequest::DiscoverServices(*device));

        if let Some(responder) = &self.responder {
            responder.callbacks.post(LinkEvent::ServicesDiscovered {
                device: *device,
                status: LinkStatus::Success,
                services: uart_services(),
            });
        }
    }

    fn enable_notification(&mut self, device: &SimulatedDevice, characteristic: &CharacteristicInfo) {
        self.log.push(LinkRequest::EnableNotification(*device, characteristic.uuid));

        if let Some(responder) = &self.responder {
            let playback_cancel = responder.cancel.child_token();
            if let Some(previous) = self.playing.insert(*device, playback_cancel.clone()) {
                previous.cancel();
            }

            responder.callbacks.post(LinkEvent::NotificationArmed { device: *device, status: LinkStatus::Success });
            responder.play_notifications(*device, characteristic.uuid, playback_cancel);
        }
    }

    fn release(&mut self, device: &SimulatedDevice) {
        self.log.push(LinkRequest::Release(*device));

        if let Some(playback_cancel) = self.playing.remove(device) {
            debug!("Simulated peripheral {:?} stops sending", device);
            playback_cancel.cancel();
        }
    }
}
