use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter, Service, ValueNotification};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::{Stream, StreamExt};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{CONNECT_DEADLINE, DISCOVER_DEADLINE, SUBSCRIBE_DEADLINE};
use crate::device::dispatcher::DispatchSender;
use crate::device::link::RadioLink;
use crate::device::types::{CharacteristicInfo, LinkEvent, LinkStatus, ServiceInfo};
use crate::error::DeviceError;

type CentralEventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;
type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// How long each asynchronous radio operation may take before it is reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    pub connect: Duration,
    pub discover: Duration,
    pub subscribe: Duration,
}

impl Default for LinkTiming {
    fn default() -> Self {
        LinkTiming {
            connect: CONNECT_DEADLINE,
            discover: DISCOVER_DEADLINE,
            subscribe: SUBSCRIBE_DEADLINE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanCommand {
    Start,
    Stop,
}

pub async fn find_adapter(manager: &Manager, index: usize) -> Result<Adapter, DeviceError> {
    let adapters = manager.adapters().await?;
    let available = adapters.len();

    match adapters.into_iter().nth(index) {
        Some(adapter) => {
            info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
            Ok(adapter)
        },
        None => Err(DeviceError::NoAdapter { index, available }),
    }
}

async fn with_deadline<F, T>(operation: &'static str, deadline: Duration, fut: F) -> Result<T, DeviceError>
where
    F: Future<Output = btleplug::Result<T>>,
{
    match timeout(deadline, fut).await {
        Err(_) => Err(DeviceError::DeadlineExceeded { operation }),
        Ok(result) => Ok(result?),
    }
}

async fn peripheral_name(adapter: &Adapter, id: &PeripheralId) -> Option<String> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(v) => v,
        Err(err) => {
            debug!("Peripheral {:?} vanished: {:?}", id, err);
            return None;
        },
    };

    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            None
        },
        Ok(None) => None,
        Ok(Some(properties)) => properties.local_name,
    }
}

fn service_info(service: &Service) -> ServiceInfo {
    ServiceInfo {
        uuid: service.uuid,
        characteristics: service.characteristics
            .iter()
            .map(|characteristic| CharacteristicInfo {
                uuid: characteristic.uuid,
                service_uuid: characteristic.service_uuid,
                descriptors: characteristic.descriptors.iter().map(|descriptor| descriptor.uuid).collect(),
            })
            .collect(),
    }
}

async fn connect_peripheral(adapter: &Adapter, id: &PeripheralId, deadline: Duration) -> Result<(), DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    with_deadline("connect", deadline, peripheral.connect()).await
}

async fn discover_services(adapter: &Adapter, id: &PeripheralId, deadline: Duration) -> Result<Vec<ServiceInfo>, DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    with_deadline("discover services", deadline, peripheral.discover_services()).await?;
    Ok(peripheral.services().iter().map(service_info).collect())
}

// btleplug writes the client characteristic configuration descriptor as part of subscribe()
async fn subscribe(
    adapter: &Adapter,
    id: &PeripheralId,
    characteristic: &CharacteristicInfo,
    deadline: Duration,
) -> Result<NotificationStream, DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    let target = peripheral.characteristics()
        .into_iter()
        .find(|c| c.uuid.eq(&characteristic.uuid) && c.service_uuid.eq(&characteristic.service_uuid))
        .ok_or(DeviceError::MissingCharacteristic)?;

    // open the stream before subscribing, otherwise the first notifications might be missed
    let notifications = peripheral.notifications().await?;
    with_deadline("subscribe", deadline, peripheral.subscribe(&target)).await?;
    Ok(notifications)
}

fn watch_central_events(
    cancel: CancellationToken,
    adapter: Adapter,
    mut events: CentralEventStream,
    callbacks: DispatchSender<PeripheralId>,
) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                event = events.next() => {
                    match event {
                        None => {
                            warn!("Bluetooth adapter event stream ended");
                            break 'mainloop;
                        },
                        Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                            // Peripherals without a name can never match, skip them
                            if let Some(name) = peripheral_name(&adapter, &id).await {
                                callbacks.post(LinkEvent::Advertisement { device: id, name });
                            }
                        },
                        Some(CentralEvent::DeviceDisconnected(id)) => {
                            callbacks.post(LinkEvent::Disconnected { device: id });
                        },
                        Some(_) => {},
                    }
                },
            }
        }
    })
}

async fn apply_scan_command(adapter: Adapter, callbacks: DispatchSender<PeripheralId>, command: ScanCommand) {
    match command {
        ScanCommand::Start => {
            if let Err(err) = adapter.start_scan(ScanFilter::default()).await {
                let err = DeviceError::from(err);
                warn!("Scanning failed {:?}", err);
                callbacks.post(LinkEvent::ScanFailed {
                    no_permission: err.is_permission_denied(),
                    reason: err.to_string(),
                });
            }
        },
        ScanCommand::Stop => {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Failed to stop scanning: {:?}", err);
            }
        },
    }
}

// Scan requests are applied one at a time so that a stop never overtakes the start before it. The task
// ends once every sender is gone and the queued requests have been applied.
fn scan_task<F, Fut>(mut commands: UnboundedReceiver<ScanCommand>, mut apply: F) -> JoinHandle<()>
where
    F: FnMut(ScanCommand) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    spawn(async move {
        while let Some(command) = commands.next().await {
            debug!("Scan command {:?}", command);
            apply(command).await;
        }
    })
}

fn read_notifications_task(
    cancel: CancellationToken,
    device: PeripheralId,
    characteristic: Uuid,
    mut notifications: NotificationStream,
    callbacks: DispatchSender<PeripheralId>,
) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                data = notifications.next() => {
                    match data {
                        None => {
                            info!("Notification stream of {:?} ended", device);
                            break 'mainloop;
                        },
                        Some(data) => {
                            if data.uuid.eq(&characteristic) {
                                callbacks.post(LinkEvent::Notification {
                                    device: device.clone(),
                                    characteristic: data.uuid,
                                    value: data.value,
                                });
                            }
                        },
                    }
                },
            }
        }
    })
}

/// [`RadioLink`] backed by the host's Bluetooth adapter through btleplug. Every operation runs as a
/// background task on the tokio runtime; its outcome is posted to `callbacks`.
pub struct BtleRadioLink {
    cancel: CancellationToken,
    adapter: Adapter,
    callbacks: DispatchSender<PeripheralId>,
    scan_commands: UnboundedSender<ScanCommand>,
    scan_task_handle: JoinHandle<()>,
    notification_tasks: HashMap<PeripheralId, CancellationToken>,
    timing: LinkTiming,
}

impl BtleRadioLink {
    /// Background tasks stop when `cancel` is cancelled, except for scanning which ends with [`Self::close`].
    pub async fn new(
        cancel: CancellationToken,
        adapter: Adapter,
        callbacks: DispatchSender<PeripheralId>,
        timing: LinkTiming,
    ) -> Result<Self, DeviceError> {
        let events = adapter.events().await?;
        let (scan_commands, scan_receiver) = unbounded();

        watch_central_events(cancel.clone(), adapter.clone(), events, callbacks.clone());

        let scan_adapter = adapter.clone();
        let scan_callbacks = callbacks.clone();
        let scan_task_handle = scan_task(scan_receiver, move |command| {
            apply_scan_command(scan_adapter.clone(), scan_callbacks.clone(), command)
        });

        Ok(BtleRadioLink {
            cancel,
            adapter,
            callbacks,
            scan_commands,
            scan_task_handle,
            notification_tasks: HashMap::new(),
            timing,
        })
    }

    /// Wait until every scan request issued so far, the final stop included, has reached the adapter.
    pub async fn close(self) {
        let BtleRadioLink { scan_commands, scan_task_handle, .. } = self;
        drop(scan_commands);

        scan_task_handle
            .await
            .unwrap_or_else(|err| warn!("Scan task failed: {:?}", err));
    }

    fn send_scan_command(&self, command: ScanCommand) {
        if let Err(err) = self.scan_commands.unbounded_send(command) {
            warn!("Scan task has stopped, dropping {:?}", err.into_inner());
        }
    }
}

impl RadioLink for BtleRadioLink {
    type Device = PeripheralId;

    fn start_scan(&mut self) {
        self.send_scan_command(ScanCommand::Start);
    }

    fn stop_scan(&mut self) {
        self.send_scan_command(ScanCommand::Stop);
    }

    fn connect(&mut self, device: &PeripheralId) {
        let adapter = self.adapter.clone();
        let callbacks = self.callbacks.clone();
        let deadline = self.timing.connect;
        let device = device.clone();

        spawn(async move {
            match connect_peripheral(&adapter, &device, deadline).await {
                Ok(()) => callbacks.post(LinkEvent::Connected { device }),
                Err(err) => {
                    // A connection attempt that did not succeed ends the session, like a disconnect
                    warn!("Connecting to peripheral failed: {:?}", err);
                    callbacks.post(LinkEvent::Disconnected { device });
                },
            }
        });
    }

    fn discover_services(&mut self, device: &PeripheralId) {
        let adapter = self.adapter.clone();
        let callbacks = self.callbacks.clone();
        let deadline = self.timing.discover;
        let device = device.clone();

        spawn(async move {
            let (status, services) = match discover_services(&adapter, &device, deadline).await {
                Ok(services) => (LinkStatus::Success, services),
                Err(err) => (LinkStatus::Failed(err.to_string()), vec![]),
            };

            callbacks.post(LinkEvent::ServicesDiscovered { device, status, services });
        });
    }

    fn enable_notification(&mut self, device: &PeripheralId, characteristic: &CharacteristicInfo) {
        let adapter = self.adapter.clone();
        let callbacks = self.callbacks.clone();
        let deadline = self.timing.subscribe;
        let device = device.clone();
        let characteristic = characteristic.clone();

        let cancel = self.cancel.child_token();
        if let Some(previous) = self.notification_tasks.insert(device.clone(), cancel.clone()) {
            previous.cancel();
        }

        spawn(async move {
            let notifications = match subscribe(&adapter, &device, &characteristic, deadline).await {
                Ok(notifications) => notifications,
                Err(err) => {
                    callbacks.post(LinkEvent::NotificationArmed {
                        device,
                        status: LinkStatus::Failed(err.to_string()),
                    });
                    return;
                },
            };

            if cancel.is_cancelled() {
                debug!("Session of {:?} ended while subscribing", device);
                return;
            }

            callbacks.post(LinkEvent::NotificationArmed { device: device.clone(), status: LinkStatus::Success });

            read_notifications_task(cancel, device, characteristic.uuid, notifications, callbacks)
                .await
                .unwrap_or_else(|err| warn!("Read notifications task failed: {:?}", err));
        });
    }

    // the notification stream of a peripheral outlives its connection, so it is stopped here
    fn release(&mut self, device: &PeripheralId) {
        if let Some(cancel) = self.notification_tasks.remove(device) {
            debug!("Stop reading notifications of {:?}", device);
            cancel.cancel();
        }
    }
}

/// Connect to the platform's Bluetooth stack and construct a [`BtleRadioLink`] on the adapter at `index`.
pub async fn btle_radio_link(
    cancel: CancellationToken,
    index: usize,
    callbacks: DispatchSender<PeripheralId>,
    timing: LinkTiming,
) -> Result<BtleRadioLink, DeviceError> {
    let manager = Manager::new().await?;
    let adapter = find_adapter(&manager, index).await?;
    BtleRadioLink::new(cancel, adapter, callbacks, timing).await
}
