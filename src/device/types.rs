use uuid::Uuid;

/// Application level event decoded from a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Reset,
    CountUp,
    Unknown(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    Scanning,
    Connecting,
    ServiceDiscovery,
    SubscribingNotify,
    Ready,
    Disconnected,
}

impl LinkPhase {
    /// True for the phases in which the radio link to the peripheral is established.
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkPhase::ServiceDiscovery | LinkPhase::SubscribingNotify | LinkPhase::Ready)
    }
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            LinkPhase::Idle => "Idle",
            LinkPhase::Scanning => "Scanning",
            LinkPhase::Connecting => "Connecting",
            LinkPhase::ServiceDiscovery => "ServiceDiscovery",
            LinkPhase::SubscribingNotify => "SubscribingNotify",
            LinkPhase::Ready => "Ready",
            LinkPhase::Disconnected => "Disconnected",
        };

        write!(f, "{}", result)
    }
}

/// Completion status of an asynchronous radio operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Success,
    Failed(String),
}

impl LinkStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, LinkStatus::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics.iter().find(|characteristic| characteristic.uuid.eq(uuid))
    }
}

/// Callbacks from the radio. `D` is the platform's handle for a peripheral.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent<D> {
    Advertisement {
        device: D,
        name: String,
    },
    ScanFailed {
        reason: String,
        no_permission: bool,
    },
    Connected {
        device: D,
    },
    Disconnected {
        device: D,
    },
    ServicesDiscovered {
        device: D,
        status: LinkStatus,
        services: Vec<ServiceInfo>,
    },
    NotificationArmed {
        device: D,
        status: LinkStatus,
    },
    Notification {
        device: D,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}
