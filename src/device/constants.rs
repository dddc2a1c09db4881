use std::time::Duration;
use uuid::Uuid;

/**
 * The advertised local name of the peripheral. Must match exactly.
 */
pub const PERIPHERAL_NAME: &str = "Adafruit Bluefruit LE";

/**
 * The UUID of the Bluetooth BLE service for the Nordic UART service
 */
pub const UART_SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic that notifies us of events (UART RX).
 */
pub const UART_RX_CHARACTERISTIC: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";
// pub const UART_TX_CHARACTERISTIC: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/**
 * The UUID of the client characteristic configuration descriptor, written to enable notifications.
 */
pub const CLIENT_CHARACTERISTIC_CONFIG: &str = "00002902-0000-1000-8000-00805f9b34fb";

pub const EVENT_CODE_RESET: u8 = 1;
pub const EVENT_CODE_COUNT_UP: u8 = 2;

/**
 * How long connecting to the peripheral may take, unless configured otherwise.
 */
pub const CONNECT_DEADLINE: Duration = Duration::from_secs(10);

/**
 * How long service discovery may take, unless configured otherwise.
 */
pub const DISCOVER_DEADLINE: Duration = Duration::from_secs(15);

/**
 * How long subscribing to the notify characteristic may take, unless configured otherwise.
 */
pub const SUBSCRIBE_DEADLINE: Duration = Duration::from_secs(5);

// The identifiers above are compile time constants; parsing can not fail.
pub fn make_uart_service_uuid() -> Uuid {
    Uuid::parse_str(UART_SERVICE).unwrap()
}

pub fn make_uart_rx_uuid() -> Uuid {
    Uuid::parse_str(UART_RX_CHARACTERISTIC).unwrap()
}

pub fn make_client_characteristic_config_uuid() -> Uuid {
    Uuid::parse_str(CLIENT_CHARACTERISTIC_CONFIG).unwrap()
}
