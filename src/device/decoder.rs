use crate::device::constants::{EVENT_CODE_COUNT_UP, EVENT_CODE_RESET};
use crate::device::types::AppEvent;

/// Decode a notification payload. Only the first byte is significant: it is an ASCII digit, so `'1'`
/// becomes code 1. An empty payload is treated as code 0.
pub fn decode(bytes: &[u8]) -> AppEvent {
    let code = match bytes.first() {
        // bytes above 0x7F are taken as negative, so 0xFF is -1 before the offset
        Some(&byte) => i32::from(byte as i8) - i32::from(b'0'),
        None => 0,
    };

    match code {
        code if code == i32::from(EVENT_CODE_RESET) => AppEvent::Reset,
        code if code == i32::from(EVENT_CODE_COUNT_UP) => AppEvent::CountUp,
        code => AppEvent::Unknown(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_unknown_zero() {
        assert_eq!(decode(&[]), AppEvent::Unknown(0));
    }

    #[test]
    fn known_codes() {
        assert_eq!(decode(b"1"), AppEvent::Reset);
        assert_eq!(decode(b"2"), AppEvent::CountUp);
    }

    #[test]
    fn only_first_byte_counts() {
        assert_eq!(decode(b"1garbage"), AppEvent::Reset);
        assert_eq!(decode(b"21"), AppEvent::CountUp);
        assert_eq!(decode(b"5\r\n"), AppEvent::Unknown(5));
    }

    #[test]
    fn non_digits_keep_their_raw_offset() {
        assert_eq!(decode(b"0"), AppEvent::Unknown(0));
        assert_eq!(decode(&[0x00]), AppEvent::Unknown(-48));
        assert_eq!(decode(b"A"), AppEvent::Unknown(17));
        assert_eq!(decode(&[0x80]), AppEvent::Unknown(-176));
        assert_eq!(decode(&[0xFF]), AppEvent::Unknown(-49));
    }
}
