//! Linux evdev type/code constants used by gesture segmentation
//!
//! Values from `include/uapi/linux/input-event-codes.h`. Label lookups cover
//! the subset `getevent -l` prints for touchscreens; other labels (`KEY_*`,
//! vendor codes) are recognised as symbolic by [`is_label`] but not resolved.

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_ABS: u16 = 0x03;

pub const SYN_REPORT: u16 = 0x00;
pub const SYN_MT_REPORT: u16 = 0x02;
pub const SYN_DROPPED: u16 = 0x03;

pub const BTN_TOUCH: u16 = 0x14a;
pub const BTN_TOOL_FINGER: u16 = 0x145;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_MT_SLOT: u16 = 0x2f;
pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;
pub const ABS_MT_PRESSURE: u16 = 0x3a;

/// Resolve an event type label (`EV_ABS`) to its number
pub fn type_from_label(label: &str) -> Option<u16> {
    match label {
        "EV_SYN" => Some(EV_SYN),
        "EV_KEY" => Some(EV_KEY),
        "EV_REL" => Some(0x02),
        "EV_ABS" => Some(EV_ABS),
        "EV_MSC" => Some(0x04),
        "EV_SW" => Some(0x05),
        _ => None,
    }
}

/// Resolve an event code label (`ABS_MT_POSITION_X`) to its number
pub fn code_from_label(label: &str) -> Option<u16> {
    match label {
        "SYN_REPORT" => Some(SYN_REPORT),
        "SYN_CONFIG" => Some(0x01),
        "SYN_MT_REPORT" => Some(SYN_MT_REPORT),
        "SYN_DROPPED" => Some(SYN_DROPPED),
        "BTN_TOUCH" => Some(BTN_TOUCH),
        "BTN_TOOL_PEN" => Some(0x140),
        "BTN_TOOL_RUBBER" => Some(0x141),
        "BTN_TOOL_FINGER" => Some(BTN_TOOL_FINGER),
        "BTN_TOOL_DOUBLETAP" => Some(0x14d),
        "BTN_TOOL_TRIPLETAP" => Some(0x14e),
        "BTN_TOOL_QUADTAP" => Some(0x14f),
        "ABS_X" => Some(ABS_X),
        "ABS_Y" => Some(ABS_Y),
        "ABS_MT_SLOT" => Some(ABS_MT_SLOT),
        "ABS_MT_TOUCH_MAJOR" => Some(ABS_MT_TOUCH_MAJOR),
        "ABS_MT_TOUCH_MINOR" => Some(0x31),
        "ABS_MT_WIDTH_MAJOR" => Some(0x32),
        "ABS_MT_WIDTH_MINOR" => Some(0x33),
        "ABS_MT_ORIENTATION" => Some(0x34),
        "ABS_MT_POSITION_X" => Some(ABS_MT_POSITION_X),
        "ABS_MT_POSITION_Y" => Some(ABS_MT_POSITION_Y),
        "ABS_MT_TOOL_TYPE" => Some(0x37),
        "ABS_MT_BLOB_ID" => Some(0x38),
        "ABS_MT_TRACKING_ID" => Some(ABS_MT_TRACKING_ID),
        "ABS_MT_PRESSURE" => Some(ABS_MT_PRESSURE),
        "ABS_MT_DISTANCE" => Some(0x3b),
        "MSC_SCAN" => Some(0x04),
        "MSC_TIMESTAMP" => Some(0x05),
        _ => None,
    }
}

/// Resolve a value label (`DOWN`, `UP`) to its number
pub fn value_from_label(label: &str) -> Option<i32> {
    match label {
        "DOWN" => Some(1),
        "UP" => Some(0),
        "REPEAT" => Some(2),
        _ => None,
    }
}

/// Symbolic getevent token (`KEY_POWER`, `ABS_MT_TOOL_X`) rather than hex
pub fn is_label(token: &str) -> bool {
    token.contains('_')
        && token.starts_with(|c: char| c.is_ascii_uppercase())
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// True for the frame terminator `EV_SYN/SYN_REPORT/0`
pub fn is_syn_report(ev_type: u16, code: u16, value: i32) -> bool {
    ev_type == EV_SYN && code == SYN_REPORT && value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_resolve() {
        assert_eq!(type_from_label("EV_ABS"), Some(3));
        assert_eq!(code_from_label("ABS_MT_POSITION_X"), Some(53));
        assert_eq!(code_from_label("BTN_TOUCH"), Some(330));
        assert_eq!(code_from_label("ABS_MT_TRACKING_ID"), Some(57));
        assert_eq!(value_from_label("DOWN"), Some(1));
        assert_eq!(type_from_label("EV_BOGUS"), None);
        assert_eq!(code_from_label("ABS_MT_ORIENTATION"), Some(0x34));
        assert_eq!(code_from_label("BTN_TOOL_DOUBLETAP"), Some(0x14d));
    }

    #[test]
    fn test_is_label() {
        assert!(is_label("KEY_VOLUMEDOWN"));
        assert!(is_label("ABS_MT_TOOL_X"));
        assert!(!is_label("0039"));
        assert!(!is_label("ffffffff"));
        assert!(!is_label("DOWN"));
        assert!(!is_label("00zz"));
    }

    #[test]
    fn test_syn_report() {
        assert!(is_syn_report(0, 0, 0));
        assert!(!is_syn_report(0, SYN_DROPPED, 0));
        assert!(!is_syn_report(3, 0, 0));
    }
}
