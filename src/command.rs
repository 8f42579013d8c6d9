//! ZKTeco protocol opcode table and canonical request bodies.

/// Connect to the device and start a session.
pub const CMD_CONNECT: u16 = 1000;
/// End the session.
pub const CMD_EXIT: u16 = 1001;
/// Enable the device (re-arm fingerprint reader / card scanner).
pub const CMD_ENABLEDEVICE: u16 = 1002;
/// Disable the device for the duration of a bulk transfer.
pub const CMD_DISABLEDEVICE: u16 = 1003;
/// Read a device option (keyword=value string).
pub const CMD_OPTIONS_RRQ: u16 = 11;
/// Read the device's current time.
pub const CMD_GET_TIME: u16 = 201;
/// Read free-size / record-count counters.
pub const CMD_GET_FREE_SIZES: u16 = 50;
/// Write a user record.
pub const CMD_USER_WRQ: u16 = 8;
/// Clear the attendance log table.
pub const CMD_CLEAR_ATTLOG: u16 = 15;
/// Release the device's send-side buffer after a bulk read.
pub const CMD_FREE_DATA: u16 = 1502;
/// Announce a bulk read (users, attendance logs, ...).
pub const CMD_DATA_WRRQ: u16 = 1503;
/// Request one chunk of an announced bulk transfer.
pub const CMD_DATA_RDY: u16 = 1504;
/// Device-initiated announcement of a bulk transfer's total size.
pub const CMD_PREPARE_DATA: u16 = 1500;
/// A single chunk of bulk-transfer payload.
pub const CMD_DATA: u16 = 1501;
/// Generic device acknowledgement.
pub const CMD_ACK_OK: u16 = 2000;
/// Device rejected the command.
pub const CMD_ACK_ERROR: u16 = 2001;
/// Subscribe to / announce real-time events.
pub const CMD_REG_EVENT: u16 = 500;
/// Real-time event kind: an attendance punch.
pub const EF_ATTLOG: u16 = 1;

/// Maximum bytes requested per DATA_RDY chunk. Implementation-defined per the
/// protocol; 0xFFC0 matches every source this crate was grounded on (both of
/// the original desktop app's ZK clients, and the horus-attendance UDP client).
pub const MAX_CHUNK: usize = 65472;

/// Canonical request bodies used by the thin operations.
pub mod request_data {
    /// `DATA_WRRQ` body requesting the full user table.
    pub const GET_USERS: &[u8] = &[0x01, 0x09, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

    /// `DATA_WRRQ` body requesting the full attendance log table.
    pub const GET_ATTENDANCE_LOGS: &[u8] =
        &[0x01, 0x0d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

    /// `DISABLEDEVICE` request payload.
    pub const DISABLE_DEVICE: &[u8] = &[0x00, 0x00, 0x00, 0x00];

    /// `REG_EVENT` payload enabling real-time attendance notifications.
    pub const GET_REAL_TIME_EVENT: &[u8] = &[0xff, 0xff, 0x00, 0x00];
}

/// Map a response opcode to its symbolic name, for error messages.
pub fn command_name(cmd: u16) -> &'static str {
    match cmd {
        CMD_CONNECT => "CMD_CONNECT",
        CMD_EXIT => "CMD_EXIT",
        CMD_ENABLEDEVICE => "CMD_ENABLEDEVICE",
        CMD_DISABLEDEVICE => "CMD_DISABLEDEVICE",
        CMD_OPTIONS_RRQ => "CMD_OPTIONS_RRQ",
        CMD_GET_TIME => "CMD_GET_TIME",
        CMD_GET_FREE_SIZES => "CMD_GET_FREE_SIZES",
        CMD_USER_WRQ => "CMD_USER_WRQ",
        CMD_CLEAR_ATTLOG => "CMD_CLEAR_ATTLOG",
        CMD_FREE_DATA => "CMD_FREE_DATA",
        CMD_DATA_WRRQ => "CMD_DATA_WRRQ",
        CMD_DATA_RDY => "CMD_DATA_RDY",
        CMD_PREPARE_DATA => "CMD_PREPARE_DATA",
        CMD_DATA => "CMD_DATA",
        CMD_ACK_OK => "CMD_ACK_OK",
        CMD_ACK_ERROR => "CMD_ACK_ERROR",
        CMD_REG_EVENT => "CMD_REG_EVENT",
        _ => "UNKNOWN_COMMAND",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_opcode_has_stable_name() {
        assert_eq!(command_name(0xFFF0), "UNKNOWN_COMMAND");
    }

    #[test]
    fn known_opcodes_round_trip_to_distinct_names() {
        assert_eq!(command_name(CMD_CONNECT), "CMD_CONNECT");
        assert_eq!(command_name(CMD_ACK_OK), "CMD_ACK_OK");
        assert_ne!(command_name(CMD_CONNECT), command_name(CMD_EXIT));
    }
}
