//! Pure, stateless wire-format encoding and decoding.
//!
//! Nothing in this module touches a socket. Frame builders take the
//! session/reply ids by value and return bytes; callers are responsible for
//! tracking the authoritative reply-id themselves (see [`crate::transport`]).

use chrono::{DateTime, Local, TimeZone};

/// ZK protocol magic bytes prefixing every TCP frame.
pub const TCP_HEADER: [u8; 4] = [0x50, 0x50, 0x82, 0x7d];

/// Size of the inner UDP-shaped header: cmd(2) + checksum(2) + session(2) + reply(2).
pub const HEADER_SIZE: usize = 8;

/// Compute the ZK protocol's 16-bit checksum over `data`.
///
/// One's-complement sum of little-endian 16-bit words (an odd trailing byte
/// is added as an unsigned byte), folded modulo 65536, then complemented.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        sum += if chunk.len() == 2 {
            u16::from_le_bytes([chunk[0], chunk[1]]) as u32
        } else {
            chunk[0] as u32
        };
        sum %= 0xFFFF;
    }
    (0xFFFFu32.wrapping_sub(sum).wrapping_sub(1) & 0xFFFF) as u16
}

/// Build the 8-byte UDP-shaped header + payload, with a correct checksum.
///
/// `reply_id` is post-incremented and rewritten into the frame as required by
/// the invariant that CONNECT resets the counter and every other command
/// advances it by one; callers must also update their own authoritative
/// counter (this function only stamps the bytes it is given).
pub fn build_udp_frame(cmd: u16, session_id: u16, reply_id: u16, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
    frame.extend_from_slice(&cmd.to_le_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&session_id.to_le_bytes());
    frame.extend_from_slice(&reply_id.to_le_bytes());
    frame.extend_from_slice(data);

    let cksum = checksum(&frame);
    frame[2..4].copy_from_slice(&cksum.to_le_bytes());
    frame
}

/// Build a TCP frame: the 8-byte length-prefix, then a UDP-shaped frame.
pub fn build_tcp_frame(cmd: u16, session_id: u16, reply_id: u16, data: &[u8]) -> Vec<u8> {
    let inner = build_udp_frame(cmd, session_id, reply_id, data);

    let mut frame = Vec::with_capacity(8 + inner.len());
    frame.extend_from_slice(&TCP_HEADER);
    frame.extend_from_slice(&(inner.len() as u32).to_le_bytes());
    frame.extend_from_slice(&inner);
    frame
}

/// Strip the 8-byte TCP length-prefix, returning the input unchanged if it is
/// shorter than 8 bytes or does not start with the TCP magic.
pub fn strip_tcp_prefix(bytes: &[u8]) -> &[u8] {
    if bytes.len() >= 8 && bytes[0..4] == TCP_HEADER {
        &bytes[8..]
    } else {
        bytes
    }
}

/// Decoded UDP-shaped header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub cmd: u16,
    pub checksum: u16,
    pub session_id: u16,
    pub reply_id: u16,
}

/// Parse an 8-byte UDP-shaped header. Panics-free: callers must ensure
/// `bytes.len() >= 8`.
pub fn parse_udp_header(bytes: &[u8]) -> UdpHeader {
    UdpHeader {
        cmd: u16::from_le_bytes([bytes[0], bytes[1]]),
        checksum: u16::from_le_bytes([bytes[2], bytes[3]]),
        session_id: u16::from_le_bytes([bytes[4], bytes[5]]),
        reply_id: u16::from_le_bytes([bytes[6], bytes[7]]),
    }
}

/// Decoded TCP header: the 4-byte length prefix plus the inner UDP-shaped header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub payload_size: u32,
    pub inner: UdpHeader,
}

/// Parse a 16-byte TCP header (8-byte prefix + 8-byte inner header).
pub fn parse_tcp_header(bytes: &[u8]) -> TcpHeader {
    let payload_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    TcpHeader {
        payload_size,
        inner: parse_udp_header(&bytes[8..16]),
    }
}

/// Whether a UDP datagram is an unsolicited real-time event frame.
pub fn is_event_frame_udp(bytes: &[u8]) -> bool {
    bytes.len() >= 8 && parse_udp_header(&bytes[0..8]).cmd == crate::command::CMD_REG_EVENT
}

/// Whether a (possibly TCP-prefixed) frame is an unsolicited real-time event frame.
pub fn is_event_frame_tcp(bytes: &[u8]) -> bool {
    let inner = strip_tcp_prefix(bytes);
    if inner.len() < 6 {
        return false;
    }
    let cmd = u16::from_le_bytes([inner[0], inner[1]]);
    let event = u16::from_le_bytes([inner[4], inner[5]]);
    cmd == crate::command::CMD_REG_EVENT && event == crate::command::EF_ATTLOG
}

fn extract_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

/// A user/biometric-enrollment record on the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    pub uid: u16,
    pub role: u8,
    pub password: String,
    pub name: String,
    pub card_no: u32,
    pub user_id: String,
}

/// Decode the 72-byte (TCP) user record layout.
pub fn decode_user_72(rec: &[u8]) -> User {
    User {
        uid: u16::from_le_bytes([rec[0], rec[1]]),
        role: rec[2],
        password: extract_ascii(&rec[3..11]),
        name: extract_ascii(&rec[11..35]),
        card_no: u32::from_le_bytes([rec[35], rec[36], rec[37], rec[38]]),
        user_id: extract_ascii(&rec[48..57]),
    }
}

/// Decode the 28-byte (UDP) user record layout.
pub fn decode_user_28(rec: &[u8]) -> User {
    User {
        uid: u16::from_le_bytes([rec[0], rec[1]]),
        role: rec[2],
        name: extract_ascii(&rec[8..16]),
        card_no: 0,
        password: String::new(),
        user_id: u32::from_le_bytes([rec[24], rec[25], rec[26], rec[27]]).to_string(),
    }
}

/// A single attendance punch record on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub user_sn: u16,
    pub device_user_id: String,
    pub record_time: u32,
    /// The device's address, annotated by `Client::get_attendances` since the
    /// wire record itself carries no device identity.
    pub ip: String,
}

/// Decode the 40-byte (TCP) attendance record layout.
pub fn decode_attendance_40(rec: &[u8], ip: &str) -> AttendanceRecord {
    AttendanceRecord {
        user_sn: u16::from_le_bytes([rec[0], rec[1]]),
        device_user_id: extract_ascii(&rec[2..11]),
        record_time: u32::from_le_bytes([rec[27], rec[28], rec[29], rec[30]]),
        ip: ip.to_string(),
    }
}

/// Decode the 16-byte (UDP) attendance record layout.
pub fn decode_attendance_16(rec: &[u8], ip: &str) -> AttendanceRecord {
    let device_user_id = u16::from_le_bytes([rec[0], rec[1]]);
    AttendanceRecord {
        user_sn: device_user_id,
        device_user_id: device_user_id.to_string(),
        record_time: u32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]),
        ip: ip.to_string(),
    }
}

/// A real-time attendance punch pushed unsolicited by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealTimeEvent {
    pub user_id: String,
    pub timestamp: PackedSextet,
}

/// Decode the 52-byte (TCP, post-prefix-strip) real-time event layout.
pub fn decode_event_52(rec: &[u8]) -> RealTimeEvent {
    RealTimeEvent {
        user_id: extract_ascii(&rec[0..9]),
        timestamp: decode_sextet(&rec[26..32]),
    }
}

/// Decode the 18-byte (UDP) real-time event layout.
pub fn decode_event_18(rec: &[u8]) -> RealTimeEvent {
    RealTimeEvent {
        user_id: rec[8].to_string(),
        timestamp: decode_sextet(&rec[12..18]),
    }
}

/// A timestamp decoded from the device's compact packed-u32 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedTimestamp {
    pub year: u32,
    /// Zero-based, as the device encodes it (January = 0).
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

/// Decode the compact (u32) packed-timestamp format.
///
/// The day arithmetic (`(v % 31) + 1`) is wrong for months with fewer than
/// 31 days, but it is the device's published scheme — preserved bit-for-bit,
/// not "fixed".
pub fn decode_packed_timestamp(mut v: u32) -> PackedTimestamp {
    let second = v % 60;
    v /= 60;
    let minute = v % 60;
    v /= 60;
    let hour = v % 24;
    v /= 24;
    let day = (v % 31) + 1;
    v /= 31;
    let month = v % 12;
    v /= 12;
    let year = v + 2000;

    PackedTimestamp {
        year,
        month,
        day,
        hour,
        minute,
        second,
    }
}

impl PackedTimestamp {
    /// Render as a local `DateTime`, clamping an out-of-range day (see
    /// [`decode_packed_timestamp`]'s doc comment) to the last valid day of
    /// the month rather than failing.
    pub fn to_local(self) -> Option<DateTime<Local>> {
        let month = self.month + 1;
        Local
            .with_ymd_and_hms(self.year as i32, month, self.day, self.hour, self.minute, self.second)
            .single()
    }
}

/// A timestamp decoded from the device's 6-byte packed "sextet" encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedSextet {
    pub year: u32,
    /// Zero-based, as the device encodes it (January = 0) — see [`PackedTimestamp::month`].
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

/// Decode the 6-byte packed-sextet timestamp format.
pub fn decode_sextet(b: &[u8]) -> PackedSextet {
    PackedSextet {
        year: 2000 + b[0] as u32,
        month: b[1].wrapping_sub(1) as u32,
        day: b[2] as u32,
        hour: b[3] as u32,
        minute: b[4] as u32,
        second: b[5] as u32,
    }
}

impl PackedSextet {
    /// Render as a local `DateTime`.
    pub fn to_local(self) -> Option<DateTime<Local>> {
        Local
            .with_ymd_and_hms(self.year as i32, self.month + 1, self.day, self.hour, self.minute, self.second)
            .single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trips_through_build_and_recompute() {
        let frame = build_udp_frame(crate::command::CMD_CONNECT, 0, 0, &[]);
        let written = u16::from_le_bytes([frame[2], frame[3]]);

        let mut zeroed = frame.clone();
        zeroed[2..4].copy_from_slice(&[0, 0]);
        assert_eq!(checksum(&zeroed), written);
    }

    #[test]
    fn checksum_of_empty_is_max_u16() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn strip_tcp_prefix_recovers_udp_shaped_header_with_matching_cmd() {
        let tcp = build_tcp_frame(crate::command::CMD_GET_TIME, 7, 3, &[1, 2, 3]);
        let inner = strip_tcp_prefix(&tcp);
        let header = parse_udp_header(&inner[0..8]);
        assert_eq!(header.cmd, crate::command::CMD_GET_TIME);
        assert_eq!(header.session_id, 7);
        assert_eq!(header.reply_id, 3);
    }

    #[test]
    fn strip_tcp_prefix_is_identity_on_short_or_unprefixed_input() {
        assert_eq!(strip_tcp_prefix(&[1, 2, 3]), &[1, 2, 3]);
        let not_prefixed = [0u8; 16];
        assert_eq!(strip_tcp_prefix(&not_prefixed), &not_prefixed[..]);
    }

    #[test]
    fn tcp_header_payload_size_matches_inner_frame_length() {
        let tcp = build_tcp_frame(crate::command::CMD_CONNECT, 0, 0, &[9, 9, 9]);
        let header = parse_tcp_header(&tcp[0..16]);
        assert_eq!(header.payload_size as usize, HEADER_SIZE + 3);
    }

    #[test]
    fn user_name_decoding_trims_at_nul_terminator() {
        let mut rec = [0u8; 72];
        rec[11..16].copy_from_slice(b"Alice");
        let user = decode_user_72(&rec);
        assert_eq!(user.name, "Alice");
    }

    #[test]
    fn compact_timestamp_decodes_known_value() {
        // 2011-01-18 14:15:15, packed per the device's (((Y-2000)*12+M)*31+D-1)*24+h)*60+m)*60+s scheme.
        let ts = decode_packed_timestamp(355_068_915);
        assert_eq!(ts.year, 2011);
        assert_eq!(ts.month, 0);
        assert_eq!(ts.day, 18);
        assert_eq!(ts.hour, 14);
        assert_eq!(ts.minute, 15);
        assert_eq!(ts.second, 15);
    }

    #[test]
    fn sextet_timestamp_decodes_known_value() {
        let ts = decode_sextet(&[23, 7, 14, 9, 30, 45]);
        assert_eq!(ts.year, 2023);
        assert_eq!(ts.month, 6); // zero-based; July
        assert_eq!(ts.day, 14);
        assert_eq!(ts.hour, 9);
        assert_eq!(ts.minute, 30);
        assert_eq!(ts.second, 45);

        let local = ts.to_local().unwrap();
        use chrono::{Datelike, Timelike};
        assert_eq!((local.year(), local.month(), local.day()), (2023, 7, 14));
        assert_eq!((local.hour(), local.minute(), local.second()), (9, 30, 45));
    }

    #[test]
    fn event_discrimination_matches_command_and_kind() {
        let udp_event = build_udp_frame(crate::command::CMD_REG_EVENT, 1, 1, &[]);
        assert!(is_event_frame_udp(&udp_event));

        let mut tcp_inner = build_udp_frame(crate::command::CMD_REG_EVENT, 1, 1, &[0; 4]);
        tcp_inner[HEADER_SIZE..HEADER_SIZE + 2].copy_from_slice(&crate::command::EF_ATTLOG.to_le_bytes());
        assert!(is_event_frame_tcp(&tcp_inner));

        let not_event = build_udp_frame(crate::command::CMD_ACK_OK, 1, 1, &[]);
        assert!(!is_event_frame_udp(&not_event));
    }
}
