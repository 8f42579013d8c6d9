//! Client façade: TCP-first-then-UDP connect, and every public operation.
//!
//! Grounded in `joshfom`'s `ZKClient` (the `Transport::{Tcp,Udp}` enum and
//! its connect-then-fallback dance), reimplemented against this crate's
//! `Transport` trait and `thiserror`/`tracing` idiom instead of bare
//! `Result<_, String>`.

use crate::codec::{self, AttendanceRecord, PackedTimestamp, User};
use crate::command;
use crate::config::DeviceConfig;
use crate::error::{ClientError, ContextError};
use crate::transport::{ProgressCallback, RealTimeCallback, Transport, TcpTransport, UdpTransport};
use std::time::Duration;
use tracing::{info, warn};

type Result<T> = std::result::Result<T, ContextError>;

/// Which transport negotiated the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Tcp,
    Udp,
}

enum ActiveTransport {
    Tcp(TcpTransport),
    Udp(UdpTransport),
}

/// Firmware string opcode. Not part of the closed command-table enumeration
/// (spec.md §4.2) since it is used by exactly one thin operation.
const CMD_GET_VERSION: u16 = 1100;

/// Conventional ZK device-option keywords (as used by node-zklib/pyzk-style
/// clients) for the TCP-only metadata getters.
mod option_keyword {
    pub const SERIAL_NUMBER: &str = "~SerialNumber";
    pub const DEVICE_NAME: &str = "~DeviceName";
    pub const PLATFORM: &str = "~Platform";
    pub const OS: &str = "~OS";
    pub const WORK_CODE: &str = "WorkCode";
    pub const PIN_WIDTH: &str = "~PIN2Width";
    pub const FACE_FUN_ON: &str = "FaceFunOn";
    pub const SSR: &str = "~SSR";
}

/// High-level client for a single ZKTeco device.
pub struct Client {
    ip: String,
    port: u16,
    timeout: Duration,
    inport: u16,
    transport: Option<ActiveTransport>,
    connection_type: Option<ConnectionType>,
}

impl Client {
    /// `ip` is the device; `port` is the device's ZK port (typically 4370);
    /// `timeout` is the per-command timeout; `inport` is the local UDP bind port.
    pub fn new(ip: impl Into<String>, port: u16, timeout: Duration, inport: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            timeout,
            inport,
            transport: None,
            connection_type: None,
        }
    }

    /// Build a client from a loaded [`DeviceConfig`].
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            config.ip.clone(),
            config.port,
            Duration::from_millis(config.timeout_ms),
            config.inport,
        )
    }

    pub fn connection_type(&self) -> Option<ConnectionType> {
        self.connection_type
    }

    fn wrap(&self, e: ClientError, command: &'static str) -> ContextError {
        e.with_context(self.ip.clone(), command)
    }

    /// Try TCP first; on any failure, fall back to UDP (mirrors `joshfom`'s
    /// `ZKClient::connect`, generalized to this crate's transport types).
    pub async fn create_socket(&mut self) -> Result<()> {
        info!(ip = %self.ip, port = self.port, "connecting");

        let mut tcp = TcpTransport::new(self.ip.clone(), self.port, self.timeout);
        match tcp.connect().await {
            Ok(()) => {
                self.transport = Some(ActiveTransport::Tcp(tcp));
                self.connection_type = Some(ConnectionType::Tcp);
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "TCP connect failed, falling back to UDP");
            }
        }

        let mut udp = UdpTransport::new(self.ip.clone(), self.port, self.inport, self.timeout);
        udp.connect().await.map_err(|e| self.wrap(e, "create_socket"))?;
        self.transport = Some(ActiveTransport::Udp(udp));
        self.connection_type = Some(ConnectionType::Udp);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(ActiveTransport::Tcp(mut t)) => {
                t.disconnect().await;
            }
            Some(ActiveTransport::Udp(mut u)) => {
                u.disconnect().await;
            }
            None => {}
        }
        self.connection_type = None;
        Ok(())
    }

    pub async fn execute_cmd(&mut self, cmd: u16, data: &[u8]) -> Result<Vec<u8>> {
        let result = match self.transport.as_mut() {
            Some(ActiveTransport::Tcp(t)) => t.execute_cmd(cmd, data).await,
            Some(ActiveTransport::Udp(u)) => u.execute_cmd(cmd, data).await,
            None => Err(ClientError::ConnectionRefused),
        };
        result.map_err(|e| self.wrap(e, "execute_cmd"))
    }

    pub async fn free_data(&mut self) -> Result<()> {
        let result = match self.transport.as_mut() {
            Some(ActiveTransport::Tcp(t)) => t.free_data().await,
            Some(ActiveTransport::Udp(u)) => u.free_data().await,
            None => Err(ClientError::ConnectionRefused),
        };
        result.map_err(|e| self.wrap(e, "free_data"))
    }

    async fn read_with_buffer(&mut self, request: &[u8], progress: Option<ProgressCallback>) -> Result<Vec<u8>> {
        let result = match self.transport.as_mut() {
            Some(ActiveTransport::Tcp(t)) => t.read_with_buffer(request, progress).await,
            Some(ActiveTransport::Udp(u)) => u.read_with_buffer(request, progress).await,
            None => Err(ClientError::ConnectionRefused),
        };
        result.map_err(|e| self.wrap(e, "read_with_buffer"))
    }

    pub fn get_socket_status(&self) -> String {
        match self.transport.as_ref() {
            Some(ActiveTransport::Tcp(t)) => t.socket_status(),
            Some(ActiveTransport::Udp(u)) => u.socket_status(),
            None => "No socket instance".to_string(),
        }
    }

    pub async fn get_info(&mut self) -> Result<DeviceInfo> {
        let body = self.execute_cmd(command::CMD_GET_FREE_SIZES, &[]).await?;
        if body.len() < 76 {
            return Err(self.wrap(ClientError::protocol("GET_FREE_SIZES reply too short"), "get_info"));
        }
        Ok(DeviceInfo {
            user_counts: u32::from_le_bytes([body[24], body[25], body[26], body[27]]),
            log_counts: u32::from_le_bytes([body[40], body[41], body[42], body[43]]),
            log_capacity: u32::from_le_bytes([body[72], body[73], body[74], body[75]]),
        })
    }

    pub async fn get_attendance_size(&mut self) -> Result<u32> {
        Ok(self.get_info().await?.log_counts)
    }

    pub async fn get_time(&mut self) -> Result<PackedTimestamp> {
        let body = self.execute_cmd(command::CMD_GET_TIME, &[]).await?;
        if body.len() < 12 {
            return Err(self.wrap(ClientError::protocol("GET_TIME reply too short"), "get_time"));
        }
        let v = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
        Ok(codec::decode_packed_timestamp(v))
    }

    pub async fn get_device_option(&mut self, keyword: &str) -> Result<String> {
        let body = self.execute_cmd(command::CMD_OPTIONS_RRQ, keyword.as_bytes()).await?;
        if body.len() <= 8 {
            return Ok(String::new());
        }
        let end = body[8..].iter().position(|&b| b == 0).map(|p| 8 + p).unwrap_or(body.len());
        let text = String::from_utf8_lossy(&body[8..end]).to_string();
        let prefix = format!("{keyword}=");
        Ok(text.strip_prefix(prefix.as_str()).unwrap_or(&text).to_string())
    }

    pub async fn clear_attendance_log(&mut self) -> Result<()> {
        self.execute_cmd(command::CMD_CLEAR_ATTLOG, &[]).await?;
        Ok(())
    }

    pub async fn enable_device(&mut self) -> Result<()> {
        self.execute_cmd(command::CMD_ENABLEDEVICE, &[]).await?;
        Ok(())
    }

    pub async fn disable_device(&mut self) -> Result<()> {
        self.execute_cmd(command::CMD_DISABLEDEVICE, command::request_data::DISABLE_DEVICE)
            .await?;
        Ok(())
    }

    /// Validate and write a user record (72-byte layout per spec.md §3/§4.5).
    pub async fn set_user(&mut self, user: &NewUser) -> Result<()> {
        if !(1..=3000).contains(&user.uid) {
            return Err(self.wrap(ClientError::invalid_input("uid must be in 1..=3000"), "set_user"));
        }
        if user.user_id.len() > 9 {
            return Err(self.wrap(ClientError::invalid_input("user_id longer than 9 bytes"), "set_user"));
        }
        if user.name.len() > 24 {
            return Err(self.wrap(ClientError::invalid_input("name longer than 24 bytes"), "set_user"));
        }
        if user.password.len() > 8 {
            return Err(self.wrap(ClientError::invalid_input("password longer than 8 bytes"), "set_user"));
        }
        if user.card_no_str().len() > 10 {
            return Err(self.wrap(ClientError::invalid_input("cardno longer than 10 digits"), "set_user"));
        }

        let mut payload = [0u8; 72];
        payload[0..2].copy_from_slice(&user.uid.to_le_bytes());
        payload[2] = user.role;
        payload[3..3 + user.password.len()].copy_from_slice(user.password.as_bytes());
        payload[11..11 + user.name.len()].copy_from_slice(user.name.as_bytes());
        payload[35..39].copy_from_slice(&user.card_no.to_le_bytes());
        payload[48..48 + user.user_id.len()].copy_from_slice(user.user_id.as_bytes());

        self.execute_cmd(command::CMD_USER_WRQ, &payload).await?;
        Ok(())
    }

    pub async fn get_users(&mut self) -> Result<Vec<User>> {
        self.free_data().await.ok();
        let data = self.read_with_buffer(command::request_data::GET_USERS, None).await?;
        self.free_data().await.ok();

        if data.len() < 4 {
            return Ok(Vec::new());
        }
        let record_size = match self.connection_type {
            Some(ConnectionType::Tcp) => 72,
            _ => 28,
        };
        let mut records = &data[4..];
        let mut users = Vec::new();
        while records.len() >= record_size {
            let rec = &records[..record_size];
            users.push(if record_size == 72 {
                codec::decode_user_72(rec)
            } else {
                codec::decode_user_28(rec)
            });
            records = &records[record_size..];
        }
        Ok(users)
    }

    pub async fn get_attendances(&mut self, progress: Option<ProgressCallback>) -> Result<Vec<AttendanceRecord>> {
        self.free_data().await.ok();
        let data = self
            .read_with_buffer(command::request_data::GET_ATTENDANCE_LOGS, progress)
            .await?;
        self.free_data().await.ok();

        if data.len() < 4 {
            return Ok(Vec::new());
        }
        let record_size = match self.connection_type {
            Some(ConnectionType::Tcp) => 40,
            _ => 16,
        };
        let mut records = &data[4..];
        let mut out = Vec::new();
        while records.len() >= record_size {
            let rec = &records[..record_size];
            out.push(if record_size == 40 {
                codec::decode_attendance_40(rec, &self.ip)
            } else {
                codec::decode_attendance_16(rec, &self.ip)
            });
            records = &records[record_size..];
        }
        Ok(out)
    }

    pub async fn get_real_time_logs(&mut self, cb: RealTimeCallback) -> Result<()> {
        let result = match self.transport.as_mut() {
            Some(ActiveTransport::Tcp(t)) => t.subscribe_real_time(cb).await,
            Some(ActiveTransport::Udp(u)) => u.subscribe_real_time(cb).await,
            None => Err(ClientError::ConnectionRefused),
        };
        result.map_err(|e| self.wrap(e, "get_real_time_logs"))
    }

    fn require_tcp(&self, command: &'static str) -> Result<()> {
        match self.connection_type {
            Some(ConnectionType::Tcp) => Ok(()),
            _ => Err(self.wrap(
                ClientError::InvalidOperation("this operation is TCP-only".to_string()),
                command,
            )),
        }
    }

    pub async fn get_serial_number(&mut self) -> Result<String> {
        self.require_tcp("get_serial_number")?;
        self.get_device_option(option_keyword::SERIAL_NUMBER).await
    }

    pub async fn get_device_version(&mut self) -> Result<String> {
        self.require_tcp("get_device_version")?;
        let body = self.execute_cmd(CMD_GET_VERSION, &[]).await?;
        let end = body.get(8..).and_then(|s| s.iter().position(|&b| b == 0)).map(|p| 8 + p).unwrap_or(body.len());
        Ok(String::from_utf8_lossy(body.get(8..end).unwrap_or(&[])).to_string())
    }

    pub async fn get_device_name(&mut self) -> Result<String> {
        self.require_tcp("get_device_name")?;
        self.get_device_option(option_keyword::DEVICE_NAME).await
    }

    pub async fn get_platform(&mut self) -> Result<String> {
        self.require_tcp("get_platform")?;
        self.get_device_option(option_keyword::PLATFORM).await
    }

    pub async fn get_os(&mut self) -> Result<String> {
        self.require_tcp("get_os")?;
        self.get_device_option(option_keyword::OS).await
    }

    pub async fn get_work_code(&mut self) -> Result<String> {
        self.require_tcp("get_work_code")?;
        self.get_device_option(option_keyword::WORK_CODE).await
    }

    pub async fn get_pin(&mut self) -> Result<String> {
        self.require_tcp("get_pin")?;
        self.get_device_option(option_keyword::PIN_WIDTH).await
    }

    /// Inverted-sense convention preserved from the source library: the
    /// device option string signals "on" by *not* containing `"0"`.
    pub async fn get_face_on(&mut self) -> Result<&'static str> {
        self.require_tcp("get_face_on")?;
        let value = self.get_device_option(option_keyword::FACE_FUN_ON).await?;
        Ok(if value.contains('0') { "No" } else { "Yes" })
    }

    pub async fn get_ssr(&mut self) -> Result<String> {
        self.require_tcp("get_ssr")?;
        self.get_device_option(option_keyword::SSR).await
    }

    pub async fn get_firmware(&mut self) -> Result<String> {
        self.require_tcp("get_firmware")?;
        let body = self.execute_cmd(CMD_GET_VERSION, &[]).await?;
        let end = body.get(8..).and_then(|s| s.iter().position(|&b| b == 0)).map(|p| 8 + p).unwrap_or(body.len());
        Ok(String::from_utf8_lossy(body.get(8..end).unwrap_or(&[])).to_string())
    }
}

/// Result of [`Client::get_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_counts: u32,
    pub log_counts: u32,
    pub log_capacity: u32,
}

/// Parameters for [`Client::set_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uid: u16,
    pub user_id: String,
    pub name: String,
    pub password: String,
    pub role: u8,
    pub card_no: u32,
}

impl NewUser {
    fn card_no_str(&self) -> String {
        self.card_no.to_string()
    }
}
