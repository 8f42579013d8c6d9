//! Client library for the ZKTeco biometric attendance terminal binary protocol.

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod transport;

pub use client::{Client, ConnectionType, DeviceInfo, NewUser};
pub use codec::{AttendanceRecord, PackedSextet, PackedTimestamp, RealTimeEvent, User};
pub use config::DeviceConfig;
pub use error::{ClientError, ContextError, Result};
