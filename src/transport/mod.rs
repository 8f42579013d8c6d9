//! Shared transport contract: the capability set exposed by both the TCP
//! and UDP implementations of the ZK wire protocol.
//!
//! Neither implementation is dispatched through a trait object — the
//! client façade holds a two-variant enum instead — so the methods below
//! use ordinary `async fn`, not `#[async_trait]`.

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use crate::codec::RealTimeEvent;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Invoked for every decoded real-time attendance punch.
pub type RealTimeCallback = Arc<dyn Fn(RealTimeEvent) + Send + Sync>;

/// Invoked during a bulk read with `(bytes_received, total_bytes)`.
pub type ProgressCallback = Box<dyn FnMut(usize, usize) + Send>;

/// Fixed timeout for CONNECT and EXIT, distinct from the per-command timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Idle timer during TCP chunk reassembly; reset by every inbound data frame.
pub const CHUNK_IDLE_TCP: Duration = Duration::from_secs(10);

/// Idle timer during UDP chunk reassembly; reset by every inbound data frame.
pub const CHUNK_IDLE_UDP: Duration = Duration::from_secs(3);

/// The capability set a transport exposes to the client façade.
///
/// Both implementations enforce "at most one command-reply pair in flight":
/// callers drive these methods through `&mut self`, so the borrow checker
/// rules out concurrent use of the same transport instance.
pub trait Transport {
    /// Send CONNECT and store the device-assigned session id.
    async fn connect(&mut self) -> Result<()>;

    /// Send a command and return its decoded payload (header already stripped).
    async fn execute_cmd(&mut self, cmd: u16, data: &[u8]) -> Result<Vec<u8>>;

    /// Announce and reassemble a chunked bulk transfer.
    async fn read_with_buffer(
        &mut self,
        request: &[u8],
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<u8>>;

    /// Release the device's send-side buffer. Required before and after
    /// every bulk read.
    async fn free_data(&mut self) -> Result<()>;

    /// Install a persistent real-time-event listener.
    async fn subscribe_real_time(&mut self, cb: RealTimeCallback) -> Result<()>;

    /// Best-effort EXIT, then close the socket. Always succeeds.
    async fn disconnect(&mut self) -> bool;

    /// Human-readable connection state, matching the device-library
    /// convention of exposing socket status as a string.
    fn socket_status(&self) -> String;
}
