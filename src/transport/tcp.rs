//! TCP transport: the binary protocol over a length-prefixed TCP stream.
//!
//! Generalizes the teacher's `zk_tcp` module (`build_packet`/`read_response`/
//! `read_with_buffer`) from its hardcoded PREPARE_BUFFER/READ_BUFFER pair to
//! the DATA_WRRQ/DATA_RDY model, and adds real-time event demultiplexing
//! (absent from the teacher) grounded in `joshfom`'s `check_not_event_tcp`.

use super::{RealTimeCallback, Transport, CHUNK_IDLE_TCP, CONNECT_TIMEOUT};
use crate::codec::{self, HEADER_SIZE, TCP_HEADER};
use crate::command;
use crate::error::{ClientError, Result, TimeoutKind};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    NoSocket,
    Open,
    Closed,
}

/// TCP implementation of [`Transport`].
pub struct TcpTransport {
    stream: Option<TcpStream>,
    state: SocketState,
    session_id: u16,
    reply_id: u16,
    ip: String,
    port: u16,
    timeout: Duration,
    real_time_cb: Option<RealTimeCallback>,
}

impl TcpTransport {
    pub fn new(ip: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            stream: None,
            state: SocketState::NoSocket,
            session_id: 0,
            reply_id: 0,
            ip: ip.into(),
            port,
            timeout,
            real_time_cb: None,
        }
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn reply_id(&self) -> u16 {
        self.reply_id
    }

    /// Send one frame and await exactly one non-event reply, returning its
    /// command id and decoded body. Event frames are demultiplexed inline.
    /// `reply_kind` classifies the wait if it times out — ordinary commands
    /// use `ReceivingResponseAfterRequest`; the DATA_WRRQ announcing reply
    /// uses `ReceivingRequestData` (see `read_with_buffer`).
    async fn send_and_receive(&mut self, cmd: u16, data: &[u8], reply_kind: TimeoutKind) -> Result<(u16, Vec<u8>)> {
        let stream = self.stream.as_mut().ok_or(ClientError::ConnectionRefused)?;

        if cmd == command::CMD_CONNECT {
            self.session_id = 0;
            self.reply_id = 0;
        } else {
            self.reply_id = self.reply_id.wrapping_add(1);
        }

        let dur = if cmd == command::CMD_CONNECT || cmd == command::CMD_EXIT {
            CONNECT_TIMEOUT
        } else {
            self.timeout
        };

        let frame = codec::build_tcp_frame(cmd, self.session_id, self.reply_id, data);
        debug!(cmd = command::command_name(cmd), bytes = frame.len(), "TCP TX");
        write_frame(stream, &frame, dur).await?;

        read_next_reply(stream, dur, reply_kind, &self.real_time_cb).await
    }

    async fn send_chunk_request(&mut self, start: u32, size: u32) -> Result<()> {
        self.reply_id = self.reply_id.wrapping_add(1);
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&start.to_le_bytes());
        body.extend_from_slice(&size.to_le_bytes());

        let stream = self.stream.as_mut().ok_or(ClientError::ConnectionRefused)?;
        let frame = codec::build_tcp_frame(command::CMD_DATA_RDY, self.session_id, self.reply_id, &body);
        // Fire-and-forget: a send failure here is logged, not raised — the
        // chunk-idle timeout surfaces the resulting stall to the caller.
        if let Err(e) = write_frame(stream, &frame, self.timeout).await {
            warn!(start, size, error = %e, "failed to send DATA_RDY chunk request");
        }
        Ok(())
    }

    async fn receive_chunks(
        &mut self,
        total_size: usize,
        mut progress: Option<super::ProgressCallback>,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(total_size);

        while buf.len() < total_size {
            let stream = self.stream.as_mut().ok_or(ClientError::ConnectionRefused)?;
            match read_next_reply(stream, CHUNK_IDLE_TCP, TimeoutKind::ReceivingPacket, &self.real_time_cb).await {
                Ok((cmd, body)) if cmd == command::CMD_DATA => {
                    buf.extend_from_slice(&body);
                    if let Some(cb) = progress.as_mut() {
                        cb(buf.len(), total_size);
                    }
                }
                Ok(_) => {
                    // PREPARE_DATA / ACK_OK stragglers mid-stream carry no payload.
                }
                Err(ClientError::Timeout { kind, .. }) => {
                    return Err(ClientError::Timeout {
                        kind,
                        partial: Some(buf),
                    });
                }
                Err(ClientError::Disconnected { .. }) => {
                    return Err(ClientError::Disconnected { partial: Some(buf) });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(buf)
    }
}

async fn write_frame(stream: &mut TcpStream, frame: &[u8], dur: Duration) -> Result<()> {
    timeout(dur, stream.write_all(frame))
        .await
        .map_err(|_| ClientError::Timeout {
            kind: TimeoutKind::WritingMessage,
            partial: None,
        })??;
    Ok(())
}

/// Read raw TCP frames until one is not a real-time event, decoding and
/// dispatching event frames to `real_time_cb` along the way.
async fn read_next_reply(
    stream: &mut TcpStream,
    dur: Duration,
    kind: TimeoutKind,
    real_time_cb: &Option<RealTimeCallback>,
) -> Result<(u16, Vec<u8>)> {
    loop {
        let mut prefix = [0u8; 8];
        match timeout(dur, stream.read_exact(&mut prefix)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ClientError::Disconnected { partial: None });
            }
            Ok(Err(e)) => return Err(ClientError::Io(e)),
            Err(_) => {
                return Err(ClientError::Timeout { kind, partial: None });
            }
        }

        if prefix[0..4] != TCP_HEADER {
            return Err(ClientError::protocol(format!(
                "invalid TCP frame prefix: {:02x?}",
                &prefix[0..4]
            )));
        }

        let payload_size = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
        let mut inner = vec![0u8; payload_size];
        timeout(dur, stream.read_exact(&mut inner))
            .await
            .map_err(|_| ClientError::Timeout { kind, partial: None })??;

        if real_time_cb.is_some() {
            let mut full_frame = Vec::with_capacity(8 + inner.len());
            full_frame.extend_from_slice(&prefix);
            full_frame.extend_from_slice(&inner);
            if codec::is_event_frame_tcp(&full_frame) {
                if let Some(cb) = real_time_cb {
                    let event = codec::decode_event_52(&inner[HEADER_SIZE..]);
                    cb(event);
                }
                continue;
            }
        }

        let header = codec::parse_udp_header(&inner[0..8]);
        let body = inner[HEADER_SIZE..].to_vec();
        return Ok((header.cmd, body));
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.ip, self.port);
        info!(addr, "TCP connecting");

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::Timeout {
                kind: TimeoutKind::WritingMessage,
                partial: None,
            })?
            .map_err(|_| ClientError::ConnectionRefused)?;

        self.stream = Some(stream);
        self.state = SocketState::Open;

        let (_, body) = self
            .send_and_receive(command::CMD_CONNECT, &[], TimeoutKind::ReceivingResponseAfterRequest)
            .await?;
        if body.len() < 6 {
            self.stream = None;
            self.state = SocketState::NoSocket;
            return Err(ClientError::protocol("CONNECT reply shorter than 6 bytes"));
        }
        self.session_id = u16::from_le_bytes([body[4], body[5]]);
        info!(session_id = self.session_id, "TCP connected");
        Ok(())
    }

    async fn execute_cmd(&mut self, cmd: u16, data: &[u8]) -> Result<Vec<u8>> {
        let (_, body) = self
            .send_and_receive(cmd, data, TimeoutKind::ReceivingResponseAfterRequest)
            .await?;
        Ok(body)
    }

    async fn read_with_buffer(
        &mut self,
        request: &[u8],
        progress: Option<super::ProgressCallback>,
    ) -> Result<Vec<u8>> {
        // The initial wait for DATA_WRRQ's size-announcing reply is the
        // protocol's distinct "receiving request data" timeout class.
        let (cmd, body) = self
            .send_and_receive(command::CMD_DATA_WRRQ, request, TimeoutKind::ReceivingRequestData)
            .await?;

        if cmd == command::CMD_DATA {
            return Ok(body);
        }

        if cmd != command::CMD_ACK_OK && cmd != command::CMD_PREPARE_DATA {
            return Err(ClientError::unhandled_command(cmd));
        }

        if body.len() < 5 {
            return Err(ClientError::protocol("PREPARE_DATA reply shorter than 5 bytes"));
        }
        let total_size = u32::from_le_bytes([body[1], body[2], body[3], body[4]]) as usize;
        debug!(total_size, "TCP bulk transfer announced");

        if total_size == 0 {
            return Ok(Vec::new());
        }

        let chunks = (total_size / command::MAX_CHUNK) as u32;
        let remain = (total_size % command::MAX_CHUNK) as u32;

        // Open question (spec.md §9): the chunk loop is inclusive, so when
        // `remain == 0` the final iteration issues a zero-sized DATA_RDY.
        // The device tolerates it; this is preserved rather than optimized away.
        for i in 0..=chunks {
            let start = i * command::MAX_CHUNK as u32;
            let size = if i < chunks { command::MAX_CHUNK as u32 } else { remain };
            self.send_chunk_request(start, size).await?;
        }

        self.receive_chunks(total_size, progress).await
    }

    async fn free_data(&mut self) -> Result<()> {
        self.execute_cmd(command::CMD_FREE_DATA, &[]).await?;
        Ok(())
    }

    async fn subscribe_real_time(&mut self, cb: RealTimeCallback) -> Result<()> {
        if self.real_time_cb.is_some() {
            debug!("real-time listener already registered, ignoring");
            return Ok(());
        }
        if self.reply_id > 100 {
            self.reply_id = 0;
        }
        self.real_time_cb = Some(cb);
        self.execute_cmd(command::CMD_REG_EVENT, &[0x01, 0x00, 0x00, 0x00]).await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> bool {
        if let Some(stream) = self.stream.as_mut() {
            let frame = codec::build_tcp_frame(command::CMD_EXIT, self.session_id, self.reply_id.wrapping_add(1), &[]);
            let _ = timeout(CONNECT_TIMEOUT, stream.write_all(&frame)).await;
        }
        self.stream = None;
        self.state = SocketState::Closed;
        self.session_id = 0;
        self.reply_id = 0;
        self.real_time_cb = None;
        true
    }

    fn socket_status(&self) -> String {
        match self.state {
            SocketState::NoSocket => "No socket instance".to_string(),
            SocketState::Open => "Open".to_string(),
            SocketState::Closed => "Closed".to_string(),
        }
    }
}
