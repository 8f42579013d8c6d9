//! UDP transport: the binary protocol over bare datagrams.
//!
//! The teacher carries no UDP path; this module is grounded in `joshfom`'s
//! `zkteco::udp::ZKUdp` (bind-then-`connect()` datagram socket, single-shot
//! `execute_cmd`, DATA_WRRQ/DATA_RDY chunked reassembly), reimplemented with
//! this crate's `thiserror`/`tracing` idiom instead of `Result<_, String>`.

use super::{RealTimeCallback, Transport, CHUNK_IDLE_UDP, CONNECT_TIMEOUT};
use crate::codec;
use crate::command;
use crate::error::{ClientError, Result, TimeoutKind};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// UDP implementation of [`Transport`].
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    bound_port: Option<u16>,
    session_id: u16,
    reply_id: u16,
    ip: String,
    port: u16,
    inport: u16,
    timeout: Duration,
    real_time_cb: Option<RealTimeCallback>,
}

impl UdpTransport {
    pub fn new(ip: impl Into<String>, port: u16, inport: u16, timeout: Duration) -> Self {
        Self {
            socket: None,
            bound_port: None,
            session_id: 0,
            reply_id: 0,
            ip: ip.into(),
            port,
            inport,
            timeout,
            real_time_cb: None,
        }
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    /// `reply_kind` classifies the wait if it times out — ordinary commands
    /// use `ReceivingResponseAfterRequest`; the DATA_WRRQ announcing reply
    /// uses `ReceivingRequestData` (see `read_with_buffer`).
    async fn send_and_receive(&mut self, cmd: u16, data: &[u8], reply_kind: TimeoutKind) -> Result<(u16, Vec<u8>)> {
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

        let frame = codec::build_udp_frame(cmd, self.session_id, self.reply_id, data);
        let socket = self.socket.as_ref().ok_or(ClientError::ConnectionRefused)?;
        debug!(cmd = command::command_name(cmd), bytes = frame.len(), "UDP TX");
        socket.send(&frame).await?;

        read_next_reply(socket, dur, reply_kind, &self.real_time_cb).await
    }

    async fn send_chunk_request(&mut self, start: u32, size: u32) -> Result<()> {
        self.reply_id = self.reply_id.wrapping_add(1);
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&start.to_le_bytes());
        body.extend_from_slice(&size.to_le_bytes());

        let socket = self.socket.as_ref().ok_or(ClientError::ConnectionRefused)?;
        let frame = codec::build_udp_frame(command::CMD_DATA_RDY, self.session_id, self.reply_id, &body);
        if let Err(e) = socket.send(&frame).await {
            warn!(start, size, error = %e, "failed to send DATA_RDY chunk request");
        }
        Ok(())
    }

    /// Datagram reassembly: appends `DATA` payloads and resolves only when
    /// an `ACK_OK` arrives with the buffer at exactly the announced size
    /// (spec.md §9 open question — a short read never silently succeeds).
    async fn receive_chunks(
        &mut self,
        total_size: usize,
        mut progress: Option<super::ProgressCallback>,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(total_size);
        let mut resp = vec![0u8; 65536];

        loop {
            let socket = self.socket.as_ref().ok_or(ClientError::ConnectionRefused)?;
            let n = match timeout(CHUNK_IDLE_UDP, socket.recv(&mut resp)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(ClientError::Io(e)),
                Err(_) => {
                    return Err(ClientError::Timeout {
                        kind: TimeoutKind::ReceivingPacket,
                        partial: Some(buf),
                    });
                }
            };

            if n < 8 {
                continue;
            }
            let datagram = &resp[..n];

            if self.real_time_cb.is_some() && codec::is_event_frame_udp(datagram) {
                if let Some(cb) = &self.real_time_cb {
                    cb(codec::decode_event_18(&datagram[8..]));
                }
                continue;
            }

            let header = codec::parse_udp_header(&datagram[0..8]);
            match header.cmd {
                cmd if cmd == command::CMD_DATA => {
                    buf.extend_from_slice(&datagram[8..]);
                    if let Some(cb) = progress.as_mut() {
                        cb(buf.len(), total_size);
                    }
                }
                cmd if cmd == command::CMD_ACK_OK => {
                    if buf.len() == total_size {
                        return Ok(buf);
                    }
                }
                _ => {}
            }
        }
    }
}

async fn read_next_reply(
    socket: &UdpSocket,
    dur: Duration,
    kind: TimeoutKind,
    real_time_cb: &Option<RealTimeCallback>,
) -> Result<(u16, Vec<u8>)> {
    let mut buf = vec![0u8; 65536];
    loop {
        let n = timeout(dur, socket.recv(&mut buf))
            .await
            .map_err(|_| ClientError::Timeout { kind, partial: None })??;

        if n < 8 {
            continue;
        }
        let datagram = &buf[..n];

        if real_time_cb.is_some() && codec::is_event_frame_udp(datagram) {
            if let Some(cb) = real_time_cb {
                cb(codec::decode_event_18(&datagram[8..]));
            }
            continue;
        }

        let header = codec::parse_udp_header(&datagram[0..8]);
        return Ok((header.cmd, datagram[8..].to_vec()));
    }
}

impl Transport for UdpTransport {
    async fn connect(&mut self) -> Result<()> {
        let bind_addr = format!("0.0.0.0:{}", self.inport);
        let socket = match UdpSocket::bind(&bind_addr).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                // The configured local port is taken. Rather than claim a
                // phantom connection over a socket we don't hold, rebind to
                // an ephemeral port so the session can still proceed.
                warn!(port = self.inport, "local UDP port in use, rebinding to an ephemeral port");
                UdpSocket::bind("0.0.0.0:0").await?
            }
            Err(e) => return Err(ClientError::Io(e)),
        };

        self.bound_port = Some(socket.local_addr()?.port());

        let peer: SocketAddr = format!("{}:{}", self.ip, self.port)
            .parse()
            .map_err(|e| ClientError::invalid_input(format!("invalid device address: {e}")))?;
        socket.connect(peer).await?;
        self.socket = Some(socket);

        info!(addr = %peer, "UDP connecting");
        let (_, body) = self
            .send_and_receive(command::CMD_CONNECT, &[], TimeoutKind::ReceivingResponseAfterRequest)
            .await?;
        if body.len() < 6 {
            return Err(ClientError::protocol("CONNECT reply shorter than 6 bytes"));
        }
        self.session_id = u16::from_le_bytes([body[4], body[5]]);
        info!(session_id = self.session_id, "UDP connected");
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
        debug!(total_size, "UDP bulk transfer announced");

        if total_size == 0 {
            return Ok(Vec::new());
        }

        let chunks = (total_size / command::MAX_CHUNK) as u32;
        let remain = (total_size % command::MAX_CHUNK) as u32;

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
        self.real_time_cb = Some(cb);
        self.execute_cmd(command::CMD_REG_EVENT, command::request_data::GET_REAL_TIME_EVENT)
            .await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> bool {
        if let Some(socket) = self.socket.as_ref() {
            let frame = codec::build_udp_frame(command::CMD_EXIT, self.session_id, self.reply_id.wrapping_add(1), &[]);
            let _ = socket.send(&frame).await;
        }
        self.socket = None;
        self.bound_port = None;
        self.session_id = 0;
        self.reply_id = 0;
        self.real_time_cb = None;
        true
    }

    fn socket_status(&self) -> String {
        match self.bound_port {
            Some(port) => format!("Bound to port {port}"),
            None => "Unbound".to_string(),
        }
    }
}
