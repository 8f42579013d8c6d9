//! Integration tests against loopback mock TCP/UDP devices.
//!
//! Scenarios 2 and 3 from spec.md §8 (packed-timestamp and sextet-timestamp
//! decoding) are exercised as plain unit tests in `src/codec.rs`; the
//! scenarios here all need a socket, so they live in this crate-external
//! suite per the teacher's `zk_tcp/tests.rs` placement convention.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use zkproto::codec::RealTimeEvent;
use zkproto::transport::{ProgressCallback, RealTimeCallback, TcpTransport, Transport};
use zkproto::{codec, command, Client, ConnectionType};

async fn read_tcp_frame(stream: &mut TcpStream) -> (u16, Vec<u8>) {
    let mut prefix = [0u8; 8];
    stream.read_exact(&mut prefix).await.unwrap();
    let len = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
    let mut inner = vec![0u8; len];
    stream.read_exact(&mut inner).await.unwrap();
    let header = codec::parse_udp_header(&inner[0..8]);
    (header.cmd, inner[8..].to_vec())
}

async fn write_tcp_frame(stream: &mut TcpStream, cmd: u16, session_id: u16, reply_id: u16, data: &[u8]) {
    let frame = codec::build_tcp_frame(cmd, session_id, reply_id, data);
    stream.write_all(&frame).await.unwrap();
}

/// Scenario 1: CONNECT round-trip assigns the device's session id.
#[tokio::test]
async fn connect_round_trip_assigns_session_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (cmd, _body) = read_tcp_frame(&mut stream).await;
        assert_eq!(cmd, command::CMD_CONNECT);
        let reply_body = [0x05, 0x00, 0x00, 0x00, 0xAA, 0x55];
        write_tcp_frame(&mut stream, command::CMD_ACK_OK, 0, 0, &reply_body).await;
    });

    let mut transport = TcpTransport::new("127.0.0.1", addr.port(), Duration::from_secs(2));
    transport.connect().await.unwrap();
    assert_eq!(transport.session_id(), 0x55AA);
    assert_eq!(transport.reply_id(), 0);

    server.await.unwrap();
}

/// Scenario 4: a two-chunk bulk read reassembles to the announced size, with
/// progress reported monotonically and ending at N.
#[tokio::test]
async fn chunked_bulk_read_tcp_reassembles_to_announced_size() {
    const N: u32 = 130_944; // 2 * MAX_CHUNK (65472)

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (cmd, _) = read_tcp_frame(&mut stream).await;
        assert_eq!(cmd, command::CMD_CONNECT);
        write_tcp_frame(&mut stream, command::CMD_ACK_OK, 0, 0, &[0, 0, 0, 0, 0xAA, 0x55]).await;

        let (cmd, _) = read_tcp_frame(&mut stream).await;
        assert_eq!(cmd, command::CMD_DATA_WRRQ);
        let mut prep_body = vec![0u8; 5];
        prep_body[0] = 0x01;
        prep_body[1..5].copy_from_slice(&N.to_le_bytes());
        write_tcp_frame(&mut stream, command::CMD_PREPARE_DATA, 0x55AA, 0, &prep_body).await;

        // Open-question quirk (spec.md §9): the inclusive chunk loop sends
        // one extra, zero-sized DATA_RDY when `remain == 0`.
        for _ in 0..3 {
            let (cmd, _) = read_tcp_frame(&mut stream).await;
            assert_eq!(cmd, command::CMD_DATA_RDY);
        }

        write_tcp_frame(&mut stream, command::CMD_DATA, 0x55AA, 0, &vec![0xABu8; 65472]).await;
        write_tcp_frame(&mut stream, command::CMD_DATA, 0x55AA, 0, &vec![0xCDu8; 65472]).await;
    });

    let mut transport = TcpTransport::new("127.0.0.1", addr.port(), Duration::from_secs(2));
    transport.connect().await.unwrap();

    let progress_log = Arc::new(Mutex::new(Vec::new()));
    let log_for_cb = progress_log.clone();
    let progress: ProgressCallback = Box::new(move |received, total| {
        log_for_cb.lock().unwrap().push((received, total));
    });

    let data = transport
        .read_with_buffer(command::request_data::GET_ATTENDANCE_LOGS, Some(progress))
        .await
        .unwrap();

    assert_eq!(data.len(), N as usize);
    let log = progress_log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert!(log[0].0 <= log[1].0);
    assert_eq!(*log.last().unwrap(), (N as usize, N as usize));

    server.await.unwrap();
}

/// Scenario 5: TCP connect refused, fall back to UDP, and route subsequent
/// operations through it.
#[tokio::test]
async fn tcp_refused_falls_back_to_udp_and_routes_get_time() {
    let udp_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = udp_socket.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];

        let (_n, peer) = udp_socket.recv_from(&mut buf).await.unwrap();
        let header = codec::parse_udp_header(&buf[0..8]);
        assert_eq!(header.cmd, command::CMD_CONNECT);
        let reply = codec::build_udp_frame(command::CMD_ACK_OK, 0, 0, &[0, 0, 0, 0, 0xAA, 0x55]);
        udp_socket.send_to(&reply, peer).await.unwrap();

        let (_n, peer) = udp_socket.recv_from(&mut buf).await.unwrap();
        let header = codec::parse_udp_header(&buf[0..8]);
        assert_eq!(header.cmd, command::CMD_GET_TIME);
        let mut body = vec![0u8; 12];
        body[8..12].copy_from_slice(&355_068_915u32.to_le_bytes());
        let reply = codec::build_udp_frame(command::CMD_ACK_OK, 0x55AA, header.reply_id, &body);
        udp_socket.send_to(&reply, peer).await.unwrap();
    });

    // No TCP listener is bound on this port, so the TCP leg is refused.
    let mut client = Client::new("127.0.0.1", addr.port(), Duration::from_secs(2), 0);
    client.create_socket().await.unwrap();
    assert_eq!(client.connection_type(), Some(ConnectionType::Udp));

    let ts = client.get_time().await.unwrap();
    assert_eq!(ts.year, 2011);
    assert_eq!(ts.month, 0);
    assert_eq!(ts.day, 18);

    server.await.unwrap();
}

/// Scenario 6: a real-time event arriving mid-bulk-read is demultiplexed —
/// the event callback fires and the bulk-read buffer stays event-free.
#[tokio::test]
async fn real_time_event_is_demuxed_from_in_flight_bulk_read() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (cmd, _) = read_tcp_frame(&mut stream).await;
        assert_eq!(cmd, command::CMD_CONNECT);
        write_tcp_frame(&mut stream, command::CMD_ACK_OK, 0, 0, &[0, 0, 0, 0, 0xAA, 0x55]).await;

        let (cmd, _) = read_tcp_frame(&mut stream).await;
        assert_eq!(cmd, command::CMD_REG_EVENT);
        write_tcp_frame(&mut stream, command::CMD_ACK_OK, 0x55AA, 0, &[]).await;

        let (cmd, _) = read_tcp_frame(&mut stream).await;
        assert_eq!(cmd, command::CMD_DATA_WRRQ);
        let mut prep_body = vec![0u8; 5];
        prep_body[0] = 0x01;
        prep_body[1..5].copy_from_slice(&72u32.to_le_bytes());
        write_tcp_frame(&mut stream, command::CMD_PREPARE_DATA, 0x55AA, 0, &prep_body).await;

        let (cmd, _) = read_tcp_frame(&mut stream).await;
        assert_eq!(cmd, command::CMD_DATA_RDY);

        // Event-kind (EF_ATTLOG) is carried at the session-id slot of the
        // inner header for unsolicited event frames — see codec::is_event_frame_tcp.
        let mut event_body = vec![0u8; 52];
        event_body[0..3].copy_from_slice(b"123");
        event_body[26..32].copy_from_slice(&[23, 7, 14, 9, 30, 45]);
        let event_frame = codec::build_tcp_frame(command::CMD_REG_EVENT, command::EF_ATTLOG, 0, &event_body);
        stream.write_all(&event_frame).await.unwrap();

        let user_record = vec![0x42u8; 72];
        write_tcp_frame(&mut stream, command::CMD_DATA, 0x55AA, 0, &user_record).await;
    });

    let mut transport = TcpTransport::new("127.0.0.1", addr.port(), Duration::from_secs(2));
    transport.connect().await.unwrap();

    let events: Arc<Mutex<Vec<RealTimeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let events_for_cb = events.clone();
    let cb: RealTimeCallback = Arc::new(move |event| {
        events_for_cb.lock().unwrap().push(event);
    });
    transport.subscribe_real_time(cb).await.unwrap();

    let data = transport
        .read_with_buffer(command::request_data::GET_USERS, None)
        .await
        .unwrap();

    assert_eq!(data, vec![0x42u8; 72]);
    assert!(data.iter().all(|&b| b == 0x42));

    let received = events.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].user_id, "123");
    assert_eq!(received[0].timestamp.year, 2023);

    server.await.unwrap();
}
