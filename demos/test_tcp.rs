//! Connect to a ZKTeco device and print its info, users, and attendance log.
//!
//! Usage: cargo run --example test_tcp [IP] [PORT]
//!
//! Default IP: 192.168.90.11

use std::time::Duration;
use zkproto::Client;

#[tokio::main]
async fn main() -> zkproto::Result<()> {
    tracing_subscriber::fmt::init();

    let ip = std::env::args().nth(1).unwrap_or_else(|| "192.168.90.11".to_string());
    let port: u16 = std::env::args().nth(2).and_then(|s| s.parse().ok()).unwrap_or(4370);

    println!("Connecting to {ip}:{port}");
    println!("======================================");

    let mut client = Client::new(ip, port, Duration::from_secs(30), 0);

    println!("\n[1] Connecting...");
    client.create_socket().await.map_err(|e| e.source)?;
    println!("    Connected via {:?}", client.connection_type());

    println!("\n[2] Device info...");
    match client.get_info().await {
        Ok(info) => println!(
            "    users={} logs={} capacity={}",
            info.user_counts, info.log_counts, info.log_capacity
        ),
        Err(e) => println!("    Warning: could not get device info: {e}"),
    }

    println!("\n[3] Downloading users...");
    let users = client.get_users().await.map_err(|e| e.source)?;
    println!("    Downloaded {} users", users.len());
    for user in users.iter().take(5) {
        println!("      uid={} id={} name={}", user.uid, user.user_id, user.name);
    }

    println!("\n[4] Downloading attendance log...");
    let records = client.get_attendances(None).await.map_err(|e| e.source)?;
    println!("    Downloaded {} records", records.len());
    for record in records.iter().take(5) {
        println!(
            "      user_sn={} device_user_id={} record_time={}",
            record.user_sn, record.device_user_id, record.record_time
        );
    }

    println!("\n[5] Disconnecting...");
    client.disconnect().await.map_err(|e| e.source)?;
    println!("    Disconnected.");

    println!("\n======================================");
    println!("Done!");

    Ok(())
}
