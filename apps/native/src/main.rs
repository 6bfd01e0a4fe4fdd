use futures::stream::StreamExt;
use rfcomm_core::{v24, BdAddr, NodeParent};
use rfcomm_sim::{CaptureConsumer, MemoryLink, MemoryLinkFactory, NodeTable};
use rfcomm_tty::{Driver, DriverConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tty_protocol::{Credentials, DeviceFlags, DeviceRequest, LineSettings, ReleaseRequest, TtyError};
use tty_runtime::CancelToken;

const REMOTE: &str = "00:1A:7D:DA:71:13";

fn load_config() -> Result<DriverConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) if path != "-" => {
            let text = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&text)?)
        }
        _ => Ok(DriverConfig::default()),
    }
}

/// Line framing for the bound port, e.g. "7E1"; 8N1 when absent
fn line_settings() -> LineSettings {
    let framing = std::env::args().nth(2).unwrap_or_else(|| "8N1".into());
    LineSettings::from_framing(&framing, 115200)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let dst: BdAddr = REMOTE.parse()?;

    println!("Starting RFCOMM TTY demo...");
    println!("Max devices: {}", config.max_devices);

    // 1. Driver on simulated links
    let factory = Arc::new(
        MemoryLinkFactory::new()
            .with_mtu(64)
            .with_credits(4)
            .with_parent(NodeParent("hci0:11".into())),
    );
    let nodes = Arc::new(NodeTable::new());
    let driver = Driver::new(config, factory.clone(), nodes.clone())?;
    let mut events = driver
        .take_event_receiver()
        .ok_or("event receiver already taken")?;

    // 2. Bound device: opening it dials out
    let admin = Credentials::admin();
    let id = driver.create(&admin, &DeviceRequest::new(BdAddr::ANY, dst, 1))?;
    let link = factory.last().ok_or("factory allocated no link")?;

    let remote = link.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        remote.set_remote_v24(v24::RTC | v24::RTR | v24::DV);
        remote.remote_connect();
    });

    let consumer = Arc::new(CaptureConsumer::new());
    let port = driver.open(id, consumer.clone(), &CancelToken::new()).await?;
    let line = line_settings();
    port.set_line_settings(line)?;
    println!(
        "rfcomm{}: line {} {}{:?}{}",
        id, line.baud_rate, line.data_bits, line.parity, line.stop_bits
    );

    // 3. Traffic both ways
    let sent = port.write(b"AT+CGMI\r")?;
    println!("rfcomm{}: wrote {} bytes, room left {}", id, sent, port.write_room());
    link.ack_all();
    link.deliver(b"\r\nSimulated Modem\r\nOK\r\n");
    println!(
        "rfcomm{}: received {:?}",
        id,
        String::from_utf8_lossy(&consumer.received())
    );
    println!("rfcomm{}: modem lines {:#05x}", id, port.tiocmget());

    port.close();
    driver.release(&admin, &ReleaseRequest::new(id))?;

    // 4. Adopted link that releases itself on hangup
    let incoming = Arc::new(MemoryLink::connected());
    incoming.deliver(b"hello before anyone listened");
    let req = DeviceRequest::new(BdAddr::ANY, dst, 2).with_flags(DeviceFlags::RELEASE_ON_HANGUP);
    let adopted = driver.create_adopting(&Credentials::unprivileged(), &req, incoming.clone())?;

    for info in driver.list(16)? {
        println!(
            "rfcomm{}: channel {} {:?} {:?}",
            info.id, info.channel, info.state, info.flags
        );
    }

    incoming.remote_hangup(104);

    // 5. Wait for the reaper to finish the adopted device
    let deadline = tokio::time::sleep(Duration::from_secs(1));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    println!("event: {:?}", event);
                    if event == (tty_protocol::DriverEvent::DeviceDestroyed { id: adopted }) {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut deadline => {
                println!("Timed out waiting for rfcomm{} to go away", adopted);
                break;
            }
        }
    }

    match driver.device_info(adopted) {
        Err(TtyError::NotFound(_)) => println!("rfcomm{}: released after hangup", adopted),
        other => println!("rfcomm{}: unexpected state {:?}", adopted, other),
    }

    println!("Demo Complete.");
    Ok(())
}
