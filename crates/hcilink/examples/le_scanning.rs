//! Example: LE Scanning
//!
//! This example runs a host over a raw HCI socket and prints every
//! advertising report for ten seconds. Run with `RUST_LOG=debug` to see the
//! event traffic.

use hcilink::gap::local_name;
use hcilink::{HciCommand, HciSocket, Host, HostConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Opening HCI socket for device 0...");
    let socket = Arc::new(HciSocket::open(0)?);
    let host = Arc::new(Host::new(socket.clone(), HostConfig::default()));

    let reader = {
        let host = host.clone();
        thread::spawn(move || host.run(socket.as_ref()))
    };

    host.init()?;
    println!("Controller reset, ACL MTU is {} bytes", host.acl_mtu());

    host.set_advertising_sink(|report| {
        print!("Device found: {} (RSSI: {})", report.address, report.rssi);
        if let Some(name) = local_name(report.data) {
            print!(" Name: {}", name);
        }
        println!();
    });

    // Enable the LE meta event and every LE sub-event
    host.send(&HciCommand::SetEventMask {
        event_mask: 0x3DBF_F807_FFFB_FFFF,
    })?;
    host.send(&HciCommand::LeSetEventMask { event_mask: 0x1F })?;

    host.send(&HciCommand::LeSetScanParameters {
        scan_type: 1,          // Active scanning
        scan_interval: 0x0010, // 10ms in 0.625ms units
        scan_window: 0x0010,   // 10ms in 0.625ms units
        own_address_type: 0,   // Public Device Address
        filter_policy: 0,      // Accept all advertisements
    })?;
    host.send(&HciCommand::LeSetScanEnable {
        enable: true,
        filter_duplicates: true,
    })?;
    println!("Scanning for 10 seconds...");

    thread::sleep(Duration::from_secs(10));

    host.send(&HciCommand::LeSetScanEnable {
        enable: false,
        filter_duplicates: false,
    })?;
    println!("Stopped scanning");

    let stats = host.stats();
    println!(
        "{} events dispatched, {} unsupported",
        stats.events_dispatched, stats.unsupported_events
    );

    host.shutdown();
    reader.join().map_err(|_| "reader thread panicked")??;
    Ok(())
}
