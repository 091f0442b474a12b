//! End-to-end tests driving a host against a scripted controller

use hcilink::hci::constants::*;
use hcilink::{HciCommand, HciError, HciResult, Host, HostConfig, LinkState, PacketSink, PacketSource};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A controller that answers every command and lets tests inject events
#[derive(Default)]
struct FakeController {
    inbox: Mutex<VecDeque<Vec<u8>>>,
    ready: Condvar,
    written: Mutex<Vec<Vec<u8>>>,
}

impl FakeController {
    fn inject(&self, frame: Vec<u8>) {
        self.inbox.lock().unwrap().push_back(frame);
        self.ready.notify_one();
    }

    fn inject_event(&self, code: u8, params: &[u8]) {
        let mut frame = vec![HCI_EVENT_PKT, code, params.len() as u8];
        frame.extend_from_slice(params);
        self.inject(frame);
    }

    fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    fn answer(&self, opcode: u16, params: &[u8]) {
        let [lo, hi] = opcode.to_le_bytes();
        match opcode {
            0x0406 | 0x200D => self.inject_event(EVT_CMD_STATUS, &[0x00, 1, lo, hi]),
            0x2002 => self.inject_event(EVT_CMD_COMPLETE, &[1, lo, hi, 0x00, 0xFB, 0x00, 0x04]),
            0x201B => self.inject_event(EVT_CMD_COMPLETE, &[1, lo, hi, 0x00, params[0], params[1]]),
            _ => self.inject_event(EVT_CMD_COMPLETE, &[1, lo, hi, 0x00]),
        }
    }
}

impl PacketSink for FakeController {
    fn write_packet(&self, packet: &[u8]) -> Result<(), HciError> {
        self.written.lock().unwrap().push(packet.to_vec());
        if packet[0] == HCI_COMMAND_PKT {
            let opcode = u16::from_le_bytes([packet[1], packet[2]]);
            self.answer(opcode, &packet[4..]);
        }
        Ok(())
    }
}

impl PacketSource for FakeController {
    fn read_packet(&self, buf: &mut [u8]) -> Result<usize, HciError> {
        let inbox = self.inbox.lock().unwrap();
        let (mut inbox, _) = self
            .ready
            .wait_timeout_while(inbox, Duration::from_millis(10), |q| q.is_empty())
            .unwrap();
        match inbox.pop_front() {
            Some(frame) => {
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
            None => Ok(0),
        }
    }
}

fn start(config: HostConfig) -> (Arc<FakeController>, Arc<Host>, JoinHandle<HciResult<()>>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let controller = Arc::new(FakeController::default());
    let host = Arc::new(Host::new(controller.clone(), config));
    let reader = {
        let host = host.clone();
        let controller = controller.clone();
        thread::spawn(move || host.run(controller.as_ref()))
    };
    (controller, host, reader)
}

fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

fn le_connection_complete(handle: u16) -> Vec<u8> {
    let [lo, hi] = handle.to_le_bytes();
    vec![
        EVT_LE_CONN_COMPLETE,
        0x00,
        lo,
        hi,
        0x01,
        0x01,
        0xC0,
        0xFF,
        0xEE,
        0xDD,
        0xCC,
        0xBB,
        0x28,
        0x00,
        0x00,
        0x00,
        0xC8,
        0x00,
        0x00,
    ]
}

#[test]
fn test_init_and_commands_through_reader() {
    let (controller, host, reader) = start(HostConfig::default());

    host.init().unwrap();
    assert_eq!(host.acl_mtu(), 251);
    assert_eq!(host.acl_credits().capacity(), 4);

    assert_eq!(host.send(&HciCommand::ReadBdAddr).unwrap(), Some(vec![0x00]));
    assert_eq!(
        controller.written(),
        vec![
            vec![HCI_COMMAND_PKT, 0x03, 0x0C, 0x00],
            vec![HCI_COMMAND_PKT, 0x02, 0x20, 0x00],
            vec![HCI_COMMAND_PKT, 0x09, 0x10, 0x00],
        ]
    );
    assert_eq!(host.command_credits().available(), 1);
    assert!(host.commands().is_empty());

    host.shutdown();
    reader.join().unwrap().unwrap();
}

#[test]
fn test_command_status_answer() {
    let (_controller, host, reader) = start(HostConfig::default());

    let answer = host
        .send(&HciCommand::LeCreateConnectionCancel)
        .unwrap_or_else(|e| panic!("unexpected error: {e}"));
    assert_eq!(answer, Some(vec![0x00]));

    let answer = host.send(&HciCommand::new(OGF_LE, 0x000D, vec![0; 25])).unwrap();
    assert_eq!(answer, None);

    host.shutdown();
    reader.join().unwrap().unwrap();
}

#[test]
fn test_connection_round_trip() {
    let config = HostConfig::new().with_acl_buffers(2, 8);
    let (controller, host, reader) = start(config);

    controller.inject_event(EVT_LE_META_EVENT, &le_connection_complete(0x0001));
    let conn = host.accept_timeout(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(conn.handle(), 0x0001);
    assert_eq!(conn.state(), LinkState::Established);
    assert_eq!(conn.peer_address().to_string(), "BB:CC:DD:EE:FF:C0");
    assert_eq!(conn.parameters().interval, 0x0028);

    // Inbound data
    controller.inject(vec![HCI_ACL_PKT, 0x01, 0x20, 0x03, 0x00, 0x0A, 0x0B, 0x0C]);
    let packet = conn.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(packet.data, vec![0x0A, 0x0B, 0x0C]);

    // Outbound data uses both buffers
    conn.send(&[0x55; 12]).unwrap();
    assert_eq!(conn.tx_buffers().in_flight(), 2);
    assert_eq!(host.acl_credits().available(), 0);

    controller.inject_event(EVT_NUM_COMP_PKTS, &[1, 0x01, 0x00, 0x02, 0x00]);
    assert!(eventually(|| host.acl_credits().available() == 2));
    assert_eq!(conn.tx_buffers().in_flight(), 0);

    // Local disconnect: the command is accepted, the link closes on the event
    host.disconnect(0x0001, HCI_REMOTE_USER_TERMINATED).unwrap();
    assert!(host.connection(0x0001).is_some());
    controller.inject_event(EVT_DISCONN_COMPLETE, &[0x00, 0x01, 0x00, 0x16]);
    assert!(eventually(|| host.connection(0x0001).is_none()));
    assert_eq!(conn.state(), LinkState::Disconnected { reason: 0x16 });

    controller.inject(vec![HCI_ACL_PKT, 0x01, 0x20, 0x01, 0x00, 0x0A]);
    assert!(eventually(|| host.stats().dropped_acl_packets == 1));

    host.shutdown();
    reader.join().unwrap().unwrap();
}

#[test]
fn test_disconnect_unknown_handle_is_refused() {
    let (controller, host, reader) = start(HostConfig::default());

    assert!(matches!(
        host.disconnect(0x0040, HCI_REMOTE_USER_TERMINATED),
        Err(HciError::UnknownHandle(0x0040))
    ));
    assert!(controller.written().is_empty());

    controller.inject_event(EVT_DISCONN_COMPLETE, &[0x00, 0x40, 0x00, 0x13]);
    assert!(eventually(|| host.stats().unknown_handles == 1));
    assert!(host.connections().is_empty());

    host.shutdown();
    reader.join().unwrap().unwrap();
}

#[test]
fn test_ltk_request_is_declined() {
    let (controller, host, reader) = start(HostConfig::default());

    let mut params = vec![EVT_LE_LTK_REQUEST, 0x20, 0x00];
    params.extend_from_slice(&[0; 10]);
    controller.inject_event(EVT_LE_META_EVENT, &params);

    let reply = vec![HCI_COMMAND_PKT, 0x1B, 0x20, 0x02, 0x20, 0x00];
    assert!(eventually(|| controller.written() == vec![reply.clone()]));
    // The reply's own completion is matched, not a stray event
    assert!(eventually(|| host.commands().is_empty()));
    assert_eq!(host.stats().correlation_misses, 0);

    host.shutdown();
    reader.join().unwrap().unwrap();
}

#[test]
fn test_shutdown_tears_down_connections() {
    let (controller, host, reader) = start(HostConfig::default());

    controller.inject_event(EVT_LE_META_EVENT, &le_connection_complete(0x0002));
    let conn = host.accept_timeout(Duration::from_secs(2)).unwrap().unwrap();

    host.shutdown();
    reader.join().unwrap().unwrap();

    assert!(host.connections().is_empty());
    assert!(!conn.is_connected());
    assert!(matches!(host.send(&HciCommand::Reset), Err(HciError::Aborted)));
}

#[test]
fn test_back_to_back_ltk_requests_are_all_declined() {
    let (controller, host, reader) = start(HostConfig::default());

    for handle in [0x0020u16, 0x0021] {
        let [lo, hi] = handle.to_le_bytes();
        let mut params = vec![EVT_LE_LTK_REQUEST, lo, hi];
        params.extend_from_slice(&[0; 10]);
        controller.inject_event(EVT_LE_META_EVENT, &params);
    }

    assert!(eventually(|| controller.written().len() == 2));
    let mut written = controller.written();
    written.sort();
    assert_eq!(
        written,
        vec![
            vec![HCI_COMMAND_PKT, 0x1B, 0x20, 0x02, 0x20, 0x00],
            vec![HCI_COMMAND_PKT, 0x1B, 0x20, 0x02, 0x21, 0x00],
        ]
    );
    assert!(eventually(|| host.commands().is_empty()));

    host.shutdown();
    reader.join().unwrap().unwrap();
}

#[test]
fn test_stuck_handler_does_not_stall_reader() {
    let (controller, host, reader) = start(HostConfig::default());

    let (release, wait) = std::sync::mpsc::channel::<()>();
    let wait = Mutex::new(wait);
    host.set_handler(0xFF, move |_| {
        let _ = wait.lock().unwrap().recv();
    });

    controller.inject_event(0xFF, &[0x01]);
    controller.inject_event(EVT_LE_META_EVENT, &le_connection_complete(0x0003));
    let conn = host.accept_timeout(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(conn.handle(), 0x0003);

    release.send(()).unwrap();
    host.shutdown();
    reader.join().unwrap().unwrap();
}
