//! Runtime transport over a real loopback socket.

use aether::protocol::{self, CONTROLLER_PAYLOAD_SIZE, HEADSET_PAYLOAD_SIZE};
use aether::{
    ControllerButton, ControllerState, DeviceState, EventBus, GraphicsApi, HeadsetState, Position,
    PresentImageCommand, RegisterImageCommand, RuntimeInfo, TransportEvent, TransportServer,
};
use crossbeam_channel::Receiver;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    server: TransportServer,
    state: Arc<DeviceState>,
    events: Receiver<TransportEvent>,
}

fn start() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let state = Arc::new(DeviceState::new());
    let bus = Arc::new(EventBus::new());
    let events = bus.channel(32);
    let server = TransportServer::start("127.0.0.1:0", state.clone(), bus).unwrap();
    Harness {
        server,
        state,
        events,
    }
}

impl Harness {
    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.server.local_addr()).unwrap();
        stream.set_read_timeout(Some(EVENT_TIMEOUT)).unwrap();
        match self.next_event() {
            TransportEvent::Connected { .. } => {}
            other => panic!("expected Connected, got {:?}", other),
        }
        stream
    }

    fn next_event(&self) -> TransportEvent {
        self.events.recv_timeout(EVENT_TIMEOUT).unwrap()
    }
}

fn request_state(stream: &mut TcpStream) -> u8 {
    stream.write_all(&[protocol::OP_TRACKING_STATE]).unwrap();
    let mut status = [0u8; 1];
    stream.read_exact(&mut status).unwrap();
    status[0]
}

#[test]
fn test_empty_poll_returns_zero_status() {
    let h = start();
    let mut stream = h.connect();
    assert_eq!(request_state(&mut stream), 0x00);
    // no payload follows: the next reply starts with a status byte again
    assert_eq!(request_state(&mut stream), 0x00);
}

#[test]
fn test_headset_only_reply() {
    let h = start();
    let mut stream = h.connect();
    let headset = HeadsetState {
        position: Position::ORIGIN,
        pitch: 12.5,
        yaw: -3.0,
    };
    h.state.update_headset_state(headset);

    assert_eq!(request_state(&mut stream), 0x01);
    let mut buf = [0u8; HEADSET_PAYLOAD_SIZE];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(protocol::decode_headset(&buf), headset);

    // flag cleared after reporting
    assert_eq!(request_state(&mut stream), 0x00);
}

#[test]
fn test_full_reply_headset_first() {
    let h = start();
    let mut stream = h.connect();

    let mut right = ControllerState::default();
    right.buttons.set(ControllerButton::Trigger, true);
    h.state.update_controller_state(ControllerState::default(), right);
    h.state.update_headset_state(HeadsetState {
        pitch: 1.0,
        ..Default::default()
    });

    assert_eq!(request_state(&mut stream), 0x03);
    let mut headset = [0u8; HEADSET_PAYLOAD_SIZE];
    stream.read_exact(&mut headset).unwrap();
    assert_eq!(protocol::decode_headset(&headset).pitch, 1.0);
    let mut controllers = [0u8; CONTROLLER_PAYLOAD_SIZE];
    stream.read_exact(&mut controllers).unwrap();
    let (left, right) = protocol::decode_controllers(&controllers);
    assert!(!left.buttons.any());
    assert!(right.buttons.get(ControllerButton::Trigger));
}

#[test]
fn test_runtime_info_event() {
    let h = start();
    let mut stream = h.connect();
    let info = RuntimeInfo {
        application_name: "OpenComposite_HalfLife".into(),
        graphics_api: GraphicsApi::Direct3D11,
    };
    stream.write_all(&[protocol::OP_RUNTIME_INFO]).unwrap();
    stream.write_all(&protocol::encode_runtime_info(&info)).unwrap();

    match h.next_event() {
        TransportEvent::RuntimeInfo(received) => {
            assert_eq!(received, info);
            assert_eq!(received.display_name(), "HalfLife (OpenComposite)");
        }
        other => panic!("expected RuntimeInfo, got {:?}", other),
    }
}

#[test]
fn test_image_commands_decoded() {
    let h = start();
    let mut stream = h.connect();
    let register = RegisterImageCommand {
        id: 1,
        process_id: 300,
        shared_handle: 0xabcdef,
        format: 28,
        width: 2048,
        height: 1024,
        array_size: 2,
        mip_count: 1,
        opaque0: 5,
        opaque1: 6,
    };
    let present = PresentImageCommand {
        id: 1,
        x: 0,
        y: 0,
        width: 1024,
        height: 1024,
        array_index: 1,
    };

    // written in small pieces to exercise partial reads
    let mut bytes = vec![protocol::OP_REGISTER_IMAGE];
    bytes.extend_from_slice(&protocol::encode_register_image(&register));
    bytes.push(protocol::OP_PRESENT_IMAGE);
    bytes.extend_from_slice(&protocol::encode_present_image(&present));
    for chunk in bytes.chunks(7) {
        stream.write_all(chunk).unwrap();
        stream.flush().unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(h.next_event(), TransportEvent::RegisterImage(register));
    assert_eq!(h.next_event(), TransportEvent::PresentImage(present));
}

#[test]
fn test_unknown_opcode_keeps_connection() {
    let h = start();
    let mut stream = h.connect();
    stream.write_all(&[0x42]).unwrap();
    assert_eq!(request_state(&mut stream), 0x00);
    assert!(h.server.is_connected());
}

#[test]
fn test_reconnect_after_disconnect() {
    let h = start();
    let stream = h.connect();
    drop(stream);
    assert_eq!(h.next_event(), TransportEvent::Disconnected);

    h.state.update_headset_state(HeadsetState::default());
    let mut stream = h.connect();
    assert_eq!(request_state(&mut stream), 0x01);
}

#[test]
fn test_stop_disconnects_peer() {
    let h = start();
    let mut stream = h.connect();
    h.server.stop();

    let mut buf = [0u8; 1];
    // closed by the server: EOF or a reset
    assert!(matches!(stream.read(&mut buf), Ok(0) | Err(_)));
}
