//! Run the tracker against a simulated runtime on loopback.
//!
//! Feeds synthetic hand detections (a right hand pinching on and off) and a
//! slowly turning head, while a client thread speaks the runtime side of the
//! protocol and prints what it receives.
//!
//! Usage: cargo run --example loopback

use aether::protocol::{self, CONTROLLER_PAYLOAD_SIZE, HEADSET_PAYLOAD_SIZE};
use aether::synthetic;
use aether::{
    Config, ControllerButton, DetectedHand, GraphicsApi, HandDetection, Handedness, HeadState,
    RuntimeInfo, SharedConfig, Tracker, TransportEvent,
};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

const RUN_TIME: Duration = Duration::from_secs(3);
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn run_runtime(addr: SocketAddr, deadline: Instant) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(addr)?;

    let info = RuntimeInfo {
        application_name: "OpenComposite_loopback".into(),
        graphics_api: GraphicsApi::Vulkan,
    };
    stream.write_all(&[protocol::OP_RUNTIME_INFO])?;
    stream.write_all(&protocol::encode_runtime_info(&info))?;

    while Instant::now() < deadline {
        stream.write_all(&[protocol::OP_TRACKING_STATE])?;
        let mut status = [0u8; 1];
        stream.read_exact(&mut status)?;

        if status[0] & 0x01 != 0 {
            let mut buf = [0u8; HEADSET_PAYLOAD_SIZE];
            stream.read_exact(&mut buf)?;
            let headset = protocol::decode_headset(&buf);
            println!("headset  pitch={:+6.1}  yaw={:+6.1}", headset.pitch, headset.yaw);
        }
        if status[0] & 0x02 != 0 {
            let mut buf = [0u8; CONTROLLER_PAYLOAD_SIZE];
            stream.read_exact(&mut buf)?;
            let (_, right) = protocol::decode_controllers(&buf);
            println!(
                "right    pos=[{:+.3}, {:+.3}, {:+.3}]  trigger={}",
                right.position.x,
                right.position.y,
                right.position.z,
                right.buttons.get(ControllerButton::Trigger),
            );
        }

        std::thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let mut tracker = match Tracker::start_on(SharedConfig::new(Config::default()), "127.0.0.1:0") {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to start tracker: {}", e);
            std::process::exit(1);
        }
    };
    tracker.events().subscribe(|event| match event {
        TransportEvent::RuntimeInfo(info) => println!("runtime  {}", info.display_name()),
        other => println!("event    {:?}", other),
    });

    let Some(addr) = tracker.local_addr() else {
        eprintln!("Tracker is not listening");
        std::process::exit(1);
    };
    println!("Listening on {}", addr);

    let deadline = Instant::now() + RUN_TIME;
    let runtime = std::thread::spawn(move || run_runtime(addr, deadline));

    let start = Instant::now();
    let mut frame: u32 = 0;
    while Instant::now() < deadline {
        let t = start.elapsed().as_secs_f32();
        tracker.submit_head_state(HeadState {
            visible: true,
            pitch: 10.0 * t.sin(),
            yaw: 25.0 * (0.5 * t).sin(),
            ..Default::default()
        });

        // Pinch for one second out of every two. The detector labels the
        // user's right hand "Left".
        let pinch = if (frame / 30) % 2 == 0 { 0.02 } else { 0.15 };
        tracker.submit_hand_detection(HandDetection {
            hands: vec![DetectedHand {
                handedness: Handedness::Left,
                landmarks: synthetic::pinching_hand(pinch),
            }],
        });

        frame += 1;
        std::thread::sleep(FRAME_INTERVAL);
    }

    match runtime.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => eprintln!("Runtime error: {}", e),
        Err(_) => eprintln!("Runtime thread panicked"),
    }
    tracker.shutdown();
}
