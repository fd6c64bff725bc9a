//! Whole-pipeline behaviour: detections in, runtime replies out.

use aether::protocol::{self, CONTROLLER_PAYLOAD_SIZE, HEADSET_PAYLOAD_SIZE};
use aether::synthetic;
use aether::{
    Config, ControllerButton, ControllerState, DetectedHand, DeviceState, Gesture, HandDetection,
    Handedness, HeadsetState, Orientation, Position, SharedConfig, Tracker,
};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A detection of the user's right hand; the detector sees a mirrored image
/// and labels it "Left".
fn right_hand_detection(pinch: f32) -> HandDetection {
    HandDetection {
        hands: vec![DetectedHand {
            handedness: Handedness::Left,
            landmarks: synthetic::pinching_hand(pinch),
        }],
    }
}

fn tracker() -> Tracker {
    let _ = env_logger::builder().is_test(true).try_init();
    Tracker::start_on(SharedConfig::new(Config::default()), "127.0.0.1:0").unwrap()
}

#[test]
fn test_right_hand_pinch_presses_trigger() {
    let tracker = tracker();
    let (left, right) = tracker.submit_hand_detection(right_hand_detection(0.02)).unwrap();

    assert!(right.buttons.get(ControllerButton::Trigger));
    assert_eq!(right.buttons.iter().filter(|(_, pressed)| *pressed).count(), 1);
    assert!(!left.buttons.any());

    let mut stream = TcpStream::connect(tracker.local_addr().unwrap()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(&[protocol::OP_TRACKING_STATE]).unwrap();

    let mut status = [0u8; 1];
    stream.read_exact(&mut status).unwrap();
    assert_eq!(status[0], 0x02);
    let mut payload = [0u8; CONTROLLER_PAYLOAD_SIZE];
    stream.read_exact(&mut payload).unwrap();
    let (left, right) = protocol::decode_controllers(&payload);
    assert!(right.buttons.get(ControllerButton::Trigger));
    assert!(!left.buttons.any());
}

#[test]
fn test_pinch_hysteresis_through_tracker() {
    let tracker = tracker();
    // 0.075 / 0.3 = 0.25, above enter but below sustain
    let (_, right) = tracker.submit_hand_detection(right_hand_detection(0.075)).unwrap();
    assert!(!right.buttons.any());

    let (_, right) = tracker.submit_hand_detection(right_hand_detection(0.02)).unwrap();
    assert!(right.buttons.get(ControllerButton::Trigger));

    let (_, right) = tracker.submit_hand_detection(right_hand_detection(0.075)).unwrap();
    assert!(right.buttons.get(ControllerButton::Trigger));

    // 0.12 / 0.3 = 0.4, past sustain
    let (_, right) = tracker.submit_hand_detection(right_hand_detection(0.12)).unwrap();
    assert!(!right.buttons.any());
}

#[test]
fn test_rebinding_takes_effect_next_cycle() {
    let tracker = tracker();
    tracker
        .config()
        .update(|config| {
            config
                .right_controller
                .gesture_mappings
                .set(Gesture::Pinch, Some(ControllerButton::AButton));
        })
        .unwrap();

    let (_, right) = tracker.submit_hand_detection(right_hand_detection(0.02)).unwrap();
    assert!(right.buttons.get(ControllerButton::AButton));
    assert!(!right.buttons.get(ControllerButton::Trigger));
}

fn headset(i: u32) -> HeadsetState {
    let v = i as f32;
    HeadsetState {
        position: Position::new(v, v, v),
        pitch: v,
        yaw: v,
    }
}

fn controllers(i: u32) -> (ControllerState, ControllerState) {
    let v = i as f32;
    let mut c = ControllerState {
        position: Position::new(v, v, v),
        orientation: Orientation::new(v, v, v, v),
        joystick_x: v,
        joystick_y: v,
        ..Default::default()
    };
    c.buttons.set(ControllerButton::ALL[i as usize % ControllerButton::COUNT], true);
    (c, c)
}

fn assert_consistent_headset(h: &HeadsetState) {
    let v = h.pitch;
    assert_eq!(*h, headset(v as u32), "torn headset record");
}

fn assert_consistent_controllers(left: &ControllerState, right: &ControllerState) {
    let v = left.joystick_x;
    let (l, r) = controllers(v as u32);
    assert_eq!((*left, *right), (l, r), "torn controller record");
}

#[test]
fn test_concurrent_updates_never_tear() {
    const UPDATES: u32 = 1000;
    let state = Arc::new(DeviceState::new());
    let done = Arc::new(AtomicBool::new(false));

    let head_writer = {
        let state = state.clone();
        std::thread::spawn(move || {
            for i in 1..=UPDATES {
                state.update_headset_state(headset(i));
            }
        })
    };
    let hand_writer = {
        let state = state.clone();
        std::thread::spawn(move || {
            for i in 1..=UPDATES {
                let (l, r) = controllers(i);
                state.update_controller_state(l, r);
            }
        })
    };
    let reader = {
        let state = state.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let mut polls = 0u32;
            loop {
                let finished = done.load(Ordering::Acquire);
                let bytes = protocol::encode_state_report(&state.poll());
                let mut rest = &bytes[1..];
                if bytes[0] & 0x01 != 0 {
                    let payload: [u8; HEADSET_PAYLOAD_SIZE] =
                        rest[..HEADSET_PAYLOAD_SIZE].try_into().unwrap();
                    assert_consistent_headset(&protocol::decode_headset(&payload));
                    rest = &rest[HEADSET_PAYLOAD_SIZE..];
                }
                if bytes[0] & 0x02 != 0 {
                    let payload: [u8; CONTROLLER_PAYLOAD_SIZE] = rest.try_into().unwrap();
                    let (l, r) = protocol::decode_controllers(&payload);
                    assert_consistent_controllers(&l, &r);
                } else {
                    assert!(rest.is_empty());
                }
                polls += 1;
                if finished {
                    break polls;
                }
            }
        })
    };

    head_writer.join().unwrap();
    hand_writer.join().unwrap();
    done.store(true, Ordering::Release);
    assert!(reader.join().unwrap() > 0);

    let (h, l, r) = state.snapshot();
    assert_eq!(h, headset(UPDATES));
    assert_eq!((l, r), controllers(UPDATES));
}
