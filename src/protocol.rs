//! Binary protocol between the tracker and the runtime.
//!
//! The runtime drives every exchange by sending a one-byte opcode; the
//! tracker only ever answers. All integers and floats are little-endian,
//! floats are IEEE-754 binary32.
//!
//! | opcode | direction | payload |
//! |---|---|---|
//! | `0x00` | runtime → tracker | none; answered with a status byte plus fresh payloads |
//! | `0x01` | runtime → tracker | `u32` name length, UTF-8 name, `u32` graphics API |
//! | `0x02` | runtime → tracker | register image, 56 bytes |
//! | `0x03` | runtime → tracker | present image, 24 bytes |
//!
//! Payload lengths are not validated beyond the fixed-size reads and a cap
//! on the application name ([`MAX_APPLICATION_NAME_LEN`]). A peer
//! that sends malformed data desynchronizes the stream; the runtime is a
//! trusted loopback peer and hardening against it is out of scope.

use crate::pose::{Orientation, Position};
use crate::types::{
    ControllerButton, ControllerState, HeadsetState, PresentImageCommand, RegisterImageCommand,
    RuntimeInfo, StateReport,
};

// -- Opcodes --
pub const OP_TRACKING_STATE: u8 = 0x00;
pub const OP_RUNTIME_INFO: u8 = 0x01;
pub const OP_REGISTER_IMAGE: u8 = 0x02;
pub const OP_PRESENT_IMAGE: u8 = 0x03;

// -- Payload geometry --
/// position xyz, pitch, yaw
pub const HEADSET_PAYLOAD_SIZE: usize = 5 * 4;
/// Two poses (position xyz + quaternion xyzw), 8 button bytes per
/// controller, two axes per controller.
pub const CONTROLLER_PAYLOAD_SIZE: usize = 2 * 7 * 4 + 2 * ControllerButton::COUNT + 2 * 2 * 4;
pub const REGISTER_IMAGE_SIZE: usize = 56;
pub const PRESENT_IMAGE_SIZE: usize = 24;

/// Upper bound on the runtime's application name. Longer names are treated
/// as a broken stream.
pub const MAX_APPLICATION_NAME_LEN: usize = 64 * 1024;

/// A request read from the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    TrackingState,
    RuntimeInfo,
    RegisterImage,
    PresentImage,
    Unknown(u8),
}

impl Request {
    pub fn from_opcode(opcode: u8) -> Request {
        match opcode {
            OP_TRACKING_STATE => Request::TrackingState,
            OP_RUNTIME_INFO => Request::RuntimeInfo,
            OP_REGISTER_IMAGE => Request::RegisterImage,
            OP_PRESENT_IMAGE => Request::PresentImage,
            other => Request::Unknown(other),
        }
    }
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn le_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn le_f32(data: &[u8], at: usize) -> f32 {
    f32::from_bits(le_u32(data, at))
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn pose_values(c: &ControllerState) -> [f32; 7] {
    [
        c.position.x,
        c.position.y,
        c.position.z,
        c.orientation.x,
        c.orientation.y,
        c.orientation.z,
        c.orientation.w,
    ]
}

/// Append the 20-byte headset payload.
pub fn encode_headset(state: &HeadsetState, out: &mut Vec<u8>) {
    put_f32s(
        out,
        &[
            state.position.x,
            state.position.y,
            state.position.z,
            state.pitch,
            state.yaw,
        ],
    );
}

/// Append the 88-byte controller payload.
///
/// Layout: left pose, right pose (7 floats each), left buttons, right
/// buttons (one byte per button in [`ControllerButton::ALL`] order), then
/// left x/y and right x/y thumbstick axes.
pub fn encode_controllers(left: &ControllerState, right: &ControllerState, out: &mut Vec<u8>) {
    put_f32s(out, &pose_values(left));
    put_f32s(out, &pose_values(right));
    for controller in [left, right] {
        out.extend(controller.buttons.iter().map(|(_, pressed)| pressed as u8));
    }
    put_f32s(
        out,
        &[
            left.joystick_x,
            left.joystick_y,
            right.joystick_x,
            right.joystick_y,
        ],
    );
}

/// Reply to a tracking-state request: status byte, then the headset payload
/// and/or the controller payload, headset first.
pub fn encode_state_report(report: &StateReport) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + HEADSET_PAYLOAD_SIZE + CONTROLLER_PAYLOAD_SIZE);
    out.push(report.freshness().bits());
    if let Some(headset) = &report.headset {
        encode_headset(headset, &mut out);
    }
    if let Some((left, right)) = &report.controllers {
        encode_controllers(left, right, &mut out);
    }
    out
}

pub fn decode_headset(data: &[u8; HEADSET_PAYLOAD_SIZE]) -> HeadsetState {
    HeadsetState {
        position: Position::new(le_f32(data, 0), le_f32(data, 4), le_f32(data, 8)),
        pitch: le_f32(data, 12),
        yaw: le_f32(data, 16),
    }
}

pub fn decode_controllers(data: &[u8; CONTROLLER_PAYLOAD_SIZE]) -> (ControllerState, ControllerState) {
    let pose = |at: usize| ControllerState {
        position: Position::new(le_f32(data, at), le_f32(data, at + 4), le_f32(data, at + 8)),
        orientation: Orientation::new(
            le_f32(data, at + 12),
            le_f32(data, at + 16),
            le_f32(data, at + 20),
            le_f32(data, at + 24),
        ),
        ..Default::default()
    };
    let mut left = pose(0);
    let mut right = pose(28);

    let buttons_at = 56;
    for (i, button) in ControllerButton::ALL.iter().enumerate() {
        left.buttons.set(*button, data[buttons_at + i] != 0);
        right.buttons.set(*button, data[buttons_at + ControllerButton::COUNT + i] != 0);
    }

    let axes_at = buttons_at + 2 * ControllerButton::COUNT;
    left.joystick_x = le_f32(data, axes_at);
    left.joystick_y = le_f32(data, axes_at + 4);
    right.joystick_x = le_f32(data, axes_at + 8);
    right.joystick_y = le_f32(data, axes_at + 12);

    (left, right)
}

/// Layout: `u32 id, u32 process_id, u64 shared_handle, i64 format,
/// u32 width, u32 height, u32 array_size, u32 mip_count, u64 opaque0,
/// u64 opaque1`.
pub fn encode_register_image(cmd: &RegisterImageCommand) -> [u8; REGISTER_IMAGE_SIZE] {
    let mut buf = [0u8; REGISTER_IMAGE_SIZE];
    buf[0..4].copy_from_slice(&cmd.id.to_le_bytes());
    buf[4..8].copy_from_slice(&cmd.process_id.to_le_bytes());
    buf[8..16].copy_from_slice(&cmd.shared_handle.to_le_bytes());
    buf[16..24].copy_from_slice(&cmd.format.to_le_bytes());
    buf[24..28].copy_from_slice(&cmd.width.to_le_bytes());
    buf[28..32].copy_from_slice(&cmd.height.to_le_bytes());
    buf[32..36].copy_from_slice(&cmd.array_size.to_le_bytes());
    buf[36..40].copy_from_slice(&cmd.mip_count.to_le_bytes());
    buf[40..48].copy_from_slice(&cmd.opaque0.to_le_bytes());
    buf[48..56].copy_from_slice(&cmd.opaque1.to_le_bytes());
    buf
}

pub fn decode_register_image(data: &[u8; REGISTER_IMAGE_SIZE]) -> RegisterImageCommand {
    RegisterImageCommand {
        id: le_u32(data, 0),
        process_id: le_u32(data, 4),
        shared_handle: le_u64(data, 8),
        format: le_u64(data, 16) as i64,
        width: le_u32(data, 24),
        height: le_u32(data, 28),
        array_size: le_u32(data, 32),
        mip_count: le_u32(data, 36),
        opaque0: le_u64(data, 40),
        opaque1: le_u64(data, 48),
    }
}

/// Layout: six `u32`: id, x, y, width, height, array_index.
pub fn encode_present_image(cmd: &PresentImageCommand) -> [u8; PRESENT_IMAGE_SIZE] {
    let mut buf = [0u8; PRESENT_IMAGE_SIZE];
    let fields = [cmd.id, cmd.x, cmd.y, cmd.width, cmd.height, cmd.array_index];
    for (chunk, value) in buf.chunks_exact_mut(4).zip(fields) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    buf
}

pub fn decode_present_image(data: &[u8; PRESENT_IMAGE_SIZE]) -> PresentImageCommand {
    PresentImageCommand {
        id: le_u32(data, 0),
        x: le_u32(data, 4),
        y: le_u32(data, 8),
        width: le_u32(data, 12),
        height: le_u32(data, 16),
        array_index: le_u32(data, 20),
    }
}

/// Runtime-info payload (without the opcode), as the runtime sends it.
pub fn encode_runtime_info(info: &RuntimeInfo) -> Vec<u8> {
    let name = info.application_name.as_bytes();
    let mut out = Vec::with_capacity(8 + name.len());
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(&info.graphics_api.to_raw().to_le_bytes());
    out
}
