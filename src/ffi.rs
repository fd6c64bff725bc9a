//! C FFI layer for aether.
//!
//! Opaque handle-based API for hosts that run capture and landmark detection
//! themselves and hand the results to the tracker. The generated C header is
//! written to `include/aether.h` by cbindgen.

use crate::config::{Config, SharedConfig};
use crate::detection::{DetectedHand, HandDetection};
use crate::error::LastError;
use crate::events::TransportEvent;
use crate::orchestrator::Tracker;
use crate::types::{Handedness, HeadState, Landmark};
use crate::AetherError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::ffi::{c_char, c_int, CStr};
use std::time::Duration;

static LAST_ERROR: LastError = LastError::new();

/// Transport events buffered per tracker handle before new ones are dropped.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Opaque tracker handle for C consumers.
pub struct AeTracker {
    tracker: Tracker,
    events: Receiver<TransportEvent>,
}

/// One hand landmark in normalized image coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AeLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeEventKind {
    Connected = 1,
    Disconnected = 2,
    RuntimeInfo = 3,
    RegisterImage = 4,
    PresentImage = 5,
}

/// Transport event in C-compatible layout. Only the fields named for the
/// event's kind are meaningful; the rest are zero.
#[repr(C)]
pub struct AeEvent {
    pub kind: AeEventKind,
    /// RuntimeInfo: null-terminated application name, truncated.
    pub application_name: [c_char; 256],
    /// RuntimeInfo: 0 Vulkan, 1 Direct3D 11, 2 Metal.
    pub graphics_api: u32,
    /// RegisterImage / PresentImage.
    pub image_id: u32,
    /// RegisterImage.
    pub process_id: u32,
    pub shared_handle: u64,
    pub format: i64,
    pub array_size: u32,
    pub mip_count: u32,
    pub opaque0: u64,
    pub opaque1: u64,
    /// PresentImage.
    pub x: u32,
    pub y: u32,
    pub array_index: u32,
    /// RegisterImage / PresentImage.
    pub width: u32,
    pub height: u32,
}

impl AeEvent {
    fn new(kind: AeEventKind) -> Self {
        Self {
            kind,
            application_name: [0; 256],
            graphics_api: 0,
            image_id: 0,
            process_id: 0,
            shared_handle: 0,
            format: 0,
            array_size: 0,
            mip_count: 0,
            opaque0: 0,
            opaque1: 0,
            x: 0,
            y: 0,
            array_index: 0,
            width: 0,
            height: 0,
        }
    }
}

impl From<TransportEvent> for AeEvent {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Connected { .. } => AeEvent::new(AeEventKind::Connected),
            TransportEvent::Disconnected => AeEvent::new(AeEventKind::Disconnected),
            TransportEvent::RuntimeInfo(info) => AeEvent {
                application_name: {
                    let mut name = [0 as c_char; 256];
                    copy_c_string(&mut name, &info.application_name);
                    name
                },
                graphics_api: info.graphics_api.to_raw(),
                ..AeEvent::new(AeEventKind::RuntimeInfo)
            },
            TransportEvent::RegisterImage(cmd) => AeEvent {
                image_id: cmd.id,
                process_id: cmd.process_id,
                shared_handle: cmd.shared_handle,
                format: cmd.format,
                width: cmd.width,
                height: cmd.height,
                array_size: cmd.array_size,
                mip_count: cmd.mip_count,
                opaque0: cmd.opaque0,
                opaque1: cmd.opaque1,
                ..AeEvent::new(AeEventKind::RegisterImage)
            },
            TransportEvent::PresentImage(cmd) => AeEvent {
                image_id: cmd.id,
                x: cmd.x,
                y: cmd.y,
                width: cmd.width,
                height: cmd.height,
                array_index: cmd.array_index,
                ..AeEvent::new(AeEventKind::PresentImage)
            },
        }
    }
}

/// Copy `s` into `dst` as a null-terminated string, cutting it at the last
/// whole character that fits.
fn copy_c_string(dst: &mut [c_char], s: &str) {
    let Some(room) = dst.len().checked_sub(1) else {
        return;
    };
    let mut len = s.len().min(room);
    while !s.is_char_boundary(len) {
        len -= 1;
    }
    for (d, &b) in dst.iter_mut().zip(&s.as_bytes()[..len]) {
        *d = b as c_char;
    }
    dst[len] = 0;
}

fn status<T>(outcome: Option<T>) -> c_int {
    if outcome.is_some() {
        0
    } else {
        -1
    }
}

/// # Safety
/// `landmarks` must point to `count` elements, or be null.
unsafe fn landmark_slice<'a>(landmarks: *const AeLandmark, count: usize) -> &'a [AeLandmark] {
    if landmarks.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(landmarks, count)
    }
}

/// Create a tracker and start listening for the runtime.
///
/// `config_path` names a JSON config file; NULL or an unreadable file gives
/// the defaults. Returns NULL on error (check ae_last_error()).
///
/// # Safety
/// `config_path` must be a valid null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn ae_tracker_create(config_path: *const c_char) -> *mut AeTracker {
    let config = if config_path.is_null() {
        Ok(Config::default())
    } else {
        CStr::from_ptr(config_path)
            .to_str()
            .map(|path| Config::load_or_default(path))
            .map_err(|_| AetherError::InvalidConfig("config path is not UTF-8".into()))
    };
    let started = config.and_then(|config| Tracker::start(SharedConfig::new(config)));

    match LAST_ERROR.record(started) {
        Some(tracker) => {
            let events = tracker.events().channel(EVENT_QUEUE_CAPACITY);
            Box::into_raw(Box::new(AeTracker { tracker, events }))
        }
        None => std::ptr::null_mut(),
    }
}

/// Submit a head result: pitch and yaw in degrees.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ae_tracker_submit_head(
    tracker: *const AeTracker,
    visible: bool,
    pitch: f32,
    yaw: f32,
) -> c_int {
    if tracker.is_null() {
        return -1;
    }
    let tracker = &*tracker;
    let head = HeadState {
        visible,
        pitch,
        yaw,
        ..Default::default()
    };
    let applied = tracker
        .tracker
        .submit_head_state(head)
        .ok_or(AetherError::ShuttingDown);
    status(LAST_ERROR.record(applied))
}

/// Submit one hand-landmarker result. Each hand is given under the label the
/// detector reported for it; pass NULL or a zero count for a hand that was
/// not found. Returns 0 on success, -1 on error.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null. `detected_left` and
/// `detected_right` must point to `left_count` / `right_count` landmarks, or
/// be null.
#[no_mangle]
pub unsafe extern "C" fn ae_tracker_submit_hands(
    tracker: *const AeTracker,
    detected_left: *const AeLandmark,
    left_count: usize,
    detected_right: *const AeLandmark,
    right_count: usize,
) -> c_int {
    if tracker.is_null() {
        return -1;
    }
    let tracker = &*tracker;

    let mut detection = HandDetection::default();
    for (handedness, landmarks) in [
        (Handedness::Left, landmark_slice(detected_left, left_count)),
        (Handedness::Right, landmark_slice(detected_right, right_count)),
    ] {
        if landmarks.is_empty() {
            continue;
        }
        detection.hands.push(DetectedHand {
            handedness,
            landmarks: landmarks.iter().map(|l| Landmark::new(l.x, l.y, l.z)).collect(),
        });
    }

    let applied = tracker
        .tracker
        .submit_hand_detection(detection)
        .ok_or_else(|| AetherError::Detector("hand result rejected".into()));
    status(LAST_ERROR.record(applied))
}

/// Receive the next transport event.
/// `timeout_ms`: timeout in milliseconds (0 = try without blocking, -1 = block forever).
/// Returns 0 on success, -1 on error/timeout.
///
/// # Safety
/// `tracker` and `event` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn ae_tracker_poll_event(
    tracker: *const AeTracker,
    event: *mut AeEvent,
    timeout_ms: c_int,
) -> c_int {
    if tracker.is_null() || event.is_null() {
        return -1;
    }
    let tracker = &*tracker;

    let result = if timeout_ms == 0 {
        tracker.events.try_recv().map_err(|_| AetherError::Timeout)
    } else if timeout_ms < 0 {
        tracker.events.recv().map_err(|_| AetherError::ChannelDisconnected)
    } else {
        tracker
            .events
            .recv_timeout(Duration::from_millis(timeout_ms as u64))
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => AetherError::Timeout,
                RecvTimeoutError::Disconnected => AetherError::ChannelDisconnected,
            })
    };

    match LAST_ERROR.record(result) {
        Some(received) => {
            event.write(AeEvent::from(received));
            0
        }
        None => -1,
    }
}

/// Whether a runtime is connected.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ae_tracker_is_connected(tracker: *const AeTracker) -> bool {
    if tracker.is_null() {
        return false;
    }
    (*tracker).tracker.is_connected()
}

/// Port the tracker listens on, 0 if it has stopped.
///
/// # Safety
/// `tracker` must be a valid tracker pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn ae_tracker_port(tracker: *const AeTracker) -> u16 {
    if tracker.is_null() {
        return 0;
    }
    (*tracker).tracker.local_addr().map_or(0, |addr| addr.port())
}

/// Shut the tracker down and free its resources.
///
/// # Safety
/// `tracker` must be a pointer returned by `ae_tracker_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn ae_tracker_destroy(tracker: *mut AeTracker) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Message for the most recent failed call, or NULL if the most recent call
/// succeeded. The pointer is valid until the next aether API call.
#[no_mangle]
pub extern "C" fn ae_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
