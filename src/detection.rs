//! Contracts for the external landmark detectors and the conversion of their
//! raw results into head and hand states.

use crate::gesture::{INDEX_BASE, MIDDLE_BASE, PINKY_BASE, WRIST};
use crate::pose::{Orientation, Position};
use crate::types::{HandState, Handedness, HeadState, Landmark, HAND_LANDMARK_COUNT};
use crate::{AetherError, Result};
use std::sync::Arc;

/// Camera-image point where a hand is considered centred, per hand.
pub const LEFT_HAND_TRACKING_ORIGIN: (f32, f32) = (0.2, 0.6);
pub const RIGHT_HAND_TRACKING_ORIGIN: (f32, f32) = (0.8, 0.6);

/// Tracking-space XY a centred hand maps to, per hand.
pub const LEFT_HAND_WORLD_ORIGIN: (f32, f32) = (-0.3, -0.2);
pub const RIGHT_HAND_WORLD_ORIGIN: (f32, f32) = (0.3, -0.2);

/// Image → tracking space scale for hand XY movement.
const HAND_PLANAR_SCALE: f32 = 2.0;

/// Depth model: `z = HAND_DEPTH_BASE - HAND_DEPTH_SCALE * sqrt(hand size)`.
const HAND_DEPTH_BASE: f32 = 1.3;
const HAND_DEPTH_SCALE: f32 = 5.0;

/// An RGB8 camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }
}

/// Completion handed to a detector with every request. Called exactly once,
/// from whatever thread the detector delivers results on.
pub type DetectionCallback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// An asynchronous landmark detector (face or hand landmarker).
///
/// `detect_async` must not block on inference. Several requests may be in
/// flight at once; `timestamp` increases monotonically per detector.
pub trait LandmarkDetector: Send + Sync {
    type Output: Send + 'static;

    fn detect_async(&self, frame: Frame, timestamp: u64, on_result: DetectionCallback<Self::Output>);
}

/// Raw face landmarker output for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadDetection {
    /// Row-major facial transformation matrix, absent when no face was found.
    pub transform: Option<[[f32; 4]; 4]>,
    pub landmarks: Vec<Landmark>,
}

impl HeadDetection {
    /// Head state for this detection. Pitch and yaw come from the rotation
    /// part of the transform; position tracking is disabled and stays at the
    /// origin.
    pub fn to_head_state(&self) -> Result<HeadState> {
        let mut state = HeadState {
            landmarks: self.landmarks.clone(),
            ..Default::default()
        };

        let Some(matrix) = self.transform else {
            return Ok(state);
        };

        let row_axis = |row: usize| {
            Position::new(matrix[row][0], matrix[row][1], matrix[row][2])
                .try_normalize()
                .ok_or(AetherError::DegenerateGeometry("face transform has a zero axis"))
        };
        let x_axis = row_axis(0)?;
        let z_axis = row_axis(2)?;

        state.visible = true;
        state.position = Position::ORIGIN;
        state.pitch = -z_axis.y.clamp(-1.0, 1.0).asin().to_degrees();
        state.yaw = -x_axis.z.atan2(x_axis.x).to_degrees();
        Ok(state)
    }
}

/// One hand found by the hand landmarker.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHand {
    /// Label as reported by the detector (unmirrored image).
    pub handedness: Handedness,
    pub landmarks: Vec<Landmark>,
}

/// Raw hand landmarker output for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandDetection {
    pub hands: Vec<DetectedHand>,
}

impl HandDetection {
    /// Left and right hand states for this detection. Hands that were not
    /// found are returned invisible.
    pub fn to_hand_states(&self, timestamp: u64) -> Result<(HandState, HandState)> {
        let mut left = HandState {
            timestamp,
            ..Default::default()
        };
        let mut right = left.clone();

        for detected in &self.hands {
            let hand = detected.handedness.mirrored();
            let state = match hand {
                Handedness::Left => &mut left,
                Handedness::Right => &mut right,
            };
            *state = hand_state(hand, &detected.landmarks, timestamp)?;
        }

        Ok((left, right))
    }
}

fn hand_state(hand: Handedness, landmarks: &[Landmark], timestamp: u64) -> Result<HandState> {
    if landmarks.len() < HAND_LANDMARK_COUNT {
        return Err(AetherError::Detector(format!(
            "hand with {} landmarks (expected {})",
            landmarks.len(),
            HAND_LANDMARK_COUNT
        )));
    }

    let (tracking_origin, world_origin) = match hand {
        Handedness::Left => (LEFT_HAND_TRACKING_ORIGIN, LEFT_HAND_WORLD_ORIGIN),
        Handedness::Right => (RIGHT_HAND_TRACKING_ORIGIN, RIGHT_HAND_WORLD_ORIGIN),
    };

    let wrist = landmarks[WRIST];
    let index_base = landmarks[INDEX_BASE];
    let pinky_base = landmarks[PINKY_BASE];

    let hand_size = wrist.planar_distance(&landmarks[MIDDLE_BASE]);
    let raw_x = (wrist.x + index_base.x + pinky_base.x) / 3.0;
    let raw_y = (wrist.y + index_base.y + pinky_base.y) / 3.0;

    let position = Position::new(
        world_origin.0 + HAND_PLANAR_SCALE * (raw_x - tracking_origin.0),
        world_origin.1 - HAND_PLANAR_SCALE * (raw_y - tracking_origin.1),
        HAND_DEPTH_BASE - HAND_DEPTH_SCALE * hand_size.sqrt(),
    );

    let orientation = Orientation::from_triangle(
        to_tracking_space(wrist),
        to_tracking_space(index_base),
        to_tracking_space(pinky_base),
        hand == Handedness::Left,
    )
    .ok_or(AetherError::DegenerateGeometry("collinear hand landmarks"))?;

    Ok(HandState {
        visible: true,
        position,
        orientation,
        timestamp,
        landmarks: landmarks.to_vec(),
        ..Default::default()
    })
}

/// Image space (y down, z into the screen) to tracking space.
fn to_tracking_space(landmark: Landmark) -> Position {
    Position::new(landmark.x, -landmark.y, -landmark.z)
}
