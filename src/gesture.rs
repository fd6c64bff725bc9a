//! Per-hand gesture classification.
//!
//! All distances are measured in the image plane and divided by the
//! wrist → middle-knuckle distance, so thresholds do not depend on how far
//! the hand is from the camera.

use crate::config::ControllerConfig;
use crate::pose::Position;
use crate::types::{ControllerState, Gesture, HandState, Landmark, HAND_LANDMARK_COUNT};

// Hand landmark indices.
pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_BASE: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_BASE: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_BASE: usize = 17;
pub const PINKY_TIP: usize = 20;

/// Fingertips in thumb, index, middle, ring, pinky order.
const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Hands smaller than this in the image are ignored.
const MIN_REFERENCE_DISTANCE: f32 = 1e-4;

/// A pair of thresholds: a tighter one to enter a gesture and a looser one
/// to stay in it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    pub enter: f32,
    pub sustain: f32,
}

impl Hysteresis {
    pub fn holds(&self, ratio: f32, active: bool) -> bool {
        let threshold = if active { self.sustain } else { self.enter };
        ratio < threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureThresholds {
    /// Thumb tip ↔ index tip.
    pub pinch: Hysteresis,
    /// Thumb tip ↔ middle tip.
    pub middle_pinch: Hysteresis,
    /// Maximum wrist → fingertip ratio per finger for a fist, thumb first.
    /// The middle finger is held to a tighter bound.
    pub fist: [f32; 5],
    /// Minimum hand displacement from the thumbstick centre, in tracking
    /// units, before the stick deflects.
    pub joystick_deadzone: f32,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            pinch: Hysteresis {
                enter: 0.20,
                sustain: 0.30,
            },
            middle_pinch: Hysteresis {
                enter: 0.20,
                sustain: 0.30,
            },
            fist: [1.10, 1.10, 0.95, 1.10, 1.10],
            joystick_deadzone: 0.05,
        }
    }
}

/// Scale-normalized view of one hand's landmarks.
struct HandGeometry<'a> {
    landmarks: &'a [Landmark],
    reference: f32,
}

impl<'a> HandGeometry<'a> {
    fn new(landmarks: &'a [Landmark]) -> Option<Self> {
        if landmarks.len() < HAND_LANDMARK_COUNT {
            return None;
        }
        let reference = landmarks[WRIST].planar_distance(&landmarks[MIDDLE_BASE]);
        if !reference.is_finite() || reference < MIN_REFERENCE_DISTANCE {
            return None;
        }
        Some(Self { landmarks, reference })
    }

    fn ratio(&self, a: usize, b: usize) -> f32 {
        self.landmarks[a].planar_distance(&self.landmarks[b]) / self.reference
    }

    /// Whether the back of the hand faces the camera.
    fn is_front_facing(&self, mirrored: bool) -> bool {
        let front = self.landmarks[INDEX_BASE].x - self.landmarks[PINKY_BASE].x > 0.0;
        front != mirrored
    }
}

/// Turns hand landmarks into gestures, buttons and thumbstick input.
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    thresholds: GestureThresholds,
}

impl GestureClassifier {
    pub fn new(thresholds: GestureThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify one hand. `previous` selects the sustain thresholds for a
    /// gesture that is already held; `mirrored` is set for the right hand.
    ///
    /// First match wins: fist, then pinch, then middle pinch.
    pub fn classify(&self, landmarks: &[Landmark], previous: Gesture, mirrored: bool) -> Gesture {
        let Some(hand) = HandGeometry::new(landmarks) else {
            return Gesture::None;
        };

        if self.is_fist(&hand) {
            return Gesture::Fist;
        }

        let pinching = matches!(previous, Gesture::Pinch | Gesture::PalmPinch);
        if self.thresholds.pinch.holds(hand.ratio(THUMB_TIP, INDEX_TIP), pinching) {
            return if hand.is_front_facing(mirrored) {
                Gesture::Pinch
            } else {
                Gesture::PalmPinch
            };
        }

        let middle_pinching = previous == Gesture::MiddlePinch;
        if self
            .thresholds
            .middle_pinch
            .holds(hand.ratio(THUMB_TIP, MIDDLE_TIP), middle_pinching)
        {
            return Gesture::MiddlePinch;
        }

        Gesture::None
    }

    fn is_fist(&self, hand: &HandGeometry) -> bool {
        FINGERTIPS
            .iter()
            .zip(self.thresholds.fist.iter())
            .all(|(&tip, &max_ratio)| hand.ratio(WRIST, tip) < max_ratio)
    }

    /// Thumbstick deflection for a hand at `position` with the stick centred
    /// at `center`. Only the XZ plane counts; displacements up to the dead
    /// zone radius (inclusive) yield `(0, 0)`, larger ones the unit direction.
    pub fn joystick_axes(&self, center: Position, position: Position) -> (f32, f32) {
        let dx = position.x - center.x;
        let dz = position.z - center.z;
        let len_sq = dx * dx + dz * dz;
        let deadzone = self.thresholds.joystick_deadzone;

        if len_sq <= deadzone * deadzone {
            return (0.0, 0.0);
        }

        let len = len_sq.sqrt();
        // Pushing the hand away from the body (-Z) is stick up.
        ((dx / len).clamp(-1.0, 1.0), (-dz / len).clamp(-1.0, 1.0))
    }

    /// Run one classification cycle for a hand and write the result into its
    /// controller: buttons are rebuilt from scratch, and the thumbstick is
    /// latched, updated or released.
    pub fn update_hand(
        &self,
        config: &ControllerConfig,
        hand: &mut HandState,
        controller: &mut ControllerState,
        mirrored: bool,
    ) {
        controller.buttons.clear();

        hand.gesture = if hand.visible {
            self.classify(&hand.landmarks, hand.previous_gesture, mirrored)
        } else {
            Gesture::None
        };

        if hand.gesture == Gesture::MiddlePinch && config.joystick {
            self.update_joystick(controller, hand.position, hand.previous_gesture);
        } else {
            release_joystick(controller);
        }

        if let Some(button) = config.gesture_mappings.get(hand.gesture) {
            controller.buttons.set(button, true);
        }
    }

    fn update_joystick(&self, controller: &mut ControllerState, position: Position, previous: Gesture) {
        match controller.joystick_center {
            Some(center) if previous == Gesture::MiddlePinch => {
                let (x, y) = self.joystick_axes(center, position);
                controller.joystick_x = x;
                controller.joystick_y = y;
            }
            _ => {
                log::debug!("Thumbstick latched at {:?}", position);
                controller.joystick_center = Some(position);
                controller.joystick_x = 0.0;
                controller.joystick_y = 0.0;
            }
        }
    }
}

fn release_joystick(controller: &mut ControllerState) {
    controller.joystick_center = None;
    controller.joystick_x = 0.0;
    controller.joystick_y = 0.0;
}
