use crate::config::{Config, SharedConfig};
use crate::gesture::GestureClassifier;
use crate::pose::Orientation;
use crate::state::DeviceState;
use crate::types::{ControllerState, HandState, Handedness, HeadState, HeadsetState};
use std::sync::{Arc, Mutex, MutexGuard};

/// Geodesic angle (radians) above which a new hand orientation is treated as
/// a detector spike and only half applied.
pub const JITTER_THRESHOLD: f32 = 0.35;

const JITTER_BLEND: f32 = 0.5;

/// Shrink an angle towards zero by `deadzone`, clamping at zero.
pub fn apply_deadzone(angle: f32, deadzone: f32) -> f32 {
    angle.signum() * (angle.abs() - deadzone).max(0.0)
}

/// Per-hand history kept between hand callbacks.
#[derive(Debug, Default)]
struct HandTrack {
    hand: HandState,
    controller: ControllerState,
    /// Last applied orientation; `None` while the hand is lost.
    last_orientation: Option<Orientation>,
}

impl HandTrack {
    fn update(
        &mut self,
        mut hand: HandState,
        side: Handedness,
        config: &Config,
        classifier: &GestureClassifier,
    ) -> ControllerState {
        hand.previous_gesture = self.hand.gesture;

        if hand.visible {
            let offset = config.hands.mounting_offset.orientation(side);
            let raw = (hand.orientation * offset).normalized();
            let orientation = match self.last_orientation {
                Some(prev) if prev.angle_to(raw) > JITTER_THRESHOLD => {
                    log::trace!("{:?} hand orientation jump damped", side);
                    prev.slerp(raw, JITTER_BLEND)
                }
                _ => raw,
            };
            self.last_orientation = Some(orientation);
            hand.orientation = orientation;

            self.controller.position = hand.position;
            self.controller.orientation = orientation;
        } else {
            // Lost hands hold their last pose.
            self.last_orientation = None;
            hand.position = self.hand.position;
            hand.orientation = self.hand.orientation;
        }
        self.controller.timestamp = hand.timestamp;

        classifier.update_hand(
            config.controller(side),
            &mut hand,
            &mut self.controller,
            side == Handedness::Right,
        );
        self.hand = hand;
        self.controller
    }
}

#[derive(Debug, Default)]
struct HandsPipeline {
    left: HandTrack,
    right: HandTrack,
}

/// Merges head and hand detection results into the device state.
///
/// Head and hand results arrive on detector threads with no ordering between
/// them; each pipeline has its own lock so neither waits on the other.
#[derive(Debug)]
pub struct TrackingAggregator {
    config: SharedConfig,
    classifier: GestureClassifier,
    device: Arc<DeviceState>,
    head: Mutex<HeadState>,
    hands: Mutex<HandsPipeline>,
}

impl TrackingAggregator {
    pub fn new(config: SharedConfig, device: Arc<DeviceState>) -> Self {
        Self::with_classifier(config, device, GestureClassifier::default())
    }

    pub fn with_classifier(
        config: SharedConfig,
        device: Arc<DeviceState>,
        classifier: GestureClassifier,
    ) -> Self {
        Self {
            config,
            classifier,
            device,
            head: Mutex::new(HeadState::default()),
            hands: Mutex::new(HandsPipeline::default()),
        }
    }

    pub fn device(&self) -> &Arc<DeviceState> {
        &self.device
    }

    /// Apply a head result and publish the resulting headset pose.
    pub fn on_head(&self, head: HeadState) -> HeadsetState {
        let config = self.config.snapshot();

        let mut current = lock(&self.head);
        *current = head;
        let headset = if current.visible {
            HeadsetState {
                position: current.position,
                pitch: apply_deadzone(current.pitch, config.head.pitch_deadzone),
                yaw: apply_deadzone(current.yaw, config.head.yaw_deadzone),
            }
        } else {
            HeadsetState {
                position: current.position,
                pitch: 0.0,
                yaw: 0.0,
            }
        };
        // Published under the head lock, like the hands.
        self.device.update_headset_state(headset);
        headset
    }

    /// Apply a pair of hand results and publish both controllers.
    pub fn on_hands(&self, left: HandState, right: HandState) -> (ControllerState, ControllerState) {
        let config = self.config.snapshot();

        let mut hands = lock(&self.hands);
        let left = hands.left.update(left, Handedness::Left, &config, &self.classifier);
        let right = hands.right.update(right, Handedness::Right, &config, &self.classifier);
        // Published under the hands lock so concurrent callbacks land in order.
        self.device.update_controller_state(left, right);
        (left, right)
    }

    /// Latest processed state of one hand.
    pub fn hand(&self, side: Handedness) -> HandState {
        let hands = lock(&self.hands);
        match side {
            Handedness::Left => hands.left.hand.clone(),
            Handedness::Right => hands.right.hand.clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Position;
    use crate::synthetic::{open_hand, pinching_hand};
    use crate::types::{ControllerButton, Gesture};
    use approx::assert_relative_eq;

    fn aggregator(config: Config) -> TrackingAggregator {
        TrackingAggregator::new(SharedConfig::new(config), Arc::new(DeviceState::new()))
    }

    fn visible_hand(orientation: Orientation, landmarks: Vec<crate::types::Landmark>) -> HandState {
        HandState {
            visible: true,
            position: Position::new(0.3, -0.2, -0.4),
            orientation,
            landmarks,
            ..Default::default()
        }
    }

    #[test]
    fn test_deadzone() {
        assert_eq!(apply_deadzone(10.0, 3.0), 7.0);
        assert_eq!(apply_deadzone(-10.0, 3.0), -7.0);
        assert_eq!(apply_deadzone(2.0, 3.0), 0.0);
        assert_eq!(apply_deadzone(-2.0, 3.0), 0.0);
        assert_eq!(apply_deadzone(5.0, 0.0), 5.0);
    }

    #[test]
    fn test_head_deadzones_applied() {
        let mut config = Config::default();
        config.head.pitch_deadzone = 5.0;
        config.head.yaw_deadzone = 10.0;
        let agg = aggregator(config);

        let headset = agg.on_head(HeadState {
            visible: true,
            pitch: 20.0,
            yaw: -8.0,
            ..Default::default()
        });
        assert_eq!(headset.pitch, 15.0);
        assert_eq!(headset.yaw, 0.0);
        assert_eq!(agg.device().poll().headset, Some(headset));
    }

    #[test]
    fn test_invisible_head_zeroes_angles() {
        let agg = aggregator(Config::default());
        let headset = agg.on_head(HeadState {
            visible: false,
            pitch: 20.0,
            yaw: 30.0,
            ..Default::default()
        });
        assert_eq!(headset.pitch, 0.0);
        assert_eq!(headset.yaw, 0.0);
    }

    #[test]
    fn test_concurrent_head_results_publish_last_applied() {
        let mut config = Config::default();
        config.head.pitch_deadzone = 0.0;
        config.head.yaw_deadzone = 0.0;
        let agg = Arc::new(aggregator(config));
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        agg.on_head(HeadState {
                            visible: true,
                            pitch: (t * 1000 + i) as f32,
                            ..Default::default()
                        });
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let published = agg.device().poll().headset.unwrap();
        let applied = lock(&agg.head).pitch;
        assert_eq!(published.pitch, applied);
    }

    #[test]
    fn test_small_rotation_applied_directly() {
        let agg = aggregator(Config::default());
        agg.on_hands(HandState::default(), visible_hand(Orientation::IDENTITY, open_hand()));

        let turned = Orientation::from_euler(0.0, 0.2, 0.0);
        let (_, right) = agg.on_hands(HandState::default(), visible_hand(turned, open_hand()));
        assert_relative_eq!(right.orientation.angle_to(turned), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_large_rotation_damped() {
        let agg = aggregator(Config::default());
        agg.on_hands(HandState::default(), visible_hand(Orientation::IDENTITY, open_hand()));

        let turned = Orientation::from_euler(0.0, 1.0, 0.0);
        let (_, right) = agg.on_hands(HandState::default(), visible_hand(turned, open_hand()));
        assert_relative_eq!(right.orientation.angle_to(Orientation::IDENTITY), 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_lost_hand_keeps_pose_and_resets_history() {
        let agg = aggregator(Config::default());
        let (_, first) =
            agg.on_hands(HandState::default(), visible_hand(Orientation::IDENTITY, open_hand()));

        let (_, lost) = agg.on_hands(HandState::default(), HandState::default());
        assert_eq!(lost.position, first.position);
        assert_eq!(lost.orientation, first.orientation);
        assert!(!lost.buttons.any());

        // no history after a loss: a large jump is applied as is
        let turned = Orientation::from_euler(0.0, 1.0, 0.0);
        let (_, back) = agg.on_hands(HandState::default(), visible_hand(turned, open_hand()));
        assert_relative_eq!(back.orientation.angle_to(turned), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_mounting_offset_applied() {
        let mut config = Config::default();
        config.hands.mounting_offset.pitch = 30.0;
        let agg = aggregator(config);

        let (_, right) =
            agg.on_hands(HandState::default(), visible_hand(Orientation::IDENTITY, open_hand()));
        assert_relative_eq!(right.orientation.angle_to(Orientation::IDENTITY), 30f32.to_radians(), epsilon = 1e-3);
    }

    #[test]
    fn test_previous_gesture_carried() {
        let agg = aggregator(Config::default());
        agg.on_hands(HandState::default(), visible_hand(Orientation::IDENTITY, pinching_hand(0.02)));
        assert_eq!(agg.hand(Handedness::Right).gesture, Gesture::Pinch);

        // 0.075 / 0.3 = 0.25: between enter and sustain, still held
        let (_, right) = agg.on_hands(
            HandState::default(),
            visible_hand(Orientation::IDENTITY, pinching_hand(0.075)),
        );
        let hand = agg.hand(Handedness::Right);
        assert_eq!(hand.previous_gesture, Gesture::Pinch);
        assert_eq!(hand.gesture, Gesture::Pinch);
        assert!(right.buttons.get(ControllerButton::Trigger));
    }
}
