//! # aether - webcam-driven VR headset and controller emulation
//!
//! Turns face and hand landmarks from an external detector into a headset
//! pose and two emulated controllers, and serves them to an OpenXR runtime
//! over a loopback TCP connection. Provides:
//! - Quaternion/vector math for hand and head poses
//! - Gesture classification with hysteresis and thumbstick emulation
//! - Head deadzones, controller mounting offsets and jitter damping
//! - The runtime wire protocol and its single-peer transport server
//! - Frame dispatch with bounded in-flight detector requests
//! - C FFI for hosts that run their own capture and detection
//!
//! ## Quick Start
//! ```no_run
//! use aether::{Config, HandDetection, SharedConfig, Tracker};
//!
//! let config = SharedConfig::new(Config::load_or_default("config.json"));
//! let tracker = Tracker::start(config).unwrap();
//! println!("Waiting for runtime on {:?}", tracker.local_addr());
//!
//! // Results from any landmark detector:
//! tracker.submit_hand_detection(HandDetection::default());
//! ```

pub mod error;
pub mod types;
pub mod pose;
pub mod gesture;
pub mod detection;
pub mod state;
pub mod aggregator;
pub mod protocol;
pub mod events;
pub mod server;
pub mod config;
pub mod orchestrator;
pub mod ffi;
pub mod synthetic;

pub use aggregator::TrackingAggregator;
pub use config::{Config, SharedConfig};
pub use detection::{DetectedHand, Frame, HandDetection, HeadDetection, LandmarkDetector};
pub use error::AetherError;
pub use events::{EventBus, TransportEvent};
pub use gesture::GestureClassifier;
pub use orchestrator::{DispatchThrottle, Tracker};
pub use pose::{Orientation, Position};
pub use server::TransportServer;
pub use state::DeviceState;
pub use types::*;

/// Result type alias for aether operations.
pub type Result<T> = std::result::Result<T, AetherError>;
