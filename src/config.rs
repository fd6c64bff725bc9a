//! Versioned tracker configuration, persisted as JSON.
//!
//! ```json
//! {
//!   "version": 1,
//!   "port": 38057,
//!   "tracking_fps_cap": 30,
//!   "head": { "pitch_deadzone": 0.0, "yaw_deadzone": 0.0 },
//!   "hands": { "mounting_offset": { "pitch": 0.0, "yaw": 0.0, "roll": 0.0 } },
//!   "left_controller": {
//!     "gesture_mappings": { "pinch": "trigger", "palm_pinch": "menu", "middle_pinch": null, "fist": "squeeze" },
//!     "joystick": true
//!   },
//!   "right_controller": { "...": "same as left_controller" }
//! }
//! ```

use crate::pose::Orientation;
use crate::types::{ControllerButton, Gesture, Handedness};
use crate::{AetherError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Newest config schema this build understands.
pub const CONFIG_VERSION: u32 = 1;

/// Loopback port the runtime connects to.
pub const DEFAULT_PORT: u16 = 38057;

pub const DEFAULT_FPS_CAP: u32 = 30;

pub const CONFIG_FILE_NAME: &str = "config.json";

const GESTURE_NAMES: [(Gesture, &str); 4] = [
    (Gesture::Pinch, "pinch"),
    (Gesture::PalmPinch, "palm_pinch"),
    (Gesture::MiddlePinch, "middle_pinch"),
    (Gesture::Fist, "fist"),
];

const BUTTON_NAMES: [(ControllerButton, &str); ControllerButton::COUNT] = [
    (ControllerButton::Trigger, "trigger"),
    (ControllerButton::Squeeze, "squeeze"),
    (ControllerButton::AButton, "a_button"),
    (ControllerButton::BButton, "b_button"),
    (ControllerButton::XButton, "x_button"),
    (ControllerButton::YButton, "y_button"),
    (ControllerButton::Menu, "menu"),
    (ControllerButton::System, "system"),
];

impl Gesture {
    /// Config name of a bindable gesture. `Gesture::None` has no name.
    pub fn name(self) -> Option<&'static str> {
        GESTURE_NAMES
            .iter()
            .find(|(g, _)| *g == self)
            .map(|(_, name)| *name)
    }

    pub fn from_name(name: &str) -> Option<Gesture> {
        GESTURE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(g, _)| *g)
    }
}

impl ControllerButton {
    pub fn name(self) -> &'static str {
        BUTTON_NAMES[self.index()].1
    }

    pub fn from_name(name: &str) -> Option<ControllerButton> {
        BUTTON_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(b, _)| *b)
    }
}

/// Per-hand gesture → button table. Gestures without an entry are unbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Option<String>>",
    into = "BTreeMap<String, Option<String>>"
)]
pub struct GestureBindings(BTreeMap<Gesture, ControllerButton>);

impl GestureBindings {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, gesture: Gesture) -> Option<ControllerButton> {
        self.0.get(&gesture).copied()
    }

    /// Bind `gesture` to `button`, or unbind it with `None`.
    pub fn set(&mut self, gesture: Gesture, button: Option<ControllerButton>) {
        match button {
            Some(button) if gesture != Gesture::None => {
                self.0.insert(gesture, button);
            }
            _ => {
                self.0.remove(&gesture);
            }
        }
    }
}

impl Default for GestureBindings {
    fn default() -> Self {
        let mut bindings = Self::empty();
        bindings.set(Gesture::Pinch, Some(ControllerButton::Trigger));
        bindings.set(Gesture::PalmPinch, Some(ControllerButton::Menu));
        bindings.set(Gesture::Fist, Some(ControllerButton::Squeeze));
        bindings
    }
}

impl TryFrom<BTreeMap<String, Option<String>>> for GestureBindings {
    type Error = AetherError;

    fn try_from(raw: BTreeMap<String, Option<String>>) -> Result<Self> {
        let mut bindings = GestureBindings::empty();
        for (gesture_name, button_name) in raw {
            let gesture = Gesture::from_name(&gesture_name)
                .ok_or_else(|| AetherError::InvalidConfig(format!("unknown gesture '{}'", gesture_name)))?;
            let button = match button_name {
                Some(name) => Some(
                    ControllerButton::from_name(&name)
                        .ok_or_else(|| AetherError::InvalidConfig(format!("unknown button '{}'", name)))?,
                ),
                None => None,
            };
            bindings.set(gesture, button);
        }
        Ok(bindings)
    }
}

impl From<GestureBindings> for BTreeMap<String, Option<String>> {
    fn from(bindings: GestureBindings) -> Self {
        GESTURE_NAMES
            .iter()
            .map(|(gesture, name)| {
                (
                    name.to_string(),
                    bindings.get(*gesture).map(|b| b.name().to_string()),
                )
            })
            .collect()
    }
}

/// Head angle deadzones, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadConfig {
    pub pitch_deadzone: f32,
    pub yaw_deadzone: f32,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            pitch_deadzone: 0.0,
            yaw_deadzone: 0.0,
        }
    }
}

/// Fixed rotation between the tracked hand frame and the emulated
/// controller, in degrees. Specified for the left hand and mirrored for the
/// right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MountingOffset {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl MountingOffset {
    /// Offset quaternion for one hand. Mirroring across the sagittal plane
    /// keeps pitch and negates yaw and roll.
    pub fn orientation(&self, hand: Handedness) -> Orientation {
        let (yaw, roll) = match hand {
            Handedness::Left => (self.yaw, self.roll),
            Handedness::Right => (-self.yaw, -self.roll),
        };
        Orientation::from_euler(self.pitch.to_radians(), yaw.to_radians(), roll.to_radians())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandsConfig {
    pub mounting_offset: MountingOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub gesture_mappings: GestureBindings,
    /// Whether the middle pinch drives the thumbstick.
    pub joystick: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gesture_mappings: GestureBindings::default(),
            joystick: true,
        }
    }
}

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    pub port: u16,
    /// Maximum detector dispatch rate, per detector.
    pub tracking_fps_cap: u32,
    pub head: HeadConfig,
    pub hands: HandsConfig,
    pub left_controller: ControllerConfig,
    pub right_controller: ControllerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            port: DEFAULT_PORT,
            tracking_fps_cap: DEFAULT_FPS_CAP,
            head: HeadConfig::default(),
            hands: HandsConfig::default(),
            left_controller: ControllerConfig::default(),
            right_controller: ControllerConfig::default(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load `path`, falling back to defaults on any failure.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                log::info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load config from {}: {} (using defaults)", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.version > CONFIG_VERSION {
            return Err(AetherError::UnsupportedConfigVersion {
                found: self.version,
                supported: CONFIG_VERSION,
            });
        }
        if self.tracking_fps_cap == 0 {
            return Err(AetherError::InvalidConfig("tracking_fps_cap must be positive".into()));
        }
        for (name, value) in [
            ("head.pitch_deadzone", self.head.pitch_deadzone),
            ("head.yaw_deadzone", self.head.yaw_deadzone),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AetherError::InvalidConfig(format!(
                    "{} must be a non-negative number of degrees",
                    name
                )));
            }
        }
        let offset = self.hands.mounting_offset;
        if ![offset.pitch, offset.yaw, offset.roll].iter().all(|v| v.is_finite()) {
            return Err(AetherError::InvalidConfig("hands.mounting_offset must be finite".into()));
        }
        Ok(())
    }

    pub fn controller(&self, hand: Handedness) -> &ControllerConfig {
        match hand {
            Handedness::Left => &self.left_controller,
            Handedness::Right => &self.right_controller,
        }
    }
}

/// Configuration shared between the UI thread (writer) and detector
/// callbacks (readers). Readers take one immutable snapshot per cycle.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Validate and publish a whole configuration. Cycles already running
    /// keep their snapshot; an invalid config leaves the current one in place.
    pub fn replace(&self, config: Config) -> Result<()> {
        config.validate()?;
        let config = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
        Ok(())
    }

    /// Copy, modify, validate and publish the configuration.
    pub fn update<F: FnOnce(&mut Config)>(&self, f: F) -> Result<()> {
        let mut config = (*self.snapshot()).clone();
        f(&mut config);
        self.replace(config)
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = GestureBindings::default();
        assert_eq!(bindings.get(Gesture::Pinch), Some(ControllerButton::Trigger));
        assert_eq!(bindings.get(Gesture::PalmPinch), Some(ControllerButton::Menu));
        assert_eq!(bindings.get(Gesture::Fist), Some(ControllerButton::Squeeze));
        assert_eq!(bindings.get(Gesture::MiddlePinch), None);
        assert_eq!(bindings.get(Gesture::None), None);
    }

    #[test]
    fn test_name_tables_are_bidirectional() {
        for (gesture, name) in GESTURE_NAMES {
            assert_eq!(Gesture::from_name(name), Some(gesture));
            assert_eq!(gesture.name(), Some(name));
        }
        for button in ControllerButton::ALL {
            assert_eq!(ControllerButton::from_name(button.name()), Some(button));
        }
        assert_eq!(Gesture::None.name(), None);
    }

    #[test]
    fn test_json_round_trip_keeps_values() {
        let mut config = Config::default();
        config.head.yaw_deadzone = 7.5;
        config.right_controller.gesture_mappings.set(Gesture::Fist, None);
        config
            .left_controller
            .gesture_mappings
            .set(Gesture::MiddlePinch, Some(ControllerButton::AButton));

        let json = serde_json::to_string(&config).unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = Config::from_json(r#"{ "tracking_fps_cap": 15, "head": { "pitch_deadzone": 4.0 } }"#).unwrap();
        assert_eq!(config.tracking_fps_cap, 15);
        assert_eq!(config.head.pitch_deadzone, 4.0);
        assert_eq!(config.head.yaw_deadzone, 0.0);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.left_controller, ControllerConfig::default());
    }

    #[test]
    fn test_unknown_button_rejected() {
        let json = r#"{ "left_controller": { "gesture_mappings": { "pinch": "turbo" } } }"#;
        assert!(matches!(Config::from_json(json), Err(AetherError::Json(_))));
    }

    #[test]
    fn test_unknown_gesture_rejected() {
        let json = r#"{ "left_controller": { "gesture_mappings": { "wave": "menu" } } }"#;
        assert!(Config::from_json(json).is_err());
    }

    #[test]
    fn test_newer_version_rejected() {
        let json = format!(r#"{{ "version": {} }}"#, CONFIG_VERSION + 1);
        assert!(matches!(
            Config::from_json(&json),
            Err(AetherError::UnsupportedConfigVersion { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("aether-config-does-not-exist.json");
        assert_eq!(Config::load_or_default(&path), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("aether-config-{}.json", std::process::id()));
        let mut config = Config::default();
        config.tracking_fps_cap = 60;
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_mounting_offset_mirrors_for_right_hand() {
        let offset = MountingOffset {
            pitch: 10.0,
            yaw: 20.0,
            roll: 30.0,
        };
        let left = offset.orientation(Handedness::Left);
        let right = offset.orientation(Handedness::Right);
        let expected = Orientation::from_euler(10f32.to_radians(), -20f32.to_radians(), -30f32.to_radians());
        assert!(right.angle_to(expected) < 1e-5);
        assert!(left.angle_to(right) > 0.1);
    }

    #[test]
    fn test_shared_config_snapshot_is_stable() {
        let shared = SharedConfig::default();
        let before = shared.snapshot();
        shared.update(|c| c.tracking_fps_cap = 10).unwrap();
        assert_eq!(before.tracking_fps_cap, DEFAULT_FPS_CAP);
        assert_eq!(shared.snapshot().tracking_fps_cap, 10);
    }

    #[test]
    fn test_shared_config_rejects_invalid_update() {
        let shared = SharedConfig::default();
        assert!(shared.update(|c| c.tracking_fps_cap = 0).is_err());
        assert!(shared.update(|c| c.head.yaw_deadzone = f32::NAN).is_err());
        assert!(shared.update(|c| c.head.pitch_deadzone = -1.0).is_err());
        assert_eq!(*shared.snapshot(), Config::default());
    }
}
