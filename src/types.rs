use crate::pose::{Orientation, Position};

/// Number of landmarks the hand detector reports per hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// A single tracked point in normalized camera coordinates.
///
/// `x`/`y` are in `[0, 1]` across the image; `z` is the detector's relative
/// depth and may be zero when only 2D points are available.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance in the image plane.
    pub fn planar_distance(&self, other: &Landmark) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Which physical hand a landmark set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// The opposite hand. The detector labels hands as seen in the unmirrored
    /// camera image, so its labels are swapped before use.
    pub fn mirrored(self) -> Handedness {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }
}

/// Discrete hand gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Gesture {
    #[default]
    None,
    /// Thumb and index tips together, back of the hand toward the camera.
    Pinch,
    /// Thumb and index tips together, palm toward the camera.
    PalmPinch,
    /// Thumb and middle tips together. Drives the thumbstick when enabled.
    MiddlePinch,
    Fist,
}

/// Controller buttons, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControllerButton {
    Trigger = 0,
    Squeeze = 1,
    AButton = 2,
    BButton = 3,
    XButton = 4,
    YButton = 5,
    Menu = 6,
    System = 7,
}

impl ControllerButton {
    pub const COUNT: usize = 8;

    /// All buttons in the order they are serialized.
    pub const ALL: [ControllerButton; Self::COUNT] = [
        ControllerButton::Trigger,
        ControllerButton::Squeeze,
        ControllerButton::AButton,
        ControllerButton::BButton,
        ControllerButton::XButton,
        ControllerButton::YButton,
        ControllerButton::Menu,
        ControllerButton::System,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pressed state of every controller button. All buttons are always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonStates([bool; ControllerButton::COUNT]);

impl ButtonStates {
    pub fn get(&self, button: ControllerButton) -> bool {
        self.0[button.index()]
    }

    pub fn set(&mut self, button: ControllerButton, pressed: bool) {
        self.0[button.index()] = pressed;
    }

    pub fn clear(&mut self) {
        self.0 = [false; ControllerButton::COUNT];
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&b| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControllerButton, bool)> + '_ {
        ControllerButton::ALL.iter().map(move |&b| (b, self.get(b)))
    }
}

/// Result of one face detection, replaced wholesale on every callback.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeadState {
    pub visible: bool,
    pub position: Position,
    /// Degrees, positive looking up.
    pub pitch: f32,
    /// Degrees, positive turning left.
    pub yaw: f32,
    pub landmarks: Vec<Landmark>,
}

/// Result of one hand detection for a single hand.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandState {
    pub visible: bool,
    pub position: Position,
    pub orientation: Orientation,
    /// Host time of the detection in nanoseconds.
    pub timestamp: u64,
    pub landmarks: Vec<Landmark>,
    pub gesture: Gesture,
    /// Gesture of the prior snapshot of this hand, used for hysteresis.
    pub previous_gesture: Gesture,
}

/// Emitted headset pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeadsetState {
    pub position: Position,
    /// Degrees.
    pub pitch: f32,
    /// Degrees.
    pub yaw: f32,
}

/// Emitted controller pose and input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub position: Position,
    pub orientation: Orientation,
    pub buttons: ButtonStates,
    /// Hand position latched when the thumbstick gesture started.
    pub joystick_center: Option<Position>,
    /// In `[-1, 1]`.
    pub joystick_x: f32,
    /// In `[-1, 1]`.
    pub joystick_y: f32,
    /// Host time of the detection in nanoseconds.
    pub timestamp: u64,
}

/// Graphics API reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsApi {
    Vulkan,
    Direct3D11,
    Metal,
    Unknown(u32),
}

impl GraphicsApi {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => GraphicsApi::Vulkan,
            1 => GraphicsApi::Direct3D11,
            2 => GraphicsApi::Metal,
            other => GraphicsApi::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            GraphicsApi::Vulkan => 0,
            GraphicsApi::Direct3D11 => 1,
            GraphicsApi::Metal => 2,
            GraphicsApi::Unknown(raw) => raw,
        }
    }
}

/// Application identification pushed by the runtime after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub application_name: String,
    pub graphics_api: GraphicsApi,
}

impl RuntimeInfo {
    const OPENCOMPOSITE_PREFIX: &'static str = "OpenComposite_";

    /// Application name for display, with the OpenComposite wrapper prefix
    /// stripped.
    pub fn display_name(&self) -> String {
        match self.application_name.strip_prefix(Self::OPENCOMPOSITE_PREFIX) {
            Some(name) => format!("{} (OpenComposite)", name),
            None => self.application_name.clone(),
        }
    }
}

/// Shared GPU image announced by the runtime. Forwarded opaquely to the
/// display sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterImageCommand {
    pub id: u32,
    pub process_id: u32,
    pub shared_handle: u64,
    pub format: i64,
    pub width: u32,
    pub height: u32,
    pub array_size: u32,
    pub mip_count: u32,
    pub opaque0: u64,
    pub opaque1: u64,
}

/// Request to present a region of a registered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentImageCommand {
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub array_index: u32,
}

bitflags::bitflags! {
    /// Which sub-states changed since the last poll. The bits are the status
    /// byte of a tracking-state reply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Freshness: u8 {
        const HEADSET    = 0x01;
        const CONTROLLER = 0x02;
    }
}

/// Fresh sub-states taken from the device state by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StateReport {
    pub headset: Option<HeadsetState>,
    pub controllers: Option<(ControllerState, ControllerState)>,
}

impl StateReport {
    pub fn freshness(&self) -> Freshness {
        let mut flags = Freshness::empty();
        flags.set(Freshness::HEADSET, self.headset.is_some());
        flags.set(Freshness::CONTROLLER, self.controllers.is_some());
        flags
    }
}
