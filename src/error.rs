use std::ffi::{c_char, CString};
use std::sync::Mutex;

/// Errors produced by the tracking pipeline, the runtime transport and the
/// configuration layer.
#[derive(Debug, thiserror::Error)]
pub enum AetherError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unsupported config version {found} (newest supported is {supported})")]
    UnsupportedConfigVersion { found: u32, supported: u32 },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),

    #[error("Detector failed: {0}")]
    Detector(String),

    #[error("Tracker is shutting down")]
    ShuttingDown,

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),

    #[error("Timeout waiting for event")]
    Timeout,

    #[error("Channel disconnected")]
    ChannelDisconnected,
}

/// Outcome of the most recent FFI call, readable from C as a string.
///
/// Each call records its result: a failure stores the message, a success
/// clears it, so `ae_last_error` never reports a stale error.
pub(crate) struct LastError {
    message: Mutex<Option<CString>>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: Mutex::new(None),
        }
    }

    /// Remember the outcome of `result` and pass its value on.
    pub fn record<T>(&self, result: crate::Result<T>) -> Option<T> {
        let message = match &result {
            Ok(_) => None,
            Err(e) => {
                log::debug!("FFI call failed: {}", e);
                CString::new(e.to_string().replace('\0', " ")).ok()
            }
        };
        if let Ok(mut slot) = self.message.lock() {
            *slot = message;
        }
        result.ok()
    }

    /// Null when the last recorded call succeeded.
    pub fn as_ptr(&self) -> *const c_char {
        match self.message.lock() {
            Ok(slot) => slot.as_ref().map_or(std::ptr::null(), |m| m.as_ptr()),
            Err(_) => std::ptr::null(),
        }
    }
}
