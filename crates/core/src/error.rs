/// Result alias that carries the custom [`RecorderError`] type.
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Common error type for the core crate.
///
/// Every variant is recoverable: sequencing mistakes are reported at the
/// offending call, malformed recordings are surfaced instead of being turned
/// into a partial [`Record`](crate::Record).
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("a capture session is already running")]
    AlreadyCapturing,
    #[error("no capture session is running")]
    NotCapturing,
    /// The record cannot be replaced or replayed while capture is active.
    #[error("operation not allowed while capture is in progress")]
    CaptureInProgress,
    #[error("a playback session is already running")]
    AlreadyPlaying,
    #[error("no playback session is running")]
    NotPlaying,
    /// Capture cannot start while a replay holds the input surface.
    #[error("operation not allowed while playback is in progress")]
    PlaybackInProgress,
    #[error("record contains no events")]
    EmptyRecord,
    #[error("speed multiplier must be a positive finite number, got {0}")]
    InvalidSpeed(f64),
    #[error("loop count must be at least 1")]
    InvalidLoopCount,
    #[error("unsupported format version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },
    #[error("corrupt record data: {0}")]
    CorruptData(String),
    /// Failure reported by the OS input hook or injection backend.
    #[error("input platform error: {0}")]
    Platform(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

impl RecorderError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn corrupt<T: Into<String>>(reason: T) -> Self {
        Self::CorruptData(reason.into())
    }
}

impl From<&str> for RecorderError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for RecorderError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
