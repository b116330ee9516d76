use thiserror::Error;

/// Rejections raised while validating or compiling a click pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Empty click set, non-positive loop length or a click with no samples.
    #[error("invalid click pattern: {0}")]
    InvalidSpec(String),
    #[error("click at sample {when} is out of range [0, {length})")]
    OutOfRange { when: i64, length: i64 },
}

/// Failures at the output device boundary. Fatal to the renderer that hit them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no output device available")]
    NoDevice,
    #[error("output device does not support {0}")]
    UnsupportedConfig(String),
    #[error("output stream error: {0}")]
    Stream(String),
    #[error("output device is closed")]
    Closed,
}
