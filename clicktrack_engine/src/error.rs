use clicktrack_shared::{DeviceError, PatternError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}
