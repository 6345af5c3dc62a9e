use std::fmt;

/// Failure modes of a sensor.
#[derive(Debug)]
pub enum StationError {
    /// The bus or the device could not be reached at startup.
    DeviceUnavailable(anyhow::Error),
    /// A single poll failed. The loop skips that cycle.
    ReadFailure(anyhow::Error),
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::DeviceUnavailable(e) => write!(f, "sensor unavailable: {e:#}"),
            StationError::ReadFailure(e) => write!(f, "sensor read failed: {e:#}"),
        }
    }
}

impl std::error::Error for StationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StationError::DeviceUnavailable(e) | StationError::ReadFailure(e) => Some(&**e),
        }
    }
}
