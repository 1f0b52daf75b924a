//! Audio backend trait and error types.

/// Error type for audio device operations.
#[derive(Debug)]
pub enum AudioError {
    /// Failed to initialize audio device
    DeviceInit(String),
    /// Failed to create audio stream
    StreamCreate(String),
    /// Playback error
    Playback(String),
    /// No audio device available
    NoDevice,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::DeviceInit(msg) => write!(f, "Device init error: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "Stream create error: {}", msg),
            AudioError::Playback(msg) => write!(f, "Playback error: {}", msg),
            AudioError::NoDevice => write!(f, "No audio device available"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Trait for audio device backends.
pub trait AudioBackend {
    /// Get the device sample rate.
    fn sample_rate(&self) -> u32;

    /// Start the stream.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop the stream.
    fn stop(&mut self) -> Result<(), AudioError>;
}
