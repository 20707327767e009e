//! Audio output trait and error types.

/// Error type for audio operations.
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

/// Trait for audio output backends taking mono samples.
pub trait AudioOutput {
    /// Get the sample rate.
    fn sample_rate(&self) -> u32;

    /// Queue as many of `samples` as fit without blocking; returns how many.
    fn write(&mut self, samples: &[f32]) -> usize;

    /// Room left in the queue, in samples.
    fn free_len(&self) -> usize;

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_their_cause() {
        let e = AudioError::DeviceInit("busy".into());
        assert_eq!(e.to_string(), "Device init error: busy");
        assert_eq!(AudioError::NoDevice.to_string(), "No audio device available");
    }
}
