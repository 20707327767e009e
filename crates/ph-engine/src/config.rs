//! Engine configuration.

use ph_ir::SpawnParams;

/// Sizes and limits shared by every voice of a [`VoiceManager`](crate::VoiceManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Preferred render block, and the length of every scratch buffer.
    pub block_size: usize,
    /// Length of every persistent history buffer.
    pub persistent_len: usize,
    /// Most voices sounding at once.
    pub max_voices: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 256,
            persistent_len: 4096,
            max_voices: 32,
        }
    }
}

impl EngineConfig {
    /// Spawn parameters for a note at `freq` Hz, at this config's sample rate.
    pub fn spawn_params(&self, freq: f32, beats_per_sec: f32, amplitude: f32) -> SpawnParams {
        SpawnParams::new(freq, beats_per_sec, self.sample_rate, amplitude)
    }
}
