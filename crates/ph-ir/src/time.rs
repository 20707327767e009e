//! Time and pitch units used by patch templates.
//!
//! Every time parameter is converted to a whole number of samples once,
//! when a graph is spawned. Runtime countdowns only ever work in samples.

/// Convert a duration in seconds to the nearest whole number of samples.
///
/// Negative and NaN durations map to zero.
pub fn samples_for(seconds: f32, sample_rate: u32) -> u64 {
    let samples = seconds as f64 * sample_rate as f64;
    if samples.is_nan() || samples <= 0.0 {
        return 0;
    }
    libm::round(samples) as u64
}

/// A duration as written in a patch template.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Time {
    /// An exact sample count, independent of sample rate.
    Samples(u64),
    /// Wall-clock seconds.
    Seconds(f32),
    /// Beats at the tempo the voice is spawned with.
    Beats(f32),
}

impl Time {
    /// Zero-length duration.
    pub const ZERO: Time = Time::Samples(0);

    /// Resolve to a sample count for the given spawn parameters.
    pub fn to_samples(self, params: &SpawnParams) -> u64 {
        match self {
            Time::Samples(n) => n,
            Time::Seconds(s) => samples_for(s, params.sample_rate),
            Time::Beats(b) => {
                if params.beats_per_sec <= 0.0 {
                    return 0;
                }
                samples_for(b / params.beats_per_sec, params.sample_rate)
            }
        }
    }
}

/// An oscillator frequency as written in a patch template.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pitch {
    /// Multiple of the played note's frequency.
    Ratio(f32),
    /// Absolute frequency in Hz, regardless of the note.
    Fixed(f32),
}

impl Pitch {
    /// Resolve to Hz for a note of frequency `note_freq`.
    pub fn to_hz(self, note_freq: f32) -> f32 {
        match self {
            Pitch::Ratio(r) => note_freq * r,
            Pitch::Fixed(hz) => hz,
        }
    }
}

/// Parameters a graph template is instantiated with for one voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnParams {
    /// Frequency of the played note in Hz.
    pub freq: f32,
    /// Tempo in beats per second.
    pub beats_per_sec: f32,
    /// Output sample rate.
    pub sample_rate: u32,
    /// Output amplitude applied at the root.
    pub amplitude: f32,
}

impl SpawnParams {
    pub fn new(freq: f32, beats_per_sec: f32, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            freq,
            beats_per_sec,
            sample_rate,
            amplitude,
        }
    }
}

impl Default for SpawnParams {
    fn default() -> Self {
        // A4 at 120 BPM
        Self::new(440.0, 2.0, 44100, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_to_nearest_sample() {
        assert_eq!(samples_for(1.0, 44100), 44100);
        assert_eq!(samples_for(0.5, 100), 50);
        assert_eq!(samples_for(0.0149, 100), 1);
        assert_eq!(samples_for(0.0151, 100), 2);
    }

    #[test]
    fn negative_and_nan_are_zero() {
        assert_eq!(samples_for(-1.0, 44100), 0);
        assert_eq!(samples_for(f32::NAN, 44100), 0);
    }

    #[test]
    fn beats_follow_tempo() {
        let params = SpawnParams::new(440.0, 2.0, 1000, 1.0);
        assert_eq!(Time::Beats(1.0).to_samples(&params), 500);
        assert_eq!(Time::Seconds(0.25).to_samples(&params), 250);
        assert_eq!(Time::Samples(7).to_samples(&params), 7);
    }

    #[test]
    fn zero_tempo_beats_are_empty() {
        let params = SpawnParams::new(440.0, 0.0, 1000, 1.0);
        assert_eq!(Time::Beats(4.0).to_samples(&params), 0);
    }

    #[test]
    fn pitch_ratio_tracks_note() {
        assert_eq!(Pitch::Ratio(2.0).to_hz(220.0), 440.0);
        assert_eq!(Pitch::Fixed(1000.0).to_hz(220.0), 1000.0);
    }
}
