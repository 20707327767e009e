//! Headless controller for the phonics synthesizer.
//!
//! Provides a unified API for patch lookup, voice control, live playback
//! and offline rendering that the CLI (and any other front end) shares.

pub mod presets;
mod wav;

use ph_audio::{AudioOutput, CpalOutput};
use ph_engine::{spawn, VoiceManager};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

// Re-export common types so callers don't need ph-ir/ph-engine directly.
pub use ph_audio::AudioError;
pub use ph_engine::{EngineConfig, VoiceId};
pub use ph_ir::{PatchError, PatchTemplate};

pub use wav::{samples_to_wav, write_wav};

/// Tempo patches are spawned at unless told otherwise: 120 BPM.
const DEFAULT_BEATS_PER_SEC: f32 = 2.0;

/// Error type for controller operations.
#[derive(Debug)]
pub enum ControlError {
    /// No patch registered under this name
    UnknownPatch(String),
    /// A patch template could not be built
    Patch(PatchError),
    /// Audio device failure
    Audio(AudioError),
    /// I/O failure while writing output
    Io(std::io::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::UnknownPatch(name) => write!(f, "Unknown patch: {}", name),
            ControlError::Patch(e) => write!(f, "Patch error: {}", e),
            ControlError::Audio(e) => write!(f, "Audio error: {}", e),
            ControlError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::Patch(e) => Some(e),
            ControlError::Audio(e) => Some(e),
            ControlError::Io(e) => Some(e),
            ControlError::UnknownPatch(_) => None,
        }
    }
}

impl From<PatchError> for ControlError {
    fn from(e: PatchError) -> Self {
        ControlError::Patch(e)
    }
}

impl From<AudioError> for ControlError {
    fn from(e: AudioError) -> Self {
        ControlError::Audio(e)
    }
}

impl From<std::io::Error> for ControlError {
    fn from(e: std::io::Error) -> Self {
        ControlError::Io(e)
    }
}

/// How to play one note offline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteSpec {
    pub freq: f32,
    pub velocity: f32,
    /// Seconds the key is held before release.
    pub hold: f32,
    /// Hard cap on the rendered length in seconds, release tail included.
    pub max_seconds: f32,
}

/// Headless synth controller: owns the patch registry and the live voices.
pub struct Controller {
    config: EngineConfig,
    beats_per_sec: f32,
    patches: BTreeMap<String, PatchTemplate>,
    voices: Arc<Mutex<VoiceManager>>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

fn lock(voices: &Mutex<VoiceManager>) -> MutexGuard<'_, VoiceManager> {
    voices.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Controller {
    /// A controller with no patches registered.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            beats_per_sec: DEFAULT_BEATS_PER_SEC,
            patches: BTreeMap::new(),
            voices: Arc::new(Mutex::new(VoiceManager::new(config))),
            playback: None,
        }
    }

    /// A controller with every built-in patch registered.
    pub fn with_presets(config: EngineConfig) -> Result<Self, ControlError> {
        let mut ctl = Self::new(config);
        for patch in presets::all()? {
            ctl.add_patch(patch);
        }
        Ok(ctl)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_tempo(&mut self, beats_per_sec: f32) {
        self.beats_per_sec = beats_per_sec;
    }

    // --- Patch registry ---

    /// Register `patch` under its name, replacing any patch of that name.
    pub fn add_patch(&mut self, patch: PatchTemplate) {
        debug!("Registered patch {}", patch.name);
        self.patches.insert(patch.name.to_string(), patch);
    }

    pub fn patch(&self, name: &str) -> Option<&PatchTemplate> {
        self.patches.get(name)
    }

    pub fn patch_names(&self) -> impl Iterator<Item = &str> {
        self.patches.keys().map(String::as_str)
    }

    // --- Voice control ---

    /// Spawn patch `name` at `freq` and start it.
    ///
    /// `Ok(None)` means every voice is held and none could be stolen.
    pub fn start_voice(&self, name: &str, freq: f32, velocity: f32) -> Result<Option<VoiceId>, ControlError> {
        let patch = self
            .patch(name)
            .ok_or_else(|| ControlError::UnknownPatch(name.to_string()))?;
        let params = self.config.spawn_params(freq, self.beats_per_sec, 1.0);
        let graph = spawn(patch, &params);
        Ok(lock(&self.voices).start_voice(graph, velocity))
    }

    pub fn stop_voice(&self, id: VoiceId, release: bool) -> bool {
        lock(&self.voices).stop_voice(id, release)
    }

    pub fn stop_all(&self) -> bool {
        lock(&self.voices).stop_all()
    }

    /// Maintenance tick: reap voices whose release has played out.
    pub fn check_finished_releases(&self) -> usize {
        lock(&self.voices).check_finished_releases()
    }

    pub fn estimate_master_level(&self) -> f32 {
        lock(&self.voices).estimate_master_level()
    }

    pub fn active_voices(&self) -> usize {
        lock(&self.voices).active_count()
    }

    // --- Real-time playback ---

    /// Open the default audio device and start rendering the live voices
    /// into it from a background thread.
    pub fn play(&mut self) -> Result<(), ControlError> {
        self.stop();

        let stop_signal = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let voices = self.voices.clone();
        let stop = stop_signal.clone();
        let block = self.config.block_size.max(1);

        let thread = std::thread::spawn(move || {
            audio_thread(voices, block, stop, ready_tx);
        });

        let device_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::Playback("audio thread exited".into()).into());
            }
        };
        if device_rate != self.config.sample_rate {
            warn!(
                "Device runs at {} Hz but voices render at {} Hz",
                device_rate, self.config.sample_rate
            );
        }
        info!("Live playback started");

        self.playback = Some(PlaybackHandle {
            stop_signal,
            thread: Some(thread),
        });
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
            info!("Live playback stopped");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    // --- Offline rendering ---

    /// Render one note of patch `name` on a private voice manager: hold for
    /// `note.hold` seconds, release, then run until the voice is reaped or
    /// `note.max_seconds` is reached.
    pub fn render_note(&self, name: &str, note: NoteSpec) -> Result<Vec<f32>, ControlError> {
        let patch = self
            .patch(name)
            .ok_or_else(|| ControlError::UnknownPatch(name.to_string()))?;
        let params = self.config.spawn_params(note.freq, self.beats_per_sec, 1.0);

        let mut vm = VoiceManager::new(self.config);
        let block = self.config.block_size.max(1);
        let sr = self.config.sample_rate;
        let max_len = ph_ir::samples_for(note.max_seconds, sr) as usize;
        let hold_len = (ph_ir::samples_for(note.hold, sr) as usize).min(max_len);

        let Some(id) = vm.start_voice(spawn(patch, &params), note.velocity) else {
            return Ok(Vec::new());
        };

        let mut out = vec![0.0f32; max_len];
        let mut pos = 0;
        while pos < hold_len {
            let len = block.min(hold_len - pos);
            vm.render(&mut out[pos..pos + len]);
            pos += len;
        }
        vm.stop_voice(id, true);
        while pos < max_len && vm.active_count() > 0 {
            let len = block.min(max_len - pos);
            vm.render(&mut out[pos..pos + len]);
            pos += len;
            vm.check_finished_releases();
        }
        vm.stop_all();
        out.truncate(pos);
        debug!("Rendered {} samples of {}", pos, name);
        Ok(out)
    }

    /// [`render_note`](Self::render_note) encoded as a 16-bit mono WAV.
    pub fn render_to_wav(&self, name: &str, note: NoteSpec) -> Result<Vec<u8>, ControlError> {
        let samples = self.render_note(name, note)?;
        Ok(samples_to_wav(&samples, self.config.sample_rate))
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_thread(
    voices: Arc<Mutex<VoiceManager>>,
    block: usize,
    stop_signal: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<u32, AudioError>>,
) {
    let (mut output, consumer) = match CpalOutput::new() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = output.build_stream(consumer).and_then(|()| output.start()) {
        let _ = ready.send(Err(e));
        return;
    }
    let _ = ready.send(Ok(output.sample_rate()));

    let mut buf = vec![0.0f32; block];
    stream_blocks(&mut output, &voices, &mut buf, &stop_signal);

    let _ = output.stop();
}

/// Render `buf`-sized blocks into `output` until `stop_signal` is set.
///
/// Waits for queue room before locking the voices, so the lock is never
/// held while the device is behind.
fn stream_blocks<O: AudioOutput>(
    output: &mut O,
    voices: &Mutex<VoiceManager>,
    buf: &mut [f32],
    stop_signal: &AtomicBool,
) {
    while !stop_signal.load(Ordering::Relaxed) {
        if output.free_len() == 0 {
            std::thread::yield_now();
            continue;
        }
        lock(voices).render(buf);
        let mut rest: &[f32] = buf;
        while !rest.is_empty() && !stop_signal.load(Ordering::Relaxed) {
            let n = output.write(rest);
            rest = &rest[n..];
            if n == 0 {
                std::thread::yield_now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> Controller {
        let config = EngineConfig {
            sample_rate: 8000,
            block_size: 64,
            persistent_len: 1024,
            max_voices: 4,
        };
        Controller::with_presets(config).unwrap()
    }

    #[test]
    fn presets_are_registered_by_name() {
        let ctl = controller();
        let names: Vec<&str> = ctl.patch_names().collect();
        assert_eq!(names, ["echo", "loop", "noise-hat", "pad", "pluck"]);
    }

    #[test]
    fn unknown_patch_is_an_error() {
        let ctl = controller();
        assert!(matches!(
            ctl.start_voice("kazoo", 440.0, 1.0),
            Err(ControlError::UnknownPatch(_))
        ));
        let note = NoteSpec { freq: 440.0, velocity: 1.0, hold: 0.1, max_seconds: 1.0 };
        assert!(ctl.render_note("kazoo", note).is_err());
    }

    #[test]
    fn voice_control_round_trip() {
        let ctl = controller();
        let id = ctl.start_voice("pad", 220.0, 0.8).unwrap().unwrap();
        assert_eq!(ctl.active_voices(), 1);
        assert!(ctl.stop_voice(id, true));
        assert!(!ctl.stop_voice(id + 100, true));
        assert!(ctl.stop_all());
        assert_eq!(ctl.active_voices(), 0);
        assert_eq!(ctl.check_finished_releases(), 0);
    }

    #[test]
    fn pluck_renders_and_ends_early() {
        let ctl = controller();
        let note = NoteSpec { freq: 440.0, velocity: 1.0, hold: 0.2, max_seconds: 5.0 };
        let samples = ctl.render_note("pluck", note).unwrap();
        assert!(samples.iter().any(|&s| s.abs() > 0.1));
        // Released at 0.2s: 0.05s fade plus one second of drain.
        assert!(samples.len() < 8000 * 2);
        assert!(samples.len() >= 8000);
    }

    #[test]
    fn render_stops_at_the_cap() {
        let ctl = controller();
        let note = NoteSpec { freq: 110.0, velocity: 0.5, hold: 10.0, max_seconds: 0.5 };
        let samples = ctl.render_note("pad", note).unwrap();
        assert_eq!(samples.len(), 4000);
    }

    #[test]
    fn wav_render_has_header_and_data() {
        let ctl = controller();
        let note = NoteSpec { freq: 440.0, velocity: 1.0, hold: 0.05, max_seconds: 0.25 };
        let wav = ctl.render_to_wav("noise-hat", note).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 2 * 2000);
    }

    #[test]
    fn errors_chain_their_source() {
        use std::error::Error;
        let e: ControlError = AudioError::NoDevice.into();
        assert!(e.source().is_some());
        assert!(e.to_string().contains("No audio device"));
    }

    /// Fixed-size sample queue that raises `stop` once it is full.
    struct QueueOutput {
        queue: Vec<f32>,
        room: usize,
        stop: Arc<AtomicBool>,
    }

    impl AudioOutput for QueueOutput {
        fn sample_rate(&self) -> u32 {
            8000
        }

        fn write(&mut self, samples: &[f32]) -> usize {
            let n = samples.len().min(self.free_len());
            self.queue.extend_from_slice(&samples[..n]);
            if self.free_len() == 0 {
                self.stop.store(true, Ordering::Relaxed);
            }
            n
        }

        fn free_len(&self) -> usize {
            self.room - self.queue.len()
        }

        fn start(&mut self) -> Result<(), AudioError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
    }

    #[test]
    fn streaming_fills_the_output_queue() {
        let config = EngineConfig {
            sample_rate: 8000,
            block_size: 32,
            persistent_len: 256,
            max_voices: 2,
        };
        let mut t = PatchTemplate::new("dc");
        let dc = t.add(ph_ir::NodeKind::Dc { value: 0.5 });
        t.set_root(dc).unwrap();
        let mut vm = VoiceManager::new(config);
        let params = vm.config().spawn_params(440.0, 2.0, 1.0);
        vm.start_voice(spawn(&t, &params), 1.0).unwrap();
        let voices = Mutex::new(vm);

        let stop = Arc::new(AtomicBool::new(false));
        let mut output = QueueOutput { queue: Vec::new(), room: 100, stop: stop.clone() };
        let mut buf = vec![0.0f32; 32];
        stream_blocks(&mut output, &voices, &mut buf, &stop);

        // Three whole blocks, then the head of a fourth.
        assert_eq!(output.queue.len(), 100);
        assert!(output.queue.iter().all(|&s| s == 0.5));
    }
}
