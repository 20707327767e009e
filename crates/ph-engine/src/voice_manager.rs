//! VoiceManager: voice allocation, release and teardown.
//!
//! The manager owns every sounding voice and the output channels they
//! render through. Control calls (`start_voice`, `stop_voice`, ...) and
//! `render` both take `&mut self`, so a host that drives them from
//! different threads puts the manager behind one lock.

use ph_ir::PlayState;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::graph::Graph;
use crate::voice::{OutputChannel, Voice, VoiceId, VoiceState};

pub struct VoiceManager {
    config: EngineConfig,
    /// Voice slots (None = free).
    slots: Vec<Option<Voice>>,
    /// Channels of torn-down voices, ready for reuse.
    free_channels: Vec<OutputChannel>,
    channels_created: usize,
    next_id: VoiceId,
    /// Monotonic event counter ordering starts and releases.
    seq: u64,
}

impl VoiceManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            slots: (0..config.max_voices).map(|_| None).collect(),
            free_channels: Vec::with_capacity(config.max_voices),
            channels_created: 0,
            next_id: 1,
            seq: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a voice playing `graph` at `velocity`.
    ///
    /// When every slot is busy the oldest releasing voice is stolen. With no
    /// releasing voice to steal the request is refused with `None`.
    pub fn start_voice(&mut self, graph: Graph, velocity: f32) -> Option<VoiceId> {
        let idx = match self.slots.iter().position(|s| s.is_none()) {
            Some(idx) => idx,
            None => {
                let Some(idx) = self.find_steal_candidate() else {
                    debug!("All {} voices held, refusing new voice", self.slots.len());
                    return None;
                };
                if let Some(victim) = self.slots[idx].take() {
                    debug!("Stealing releasing voice {}", victim.id);
                    self.free_channels.push(victim.teardown());
                }
                idx
            }
        };

        let channel = match self.free_channels.pop() {
            Some(channel) => {
                trace!("Reusing output channel for slot {}", idx);
                channel
            }
            None => {
                self.channels_created += 1;
                trace!("Creating output channel {}", self.channels_created);
                OutputChannel::new(&self.config)
            }
        };

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.seq += 1;
        debug!("Start voice {} ({} nodes, velocity {})", id, graph.len(), velocity);
        self.slots[idx] = Some(Voice::new(id, graph, velocity, channel, self.seq));
        Some(id)
    }

    /// Oldest releasing voice.
    fn find_steal_candidate(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
            .filter(|(_, v)| v.state == VoiceState::Releasing)
            .min_by_key(|(_, v)| v.since())
            .map(|(i, _)| i)
    }

    fn index_of(&self, id: VoiceId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|v| v.id == id))
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.index_of(id).and_then(|i| self.slots[i].as_ref())
    }

    /// Stop voice `id`. Returns `false` for an unknown id.
    ///
    /// With `release` the voice's graph is released and, if it still reports
    /// `Playing`, left to play out its tail until
    /// [`check_finished_releases`](Self::check_finished_releases) reaps it.
    /// Otherwise the voice is torn down at once.
    pub fn stop_voice(&mut self, id: VoiceId, release: bool) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        if release {
            self.seq += 1;
            let seq = self.seq;
            if let Some(voice) = self.slots[idx].as_mut() {
                voice.release(seq);
                if voice.finished() == PlayState::Playing {
                    debug!("Voice {} releasing", id);
                    return true;
                }
            }
        }
        self.kill(idx);
        true
    }

    /// Tear down every voice, releasing or not. Returns whether any was stopped.
    pub fn stop_all(&mut self) -> bool {
        let mut stopped = 0;
        for idx in 0..self.slots.len() {
            if self.slots[idx].is_some() {
                self.kill(idx);
                stopped += 1;
            }
        }
        debug!("Stopped all voices ({})", stopped);
        stopped > 0
    }

    /// Reap releasing voices that stopped playing and held voices whose
    /// graph finished on its own. Returns how many were reaped.
    pub fn check_finished_releases(&mut self) -> usize {
        let mut reaped = 0;
        for idx in 0..self.slots.len() {
            let done = match &self.slots[idx] {
                Some(v) => match v.state {
                    VoiceState::Releasing => v.finished() != PlayState::Playing,
                    VoiceState::Active => v.finished() == PlayState::Finished,
                },
                None => false,
            };
            if done {
                self.kill(idx);
                reaped += 1;
            }
        }
        if reaped > 0 {
            debug!("Reaped {} finished voices", reaped);
        }
        reaped
    }

    /// Loudest voice peak since the last call, scaled by velocity.
    pub fn estimate_master_level(&self) -> f32 {
        self.slots
            .iter()
            .flatten()
            .map(|v| v.meter().take_peak() * v.velocity)
            .fold(0.0, f32::max)
    }

    /// Fill `out` with the mix of every voice.
    pub fn render(&mut self, out: &mut [f32]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_all(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_all(out);
    }

    fn render_all(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for voice in self.slots.iter_mut().flatten() {
            voice.render(out);
        }
    }

    fn kill(&mut self, idx: usize) {
        if let Some(voice) = self.slots[idx].take() {
            trace!("Tearing down voice {}", voice.id);
            self.free_channels.push(voice.teardown());
        }
    }

    /// Count of occupied voice slots.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn releasing_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|v| v.state == VoiceState::Releasing)
            .count()
    }

    /// Output channels created so far. Never exceeds `max_voices`.
    pub fn channels_created(&self) -> usize {
        self.channels_created
    }
}
