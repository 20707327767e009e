//! Voice: one sounding note and the output channel it renders through.

use std::sync::Arc;

use ph_ir::{BufferPool, Fpcm, PlayState};

use crate::config::EngineConfig;
use crate::graph::{blocks, Graph};
use crate::nodes::{Meter, MeterTap};

/// Identifier handed out by [`VoiceManager::start_voice`](crate::VoiceManager::start_voice).
pub type VoiceId = u32;

/// Scratch buffers put in a fresh channel's pool up front.
const PREALLOCATED_SCRATCH: usize = 8;

/// Voice lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Key held.
    #[default]
    Active,
    /// Key released; the graph is playing out its release tail.
    Releasing,
}

/// Where a voice's graph renders: a block-sized mix buffer plus the buffer
/// pool every node of that graph draws from.
///
/// Channels outlive voices. A finished voice hands its channel back to the
/// manager, which gives it to the next voice with its freelists intact.
#[derive(Debug)]
pub struct OutputChannel {
    pool: BufferPool,
    mix: Fpcm,
}

impl OutputChannel {
    pub fn new(config: &EngineConfig) -> Self {
        let block = config.block_size.max(1);
        let pool = BufferPool::new(block, config.persistent_len);
        pool.preallocate(PREALLOCATED_SCRATCH, 0);
        Self {
            pool,
            mix: Fpcm::zeroed(block),
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Render `graph` block by block and add it onto `out`, scaled by `gain`.
    pub fn mix_into(&mut self, graph: &mut Graph, gain: f32, out: &mut [f32]) {
        let block = self.mix.len();
        for (start, len) in blocks(0, out.len(), block) {
            graph.accumulate(&mut self.mix, 0, len, block, &self.pool);
            for (o, s) in out[start..start + len].iter_mut().zip(&self.mix[..len]) {
                *o += s * gain;
            }
        }
    }
}

/// A single voice: a spawned graph, metered at its root.
#[derive(Debug)]
pub struct Voice {
    pub id: VoiceId,
    pub velocity: f32,
    pub state: VoiceState,
    graph: Graph,
    channel: OutputChannel,
    meter: Arc<MeterTap>,
    /// Order the voice entered its current state, for choosing steal victims.
    since: u64,
}

impl Voice {
    /// Bind `graph` to `channel`, putting a meter above its root.
    pub fn new(id: VoiceId, mut graph: Graph, velocity: f32, channel: OutputChannel, since: u64) -> Self {
        let meter = MeterTap::new();
        graph.wrap_root(|root| Meter::new(root, meter.clone()));
        Self {
            id,
            velocity,
            state: VoiceState::Active,
            graph,
            channel,
            meter,
            since,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn meter(&self) -> &Arc<MeterTap> {
        &self.meter
    }

    pub fn since(&self) -> u64 {
        self.since
    }

    pub fn finished(&self) -> PlayState {
        self.graph.finished()
    }

    /// Release every node and mark the voice as releasing.
    pub fn release(&mut self, since: u64) {
        self.graph.release_hierarchy();
        if self.state != VoiceState::Releasing {
            self.state = VoiceState::Releasing;
            self.since = since;
        }
    }

    /// Mix this voice onto `out`, scaled by its velocity.
    pub fn render(&mut self, out: &mut [f32]) {
        self.channel.mix_into(&mut self.graph, self.velocity, out);
    }

    /// Tear the graph down and hand back the channel.
    pub fn teardown(mut self) -> OutputChannel {
        self.graph.deconstruct_hierarchy(&self.channel.pool);
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Dc, Delay, LinearDecay};

    fn config() -> EngineConfig {
        EngineConfig {
            sample_rate: 100,
            block_size: 16,
            persistent_len: 32,
            max_voices: 4,
        }
    }

    fn dc_graph(value: f32) -> Graph {
        let mut g = Graph::new(100);
        let dc = g.insert(Dc::new(value));
        g.set_root(dc);
        g
    }

    #[test]
    fn render_adds_scaled_by_velocity() {
        let mut v = Voice::new(1, dc_graph(0.5), 0.5, OutputChannel::new(&config()), 0);
        let mut out = vec![1.0; 40];
        v.render(&mut out);
        assert!(out.iter().all(|&s| s == 1.25));
    }

    #[test]
    fn render_feeds_the_meter() {
        let mut v = Voice::new(1, dc_graph(-0.75), 1.0, OutputChannel::new(&config()), 0);
        let mut out = vec![0.0; 20];
        v.render(&mut out);
        assert_eq!(v.meter().peak(), 0.75);
    }

    #[test]
    fn release_changes_state_once() {
        let mut g = Graph::new(100);
        let dc = g.insert(Dc::new(1.0));
        let dec = g.insert(LinearDecay::new(dc, 0, 4, 0.0, 100));
        g.set_root(dec);
        let mut v = Voice::new(1, g, 1.0, OutputChannel::new(&config()), 0);
        v.release(5);
        v.release(9);
        assert_eq!(v.state, VoiceState::Releasing);
        assert_eq!(v.since(), 5);
    }

    #[test]
    fn teardown_returns_history_buffers() {
        let mut g = Graph::new(100);
        let dc = g.insert(Dc::new(1.0));
        let d = g.insert(Delay::new(dc, 3, 20, 0.5));
        g.set_root(d);
        let mut v = Voice::new(1, g, 1.0, OutputChannel::new(&config()), 0);
        let mut out = vec![0.0; 100];
        v.render(&mut out);
        let channel = v.teardown();
        assert_eq!(channel.pool().outstanding(), 0);
        assert!(channel.pool().allocated() > PREALLOCATED_SCRATCH);
    }
}
