//! Generator trait for every signal-processing node, and the per-node clock.

use ph_ir::{BufferPool, PlayState};

use crate::graph::{NodeKey, Nodes, Render};

/// Lifetime sample position of one node.
///
/// Stored next to the node in the graph arena. Only the graph's
/// accumulation entry point advances it; `accumulate_impl` sees it
/// read-only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clock {
    it: u64,
    cur_time: f64,
    time_per_sample: f64,
    sample_rate: u32,
}

impl Clock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            it: 0,
            cur_time: 0.0,
            time_per_sample: 1.0 / sample_rate.max(1) as f64,
            sample_rate,
        }
    }

    /// Samples produced so far.
    pub fn it(&self) -> u64 {
        self.it
    }

    /// Seconds produced so far.
    pub fn cur_time(&self) -> f64 {
        self.cur_time
    }

    pub fn time_per_sample(&self) -> f64 {
        self.time_per_sample
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn advance(&mut self, size: usize) {
        self.cur_time += size as f64 * self.time_per_sample;
        self.it += size as u64;
    }
}

/// Core trait for oscillators, combinators, envelopes and effects.
///
/// Generators:
/// - do NOT advance their own clock
/// - do NOT block, do I/O, or allocate outside the buffer pool
/// - ONLY pull from their children through the render context
pub trait Generator: Send {
    /// Overwrite `out[start..start + size]` with this node's next `size` samples.
    ///
    /// Children are pulled with [`Render::accumulate`], in chunks no larger
    /// than [`Render::block_size`] when a scratch buffer is needed.
    fn accumulate_impl(
        &mut self,
        clock: &Clock,
        ctx: &mut Render<'_>,
        out: &mut [f32],
        start: usize,
        size: usize,
    );

    /// Whether this node and its subgraph have any future audible output.
    /// Must not change any state.
    fn finished(&self, nodes: &Nodes) -> PlayState;

    /// Append the direct children of this node.
    fn report_children(&self, _children: &mut Vec<NodeKey>) {}

    /// The key was released.
    fn release(&mut self) {}

    /// Hand persistent buffers back to the pool. Runs once, at voice teardown.
    fn deconstruct(&mut self, _pool: &BufferPool) {}

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}
