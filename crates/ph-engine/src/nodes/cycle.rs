//! Loop recorder.

use ph_ir::{BufferPool, PlayState};

use super::history::SampleHistory;
use crate::generator::{Clock, Generator};
use crate::graph::{NodeKey, Nodes, Render};

/// Passes the input through for `offset` samples, then passes it through
/// while recording `record` samples, then loops the recording forever
/// without pulling the input again.
///
/// A recording shorter than one persistent buffer is tiled in place so the
/// loop wraps once per buffer instead of once per recording. `record == 0`
/// turns the node into a plain passthrough.
pub struct Cycle {
    input: NodeKey,
    offset_left: u64,
    record: u64,
    record_left: u64,
    history: SampleHistory,
    /// Loop length once recording is done; zero before that.
    loop_len: u64,
    loop_pos: u64,
}

impl Cycle {
    pub fn new(input: NodeKey, offset: u64, record: u64) -> Self {
        Self {
            input,
            offset_left: offset,
            record,
            record_left: record,
            history: SampleHistory::new(),
            loop_len: 0,
            loop_pos: 0,
        }
    }

    fn looping(&self) -> bool {
        self.record > 0 && self.offset_left == 0 && self.record_left == 0
    }
}

impl Generator for Cycle {
    fn accumulate_impl(&mut self, clock: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let end = start + size;
        let mut i = start;

        if self.record == 0 {
            ctx.accumulate(self.input, out, start, size);
            return;
        }
        if clock.it() == 0 && self.record_left == self.record {
            // Never record more than the history can hold.
            let cap = SampleHistory::capacity(ctx.pool()) as u64;
            self.record = self.record.min(cap);
            self.record_left = self.record;
        }

        if self.offset_left > 0 {
            let n = self.offset_left.min(size as u64) as usize;
            ctx.accumulate(self.input, out, i, n);
            self.offset_left -= n as u64;
            i += n;
        }

        if self.record_left > 0 && i < end {
            let n = self.record_left.min((end - i) as u64) as usize;
            ctx.accumulate(self.input, out, i, n);
            self.history.push(ctx.pool(), &out[i..i + n]);
            self.record_left -= n as u64;
            i += n;
            if self.record_left == 0 {
                self.loop_len = self.history.tile_front(self.record as usize) as u64;
            }
        }

        if i < end && self.loop_len == 0 {
            out[i..end].fill(0.0);
            return;
        }
        let origin = self.history.start();
        while i < end {
            let n = (self.loop_len - self.loop_pos).min((end - i) as u64) as usize;
            self.history.read(origin + self.loop_pos, &mut out[i..i + n]);
            self.loop_pos = (self.loop_pos + n as u64) % self.loop_len;
            i += n;
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        if self.looping() {
            PlayState::Constant
        } else {
            nodes.finished(self.input)
        }
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn deconstruct(&mut self, pool: &BufferPool) {
        self.history.release_all(pool);
    }

    fn name(&self) -> &'static str {
        "Cycle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{blocks, Graph};
    use crate::nodes::Oscillator;

    fn saw(n: usize) -> Vec<f32> {
        let mut g = Graph::new(100);
        let k = g.insert(Oscillator::sawtooth(1.0, 1.0));
        g.set_root(k);
        let mut out = vec![0.0; n];
        g.accumulate(&mut out, 0, n, 64, &BufferPool::new(64, 16));
        out
    }

    fn cycle_graph(offset: u64, record: u64) -> (Graph, NodeKey) {
        let mut g = Graph::new(100);
        let osc = g.insert(Oscillator::sawtooth(1.0, 1.0));
        let c = g.insert(Cycle::new(osc, offset, record));
        g.set_root(c);
        (g, osc)
    }

    fn pull(g: &mut Graph, pool: &BufferPool, n: usize, block: usize) -> Vec<f32> {
        let mut out = vec![0.0; n];
        for (s, len) in blocks(0, n, block) {
            g.accumulate(&mut out, s, len, 64, pool);
        }
        out
    }

    #[test]
    fn loops_recorded_segment_after_offset() {
        let pool = BufferPool::new(64, 16);
        let (mut g, osc) = cycle_graph(2, 3);
        let out = pull(&mut g, &pool, 12, 4);
        let src = saw(5);
        assert_eq!(&out[..5], &src[..5]);
        for k in 5..12 {
            assert_eq!(out[k], src[2 + (k - 5) % 3], "sample {k}");
        }
        // The input stopped being pulled once recording ended.
        assert_eq!(g.clock(osc).unwrap().it(), 5);
        assert_eq!(g.finished(), PlayState::Constant);
        g.deconstruct_hierarchy(&pool);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn recording_longer_than_a_buffer() {
        let pool = BufferPool::new(64, 16);
        let (mut g, _) = cycle_graph(0, 40);
        let out = pull(&mut g, &pool, 100, 7);
        let src = saw(40);
        for k in 0..100 {
            assert_eq!(out[k], src[k % 40], "sample {k}");
        }
        assert_eq!(pool.outstanding_persistent(), 3);
        g.deconstruct_hierarchy(&pool);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn short_recording_is_tiled() {
        let pool = BufferPool::new(64, 16);
        let (mut g, _) = cycle_graph(0, 5);
        let whole = pull(&mut g, &pool, 40, 64);
        let (mut g2, _) = cycle_graph(0, 5);
        let split = pull(&mut g2, &pool, 40, 3);
        assert_eq!(whole, split);
        let src = saw(5);
        for k in 0..40 {
            assert_eq!(whole[k], src[k % 5]);
        }
        g.deconstruct_hierarchy(&pool);
        g2.deconstruct_hierarchy(&pool);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn zero_record_passes_through() {
        let pool = BufferPool::new(64, 16);
        let (mut g, _) = cycle_graph(3, 0);
        assert_eq!(pull(&mut g, &pool, 20, 6), saw(20));
        assert_eq!(pool.outstanding_persistent(), 0);
    }
}
