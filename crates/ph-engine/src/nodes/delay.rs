//! Multi-tap feed-forward delay.
//!
//! Tap `k` plays the input `k * offset` samples late, attenuated by
//! `dampen^k`; tap 0 is the dry signal. Input is recorded into a
//! [`SampleHistory`] and everything older than the last tap's read position
//! is trimmed after every block.
//!
//! The history holds at most `MAX_BUFFERS` persistent buffers, so the
//! last tap can trail the dry signal by at most [`Delay::max_tail`]
//! samples. A longer `(voices - 1) * offset` is clamped on first render by
//! shortening `offset`, with a warning.

use ph_ir::{BufferPool, PlayState};
use tracing::warn;

use super::history::{SampleHistory, MAX_BUFFERS};
use crate::generator::{Clock, Generator};
use crate::graph::{blocks, NodeKey, Nodes, Render};

pub struct Delay {
    input: NodeKey,
    voices: u16,
    offset: u64,
    dampen: f32,
    history: SampleHistory,
    /// Position where the input was first seen `Finished`.
    input_done_at: Option<u64>,
    pos: u64,
    clamped: bool,
}

impl Delay {
    pub fn new(input: NodeKey, voices: u16, offset: u64, dampen: f32) -> Self {
        Self {
            input,
            voices,
            offset,
            dampen,
            history: SampleHistory::new(),
            input_done_at: None,
            pos: 0,
            clamped: false,
        }
    }

    /// Longest tail the history can serve with `pool`: one buffer is kept
    /// for the partially read front and one for the block being recorded.
    pub fn max_tail(pool: &BufferPool) -> u64 {
        let held = (MAX_BUFFERS - 2) * pool.persistent_len();
        held.saturating_sub(pool.scratch_len()) as u64
    }

    fn clamp_to(&mut self, pool: &BufferPool) {
        self.clamped = true;
        let taps = self.voices as u64 - 1;
        let limit = Self::max_tail(pool);
        if self.tail() > limit {
            let offset = limit / taps;
            warn!(
                "Delay tail of {} samples exceeds history capacity; offset {} clamped to {}",
                self.tail(),
                self.offset,
                offset
            );
            self.offset = offset;
        }
    }

    /// With one tap or none the node is a plain passthrough and records nothing.
    fn bypassed(&self) -> bool {
        self.voices <= 1
    }

    /// Samples the last tap trails the dry signal by.
    fn tail(&self) -> u64 {
        (self.voices.max(1) as u64 - 1) * self.offset
    }

    /// Persistent buffers currently held.
    pub fn buffer_count(&self) -> usize {
        self.history.buffer_count()
    }
}

impl Generator for Delay {
    fn accumulate_impl(&mut self, clock: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let it = clock.it();
        if self.bypassed() {
            ctx.accumulate(self.input, out, start, size);
        } else {
            if !self.clamped {
                self.clamp_to(ctx.pool());
            }
            // Record and read one block at a time so the history never holds
            // more than the tail plus one block.
            for (chunk, n) in blocks(start, size, ctx.pool().scratch_len()) {
                let at = it + (chunk - start) as u64;
                self.history.record(ctx, self.input, n);

                let window = &mut out[chunk..chunk + n];
                window.fill(0.0);
                let mut atten = 1.0f32;
                for k in 0..self.voices as u64 {
                    let lag = k * self.offset;
                    if at + (n as u64) > lag {
                        let skip = lag.saturating_sub(at) as usize;
                        self.history.add_scaled(at + skip as u64 - lag, &mut window[skip..], atten);
                    }
                    atten *= self.dampen;
                }

                let oldest_needed = (at + n as u64).saturating_sub(self.tail());
                self.history.trim_before(ctx.pool(), oldest_needed);
            }
        }

        self.pos = it + size as u64;
        if self.input_done_at.is_none() && ctx.finished(self.input) == PlayState::Finished {
            self.input_done_at = Some(self.pos);
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        match nodes.finished(self.input) {
            PlayState::Finished => match self.input_done_at {
                Some(at) if self.pos >= at + self.tail() => PlayState::Finished,
                _ => PlayState::Playing,
            },
            state => state,
        }
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn deconstruct(&mut self, pool: &BufferPool) {
        self.history.release_all(pool);
    }

    fn name(&self) -> &'static str {
        "Delay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::nodes::{Dc, LinearDecay};

    /// An impulse: one sample of 1.0, then silence.
    fn impulse(g: &mut Graph) -> NodeKey {
        let dc = g.insert(Dc::new(1.0));
        g.insert(LinearDecay::new(dc, 1, 0, 0.0, 1))
    }

    fn pull(g: &mut Graph, pool: &BufferPool, n: usize, block: usize) -> Vec<f32> {
        let mut out = vec![0.0; n];
        for (s, len) in crate::graph::blocks(0, n, block) {
            g.accumulate(&mut out, s, len, 64, pool);
        }
        out
    }

    #[test]
    fn taps_repeat_with_dampening() {
        let pool = BufferPool::new(64, 16);
        let mut g = Graph::new(100);
        let src = impulse(&mut g);
        let d = g.insert(Delay::new(src, 3, 5, 0.5));
        g.set_root(d);
        let out = pull(&mut g, &pool, 14, 3);
        let mut want = vec![0.0; 14];
        want[0] = 1.0;
        want[5] = 0.5;
        want[10] = 0.25;
        assert_eq!(out, want);
        g.deconstruct_hierarchy(&pool);
    }

    #[test]
    fn finishes_after_last_tap() {
        let pool = BufferPool::new(64, 16);
        let mut g = Graph::new(1);
        let src = impulse(&mut g);
        let d = g.insert(Delay::new(src, 3, 5, 0.5));
        g.set_root(d);
        pull(&mut g, &pool, 2, 64);
        assert_eq!(g.finished(), PlayState::Playing);
        pull(&mut g, &pool, 9, 64);
        assert_eq!(g.finished(), PlayState::Playing);
        pull(&mut g, &pool, 1, 64);
        assert_eq!(g.finished(), PlayState::Finished);
        g.deconstruct_hierarchy(&pool);
    }

    #[test]
    fn buffer_count_stays_bounded() {
        let pool = BufferPool::new(64, 1024);
        let mut g = Graph::new(44100);
        let dc = g.insert(Dc::new(0.25));
        let d = g.insert(Delay::new(dc, 4, 1000, 0.7));
        g.set_root(d);
        let mut out = vec![0.0; 64];
        for _ in 0..(10_000 / 64 + 1) {
            g.accumulate(&mut out, 0, 64, 64, &pool);
            assert!(pool.outstanding_persistent() <= 4 + 2);
        }
        assert!(pool.outstanding_persistent() >= 3);
    }

    #[test]
    fn deconstruct_returns_every_buffer() {
        let pool = BufferPool::new(64, 128);
        let baseline = pool.outstanding();
        let mut g = Graph::new(44100);
        let dc = g.insert(Dc::new(1.0));
        let d = g.insert(Delay::new(dc, 3, 300, 0.5));
        g.set_root(d);
        pull(&mut g, &pool, 2000, 64);
        assert!(pool.outstanding_persistent() > 0);
        g.deconstruct_hierarchy(&pool);
        assert_eq!(pool.outstanding(), baseline);
        g.deconstruct_hierarchy(&pool);
        assert_eq!(pool.outstanding(), baseline);
    }

    #[test]
    fn single_voice_is_a_true_bypass() {
        let pool = BufferPool::new(64, 128);
        let mut g = Graph::new(100);
        let src = impulse(&mut g);
        let d = g.insert(Delay::new(src, 1, 5, 0.5));
        g.set_root(d);
        let out = pull(&mut g, &pool, 8, 64);
        assert_eq!(out, vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(pool.outstanding_persistent(), 0);
    }

    #[test]
    fn long_tail_is_clamped_to_history_capacity() {
        // 16-sample persistent buffers: the history serves 62 * 16 - 64 samples.
        let pool = BufferPool::new(64, 16);
        assert_eq!(Delay::max_tail(&pool), 928);
        let mut g = Graph::new(100);
        let dc = g.insert(Dc::new(1.0));
        let d = g.insert(Delay::new(dc, 2, 2000, 0.5));
        g.set_root(d);
        let out = pull(&mut g, &pool, 2560, 64);
        assert_eq!(out[927], 1.0);
        assert_eq!(out[928], 1.5);
        assert_eq!(out[2559], 1.5);
        assert!(pool.outstanding_persistent() <= MAX_BUFFERS);
        g.deconstruct_hierarchy(&pool);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn one_large_call_matches_small_calls() {
        let pool = BufferPool::new(64, 16);
        let render = |block| {
            let mut g = Graph::new(100);
            let src = impulse(&mut g);
            let d = g.insert(Delay::new(src, 3, 400, 0.5));
            g.set_root(d);
            let out = pull(&mut g, &pool, 3000, block);
            g.deconstruct_hierarchy(&pool);
            out
        };
        let whole = render(3000);
        assert_eq!(whole, render(7));
        assert_eq!(whole[800], 0.25);
    }

    #[test]
    fn single_voice_does_not_fall_through_into_the_taps() {
        let pool = BufferPool::new(64, 128);
        let render = |voices| {
            let mut g = Graph::new(100);
            let dc = g.insert(Dc::new(0.5));
            let d = g.insert(Delay::new(dc, voices, 50, 0.5));
            g.set_root(d);
            let out = pull(&mut g, &pool, 20, 64);
            g.deconstruct_hierarchy(&pool);
            out
        };
        let bypass = render(1);
        // Before the second tap starts, a two-voice delay is tap 0 alone.
        let tap0 = render(2);
        assert_eq!(bypass, vec![0.5; 20]);
        assert_eq!(tap0, vec![0.5; 20]);
        // Running the tap loop after the passthrough, with no early return,
        // would add tap 0 on top of the dry copy and double the signal.
        let fall_through: Vec<f32> = bypass.iter().zip(&tap0).map(|(a, b)| a + b).collect();
        assert_eq!(fall_through, vec![1.0; 20]);
        assert_ne!(bypass, fall_through);
    }

    #[test]
    fn zero_voices_passes_input() {
        let pool = BufferPool::new(64, 128);
        let mut g = Graph::new(100);
        let dc = g.insert(Dc::new(0.5));
        let d = g.insert(Delay::new(dc, 0, 5, 0.5));
        g.set_root(d);
        assert_eq!(pull(&mut g, &pool, 3, 64), vec![0.5; 3]);
        assert_eq!(g.finished(), PlayState::Constant);
    }
}
