//! Integrated offset/attack/decay/sustain/release envelope.
//!
//! The pre-release stages advance one sample at a time from integer
//! countdowns, so a single call may cross any number of stage boundaries
//! (including zero-length stages) and still land exactly where a sequence
//! of smaller calls would.

use ph_ir::PlayState;

use crate::generator::{Clock, Generator};
use crate::graph::{NodeKey, Nodes, Render};

/// Stage lengths of an [`Adsr`], in samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AdsrTimes {
    pub offset: u64,
    pub attack: u64,
    pub decay: u64,
    /// Gain held after the decay, `0..=1`.
    pub sustain: f32,
    pub release: u64,
}

/// Key-release side of the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tail {
    /// Key still held.
    Held,
    /// Released; linear fade with `left` samples to go.
    Fading { left: u64 },
    /// Silent, waiting for in-flight device buffers to play out.
    Safety { left: u64 },
    Dead,
}

/// ADSR envelope applied to one input.
pub struct Adsr {
    input: NodeKey,
    offset_left: u64,
    attack_total: u64,
    attack_it: u64,
    decay_total: u64,
    decay_left: u64,
    sustain: f32,
    release_total: u64,
    tail: Tail,
    sample_rate: u32,
}

impl Adsr {
    pub fn new(input: NodeKey, times: AdsrTimes, sample_rate: u32) -> Self {
        Self {
            input,
            offset_left: times.offset,
            attack_total: times.attack,
            attack_it: 0,
            decay_total: times.decay,
            decay_left: times.decay,
            sustain: times.sustain.clamp(0.0, 1.0),
            release_total: times.release,
            tail: Tail::Held,
            sample_rate,
        }
    }

    /// Offset, attack and decay are all behind us.
    fn reached_sustain(&self) -> bool {
        self.offset_left == 0 && self.attack_it >= self.attack_total && self.decay_left == 0
    }

    /// Samples of held output left before a zero sustain silences the note.
    fn held_samples_left(&self) -> u64 {
        self.offset_left + (self.attack_total - self.attack_it) + self.decay_left
    }

    /// Gain of the offset/attack/decay/sustain pipeline for the next sample.
    fn next_pre_gain(&mut self) -> f32 {
        if self.offset_left > 0 {
            self.offset_left -= 1;
            return 0.0;
        }
        if self.attack_it < self.attack_total {
            let g = self.attack_it as f32 / self.attack_total as f32;
            self.attack_it += 1;
            return g;
        }
        if self.decay_left > 0 {
            let g = self.sustain
                + (self.decay_left as f32 / self.decay_total as f32) * (1.0 - self.sustain);
            self.decay_left -= 1;
            return g;
        }
        self.sustain
    }

    fn enter_safety(&mut self) {
        self.tail = Tail::Safety {
            left: self.sample_rate as u64,
        };
    }
}

impl Generator for Adsr {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let end = start + size;
        let live = match self.tail {
            Tail::Held if self.sustain == 0.0 => self.held_samples_left().min(size as u64) as usize,
            Tail::Held => size,
            Tail::Fading { left } => left.min(size as u64) as usize,
            Tail::Safety { .. } | Tail::Dead => 0,
        };
        ctx.accumulate(self.input, out, start, live);

        let release_total = self.release_total as f32;
        for i in start..start + live {
            let mut gain = self.next_pre_gain();
            if let Tail::Fading { left } = &mut self.tail {
                *left -= 1;
                gain *= *left as f32 / release_total;
            }
            out[i] *= gain;
        }

        match self.tail {
            Tail::Fading { left: 0 } => self.enter_safety(),
            Tail::Held if self.sustain == 0.0 && self.reached_sustain() => self.enter_safety(),
            _ => {}
        }

        let rest = end - (start + live);
        out[start + live..end].fill(0.0);
        if let Tail::Safety { left } = &mut self.tail {
            *left = left.saturating_sub(rest as u64);
            if *left == 0 {
                self.tail = Tail::Dead;
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        match self.tail {
            Tail::Held => match nodes.finished(self.input) {
                PlayState::Finished => PlayState::Finished,
                PlayState::NotStarted => PlayState::NotStarted,
                _ => PlayState::Playing,
            },
            Tail::Fading { .. } | Tail::Safety { .. } => PlayState::Playing,
            Tail::Dead => PlayState::Finished,
        }
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn release(&mut self) {
        if self.tail == Tail::Held {
            self.tail = Tail::Fading {
                left: self.release_total,
            };
        }
    }

    fn name(&self) -> &'static str {
        "ADSR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::nodes::Dc;
    use ph_ir::BufferPool;

    fn adsr_graph(times: AdsrTimes, sample_rate: u32) -> Graph {
        let mut g = Graph::new(sample_rate);
        let dc = g.insert(Dc::new(1.0));
        let env = g.insert(Adsr::new(dc, times, sample_rate));
        g.set_root(env);
        g
    }

    fn pull(g: &mut Graph, pool: &BufferPool, n: usize) -> Vec<f32> {
        let mut out = vec![0.0; n];
        g.accumulate(&mut out, 0, n, 64, pool);
        out
    }

    const TIMES: AdsrTimes = AdsrTimes {
        offset: 0,
        attack: 10,
        decay: 10,
        sustain: 0.5,
        release: 10,
    };

    #[test]
    fn full_lifecycle() {
        let pool = BufferPool::new(64, 256);
        let mut g = adsr_graph(TIMES, 100);

        let held = pull(&mut g, &pool, 20);
        assert_eq!(held[0], 0.0);
        assert_eq!(held[5], 0.5);
        assert_eq!(held[10], 1.0);
        assert!((held[19] - 0.55).abs() < 1e-6);
        assert_eq!(pull(&mut g, &pool, 1), vec![0.5]);
        assert_eq!(g.finished(), PlayState::Playing);

        g.release_hierarchy();
        let fade = pull(&mut g, &pool, 10);
        assert!((fade[0] - 0.45).abs() < 1e-6);
        assert!(fade.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(fade[9], 0.0);

        for _ in 0..99 {
            assert_eq!(pull(&mut g, &pool, 1), vec![0.0]);
            assert_eq!(g.finished(), PlayState::Playing);
        }
        pull(&mut g, &pool, 1);
        assert_eq!(g.finished(), PlayState::Finished);
    }

    #[test]
    fn offset_is_silent() {
        let pool = BufferPool::new(64, 256);
        let times = AdsrTimes { offset: 3, attack: 0, decay: 0, sustain: 1.0, release: 0 };
        let mut g = adsr_graph(times, 100);
        assert_eq!(pull(&mut g, &pool, 5), vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn release_during_attack_fades_the_ramp() {
        let pool = BufferPool::new(64, 256);
        let times = AdsrTimes { offset: 0, attack: 4, decay: 0, sustain: 1.0, release: 2 };
        let mut g = adsr_graph(times, 100);
        assert_eq!(pull(&mut g, &pool, 2), vec![0.0, 0.25]);
        g.release_hierarchy();
        // Attack keeps ramping underneath the release fade.
        assert_eq!(pull(&mut g, &pool, 3), vec![0.25, 0.0, 0.0]);
    }

    #[test]
    fn zero_sustain_drains_without_release() {
        let pool = BufferPool::new(64, 256);
        let times = AdsrTimes { offset: 0, attack: 2, decay: 2, sustain: 0.0, release: 5 };
        let mut g = adsr_graph(times, 10);
        let out = pull(&mut g, &pool, 6);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 0.5, 0.0, 0.0]);
        assert_eq!(g.finished(), PlayState::Playing);
        pull(&mut g, &pool, 7);
        assert_eq!(g.finished(), PlayState::Playing);
        pull(&mut g, &pool, 1);
        assert_eq!(g.finished(), PlayState::Finished);
    }

    #[test]
    fn zero_length_release_goes_straight_to_safety() {
        let pool = BufferPool::new(64, 256);
        let times = AdsrTimes { offset: 0, attack: 0, decay: 0, sustain: 1.0, release: 0 };
        let mut g = adsr_graph(times, 4);
        assert_eq!(pull(&mut g, &pool, 2), vec![1.0, 1.0]);
        g.release_hierarchy();
        assert_eq!(pull(&mut g, &pool, 3), vec![0.0; 3]);
        assert_eq!(g.finished(), PlayState::Playing);
        pull(&mut g, &pool, 1);
        assert_eq!(g.finished(), PlayState::Finished);
    }

    #[test]
    fn split_calls_match_single_call() {
        let pool = BufferPool::new(64, 256);
        let times = AdsrTimes { offset: 7, attack: 13, decay: 29, sustain: 0.3, release: 17 };
        let mut whole = adsr_graph(times, 50);
        let mut a = pull(&mut whole, &pool, 60);
        whole.release_hierarchy();
        a.extend(pull(&mut whole, &pool, 40));

        let mut split = adsr_graph(times, 50);
        let mut b = Vec::new();
        for n in [1, 6, 0, 13, 2, 38] {
            b.extend(pull(&mut split, &pool, n));
        }
        split.release_hierarchy();
        for n in [5, 12, 23] {
            b.extend(pull(&mut split, &pool, n));
        }
        assert_eq!(a, b);
    }
}
