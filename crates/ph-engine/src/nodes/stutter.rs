//! Segment repeater.

use ph_ir::{BufferPool, PlayState};

use super::history::SampleHistory;
use crate::generator::{Clock, Generator};
use crate::graph::{NodeKey, Nodes, Render};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Passing the input through while recording it.
    Capture { pos: u64 },
    /// Replaying the captured segment; the input is not pulled.
    Repeat { pos: u64, left: u16 },
}

/// Plays `segment` samples of input, then repeats them `repeats` more
/// times, then captures the next segment. The input's clock stands still
/// while repeating, so nothing of it is skipped.
pub struct Stutter {
    input: NodeKey,
    segment: u64,
    repeats: u16,
    history: SampleHistory,
    /// History position of the current segment's first sample.
    seg_start: u64,
    phase: Phase,
}

impl Stutter {
    pub fn new(input: NodeKey, segment: u64, repeats: u16) -> Self {
        Self {
            input,
            segment,
            repeats,
            history: SampleHistory::new(),
            seg_start: 0,
            phase: Phase::Capture { pos: 0 },
        }
    }
}

impl Generator for Stutter {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let pool = ctx.pool();
        let limit = SampleHistory::capacity(pool).saturating_sub(pool.persistent_len()) as u64;
        let segment = self.segment.min(limit);
        if segment == 0 || self.repeats == 0 {
            ctx.accumulate(self.input, out, start, size);
            return;
        }

        let end = start + size;
        let mut i = start;
        while i < end {
            match &mut self.phase {
                Phase::Capture { pos } => {
                    let n = (segment - *pos).min((end - i) as u64) as usize;
                    ctx.accumulate(self.input, out, i, n);
                    self.history.push(pool, &out[i..i + n]);
                    *pos += n as u64;
                    if *pos == segment {
                        self.phase = Phase::Repeat {
                            pos: 0,
                            left: self.repeats,
                        };
                    }
                    i += n;
                }
                Phase::Repeat { pos, left } => {
                    let n = (segment - *pos).min((end - i) as u64) as usize;
                    self.history.read(self.seg_start + *pos, &mut out[i..i + n]);
                    *pos += n as u64;
                    if *pos == segment {
                        *pos = 0;
                        *left -= 1;
                        if *left == 0 {
                            self.phase = Phase::Capture { pos: 0 };
                            self.seg_start = self.history.end();
                            self.history.trim_before(pool, self.seg_start);
                        }
                    }
                    i += n;
                }
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        let input = nodes.finished(self.input);
        match self.phase {
            Phase::Repeat { .. } if input != PlayState::Constant => PlayState::Playing,
            _ => input,
        }
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn deconstruct(&mut self, pool: &BufferPool) {
        self.history.release_all(pool);
    }

    fn name(&self) -> &'static str {
        "Stutter"
    }
}
