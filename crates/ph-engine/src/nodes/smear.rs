//! Moving-average smear.

use ph_ir::{BufferPool, PlayState};

use super::history::SampleHistory;
use crate::generator::{Clock, Generator};
use crate::graph::{NodeKey, Nodes, Render};

/// Each output sample is the mean of the last `window` input samples,
/// counting samples before the start as silence. A window of 0 or 1 passes
/// the input through.
pub struct Smear {
    input: NodeKey,
    window: u64,
    history: SampleHistory,
    sum: f64,
}

impl Smear {
    pub fn new(input: NodeKey, window: u64) -> Self {
        Self {
            input,
            window,
            history: SampleHistory::new(),
            sum: 0.0,
        }
    }
}

impl Generator for Smear {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let pool = ctx.pool();
        // Keep one spare buffer so the window never reaches a dropped one.
        let limit = SampleHistory::capacity(pool).saturating_sub(pool.persistent_len()) as u64;
        let window = self.window.min(limit);
        if window <= 1 {
            ctx.accumulate(self.input, out, start, size);
            return;
        }

        let first = self.history.end();
        self.history.record(ctx, self.input, size);
        let scale = 1.0 / window as f64;
        for (j, s) in out[start..start + size].iter_mut().enumerate() {
            let pos = first + j as u64;
            self.sum += self.history.get(pos) as f64;
            if pos >= window {
                self.sum -= self.history.get(pos - window) as f64;
            }
            *s = (self.sum * scale) as f32;
        }
        self.history
            .trim_before(pool, (first + size as u64).saturating_sub(window));
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.finished(self.input)
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn deconstruct(&mut self, pool: &BufferPool) {
        self.history.release_all(pool);
    }

    fn name(&self) -> &'static str {
        "Smear"
    }
}
