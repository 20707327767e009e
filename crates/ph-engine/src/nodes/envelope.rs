//! Single-stage envelopes: linear attack, linear decay, and release.
//!
//! All durations are whole sample counts fixed at construction. Countdowns
//! only ever move by samples actually produced, so a window split into
//! several calls gives the same output as one call.

use ph_ir::PlayState;

use crate::generator::{Clock, Generator};
use crate::graph::{NodeKey, Nodes, Render};

/// Silent for `offset` samples, then ramps gain from 0 to 1 over `attack`
/// samples, then passes the input through untouched.
pub struct LinearAttack {
    input: NodeKey,
    offset_left: u64,
    attack_total: u64,
    attack_it: u64,
    passed: bool,
}

impl LinearAttack {
    pub fn new(input: NodeKey, offset: u64, attack: u64) -> Self {
        Self {
            input,
            offset_left: offset,
            attack_total: attack,
            attack_it: 0,
            passed: offset == 0 && attack == 0,
        }
    }
}

impl Generator for LinearAttack {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        ctx.accumulate(self.input, out, start, size);
        if self.passed {
            return;
        }
        let end = start + size;

        let wait = (self.offset_left.min(size as u64)) as usize;
        out[start..start + wait].fill(0.0);
        self.offset_left -= wait as u64;

        let total = self.attack_total as f32;
        for s in &mut out[start + wait..end] {
            if self.attack_it >= self.attack_total {
                break;
            }
            *s *= self.attack_it as f32 / total;
            self.attack_it += 1;
        }

        if self.offset_left == 0 && self.attack_it >= self.attack_total {
            self.passed = true;
        }
    }

    /// Always the input's state, also once the ramp has passed. A passed
    /// attack is a plain passthrough, so reporting `Constant` there would
    /// hide a finishing input and keep its voice alive forever.
    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.finished(self.input)
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn name(&self) -> &'static str {
        "Attack"
    }
}

/// Full gain for `offset` samples, then decays linearly to `sustain` over
/// `duration` samples and holds there.
///
/// With a sustain of exactly zero the node stops pulling its input once
/// the decay ends and reports `Finished` one second (one `sample_rate`
/// worth of samples) later, so buffers already queued at the device drain
/// before the voice is torn down.
pub struct LinearDecay {
    input: NodeKey,
    offset_left: u64,
    total: u64,
    /// Decay samples still to go; negative once expired with zero sustain.
    left: i64,
    sustain: f32,
    sample_rate: u32,
}

impl LinearDecay {
    pub fn new(input: NodeKey, offset: u64, duration: u64, sustain: f32, sample_rate: u32) -> Self {
        Self {
            input,
            offset_left: offset,
            total: duration,
            left: duration as i64,
            sustain: sustain.clamp(0.0, 1.0),
            sample_rate,
        }
    }

    fn silent_after_decay(&self) -> bool {
        self.sustain == 0.0
    }

    fn expired(&self) -> bool {
        self.offset_left == 0 && self.left <= 0
    }
}

impl Generator for LinearDecay {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let end = start + size;
        let live = if self.silent_after_decay() {
            let until_expiry = self.offset_left + self.left.max(0) as u64;
            until_expiry.min(size as u64) as usize
        } else {
            size
        };
        ctx.accumulate(self.input, out, start, live);

        let mut i = start;
        let wait = (self.offset_left.min(live as u64)) as usize;
        self.offset_left -= wait as u64;
        i += wait;

        let range = 1.0 - self.sustain;
        let total = self.total as f32;
        while i < start + live && self.left > 0 {
            out[i] *= self.sustain + (self.left as f32 / total) * range;
            self.left -= 1;
            i += 1;
        }

        if self.silent_after_decay() {
            out[start + live..end].fill(0.0);
            // Keep counting past the end of the decay for the drain margin.
            self.left -= (end - (start + live)) as i64;
        } else {
            for s in &mut out[i..end] {
                *s *= self.sustain;
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        if !self.silent_after_decay() {
            return nodes.finished(self.input);
        }
        if self.expired() {
            if self.left <= -(self.sample_rate as i64) {
                PlayState::Finished
            } else {
                PlayState::Playing
            }
        } else {
            match nodes.finished(self.input) {
                PlayState::Finished => PlayState::Finished,
                PlayState::NotStarted => PlayState::NotStarted,
                _ => PlayState::Playing,
            }
        }
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn name(&self) -> &'static str {
        "Decay"
    }
}

/// Where a standalone [`Release`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReleaseStage {
    Held,
    Fading { left: u64 },
    Draining { left: u64 },
    Done,
}

/// Passes its input through until released, then fades it out with a
/// quadratic curve `(left / total)^2` over `release` samples.
///
/// After the fade it stays silent and keeps reporting `Playing` for one
/// more `sample_rate` worth of samples before reporting `Finished`.
pub struct Release {
    input: NodeKey,
    total: u64,
    stage: ReleaseStage,
    sample_rate: u32,
}

impl Release {
    pub fn new(input: NodeKey, release: u64, sample_rate: u32) -> Self {
        Self {
            input,
            total: release,
            stage: ReleaseStage::Held,
            sample_rate,
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != ReleaseStage::Held
    }
}

impl Generator for Release {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let end = start + size;
        let live = match self.stage {
            ReleaseStage::Held => size,
            ReleaseStage::Fading { left } => left.min(size as u64) as usize,
            ReleaseStage::Draining { .. } | ReleaseStage::Done => 0,
        };
        ctx.accumulate(self.input, out, start, live);

        if let ReleaseStage::Fading { left } = &mut self.stage {
            let total = self.total as f32;
            for s in &mut out[start..start + live] {
                *left -= 1;
                let g = *left as f32 / total;
                *s *= g * g;
            }
            if *left == 0 {
                self.stage = ReleaseStage::Draining {
                    left: self.sample_rate as u64,
                };
            }
        }

        let rest = end - (start + live);
        out[start + live..end].fill(0.0);
        if let ReleaseStage::Draining { left } = &mut self.stage {
            *left = left.saturating_sub(rest as u64);
            if *left == 0 {
                self.stage = ReleaseStage::Done;
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        match self.stage {
            ReleaseStage::Held => nodes.finished(self.input),
            ReleaseStage::Fading { .. } | ReleaseStage::Draining { .. } => PlayState::Playing,
            ReleaseStage::Done => PlayState::Finished,
        }
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn release(&mut self) {
        if self.stage == ReleaseStage::Held {
            self.stage = ReleaseStage::Fading { left: self.total };
        }
    }

    fn name(&self) -> &'static str {
        "Release"
    }
}
