//! Oscillators and constant sources.
//!
//! Output is a pure function of the absolute sample index, so an
//! oscillator gives the same samples however its windows are split.

use std::f64::consts::TAU;
use std::sync::OnceLock;

use ph_ir::PlayState;

use crate::generator::{Clock, Generator};
use crate::graph::{Nodes, Render};

/// Periodic waveform of an [`Oscillator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Sine,
    /// High for the first `duty` fraction of each period.
    Square { duty: f32 },
    Sawtooth,
    Triangle,
}

impl Shape {
    /// Value at `phase` in `[0, 1)`.
    fn at(self, phase: f64) -> f32 {
        match self {
            Shape::Sine => (phase * TAU).sin() as f32,
            Shape::Square { duty } => {
                if phase < duty as f64 {
                    1.0
                } else {
                    -1.0
                }
            }
            Shape::Sawtooth => (2.0 * phase - 1.0) as f32,
            Shape::Triangle => {
                let t = if phase < 0.5 { phase * 4.0 - 1.0 } else { 3.0 - phase * 4.0 };
                t as f32
            }
        }
    }
}

/// Periodic oscillator.
pub struct Oscillator {
    shape: Shape,
    freq: f64,
    amp: f32,
    /// Sample index this instance starts at.
    start: u64,
}

impl Oscillator {
    pub fn new(shape: Shape, freq: f32, amp: f32) -> Self {
        Self {
            shape,
            freq: freq as f64,
            amp,
            start: 0,
        }
    }

    pub fn sine(freq: f32, amp: f32) -> Self {
        Self::new(Shape::Sine, freq, amp)
    }

    pub fn square(freq: f32, amp: f32, duty: f32) -> Self {
        Self::new(Shape::Square { duty: duty.clamp(0.0, 1.0) }, freq, amp)
    }

    pub fn sawtooth(freq: f32, amp: f32) -> Self {
        Self::new(Shape::Sawtooth, freq, amp)
    }

    pub fn triangle(freq: f32, amp: f32) -> Self {
        Self::new(Shape::Triangle, freq, amp)
    }

    /// Start as if `samples` had already been produced.
    pub fn starting_at(mut self, samples: u64) -> Self {
        self.start = samples;
        self
    }
}

impl Generator for Oscillator {
    fn accumulate_impl(
        &mut self,
        clock: &Clock,
        _ctx: &mut Render<'_>,
        out: &mut [f32],
        start: usize,
        size: usize,
    ) {
        let cycles_per_sample = self.freq / clock.sample_rate().max(1) as f64;
        let first = self.start + clock.it();
        for (i, s) in out[start..start + size].iter_mut().enumerate() {
            let phase = ((first + i as u64) as f64 * cycles_per_sample).rem_euclid(1.0);
            *s = self.amp * self.shape.at(phase);
        }
    }

    fn finished(&self, _nodes: &Nodes) -> PlayState {
        PlayState::Constant
    }

    fn name(&self) -> &'static str {
        match self.shape {
            Shape::Sine => "Sine",
            Shape::Square { .. } => "Square",
            Shape::Sawtooth => "Saw",
            Shape::Triangle => "Tri",
        }
    }
}

const NOISE_LEN: usize = 1 << 16;
const NOISE_SEED: u64 = 0x5eed_f00d;

static NOISE_TABLE: OnceLock<Box<[f32]>> = OnceLock::new();

/// The process-wide baked white-noise table, built on first use.
pub fn noise_table() -> &'static [f32] {
    NOISE_TABLE.get_or_init(|| {
        let mut rng = fastrand::Rng::with_seed(NOISE_SEED);
        (0..NOISE_LEN).map(|_| rng.f32() * 2.0 - 1.0).collect()
    })
}

/// White noise read from the baked table.
pub struct WhiteNoise {
    table: &'static [f32],
    amp: f32,
    start: u64,
}

impl WhiteNoise {
    /// Builds the noise table if no one has yet, so the audio path never does.
    pub fn new(amp: f32) -> Self {
        Self {
            table: noise_table(),
            amp,
            start: 0,
        }
    }

    pub fn starting_at(mut self, samples: u64) -> Self {
        self.start = samples;
        self
    }
}

impl Generator for WhiteNoise {
    fn accumulate_impl(
        &mut self,
        clock: &Clock,
        _ctx: &mut Render<'_>,
        out: &mut [f32],
        start: usize,
        size: usize,
    ) {
        let len = self.table.len() as u64;
        let first = self.start + clock.it();
        for (i, s) in out[start..start + size].iter_mut().enumerate() {
            *s = self.amp * self.table[((first + i as u64) % len) as usize];
        }
    }

    fn finished(&self, _nodes: &Nodes) -> PlayState {
        PlayState::Constant
    }

    fn name(&self) -> &'static str {
        "Noise"
    }
}

/// Constant value.
pub struct Dc {
    value: f32,
}

impl Dc {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl Generator for Dc {
    fn accumulate_impl(&mut self, _: &Clock, _: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        out[start..start + size].fill(self.value);
    }

    fn finished(&self, _nodes: &Nodes) -> PlayState {
        PlayState::Constant
    }

    fn name(&self) -> &'static str {
        "DC"
    }
}

/// Silence. Stands in for unconnected inputs.
pub struct Zero;

impl Generator for Zero {
    fn accumulate_impl(&mut self, _: &Clock, _: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        out[start..start + size].fill(0.0);
    }

    fn finished(&self, _nodes: &Nodes) -> PlayState {
        PlayState::Constant
    }

    fn name(&self) -> &'static str {
        "Zero"
    }
}
