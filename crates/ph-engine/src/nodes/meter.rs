//! Level metering tap.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ph_ir::PlayState;

use crate::generator::{Clock, Generator};
use crate::graph::{NodeKey, Nodes, Render};

/// Gaps between observed samples, cycled. Uneven so the meter does not lock
/// onto periodic signals.
const STRIDE: [usize; 4] = [3, 7, 5, 11];

/// Running min/max of a metered signal, shared with readers on any thread.
///
/// Values are stored as `f32` bits. The render thread is the only writer.
#[derive(Debug)]
pub struct MeterTap {
    min: AtomicU32,
    max: AtomicU32,
}

impl MeterTap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            min: AtomicU32::new(0f32.to_bits()),
            max: AtomicU32::new(0f32.to_bits()),
        })
    }

    pub fn min(&self) -> f32 {
        f32::from_bits(self.min.load(Ordering::Relaxed))
    }

    pub fn max(&self) -> f32 {
        f32::from_bits(self.max.load(Ordering::Relaxed))
    }

    /// Largest magnitude seen since the last reset.
    pub fn peak(&self) -> f32 {
        self.max().abs().max(self.min().abs())
    }

    /// Return the peak and reset the tap to silence.
    pub fn take_peak(&self) -> f32 {
        let lo = f32::from_bits(self.min.swap(0f32.to_bits(), Ordering::Relaxed));
        let hi = f32::from_bits(self.max.swap(0f32.to_bits(), Ordering::Relaxed));
        hi.abs().max(lo.abs())
    }

    fn observe(&self, lo: f32, hi: f32) {
        if lo < self.min() {
            self.min.store(lo.to_bits(), Ordering::Relaxed);
        }
        if hi > self.max() {
            self.max.store(hi.to_bits(), Ordering::Relaxed);
        }
    }
}

/// Passes its input through untouched while feeding a [`MeterTap`].
pub struct Meter {
    input: NodeKey,
    tap: Arc<MeterTap>,
    stride_idx: usize,
    /// Samples to skip into the next window before the next observation.
    next: usize,
}

impl Meter {
    pub fn new(input: NodeKey, tap: Arc<MeterTap>) -> Self {
        Self {
            input,
            tap,
            stride_idx: 0,
            next: 0,
        }
    }
}

impl Generator for Meter {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        ctx.accumulate(self.input, out, start, size);

        let window = &out[start..start + size];
        let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
        let mut i = self.next;
        while i < size {
            let s = window[i];
            lo = lo.min(s);
            hi = hi.max(s);
            i += STRIDE[self.stride_idx];
            self.stride_idx = (self.stride_idx + 1) % STRIDE.len();
        }
        self.next = i - size;
        if lo <= hi {
            self.tap.observe(lo, hi);
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.finished(self.input)
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn name(&self) -> &'static str {
        "Meter"
    }
}
