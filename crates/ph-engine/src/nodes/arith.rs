//! Arithmetic combinators.
//!
//! The first input is always pulled straight into the output window; any
//! further inputs go through scratch buffers one block at a time.

use ph_ir::{ClampMode, PlayState};

use crate::generator::{Clock, Generator};
use crate::graph::{blocks, NodeKey, Nodes, Render};

/// Sum of any number of inputs.
pub struct Add {
    inputs: Vec<NodeKey>,
}

impl Add {
    pub fn new(inputs: Vec<NodeKey>) -> Self {
        Self { inputs }
    }
}

impl Generator for Add {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        let Some((&first, rest)) = self.inputs.split_first() else {
            out[start..start + size].fill(0.0);
            return;
        };
        ctx.accumulate(first, out, start, size);
        let pool = ctx.pool();
        for &input in rest {
            for (at, len) in blocks(start, size, ctx.block_size()) {
                let mut scratch = pool.scratch();
                ctx.accumulate(input, &mut scratch, 0, len);
                for (o, s) in out[at..at + len].iter_mut().zip(scratch.iter()) {
                    *o += *s;
                }
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.resolve(&self.inputs)
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.extend_from_slice(&self.inputs);
    }

    fn name(&self) -> &'static str {
        "Add"
    }
}

/// Mix of any number of inputs, each with its own gain.
pub struct Batch {
    inputs: Vec<NodeKey>,
    gains: Vec<f32>,
}

impl Batch {
    pub fn new(inputs: Vec<(NodeKey, f32)>) -> Self {
        let (inputs, gains) = inputs.into_iter().unzip();
        Self { inputs, gains }
    }

    /// Equal-weight mix that keeps the sum of gains at one.
    pub fn normalized(inputs: Vec<NodeKey>) -> Self {
        let gain = 1.0 / inputs.len().max(1) as f32;
        Self::new(inputs.into_iter().map(|k| (k, gain)).collect())
    }
}

impl Generator for Batch {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        out[start..start + size].fill(0.0);
        let pool = ctx.pool();
        for (&input, &gain) in self.inputs.iter().zip(&self.gains) {
            for (at, len) in blocks(start, size, ctx.block_size()) {
                let mut scratch = pool.scratch();
                ctx.accumulate(input, &mut scratch, 0, len);
                for (o, s) in out[at..at + len].iter_mut().zip(scratch.iter()) {
                    *o += *s * gain;
                }
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.resolve(&self.inputs)
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.extend_from_slice(&self.inputs);
    }

    fn name(&self) -> &'static str {
        "Batch"
    }
}

/// Sample-wise operation of a [`Binary`] node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Min,
    Max,
    Mul,
}

impl BinaryOp {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::Mul => a * b,
        }
    }
}

/// Two inputs combined sample by sample.
pub struct Binary {
    op: BinaryOp,
    a: NodeKey,
    b: NodeKey,
}

impl Binary {
    pub fn new(op: BinaryOp, a: NodeKey, b: NodeKey) -> Self {
        Self { op, a, b }
    }

    pub fn min(a: NodeKey, b: NodeKey) -> Self {
        Self::new(BinaryOp::Min, a, b)
    }

    pub fn max(a: NodeKey, b: NodeKey) -> Self {
        Self::new(BinaryOp::Max, a, b)
    }

    pub fn mul(a: NodeKey, b: NodeKey) -> Self {
        Self::new(BinaryOp::Mul, a, b)
    }
}

impl Generator for Binary {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        ctx.accumulate(self.a, out, start, size);
        let pool = ctx.pool();
        for (at, len) in blocks(start, size, ctx.block_size()) {
            let mut b = pool.scratch();
            ctx.accumulate(self.b, &mut b, 0, len);
            for (o, s) in out[at..at + len].iter_mut().zip(b.iter()) {
                *o = self.op.apply(*o, *s);
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.resolve(&[self.a, self.b])
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.extend([self.a, self.b]);
    }

    fn name(&self) -> &'static str {
        match self.op {
            BinaryOp::Min => "Min",
            BinaryOp::Max => "Max",
            BinaryOp::Mul => "Mul",
        }
    }
}

/// `a * b + c`
pub struct Mad {
    a: NodeKey,
    b: NodeKey,
    c: NodeKey,
}

impl Mad {
    pub fn new(a: NodeKey, b: NodeKey, c: NodeKey) -> Self {
        Self { a, b, c }
    }
}

impl Generator for Mad {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        ctx.accumulate(self.a, out, start, size);
        let pool = ctx.pool();
        for (at, len) in blocks(start, size, ctx.block_size()) {
            let mut b = pool.scratch();
            let mut c = pool.scratch();
            ctx.accumulate(self.b, &mut b, 0, len);
            ctx.accumulate(self.c, &mut c, 0, len);
            for (i, o) in out[at..at + len].iter_mut().enumerate() {
                *o = *o * b[i] + c[i];
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.resolve(&[self.a, self.b, self.c])
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.extend([self.a, self.b, self.c]);
    }

    fn name(&self) -> &'static str {
        "MAD"
    }
}

/// `a + (b - a) * t`
pub struct Lerp {
    a: NodeKey,
    b: NodeKey,
    t: NodeKey,
}

impl Lerp {
    pub fn new(a: NodeKey, b: NodeKey, t: NodeKey) -> Self {
        Self { a, b, t }
    }
}

impl Generator for Lerp {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        ctx.accumulate(self.a, out, start, size);
        let pool = ctx.pool();
        for (at, len) in blocks(start, size, ctx.block_size()) {
            let mut b = pool.scratch();
            let mut t = pool.scratch();
            ctx.accumulate(self.b, &mut b, 0, len);
            ctx.accumulate(self.t, &mut t, 0, len);
            for (i, o) in out[at..at + len].iter_mut().enumerate() {
                *o += (b[i] - *o) * t[i];
            }
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.resolve(&[self.a, self.b, self.t])
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.extend([self.a, self.b, self.t]);
    }

    fn name(&self) -> &'static str {
        "Lerp"
    }
}

/// Input scaled by a fixed gain.
pub struct Amplify {
    input: NodeKey,
    gain: f32,
}

impl Amplify {
    pub fn new(input: NodeKey, gain: f32) -> Self {
        Self { input, gain }
    }
}

impl Generator for Amplify {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        ctx.accumulate(self.input, out, start, size);
        for s in &mut out[start..start + size] {
            *s *= self.gain;
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.finished(self.input)
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn name(&self) -> &'static str {
        "Amp"
    }
}

/// Sample-wise shaping of a single input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeOp {
    /// `x^3`
    Cube,
    Clamp(ClampMode),
    /// `-x`
    Invert,
}

/// One input passed through a [`ShapeOp`].
pub struct Shaper {
    input: NodeKey,
    op: ShapeOp,
}

impl Shaper {
    pub fn new(input: NodeKey, op: ShapeOp) -> Self {
        Self { input, op }
    }

    pub fn cube(input: NodeKey) -> Self {
        Self::new(input, ShapeOp::Cube)
    }

    pub fn clamp(input: NodeKey, mode: ClampMode) -> Self {
        Self::new(input, ShapeOp::Clamp(mode))
    }

    pub fn invert(input: NodeKey) -> Self {
        Self::new(input, ShapeOp::Invert)
    }
}

impl Generator for Shaper {
    fn accumulate_impl(&mut self, _: &Clock, ctx: &mut Render<'_>, out: &mut [f32], start: usize, size: usize) {
        ctx.accumulate(self.input, out, start, size);
        let window = &mut out[start..start + size];
        match self.op {
            ShapeOp::Cube => window.iter_mut().for_each(|s| *s = *s * *s * *s),
            ShapeOp::Clamp(mode) => {
                let (lo, hi) = mode.bounds();
                window.iter_mut().for_each(|s| *s = s.clamp(lo, hi));
            }
            ShapeOp::Invert => window.iter_mut().for_each(|s| *s = -*s),
        }
    }

    fn finished(&self, nodes: &Nodes) -> PlayState {
        nodes.finished(self.input)
    }

    fn report_children(&self, children: &mut Vec<NodeKey>) {
        children.push(self.input);
    }

    fn name(&self) -> &'static str {
        match self.op {
            ShapeOp::Cube => "Cube",
            ShapeOp::Clamp(_) => "Clamp",
            ShapeOp::Invert => "Invert",
        }
    }
}
