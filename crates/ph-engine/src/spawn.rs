//! Instantiating graphs from patch templates.

use ph_ir::{NodeKind, PatchTemplate, SpawnParams, TemplateKey};

use crate::graph::{Graph, NodeKey};
use crate::nodes::{
    Adsr, AdsrTimes, Amplify, Add, Batch, Binary, Cycle, Dc, Delay, Lerp, LinearAttack, LinearDecay, Mad,
    Oscillator, Release, Shaper, Smear, Stutter, WhiteNoise, Zero,
};

/// Build an independent graph instance of `template` for one voice.
///
/// Every time parameter is resolved to samples here, once. Unconnected
/// inputs and dangling template keys become [`Zero`]. A template node
/// feeding several parents is instantiated once per parent edge: every
/// graph node then has a single puller, so its clock advances once per
/// window and each parent hears the same samples. The root is scaled by
/// `params.amplitude`.
pub fn spawn(template: &PatchTemplate, params: &SpawnParams) -> Graph {
    let mut graph = Graph::new(params.sample_rate);
    let root = match template.root() {
        Some(root) => build(template, root, params, &mut graph),
        None => graph.insert(Zero),
    };
    graph.set_root(root);
    if params.amplitude != 1.0 {
        graph.wrap_root(|r| Amplify::new(r, params.amplitude));
    }
    graph
}

fn build(
    template: &PatchTemplate,
    key: TemplateKey,
    params: &SpawnParams,
    graph: &mut Graph,
) -> NodeKey {
    let Some(def) = template.node(key) else {
        return graph.insert(Zero);
    };

    let mut inputs: Vec<NodeKey> = def
        .inputs
        .iter()
        .map(|input| match input {
            Some(child) => build(template, *child, params, graph),
            None => graph.insert(Zero),
        })
        .collect();
    if let Some(n) = def.kind.input_count() {
        while inputs.len() < n {
            inputs.push(graph.insert(Zero));
        }
    }

    let sr = params.sample_rate;
    let freq = params.freq;
    let samples = |t: ph_ir::Time| t.to_samples(params);
    match &def.kind {
        NodeKind::Sine { pitch, amp } => graph.insert(Oscillator::sine(pitch.to_hz(freq), *amp)),
        NodeKind::Square { pitch, amp, duty } => {
            graph.insert(Oscillator::square(pitch.to_hz(freq), *amp, *duty))
        }
        NodeKind::Sawtooth { pitch, amp } => graph.insert(Oscillator::sawtooth(pitch.to_hz(freq), *amp)),
        NodeKind::Triangle { pitch, amp } => graph.insert(Oscillator::triangle(pitch.to_hz(freq), *amp)),
        NodeKind::WhiteNoise { amp } => graph.insert(WhiteNoise::new(*amp)),
        NodeKind::Dc { value } => graph.insert(Dc::new(*value)),
        NodeKind::Zero => graph.insert(Zero),

        NodeKind::Add => graph.insert(Add::new(inputs)),
        NodeKind::Batch => graph.insert(Batch::normalized(inputs)),
        NodeKind::Min => graph.insert(Binary::min(inputs[0], inputs[1])),
        NodeKind::Max => graph.insert(Binary::max(inputs[0], inputs[1])),
        NodeKind::Mul => graph.insert(Binary::mul(inputs[0], inputs[1])),
        NodeKind::Amplify { gain } => graph.insert(Amplify::new(inputs[0], *gain)),
        NodeKind::Mad => graph.insert(Mad::new(inputs[0], inputs[1], inputs[2])),
        NodeKind::Cube => graph.insert(Shaper::cube(inputs[0])),
        NodeKind::Lerp => graph.insert(Lerp::new(inputs[0], inputs[1], inputs[2])),
        NodeKind::Clamp { mode } => graph.insert(Shaper::clamp(inputs[0], *mode)),
        NodeKind::Invert => graph.insert(Shaper::invert(inputs[0])),

        NodeKind::LinearAttack { offset, attack } => {
            graph.insert(LinearAttack::new(inputs[0], samples(*offset), samples(*attack)))
        }
        NodeKind::LinearDecay { offset, duration, sustain } => graph.insert(LinearDecay::new(
            inputs[0],
            samples(*offset),
            samples(*duration),
            *sustain,
            sr,
        )),
        NodeKind::Adsr { offset, attack, decay, sustain, release } => {
            let times = AdsrTimes {
                offset: samples(*offset),
                attack: samples(*attack),
                decay: samples(*decay),
                sustain: *sustain,
                release: samples(*release),
            };
            graph.insert(Adsr::new(inputs[0], times, sr))
        }
        NodeKind::Release { release } => graph.insert(Release::new(inputs[0], samples(*release), sr)),

        NodeKind::Delay { voices, offset, dampen } => {
            graph.insert(Delay::new(inputs[0], *voices, samples(*offset), *dampen))
        }
        NodeKind::Cycle { offset, record } => {
            graph.insert(Cycle::new(inputs[0], samples(*offset), samples(*record)))
        }
        NodeKind::Smear { window } => graph.insert(Smear::new(inputs[0], samples(*window))),
        NodeKind::Stutter { segment, repeats } => {
            graph.insert(Stutter::new(inputs[0], samples(*segment), *repeats))
        }
    }
}
