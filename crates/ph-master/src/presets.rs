//! Built-in demo patches.

use ph_ir::{ClampMode, NodeKind, PatchError, PatchTemplate, Pitch, Time};

/// Every built-in patch, in listing order.
pub fn all() -> Result<Vec<PatchTemplate>, PatchError> {
    Ok(vec![pluck()?, pad()?, echo()?, looper()?, noise_hat()?])
}

/// Sawtooth with a fast decay to silence.
pub fn pluck() -> Result<PatchTemplate, PatchError> {
    let mut t = PatchTemplate::new("pluck");
    let saw = t.add(NodeKind::Sawtooth { pitch: Pitch::Ratio(1.0), amp: 0.6 });
    let decay = t.add(NodeKind::LinearDecay {
        offset: Time::ZERO,
        duration: Time::Seconds(0.4),
        sustain: 0.0,
    });
    let release = t.add(NodeKind::Release { release: Time::Seconds(0.05) });
    t.connect(decay, 0, saw)?;
    t.connect(release, 0, decay)?;
    t.set_root(release)?;
    Ok(t)
}

/// Detuned saws and a sub triangle, softened and enveloped.
pub fn pad() -> Result<PatchTemplate, PatchError> {
    let mut t = PatchTemplate::new("pad");
    let mix = t.add(NodeKind::Batch);
    for pitch in [Pitch::Ratio(1.0), Pitch::Ratio(1.005)] {
        let saw = t.add(NodeKind::Sawtooth { pitch, amp: 0.5 });
        t.push_input(mix, saw)?;
    }
    let sub = t.add(NodeKind::Triangle { pitch: Pitch::Ratio(0.5), amp: 0.5 });
    t.push_input(mix, sub)?;
    let smear = t.add(NodeKind::Smear { window: Time::Samples(4) });
    let env = t.add(NodeKind::Adsr {
        offset: Time::ZERO,
        attack: Time::Seconds(0.3),
        decay: Time::Seconds(0.5),
        sustain: 0.7,
        release: Time::Seconds(1.0),
    });
    t.connect(smear, 0, mix)?;
    t.connect(env, 0, smear)?;
    t.set_root(env)?;
    Ok(t)
}

/// A short blip repeated by a four-tap delay on the half beat.
pub fn echo() -> Result<PatchTemplate, PatchError> {
    let mut t = PatchTemplate::new("echo");
    let sine = t.add(NodeKind::Sine { pitch: Pitch::Ratio(1.0), amp: 0.6 });
    let env = t.add(NodeKind::Adsr {
        offset: Time::ZERO,
        attack: Time::Seconds(0.005),
        decay: Time::Seconds(0.15),
        sustain: 0.0,
        release: Time::Seconds(0.05),
    });
    let delay = t.add(NodeKind::Delay {
        voices: 4,
        offset: Time::Beats(0.5),
        dampen: 0.5,
    });
    t.connect(env, 0, sine)?;
    t.connect(delay, 0, env)?;
    t.set_root(delay)?;
    Ok(t)
}

/// A gated saw, stuttered, then recorded into a one-beat loop.
pub fn looper() -> Result<PatchTemplate, PatchError> {
    let mut t = PatchTemplate::new("loop");
    let saw = t.add(NodeKind::Sawtooth { pitch: Pitch::Ratio(1.0), amp: 0.5 });
    let lfo = t.add(NodeKind::Square { pitch: Pitch::Fixed(4.0), amp: 1.0, duty: 0.5 });
    let gate = t.add(NodeKind::Clamp { mode: ClampMode::Pos });
    let gated = t.add(NodeKind::Mul);
    let stutter = t.add(NodeKind::Stutter { segment: Time::Beats(0.125), repeats: 2 });
    let cycle = t.add(NodeKind::Cycle { offset: Time::Beats(0.5), record: Time::Beats(1.0) });
    let env = t.add(NodeKind::Adsr {
        offset: Time::ZERO,
        attack: Time::Seconds(0.01),
        decay: Time::ZERO,
        sustain: 1.0,
        release: Time::Seconds(0.2),
    });
    t.connect(gate, 0, lfo)?;
    t.connect(gated, 0, saw)?;
    t.connect(gated, 1, gate)?;
    t.connect(stutter, 0, gated)?;
    t.connect(cycle, 0, stutter)?;
    t.connect(env, 0, cycle)?;
    t.set_root(env)?;
    Ok(t)
}

/// Noise burst, pitch-independent.
pub fn noise_hat() -> Result<PatchTemplate, PatchError> {
    let mut t = PatchTemplate::new("noise-hat");
    let noise = t.add(NodeKind::WhiteNoise { amp: 0.4 });
    let decay = t.add(NodeKind::LinearDecay {
        offset: Time::ZERO,
        duration: Time::Seconds(0.08),
        sustain: 0.0,
    });
    let release = t.add(NodeKind::Release { release: Time::Seconds(0.02) });
    t.connect(decay, 0, noise)?;
    t.connect(release, 0, decay)?;
    t.set_root(release)?;
    Ok(t)
}
