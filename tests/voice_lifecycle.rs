//! Integration test: spawn → start → render → release → reap, through the
//! voice manager and the controller.

use ph_engine::{spawn, EngineConfig, VoiceId, VoiceManager};
use ph_ir::{NodeKind, PatchTemplate, Pitch, Time};
use ph_master::{Controller, NoteSpec};

const SAMPLE_RATE: u32 = 1000;

fn config(max_voices: usize) -> EngineConfig {
    EngineConfig {
        sample_rate: SAMPLE_RATE,
        block_size: 32,
        persistent_len: 256,
        max_voices,
    }
}

/// DC through an ADSR: the rendered block is the envelope itself.
fn adsr_patch() -> PatchTemplate {
    let mut t = PatchTemplate::new("adsr");
    let dc = t.add(NodeKind::Dc { value: 1.0 });
    let env = t.add(NodeKind::Adsr {
        offset: Time::Samples(10),
        attack: Time::Samples(20),
        decay: Time::Samples(20),
        sustain: 0.5,
        release: Time::Samples(40),
    });
    t.connect(env, 0, dc).unwrap();
    t.set_root(env).unwrap();
    t
}

fn start(vm: &mut VoiceManager, template: &PatchTemplate, velocity: f32) -> Option<VoiceId> {
    let params = vm.config().spawn_params(440.0, 2.0, 1.0);
    vm.start_voice(spawn(template, &params), velocity)
}

#[test]
fn adsr_voice_end_to_end() {
    let mut vm = VoiceManager::new(config(2));
    let id = start(&mut vm, &adsr_patch(), 1.0).unwrap();

    let mut held = vec![0.0f32; 100];
    vm.render(&mut held);
    assert!(held[..10].iter().all(|&s| s == 0.0), "offset must be silent");
    assert_eq!(held[10], 0.0);
    assert_eq!(held[30], 1.0);
    assert!(held[10..30].windows(2).all(|w| w[1] > w[0]));
    assert!(held[30..50].windows(2).all(|w| w[1] < w[0]));
    assert!(held[50..].iter().all(|&s| s == 0.5));
    assert!(vm.estimate_master_level() >= 0.5);

    assert!(vm.stop_voice(id, true));
    assert_eq!(vm.releasing_count(), 1);

    let mut fade = vec![0.0f32; 40];
    vm.render(&mut fade);
    assert!(fade.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(fade[39], 0.0);
    assert_eq!(vm.check_finished_releases(), 0, "safety drain still running");

    // One second of silence before the voice reports finished.
    let mut drain = vec![0.0f32; SAMPLE_RATE as usize];
    vm.render(&mut drain);
    assert!(drain.iter().all(|&s| s == 0.0));
    assert_eq!(vm.check_finished_releases(), 1);
    assert_eq!(vm.active_count(), 0);
    assert!(!vm.stop_voice(id, true));
}

#[test]
fn voices_mix_scaled_by_velocity() {
    let mut t = PatchTemplate::new("dc");
    let dc = t.add(NodeKind::Dc { value: 0.5 });
    t.set_root(dc).unwrap();

    let mut vm = VoiceManager::new(config(4));
    start(&mut vm, &t, 1.0).unwrap();
    start(&mut vm, &t, 0.5).unwrap();
    let mut out = vec![9.0f32; 70];
    vm.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.75));
}

#[test]
fn full_manager_steals_oldest_releasing_voice() {
    let patch = adsr_patch();
    let mut vm = VoiceManager::new(config(2));
    let a = start(&mut vm, &patch, 1.0).unwrap();
    let b = start(&mut vm, &patch, 1.0).unwrap();
    assert_eq!(start(&mut vm, &patch, 1.0), None, "no releasing voice to steal");

    vm.stop_voice(b, true);
    vm.stop_voice(a, true);
    let c = start(&mut vm, &patch, 1.0).unwrap();
    assert!(vm.get(b).is_none(), "b released first and was stolen");
    assert!(vm.get(a).is_some());
    assert!(vm.get(c).is_some());
    assert_eq!(vm.channels_created(), 2);
}

#[test]
fn stop_without_release_is_immediate() {
    let mut vm = VoiceManager::new(config(2));
    let id = start(&mut vm, &adsr_patch(), 1.0).unwrap();
    assert!(vm.stop_voice(id, false));
    assert_eq!(vm.active_count(), 0);
    let mut out = vec![1.0f32; 16];
    vm.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));
    assert!(!vm.stop_all());
}

#[test]
fn controller_renders_a_custom_patch() {
    let mut ctl = Controller::new(config(4));
    let mut t = PatchTemplate::new("beep");
    let sine = t.add(NodeKind::Sine { pitch: Pitch::Ratio(1.0), amp: 1.0 });
    let rel = t.add(NodeKind::Release { release: Time::Samples(100) });
    t.connect(rel, 0, sine).unwrap();
    t.set_root(rel).unwrap();
    ctl.add_patch(t);

    let note = NoteSpec { freq: 50.0, velocity: 0.5, hold: 0.2, max_seconds: 5.0 };
    let samples = ctl.render_note("beep", note).unwrap();
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.45 && peak <= 0.5);
    // Hold, fade, then a second of drain, rounded up to whole blocks.
    assert!(samples.len() >= 200 + 100 + 1000);
    assert!(samples.len() < 200 + 100 + 1000 + 32);
    assert!(samples[300..].iter().all(|&s| s == 0.0));
}
