//! Allocation-free render path tests.
//!
//! These tests verify that `Engine::process()` does not allocate once
//! steady state is reached. One warmup block sizes the per-track
//! scratch buffers; after that the render path must stay off the heap
//! through voice churn, clip transitions, and parameter changes.
//!
//! Just run `cargo test` — no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use bl_core::{AudioBuffer, Clip, MidiNote, SampleAsset, TrackMessage};
use bl_engine::{Engine, Track, TrackHandle};

const SAMPLE_RATE: f64 = 44100.0;
const BLOCK: usize = 512;

fn dense_midi_notes() -> Vec<MidiNote> {
    let mut notes = Vec::new();
    for beat in 0..32 {
        for n in 0..4 {
            let start = beat as f64 + n as f64 * 0.25;
            notes.push(MidiNote {
                start,
                end: start + 0.2,
                note: 48 + n as u8 * 5,
                velocity: 100,
                channel: 0,
            });
        }
    }
    notes
}

fn build_engine() -> (Engine, Vec<TrackHandle>) {
    let (mut engine, _) = Engine::new();
    let mut handles = Vec::new();

    let (mut midi, h) = Track::new("midi");
    midi.add_clip(Clip::midi(0.0, 32.0, dense_midi_notes(), Vec::new()));
    engine.add_track(midi).unwrap();
    handles.push(h);

    let (mut audio, h) = Track::new("audio");
    let data: Vec<f32> = (0..44100 * 2).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
    let key = engine
        .sample_table()
        .insert(1, SampleAsset::new("loop", 44100, vec![data.clone(), data]));
    audio.add_clip(Clip::audio(0.0, 16.0, key, 0));
    // Back-to-back clips exercise clip exit and entry mid-render
    audio.add_clip(Clip::audio(16.0, 32.0, key, 0));
    engine.add_track(audio).unwrap();
    handles.push(h);

    (engine, handles)
}

/// Render `blocks` blocks after warmup, aborting on any heap allocation.
fn assert_render_alloc_free(engine: &mut Engine, blocks: usize) {
    let mut out = AudioBuffer::<f32>::new(BLOCK, 2);
    // Warmup block sizes per-track scratch buffers
    engine.process(&mut out, SAMPLE_RATE);

    assert_no_alloc(|| {
        for _ in 0..blocks {
            engine.process(&mut out, SAMPLE_RATE);
        }
    });
}

#[test]
fn playback_alloc_free() {
    let (mut engine, _handles) = build_engine();
    engine.play();
    // ~5 seconds of audio
    assert_render_alloc_free(&mut engine, 44100 * 5 / BLOCK);
}

#[test]
fn stopped_engine_alloc_free() {
    let (mut engine, _handles) = build_engine();
    assert_render_alloc_free(&mut engine, 200);
}

#[test]
fn live_input_and_params_alloc_free() {
    let (mut engine, mut handles) = build_engine();
    engine.play();
    let mut out = AudioBuffer::<f32>::new(BLOCK, 2);
    engine.process(&mut out, SAMPLE_RATE);

    for i in 0..200u32 {
        handles[0].send(TrackMessage::MidiNoteOn {
            note: 60 + (i % 12) as u8,
            velocity: 100,
            channel: 0,
        });
        handles[1].set_volume(0.5 + (i % 10) as f32 * 0.05);
        assert_no_alloc(|| {
            engine.process(&mut out, SAMPLE_RATE);
        });
        handles[0].send(TrackMessage::MidiNoteOff {
            note: 60 + (i % 12) as u8,
            channel: 0,
        });
    }
}
