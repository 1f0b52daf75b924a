//! beatline CLI — demo session playback and WAV export.
//!
//! Usage:
//!   beatline
//!   beatline --wav output.wav
//!   beatline --seconds 16

use std::io::Write;
use std::{env, fs};

use bl_core::{Clip, SampleAsset};
use bl_session::{MidiNote, Session};

fn main() {
    let args: Vec<String> = env::args().collect();
    let wav_path = args
        .iter()
        .position(|a| a == "--wav")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let seconds: u32 = args
        .iter()
        .position(|a| a == "--seconds")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);

    let mut session = build_demo_session();
    println!("Tracks:   {}", session.num_tracks());
    println!("Tempo:    {} BPM", session.bpm());
    println!();

    match wav_path {
        Some(wav) => render_to_wav(&mut session, &wav, seconds),
        None => play_audio(&mut session, seconds),
    }
}

/// Two tracks: a synthesized drone sample on one, an arpeggio of MIDI
/// notes on the other.
fn build_demo_session() -> Session {
    let mut session = Session::new();
    session.set_bpm(120.0).expect("engine is local before start");

    let audio = session.add_track("drone").expect("engine is local before start");
    let key = session
        .add_asset(1, SampleAsset::new("drone", 44100, vec![saw_wave(55.0, 44100 * 8)]))
        .expect("engine is local before start");
    session
        .add_clip(audio, Clip::audio(0.0, 16.0, key, 0))
        .expect("engine is local before start");
    session.track(audio).expect("track just added").set_volume(0.4);

    let midi = session.add_track("arp").expect("engine is local before start");
    let mut notes = Vec::new();
    for step in 0..32 {
        let start = step as f64 * 0.5;
        let note = [57u8, 60, 64, 67][step % 4];
        notes.push(MidiNote { start, end: start + 0.45, note, velocity: 100, channel: 0 });
    }
    session
        .add_clip(midi, Clip::midi(0.0, 16.0, notes, Vec::new()))
        .expect("engine is local before start");

    session
}

fn saw_wave(freq: f64, frames: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(frames);
    let period = 44100.0 / freq;
    for i in 0..frames {
        let phase = (i as f64 % period) / period;
        data.push((2.0 * phase - 1.0) as f32 * 0.3);
    }
    data
}

fn play_audio(session: &mut Session, seconds: u32) {
    if let Err(e) = session.start_output() {
        eprintln!("Failed to open audio output: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = session.play() {
        eprintln!("Failed to start playback: {}", e);
        std::process::exit(1);
    }
    println!("Playing...");
    println!();

    let start = std::time::Instant::now();
    while start.elapsed().as_secs() < seconds as u64 {
        let playhead = session.playhead();
        print!("\rBeat: {:7.2} | Bar: {:3}", playhead, (playhead / 4.0) as u32 + 1);
        let _ = std::io::stdout().flush();
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    let _ = session.stop();
    println!("\rDone.                    ");
}

fn render_to_wav(session: &mut Session, path: &str, seconds: u32) {
    let sample_rate: u32 = 44100;
    println!("Rendering to {} at {} Hz...", path, sample_rate);

    let wav = match session.render_to_wav(sample_rate, seconds) {
        Ok(wav) => wav,
        Err(e) => {
            eprintln!("Render failed: {}", e);
            std::process::exit(1);
        }
    };
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });

    println!("Done.");
}
