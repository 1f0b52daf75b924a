//! Beat/sample conversions and the transport grid resolution.
//!
//! The transport steps in fixed `1/PPQ` beat increments, so tempo
//! changes resolve at musically meaningful positions while events
//! still land on exact sample offsets.

/// Pulses per quarter note: the sub-beat grid resolution.
pub const PPQ: u32 = 960;

/// Reciprocal of [`PPQ`], the beat advance of one transport step.
pub const INV_PPQ: f64 = 1.0 / PPQ as f64;

/// Seconds per beat at the given tempo.
pub fn beat_duration(bpm: f64) -> f64 {
    60.0 / bpm
}

/// Convert a beat span to a sample count (not rounded).
pub fn beats_to_samples(beats: f64, beat_duration: f64, sample_rate: f64) -> f64 {
    beats * beat_duration * sample_rate
}

/// Convert a sample span to beats.
pub fn samples_to_beats(samples: f64, beat_duration: f64, sample_rate: f64) -> f64 {
    samples / (beat_duration * sample_rate)
}
