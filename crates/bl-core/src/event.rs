//! Per-block events materialized from the timeline.
//!
//! `Track::process_event` turns the clip timeline into a time-ordered
//! list of these, each tagged with the exact sample offset inside the
//! current block at which it takes effect.

use crate::clip::ClipKey;

/// Start (or continue) streaming an audio clip inside the block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioEvent {
    /// Which clip to stream
    pub clip: ClipKey,
    /// Sample offset inside the block at which streaming starts
    pub buffer_offset: u32,
    /// Frame position within the source asset to start reading at
    pub source_frame: u64,
}

/// What a MIDI event does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MidiEventKind {
    NoteOn { note: u8, velocity: u8, channel: u8 },
    NoteOff { note: u8, channel: u8 },
    ControlChange { controller: u8, value: u8, channel: u8 },
}

/// A sample-accurate MIDI event inside the block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MidiEvent {
    /// Sample offset inside the block
    pub buffer_offset: u32,
    /// Event payload
    pub kind: MidiEventKind,
}

/// An event queued by a track for the current block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackEvent {
    Audio(AudioEvent),
    Midi(MidiEvent),
}

impl TrackEvent {
    /// Sample offset inside the block.
    pub fn buffer_offset(&self) -> u32 {
        match self {
            TrackEvent::Audio(e) => e.buffer_offset,
            TrackEvent::Midi(e) => e.buffer_offset,
        }
    }
}
