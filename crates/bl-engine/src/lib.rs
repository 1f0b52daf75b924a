//! Real-time scheduling and rendering engine for beatline.
//!
//! The transport ([`Engine`]) steps a beat-domain playhead in fixed
//! 1/PPQ increments once per audio block, asks every [`Track`] to
//! materialize sample-accurate events for the covered slice, then
//! renders all tracks into the shared output buffer. All control-thread
//! traffic reaches the audio thread through atomics and SPSC rings.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod command;
mod engine;
#[cfg(feature = "std")]
mod record_queue;
mod track;
mod voice;

pub use command::{command_queue, EngineCommand, COMMAND_QUEUE_LEN};
pub use engine::{Engine, EngineError, EngineHandle, EngineShared};
#[cfg(feature = "std")]
pub use record_queue::{
    AudioRecordQueue, RecordConsumer, RecordFormat, RecordProducer,
};
pub use track::{
    BlockContext, RecordingState, Track, TrackHandle, TrackMeter, TrackParams,
    MAX_BLOCK_EVENTS,
};
pub use voice::{MidiVoice, MidiVoiceState, MAX_VOICES};

/// Parameter slot ids for per-track parameter lists.
pub mod param {
    pub const VOLUME: usize = 0;
    pub const PAN: usize = 1;
    pub const MUTE: usize = 2;
    pub const SOLO: usize = 3;
}
