//! Core types for the beatline engine.
//!
//! This crate defines the data model shared between the real-time
//! scheduler and the control thread: audio buffers, clips, sample
//! assets, atomic parameter state, and cross-thread message types.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod asset;
mod audio_buffer;
mod clip;
mod event;
mod message;
mod params;
pub mod time;

pub use asset::{AssetKey, SampleAsset, SampleTable};
pub use audio_buffer::{AudioBuffer, BUFFER_ALIGN, INLINE_CHANNELS};
pub use clip::{Clip, ClipKey, ClipPayload, ControlPoint, MidiNote};
pub use event::{AudioEvent, MidiEvent, MidiEventKind, TrackEvent};
pub use message::TrackMessage;
pub use params::{AudioParameterList, ParamChange, ParamKind, ParamQueue, ParamValue, PARAM_QUEUE_LEN};
pub use time::{beats_to_samples, samples_to_beats, INV_PPQ, PPQ};
