//! Control-thread to audio-thread message types.

use crate::params::ParamValue;

/// A message sent from the control thread to one track's audio-side
/// state. Delivered through a bounded SPSC ring and drained by the
/// audio thread once per block, before rendering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackMessage {
    /// Change a track parameter (volume, pan, mute, solo)
    ParamChange { id: u16, value: ParamValue },
    /// Change a hosted plugin parameter
    PluginParamChange { plugin: u32, id: u32, value: f32 },
    /// Note on injected from outside the timeline (live MIDI input)
    MidiNoteOn { note: u8, velocity: u8, channel: u8 },
    /// Note off injected from outside the timeline
    MidiNoteOff { note: u8, channel: u8 },
}
