//! Clip model consumed read-only by the scheduler.

use alloc::vec::Vec;

use crate::asset::AssetKey;

slotmap::new_key_type! {
    /// Key for referencing clips in a track's clip pool.
    pub struct ClipKey;
}

/// A note inside a MIDI clip, times relative to the clip start in beats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MidiNote {
    /// Onset, in beats from clip start
    pub start: f64,
    /// Release, in beats from clip start
    pub end: f64,
    /// MIDI note number (0-127)
    pub note: u8,
    /// Velocity (1-127)
    pub velocity: u8,
    /// MIDI channel (0-15)
    pub channel: u8,
}

/// A control-change point inside a MIDI clip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlPoint {
    /// Position, in beats from clip start
    pub time: f64,
    /// Controller number (0-127)
    pub controller: u8,
    /// Controller value (0-127)
    pub value: u8,
    /// MIDI channel (0-15)
    pub channel: u8,
}

/// Clip payload: either streamed sample data or MIDI content.
#[derive(Clone, Debug)]
pub enum ClipPayload {
    /// References a sample asset, starting `offset` frames in.
    Audio {
        asset: AssetKey,
        /// Intra-sample start offset in frames
        offset: u64,
    },
    /// Note and controller data, both ordered by start time.
    Midi {
        notes: Vec<MidiNote>,
        controls: Vec<ControlPoint>,
    },
}

/// A clip on a track's timeline.
///
/// Immutable from the scheduler's point of view during a render call;
/// `start <= end` always holds.
#[derive(Clone, Debug)]
pub struct Clip {
    /// Timeline start, in beats
    pub start: f64,
    /// Timeline end, in beats
    pub end: f64,
    /// What the clip plays
    pub payload: ClipPayload,
}

impl Clip {
    /// Create an audio clip over `[start, end)` beats.
    pub fn audio(start: f64, end: f64, asset: AssetKey, offset: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end, payload: ClipPayload::Audio { asset, offset } }
    }

    /// Create a MIDI clip over `[start, end)` beats. Notes and controls
    /// must be ordered by start time.
    pub fn midi(start: f64, end: f64, notes: Vec<MidiNote>, controls: Vec<ControlPoint>) -> Self {
        debug_assert!(start <= end);
        debug_assert!(notes.windows(2).all(|w| w[0].start <= w[1].start));
        debug_assert!(controls.windows(2).all(|w| w[0].time <= w[1].time));
        Self { start, end, payload: ClipPayload::Midi { notes, controls } }
    }

    /// Length in beats.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Does the clip cover this beat position?
    pub fn contains(&self, beat: f64) -> bool {
        beat >= self.start && beat < self.end
    }

    /// Is this an audio clip?
    pub fn is_audio(&self) -> bool {
        matches!(self.payload, ClipPayload::Audio { .. })
    }
}
