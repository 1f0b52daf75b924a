//! Polyphonic MIDI voice arena with time-based voice stealing.
//!
//! Fixed-capacity slot array with two explicit index lists (allocated
//! and free) in place of intrusive pointer links. Link and unlink are
//! O(1) pushes/pops; only a steal scans the allocated list.

use bl_core::AudioBuffer;

/// Maximum simultaneous voices per track.
pub const MAX_VOICES: usize = 64;

/// A single synthesizer voice.
#[derive(Clone, Copy, Debug)]
pub struct MidiVoice {
    /// MIDI note number (0-127)
    pub note: u8,
    /// Velocity (1-127)
    pub velocity: u8,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Scheduled release time in beats; `f64::MAX` for live-held notes
    pub max_time: f64,
    /// Oscillator phase accumulator (radians)
    pub phase: f64,
    /// Sample offset inside the current block at which the voice starts
    pub start_offset: u32,
}

impl MidiVoice {
    /// Create a voice sounding from `start_offset` until `max_time`.
    pub fn new(note: u8, velocity: u8, channel: u8, max_time: f64, start_offset: u32) -> Self {
        Self { note, velocity, channel, max_time, phase: 0.0, start_offset }
    }

    /// Oscillator frequency in Hz for the voice's note number.
    pub fn frequency(&self) -> f64 {
        440.0 * libm::exp2((self.note as f64 - 69.0) / 12.0)
    }
}

/// Fixed-capacity polyphonic voice pool.
pub struct MidiVoiceState {
    voices: [MidiVoice; MAX_VOICES],
    /// Indices of in-use slots, in allocation order.
    allocated: heapless::Vec<u8, MAX_VOICES>,
    /// Indices of previously-used, now-free slots.
    free: heapless::Vec<u8, MAX_VOICES>,
    /// Slots never claimed yet (next fresh index).
    high_water: usize,
    /// Conservative lower bound on the smallest allocated `max_time`.
    /// Never recomputed upward outside a steal scan.
    least_maximum_time: f64,
}

impl Default for MidiVoiceState {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiVoiceState {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            voices: [MidiVoice::new(0, 0, 0, 0.0, 0); MAX_VOICES],
            allocated: heapless::Vec::new(),
            free: heapless::Vec::new(),
            high_water: 0,
            least_maximum_time: f64::INFINITY,
        }
    }

    /// Number of voices currently in use.
    pub fn used_voices(&self) -> usize {
        self.allocated.len()
    }

    /// Pool capacity.
    pub fn max_voices(&self) -> usize {
        MAX_VOICES
    }

    /// Claim a slot for `voice`. Returns false, mutating nothing, when
    /// the pool is full.
    pub fn add_voice(&mut self, voice: MidiVoice) -> bool {
        if self.allocated.len() == MAX_VOICES {
            return false;
        }
        let idx = match self.free.pop() {
            Some(i) => i,
            None => {
                let i = self.high_water as u8;
                self.high_water += 1;
                i
            }
        };
        if voice.max_time < self.least_maximum_time {
            self.least_maximum_time = voice.max_time;
        }
        self.voices[idx as usize] = voice;
        // push cannot fail: allocated.len() < MAX_VOICES was checked
        let _ = self.allocated.push(idx);
        true
    }

    /// Release the voice nearest to its natural end among those with
    /// `max_time <= time_range`. Ties break on allocation order.
    ///
    /// Returns `None` without mutating state when no voice qualifies;
    /// the caller then drops the note rather than forcing a steal.
    pub fn release_voice(&mut self, time_range: f64) -> Option<MidiVoice> {
        if self.allocated.is_empty() || time_range < self.least_maximum_time {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (pos, &idx) in self.allocated.iter().enumerate() {
            let mt = self.voices[idx as usize].max_time;
            if mt <= time_range && best.map_or(true, |(_, t)| mt < t) {
                best = Some((pos, mt));
            }
        }
        let (pos, _) = best?;
        let idx = self.allocated.remove(pos);
        // free push cannot fail: a removed index always fits
        let _ = self.free.push(idx);
        self.least_maximum_time = self
            .allocated
            .iter()
            .map(|&i| self.voices[i as usize].max_time)
            .fold(f64::INFINITY, f64::min);
        Some(self.voices[idx as usize])
    }

    /// Return every allocated voice to the free list. Used on
    /// transport stop and seek.
    pub fn release_all(&mut self) {
        while let Some(idx) = self.allocated.pop() {
            let _ = self.free.push(idx);
        }
        self.least_maximum_time = f64::INFINITY;
    }

    /// Iterate allocated voices in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &MidiVoice> {
        self.allocated.iter().map(move |&i| &self.voices[i as usize])
    }

    /// Mark a live-held voice (matching note and channel) for release
    /// at `time`. Returns true if a voice matched.
    pub fn schedule_note_off(&mut self, note: u8, channel: u8, time: f64) -> bool {
        for &idx in self.allocated.iter() {
            let v = &mut self.voices[idx as usize];
            if v.note == note && v.channel == channel && v.max_time > time {
                v.max_time = time;
                if time < self.least_maximum_time {
                    self.least_maximum_time = time;
                }
                return true;
            }
        }
        false
    }

    /// Render all allocated voices additively into both channels of
    /// `out` over their per-block spans, then reset start offsets for
    /// the next block.
    pub fn render(
        &mut self,
        out: &mut AudioBuffer<f32>,
        block_start: f64,
        beat_duration: f64,
        sample_rate: f64,
    ) {
        let frames = out.frames();
        for &idx in self.allocated.iter() {
            let voice = &mut self.voices[idx as usize];
            let start = (voice.start_offset as usize).min(frames);
            let end = if voice.max_time == f64::MAX {
                frames
            } else {
                let off = (voice.max_time - block_start) * beat_duration * sample_rate;
                (off.round().max(0.0) as usize).min(frames)
            };
            if end <= start {
                voice.start_offset = 0;
                continue;
            }
            let amp = voice.velocity as f64 / 127.0 * 0.25;
            let step = core::f64::consts::TAU * voice.frequency() / sample_rate;
            let mut phase = voice.phase;
            for i in start..end {
                let s = (libm::sin(phase) * amp) as f32;
                out.channel_mut(0)[i] += s;
                out.channel_mut(1)[i] += s;
                phase += step;
            }
            voice.phase = phase % core::f64::consts::TAU;
            voice.start_offset = 0;
        }
    }
}
