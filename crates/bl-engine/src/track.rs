//! Track: timeline to per-block events, and event rendering.
//!
//! A track owns its clips in a pooled allocator, keeps a persistent
//! playback cursor so rendering resumes correctly across blocks, and
//! exchanges control messages with the non-real-time thread through an
//! SPSC ring plus atomic parameter slots. Clip removals are staged in
//! `deleted_clips` until the audio thread has published a later frame
//! counter, so an in-flight render never loses its source.

use alloc::sync::Arc;
use alloc::vec::Vec;
use arrayvec::ArrayString;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bl_core::{
    AudioBuffer, AudioEvent, Clip, ClipKey, ClipPayload, MidiEvent, MidiEventKind, ParamChange,
    ParamQueue, ParamValue, SampleTable, TrackEvent, TrackMessage,
};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use slotmap::SlotMap;

use crate::param;
use crate::voice::{MidiVoice, MidiVoiceState};

/// Capacity of the per-block event list.
pub const MAX_BLOCK_EVENTS: usize = 1024;

/// Capacity of the control-to-track message ring.
const MSG_QUEUE_LEN: usize = 256;

/// Spin bound for the control-side blocking push.
const MAX_PUSH_SPINS: u32 = 1 << 20;

/// One audio block as seen by every track.
#[derive(Clone, Copy, Debug)]
pub struct BlockContext {
    /// Playhead at block start, in beats
    pub block_start: f64,
    /// Playhead at block end, in beats
    pub block_end: f64,
    /// Engine sample counter at block start
    pub sample_position: u64,
    /// Seconds per beat for this block (fixed mid-block)
    pub beat_duration: f64,
    /// Device sample rate
    pub sample_rate: f64,
    /// Samples in this block
    pub frames: usize,
}

impl BlockContext {
    /// Sample offset of a beat position inside this block, clamped to
    /// the block bounds.
    pub fn offset_of(&self, beat: f64) -> u32 {
        let off = (beat - self.block_start) * self.beat_duration * self.sample_rate;
        (off.round().max(0.0) as usize).min(self.frames) as u32
    }
}

/// Audio-side snapshot of the automatable track parameters.
#[derive(Clone, Copy, Debug)]
pub struct TrackParams {
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self { volume: 1.0, pan: 0.0, mute: false, solo: false }
    }
}

impl TrackParams {
    /// Left/right channel gains under the given solo state.
    fn channel_gains(&self, any_solo: bool) -> (f32, f32) {
        let audible = !self.mute && (!any_solo || self.solo);
        let gain = if audible { self.volume } else { 0.0 };
        (gain * (1.0 - self.pan.max(0.0)), gain * (1.0 + self.pan.min(0.0)))
    }
}

/// Peak meter published by the audio thread, polled by the UI.
#[derive(Default)]
pub struct TrackMeter(AtomicU32);

impl TrackMeter {
    fn store(&self, peak: f32) {
        self.0.store(peak.to_bits(), Ordering::Relaxed);
    }

    /// Last published peak level.
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Bookkeeping for an in-progress capture session. The samples
/// themselves travel through the record queue, not through the track.
#[derive(Clone, Copy, Debug)]
pub struct RecordingState {
    pub session_id: u64,
    pub buffer_id: u32,
    /// Capture range in beats
    pub start: f64,
    pub end: f64,
    pub frames_written: u64,
}

/// Persistent playback cursor; survives across blocks so playback
/// resumes correctly after a seek or stop.
#[derive(Clone, Copy, Debug, Default)]
struct EventState {
    /// Clip currently sounding. A key, not an `order` index, so
    /// timeline edits cannot re-point it at a different clip.
    current: Option<ClipKey>,
    /// Search hint for `find_next_clip`
    hint: Option<usize>,
    /// Start beat of the last entered clip
    last_clip_start: f64,
    /// Next unplayed note in the current MIDI clip
    midi_cursor: usize,
    /// Next unplayed control point in the current MIDI clip
    control_cursor: usize,
    /// The current clip ended mid-block
    partially_ended: bool,
}

/// A track on the timeline.
pub struct Track {
    /// Track name
    pub name: ArrayString<32>,
    /// UI color (0xRRGGBB)
    pub color: u32,
    clips: SlotMap<ClipKey, Clip>,
    /// Clip keys ordered by start time
    order: Vec<ClipKey>,
    /// Retired clips, tagged with the frame counter at removal
    deleted_clips: Vec<(Clip, u64)>,
    event_state: EventState,
    voices: MidiVoiceState,
    /// Audio-side parameter copy, the only one consulted in rendering
    params: TrackParams,
    /// UI-side atomic parameter slots
    ui_params: Arc<bl_core::AudioParameterList>,
    msg_rx: HeapCons<TrackMessage>,
    /// Plugin parameter changes staged for the hosted-plugin seam
    plugin_changes: heapless::Vec<(u32, u32, f32), 32>,
    /// Sub-block automation scheduled for this block, in offset order
    param_queue: ParamQueue,
    events: heapless::Vec<TrackEvent, MAX_BLOCK_EVENTS>,
    /// Scratch render buffer, reused every block
    effect_buffer: AudioBuffer<f32>,
    meter: Arc<TrackMeter>,
    recording: Option<RecordingState>,
}

/// Control-thread handle to a track: parameter setters and message
/// injection. The audio side never sees this type.
pub struct TrackHandle {
    params: Arc<bl_core::AudioParameterList>,
    msg_tx: HeapProd<TrackMessage>,
    meter: Arc<TrackMeter>,
    /// Spin-bound overruns on `send` (monitoring only)
    contention: Arc<AtomicU64>,
}

impl Track {
    /// Create a track and its control-thread handle.
    pub fn new(name: &str) -> (Self, TrackHandle) {
        use bl_core::ParamKind;
        let ui_params = Arc::new(bl_core::AudioParameterList::new(&[
            ParamKind::F32, // volume
            ParamKind::F32, // pan
            ParamKind::U32, // mute
            ParamKind::U32, // solo
        ]));
        ui_params.set_f32(param::VOLUME, 1.0);
        let (msg_tx, msg_rx) = HeapRb::<TrackMessage>::new(MSG_QUEUE_LEN).split();
        let meter = Arc::new(TrackMeter::default());

        let mut n = ArrayString::new();
        let _ = n.try_push_str(name);
        let mut track = Self {
            name: n,
            color: 0x808080,
            clips: SlotMap::with_key(),
            order: Vec::new(),
            deleted_clips: Vec::new(),
            event_state: EventState::default(),
            voices: MidiVoiceState::new(),
            params: TrackParams::default(),
            ui_params: ui_params.clone(),
            msg_rx,
            plugin_changes: heapless::Vec::new(),
            param_queue: ParamQueue::new(),
            events: heapless::Vec::new(),
            effect_buffer: AudioBuffer::new(0, 2),
            meter: meter.clone(),
            recording: None,
        };
        track.sync_params();
        let handle = TrackHandle {
            params: ui_params,
            msg_tx,
            meter,
            contention: Arc::new(AtomicU64::new(0)),
        };
        (track, handle)
    }

    // --- Clip management (control-thread; serialized with the audio
    // thread through the engine command queue) ---

    /// Insert a clip, keeping the start-time ordering invariant.
    pub fn add_clip(&mut self, clip: Clip) -> ClipKey {
        let start = clip.start;
        let key = self.clips.insert(clip);
        let pos = self
            .order
            .partition_point(|&k| self.clips[k].start <= start);
        self.order.insert(pos, key);
        key
    }

    /// Retire a clip. The clip value is staged until the audio thread
    /// publishes a frame counter past `retire_frame`.
    pub fn remove_clip(&mut self, key: ClipKey, retire_frame: u64) -> bool {
        let Some(clip) = self.clips.remove(key) else {
            return false;
        };
        self.order.retain(|&k| k != key);
        self.deleted_clips.push((clip, retire_frame));
        self.event_state.hint = None;
        if self.event_state.current == Some(key) {
            self.event_state.current = None;
        }
        true
    }

    /// Drop retired clips the audio thread has provably moved past.
    pub fn reclaim(&mut self, published_frame: u64) {
        self.deleted_clips.retain(|&(_, frame)| frame >= published_frame);
    }

    /// Number of clips on the timeline.
    pub fn num_clips(&self) -> usize {
        self.order.len()
    }

    /// Retired clips not yet reclaimed (monitoring/tests).
    pub fn pending_reclaim(&self) -> usize {
        self.deleted_clips.len()
    }

    /// Look up a clip by key.
    pub fn clip(&self, key: ClipKey) -> Option<&Clip> {
        self.clips.get(key)
    }

    // --- Playback state ---

    /// Earliest clip (by timeline order) whose end lies after `beat`:
    /// the clip covering `beat` if one does, else the next clip by
    /// start time, else `None`.
    pub fn find_next_clip(&self, beat: f64) -> Option<usize> {
        // Hinted fast path: the cursor usually moves forward one clip
        // at a time.
        if let Some(h) = self.event_state.hint {
            if h < self.order.len()
                && self.clips[self.order[h]].end > beat
                && (h == 0 || self.clips[self.order[h - 1]].end <= beat)
            {
                return Some(h);
            }
        }
        let idx = self
            .order
            .partition_point(|&k| self.clips[k].end <= beat);
        (idx < self.order.len()).then_some(idx)
    }

    /// Reset the playback cursor and voice pool for playback from
    /// `beat`. Called on seek, stop, and play.
    pub fn reset_playback_state(&mut self, _beat: f64) {
        self.event_state = EventState::default();
        self.voices.release_all();
    }

    /// Prime the track for playback starting at `beat`.
    pub fn prepare_play(&mut self, beat: f64) {
        self.reset_playback_state(beat);
    }

    /// Force-release every active voice (transport stop/seek).
    pub fn kill_all_voices(&mut self) {
        self.voices.release_all();
    }

    /// Audio-side parameter snapshot.
    pub fn params(&self) -> TrackParams {
        self.params
    }

    // --- Block processing (audio thread) ---

    /// Start a block: clear the event list, drain control messages,
    /// reclaim expired voices, and re-emit the continuation event for
    /// a clip still sounding from the previous block.
    pub fn begin_block(&mut self, ctx: &BlockContext, playing: bool) {
        self.events.clear();
        self.plugin_changes.clear();
        self.param_queue.clear();
        self.sync_params();

        // Voices fully rendered in earlier blocks go back to the pool,
        // each emitting its note-off once the tail has finished
        // sounding.
        loop {
            match self.voices.release_voice(ctx.block_start) {
                Some(v) => self.push_event(TrackEvent::Midi(MidiEvent {
                    buffer_offset: 0,
                    kind: MidiEventKind::NoteOff { note: v.note, channel: v.channel },
                })),
                None => break,
            }
        }

        self.process_track_messages(ctx);

        if !playing {
            return;
        }
        if let Some(key) = self.event_state.current {
            let Some(clip) = self.clips.get(key) else {
                self.event_state.current = None;
                return;
            };
            if let ClipPayload::Audio { offset, .. } = &clip.payload {
                let into_clip =
                    (ctx.block_start - clip.start) * ctx.beat_duration * ctx.sample_rate;
                self.push_event(TrackEvent::Audio(AudioEvent {
                    clip: key,
                    buffer_offset: 0,
                    source_frame: *offset + into_clip.round().max(0.0) as u64,
                }));
            }
        }
    }

    /// Drain the message ring into audio-side state. The only path by
    /// which control-thread intent reaches rendering.
    fn process_track_messages(&mut self, ctx: &BlockContext) {
        while let Some(msg) = self.msg_rx.try_pop() {
            match msg {
                TrackMessage::ParamChange { id, value } => self.apply_param(id as usize, value),
                TrackMessage::PluginParamChange { plugin, id, value } => {
                    let _ = self.plugin_changes.push((plugin, id, value));
                }
                TrackMessage::MidiNoteOn { note, velocity, channel } => {
                    if self.voices.add_voice(MidiVoice::new(note, velocity, channel, f64::MAX, 0)) {
                        self.push_event(TrackEvent::Midi(MidiEvent {
                            buffer_offset: 0,
                            kind: MidiEventKind::NoteOn { note, velocity, channel },
                        }));
                    }
                }
                TrackMessage::MidiNoteOff { note, channel } => {
                    // Silenced immediately; the note-off event follows
                    // from the reclaim pass next block.
                    self.voices.schedule_note_off(note, channel, ctx.block_start);
                }
            }
        }
    }

    /// Pull UI parameter slots into the audio-side copy.
    fn sync_params(&mut self) {
        let ui = self.ui_params.clone();
        ui.flush_if_updated(|id, value| self.apply_param(id, value));
    }

    fn apply_param(&mut self, id: usize, value: ParamValue) {
        match (id, value) {
            (param::VOLUME, ParamValue::F32(v)) => self.params.volume = v.max(0.0),
            (param::PAN, ParamValue::F32(v)) => self.params.pan = v.clamp(-1.0, 1.0),
            (param::MUTE, ParamValue::U32(v)) => self.params.mute = v != 0,
            (param::SOLO, ParamValue::U32(v)) => self.params.solo = v != 0,
            _ => {}
        }
    }

    fn push_event(&mut self, event: TrackEvent) {
        // A full list drops the event; the block must never be dropped.
        let _ = self.events.push(event);
    }

    /// Materialize events for the transport slice `[start, end)`.
    /// Called once per 1/PPQ step by the engine.
    ///
    /// The loop lets a clip end and its successor start inside one
    /// slice; the handoff offset comes from the shared boundary beat,
    /// so butted clips stay gapless.
    pub fn process_event(&mut self, start: f64, end: f64, ctx: &BlockContext) {
        let mut cursor = start;
        loop {
            if self.event_state.current.is_none() {
                let Some(i) = self.find_next_clip(cursor) else {
                    break;
                };
                let key = self.order[i];
                let clip = &self.clips[key];
                if clip.start >= end {
                    break;
                }
                let entry = clip.start.max(cursor);
                self.event_state.current = Some(key);
                self.event_state.hint = Some(i);
                self.event_state.last_clip_start = clip.start;
                self.event_state.midi_cursor = 0;
                self.event_state.control_cursor = 0;
                self.event_state.partially_ended = false;
                if let ClipPayload::Audio { offset, .. } = &clip.payload {
                    let into_clip = (entry - clip.start) * ctx.beat_duration * ctx.sample_rate;
                    let event = AudioEvent {
                        clip: key,
                        buffer_offset: ctx.offset_of(entry),
                        source_frame: *offset + into_clip.round().max(0.0) as u64,
                    };
                    self.push_event(TrackEvent::Audio(event));
                }
            }

            self.process_clip_midi(start, end, ctx);

            // Leave a clip whose end falls inside (or before) this
            // slice, then try the next clip at the boundary.
            let Some(key) = self.event_state.current else {
                break;
            };
            match self.clips.get(key) {
                Some(clip) if clip.end <= end => {
                    self.event_state.partially_ended =
                        (ctx.offset_of(clip.end) as usize) < ctx.frames;
                    cursor = clip.end.max(cursor);
                    self.event_state.current = None;
                }
                Some(_) => break,
                None => self.event_state.current = None,
            }
        }
    }

    /// Emit note-ons and control changes of the current clip that land
    /// in `[start, end)`.
    fn process_clip_midi(&mut self, start: f64, end: f64, ctx: &BlockContext) {
        if let Some(key) = self.event_state.current {
            let Some(clip) = self.clips.get(key) else {
                return;
            };
            let clip_start = clip.start;
            let clip_end = clip.end;
            if let ClipPayload::Midi { notes, controls } = &clip.payload {
                let mut onsets: heapless::Vec<(u32, f64, MidiVoice), 64> = heapless::Vec::new();
                while self.event_state.midi_cursor < notes.len() {
                    let note = notes[self.event_state.midi_cursor];
                    let onset = clip_start + note.start;
                    if onset >= end || onset >= clip_end {
                        break;
                    }
                    if onset >= start {
                        let release = (clip_start + note.end).min(clip_end);
                        let voice = MidiVoice::new(
                            note.note,
                            note.velocity,
                            note.channel,
                            release,
                            ctx.offset_of(onset),
                        );
                        let _ = onsets.push((ctx.offset_of(onset), onset, voice));
                    }
                    self.event_state.midi_cursor += 1;
                }
                let mut ccs: heapless::Vec<MidiEvent, 64> = heapless::Vec::new();
                let mut autos: heapless::Vec<ParamChange, 64> = heapless::Vec::new();
                while self.event_state.control_cursor < controls.len() {
                    let cp = controls[self.event_state.control_cursor];
                    let at = clip_start + cp.time;
                    if at >= end || at >= clip_end {
                        break;
                    }
                    if at >= start {
                        // CC 7/10 automate the track's own volume/pan.
                        match cp.controller {
                            7 => {
                                let _ = autos.push(ParamChange {
                                    sample_offset: ctx.offset_of(at),
                                    id: param::VOLUME as u16,
                                    value: ParamValue::F32(cp.value as f32 / 127.0),
                                });
                            }
                            10 => {
                                let _ = autos.push(ParamChange {
                                    sample_offset: ctx.offset_of(at),
                                    id: param::PAN as u16,
                                    value: ParamValue::F32(cp.value as f32 / 63.5 - 1.0),
                                });
                            }
                            _ => {}
                        }
                        let _ = ccs.push(MidiEvent {
                            buffer_offset: ctx.offset_of(at),
                            kind: MidiEventKind::ControlChange {
                                controller: cp.controller,
                                value: cp.value,
                                channel: cp.channel,
                            },
                        });
                    }
                    self.event_state.control_cursor += 1;
                }
                for (offset, onset, voice) in onsets {
                    if !self.voices.add_voice(voice) {
                        // Full pool: steal a voice already past its
                        // release, else drop the onset.
                        let Some(stolen) = self.voices.release_voice(onset) else {
                            continue;
                        };
                        self.push_event(TrackEvent::Midi(MidiEvent {
                            buffer_offset: offset,
                            kind: MidiEventKind::NoteOff {
                                note: stolen.note,
                                channel: stolen.channel,
                            },
                        }));
                        if !self.voices.add_voice(voice) {
                            continue;
                        }
                    }
                    self.push_event(TrackEvent::Midi(MidiEvent {
                        buffer_offset: offset,
                        kind: MidiEventKind::NoteOn {
                            note: voice.note,
                            velocity: voice.velocity,
                            channel: voice.channel,
                        },
                    }));
                }
                for cc in ccs {
                    self.push_event(TrackEvent::Midi(cc));
                }
                for change in autos {
                    let _ = self.param_queue.push(change);
                }
            }
        }
    }

    /// Render this block's queued events and active voices into
    /// `output`, applying gain/pan and updating the meter.
    pub fn process(
        &mut self,
        output: &mut AudioBuffer<f32>,
        table: &SampleTable,
        ctx: &BlockContext,
        playing: bool,
        any_solo: bool,
    ) {
        // Device renegotiation only; steady state never reallocates.
        if self.effect_buffer.frames() != ctx.frames {
            self.effect_buffer.resize(ctx.frames, true);
        }
        self.effect_buffer.silence();

        if playing {
            for i in 0..self.events.len() {
                if let TrackEvent::Audio(ev) = self.events[i] {
                    self.stream_sample(ev, table, ctx);
                }
            }
        }
        // Voices render even when stopped: live input monitoring.
        self.voices.render(
            &mut self.effect_buffer,
            ctx.block_start,
            ctx.beat_duration,
            ctx.sample_rate,
        );

        let (mut left, mut right) = self.params.channel_gains(any_solo);
        if self.param_queue.is_empty() {
            output.mix_channel_scaled(0, &self.effect_buffer, 0, left);
            output.mix_channel_scaled(1, &self.effect_buffer, 1, right);
        } else {
            // Scheduled automation splits the block into constant-gain
            // segments at each change's sample offset.
            let queue = core::mem::take(&mut self.param_queue);
            let mut seg = 0usize;
            for change in queue.values() {
                let at = (change.sample_offset as usize).min(ctx.frames);
                if at > seg {
                    self.mix_segment(output, seg, at, left, right);
                    seg = at;
                }
                self.apply_param(change.id as usize, change.value);
                let gains = self.params.channel_gains(any_solo);
                left = gains.0;
                right = gains.1;
            }
            self.mix_segment(output, seg, ctx.frames, left, right);
        }

        let audible = !self.params.mute && (!any_solo || self.params.solo);
        let gain = if audible { self.params.volume } else { 0.0 };
        self.meter.store(self.effect_buffer.peak() * gain);
    }

    fn mix_segment(
        &self,
        output: &mut AudioBuffer<f32>,
        from: usize,
        to: usize,
        left: f32,
        right: f32,
    ) {
        for (ch, g) in [(0usize, left), (1usize, right)] {
            let src = self.effect_buffer.channel(ch);
            let dst = output.channel_mut(ch);
            for i in from..to {
                dst[i] += src[i] * g;
            }
        }
    }

    /// Stream asset data for one audio event. A missing asset renders
    /// as silence; a block is never dropped.
    fn stream_sample(&mut self, ev: AudioEvent, table: &SampleTable, ctx: &BlockContext) {
        let Some(clip) = self.clips.get(ev.clip) else {
            return;
        };
        let ClipPayload::Audio { asset, .. } = &clip.payload else {
            return;
        };
        let Some(asset) = table.get(*asset) else {
            return;
        };
        let from = ev.buffer_offset as usize;
        let to = (ctx.offset_of(clip.end) as usize).min(ctx.frames);
        for ch in 0..2usize {
            let dst = self.effect_buffer.channel_mut(ch);
            for (i, slot) in dst[from..to].iter_mut().enumerate() {
                *slot += asset.sample(ch, ev.source_frame as usize + i);
            }
        }
    }

    /// Events queued for the current block (read-only, for the engine
    /// and tests).
    pub fn events(&self) -> &[TrackEvent] {
        &self.events
    }

    /// Plugin parameter changes staged this block for the plugin-host
    /// collaborator.
    pub fn plugin_changes(&self) -> &[(u32, u32, f32)] {
        &self.plugin_changes
    }

    /// The current clip ended before the block did.
    pub fn partially_ended(&self) -> bool {
        self.event_state.partially_ended
    }

    /// Number of voices in use.
    pub fn used_voices(&self) -> usize {
        self.voices.used_voices()
    }

    // --- Recording bookkeeping ---

    /// Open a capture session over `[start, end)` beats.
    pub fn prepare_record(&mut self, session_id: u64, buffer_id: u32, start: f64, end: f64) {
        self.recording = Some(RecordingState {
            session_id,
            buffer_id,
            start,
            end,
            frames_written: 0,
        });
    }

    /// Account frames delivered to the record queue.
    pub fn record_advance(&mut self, frames: u64) {
        if let Some(rec) = &mut self.recording {
            rec.frames_written += frames;
        }
    }

    /// Close the capture session, returning its final state.
    pub fn stop_record(&mut self) -> Option<RecordingState> {
        self.recording.take()
    }

    /// The in-progress capture session, if any.
    pub fn recording(&self) -> Option<&RecordingState> {
        self.recording.as_ref()
    }
}

impl TrackHandle {
    /// Set track volume (linear gain).
    pub fn set_volume(&self, volume: f32) {
        self.params.set_f32(param::VOLUME, volume);
    }

    /// Set track pan (-1.0 full left .. 1.0 full right).
    pub fn set_pan(&self, pan: f32) {
        self.params.set_f32(param::PAN, pan);
    }

    /// Mute or unmute the track.
    pub fn set_mute(&self, mute: bool) {
        self.params.set(param::MUTE, ParamValue::U32(mute as u32));
    }

    /// Solo or unsolo the track.
    pub fn set_solo(&self, solo: bool) {
        self.params.set(param::SOLO, ParamValue::U32(solo as u32));
    }

    /// Send a message to the audio side, spinning (bounded) when the
    /// ring is full so messages are never silently dropped.
    pub fn send(&mut self, message: TrackMessage) -> bool {
        let mut msg = message;
        for _ in 0..MAX_PUSH_SPINS {
            match self.msg_tx.try_push(msg) {
                Ok(()) => return true,
                Err(back) => {
                    msg = back;
                    core::hint::spin_loop();
                }
            }
        }
        self.contention.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Last published peak level.
    pub fn meter(&self) -> f32 {
        self.meter.load()
    }

    /// Times `send` exhausted its spin bound (monitoring).
    pub fn contention(&self) -> u64 {
        self.contention.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use bl_core::{MidiNote, SampleAsset};
    use slotmap::Key;

    fn ctx_one_beat() -> BlockContext {
        // 120 BPM at 44100 Hz: one beat = 22050 samples
        BlockContext {
            block_start: 0.0,
            block_end: 1.0,
            sample_position: 0,
            beat_duration: 0.5,
            sample_rate: 44100.0,
            frames: 22050,
        }
    }

    fn five_clip_track() -> Track {
        let (mut track, _) = Track::new("test");
        for (s, e) in [(0.0, 9.0), (10.0, 13.0), (14.0, 16.0), (21.0, 25.0), (26.0, 30.0)] {
            track.add_clip(Clip::midi(s, e, Vec::new(), Vec::new()));
        }
        track
    }

    #[test]
    fn find_next_clip_returns_covering_clip() {
        let track = five_clip_track();
        let i = track.find_next_clip(21.0).unwrap();
        let clip = &track.clips[track.order[i]];
        assert_eq!((clip.start, clip.end), (21.0, 25.0));
    }

    #[test]
    fn find_next_clip_in_gap_returns_next_by_start() {
        let track = five_clip_track();
        // 9.5 is covered by nothing; next clip is [10,13]
        let i = track.find_next_clip(9.5).unwrap();
        let clip = &track.clips[track.order[i]];
        assert_eq!((clip.start, clip.end), (10.0, 13.0));
    }

    #[test]
    fn find_next_clip_past_everything_is_none() {
        let track = five_clip_track();
        assert!(track.find_next_clip(30.0).is_none());
    }

    #[test]
    fn add_clip_keeps_start_order() {
        let (mut track, _) = Track::new("test");
        track.add_clip(Clip::midi(4.0, 5.0, Vec::new(), Vec::new()));
        track.add_clip(Clip::midi(0.0, 1.0, Vec::new(), Vec::new()));
        track.add_clip(Clip::midi(2.0, 3.0, Vec::new(), Vec::new()));
        let starts: Vec<f64> = track.order.iter().map(|&k| track.clips[k].start).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn removed_clip_stays_until_reclaim() {
        let (mut track, _) = Track::new("test");
        let key = track.add_clip(Clip::midi(0.0, 1.0, Vec::new(), Vec::new()));
        assert!(track.remove_clip(key, 1000));
        assert_eq!(track.num_clips(), 0);
        assert_eq!(track.pending_reclaim(), 1);
        track.reclaim(500);
        assert_eq!(track.pending_reclaim(), 1);
        track.reclaim(1001);
        assert_eq!(track.pending_reclaim(), 0);
    }

    #[test]
    fn removing_earlier_clip_keeps_cursor_on_sounding_clip() {
        let (mut track, _) = Track::new("test");
        let mut table = SampleTable::new();
        let key = table.insert(1, SampleAsset::new("tone", 44100, vec![vec![0.5; 44100]]));
        let early = track.add_clip(Clip::audio(0.0, 1.0, key, 0));
        let late = track.add_clip(Clip::audio(2.0, 6.0, key, 0));
        let ctx = BlockContext {
            block_start: 2.0,
            block_end: 2.0 + 64.0 / 22050.0,
            frames: 64,
            ..ctx_one_beat()
        };
        track.begin_block(&ctx, true);
        track.process_event(2.0, 2.0 + bl_core::INV_PPQ, &ctx);
        track.remove_clip(early, 0);
        let ctx2 = BlockContext {
            block_start: ctx.block_end,
            block_end: ctx.block_end + 64.0 / 22050.0,
            ..ctx
        };
        track.begin_block(&ctx2, true);
        let continuation = track.events().iter().find_map(|e| match e {
            TrackEvent::Audio(ev) => Some(ev.clip),
            _ => None,
        });
        assert_eq!(continuation, Some(late));
    }

    #[test]
    fn removing_sounding_clip_silences_it() {
        let (mut track, _) = Track::new("test");
        let mut table = SampleTable::new();
        let key = table.insert(1, SampleAsset::new("tone", 44100, vec![vec![0.5; 44100]]));
        let clip = track.add_clip(Clip::audio(0.0, 8.0, key, 0));
        let ctx = BlockContext { frames: 64, block_end: 64.0 / 22050.0, ..ctx_one_beat() };
        track.begin_block(&ctx, true);
        track.process_event(0.0, bl_core::INV_PPQ, &ctx);
        track.remove_clip(clip, 0);
        let ctx2 = BlockContext {
            block_start: ctx.block_end,
            block_end: ctx.block_end + 64.0 / 22050.0,
            ..ctx
        };
        track.begin_block(&ctx2, true);
        track.process_event(ctx2.block_start, ctx2.block_start + bl_core::INV_PPQ, &ctx2);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx2, true, false);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn control_point_automation_applies_mid_block() {
        let (mut track, _) = Track::new("test");
        let table = SampleTable::new();
        track.add_clip(Clip::midi(
            0.0,
            4.0,
            vec![MidiNote { start: 0.0, end: 2.0, note: 69, velocity: 127, channel: 0 }],
            vec![bl_core::ControlPoint {
                // CC 7 (volume) to zero at sample 16 of the block
                time: 16.0 / 22050.0,
                controller: 7,
                value: 0,
                channel: 0,
            }],
        ));
        let ctx = BlockContext { frames: 64, block_end: 64.0 / 22050.0, ..ctx_one_beat() };
        track.begin_block(&ctx, true);
        track.process_event(0.0, bl_core::INV_PPQ, &ctx);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx, true, false);
        assert!(out.channel(0)[1..16].iter().any(|&s| s != 0.0));
        assert!(out.channel(0)[16..].iter().all(|&s| s == 0.0));
        // The change latches into the block-level snapshot
        assert_eq!(track.params().volume, 0.0);
    }

    #[test]
    fn full_pool_steals_finished_voice_mid_block() {
        let (mut track, _) = Track::new("test");
        let mut notes: Vec<MidiNote> = (0..64)
            .map(|i| MidiNote { start: 0.0, end: 0.1, note: 30 + i, velocity: 100, channel: 0 })
            .collect();
        notes.push(MidiNote { start: 0.5, end: 1.0, note: 100, velocity: 100, channel: 0 });
        track.add_clip(Clip::midi(0.0, 4.0, notes, Vec::new()));
        let ctx = ctx_one_beat();
        track.begin_block(&ctx, true);
        let mut beat = 0.0;
        while beat < 1.0 - 1e-9 {
            track.process_event(beat, beat + bl_core::INV_PPQ, &ctx);
            beat += bl_core::INV_PPQ;
        }
        let note_ons = track
            .events()
            .iter()
            .filter(|e| matches!(e, TrackEvent::Midi(m) if matches!(m.kind, MidiEventKind::NoteOn { .. })))
            .count();
        let note_offs: Vec<&TrackEvent> = track
            .events()
            .iter()
            .filter(|e| matches!(e, TrackEvent::Midi(m) if matches!(m.kind, MidiEventKind::NoteOff { .. })))
            .collect();
        // All 64 voices had released by beat 0.5, so the 65th note
        // steals the oldest instead of being dropped.
        assert_eq!(note_ons, 65);
        assert_eq!(note_offs.len(), 1);
        assert_eq!(note_offs[0].buffer_offset(), 11025);
        assert_eq!(track.used_voices(), 64);
    }

    #[test]
    fn note_on_emitted_with_sample_accurate_offset() {
        let (mut track, _) = Track::new("test");
        track.add_clip(Clip::midi(
            0.0,
            4.0,
            vec![MidiNote { start: 0.5, end: 1.0, note: 60, velocity: 100, channel: 0 }],
            Vec::new(),
        ));
        let ctx = ctx_one_beat();
        track.begin_block(&ctx, true);
        let mut beat = 0.0;
        while beat < 1.0 - 1e-9 {
            track.process_event(beat, beat + bl_core::INV_PPQ, &ctx);
            beat += bl_core::INV_PPQ;
        }
        let note_ons: Vec<&TrackEvent> = track
            .events()
            .iter()
            .filter(|e| matches!(e, TrackEvent::Midi(m) if matches!(m.kind, MidiEventKind::NoteOn { .. })))
            .collect();
        assert_eq!(note_ons.len(), 1);
        // Beat 0.5 at 120 BPM / 44100 Hz = sample 11025
        assert_eq!(note_ons[0].buffer_offset(), 11025);
        assert_eq!(track.used_voices(), 1);
    }

    #[test]
    fn events_are_time_ordered_within_block() {
        let (mut track, _) = Track::new("test");
        let notes = vec![
            MidiNote { start: 0.1, end: 0.2, note: 60, velocity: 100, channel: 0 },
            MidiNote { start: 0.4, end: 0.5, note: 62, velocity: 100, channel: 0 },
            MidiNote { start: 0.8, end: 0.9, note: 64, velocity: 100, channel: 0 },
        ];
        track.add_clip(Clip::midi(0.0, 4.0, notes, Vec::new()));
        let ctx = ctx_one_beat();
        track.begin_block(&ctx, true);
        let mut beat = 0.0;
        while beat < 1.0 - 1e-9 {
            track.process_event(beat, beat + bl_core::INV_PPQ, &ctx);
            beat += bl_core::INV_PPQ;
        }
        let offsets: Vec<u32> = track.events().iter().map(|e| e.buffer_offset()).collect();
        assert_eq!(offsets.len(), 3);
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn no_clip_in_range_emits_nothing() {
        let mut track = five_clip_track();
        let ctx = BlockContext { block_start: 9.2, block_end: 9.4, ..ctx_one_beat() };
        track.begin_block(&ctx, true);
        track.process_event(9.2, 9.4, &ctx);
        assert!(track.events().is_empty());
    }

    #[test]
    fn audio_clip_with_missing_asset_renders_silence() {
        let (mut track, _) = Track::new("test");
        track.add_clip(Clip::audio(0.0, 4.0, bl_core::AssetKey::null(), 0));
        let table = SampleTable::new();
        let ctx = BlockContext { frames: 64, block_end: 64.0 / 22050.0, ..ctx_one_beat() };
        track.begin_block(&ctx, true);
        track.process_event(0.0, bl_core::INV_PPQ, &ctx);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx, true, false);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn audio_clip_streams_asset_data() {
        let (mut track, _) = Track::new("test");
        let mut table = SampleTable::new();
        let key = table.insert(1, SampleAsset::new("tone", 44100, vec![vec![0.5; 4096]]));
        track.add_clip(Clip::audio(0.0, 4.0, key, 0));
        let ctx = BlockContext { frames: 64, block_end: 64.0 / 22050.0, ..ctx_one_beat() };
        track.begin_block(&ctx, true);
        track.process_event(0.0, bl_core::INV_PPQ, &ctx);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx, true, false);
        assert!((out.channel(0)[0] - 0.5).abs() < 1e-6);
        assert!((out.channel(1)[63] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mute_silences_output() {
        let (mut track, handle) = Track::new("test");
        let mut table = SampleTable::new();
        let key = table.insert(1, SampleAsset::new("tone", 44100, vec![vec![0.5; 4096]]));
        track.add_clip(Clip::audio(0.0, 4.0, key, 0));
        handle.set_mute(true);
        let ctx = BlockContext { frames: 64, block_end: 64.0 / 22050.0, ..ctx_one_beat() };
        track.begin_block(&ctx, true);
        track.process_event(0.0, bl_core::INV_PPQ, &ctx);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx, true, false);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn pan_hard_left_zeroes_right() {
        let (mut track, handle) = Track::new("test");
        let mut table = SampleTable::new();
        let key = table.insert(1, SampleAsset::new("tone", 44100, vec![vec![0.5; 4096]]));
        track.add_clip(Clip::audio(0.0, 4.0, key, 0));
        handle.set_pan(-1.0);
        let ctx = BlockContext { frames: 64, block_end: 64.0 / 22050.0, ..ctx_one_beat() };
        track.begin_block(&ctx, true);
        track.process_event(0.0, bl_core::INV_PPQ, &ctx);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx, true, false);
        assert!((out.channel(0)[0] - 0.5).abs() < 1e-6);
        assert_eq!(out.channel(1)[0], 0.0);
    }

    #[test]
    fn live_note_on_renders_while_stopped() {
        let (mut track, mut handle) = Track::new("test");
        assert!(handle.send(TrackMessage::MidiNoteOn { note: 69, velocity: 127, channel: 0 }));
        let table = SampleTable::new();
        let ctx = BlockContext { frames: 64, ..ctx_one_beat() };
        track.begin_block(&ctx, false);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx, false, false);
        assert!(out.channel(0).iter().any(|&s| s != 0.0));
        assert_eq!(track.used_voices(), 1);
    }

    #[test]
    fn live_note_off_releases_on_next_block() {
        let (mut track, mut handle) = Track::new("test");
        let table = SampleTable::new();
        let ctx = BlockContext { frames: 64, ..ctx_one_beat() };
        handle.send(TrackMessage::MidiNoteOn { note: 69, velocity: 127, channel: 0 });
        track.begin_block(&ctx, false);
        let mut out = AudioBuffer::<f32>::new(64, 2);
        track.process(&mut out, &table, &ctx, false, false);
        handle.send(TrackMessage::MidiNoteOff { note: 69, channel: 0 });
        track.begin_block(&ctx, false);
        track.process(&mut out, &table, &ctx, false, false);
        // Released at block start; reclaimed at the next begin_block
        track.begin_block(&ctx, false);
        assert_eq!(track.used_voices(), 0);
    }

    #[test]
    fn recording_bookkeeping_round_trip() {
        let (mut track, _) = Track::new("test");
        track.prepare_record(7, 2, 0.0, 8.0);
        track.record_advance(512);
        track.record_advance(512);
        let rec = track.stop_record().unwrap();
        assert_eq!(rec.session_id, 7);
        assert_eq!(rec.buffer_id, 2);
        assert_eq!(rec.frames_written, 1024);
        assert!(track.recording().is_none());
    }

    #[test]
    fn param_change_message_applies_before_render() {
        let (mut track, mut handle) = Track::new("test");
        handle.send(TrackMessage::ParamChange { id: param::VOLUME as u16, value: ParamValue::F32(0.25) });
        let ctx = ctx_one_beat();
        track.begin_block(&ctx, false);
        assert_eq!(track.params().volume, 0.25);
    }
}
