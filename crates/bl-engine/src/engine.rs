//! Transport and block renderer.
//!
//! `Engine` lives on the audio thread once a stream starts. It steps
//! the playhead in fixed 1/PPQ beat increments across each block,
//! calls every track once per step, then renders. The control thread
//! keeps an [`EngineHandle`], which reaches in only through atomics
//! and the command ring.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bl_core::{AudioBuffer, SampleTable, INV_PPQ, PPQ};
use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};

use crate::command::{command_queue, EngineCommand};
use crate::track::{BlockContext, Track};

/// Default tempo.
pub const DEFAULT_BPM: f64 = 120.0;

/// Spin bound for the control-side blocking command push.
const MAX_PUSH_SPINS: u32 = 1 << 20;

/// State published by the audio thread for UI polling.
pub struct EngineShared {
    /// Playhead in beats, bit-stored f64
    playhead: AtomicU64,
    /// Seconds per beat, bit-stored f64
    beat_duration: AtomicU64,
    playing: AtomicBool,
    /// Total frames rendered since the engine was created
    frame_counter: AtomicU64,
}

impl EngineShared {
    fn new(bpm: f64) -> Self {
        Self {
            playhead: AtomicU64::new(0f64.to_bits()),
            beat_duration: AtomicU64::new(bl_core::time::beat_duration(bpm).to_bits()),
            playing: AtomicBool::new(false),
            frame_counter: AtomicU64::new(0),
        }
    }

    /// Playhead position in beats, as of the last rendered block.
    pub fn playhead(&self) -> f64 {
        f64::from_bits(self.playhead.load(Ordering::Acquire))
    }

    /// Seconds per beat.
    pub fn beat_duration(&self) -> f64 {
        f64::from_bits(self.beat_duration.load(Ordering::Acquire))
    }

    /// Tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        60.0 / self.beat_duration()
    }

    /// Is the transport running?
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Frames rendered since engine creation. Monotonic; used to
    /// retire deferred clip removals.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }
}

/// Engine operation errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// Seeking is only allowed while stopped
    SeekWhilePlaying,
    /// Structural edits are only allowed while stopped
    EditWhilePlaying,
    /// Track index past the end of the track list
    TrackIndexOutOfRange,
    /// The command ring stayed full past the spin bound
    CommandQueueFull,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::SeekWhilePlaying => write!(f, "cannot seek while playing"),
            EngineError::EditWhilePlaying => {
                write!(f, "cannot edit the track list while playing")
            }
            EngineError::TrackIndexOutOfRange => write!(f, "track index out of range"),
            EngineError::CommandQueueFull => write!(f, "engine command queue full"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EngineError {}

/// The audio-thread side of the system: track list, sample table, and
/// transport state.
pub struct Engine {
    tracks: Vec<Track>,
    sample_table: SampleTable,
    shared: Arc<EngineShared>,
    /// Playhead in beats, advanced block by block
    playhead: f64,
    /// Where play starts from and stop rewinds to
    playhead_start: f64,
    /// Frames rendered since creation
    sample_position: u64,
    commands: Option<HeapCons<EngineCommand>>,
    bpm_listeners: Vec<Box<dyn FnMut(f64) + Send>>,
    /// Transport steps taken in the last block
    last_block_steps: u32,
}

impl Engine {
    /// Create an engine and its control-thread handle.
    pub fn new() -> (Self, EngineHandle) {
        let shared = Arc::new(EngineShared::new(DEFAULT_BPM));
        let (cmd_tx, cmd_rx) = command_queue();
        let engine = Self {
            tracks: Vec::with_capacity(64),
            sample_table: SampleTable::new(),
            shared: shared.clone(),
            playhead: 0.0,
            playhead_start: 0.0,
            sample_position: 0,
            commands: Some(cmd_rx),
            bpm_listeners: Vec::new(),
            last_block_steps: 0,
        };
        let handle = EngineHandle { shared, commands: cmd_tx };
        (engine, handle)
    }

    /// Shared state for UI polling.
    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    /// The sample asset table.
    pub fn sample_table(&mut self) -> &mut SampleTable {
        &mut self.sample_table
    }

    /// Tracks, in mixer order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Mutable track access for setup and tests.
    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    // --- Transport (audio-thread side; the handle goes through the
    // command ring) ---

    /// Set the tempo and notify listeners.
    pub fn set_bpm(&mut self, bpm: f64) {
        let bd = bl_core::time::beat_duration(bpm);
        self.shared.beat_duration.store(bd.to_bits(), Ordering::Release);
        for listener in &mut self.bpm_listeners {
            listener(bpm);
        }
    }

    /// Register a tempo-change listener (delay lines, LFOs).
    pub fn on_bpm_change(&mut self, listener: Box<dyn FnMut(f64) + Send>) {
        self.bpm_listeners.push(listener);
    }

    /// Move the playhead start position. Only valid while stopped.
    pub fn set_playhead_position(&mut self, beat: f64) -> Result<(), EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::SeekWhilePlaying);
        }
        self.playhead_start = beat;
        self.playhead = beat;
        self.shared.playhead.store(beat.to_bits(), Ordering::Release);
        for track in &mut self.tracks {
            track.reset_playback_state(beat);
        }
        Ok(())
    }

    /// Start playback from the playhead start position.
    ///
    /// The frame position is not rewound: it counts every rendered
    /// frame since engine creation and doubles as the retirement
    /// counter for deferred clip removals.
    pub fn play(&mut self) {
        self.playhead = self.playhead_start;
        for track in &mut self.tracks {
            track.prepare_play(self.playhead);
        }
        self.shared.playhead.store(self.playhead.to_bits(), Ordering::Release);
        self.shared.playing.store(true, Ordering::Release);
    }

    /// Stop playback, rewind to the start position, and cut all voices.
    pub fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
        self.playhead = self.playhead_start;
        self.shared.playhead.store(self.playhead.to_bits(), Ordering::Release);
        for track in &mut self.tracks {
            track.kill_all_voices();
        }
    }

    // --- Structural edits (valid only while stopped; the handle
    // routes them through the command ring so they land at a block
    // boundary) ---

    /// Append a track.
    pub fn add_track(&mut self, track: Track) -> Result<usize, EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::EditWhilePlaying);
        }
        self.tracks.push(track);
        Ok(self.tracks.len() - 1)
    }

    /// Remove a track.
    pub fn delete_track(&mut self, index: usize) -> Result<Track, EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::EditWhilePlaying);
        }
        if index >= self.tracks.len() {
            return Err(EngineError::TrackIndexOutOfRange);
        }
        Ok(self.tracks.remove(index))
    }

    /// Reorder tracks.
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::EditWhilePlaying);
        }
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return Err(EngineError::TrackIndexOutOfRange);
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        Ok(())
    }

    // --- Block rendering ---

    /// Render one block into `output`. The only entry point on the
    /// audio thread; everything else is applied here at the boundary.
    pub fn process(&mut self, output: &mut AudioBuffer<f32>, sample_rate: f64) {
        self.apply_commands();
        output.silence();

        let frames = output.frames();
        let playing = self.shared.playing.load(Ordering::Acquire);
        let beat_duration = self.shared.beat_duration();
        let block_beats = frames as f64 / (beat_duration * sample_rate);
        let block_start = self.playhead;
        let block_end = if playing { block_start + block_beats } else { block_start };
        let ctx = BlockContext {
            block_start,
            block_end,
            sample_position: self.sample_position,
            beat_duration,
            sample_rate,
            frames,
        };

        let published = self.shared.frame_counter();
        for track in &mut self.tracks {
            track.reclaim(published);
            track.begin_block(&ctx, playing);
        }

        if playing {
            // Fixed-increment transport: one event pass per 1/PPQ step,
            // with a shortened tail step when the block ends mid-tick.
            let steps = ((block_end - block_start) * PPQ as f64 - 1e-9).ceil().max(0.0) as u32;
            for k in 0..steps {
                let slice_start = block_start + k as f64 * INV_PPQ;
                let slice_end = (slice_start + INV_PPQ).min(block_end);
                for track in &mut self.tracks {
                    track.process_event(slice_start, slice_end, &ctx);
                }
            }
            self.last_block_steps = steps;
            self.playhead = block_end;
        } else {
            self.last_block_steps = 0;
        }

        let any_solo = self.tracks.iter().any(|t| t.params().solo);
        for track in &mut self.tracks {
            track.process(output, &self.sample_table, &ctx, playing, any_solo);
        }

        self.sample_position += frames as u64;
        self.shared.playhead.store(self.playhead.to_bits(), Ordering::Release);
        self.shared
            .frame_counter
            .store(self.sample_position, Ordering::Release);
    }

    /// Transport steps taken by the last `process` call.
    pub fn last_block_steps(&self) -> u32 {
        self.last_block_steps
    }

    fn apply_commands(&mut self) {
        let Some(mut commands) = self.commands.take() else {
            return;
        };
        while let Some(cmd) = commands.try_pop() {
            match cmd {
                EngineCommand::Play => self.play(),
                EngineCommand::Stop => self.stop(),
                EngineCommand::Seek(beat) => {
                    let _ = self.set_playhead_position(beat);
                }
                EngineCommand::SetBpm(bpm) => self.set_bpm(bpm),
                EngineCommand::AddTrack(track) => {
                    let _ = self.add_track(*track);
                }
                EngineCommand::DeleteTrack(index) => {
                    let _ = self.delete_track(index);
                }
                EngineCommand::MoveTrack { from, to } => {
                    let _ = self.move_track(from, to);
                }
            }
        }
        self.commands = Some(commands);
    }
}

/// Control-thread handle: transport and structural operations routed
/// to the audio thread.
pub struct EngineHandle {
    shared: Arc<EngineShared>,
    commands: HeapProd<EngineCommand>,
}

impl EngineHandle {
    /// Shared state for polling.
    pub fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    /// Playhead position in beats.
    pub fn playhead(&self) -> f64 {
        self.shared.playhead()
    }

    /// Is the transport running?
    pub fn is_playing(&self) -> bool {
        self.shared.is_playing()
    }

    /// Tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.shared.bpm()
    }

    /// Start playback at the next block boundary.
    pub fn play(&mut self) -> Result<(), EngineError> {
        self.send(EngineCommand::Play)
    }

    /// Stop playback at the next block boundary.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.send(EngineCommand::Stop)
    }

    /// Move the playhead start position. Fails while playing.
    pub fn seek(&mut self, beat: f64) -> Result<(), EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::SeekWhilePlaying);
        }
        self.send(EngineCommand::Seek(beat))
    }

    /// Change the tempo at the next block boundary.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), EngineError> {
        self.send(EngineCommand::SetBpm(bpm))
    }

    /// Append a fully built track at the next block boundary. Fails
    /// while playing.
    pub fn add_track(&mut self, track: Track) -> Result<(), EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::EditWhilePlaying);
        }
        self.send(EngineCommand::AddTrack(Box::new(track)))
    }

    /// Remove a track at the next block boundary. Fails while playing.
    pub fn delete_track(&mut self, index: usize) -> Result<(), EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::EditWhilePlaying);
        }
        self.send(EngineCommand::DeleteTrack(index))
    }

    /// Reorder tracks at the next block boundary. Fails while playing.
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        if self.shared.is_playing() {
            return Err(EngineError::EditWhilePlaying);
        }
        self.send(EngineCommand::MoveTrack { from, to })
    }

    /// Spin (bounded) until the ring has room; commands must not be
    /// silently dropped.
    fn send(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        let mut cmd = command;
        for _ in 0..MAX_PUSH_SPINS {
            match self.commands.try_push(cmd) {
                Ok(()) => return Ok(()),
                Err(back) => {
                    cmd = back;
                    core::hint::spin_loop();
                }
            }
        }
        Err(EngineError::CommandQueueFull)
    }
}
