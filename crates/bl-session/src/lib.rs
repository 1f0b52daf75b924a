//! Headless session controller for beatline.
//!
//! Provides a unified API for building a session, playback, capture,
//! and offline rendering that a GUI or CLI can share. Before the
//! output stream starts the engine is owned here and operated
//! directly; starting the stream moves it into the device callback,
//! after which every operation goes through the engine handle.

mod recorder;
mod wav;

use std::fmt;

use bl_audio::{AudioBackend, AudioError, CpalInput, CpalOutput};
use bl_core::{AudioBuffer, Clip, ClipKey, SampleAsset};
use bl_engine::{
    AudioRecordQueue, Engine, EngineError, EngineHandle, RecordFormat, Track, TrackHandle,
};

// Re-export common types so callers don't need bl-core/bl-engine directly.
pub use bl_core::{AssetKey, ControlPoint, MidiNote, TrackMessage};
pub use bl_engine::EngineShared;
pub use recorder::Recorder;
pub use wav::{channels_to_wav, interleaved_to_wav, write_wav};

/// Capture block size in frames for the record drain thread.
const RECORD_BLOCK: usize = 512;

/// Session operation errors.
#[derive(Debug)]
pub enum SessionError {
    /// The operation needs the engine locally, but the output stream
    /// has already taken it
    AlreadyStarted,
    /// Engine rejected the operation
    Engine(EngineError),
    /// Device backend failure
    Audio(AudioError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyStarted => {
                write!(f, "operation requires the engine, but the stream owns it")
            }
            SessionError::Engine(e) => write!(f, "engine error: {}", e),
            SessionError::Audio(e) => write!(f, "audio error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<EngineError> for SessionError {
    fn from(e: EngineError) -> Self {
        SessionError::Engine(e)
    }
}

impl From<AudioError> for SessionError {
    fn from(e: AudioError) -> Self {
        SessionError::Audio(e)
    }
}

/// A beatline session: engine, device streams, and per-track handles.
pub struct Session {
    /// Present until the output stream takes it
    engine: Option<Engine>,
    handle: EngineHandle,
    track_handles: Vec<TrackHandle>,
    output: Option<CpalOutput>,
    input: Option<CpalInput>,
}

impl Session {
    pub fn new() -> Self {
        let (engine, handle) = Engine::new();
        Self {
            engine: Some(engine),
            handle,
            track_handles: Vec::new(),
            output: None,
            input: None,
        }
    }

    // --- Session building (engine still local) ---

    /// Append a track, returning its index.
    pub fn add_track(&mut self, name: &str) -> Result<usize, SessionError> {
        let (track, handle) = Track::new(name);
        match self.engine.as_mut() {
            Some(engine) => {
                engine.add_track(track)?;
            }
            None => self.handle.add_track(track)?,
        }
        self.track_handles.push(handle);
        Ok(self.track_handles.len() - 1)
    }

    /// Insert a decoded sample asset under its content hash.
    pub fn add_asset(&mut self, hash: u64, asset: SampleAsset) -> Result<AssetKey, SessionError> {
        let engine = self.engine.as_mut().ok_or(SessionError::AlreadyStarted)?;
        Ok(engine.sample_table().insert(hash, asset))
    }

    /// Add a clip to a track's timeline.
    pub fn add_clip(&mut self, track: usize, clip: Clip) -> Result<ClipKey, SessionError> {
        let engine = self.engine.as_mut().ok_or(SessionError::AlreadyStarted)?;
        let track = engine
            .track_mut(track)
            .ok_or(SessionError::Engine(EngineError::TrackIndexOutOfRange))?;
        Ok(track.add_clip(clip))
    }

    /// Stage a clip removal, retired once playback moves one second
    /// past the current frame counter.
    pub fn remove_clip(&mut self, track: usize, key: ClipKey) -> Result<(), SessionError> {
        let retire_at = self.handle.shared().frame_counter() + 44100;
        let engine = self.engine.as_mut().ok_or(SessionError::AlreadyStarted)?;
        let track = engine
            .track_mut(track)
            .ok_or(SessionError::Engine(EngineError::TrackIndexOutOfRange))?;
        track.remove_clip(key, retire_at);
        Ok(())
    }

    /// Control handle for a track.
    pub fn track(&mut self, index: usize) -> Option<&mut TrackHandle> {
        self.track_handles.get_mut(index)
    }

    /// Number of tracks.
    pub fn num_tracks(&self) -> usize {
        self.track_handles.len()
    }

    // --- Transport ---

    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), SessionError> {
        match self.engine.as_mut() {
            Some(engine) => engine.set_bpm(bpm),
            None => self.handle.set_bpm(bpm)?,
        }
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), SessionError> {
        match self.engine.as_mut() {
            Some(engine) => engine.play(),
            None => self.handle.play()?,
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        match self.engine.as_mut() {
            Some(engine) => engine.stop(),
            None => self.handle.stop()?,
        }
        Ok(())
    }

    pub fn seek(&mut self, beat: f64) -> Result<(), SessionError> {
        match self.engine.as_mut() {
            Some(engine) => engine.set_playhead_position(beat)?,
            None => self.handle.seek(beat)?,
        }
        Ok(())
    }

    pub fn playhead(&self) -> f64 {
        self.handle.playhead()
    }

    pub fn is_playing(&self) -> bool {
        self.handle.is_playing()
    }

    pub fn bpm(&self) -> f64 {
        self.handle.bpm()
    }

    // --- Real-time streams ---

    /// Open the output device and move the engine into its callback.
    pub fn start_output(&mut self) -> Result<(), SessionError> {
        let engine = self.engine.take().ok_or(SessionError::AlreadyStarted)?;
        let mut output = CpalOutput::new().map_err(SessionError::Audio)?;
        if let Err(e) = output.build_stream(engine) {
            // The engine is gone with the failed stream; surface the error
            return Err(SessionError::Audio(e));
        }
        output.start().map_err(SessionError::Audio)?;
        self.output = Some(output);
        Ok(())
    }

    /// Output device sample rate, once the stream is open.
    pub fn output_sample_rate(&self) -> Option<u32> {
        self.output.as_ref().map(|o| o.sample_rate())
    }

    /// Open the input device and spawn a capture drain thread.
    pub fn start_recording(&mut self) -> Result<Recorder, SessionError> {
        let mut input = CpalInput::new().map_err(SessionError::Audio)?;
        let format = RecordFormat {
            sample_rate: input.sample_rate(),
            channels: input.channels(),
        };
        let (producer, consumer) = AudioRecordQueue::new(format, RECORD_BLOCK);
        input.build_stream(producer).map_err(SessionError::Audio)?;
        input.start().map_err(SessionError::Audio)?;
        self.input = Some(input);
        Ok(Recorder::spawn(consumer, RECORD_BLOCK))
    }

    /// Stop the input stream.
    pub fn stop_recording(&mut self) {
        if let Some(mut input) = self.input.take() {
            let _ = input.stop();
        }
    }

    // --- Offline rendering (engine still local) ---

    /// Render up to `max_frames` from the playhead start position into
    /// planar stereo buffers.
    pub fn render_frames(
        &mut self,
        sample_rate: u32,
        max_frames: usize,
    ) -> Result<(Vec<f32>, Vec<f32>), SessionError> {
        const BLOCK: usize = 512;
        let engine = self.engine.as_mut().ok_or(SessionError::AlreadyStarted)?;
        engine.play();

        let mut block = AudioBuffer::<f32>::new(BLOCK, 2);
        let mut left = Vec::with_capacity(max_frames);
        let mut right = Vec::with_capacity(max_frames);
        while left.len() < max_frames {
            engine.process(&mut block, sample_rate as f64);
            let take = BLOCK.min(max_frames - left.len());
            left.extend_from_slice(&block.channel(0)[..take]);
            right.extend_from_slice(&block.channel(1)[..take]);
        }
        engine.stop();
        Ok((left, right))
    }

    /// Render up to `max_seconds` into an in-memory WAV file.
    pub fn render_to_wav(
        &mut self,
        sample_rate: u32,
        max_seconds: u32,
    ) -> Result<Vec<u8>, SessionError> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let (left, right) = self.render_frames(sample_rate, max_frames)?;
        Ok(wav::channels_to_wav(&left, &right, sample_rate))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
