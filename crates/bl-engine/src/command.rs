//! Engine command queue.
//!
//! Structural and transport changes from the control thread travel
//! through this SPSC ring and are applied by the audio thread at the
//! next block boundary, so the track list and clip pools are never
//! mutated mid-render.

use alloc::boxed::Box;

use ringbuf::traits::Split;
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::track::Track;

/// Capacity of the engine command ring.
pub const COMMAND_QUEUE_LEN: usize = 64;

/// A command applied at the next block boundary.
pub enum EngineCommand {
    /// Start playback from the playhead start position
    Play,
    /// Stop playback and rewind to the playhead start position
    Stop,
    /// Move the playhead start position (beats); only valid stopped
    Seek(f64),
    /// Change the tempo
    SetBpm(f64),
    /// Append a fully built track
    AddTrack(Box<Track>),
    /// Remove the track at this index
    DeleteTrack(usize),
    /// Reorder tracks
    MoveTrack { from: usize, to: usize },
}

/// Create the command ring, producer side for the control thread and
/// consumer side for the audio thread.
pub fn command_queue() -> (HeapProd<EngineCommand>, HeapCons<EngineCommand>) {
    HeapRb::new(COMMAND_QUEUE_LEN).split()
}
