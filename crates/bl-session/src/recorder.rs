//! Capture drain thread.
//!
//! Pulls device blocks from a record queue consumer as they arrive,
//! accumulating them off the audio thread. `finish` flushes the tail
//! and returns the captured take as an in-memory WAV file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bl_engine::RecordConsumer;

use crate::wav;

/// A running capture session.
pub struct Recorder {
    stop_signal: Arc<AtomicBool>,
    thread: Option<JoinHandle<Vec<u8>>>,
}

impl Recorder {
    /// Spawn a drain thread over the consumer side of a record queue.
    /// `device_block` is the capture block size in frames.
    pub fn spawn(mut consumer: RecordConsumer, device_block: usize) -> Self {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = stop_signal.clone();

        let thread = std::thread::spawn(move || {
            let format = consumer.format();
            let chunk = (device_block * format.channels as usize).max(1);
            let mut block = vec![0.0f32; chunk];
            let mut samples: Vec<f32> = Vec::new();

            loop {
                let stopping = stop.load(Ordering::Acquire);
                while consumer.read_exact(&mut block) {
                    samples.extend_from_slice(&block);
                }
                if stopping {
                    consumer.read_remaining(&mut samples);
                    break;
                }
                consumer.wait(Duration::from_millis(100));
            }

            wav::interleaved_to_wav(&samples, format.channels, format.sample_rate)
        });

        Self { stop_signal, thread: Some(thread) }
    }

    /// Stop draining, flush the tail, and return the take as WAV data.
    pub fn finish(mut self) -> std::io::Result<Vec<u8>> {
        self.stop_signal.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| std::io::Error::other("record drain thread panicked")),
            None => Err(std::io::Error::other("recorder already finished")),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
