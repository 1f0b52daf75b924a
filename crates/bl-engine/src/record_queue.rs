//! Lock-free capture ring between the audio input callback and the
//! disk writer thread.
//!
//! The audio side pushes interleaved f32 frames with `write`; a drain
//! thread parks on `wait` and pulls whole device blocks with
//! `read_exact`. The ring holds several device blocks of slack, so
//! the writer absorbs disk latency without the audio thread blocking.
//! Sustained overrun is counted, not propagated: the audio callback
//! spins briefly, then drops the block and moves on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Device blocks of slack held by the capture ring.
const RING_BLOCKS: usize = 8;

/// Spin bound before a write gives up and drops.
const MAX_WRITE_SPINS: u32 = 1 << 16;

/// Stream format of a capture session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

struct RecordShared {
    /// Data pending for the drain thread
    should_signal: AtomicBool,
    /// Samples dropped after the spin bound (monitoring)
    dropped: AtomicU64,
    gate: Mutex<()>,
    cond: Condvar,
}

/// A capture ring for one input stream.
pub struct AudioRecordQueue;

impl AudioRecordQueue {
    /// Create a ring sized for `device_block` frames of interleaved
    /// data, returning the audio-side producer and writer-side
    /// consumer.
    pub fn new(format: RecordFormat, device_block: usize) -> (RecordProducer, RecordConsumer) {
        let capacity = device_block * format.channels as usize * RING_BLOCKS;
        let (tx, rx) = HeapRb::<f32>::new(capacity.max(1)).split();
        let shared = Arc::new(RecordShared {
            should_signal: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            gate: Mutex::new(()),
            cond: Condvar::new(),
        });
        (
            RecordProducer { tx, shared: shared.clone(), format },
            RecordConsumer { rx, shared, format },
        )
    }
}

/// Audio-callback side of the capture ring.
pub struct RecordProducer {
    tx: HeapProd<f32>,
    shared: Arc<RecordShared>,
    format: RecordFormat,
}

impl RecordProducer {
    /// Stream format.
    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Push interleaved samples and wake the drain thread. Spins
    /// briefly when the ring is full; on sustained overrun the rest of
    /// the slice is dropped and counted, returning false.
    pub fn write(&mut self, samples: &[f32]) -> bool {
        let mut written = 0;
        let mut spins = 0u32;
        while written < samples.len() {
            written += self.tx.push_slice(&samples[written..]);
            if written == samples.len() {
                break;
            }
            spins += 1;
            if spins >= MAX_WRITE_SPINS {
                self.shared
                    .dropped
                    .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
                self.signal();
                return false;
            }
            std::hint::spin_loop();
        }
        self.signal();
        true
    }

    /// Samples dropped on the floor so far (monitoring).
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn signal(&self) {
        self.shared.should_signal.store(true, Ordering::Release);
        // Lock the gate so the wake cannot race a waiter between its
        // flag check and the park.
        drop(self.shared.gate.lock());
        self.shared.cond.notify_one();
    }
}

/// Writer-thread side of the capture ring.
pub struct RecordConsumer {
    rx: HeapCons<f32>,
    shared: Arc<RecordShared>,
    format: RecordFormat,
}

impl RecordConsumer {
    /// Stream format.
    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Samples currently buffered.
    pub fn available(&self) -> usize {
        self.rx.occupied_len()
    }

    /// Pop exactly `out.len()` samples, or none. Returns false when
    /// the ring holds less than a full read.
    pub fn read_exact(&mut self, out: &mut [f32]) -> bool {
        if self.rx.occupied_len() < out.len() {
            return false;
        }
        let mut read = 0;
        while read < out.len() {
            read += self.rx.pop_slice(&mut out[read..]);
        }
        true
    }

    /// Drain whatever is buffered into `out`, returning the sample
    /// count. Used to flush the tail when a session stops.
    pub fn read_remaining(&mut self, out: &mut Vec<f32>) -> usize {
        let n = self.rx.occupied_len();
        let start = out.len();
        out.resize(start + n, 0.0);
        let mut read = 0;
        while read < n {
            read += self.rx.pop_slice(&mut out[start + read..]);
        }
        n
    }

    /// Park until the producer signals or `timeout` passes. Returns
    /// true when woken by a signal.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.shared.should_signal.swap(false, Ordering::Acquire) {
            return true;
        }
        let guard = match self.shared.gate.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = self.shared.cond.wait_timeout(guard, timeout);
        self.shared.should_signal.swap(false, Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FMT: RecordFormat = RecordFormat { sample_rate: 48000, channels: 2 };

    #[test]
    fn write_then_read_exact_round_trip() {
        let (mut tx, mut rx) = AudioRecordQueue::new(FMT, 128);
        let block: Vec<f32> = (0..256).map(|i| i as f32).collect();
        assert!(tx.write(&block));
        assert_eq!(rx.available(), 256);
        let mut out = vec![0.0; 256];
        assert!(rx.read_exact(&mut out));
        assert_eq!(out, block);
    }

    #[test]
    fn read_exact_is_all_or_nothing() {
        let (mut tx, mut rx) = AudioRecordQueue::new(FMT, 128);
        tx.write(&[1.0; 100]);
        let mut out = vec![0.0; 256];
        assert!(!rx.read_exact(&mut out));
        assert_eq!(rx.available(), 100);
    }

    #[test]
    fn overrun_drops_and_counts() {
        // Ring holds 1 * 1 * 8 = 8 samples
        let fmt = RecordFormat { sample_rate: 48000, channels: 1 };
        let (mut tx, _rx) = AudioRecordQueue::new(fmt, 1);
        assert!(tx.write(&[0.0; 8]));
        assert!(!tx.write(&[0.0; 4]));
        assert_eq!(tx.dropped(), 4);
    }

    #[test]
    fn wait_sees_pending_signal_without_parking() {
        let (mut tx, rx) = AudioRecordQueue::new(FMT, 128);
        tx.write(&[0.5; 16]);
        assert!(rx.wait(Duration::from_millis(0)));
        // Signal is consumed
        assert!(!rx.wait(Duration::from_millis(1)));
    }

    #[test]
    fn read_remaining_flushes_tail() {
        let (mut tx, mut rx) = AudioRecordQueue::new(FMT, 128);
        tx.write(&[0.25; 37]);
        let mut tail = Vec::new();
        assert_eq!(rx.read_remaining(&mut tail), 37);
        assert!(tail.iter().all(|&s| s == 0.25));
        assert_eq!(rx.available(), 0);
    }

    #[test]
    fn producer_wakes_parked_consumer() {
        let (mut tx, rx) = AudioRecordQueue::new(FMT, 128);
        let t = std::thread::spawn(move || rx.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        tx.write(&[1.0; 4]);
        assert!(t.join().unwrap());
    }
}
