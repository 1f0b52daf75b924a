//! Multichannel audio buffer with planar, 64-byte-aligned channel storage.

use alloc::alloc::{alloc, dealloc, Layout};
use alloc::vec::Vec;
use arrayvec::ArrayVec;
use core::ptr::NonNull;

/// Alignment of every channel plane, in bytes.
pub const BUFFER_ALIGN: usize = 64;

/// Channel count up to which the channel table is stored inline.
pub const INLINE_CHANNELS: usize = 16;

/// One aligned channel plane. Frame count is owned by the buffer.
struct Plane<T> {
    ptr: NonNull<T>,
    frames: usize,
}

impl<T: Copy + Default> Plane<T> {
    /// Allocate a plane of `frames` samples, all set to `T::default()`.
    fn new(frames: usize) -> Self {
        if frames == 0 {
            return Self { ptr: NonNull::dangling(), frames: 0 };
        }
        let layout = Self::layout(frames);
        // Fatal on OOM: a realtime buffer that cannot exist has no recovery path.
        let raw = unsafe { alloc(layout) } as *mut T;
        let ptr = NonNull::new(raw).expect("audio buffer allocation failed");
        for i in 0..frames {
            unsafe { ptr.as_ptr().add(i).write(T::default()) };
        }
        Self { ptr, frames }
    }

    fn layout(frames: usize) -> Layout {
        Layout::from_size_align(frames * core::mem::size_of::<T>(), BUFFER_ALIGN)
            .expect("invalid buffer layout")
    }

    fn as_slice(&self) -> &[T] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.frames) }
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.frames) }
    }
}

impl<T> Drop for Plane<T> {
    fn drop(&mut self) {
        if self.frames > 0 {
            let layout = Layout::from_size_align(
                self.frames * core::mem::size_of::<T>(),
                BUFFER_ALIGN,
            )
            .expect("invalid buffer layout");
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
        }
    }
}

// Planes are exclusively owned; the raw pointer never aliases.
unsafe impl<T: Send> Send for Plane<T> {}
unsafe impl<T: Sync> Sync for Plane<T> {}

/// Channel table: inline for the common mono/stereo case, heap beyond.
enum ChannelTable<T> {
    Inline(ArrayVec<Plane<T>, INLINE_CHANNELS>),
    Spilled(Vec<Plane<T>>),
}

impl<T> ChannelTable<T> {
    fn as_slice(&self) -> &[Plane<T>] {
        match self {
            ChannelTable::Inline(v) => v,
            ChannelTable::Spilled(v) => v,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [Plane<T>] {
        match self {
            ChannelTable::Inline(v) => v,
            ChannelTable::Spilled(v) => v,
        }
    }
}

/// A multichannel audio buffer in planar layout.
///
/// Every channel plane is 64-byte aligned and `frames` samples long.
/// Resizing reallocates rather than growing in place; block sizes are
/// negotiated with the device, not appended to.
pub struct AudioBuffer<T> {
    channels: ChannelTable<T>,
    frames: usize,
}

impl<T: Copy + Default> AudioBuffer<T> {
    /// Create a new silent buffer with the given dimensions.
    pub fn new(frames: usize, n_channels: usize) -> Self {
        let channels = if n_channels <= INLINE_CHANNELS {
            let mut table = ArrayVec::new();
            for _ in 0..n_channels {
                table.push(Plane::new(frames));
            }
            ChannelTable::Inline(table)
        } else {
            ChannelTable::Spilled((0..n_channels).map(|_| Plane::new(frames)).collect())
        };
        Self { channels, frames }
    }

    /// Number of frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels.as_slice().len()
    }

    /// Read-only access to one channel's sample data.
    pub fn channel(&self, ch: usize) -> &[T] {
        self.channels.as_slice()[ch].as_slice()
    }

    /// Mutable access to one channel's sample data.
    pub fn channel_mut(&mut self, ch: usize) -> &mut [T] {
        self.channels.as_mut_slice()[ch].as_mut_slice()
    }

    /// Fill all samples with `T::default()`.
    pub fn silence(&mut self) {
        for plane in self.channels.as_mut_slice() {
            plane.as_mut_slice().fill(T::default());
        }
    }

    /// Reallocate every channel to `frames` samples.
    ///
    /// When `clear` is false the first `min(old, new)` samples of each
    /// channel are preserved and the remainder is default-filled, so a
    /// device reconfiguration does not lose continuity.
    pub fn resize(&mut self, frames: usize, clear: bool) {
        if frames == self.frames {
            if clear {
                self.silence();
            }
            return;
        }
        for plane in self.channels.as_mut_slice() {
            let mut fresh = Plane::new(frames);
            if !clear {
                let keep = plane.frames.min(frames);
                fresh.as_mut_slice()[..keep].copy_from_slice(&plane.as_slice()[..keep]);
            }
            *plane = fresh;
        }
        self.frames = frames;
    }
}

impl AudioBuffer<f32> {
    /// Sum overlapping channels from `source` into this buffer.
    pub fn mix_from(&mut self, source: &AudioBuffer<f32>) {
        let chs = self.channels().min(source.channels());
        let frs = self.frames.min(source.frames);
        for ch in 0..chs {
            let dst = self.channel_mut(ch);
            let src = source.channel(ch);
            for i in 0..frs {
                dst[i] += src[i];
            }
        }
    }

    /// Sum one channel of `source` into one channel of this buffer with gain.
    pub fn mix_channel_scaled(&mut self, dst_ch: usize, source: &AudioBuffer<f32>, src_ch: usize, gain: f32) {
        let frs = self.frames.min(source.frames);
        let dst = self.channels.as_mut_slice()[dst_ch].as_mut_slice();
        let src = source.channel(src_ch);
        for i in 0..frs {
            dst[i] += src[i] * gain;
        }
    }

    /// Scale all samples by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for plane in self.channels.as_mut_slice() {
            for s in plane.as_mut_slice() {
                *s *= gain;
            }
        }
    }

    /// Peak absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        let mut peak = 0.0f32;
        for plane in self.channels.as_slice() {
            for &s in plane.as_slice() {
                let a = s.abs();
                if a > peak {
                    peak = a;
                }
            }
        }
        peak
    }
}

impl<T: Copy + Default> Clone for AudioBuffer<T> {
    fn clone(&self) -> Self {
        let mut out = Self::new(self.frames, self.channels());
        for ch in 0..self.channels() {
            out.channel_mut(ch).copy_from_slice(self.channel(ch));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let buf = AudioBuffer::<f32>::new(4, 2);
        assert_eq!(buf.frames(), 4);
        assert_eq!(buf.channels(), 2);
        assert!(buf.channel(0).iter().all(|&s| s == 0.0));
        assert!(buf.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn planes_are_64_byte_aligned() {
        let buf = AudioBuffer::<f32>::new(33, 3);
        for ch in 0..3 {
            assert_eq!(buf.channel(ch).as_ptr() as usize % BUFFER_ALIGN, 0);
        }
    }

    #[test]
    fn channel_mut_writes_correctly() {
        let mut buf = AudioBuffer::<f32>::new(2, 2);
        buf.channel_mut(0)[0] = 1.0;
        buf.channel_mut(1)[1] = -0.5;
        assert_eq!(buf.channel(0), &[1.0, 0.0]);
        assert_eq!(buf.channel(1), &[0.0, -0.5]);
    }

    #[test]
    fn silence_clears_data() {
        let mut buf = AudioBuffer::<f32>::new(2, 1);
        buf.channel_mut(0)[0] = 1.0;
        buf.silence();
        assert_eq!(buf.channel(0), &[0.0, 0.0]);
    }

    #[test]
    fn resize_preserves_prefix() {
        let n = 8;
        let mut buf = AudioBuffer::<f32>::new(n, 2);
        for ch in 0..2 {
            for (i, s) in buf.channel_mut(ch).iter_mut().enumerate() {
                *s = (ch * 100 + i) as f32;
            }
        }
        buf.resize(2 * n, false);
        assert_eq!(buf.frames(), 2 * n);
        for ch in 0..2 {
            for i in 0..n {
                assert_eq!(buf.channel(ch)[i], (ch * 100 + i) as f32);
            }
            for i in n..2 * n {
                assert_eq!(buf.channel(ch)[i], 0.0);
            }
        }
    }

    #[test]
    fn resize_with_clear_zeroes() {
        let mut buf = AudioBuffer::<f32>::new(4, 1);
        buf.channel_mut(0).fill(1.0);
        buf.resize(2, true);
        assert_eq!(buf.channel(0), &[0.0, 0.0]);
    }

    #[test]
    fn resize_shrink_keeps_head() {
        let mut buf = AudioBuffer::<f32>::new(4, 1);
        for (i, s) in buf.channel_mut(0).iter_mut().enumerate() {
            *s = i as f32;
        }
        buf.resize(2, false);
        assert_eq!(buf.channel(0), &[0.0, 1.0]);
    }

    #[test]
    fn spilled_channel_table_beyond_inline() {
        let mut buf = AudioBuffer::<f32>::new(4, INLINE_CHANNELS + 4);
        assert_eq!(buf.channels(), INLINE_CHANNELS + 4);
        buf.channel_mut(INLINE_CHANNELS + 3)[1] = 0.25;
        assert_eq!(buf.channel(INLINE_CHANNELS + 3)[1], 0.25);
        assert_eq!(
            buf.channel(INLINE_CHANNELS + 3).as_ptr() as usize % BUFFER_ALIGN,
            0
        );
        buf.resize(8, false);
        assert_eq!(buf.channel(INLINE_CHANNELS + 3)[1], 0.25);
    }

    #[test]
    fn mix_from_sums_channels() {
        let mut dst = AudioBuffer::<f32>::new(2, 2);
        dst.channel_mut(0)[0] = 0.5;
        let mut src = AudioBuffer::<f32>::new(2, 2);
        src.channel_mut(0)[0] = 0.3;
        src.channel_mut(1)[1] = 0.7;
        dst.mix_from(&src);
        assert!((dst.channel(0)[0] - 0.8).abs() < 1e-6);
        assert!((dst.channel(1)[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn mix_channel_scaled_applies_gain() {
        let mut dst = AudioBuffer::<f32>::new(2, 2);
        let mut src = AudioBuffer::<f32>::new(2, 1);
        src.channel_mut(0)[0] = 1.0;
        src.channel_mut(0)[1] = -1.0;
        dst.mix_channel_scaled(1, &src, 0, 0.5);
        assert!((dst.channel(1)[0] - 0.5).abs() < 1e-6);
        assert!((dst.channel(1)[1] + 0.5).abs() < 1e-6);
        assert_eq!(dst.channel(0)[0], 0.0);
    }

    #[test]
    fn peak_finds_largest_magnitude() {
        let mut buf = AudioBuffer::<f32>::new(2, 2);
        buf.channel_mut(0)[1] = 0.3;
        buf.channel_mut(1)[0] = -0.9;
        assert!((buf.peak() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn i16_buffer_defaults_to_zero() {
        let buf = AudioBuffer::<i16>::new(3, 1);
        assert_eq!(buf.channel(0), &[0, 0, 0]);
    }
}
