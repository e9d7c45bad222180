//! Lock-free SPSC ring buffer between the alert worker and the output callback.
//!
//! The worker thread decodes and resamples a clip, then pushes samples with
//! `push_slice`; the cpal output callback drains them with `pop_slice`. Neither
//! side blocks or allocates inside the callback.

pub mod chunk;

use ringbuf::{traits::Split, HeapRb};

pub use chunk::AudioClip;
pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the alert worker.
pub type PlaybackProducer = ringbuf::HeapProd<f32>;

/// Consumer half, moved into the output callback.
pub type PlaybackConsumer = ringbuf::HeapCons<f32>;

/// Capacity: 2^18 = 262 144 samples, about 5.4 s of mono audio at 48 kHz.
/// Longer clips are fed in as the callback drains the buffer.
pub const PLAYBACK_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_playback_ring() -> (PlaybackProducer, PlaybackConsumer) {
    HeapRb::<f32>::new(PLAYBACK_CAPACITY).split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_preserves_sample_order() {
        let (mut tx, mut rx) = create_playback_ring();
        assert_eq!(tx.push_slice(&[0.1, 0.2, 0.3]), 3);

        let mut out = [0f32; 4];
        let read = rx.pop_slice(&mut out);
        assert_eq!(read, 3);
        assert_eq!(&out[..3], &[0.1, 0.2, 0.3]);
        assert!(rx.is_empty());
    }
}
