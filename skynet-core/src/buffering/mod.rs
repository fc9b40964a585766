//! Lock-free SPSC ring buffer between the microphone callback and the capture worker.
//!
//! `ringbuf::HeapRb<f32>` gives a wait-free `push_slice`, safe to call from
//! the real-time input callback.

pub mod frame;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, owned by the device input callback.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, owned by the capture worker.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^18 = 262 144 f32 samples, about 5.4 s at 48 kHz. The worker drains every
/// few milliseconds, so this only fills if the worker stalls.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
