//! Best-effort audio tap for visualization consumers (oscilloscopes, meters).
//!
//! The engine copies every finished output buffer into a lock-free SPSC ring buffer. When
//! the consumer lags and the buffer has insufficient free space, the write is skipped as
//! a whole - visualization never blocks or degrades audio.

use rb::{Consumer, Producer, RbConsumer, RbInspector, RbProducer, SpscRb, RB};

// -------------------------------------------------------------------------------------------------

/// Ring buffer capacity in samples: one second of interleaved stereo at 44.1 kHz.
const SCOPE_BUFFER_SIZE: usize = 2 * 44100;

// -------------------------------------------------------------------------------------------------

/// Producing side, owned by the engine.
pub(crate) struct ScopeSender {
    buffer: SpscRb<f32>,
    producer: Producer<f32>,
}

impl ScopeSender {
    /// Create a connected sender/reader pair.
    pub fn new() -> (ScopeSender, ScopeReader) {
        let buffer = SpscRb::new(SCOPE_BUFFER_SIZE);
        let producer = buffer.producer();
        let consumer = buffer.consumer();
        (ScopeSender { buffer, producer }, ScopeReader { consumer })
    }

    /// Write a full interleaved stereo buffer, or nothing at all when the consumer has
    /// not caught up yet.
    pub fn write_skipping(&self, interleaved: &[f32]) {
        if self.buffer.slots_free() >= interleaved.len() {
            let _ = self.producer.write(interleaved);
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Consuming side, handed out once to the visualization client.
pub struct ScopeReader {
    consumer: Consumer<f32>,
}

impl ScopeReader {
    /// Read up to `output.len()` interleaved stereo samples. Returns the number of
    /// samples read, which may be zero when no new audio arrived.
    pub fn read(&self, output: &mut [f32]) -> usize {
        self.consumer.read(output).unwrap_or(0)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transports_audio_in_order() {
        let (sender, reader) = ScopeSender::new();
        let samples: Vec<f32> = (0..256).map(|i| i as f32).collect();
        sender.write_skipping(&samples);

        let mut received = vec![0.0f32; 256];
        assert_eq!(reader.read(&mut received), 256);
        assert_eq!(received, samples);
    }

    #[test]
    fn skips_writes_when_full() {
        let (sender, reader) = ScopeSender::new();
        let chunk = vec![1.0f32; SCOPE_BUFFER_SIZE];
        sender.write_skipping(&chunk);

        // the buffer is full now: this write is dropped completely
        let marker = vec![2.0f32; 16];
        sender.write_skipping(&marker);

        let mut received = vec![0.0f32; SCOPE_BUFFER_SIZE];
        assert_eq!(reader.read(&mut received), SCOPE_BUFFER_SIZE);
        assert!(received.iter().all(|s| *s == 1.0));
        assert_eq!(reader.read(&mut received), 0);
    }
}
