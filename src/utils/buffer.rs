//! Helpers for interleaved f32 audio buffers.

// -------------------------------------------------------------------------------------------------

/// Fill the given buffer with silence.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

/// Multiply all samples in the buffer by a constant factor.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], factor: f32) {
    for sample in buffer.iter_mut() {
        *sample *= factor;
    }
}

/// Add `source` into `target`. Both buffers must have the same length.
#[inline]
pub fn add_buffer(target: &mut [f32], source: &[f32]) {
    debug_assert_eq!(target.len(), source.len());
    for (out, inp) in target.iter_mut().zip(source) {
        *out += *inp;
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_ops() {
        let mut target = [1.0, 2.0, 3.0, 4.0];
        scale_buffer(&mut target, 0.5);
        assert_eq!(target, [0.5, 1.0, 1.5, 2.0]);

        add_buffer(&mut target, &[0.5, 1.0, 1.5, 2.0]);
        assert_eq!(target, [1.0, 2.0, 3.0, 4.0]);

        clear_buffer(&mut target);
        assert_eq!(target, [0.0; 4]);
    }
}
