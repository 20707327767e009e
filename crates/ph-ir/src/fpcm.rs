//! Fixed-size f32 sample buffer.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

/// A fixed-length block of mono f32 samples.
///
/// The length is set at creation and never changes, so a buffer handed
/// back to a [`BufferPool`](crate::BufferPool) can be reused as-is.
#[derive(Debug, Default, PartialEq)]
pub struct Fpcm {
    data: Box<[f32]>,
}

impl Fpcm {
    /// Create a new silent buffer of `len` samples.
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0.0; len].into_boxed_slice(),
        }
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Scale all samples by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for s in self.data.iter_mut() {
            *s *= gain;
        }
    }

    /// Sum `source` into this buffer, sample by sample, up to the shorter length.
    pub fn mix_from(&mut self, source: &[f32]) {
        for (dst, src) in self.data.iter_mut().zip(source) {
            *dst += *src;
        }
    }
}

impl From<Vec<f32>> for Fpcm {
    fn from(v: Vec<f32>) -> Self {
        Self {
            data: v.into_boxed_slice(),
        }
    }
}

impl Deref for Fpcm {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data
    }
}

impl DerefMut for Fpcm {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}
