//! Recorded input history held in a chain of persistent pool buffers.
//!
//! Positions are absolute: sample `n` is the `n`th sample ever pushed.
//! The chain covers `[start, end)`; everything outside reads as silence.
//! Buffers wholly behind the oldest position still needed are trimmed and
//! handed back to the pool, which is what keeps long-running effects bounded.

use heapless::Deque;
use ph_ir::{BufferPool, PersistentBuf};

use crate::graph::{blocks, NodeKey, Render};

/// Most buffers one history will hold. Pushing past it drops the oldest.
pub const MAX_BUFFERS: usize = 64;

enum Segment<'a> {
    Recorded(&'a [f32]),
    Silent(usize),
}

pub struct SampleHistory {
    bufs: Deque<PersistentBuf, MAX_BUFFERS>,
    /// Absolute position of `bufs.front()[0]`.
    base: u64,
    end: u64,
    /// Length of each buffer, taken from the pool on first push.
    buf_len: usize,
}

impl SampleHistory {
    pub fn new() -> Self {
        Self {
            bufs: Deque::new(),
            base: 0,
            end: 0,
            buf_len: 0,
        }
    }

    /// Oldest position still held.
    pub fn start(&self) -> u64 {
        self.base.min(self.end)
    }

    /// One past the newest recorded position.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn buffer_count(&self) -> usize {
        self.bufs.len()
    }

    /// Samples this history can hold at most with the given pool.
    pub fn capacity(pool: &BufferPool) -> usize {
        pool.persistent_len() * MAX_BUFFERS
    }

    fn buf(&self, idx: usize) -> &PersistentBuf {
        let (a, b) = self.bufs.as_slices();
        if idx < a.len() {
            &a[idx]
        } else {
            &b[idx - a.len()]
        }
    }

    fn buf_mut(&mut self, idx: usize) -> &mut PersistentBuf {
        let (a, b) = self.bufs.as_mut_slices();
        if idx < a.len() {
            &mut a[idx]
        } else {
            &mut b[idx - a.len()]
        }
    }

    /// Append `samples` at the end of the chain.
    pub fn push(&mut self, pool: &BufferPool, mut samples: &[f32]) {
        if self.buf_len == 0 {
            self.buf_len = pool.persistent_len();
        }
        let len = self.buf_len;
        if len == 0 {
            self.end += samples.len() as u64;
            self.base = self.end;
            return;
        }
        while !samples.is_empty() {
            let rel = (self.end - self.base) as usize;
            let (mut idx, off) = (rel / len, rel % len);
            if idx == self.bufs.len() {
                if self.bufs.is_full() {
                    if let Some(old) = self.bufs.pop_front() {
                        pool.release_persistent(old);
                        self.base += len as u64;
                        idx -= 1;
                    }
                }
                // Cannot fail: a slot was just freed if the deque was full.
                let _ = self.bufs.push_back(pool.persistent());
            }
            let n = (len - off).min(samples.len());
            self.buf_mut(idx)[off..off + n].copy_from_slice(&samples[..n]);
            self.end += n as u64;
            samples = &samples[n..];
        }
    }

    /// Pull `n` samples of `input` through scratch buffers and append them.
    pub fn record(&mut self, ctx: &mut Render<'_>, input: NodeKey, n: usize) {
        let pool = ctx.pool();
        for (_, len) in blocks(0, n, ctx.block_size()) {
            let mut scratch = pool.scratch();
            ctx.accumulate(input, &mut scratch, 0, len);
            self.push(pool, &scratch[..len]);
        }
    }

    fn segment(&self, pos: u64, max: usize) -> Segment<'_> {
        if pos < self.base {
            return Segment::Silent(((self.base - pos) as usize).min(max));
        }
        if pos >= self.end {
            return Segment::Silent(max);
        }
        let rel = (pos - self.base) as usize;
        let (idx, off) = (rel / self.buf_len, rel % self.buf_len);
        let avail = (self.buf_len - off).min((self.end - pos) as usize).min(max);
        Segment::Recorded(&self.buf(idx)[off..off + avail])
    }

    /// Sample at `pos`, or silence outside the held range.
    pub fn get(&self, pos: u64) -> f32 {
        match self.segment(pos, 1) {
            Segment::Recorded(s) => s[0],
            Segment::Silent(_) => 0.0,
        }
    }

    /// Copy `out.len()` samples starting at `from` into `out`.
    pub fn read(&self, from: u64, out: &mut [f32]) {
        let mut done = 0;
        while done < out.len() {
            let pos = from + done as u64;
            let n = match self.segment(pos, out.len() - done) {
                Segment::Recorded(s) => {
                    out[done..done + s.len()].copy_from_slice(s);
                    s.len()
                }
                Segment::Silent(n) => {
                    out[done..done + n].fill(0.0);
                    n
                }
            };
            done += n;
        }
    }

    /// Add `gain` times the samples starting at `from` onto `out`.
    pub fn add_scaled(&self, from: u64, out: &mut [f32], gain: f32) {
        let mut done = 0;
        while done < out.len() {
            let pos = from + done as u64;
            let n = match self.segment(pos, out.len() - done) {
                Segment::Recorded(s) => {
                    for (o, x) in out[done..done + s.len()].iter_mut().zip(s) {
                        *o += x * gain;
                    }
                    s.len()
                }
                Segment::Silent(n) => n,
            };
            done += n;
        }
    }

    /// Release every buffer that lies wholly before `pos`. The buffer
    /// currently being written is kept.
    pub fn trim_before(&mut self, pool: &BufferPool, pos: u64) {
        let len = self.buf_len as u64;
        let limit = pos.min(self.end);
        while len > 0 && self.base + len <= limit {
            match self.bufs.pop_front() {
                Some(old) => pool.release_persistent(old),
                None => break,
            }
            self.base += len;
        }
    }

    /// Repeat the first `period` samples in place to fill the first buffer
    /// with whole copies. Only applies when the chain is exactly one
    /// recording of `period` samples that fits a single buffer.
    /// Returns the new recorded length.
    pub fn tile_front(&mut self, period: usize) -> usize {
        let held = (self.end - self.base) as usize;
        if period == 0 || self.bufs.len() != 1 || held != period || period > self.buf_len {
            return held;
        }
        let copies = self.buf_len / period;
        let buf = self.buf_mut(0);
        for k in 1..copies {
            buf.copy_within(0..period, k * period);
        }
        self.end = self.base + (copies * period) as u64;
        copies * period
    }

    /// Hand every buffer back to `pool` and forget the recording.
    pub fn release_all(&mut self, pool: &BufferPool) {
        while let Some(buf) = self.bufs.pop_front() {
            pool.release_persistent(buf);
        }
        self.base = self.end;
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(from: usize, n: usize) -> Vec<f32> {
        (from..from + n).map(|x| x as f32).collect()
    }

    #[test]
    fn push_spans_buffers() {
        let pool = BufferPool::new(4, 8);
        let mut h = SampleHistory::new();
        h.push(&pool, &ramp(0, 20));
        assert_eq!(h.buffer_count(), 3);
        assert_eq!(h.end(), 20);
        assert_eq!(h.get(0), 0.0);
        assert_eq!(h.get(13), 13.0);
        assert_eq!(h.get(19), 19.0);
        assert_eq!(h.get(20), 0.0);
        h.release_all(&pool);
        assert_eq!(pool.outstanding_persistent(), 0);
    }

    #[test]
    fn read_pads_with_silence() {
        let pool = BufferPool::new(4, 8);
        let mut h = SampleHistory::new();
        h.push(&pool, &ramp(1, 10));
        let mut out = [9.0; 6];
        h.read(7, &mut out);
        assert_eq!(out, [8.0, 9.0, 10.0, 0.0, 0.0, 0.0]);
        h.release_all(&pool);
    }

    #[test]
    fn trim_keeps_the_write_buffer() {
        let pool = BufferPool::new(4, 8);
        let mut h = SampleHistory::new();
        h.push(&pool, &ramp(0, 20));
        h.trim_before(&pool, 15);
        assert_eq!(h.buffer_count(), 2);
        assert_eq!(h.start(), 8);
        assert_eq!(h.get(7), 0.0);
        assert_eq!(h.get(8), 8.0);
        h.trim_before(&pool, 100);
        assert_eq!(h.buffer_count(), 1);
        assert_eq!(h.get(19), 19.0);
        assert_eq!(pool.outstanding_persistent(), 1);
        h.release_all(&pool);
        assert_eq!(pool.outstanding_persistent(), 0);
    }

    #[test]
    fn add_scaled_sums_onto_output() {
        let pool = BufferPool::new(4, 8);
        let mut h = SampleHistory::new();
        h.push(&pool, &[1.0, 2.0, 3.0]);
        let mut out = [1.0; 4];
        h.add_scaled(1, &mut out, 0.5);
        assert_eq!(out, [2.0, 2.5, 1.0, 1.0]);
        h.release_all(&pool);
    }

    #[test]
    fn tile_fills_one_buffer() {
        let pool = BufferPool::new(4, 10);
        let mut h = SampleHistory::new();
        h.push(&pool, &[1.0, 2.0, 3.0]);
        assert_eq!(h.tile_front(3), 9);
        let mut out = [0.0; 10];
        h.read(0, &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 0.0]);
        h.release_all(&pool);
    }

    #[test]
    fn full_chain_drops_oldest() {
        let pool = BufferPool::new(4, 2);
        let mut h = SampleHistory::new();
        h.push(&pool, &ramp(0, 2 * MAX_BUFFERS + 1));
        assert_eq!(h.buffer_count(), MAX_BUFFERS);
        assert_eq!(h.start(), 2);
        assert_eq!(h.get(1), 0.0);
        assert_eq!(h.get(2), 2.0);
        h.release_all(&pool);
        assert_eq!(pool.outstanding_persistent(), 0);
    }
}
