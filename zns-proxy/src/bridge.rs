//! The bridge task's ring buffer and backpressure protocol (§3/§4.10).
//!
//! Single producer (upstream client), single consumer (HTTPS server
//! response callback). Invariants (§3, tested as §8 property 3):
//! `read_ptr <= write_ptr <= buf_end`; `read_ptr == write_ptr` iff empty;
//! the producer pauses when `write_ptr == buf_end`, the consumer pauses
//! when `read_ptr == write_ptr`; at most one of the two status bits is set
//! at any time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    None,
    WaitsForUpstream,
    WaitsForDownstream,
}

pub struct RingBuffer {
    buf: Vec<u8>,
    read_ptr: usize,
    write_ptr: usize,
    status: WaitStatus,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            buf: vec![0u8; capacity],
            read_ptr: 0,
            write_ptr: 0,
            status: WaitStatus::None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_ptr == self.write_ptr
    }

    pub fn is_full(&self) -> bool {
        self.write_ptr == self.buf.len()
    }

    pub fn status(&self) -> WaitStatus {
        self.status
    }

    /// Producer appends bytes. Returns the number actually written (may be
    /// less than `data.len()` if the buffer fills); sets
    /// `WaitsForDownstream` and returns "pause me" (`false`) once full.
    pub fn produce(&mut self, data: &[u8]) -> (usize, bool) {
        let space = self.buf.len() - self.write_ptr;
        let n = space.min(data.len());
        self.buf[self.write_ptr..self.write_ptr + n].copy_from_slice(&data[..n]);
        self.write_ptr += n;

        if self.status == WaitStatus::WaitsForUpstream && !self.is_empty() {
            self.status = WaitStatus::None;
        }

        if self.is_full() {
            self.status = WaitStatus::WaitsForDownstream;
            (n, false)
        } else {
            (n, true)
        }
    }

    /// Consumer drains up to `out.len()` bytes. Sets `WaitsForUpstream`
    /// and requests the upstream be resumed when the buffer runs dry.
    pub fn consume(&mut self, out: &mut [u8]) -> usize {
        let available = self.write_ptr - self.read_ptr;
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.buf[self.read_ptr..self.read_ptr + n]);
        self.read_ptr += n;

        if self.status == WaitStatus::WaitsForDownstream && !self.is_full() {
            self.status = WaitStatus::None;
            self.compact();
        }

        if self.is_empty() {
            self.compact();
            self.status = WaitStatus::WaitsForUpstream;
        }

        n
    }

    /// Reset pointers to the start once the buffer has been fully drained,
    /// so the producer can resume writing from index 0. A partial consume
    /// out of a full buffer leaves `write_ptr == buf.len()` and the
    /// producer sees zero space until the buffer drains completely.
    fn compact(&mut self) {
        if self.read_ptr == self.write_ptr {
            self.read_ptr = 0;
            self.write_ptr = 0;
        }
    }

    pub fn assert_invariants(&self) {
        assert!(self.read_ptr <= self.write_ptr);
        assert!(self.write_ptr <= self.buf.len());
        assert!(!(self.status == WaitStatus::WaitsForUpstream && self.status == WaitStatus::WaitsForDownstream));
    }
}
