//! Text ring buffer between the host protocol and the keying engine

use heapless::Deque;

/// Capacity of the host text buffer in bytes
pub const TEXT_BUFFER_CAPACITY: usize = 256;

/// Fixed-capacity circular byte queue.
///
/// Overflow is not an error: `push` on a full buffer drops the byte, so
/// writers gate on [`can_accept`](Self::can_accept) or [`free`](Self::free).
#[derive(Debug, Default)]
pub struct RingTextBuffer {
    bytes: Deque<u8, TEXT_BUFFER_CAPACITY>,
}

impl RingTextBuffer {
    pub const fn new() -> Self {
        Self { bytes: Deque::new() }
    }

    /// Append a byte, silently dropped when full
    pub fn push(&mut self, byte: u8) {
        let _ = self.bytes.push_back(byte);
    }

    /// Remove the oldest byte, `0` when empty
    pub fn pop(&mut self) -> u8 {
        self.bytes.pop_front().unwrap_or(0)
    }

    /// Remove the most recently pushed byte (host backspace)
    pub fn unpush(&mut self) -> Option<u8> {
        self.bytes.pop_back()
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    pub fn free(&self) -> usize {
        TEXT_BUFFER_CAPACITY - self.bytes.len()
    }

    pub fn has_more(&self) -> bool {
        !self.bytes.is_empty()
    }

    pub fn can_accept(&self) -> bool {
        !self.bytes.is_full()
    }
}
