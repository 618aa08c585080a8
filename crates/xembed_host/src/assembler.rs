use x11rb::protocol::xproto::Window;

use crate::queue::Balloon;

/// A `ClientMessage` carries at most this many payload bytes, so balloon
/// text arrives in chunks of up to 20 bytes.
pub const MESSAGE_DATA_CHUNK: usize = 20;

/// A balloon message whose text has not fully arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub window: Window,
    pub id: u32,
    pub timeout_ms: u32,
    buffer: Vec<u8>,
    remaining: usize,
}

impl PendingMessage {
    fn into_balloon(self) -> Balloon {
        debug_assert_eq!(self.remaining, 0);
        Balloon {
            window: self.window,
            id: self.id,
            timeout_ms: self.timeout_ms,
            text: String::from_utf8_lossy(&self.buffer).into_owned(),
        }
    }
}

/// Reassembles balloon messages from `_NET_SYSTEM_TRAY_MESSAGE_DATA` chunks.
///
/// The data events don't repeat the message id, only the sender window, so a
/// window has at most one message in flight at a time and data lookup is by
/// window alone.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    pending: Vec<PendingMessage>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Handle `SYSTEM_TRAY_BEGIN_MESSAGE`. A begin that reuses a still
    /// pending `(window, id)` supersedes the earlier message. A total length
    /// of zero means no data events follow, and the finished (empty) balloon
    /// is returned right away.
    pub fn begin(&mut self, window: Window, id: u32, total_length: usize, timeout_ms: u32) -> Option<Balloon> {
        self.cancel(window, id);
        let msg = PendingMessage { window, id, timeout_ms, buffer: vec![0; total_length], remaining: total_length };
        if total_length == 0 {
            return Some(msg.into_balloon());
        }
        log::debug!("new balloon message from window {:#x}: id {}, {} bytes expected", window, id, total_length);
        self.pending.push(msg);
        None
    }

    /// Handle a data chunk for the in-flight message of `window`. Copies at
    /// most the remaining expected length, so an oversized chunk from a
    /// buggy client can never write past the declared total. Returns the
    /// finished balloon once the last chunk lands.
    pub fn append(&mut self, window: Window, chunk: &[u8]) -> Option<Balloon> {
        let Some(pos) = self.pending.iter().rposition(|m| m.window == window) else {
            // Data without a preceding begin. Misbehaving client, not fatal.
            log::warn!("balloon data from window {:#x} with no message in flight", window);
            return None;
        };

        let msg = &mut self.pending[pos];
        let take = msg.remaining.min(chunk.len());
        let offset = msg.buffer.len() - msg.remaining;
        msg.buffer[offset..offset + take].copy_from_slice(&chunk[..take]);
        msg.remaining -= take;

        if msg.remaining == 0 {
            Some(self.pending.swap_remove(pos).into_balloon())
        } else {
            None
        }
    }

    /// Handle `SYSTEM_TRAY_CANCEL_MESSAGE` for a message still being
    /// assembled. Returns whether a pending message was dropped.
    pub fn cancel(&mut self, window: Window, id: u32) -> bool {
        let before = self.pending.len();
        self.pending.retain(|m| !(m.window == window && m.id == id));
        before != self.pending.len()
    }

    /// Drop every in-flight message from `window`, id regardless.
    pub fn on_window_destroyed(&mut self, window: Window) {
        self.pending.retain(|m| m.window != window);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chunked_message_reassembles_in_order() {
        let mut asm = MessageAssembler::new();
        let payload: Vec<u8> = (0..50u8).map(|i| b'a' + (i % 26)).collect();
        assert_eq!(asm.begin(0x42, 7, payload.len(), 1000), None);

        let mut done = None;
        for (i, chunk) in payload.chunks(MESSAGE_DATA_CHUNK).enumerate() {
            assert_eq!(done, None, "completed before chunk {}", i);
            done = asm.append(0x42, chunk);
        }
        let balloon = done.expect("message should complete on the last chunk");
        assert_eq!(balloon.text.as_bytes(), &payload[..]);
        assert_eq!(balloon.id, 7);
        assert_eq!(balloon.timeout_ms, 1000);
        assert_eq!(asm.pending_count(), 0);
    }

    #[test]
    fn zero_length_message_completes_at_begin() {
        let mut asm = MessageAssembler::new();
        let balloon = asm.begin(0x42, 3, 0, 0).expect("empty message is already complete");
        assert_eq!(balloon.text, "");
        assert_eq!(asm.pending_count(), 0);
    }

    #[test]
    fn oversized_chunk_is_clamped() {
        let mut asm = MessageAssembler::new();
        asm.begin(0x42, 1, 5, 0);
        let balloon = asm.append(0x42, b"hello world, far too long").unwrap();
        assert_eq!(balloon.text, "hello");
    }

    #[test]
    fn begin_with_same_id_supersedes_pending() {
        let mut asm = MessageAssembler::new();
        asm.begin(0x42, 1, 10, 0);
        asm.append(0x42, b"old");
        asm.begin(0x42, 1, 3, 0);
        assert_eq!(asm.pending_count(), 1);
        let balloon = asm.append(0x42, b"new").unwrap();
        assert_eq!(balloon.text, "new");
    }

    #[test]
    fn cancel_drops_only_the_matching_id() {
        let mut asm = MessageAssembler::new();
        asm.begin(0x42, 1, 10, 0);
        asm.begin(0x43, 1, 10, 0);
        assert!(asm.cancel(0x42, 1));
        assert!(!asm.cancel(0x42, 1));
        assert_eq!(asm.pending_count(), 1);
        assert_eq!(asm.append(0x42, b"ignored"), None);
    }

    #[test]
    fn window_destruction_drops_in_flight_messages() {
        let mut asm = MessageAssembler::new();
        asm.begin(0x42, 1, 10, 0);
        asm.on_window_destroyed(0x42);
        assert_eq!(asm.pending_count(), 0);
    }

    #[test]
    fn data_for_unknown_window_is_ignored() {
        let mut asm = MessageAssembler::new();
        assert_eq!(asm.append(0x42, b"stray"), None);
    }
}
