//! Response Pump: streams origin response bytes into outbound DATA frames
//! under backpressure.
//!
//! The body buffer of a transaction (see `proxy::transaction`) is a bounded
//! `tokio::sync::mpsc` channel rather than a raw growable buffer: the HTTP
//! client task is the sole producer, the SPDY connection's write loop is the
//! sole consumer, and channel semantics alone provide both backpressure and
//! ordering without any additional locking.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Default channel capacity for a transaction's body buffer. Chosen to
/// absorb a handful of origin read chunks without blocking the HTTP client
/// task while the SPDY side is still draining a previous transaction.
pub const BODY_CHANNEL_CAPACITY: usize = 32;

pub fn body_channel() -> (mpsc::Sender<Bytes>, ResponseBody) {
    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    (tx, ResponseBody::new(rx))
}

/// Consumer side of a transaction's body channel, driven by the outbound
/// data step (§4.4 of the design doc).
pub struct ResponseBody {
    rx: mpsc::Receiver<Bytes>,
    pending: BytesMut,
    closed: bool,
}

impl ResponseBody {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: BytesMut::new(),
            closed: false,
        }
    }

    /// Non-blocking outbound data step: pulls at most one pending chunk in
    /// from the channel without awaiting, then hands back up to `max` bytes
    /// plus a `more` flag.
    ///
    /// - No buffered bytes, channel not yet closed: `(empty, more=true)` —
    ///   the caller should try again once the origin has produced more.
    /// - No buffered bytes, channel closed: `(empty, more=false)` — the
    ///   transaction is fully drained.
    /// - Otherwise: up to `max` bytes from the front of the buffer, with
    ///   `more=false` iff the channel is closed and the buffer is now empty.
    pub fn next_step(&mut self, max: usize) -> (Bytes, bool) {
        if self.pending.is_empty() && !self.closed {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(mpsc::error::TryRecvError::Empty) => return (Bytes::new(), true),
                Err(mpsc::error::TryRecvError::Disconnected) => self.closed = true,
            }
        }

        if self.pending.is_empty() {
            return (Bytes::new(), false);
        }

        let n = max.min(self.pending.len());
        let out = self.pending.split_to(n).freeze();
        let more = !(self.closed && self.pending.is_empty());
        (out, more)
    }

    /// Awaiting variant used by tests and by callers that are fine blocking
    /// on the next chunk (e.g. draining a transaction to completion rather
    /// than interleaving with other streams).
    pub async fn next_step_blocking(&mut self, max: usize) -> (Bytes, bool) {
        if self.pending.is_empty() && !self.closed {
            match self.rx.recv().await {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => self.closed = true,
            }
        }
        let n = max.min(self.pending.len());
        let out = self.pending.split_to(n).freeze();
        let more = !(self.closed && self.pending.is_empty());
        (out, more)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_unclosed_channel_reports_more_true_with_zero_bytes() {
        let (_tx, mut body) = body_channel();
        let (chunk, more) = body.next_step(64);
        assert!(chunk.is_empty());
        assert!(more);
    }

    #[tokio::test]
    async fn closed_drained_channel_reports_more_false() {
        let (tx, mut body) = body_channel();
        drop(tx);
        let (chunk, more) = body.next_step(64);
        assert!(chunk.is_empty());
        assert!(!more);
    }

    #[tokio::test]
    async fn partial_read_of_a_chunk_keeps_more_true() {
        let (tx, mut body) = body_channel();
        tx.send(Bytes::from_static(b"0123456789")).await.unwrap();
        drop(tx);

        let (chunk, more) = body.next_step(4);
        assert_eq!(&chunk[..], b"0123");
        assert!(more);

        let (chunk, more) = body.next_step(4);
        assert_eq!(&chunk[..], b"4567");
        assert!(more);

        let (chunk, more) = body.next_step(4);
        assert_eq!(&chunk[..], b"89");
        assert!(!more);
    }

    #[tokio::test]
    async fn byte_total_matches_bytes_sent() {
        let (tx, mut body) = body_channel();
        tokio::spawn(async move {
            for _ in 0..64 {
                tx.send(Bytes::from_static(&[7u8; 16384])).await.unwrap();
            }
        });

        let mut total = 0usize;
        loop {
            let (chunk, more) = body.next_step_blocking(8192).await;
            total += chunk.len();
            if !more {
                break;
            }
        }
        assert_eq!(total, 64 * 16384);
    }

    #[tokio::test]
    async fn zero_length_body_is_a_single_more_false_step() {
        let (tx, mut body) = body_channel();
        drop(tx);
        let (chunk, more) = body.next_step_blocking(8192).await;
        assert!(chunk.is_empty());
        assert!(!more);
    }
}
