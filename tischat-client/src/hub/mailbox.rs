//! Single-slot rendezvous between a blocked caller and the reader task
//!
//! Each blocking read arms a fresh capacity-one channel, so a chunk meant
//! for an earlier waiter can never reach a later one.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use tischat_protocol::RawFrame;

/// What a blocked caller is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Want {
    /// Raw bytes up to and including a delimiter
    Through(Bytes),
    /// The next whole transmission
    Transmission,
}

/// What the reader task hands back
#[derive(Debug)]
pub(crate) enum Delivery {
    Chunk(Bytes),
    Frame(RawFrame),
    /// The connection ended first
    Closed,
}

/// Reader-side half
#[derive(Debug)]
pub(crate) struct ReadRequest {
    want: Want,
    reply: mpsc::Sender<Delivery>,
}

/// Caller-side half
#[derive(Debug)]
pub(crate) struct Mailbox {
    slot: mpsc::Receiver<Delivery>,
}

/// Arm a new rendezvous for one read
pub(crate) fn arm(want: Want) -> (ReadRequest, Mailbox) {
    let (reply, slot) = mpsc::channel(1);
    (ReadRequest { want, reply }, Mailbox { slot })
}

impl ReadRequest {
    pub(crate) fn want(&self) -> &Want {
        &self.want
    }

    pub(crate) fn deliver(self, delivery: Delivery) {
        if self.reply.try_send(delivery).is_err() {
            tracing::debug!("Blocked reader went away before delivery");
        }
    }

    pub(crate) fn close(self) {
        let _ = self.reply.try_send(Delivery::Closed);
    }
}

impl Mailbox {
    /// Block until the reader task answers.
    ///
    /// Must not be called from inside an async context.
    pub(crate) fn wait(mut self) -> Delivery {
        self.slot.blocking_recv().unwrap_or(Delivery::Closed)
    }
}

/// Split `buf` just past the first occurrence of `delimiter`
pub(crate) fn take_through(buf: &mut BytesMut, delimiter: &[u8]) -> Option<Bytes> {
    if delimiter.is_empty() || buf.len() < delimiter.len() {
        return None;
    }
    buf.windows(delimiter.len())
        .position(|window| window == delimiter)
        .map(|at| buf.split_to(at + delimiter.len()).freeze())
}
