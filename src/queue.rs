//! Bounded, thread-safe FIFO of `Frame`s between the Reader and the Processor.
//!
//! Capacity is fixed at 50. The queue itself never silently drops — it is a
//! plain bounded `crossbeam` channel. Drop-oldest-on-overflow is a *producer*
//! policy implemented by `Reader::enqueue` (see `reader.rs`), which pops the
//! front element and retries when a push finds the queue full.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::frame::Frame;

pub const CAPACITY: usize = 50;

/// The producer half, held by the Reader.
#[derive(Clone)]
pub struct FrameQueueProducer {
    sender: Sender<Frame>,
}

/// The consumer half. Cloneable because the Reader needs its own handle to
/// pop the front entry under drop-oldest while the Processor independently
/// drains the same channel through its own clone; `crossbeam::channel`
/// receivers sharing one channel is exactly the multi-consumer case it's
/// built for, even though this core only ever needs the Reader's
/// drop-oldest pop and the Processor's batch drain.
#[derive(Clone)]
pub struct FrameQueueConsumer {
    receiver: Receiver<Frame>,
}

/// Build a fresh bounded queue pair at the fixed capacity.
pub fn bounded() -> (FrameQueueProducer, FrameQueueConsumer) {
    let (sender, receiver) = channel::bounded(CAPACITY);
    (FrameQueueProducer { sender }, FrameQueueConsumer { receiver })
}

impl FrameQueueProducer {
    /// Non-blocking push. Returns the frame back on failure (queue full or
    /// consumer gone) so the caller can apply its own overflow policy.
    pub fn try_push(&self, frame: Frame) -> Result<(), Frame> {
        match self.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => Err(frame),
            Err(TrySendError::Disconnected(frame)) => Err(frame),
        }
    }

    /// Push, dropping the single oldest queued frame to make room if full.
    /// This is the Reader's overflow policy from SPEC_FULL.md §4.1/§4.2: the
    /// queue itself never drops anything on its own. There is exactly one
    /// producer (the Reader thread), so popping then pushing cannot race.
    ///
    /// Returns `true` if an older frame was discarded to make room.
    pub fn try_push_drop_oldest(&self, consumer: &FrameQueueConsumer, frame: Frame) -> bool {
        match self.try_push(frame) {
            Ok(()) => false,
            Err(frame) => {
                consumer.try_pop();
                let _ = self.try_push(frame);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }
}

impl FrameQueueConsumer {
    /// Block for up to `timeout` for the next frame; `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Non-blocking pop, used both by the producer's drop-oldest retry and by
    /// the processor's greedy batch drain.
    pub fn try_pop(&self) -> Option<Frame> {
        match self.receiver.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}
