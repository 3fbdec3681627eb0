// Progress channel: painter → recorder thread → sink
//
// The painter must never wait on a slow sink (GIF encoding is much slower than
// painting a stroke), so pushes are non-blocking and a full channel sheds frames.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::canvas::Canvas;
use crate::error::{panic_message, PaintError, Result};
use crate::sinks::FrameSink;

/// How long the recorder waits for a frame before checking in again
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between attempts to deliver the close sentinel into a full channel
const CLOSE_RETRY: Duration = Duration::from_millis(5);

/// What to do when a frame arrives and the channel is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropPolicy {
    /// Discard the new frame; the queued frames are kept
    #[default]
    DropNewest,
    /// Evict the oldest queued frame to make room for the new one
    LatestWins,
}

/// Result of a non-blocking push
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pushed {
    Sent,
    /// Channel was full (or closed); the frame was discarded
    Dropped,
    /// Channel was full; an older frame was discarded to make room
    Evicted,
}

enum ProgressMessage {
    Frame(Canvas),
    /// Sentinel: the producer is done
    Close,
}

/// What the consumer got from [`ProgressReceiver::recv_timeout`]
#[derive(Debug)]
pub enum Received {
    Frame(Canvas),
    /// Producer closed the channel (or went away)
    Closed,
    Timeout,
}

type SharedReceiver = Arc<Mutex<Receiver<ProgressMessage>>>;

fn lock(rx: &SharedReceiver) -> MutexGuard<'_, Receiver<ProgressMessage>> {
    rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Producer half of the progress channel
pub struct ProgressSender {
    tx: SyncSender<ProgressMessage>,
    // Only used for eviction under `LatestWins`. Weak, so dropping the
    // consumer still disconnects the channel
    rx: Weak<Mutex<Receiver<ProgressMessage>>>,
    policy: DropPolicy,
}

/// Consumer half of the progress channel
pub struct ProgressReceiver {
    rx: SharedReceiver,
}

/// Bounded, never-blocking frame pipe
///
/// **Rust Concept: Sharing a receiver**
/// `mpsc::Receiver` has exactly one owner. To let the producer evict stale
/// frames, the consumer owns it behind `Arc<Mutex<...>>` and the producer keeps
/// a `Weak` to the same mutex. A `Weak` does not keep the receiver alive: once
/// the consumer is gone `upgrade()` fails and pushes see a disconnected channel.
/// The producer only ever uses `try_lock`, so it never waits on the consumer.
pub fn progress_channel(capacity: usize, policy: DropPolicy) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let rx = Arc::new(Mutex::new(rx));
    (
        ProgressSender {
            tx,
            rx: Arc::downgrade(&rx),
            policy,
        },
        ProgressReceiver { rx },
    )
}

impl ProgressSender {
    /// Offer a frame without blocking
    pub fn push(&self, frame: Canvas) -> Pushed {
        let message = match self.tx.try_send(ProgressMessage::Frame(frame)) {
            Ok(()) => return Pushed::Sent,
            Err(TrySendError::Disconnected(_)) => return Pushed::Dropped,
            Err(TrySendError::Full(message)) => message,
        };

        match self.policy {
            DropPolicy::DropNewest => Pushed::Dropped,
            DropPolicy::LatestWins => {
                // If the consumer holds the lock it is draining right now, so a
                // slot is about to free up anyway; give up rather than wait
                let evicted = match self.rx.upgrade() {
                    Some(shared) => match shared.try_lock() {
                        Ok(rx) => rx.try_recv().is_ok(),
                        Err(_) => false,
                    },
                    None => false,
                };
                if !evicted {
                    return Pushed::Dropped;
                }
                match self.tx.try_send(message) {
                    Ok(()) => Pushed::Evicted,
                    Err(_) => Pushed::Dropped,
                }
            }
        }
    }

    /// Deliver the close sentinel, retrying for at most `timeout`
    ///
    /// Frames already queued stay ahead of the sentinel and are still recorded.
    pub fn close(self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut message = ProgressMessage::Close;

        loop {
            match self.tx.try_send(message) {
                Ok(()) => return Ok(()),
                // Nobody is listening; nothing left to close
                Err(TrySendError::Disconnected(_)) => return Ok(()),
                Err(TrySendError::Full(m)) => {
                    if Instant::now() >= deadline {
                        return Err(PaintError::WorkerTimeout("progress channel close"));
                    }
                    message = m;
                    thread::sleep(CLOSE_RETRY);
                }
            }
        }
    }
}

impl ProgressReceiver {
    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        match lock(&self.rx).recv_timeout(timeout) {
            Ok(ProgressMessage::Frame(frame)) => Received::Frame(frame),
            Ok(ProgressMessage::Close) => Received::Closed,
            Err(RecvTimeoutError::Timeout) => Received::Timeout,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }

    /// Take whatever is queued right now without waiting
    pub fn try_recv(&self) -> Received {
        match lock(&self.rx).try_recv() {
            Ok(ProgressMessage::Frame(frame)) => Received::Frame(frame),
            Ok(ProgressMessage::Close) => Received::Closed,
            Err(TryRecvError::Empty) => Received::Timeout,
            Err(TryRecvError::Disconnected) => Received::Closed,
        }
    }
}

/// Drives a [`FrameSink`] from a progress channel on its own thread
pub struct ProgressRecorder {
    handle: JoinHandle<()>,
    done: Receiver<Result<usize>>,
}

impl ProgressRecorder {
    /// Start recording
    ///
    /// The thread pushes every received frame into `sink` until the channel is
    /// closed, then calls `sink.finish()`. A failing `push` is logged and the
    /// frame skipped; the recording carries on.
    pub fn spawn<S>(receiver: ProgressReceiver, mut sink: S) -> Result<Self>
    where
        S: FrameSink + Send + 'static,
    {
        let (done_tx, done) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("progress-recorder".to_owned())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| record(&receiver, &mut sink)))
                    .unwrap_or_else(|payload| Err(PaintError::WorkerPanicked(panic_message(payload))));
                let _ = done_tx.send(result);
            })?;

        Ok(Self { handle, done })
    }

    /// Wait at most `timeout` for the sink to finish; returns the number of frames written
    pub fn join(self, timeout: Duration) -> Result<usize> {
        match self.done.recv_timeout(timeout) {
            Ok(result) => {
                let _ = self.handle.join();
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Progress recorder missed its {:?} deadline, detaching", timeout);
                Err(PaintError::WorkerTimeout("progress recorder"))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = self.handle.join();
                Err(PaintError::ChannelClosed("progress recorder"))
            }
        }
    }
}

fn record<S: FrameSink>(receiver: &ProgressReceiver, sink: &mut S) -> Result<usize> {
    let mut written = 0usize;
    loop {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Received::Frame(frame) => match sink.push(&frame) {
                Ok(()) => written += 1,
                Err(e) => warn!("Dropping progress frame: {}", e),
            },
            Received::Closed => break,
            Received::Timeout => continue,
        }
    }
    sink.finish()?;
    debug!("Progress recorder wrote {} frames", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::CollectingSink;

    fn frame(value: f32) -> Canvas {
        Canvas::with_color(1, 1, [value, value, value])
    }

    fn drain(receiver: &ProgressReceiver) -> Vec<f32> {
        let mut values = Vec::new();
        while let Received::Frame(f) = receiver.try_recv() {
            values.push(f.pixel(0, 0)[0]);
        }
        values
    }

    #[test]
    fn test_drop_newest_keeps_queued_frames() {
        let (tx, rx) = progress_channel(2, DropPolicy::DropNewest);

        assert_eq!(tx.push(frame(0.1)), Pushed::Sent);
        assert_eq!(tx.push(frame(0.2)), Pushed::Sent);
        assert_eq!(tx.push(frame(0.3)), Pushed::Dropped);

        assert_eq!(drain(&rx), vec![0.1, 0.2]);
    }

    #[test]
    fn test_latest_wins_evicts_oldest() {
        let (tx, rx) = progress_channel(2, DropPolicy::LatestWins);

        tx.push(frame(0.1));
        tx.push(frame(0.2));
        assert_eq!(tx.push(frame(0.3)), Pushed::Evicted);

        assert_eq!(drain(&rx), vec![0.2, 0.3]);
    }

    #[test]
    fn test_push_never_blocks_without_consumer() {
        let (tx, _rx) = progress_channel(1, DropPolicy::DropNewest);
        let start = Instant::now();
        for i in 0..1_000 {
            tx.push(frame(i as f32 / 1_000.0));
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_close_times_out_when_full() {
        let (tx, _rx) = progress_channel(1, DropPolicy::DropNewest);
        tx.push(frame(0.5));
        let result = tx.close(Duration::from_millis(20));
        assert!(matches!(result, Err(PaintError::WorkerTimeout(_))));
    }

    #[test]
    fn test_dropping_receiver_disconnects_latest_wins() {
        let (tx, rx) = progress_channel(1, DropPolicy::LatestWins);
        assert_eq!(tx.push(frame(0.1)), Pushed::Sent);
        drop(rx);

        assert_eq!(tx.push(frame(0.2)), Pushed::Dropped);
        let start = Instant::now();
        assert!(tx.close(Duration::from_secs(5)).is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_recorder_writes_all_frames_then_finishes() {
        let (tx, rx) = progress_channel(16, DropPolicy::DropNewest);
        let sink = CollectingSink::new();
        let recorder = ProgressRecorder::spawn(rx, sink.clone()).unwrap();

        for i in 0..5 {
            assert_eq!(tx.push(frame(i as f32 / 10.0)), Pushed::Sent);
        }
        tx.close(Duration::from_secs(5)).unwrap();

        assert_eq!(recorder.join(Duration::from_secs(5)).unwrap(), 5);
        assert_eq!(sink.len(), 5);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_recorder_stops_when_sender_dropped() {
        let (tx, rx) = progress_channel(4, DropPolicy::LatestWins);
        let sink = CollectingSink::new();
        let recorder = ProgressRecorder::spawn(rx, sink.clone()).unwrap();

        tx.push(frame(0.5));
        drop(tx);

        assert_eq!(recorder.join(Duration::from_secs(5)).unwrap(), 1);
        assert!(sink.is_finished());
    }
}
