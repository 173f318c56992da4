//! Single-producer multi-consumer track relay
//!
//! One upstream read loop pulls frames at the source's own pace and
//! publishes each into a `watch` slot stamped with a sequence number.
//! Subscribers keep only the last sequence number they consumed, so memory
//! stays O(1) per subscriber and a slow subscriber skips frames instead of
//! holding back the source or anyone else.
//!
//! ```text
//!  FrameSource ──recv()──► read loop ──publish(seq, frame)──► watch slot
//!                                                              │
//!                                  ┌───────────────────────────┼──────────┐
//!                                  ▼                           ▼          ▼
//!                           RelaySubscriber             RelaySubscriber  ...
//!                           last_seq = 41               last_seq = 44
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::media::{Frame, FrameSource, MediaKind};
use crate::stats::RelayStats;

/// Content of the relay's last-value slot
#[derive(Debug, Clone, Default)]
struct Published {
    seq: u64,
    frame: Option<Frame>,
    ended: bool,
}

struct RelayShared {
    source_id: String,
    kind: MediaKind,
    tx: watch::Sender<Published>,
    subscribers: AtomicU32,
    published: AtomicU64,
}

impl RelayShared {
    /// Returns false once the relay has ended
    fn publish(&self, frame: Frame) -> bool {
        let accepted = self.tx.send_if_modified(|slot| {
            if slot.ended {
                return false;
            }
            slot.seq += 1;
            slot.frame = Some(frame);
            true
        });
        if accepted {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Mark end-of-stream; the last frame stays readable.
    ///
    /// Returns true if this call ended the relay.
    fn finish(&self) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.ended {
                false
            } else {
                slot.ended = true;
                true
            }
        })
    }
}

/// Registration of one subscriber on its relay
struct Cursor {
    relay: Arc<RelayShared>,
    released: watch::Sender<bool>,
}

impl Cursor {
    /// Returns true if this call released the cursor
    fn release(&self) -> bool {
        let released = self.released.send_if_modified(|released| {
            if *released {
                false
            } else {
                *released = true;
                true
            }
        });
        if released {
            let prev = self.relay.subscribers.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(
                source = %self.relay.source_id,
                subscribers = prev.saturating_sub(1),
                "Relay subscriber removed"
            );
        }
        released
    }
}

/// Fan-out of one upstream source to any number of subscribers
///
/// Dropping the relay detaches it from its source.
pub struct TrackRelay {
    shared: Arc<RelayShared>,
    reader: AbortHandle,
}

impl TrackRelay {
    /// Start relaying `source`
    ///
    /// Spawns the upstream read loop on the current runtime.
    pub fn spawn<S: FrameSource>(source_id: impl Into<String>, mut source: S) -> Self {
        let (tx, _) = watch::channel(Published::default());
        let shared = Arc::new(RelayShared {
            source_id: source_id.into(),
            kind: source.kind(),
            tx,
            subscribers: AtomicU32::new(0),
            published: AtomicU64::new(0),
        });

        let reader_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            while let Some(frame) = source.recv().await {
                tracing::trace!(
                    source = %reader_shared.source_id,
                    pts = frame.pts,
                    "Relay publishing frame"
                );
                if !reader_shared.publish(frame) {
                    break;
                }
            }
            if reader_shared.finish() {
                tracing::debug!(
                    source = %reader_shared.source_id,
                    frames = reader_shared.published.load(Ordering::Relaxed),
                    "Relay source ended"
                );
            }
        });

        Self {
            shared,
            reader: handle.abort_handle(),
        }
    }

    /// Attach a new subscriber
    ///
    /// The subscriber only sees frames published after this returns.
    pub fn subscribe(&self) -> RelaySubscriber {
        let mut rx = self.shared.tx.subscribe();
        let last_seq = rx.borrow_and_update().seq;
        let count = self.shared.subscribers.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::debug!(
            source = %self.shared.source_id,
            subscribers = count,
            "Relay subscriber added"
        );

        let (released, released_rx) = watch::channel(false);
        RelaySubscriber {
            cursor: Arc::new(Cursor {
                relay: Arc::clone(&self.shared),
                released,
            }),
            rx,
            released: released_rx,
            last_seq,
        }
    }

    /// Detach from the upstream source and release every subscriber
    ///
    /// Blocked subscribers resolve to end-of-stream.
    pub fn detach(&self) {
        self.reader.abort();
        if self.shared.finish() {
            tracing::debug!(source = %self.shared.source_id, "Relay detached from source");
        }
    }

    pub fn source_id(&self) -> &str {
        &self.shared.source_id
    }

    pub fn kind(&self) -> MediaKind {
        self.shared.kind
    }

    pub fn subscriber_count(&self) -> u32 {
        self.shared.subscribers.load(Ordering::Relaxed)
    }

    pub fn is_ended(&self) -> bool {
        self.shared.tx.borrow().ended
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            source_id: self.shared.source_id.clone(),
            frames_published: self.shared.published.load(Ordering::Relaxed),
            subscriber_count: self.subscriber_count(),
            ended: self.is_ended(),
        }
    }
}

impl Drop for TrackRelay {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for TrackRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackRelay")
            .field("source_id", &self.shared.source_id)
            .field("kind", &self.shared.kind)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Independent cursor on a [`TrackRelay`]
///
/// The cursor leaves the relay when it is dropped or when any
/// [`SubscriberHandle`] taken from it is released.
pub struct RelaySubscriber {
    cursor: Arc<Cursor>,
    rx: watch::Receiver<Published>,
    released: watch::Receiver<bool>,
    last_seq: u64,
}

impl RelaySubscriber {
    /// Wait for a frame newer than the last one consumed
    ///
    /// Returns `None` once the relay has ended and the final frame has been
    /// consumed, or as soon as the cursor is released.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            if *self.released.borrow_and_update() {
                return None;
            }
            {
                let slot = self.rx.borrow_and_update();
                if slot.seq > self.last_seq {
                    if let Some(frame) = slot.frame.as_ref() {
                        self.last_seq = slot.seq;
                        return Some(frame.clone());
                    }
                }
                if slot.ended {
                    return None;
                }
            }

            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = self.released.changed() => {}
            }
        }
    }

    /// Handle that releases this cursor wherever it has been moved to
    pub fn handle(&self) -> SubscriberHandle {
        SubscriberHandle {
            cursor: Arc::clone(&self.cursor),
        }
    }

    /// Sequence number of the last consumed frame
    pub fn last_sequence(&self) -> u64 {
        self.last_seq
    }

    pub fn kind(&self) -> MediaKind {
        self.cursor.relay.kind
    }

    pub fn source_id(&self) -> &str {
        &self.cursor.relay.source_id
    }

    /// Detach this cursor from the relay
    pub fn unsubscribe(self) {}
}

impl FrameSource for RelaySubscriber {
    fn kind(&self) -> MediaKind {
        self.cursor.relay.kind
    }

    async fn recv(&mut self) -> Option<Frame> {
        self.next().await
    }
}

impl Drop for RelaySubscriber {
    fn drop(&mut self) {
        self.cursor.release();
    }
}

impl std::fmt::Debug for RelaySubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySubscriber")
            .field("source_id", &self.cursor.relay.source_id)
            .field("last_seq", &self.last_seq)
            .finish()
    }
}

/// Releases one [`RelaySubscriber`] from outside
///
/// The owner of the subscriber sees end-of-stream on its next read.
#[derive(Clone)]
pub struct SubscriberHandle {
    cursor: Arc<Cursor>,
}

impl SubscriberHandle {
    /// Remove the cursor from its relay; returns false if already released
    pub fn release(&self) -> bool {
        self.cursor.release()
    }

    pub fn is_released(&self) -> bool {
        *self.cursor.released.borrow()
    }

    pub fn source_id(&self) -> &str {
        &self.cursor.relay.source_id
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("source_id", &self.cursor.relay.source_id)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tokio_test::{assert_pending, assert_ready};

    use super::*;
    use crate::media::MediaTrack;

    fn frame(pts: i64) -> Frame {
        Frame::video(pts, 1, 1, Bytes::from_static(&[0, 0, 0]))
    }

    fn relay() -> (mpsc::Sender<Frame>, TrackRelay) {
        let (tx, track) = MediaTrack::channel("cam", MediaKind::Video, 1);
        (tx, TrackRelay::spawn("cam", track))
    }

    async fn wait_published(relay: &TrackRelay, frames: u64) {
        while relay.stats().frames_published < frames {
            tokio::task::yield_now().await;
        }
    }

    async fn collect(mut sub: RelaySubscriber, yields_per_frame: usize) -> Vec<i64> {
        let mut seen = Vec::new();
        while let Some(frame) = sub.next().await {
            seen.push(frame.pts);
            for _ in 0..yields_per_frame {
                tokio::task::yield_now().await;
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_increasing_frames_ending_at_last() {
        const FRAMES: i64 = 50;
        let (tx, relay) = relay();

        let consumers: Vec<_> = [0usize, 1, 7]
            .into_iter()
            .map(|speed| tokio::spawn(collect(relay.subscribe(), speed)))
            .collect();

        for pts in 1..=FRAMES {
            tx.send(frame(pts)).await.unwrap();
        }
        drop(tx);

        for consumer in consumers {
            let seen = consumer.await.unwrap();
            assert!(!seen.is_empty());
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "not increasing: {:?}", seen);
            assert_eq!(*seen.last().unwrap(), FRAMES);
        }
    }

    #[tokio::test]
    async fn test_no_frame_before_subscribe() {
        let (tx, relay) = relay();
        tx.send(frame(1)).await.unwrap();
        wait_published(&relay, 1).await;

        let mut sub = relay.subscribe();
        {
            let mut next = tokio_test::task::spawn(sub.next());
            assert_pending!(next.poll());
        }

        tx.send(frame(2)).await.unwrap();
        wait_published(&relay, 2).await;

        let mut next = tokio_test::task::spawn(sub.next());
        let received = assert_ready!(next.poll());
        assert_eq!(received.map(|f| f.pts), Some(2));
    }

    #[tokio::test]
    async fn test_source_end_releases_blocked_subscribers() {
        let (tx, relay) = relay();
        let mut sub = relay.subscribe();
        let waiter = tokio::spawn(async move { sub.next().await });

        tokio::task::yield_now().await;
        drop(tx);

        assert!(waiter.await.unwrap().is_none());
        assert!(relay.is_ended());
    }

    #[tokio::test]
    async fn test_detach_ends_stream_and_counts_subscribers() {
        let (_tx, relay) = relay();
        let mut first = relay.subscribe();
        let second = relay.subscribe();
        assert_eq!(relay.subscriber_count(), 2);

        second.unsubscribe();
        assert_eq!(relay.subscriber_count(), 1);

        relay.detach();
        assert!(first.next().await.is_none());

        let stats = relay.stats();
        assert!(stats.ended);
        assert_eq!(stats.source_id, "cam");
    }

    #[tokio::test]
    async fn test_handle_releases_moved_subscriber() {
        let (tx, relay) = relay();
        let mut sub = relay.subscribe();
        let handle = sub.handle();
        assert_eq!(relay.subscriber_count(), 1);

        let waiter = tokio::spawn(async move {
            let got = sub.next().await;
            (got, sub)
        });
        tokio::task::yield_now().await;

        assert!(handle.release());
        assert!(!handle.release());
        assert_eq!(relay.subscriber_count(), 0);

        let (got, mut sub) = waiter.await.unwrap();
        assert!(got.is_none());

        // Frames published after the release never reach the cursor
        tx.send(frame(5)).await.unwrap();
        wait_published(&relay, 1).await;
        assert!(sub.next().await.is_none());

        drop(sub);
        assert_eq!(relay.subscriber_count(), 0);
        assert!(!relay.is_ended());
    }

    #[tokio::test]
    async fn test_subscribe_after_end_yields_nothing() {
        let (tx, relay) = relay();
        tx.send(frame(1)).await.unwrap();
        drop(tx);
        while !relay.is_ended() {
            tokio::task::yield_now().await;
        }

        let mut late = relay.subscribe();
        assert!(late.next().await.is_none());
    }
}
