//! Single-waiter rendezvous between the session read loop and a pending
//! synchronous query.
//!
//! Each session owns exactly one `Rendezvous`. The read loop calls
//! [`Rendezvous::deliver`] for every inbound frame that arrives while a
//! command handler is running; a handler awaiting a browser reply calls
//! [`Rendezvous::recv`]. At most one receiver may wait at a time, which is
//! what makes the protocol's id-less reply matching sound: the next inbound
//! frame after a query is always that query's answer.
//!
//! Frames delivered while no receiver is waiting are buffered in FIFO order.
//! A later `recv` takes the oldest buffered frame first; anything still
//! buffered when the handler returns is drained by the read loop (via
//! [`Rendezvous::take_buffered`]) and dispatched as ordinary commands. This
//! preserves strict arrival order end to end no matter how handler execution
//! interleaves with the transport.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Failure modes of a synchronous query wait.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    /// The bounded wait expired before the browser replied.
    #[error("query timed out waiting for a reply")]
    Timeout,
    /// The connection was torn down while the query was outstanding.
    #[error("connection closed while a query was outstanding")]
    Closed,
    /// A second query was issued while one was already pending. The
    /// one-flow-per-session execution model makes this unreachable in
    /// normal operation; it is reported rather than silently misrouting.
    #[error("a query is already pending on this session")]
    AlreadyPending,
}

/// What happened to a delivered frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// A waiting query consumed the frame.
    Claimed,
    /// No query was waiting; the frame is buffered in arrival order.
    Buffered,
    /// The channel is closed; the frame was discarded.
    Discarded,
}

#[derive(Default)]
struct State {
    waiter: Option<oneshot::Sender<String>>,
    buffered: VecDeque<String>,
    closed: bool,
}

/// The per-session handoff slot. See the module docs.
#[derive(Default)]
pub struct Rendezvous {
    state: Mutex<State>,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand an inbound frame to the waiting query, or buffer it.
    pub fn deliver(&self, frame: String) -> Delivery {
        let mut state = self.state.lock();
        if state.closed {
            return Delivery::Discarded;
        }
        if let Some(tx) = state.waiter.take() {
            match tx.send(frame) {
                Ok(()) => Delivery::Claimed,
                // Receiver gave up (timed out) between unparking and now;
                // the reply belongs to a dead query, drop it.
                Err(_) => Delivery::Discarded,
            }
        } else {
            state.buffered.push_back(frame);
            Delivery::Buffered
        }
    }

    /// Await the next inbound frame, up to `wait`.
    pub async fn recv(&self, wait: Duration) -> Result<String, QueryError> {
        let mut rx = {
            let mut state = self.state.lock();
            if let Some(frame) = state.buffered.pop_front() {
                return Ok(frame);
            }
            if state.closed {
                return Err(QueryError::Closed);
            }
            if state.waiter.is_some() {
                return Err(QueryError::AlreadyPending);
            }
            let (tx, rx) = oneshot::channel();
            state.waiter = Some(tx);
            rx
        };

        tokio::select! {
            reply = &mut rx => reply.map_err(|_| QueryError::Closed),
            _ = tokio::time::sleep(wait) => {
                // Retract the waiter. If a frame won the race and was already
                // sent, take it instead of reporting a spurious timeout.
                let retracted = self.state.lock().waiter.take().is_some();
                if retracted {
                    Err(QueryError::Timeout)
                } else {
                    rx.await.map_err(|_| QueryError::Closed)
                }
            }
        }
    }

    /// Pop the oldest frame nobody claimed. The read loop calls this after
    /// a handler returns, treating leftovers as the next commands.
    pub fn take_buffered(&self) -> Option<String> {
        self.state.lock().buffered.pop_front()
    }

    /// Tear down: wake any waiter with [`QueryError::Closed`] and discard
    /// buffered frames. Subsequent `recv` calls fail immediately.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.buffered.clear();
        // Dropping the sender wakes the receiver with a RecvError.
        state.waiter.take();
    }

    /// Whether a query is currently awaiting a reply.
    pub fn is_waiting(&self) -> bool {
        self.state.lock().waiter.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn deliver_after_recv_is_claimed() {
        let rv = Arc::new(Rendezvous::new());
        let waiter = {
            let rv = rv.clone();
            tokio::spawn(async move { rv.recv(WAIT).await })
        };
        // Let the receiver install its waiter.
        while !rv.is_waiting() {
            tokio::task::yield_now().await;
        }
        assert_eq!(rv.deliver("pong".into()), Delivery::Claimed);
        assert_eq!(waiter.await.unwrap().unwrap(), "pong");
    }

    #[tokio::test]
    async fn deliver_before_recv_is_buffered_fifo() {
        let rv = Rendezvous::new();
        assert_eq!(rv.deliver("first".into()), Delivery::Buffered);
        assert_eq!(rv.deliver("second".into()), Delivery::Buffered);
        assert_eq!(rv.recv(WAIT).await.unwrap(), "first");
        assert_eq!(rv.recv(WAIT).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn second_concurrent_recv_is_rejected() {
        let rv = Arc::new(Rendezvous::new());
        let first = {
            let rv = rv.clone();
            tokio::spawn(async move { rv.recv(WAIT).await })
        };
        while !rv.is_waiting() {
            tokio::task::yield_now().await;
        }
        assert_eq!(rv.recv(WAIT).await, Err(QueryError::AlreadyPending));
        rv.deliver("done".into());
        assert_eq!(first.await.unwrap().unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn recv_times_out() {
        let rv = Rendezvous::new();
        let result = rv.recv(Duration::from_millis(50)).await;
        assert_eq!(result, Err(QueryError::Timeout));
        // After the timeout the slot is free again.
        assert!(!rv.is_waiting());
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_after_timeout_becomes_ordinary_traffic() {
        let rv = Rendezvous::new();
        assert_eq!(rv.recv(Duration::from_millis(10)).await, Err(QueryError::Timeout));
        // The waiter retracted itself, so a reply arriving now is
        // indistinguishable from unsolicited input and buffers normally.
        assert_eq!(rv.deliver("stale".into()), Delivery::Buffered);
        assert_eq!(rv.take_buffered().unwrap(), "stale");
    }

    #[tokio::test]
    async fn close_wakes_waiter_with_closed() {
        let rv = Arc::new(Rendezvous::new());
        let waiter = {
            let rv = rv.clone();
            tokio::spawn(async move { rv.recv(WAIT).await })
        };
        while !rv.is_waiting() {
            tokio::task::yield_now().await;
        }
        rv.close();
        assert_eq!(waiter.await.unwrap(), Err(QueryError::Closed));
    }

    #[tokio::test]
    async fn recv_after_close_fails_fast() {
        let rv = Rendezvous::new();
        rv.close();
        assert_eq!(rv.recv(WAIT).await, Err(QueryError::Closed));
        assert_eq!(rv.deliver("x".into()), Delivery::Discarded);
        assert!(rv.take_buffered().is_none());
    }

    #[tokio::test]
    async fn take_buffered_drains_in_order() {
        let rv = Rendezvous::new();
        rv.deliver("a".into());
        rv.deliver("b".into());
        assert_eq!(rv.take_buffered().unwrap(), "a");
        assert_eq!(rv.take_buffered().unwrap(), "b");
        assert!(rv.take_buffered().is_none());
    }
}
