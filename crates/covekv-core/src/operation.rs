//! Generic asynchronous operations.
//!
//! Every request/response exchange with the store is an [`Operation`]: a
//! codec producing the wire request and interpreting the response frames,
//! plus a single-fire [`OperationFuture`] the caller observes. The cluster
//! and node layers depend only on this contract, never on what a specific
//! operation means.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use covekv_common::protocol::{CoveError, Result, WireMessage};

/// One decoded response frame plus whether the response is now complete.
pub struct Decoded<F> {
    pub frame: F,
    pub done: bool,
}

/// The three-part contract a concrete operation supplies.
///
/// 1. [`request`](Self::request) produces the wire request payload.
/// 2. [`decode`](Self::decode) validates and unwraps one raw response frame,
///    and reports whether the server has finished responding.
/// 3. [`convert`](Self::convert) turns the accumulated frames into the typed
///    result.
pub trait OperationCodec: Send + 'static {
    type Frame: Send + 'static;
    type Output: Clone + Send + 'static;

    fn request(&self) -> WireMessage;
    fn decode(&self, raw: WireMessage) -> Result<Decoded<Self::Frame>>;
    fn convert(&self, frames: Vec<Self::Frame>) -> Result<Self::Output>;
}

enum Outcome<T> {
    Success(T),
    Failure(CoveError),
    Cancelled,
}

struct FutureShared<T> {
    slot: Mutex<Option<Outcome<T>>>,
    done: Notify,
    bound: AtomicBool,
    cancel_requested: AtomicBool,
}

impl<T> FutureShared<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            done: Notify::new(),
            bound: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Records the outcome. The first completion wins; later attempts are
    /// no-ops and report `false`.
    fn complete(&self, outcome: Outcome<T>) -> bool {
        {
            let mut slot = self.slot.lock().unwrap();
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
        }
        self.done.notify_waiters();
        true
    }

    fn is_done(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

/// Handle to an operation's eventual result.
///
/// Cheap to clone; every clone observes the same single-fire completion.
/// Completion always happens on the transport's processing context, so
/// callers needing ordering must synchronize through the future, not
/// through call order.
pub struct OperationFuture<T> {
    shared: Arc<FutureShared<T>>,
}

impl<T> Clone for OperationFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> OperationFuture<T> {
    /// Waits until the operation reaches a terminal state, bounded by
    /// `timeout`. Returns whether it completed in time.
    pub async fn await_for(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    pub fn is_done(&self) -> bool {
        self.shared.is_done()
    }

    pub fn is_success(&self) -> bool {
        matches!(*self.shared.slot.lock().unwrap(), Some(Outcome::Success(_)))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.shared.slot.lock().unwrap(), Some(Outcome::Cancelled))
    }

    /// The recorded failure, if the operation failed or was cancelled.
    pub fn cause(&self) -> Option<CoveError> {
        match &*self.shared.slot.lock().unwrap() {
            Some(Outcome::Failure(err)) => Some(err.clone()),
            Some(Outcome::Cancelled) => Some(CoveError::Cancelled),
            _ => None,
        }
    }

    /// Requests cancellation.
    ///
    /// An operation not yet bound to a node completes as cancelled
    /// immediately (the queue discards terminal operations when draining).
    /// Once bound, cancellation is best-effort: the flag is recorded but the
    /// in-flight exchange runs to completion, and the first recorded
    /// completion wins.
    pub fn cancel(&self) {
        self.shared.cancel_requested.store(true, Ordering::SeqCst);
        if !self.shared.bound.load(Ordering::SeqCst) {
            self.shared.complete(Outcome::Cancelled);
        }
    }

    async fn wait(&self) {
        loop {
            let notified = self.shared.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.is_done() {
                return;
            }
            notified.await;
        }
    }
}

impl<T: Clone> OperationFuture<T> {
    /// Waits for completion and returns the converted result, or the
    /// recorded failure. Can be called from any number of clones.
    pub async fn get(&self) -> Result<T> {
        self.wait().await;
        match &*self.shared.slot.lock().unwrap() {
            Some(Outcome::Success(value)) => Ok(value.clone()),
            Some(Outcome::Failure(err)) => Err(err.clone()),
            Some(Outcome::Cancelled) => Err(CoveError::Cancelled),
            None => unreachable!("wait() returned before completion"),
        }
    }
}

/// A submitted unit of work: codec, accumulated response frames, and the
/// completion slot, plus retry bookkeeping.
///
/// An operation is owned by the cluster queue or by one node until it
/// reaches a terminal state; it is never reused afterwards.
pub struct Operation<C: OperationCodec> {
    codec: C,
    frames: Vec<C::Frame>,
    shared: Arc<FutureShared<C::Output>>,
    tries_left: u8,
    last_error: Option<CoveError>,
}

impl<C: OperationCodec> Operation<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            frames: Vec::new(),
            shared: Arc::new(FutureShared::new()),
            tries_left: 1,
            last_error: None,
        }
    }

    /// Handle observing this operation's completion.
    pub fn future(&self) -> OperationFuture<C::Output> {
        OperationFuture {
            shared: self.shared.clone(),
        }
    }

    pub(crate) fn set_attempts(&mut self, attempts: u8) {
        self.tries_left = attempts.max(1);
    }
}

/// Object-safe driver the node and cluster layers operate on.
pub(crate) trait WireOperation: Send + 'static {
    fn request(&self) -> WireMessage;
    /// Feeds one raw response frame. Returns `true` once the response is
    /// complete.
    fn on_frame(&mut self, raw: WireMessage) -> Result<bool>;
    /// Converts the accumulated frames and completes the future.
    fn succeed(&mut self);
    /// Records a failed attempt. Returns `true` while tries remain.
    fn record_failure(&mut self, err: CoveError) -> bool;
    /// Completes the future with the recorded failure.
    fn fail(&mut self);
    /// Completes the future with the given failure.
    fn fail_with(&mut self, err: CoveError);
    /// Marks the operation bound to a node; cancellation is best-effort
    /// from here on.
    fn mark_bound(&self);
    fn is_terminal(&self) -> bool;
    fn cancel_requested(&self) -> bool;
    /// Completes the future as cancelled.
    fn complete_cancelled(&mut self);
}

impl<C: OperationCodec> WireOperation for Operation<C> {
    fn request(&self) -> WireMessage {
        self.codec.request()
    }

    fn on_frame(&mut self, raw: WireMessage) -> Result<bool> {
        let Decoded { frame, done } = self.codec.decode(raw)?;
        self.frames.push(frame);
        Ok(done)
    }

    fn succeed(&mut self) {
        let frames = std::mem::take(&mut self.frames);
        match self.codec.convert(frames) {
            Ok(value) => {
                self.shared.complete(Outcome::Success(value));
            }
            Err(err) => {
                self.shared.complete(Outcome::Failure(err));
            }
        }
    }

    fn record_failure(&mut self, err: CoveError) -> bool {
        // Frames from the failed attempt must not leak into a retry.
        self.frames.clear();
        self.last_error = Some(err);
        self.tries_left = self.tries_left.saturating_sub(1);
        self.tries_left > 0
    }

    fn fail(&mut self) {
        let err = self
            .last_error
            .take()
            .unwrap_or_else(|| CoveError::NodeUnavailable("no attempt recorded".to_string()));
        self.shared.complete(Outcome::Failure(err));
    }

    fn fail_with(&mut self, err: CoveError) {
        self.shared.complete(Outcome::Failure(err));
    }

    fn mark_bound(&self) {
        self.shared.bound.store(true, Ordering::SeqCst);
    }

    fn is_terminal(&self) -> bool {
        self.shared.is_done()
    }

    fn cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    fn complete_cancelled(&mut self) {
        self.shared.complete(Outcome::Cancelled);
    }
}
