//! Response correlation and retry engine.
//!
//! Every awaited command gets an expected-response record that lives until
//! a report line with the same group key arrives, the command runs out of
//! retries, or it expires. Records and the outgoing queue share one lock so
//! that queueing a command and registering its record, or sending it and
//! arming its timers, happen atomically.
//!
//! Coalescing in the queue means one caller's command can be replaced by
//! another's before it is sent. The record follows the replacement, so a
//! caller always observes the outcome of whichever command for the group
//! actually went out: the last QoS-escalated resend wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use avrctl_core::CommandInstance;
use avrctl_core::error::Result;

use crate::message::ParsedMessage;
use crate::queue::{CommandQueue, PushOutcome};

/// Default wait before an unanswered command is resent.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

/// Default lifetime of an expected response, from its first transmission.
pub const DEFAULT_COMMAND_EXPIRATION: Duration = Duration::from_secs(10);

/// Timing of resends and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after each transmission before resending.
    pub command_timeout: Duration,
    /// Hard deadline measured from the first transmission.
    pub command_expiration: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            command_expiration: DEFAULT_COMMAND_EXPIRATION,
        }
    }
}

// ---------------------------------------------------------------------------
// PendingResponse
// ---------------------------------------------------------------------------

type Waiter = oneshot::Sender<Option<ParsedMessage>>;

/// Resolves to the matching report line, or `None` if the command expired,
/// ran out of retries, or the connection was torn down.
#[derive(Debug)]
pub struct PendingResponse {
    rx: Option<oneshot::Receiver<Option<ParsedMessage>>>,
}

impl PendingResponse {
    fn waiting() -> (Waiter, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, PendingResponse { rx: Some(rx) })
    }

    /// A response that is already resolved to `None`.
    pub fn resolved() -> Self {
        PendingResponse { rx: None }
    }
}

impl Future for PendingResponse {
    type Output = Option<ParsedMessage>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            Some(rx) => Pin::new(rx).poll(cx).map(|r| r.ok().flatten()),
            None => Poll::Ready(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Expected responses
// ---------------------------------------------------------------------------

struct Expected {
    id: u64,
    command: CommandInstance,
    attempts: u32,
    sent_at: Option<Instant>,
    waiters: Vec<Waiter>,
    resend: Option<JoinHandle<()>>,
    expire: Option<JoinHandle<()>>,
}

impl Expected {
    fn is_for(&self, command: &CommandInstance) -> bool {
        self.command.group_key() == command.group_key()
            && self.command.sequence() == command.sequence()
    }

    fn cancel_timers(&mut self) {
        if let Some(handle) = self.resend.take() {
            handle.abort();
        }
        if let Some(handle) = self.expire.take() {
            handle.abort();
        }
    }

    fn resolve(mut self, message: Option<ParsedMessage>) {
        self.cancel_timers();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(message.clone());
        }
    }
}

struct Outbox {
    queue: CommandQueue,
    pending: Vec<Expected>,
    next_id: u64,
    sequence: u64,
}

impl Outbox {
    fn register(&mut self, command: CommandInstance, waiters: Vec<Waiter>) {
        self.next_id += 1;
        self.pending.push(Expected {
            id: self.next_id,
            command,
            attempts: 0,
            sent_at: None,
            waiters,
            resend: None,
            expire: None,
        });
    }

    fn index_of(&self, command: &CommandInstance) -> Option<usize> {
        self.pending.iter().position(|e| e.is_for(command))
    }

    fn index_of_id(&self, id: u64) -> Option<usize> {
        self.pending.iter().position(|e| e.id == id)
    }
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

/// Shared handle to the outgoing queue and the expected-response table.
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<Mutex<Outbox>>,
    policy: RetryPolicy,
}

impl Correlator {
    /// Create an engine with `levels` QoS tiers.
    pub fn new(levels: u8, policy: RetryPolicy) -> Self {
        Correlator {
            inner: Arc::new(Mutex::new(Outbox {
                queue: CommandQueue::new(levels),
                pending: Vec::new(),
                next_id: 0,
                sequence: 0,
            })),
            policy,
        }
    }

    /// Queue a command and return a handle that resolves with its response.
    pub async fn submit(&self, command: CommandInstance) -> Result<PendingResponse> {
        let mut outbox = self.inner.lock().await;
        outbox.sequence += 1;
        let command = command.with_sequence(outbox.sequence);
        let outcome = outbox.queue.push(command.clone())?;
        let (waiter, pending) = PendingResponse::waiting();

        match outcome {
            PushOutcome::NotCanceled => {
                debug!(command = %command, qos = command.qos(), "queued");
                outbox.register(command, vec![waiter]);
            }
            PushOutcome::Canceled(displaced) => {
                debug!(command = %command, displaced = %displaced, "replaced queued command");
                match outbox.index_of(&displaced) {
                    Some(idx) => {
                        let expected = &mut outbox.pending[idx];
                        expected.command = command;
                        expected.waiters.push(waiter);
                    }
                    None => outbox.register(command, vec![waiter]),
                }
            }
            PushOutcome::Failed(winner) => {
                debug!(
                    command = %command,
                    winner = %winner,
                    "higher priority command already queued"
                );
                match outbox.index_of(&winner) {
                    Some(idx) => outbox.pending[idx].waiters.push(waiter),
                    None => outbox.register(winner, vec![waiter]),
                }
            }
        }

        Ok(pending)
    }

    /// Queue a command without waiting for its response.
    pub async fn submit_silent(&self, command: CommandInstance) -> Result<()> {
        let mut outbox = self.inner.lock().await;
        outbox.sequence += 1;
        let command = command.with_sequence(outbox.sequence);
        if let PushOutcome::Canceled(displaced) = outbox.queue.push(command.clone())? {
            if let Some(idx) = outbox.index_of(&displaced) {
                outbox.pending[idx].command = command;
            }
        }
        Ok(())
    }

    /// Take the next command to transmit.
    pub async fn pop(&self) -> Option<CommandInstance> {
        self.inner.lock().await.queue.pop()
    }

    /// Record that `command` was written to the wire at `at`.
    ///
    /// Arms the expiry timer on the first transmission, escalates the
    /// command's QoS once, queues a plain query alongside every resend, and
    /// restarts the resend timer.
    pub async fn mark_sent(&self, command: &CommandInstance, at: Instant) {
        let mut outbox = self.inner.lock().await;
        let Some(idx) = outbox.index_of(command) else {
            return;
        };

        let levels = outbox.queue.levels();
        let resend_query = {
            let expected = &mut outbox.pending[idx];
            if expected.expire.is_none() {
                expected.expire = Some(tokio::spawn(
                    self.clone().expire_after(expected.id, self.policy.command_expiration),
                ));
            }

            let query = (expected.attempts >= 1).then(|| expected.command.spec().query(0));
            if expected.attempts == 0 {
                expected.command.raise_qos(levels);
            }
            expected.attempts += 1;
            expected.sent_at = Some(at);

            if let Some(handle) = expected.resend.take() {
                handle.abort();
            }
            expected.resend = Some(tokio::spawn(
                self.clone().resend_after(expected.id, self.policy.command_timeout),
            ));
            query
        };

        // A queued command for the group will disambiguate on its own.
        if let Some(query) = resend_query {
            if !outbox.queue.contains(query.group_key()) {
                outbox.sequence += 1;
                let query = query.with_sequence(outbox.sequence);
                if let Err(e) = outbox.queue.push(query) {
                    warn!(error = %e, "failed to queue resend query");
                }
            }
        }
    }

    async fn resend_after(self, id: u64, delay: Duration) {
        tokio::time::sleep(delay).await;
        self.resend(id).await;
    }

    async fn expire_after(self, id: u64, delay: Duration) {
        tokio::time::sleep(delay).await;
        let mut outbox = self.inner.lock().await;
        if let Some(idx) = outbox.index_of_id(id) {
            let mut expected = outbox.pending.remove(idx);
            expected.expire = None;
            debug!(command = %expected.command, "command expired");
            expected.resolve(None);
        }
    }

    async fn resend(&self, id: u64) {
        let mut outbox = self.inner.lock().await;
        let Some(idx) = outbox.index_of_id(id) else {
            return;
        };
        outbox.pending[idx].resend = None;

        let expected = &outbox.pending[idx];
        if expected.attempts > u32::from(expected.command.retry_budget()) {
            let expected = outbox.pending.remove(idx);
            debug!(
                command = %expected.command,
                attempts = expected.attempts,
                "no response after retries"
            );
            expected.resolve(None);
            return;
        }

        let command = expected.command.clone();
        match outbox.queue.push(command.clone()) {
            Ok(PushOutcome::NotCanceled) => {
                debug!(command = %command, qos = command.qos(), "resending");
            }
            Ok(PushOutcome::Canceled(displaced)) => {
                debug!(command = %command, displaced = %displaced, "resend replaced queued command");
                if let Some(didx) = outbox.index_of(&displaced).filter(|&d| d != idx) {
                    let mut absorbed = outbox.pending.remove(didx);
                    absorbed.cancel_timers();
                    let waiters = std::mem::take(&mut absorbed.waiters);
                    if let Some(idx) = outbox.index_of_id(id) {
                        outbox.pending[idx].waiters.extend(waiters);
                    }
                }
            }
            Ok(PushOutcome::Failed(winner)) => {
                debug!(command = %command, winner = %winner, "resend lost to queued command");
                let mut ours = outbox.pending.remove(idx);
                ours.cancel_timers();
                let waiters = std::mem::take(&mut ours.waiters);
                match outbox.index_of(&winner) {
                    Some(widx) => outbox.pending[widx].waiters.extend(waiters),
                    None => outbox.register(winner, waiters),
                }
            }
            Err(e) => {
                warn!(command = %command, error = %e, "failed to requeue command");
                let expected = outbox.pending.remove(idx);
                expected.resolve(None);
            }
        }
    }

    /// Resolve the oldest expected response whose group matches `message`.
    ///
    /// Returns `true` if one was waiting.
    pub async fn resolve(&self, message: &ParsedMessage) -> bool {
        let group = message.group_key();
        let mut outbox = self.inner.lock().await;
        let Some(idx) = outbox
            .pending
            .iter()
            .position(|e| e.command.group_key() == group)
        else {
            return false;
        };
        let expected = outbox.pending.remove(idx);
        debug!(
            command = %expected.command,
            response = %message,
            attempts = expected.attempts,
            latency = ?expected.sent_at.map(|t| t.elapsed()),
            "matched response"
        );
        expected.resolve(Some(message.clone()));
        true
    }

    /// Fail every expected response, empty the queue and restart sequence
    /// numbering.
    pub async fn reset(&self) {
        let mut outbox = self.inner.lock().await;
        outbox.queue.clear();
        outbox.sequence = 0;
        let failed: Vec<Expected> = outbox.pending.drain(..).collect();
        if !failed.is_empty() {
            debug!(count = failed.len(), "failing pending responses");
        }
        for expected in failed {
            expected.resolve(None);
        }
    }

    /// Number of expected responses still outstanding.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Number of commands waiting to be transmitted.
    pub async fn queued_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Retry timing in use.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}
