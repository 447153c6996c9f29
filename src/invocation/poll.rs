//! Poll State Machine
//!
//! A poll tracks one request sent to a set of members on the issuing side. Each
//! target member resolves exactly once, either by responding or by leaving the
//! service; the poll completes when the last one resolves or when it is closed
//! early (timeout, send failure). Completion happens once: late responses and
//! late departures find the poll closed and are dropped.
//!
//! All state lives behind the poll's own lock. Observer callbacks run under that
//! lock, so callbacks for one poll never overlap.

use super::envelope::{ExceptionKind, Outcome, PollId, RemoteException};
use crate::membership::types::MemberId;

use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Per-member outcomes collected by a query poll. Departed members are absent.
pub type QueryResult = HashMap<MemberId, Outcome>;

/// Callback target for `execute` with an observer.
///
/// Every method defaults to a no-op. Panics raised by an implementation are
/// caught and logged; they never disturb poll bookkeeping.
pub trait InvocationObserver: Send + Sync {
    fn member_completed(&self, _member: &MemberId, _result: &Value) {}

    fn member_failed(&self, _member: &MemberId, _exception: &RemoteException) {}

    fn member_left(&self, _member: &MemberId) {}

    fn invocation_completed(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Open,
    /// Completion callbacks are running.
    Completing,
    Closed,
}

enum PollMode {
    Query {
        exceptions_as_values: bool,
        notify: Option<oneshot::Sender<QueryResult>>,
    },
    Observer(Arc<dyn InvocationObserver>),
}

struct PollInner {
    state: PollState,
    remaining: HashSet<MemberId>,
    responded: HashSet<MemberId>,
    left: HashSet<MemberId>,
    results: QueryResult,
    mode: PollMode,
}

pub struct Poll {
    id: PollId,
    initial: HashSet<MemberId>,
    opened_at: Instant,
    inner: Mutex<PollInner>,
}

impl Poll {
    /// Opens a query poll. The receiver yields the result map once the poll
    /// completes, including when it is force-closed.
    pub fn open_query(
        id: PollId,
        members: impl IntoIterator<Item = MemberId>,
        exceptions_as_values: bool,
    ) -> (Self, oneshot::Receiver<QueryResult>) {
        let (tx, rx) = oneshot::channel();
        let poll = Self::open(
            id,
            members,
            PollMode::Query {
                exceptions_as_values,
                notify: Some(tx),
            },
        );
        (poll, rx)
    }

    pub fn open_observed(
        id: PollId,
        members: impl IntoIterator<Item = MemberId>,
        observer: Arc<dyn InvocationObserver>,
    ) -> Self {
        Self::open(id, members, PollMode::Observer(observer))
    }

    fn open(id: PollId, members: impl IntoIterator<Item = MemberId>, mode: PollMode) -> Self {
        let initial: HashSet<MemberId> = members.into_iter().collect();
        Self {
            id,
            opened_at: Instant::now(),
            inner: Mutex::new(PollInner {
                state: PollState::Open,
                remaining: initial.clone(),
                responded: HashSet::new(),
                left: HashSet::new(),
                results: HashMap::new(),
                mode,
            }),
            initial,
        }
    }

    pub fn id(&self) -> PollId {
        self.id
    }

    /// True for polls opened with [`open_query`](Self::open_query).
    pub fn is_query(&self) -> bool {
        matches!(self.inner.lock().mode, PollMode::Query { .. })
    }

    pub fn state(&self) -> PollState {
        self.inner.lock().state
    }

    /// True once completion callbacks have run and no further response is
    /// accepted.
    pub fn is_closed(&self) -> bool {
        self.state() == PollState::Closed
    }

    /// Time since the poll was opened.
    pub fn elapsed(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Members targeted when the poll was opened. Never changes.
    pub fn initial_members(&self) -> &HashSet<MemberId> {
        &self.initial
    }

    /// Snapshots of the member sets. Every initial member is in exactly one of
    /// remaining, responded or left.
    pub fn remaining_members(&self) -> HashSet<MemberId> {
        self.inner.lock().remaining.clone()
    }

    pub fn responded_members(&self) -> HashSet<MemberId> {
        self.inner.lock().responded.clone()
    }

    pub fn left_members(&self) -> HashSet<MemberId> {
        self.inner.lock().left.clone()
    }

    /// Records a member's response. Returns true if this response completed
    /// the poll.
    pub fn on_response(&self, member: &MemberId, outcome: Outcome) -> bool {
        let mut inner = self.inner.lock();

        if inner.state != PollState::Open {
            tracing::debug!("Discarding late response from {} to closed poll {}", member, self.id);
            return false;
        }

        if !inner.remaining.remove(member) {
            tracing::error!(
                "Poll {} received a response from {} which is not pending (responded={}, left={})",
                self.id,
                member,
                inner.responded.contains(member),
                inner.left.contains(member)
            );
            return false;
        }
        inner.responded.insert(member.clone());

        let PollInner { mode, results, .. } = &mut *inner;
        match mode {
            PollMode::Query {
                exceptions_as_values,
                ..
            } => {
                if let Outcome::Exception(e) = &outcome
                    && !*exceptions_as_values
                {
                    tracing::warn!("Invocation request to {} threw an exception: {}", member, e);
                }
                results.insert(member.clone(), outcome);
            }
            PollMode::Observer(observer) => {
                let observer = observer.clone();
                match &outcome {
                    Outcome::Result(value) => self.notify("member_completed", || {
                        observer.member_completed(member, value)
                    }),
                    Outcome::Exception(e) => self.notify("member_failed", || {
                        observer.member_failed(member, e)
                    }),
                }
            }
        }

        if inner.remaining.is_empty() {
            self.complete(&mut inner, false);
            return true;
        }
        false
    }

    /// Called for every departing member, including ones this poll never
    /// targeted. Returns true if the departure completed the poll.
    pub fn on_member_left(&self, member: &MemberId) -> bool {
        let mut inner = self.inner.lock();

        if inner.state != PollState::Open || !inner.remaining.remove(member) {
            return false;
        }
        inner.left.insert(member.clone());

        if let PollMode::Observer(observer) = &inner.mode {
            let observer = observer.clone();
            self.notify("member_left", || observer.member_left(member));
        }

        if inner.remaining.is_empty() {
            self.complete(&mut inner, false);
            return true;
        }
        false
    }

    /// Completes the poll regardless of remaining members. Returns false if it
    /// was already closed.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != PollState::Open {
            return false;
        }
        self.complete(&mut inner, false);
        true
    }

    /// Force-closes the poll because its deadline passed. Observers see
    /// `member_failed` with a timeout for every member still pending. Returns
    /// false if the poll had already completed.
    pub fn expire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != PollState::Open {
            return false;
        }
        tracing::debug!(
            "Poll {} expired after {:?} with {} member(s) pending",
            self.id,
            self.elapsed(),
            inner.remaining.len()
        );
        self.complete(&mut inner, true);
        true
    }

    fn complete(&self, inner: &mut PollInner, timed_out: bool) {
        inner.state = PollState::Completing;

        match &mut inner.mode {
            PollMode::Query { notify, .. } => {
                let results = std::mem::take(&mut inner.results);
                if let Some(tx) = notify.take() {
                    // The waiter may have given up already.
                    let _ = tx.send(results);
                }
            }
            PollMode::Observer(observer) => {
                let observer = observer.clone();
                if timed_out {
                    let exception = RemoteException::new(
                        ExceptionKind::RequestTimeout,
                        format!("Request timed out after {} milliseconds", self.elapsed().as_millis()),
                    );
                    for member in inner.remaining.iter() {
                        self.notify("member_failed", || observer.member_failed(member, &exception));
                    }
                }
                self.notify("invocation_completed", || observer.invocation_completed());
            }
        }

        inner.state = PollState::Closed;
    }

    fn notify(&self, callback: &str, f: impl FnOnce()) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
            tracing::error!(
                "Observer callback {} panicked for poll {}: {}",
                callback,
                self.id,
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
