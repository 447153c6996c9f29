//! Invocation Service
//!
//! Caller side: `fire_and_forget`, `execute_with_observer` and `query` wrap a
//! task in an envelope, open a [`Poll`] when responses are expected and hand
//! the envelope to the transport.
//!
//! Receiver side: the receive loop decodes frames and dispatches them. Requests
//! are initialized on the loop, then either scheduled on the worker pool or run
//! inline when there is no pool. Every request produces exactly one response,
//! routed through the sender's [`OrderedBuffer`] when the task asked for
//! in-order responses.
//!
//! Membership departures close the departed member's share of every open poll
//! and discard its ordered buffer.

use super::envelope::{
    Envelope, ExceptionKind, InvocationMessage, InvocationRequest, InvocationResponse, Outcome,
    PollId, RemoteException, TaskPayload,
};
use super::ordered::{OrderedBuffer, ProcessId, Release};
use super::poll::{InvocationObserver, Poll, QueryResult};
use super::task::{Invocable, SchedulingPriority, ServiceContext, Task, TaskOptions};
use crate::config::ServiceConfig;
use crate::error::{InvocationError, Result};
use crate::executor::pool::{AbortOnDrop, Job, JobFuture, PoolStats, WorkerPool};
use crate::executor::registry::TaskRegistry;
use crate::membership::service::MembershipService;
use crate::membership::types::{MemberEvent, MemberId};
use crate::transport::{Inbox, Transport, TransportError, codec};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinError;

tokio::task_local! {
    static NON_BLOCKING: bool;
}

/// Runs `fut` as a non-blocking caller: invocations issued inside it skip the
/// backlog drain.
pub async fn non_blocking<F: Future>(fut: F) -> F::Output {
    NON_BLOCKING.scope(true, fut).await
}

fn is_non_blocking_caller() -> bool {
    NON_BLOCKING.try_with(|flag| *flag).unwrap_or(false)
}

type ProcessBuffer = OrderedBuffer<PollId, InvocationResponse>;

#[derive(Default)]
struct Counters {
    messages_received: AtomicU64,
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    request_timeouts: AtomicU64,
    tasks_canceled: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub service_name: String,
    pub messages_received: u64,
    pub requests_received: u64,
    pub responses_sent: u64,
    pub request_timeouts: u64,
    pub tasks_canceled: u64,
    pub open_polls: usize,
    pub ordered_senders: usize,
    pub pool: Option<PoolStats>,
}

pub struct InvocationService {
    config: ServiceConfig,
    membership: Arc<MembershipService>,
    transport: Arc<dyn Transport>,
    registry: Arc<TaskRegistry>,
    pool: Option<Arc<WorkerPool>>,
    polls: DashMap<PollId, Arc<Poll>>,
    /// Ordered buffers keyed by sending member.
    pending: DashMap<MemberId, Arc<ProcessBuffer>>,
    next_poll_id: AtomicU64,
    counters: Counters,
    running: AtomicBool,
}

impl InvocationService {
    /// Creates a stopped service. A pool is built only when
    /// `config.worker_count` is non-zero.
    ///
    /// # Arguments
    /// * `config` - Service name, worker count and default timeouts.
    /// * `membership` - Registry of the members running the service.
    /// * `transport` - Outbound channel to the other members.
    /// * `registry` - Handlers the receiver side can instantiate.
    pub fn new(
        config: ServiceConfig,
        membership: Arc<MembershipService>,
        transport: Arc<dyn Transport>,
        registry: Arc<TaskRegistry>,
    ) -> Arc<Self> {
        let pool = (config.worker_count > 0).then(|| WorkerPool::new(config.worker_count));

        Arc::new(Self {
            config,
            membership,
            transport,
            registry,
            pool,
            polls: DashMap::new(),
            pending: DashMap::new(),
            next_poll_id: AtomicU64::new(1),
            counters: Counters::default(),
            running: AtomicBool::new(false),
        })
    }

    /// Starts the worker pool, the receive loop over `inbox` and the membership
    /// event loop.
    pub fn start(self: &Arc<Self>, inbox: Inbox) {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("{} already started", self.config.service_name);
            return;
        }

        if let Some(pool) = &self.pool {
            pool.start();
        }

        let service = self.clone();
        tokio::spawn(async move {
            service.receive_loop(inbox).await;
        });

        let service = self.clone();
        let events = self.membership.subscribe();
        tokio::spawn(async move {
            service.membership_loop(events).await;
        });

        tracing::info!(
            "{} started on member {} with {} worker(s)",
            self.config.service_name,
            self.local_member(),
            self.config.worker_count
        );
    }

    /// Stops the worker pool. Queued jobs are canceled; the receive loop keeps
    /// running inline.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(pool) = &self.pool {
            pool.shutdown();
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The membership this service resolves targets and departures against.
    pub fn membership(&self) -> &Arc<MembershipService> {
        &self.membership
    }

    pub fn local_member(&self) -> &MemberId {
        self.membership.local_id()
    }

    /// Context handed to every task at init.
    pub fn context(&self) -> ServiceContext {
        ServiceContext {
            service_name: self.config.service_name.clone(),
            local_member: self.local_member().clone(),
            membership: self.membership.clone(),
        }
    }

    /// Polls still waiting for members to answer or leave.
    pub fn open_poll_count(&self) -> usize {
        self.polls.len()
    }

    /// Outstanding ordered requests from `member`.
    ///
    /// # Returns
    /// * `Some(n)` with the admitted requests not yet released.
    /// * `None` if `member` never sent an in-order request, or its buffer was
    ///   discarded when it departed.
    pub fn ordered_backlog(&self, member: &MemberId) -> Option<usize> {
        let buffer = self.pending.get(member).map(|entry| entry.value().clone());
        buffer.map(|buffer| buffer.len())
    }

    /// Snapshot of the counters, open polls and pool state.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            service_name: self.config.service_name.clone(),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            requests_received: self.counters.requests_received.load(Ordering::Relaxed),
            responses_sent: self.counters.responses_sent.load(Ordering::Relaxed),
            request_timeouts: self.counters.request_timeouts.load(Ordering::Relaxed),
            tasks_canceled: self.counters.tasks_canceled.load(Ordering::Relaxed),
            open_polls: self.polls.len(),
            ordered_senders: self.pending.len(),
            pool: self.pool.as_ref().map(|pool| pool.stats()),
        }
    }

    // ============================================================
    // CALLER SIDE
    // ============================================================

    /// Runs `task` on `members` (all service members when `None`) without
    /// collecting results.
    pub async fn fire_and_forget(&self, task: Task, members: Option<Vec<MemberId>>) -> Result<()> {
        task.validate()?;
        let targets = self.resolve_targets(members);
        let timeout = task.options.request_timeout().or(self.config.request_timeout());

        let envelope = Envelope::Message(InvocationMessage {
            task: TaskPayload::Decoded(task),
        });
        self.transport.send(&targets, &envelope)?;
        tracing::debug!("Sent {} to {} member(s)", envelope.kind(), targets.len());

        self.drain_overflow(&targets, timeout).await
    }

    /// Dispatches to [`fire_and_forget`](Self::fire_and_forget) without an
    /// observer and to [`execute_with_observer`](Self::execute_with_observer)
    /// with one.
    pub async fn execute(
        self: &Arc<Self>,
        task: Task,
        members: Option<Vec<MemberId>>,
        observer: Option<Arc<dyn InvocationObserver>>,
    ) -> Result<()> {
        match observer {
            None => self.fire_and_forget(task, members).await,
            Some(observer) => self.execute_with_observer(task, members, observer).await,
        }
    }

    /// Sends `task` and returns once it is on its way; per-member outcomes are
    /// reported to `observer`.
    pub async fn execute_with_observer(
        self: &Arc<Self>,
        task: Task,
        members: Option<Vec<MemberId>>,
        observer: Arc<dyn InvocationObserver>,
    ) -> Result<()> {
        task.validate()?;
        let targets = self.resolve_targets(members);
        let poll_id = self.next_poll_id();
        let request_timeout = task.options.request_timeout();
        let drain_timeout = request_timeout.or(self.config.request_timeout());

        let poll = Arc::new(Poll::open_observed(poll_id, targets.clone(), observer));
        let envelope = self.request_envelope(poll_id, task, false, true);
        self.dispatch(&poll, &targets, &envelope)?;

        if let Some(timeout) = request_timeout
            && !poll.is_closed()
        {
            let service = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if poll.expire() {
                    service.counters.request_timeouts.fetch_add(1, Ordering::Relaxed);
                    service.polls.remove(&poll.id());
                }
            });
        }

        self.drain_overflow(&targets, drain_timeout).await
    }

    /// Runs `task` on `members` and waits for every member to answer or leave.
    ///
    /// Fails with [`InvocationError::RequestTimeout`] when the deadline passes
    /// first; the error carries the results gathered so far.
    pub async fn query(&self, task: Task, members: Option<Vec<MemberId>>) -> Result<QueryResult> {
        task.validate()?;
        let targets = self.resolve_targets(members);
        let poll_id = self.next_poll_id();
        let timeout = task.options.request_timeout().or(self.config.request_timeout());

        let (poll, mut completion) =
            Poll::open_query(poll_id, targets.clone(), task.options.exceptions_as_values);
        let poll = Arc::new(poll);
        let envelope = self.request_envelope(poll_id, task, true, false);
        self.dispatch(&poll, &targets, &envelope)?;

        let Some(timeout) = timeout else {
            return completion.await.map_err(|_| InvocationError::ServiceStopped);
        };

        match tokio::time::timeout(timeout, &mut completion).await {
            Ok(results) => results.map_err(|_| InvocationError::ServiceStopped),
            Err(_) => {
                let expired = poll.expire();
                self.polls.remove(&poll_id);
                let results = completion.try_recv().unwrap_or_default();

                if !expired {
                    // Completed while the deadline fired.
                    return Ok(results);
                }

                self.counters.request_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Query poll {} timed out with {} of {} member(s) answered",
                    poll_id,
                    results.len(),
                    targets.len()
                );
                Err(InvocationError::RequestTimeout {
                    elapsed_ms: poll.elapsed().as_millis() as u64,
                    partial: results,
                })
            }
        }
    }

    fn next_poll_id(&self) -> PollId {
        self.next_poll_id.fetch_add(1, Ordering::Relaxed)
    }

    fn resolve_targets(&self, members: Option<Vec<MemberId>>) -> Vec<MemberId> {
        match members {
            None => self.membership.service_members(),
            Some(mut members) => {
                members.sort();
                members.dedup();
                members
            }
        }
    }

    fn request_envelope(&self, poll_id: PollId, task: Task, is_query: bool, has_observer: bool) -> Envelope {
        Envelope::Request(InvocationRequest {
            poll_id,
            respond_in_order: task.options.respond_in_order,
            task: TaskPayload::Decoded(task),
            is_query,
            has_observer,
        })
    }

    /// Registers the poll, sends the request and settles members that are no
    /// longer (or never were) part of the service.
    fn dispatch(&self, poll: &Arc<Poll>, targets: &[MemberId], envelope: &Envelope) -> Result<()> {
        if targets.is_empty() {
            poll.close();
            return Ok(());
        }

        // Registered before sending: a response may arrive before send returns.
        self.polls.insert(poll.id(), poll.clone());

        if let Err(e) = self.transport.send(targets, envelope) {
            self.polls.remove(&poll.id());
            poll.close();
            return Err(e.into());
        }

        for member in targets {
            if !self.membership.contains(member) && poll.on_member_left(member) {
                self.polls.remove(&poll.id());
            }
        }
        Ok(())
    }

    /// Waits until the outbound backlog toward `members` is below the
    /// configured threshold. Skipped entirely for non-blocking callers.
    pub async fn drain_overflow(&self, members: &[MemberId], timeout: Option<Duration>) -> Result<()> {
        if is_non_blocking_caller() {
            return Ok(());
        }

        let started = Instant::now();
        loop {
            let congested = members
                .iter()
                .any(|member| self.transport.backlog(member) > self.config.backlog_threshold);
            if !congested {
                return Ok(());
            }

            if let Some(timeout) = timeout
                && started.elapsed() >= timeout
            {
                return Err(InvocationError::RequestTimeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    partial: HashMap::new(),
                });
            }

            tokio::time::sleep(self.config.drain_poll_interval()).await;
        }
    }

    // ============================================================
    // RECEIVER SIDE
    // ============================================================

    async fn receive_loop(self: Arc<Self>, mut inbox: Inbox) {
        while let Some(frame) = inbox.recv().await {
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            let service = self.clone();
            non_blocking(service.on_frame(frame.from, frame.bytes)).await;
        }
        tracing::info!("{} receive loop stopped", self.config.service_name);
    }

    async fn membership_loop(self: Arc<Self>, mut events: broadcast::Receiver<MemberEvent>) {
        loop {
            match events.recv().await {
                Ok(MemberEvent::Joined(member)) => {
                    tracing::debug!("{} sees member {} joined", self.config.service_name, member.id);
                }
                Ok(MemberEvent::Left(member)) => self.on_member_departed(&member),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Membership event loop lagged by {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Decodes and dispatches one frame received from `from`.
    pub async fn on_frame(self: Arc<Self>, from: MemberId, bytes: Vec<u8>) {
        match codec::decode(&bytes) {
            Ok(envelope) => self.on_envelope(from, envelope).await,
            Err(e) => tracing::warn!("Discarding frame from {}: {}", from, e),
        }
    }

    /// Routes a decoded envelope to the message, request or response path.
    pub async fn on_envelope(self: Arc<Self>, from: MemberId, envelope: Envelope) {
        tracing::trace!("Received {} from {}", envelope.kind(), from);

        match envelope {
            Envelope::Message(msg) => self.on_invocation_message(from, msg).await,
            Envelope::Request(req) => self.on_invocation_request(from, req).await,
            Envelope::Response(resp) => self.on_invocation_response(from, resp),
        }
    }

    async fn on_invocation_message(self: Arc<Self>, from: MemberId, msg: InvocationMessage) {
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);

        let task = match msg.task {
            TaskPayload::Decoded(task) => task,
            TaskPayload::Undecodable(reason) => {
                tracing::warn!("Dropping undecodable task from {}: {}", from, reason);
                return;
            }
        };

        let invocable = match self.registry.instantiate(&task, &self.context()) {
            Ok(invocable) => invocable,
            Err(e) => {
                tracing::error!("Failure to initialize task '{}' from {}: {:#}", task.handler, from, e);
                return;
            }
        };

        let job = MessageJob {
            handler: task.handler,
            options: task.options,
            from,
            task: invocable,
        };

        match self.active_pool() {
            Some(pool) => pool.submit(Box::new(job)),
            None => {
                let mut job = job;
                job.start().await;
            }
        }
    }

    async fn on_invocation_request(self: Arc<Self>, from: MemberId, req: InvocationRequest) {
        self.counters.requests_received.fetch_add(1, Ordering::Relaxed);
        let poll_id = req.poll_id;

        let task = match req.task {
            TaskPayload::Decoded(task) => task,
            TaskPayload::Undecodable(reason) => {
                let exception = RemoteException::new(ExceptionKind::Deserialization, reason);
                self.send_response(&from, InvocationResponse {
                    poll_id,
                    outcome: Outcome::Exception(exception),
                });
                return;
            }
        };

        let invocable = match self.registry.instantiate(&task, &self.context()) {
            Ok(invocable) => invocable,
            Err(e) => {
                tracing::debug!("Failure to initialize task '{}' from {}: {:#}", task.handler, from, e);
                let exception = RemoteException::new(ExceptionKind::TaskInit, format!("{:#}", e));
                self.send_response(&from, InvocationResponse {
                    poll_id,
                    outcome: Outcome::Exception(exception),
                });
                return;
            }
        };

        match self.active_pool() {
            Some(pool) => {
                let ordered = if req.respond_in_order {
                    let Some(slot) = self.admit_ordered(&from, poll_id) else {
                        tracing::debug!(
                            "Dropping in-order request for poll {} from departed member {}",
                            poll_id,
                            from
                        );
                        return;
                    };
                    Some(slot)
                } else {
                    None
                };
                let ctx = Arc::new(RequestContext::new(from, poll_id, ordered, task.handler));
                pool.submit(Box::new(RequestJob {
                    service: self.clone(),
                    ctx,
                    options: task.options,
                    task: invocable,
                }));
            }
            None => {
                // A single thread of execution keeps arrival order by itself.
                let ctx = Arc::new(RequestContext::new(from, poll_id, None, task.handler));
                let mut job = RequestJob {
                    service: self.clone(),
                    ctx,
                    options: task.options,
                    task: invocable,
                };
                job.start().await;
            }
        }
    }

    fn on_invocation_response(&self, from: MemberId, resp: InvocationResponse) {
        let Some(poll) = self.polls.get(&resp.poll_id).map(|entry| entry.value().clone()) else {
            tracing::debug!("Discarding response from {} for closed poll {}", from, resp.poll_id);
            return;
        };

        if poll.on_response(&from, resp.outcome) {
            self.polls.remove(&resp.poll_id);
        }
    }

    /// Settles `member` in every open poll and drops its ordered buffer.
    pub fn on_member_departed(&self, member: &MemberId) {
        let polls: Vec<Arc<Poll>> = self.polls.iter().map(|entry| entry.value().clone()).collect();

        for poll in polls {
            if poll.on_member_left(member) {
                self.polls.remove(&poll.id());
            }
        }

        if let Some((_, buffer)) = self.pending.remove(member) {
            tracing::debug!(
                "Discarded ordered buffer for departed member {} ({} outstanding)",
                member,
                buffer.len()
            );
        }
    }

    fn active_pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref().filter(|pool| pool.is_started())
    }

    /// Admits a request into `member`'s ordered buffer, creating the buffer on
    /// first use.
    ///
    /// # Returns
    /// * `Some(slot)` holding the buffer and the assigned process id.
    /// * `None` if `member` is not (or no longer) part of the membership. No
    ///   buffer is left behind in that case.
    fn admit_ordered(&self, member: &MemberId, poll_id: PollId) -> Option<OrderedSlot> {
        if !self.membership.contains(member) {
            return None;
        }

        let buffer = self
            .pending
            .entry(member.clone())
            .or_insert_with(|| Arc::new(OrderedBuffer::new()))
            .value()
            .clone();

        // The member may have departed between the check and the insert, after
        // its buffer was already discarded.
        if !self.membership.contains(member) {
            self.pending
                .remove_if(member, |_, current| Arc::ptr_eq(current, &buffer));
            return None;
        }

        let process_id = buffer.admit(poll_id);
        Some(OrderedSlot { buffer, process_id })
    }

    fn is_current_buffer(&self, member: &MemberId, buffer: &Arc<ProcessBuffer>) -> bool {
        self.pending
            .get(member)
            .is_some_and(|current| Arc::ptr_eq(current.value(), buffer))
    }

    /// Sends the one response for `ctx`. The first caller wins; later calls
    /// (a cancellation racing a completion) are dropped.
    ///
    /// In-order responses complete on the buffer they were admitted to. Once
    /// that buffer has been discarded (the sender departed, possibly rejoining
    /// with a fresh one) whatever it releases is dropped.
    pub(super) fn proceed(&self, ctx: &RequestContext, outcome: Outcome) {
        if ctx.responded.swap(true, Ordering::AcqRel) {
            tracing::debug!("Discarding second outcome for {}", ctx.description());
            return;
        }

        let response = InvocationResponse {
            poll_id: ctx.poll_id,
            outcome,
        };

        let Some(slot) = &ctx.ordered else {
            self.send_response(&ctx.from, response);
            return;
        };

        match slot.buffer.complete(slot.process_id, response) {
            Release::SendNow(drain) => {
                if !self.is_current_buffer(&ctx.from, &slot.buffer) {
                    tracing::debug!(
                        "Sender {} departed, dropping {} response(s) released by {}",
                        ctx.from,
                        drain.count(),
                        ctx.description()
                    );
                    return;
                }
                for response in drain {
                    self.send_response(&ctx.from, response);
                }
            }
            Release::Deferred => {
                tracing::trace!("Deferred response for process {} from {}", slot.process_id, ctx.from);
            }
        }
    }

    /// Sends a response, substituting a serialization exception if the response
    /// itself cannot be encoded.
    fn send_response(&self, to: &MemberId, response: InvocationResponse) {
        let poll_id = response.poll_id;
        let targets = std::slice::from_ref(to);

        match self.transport.send(targets, &Envelope::Response(response)) {
            Ok(()) => {
                self.counters.responses_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(TransportError::Encode(reason)) => {
                tracing::warn!("Failed to encode response for poll {} to {}: {}", poll_id, to, reason);
                let fallback = Envelope::Response(InvocationResponse {
                    poll_id,
                    outcome: Outcome::Exception(RemoteException::new(ExceptionKind::Serialization, reason)),
                });
                match self.transport.send(targets, &fallback) {
                    Ok(()) => {
                        self.counters.responses_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => tracing::error!("Failed to send response for poll {} to {}: {}", poll_id, to, e),
                }
            }
            Err(e) => tracing::warn!("Failed to send response for poll {} to {}: {}", poll_id, to, e),
        }
    }
}

/// Place of an in-order request in the buffer it was admitted to.
pub(super) struct OrderedSlot {
    buffer: Arc<ProcessBuffer>,
    process_id: ProcessId,
}

/// Receiver-side state of one request.
pub(super) struct RequestContext {
    from: MemberId,
    poll_id: PollId,
    ordered: Option<OrderedSlot>,
    handler: String,
    responded: AtomicBool,
}

impl RequestContext {
    pub(super) fn new(from: MemberId, poll_id: PollId, ordered: Option<OrderedSlot>, handler: String) -> Self {
        Self {
            from,
            poll_id,
            ordered,
            handler,
            responded: AtomicBool::new(false),
        }
    }

    fn description(&self) -> String {
        format!("InvocationRequest{{handler={}, poll={}, from={}}}", self.handler, self.poll_id, self.from)
    }
}

/// Spawns the task future on its own tokio task so a panic becomes an exception
/// outcome instead of taking the worker down. The caller's non-blocking status
/// carries over to the task.
fn spawn_task(task: &mut dyn Invocable) -> AbortOnDrop<anyhow::Result<Value>> {
    let non_blocking = is_non_blocking_caller();
    AbortOnDrop(tokio::spawn(NON_BLOCKING.scope(non_blocking, task.run())))
}

fn join_outcome(joined: std::result::Result<anyhow::Result<Value>, JoinError>) -> Outcome {
    match joined {
        Ok(result) => Outcome::from(result),
        Err(e) if e.is_panic() => Outcome::Exception(RemoteException::new(
            ExceptionKind::TaskExecution,
            "task panicked during execution",
        )),
        Err(e) => Outcome::Exception(RemoteException::new(ExceptionKind::TaskExecution, e.to_string())),
    }
}

fn cancel_task(task: &mut dyn Invocable, abandoned: bool, description: &str) {
    let canceled = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run_canceled(abandoned)));
    if canceled.is_err() {
        tracing::error!("run_canceled panicked for {}", description);
    }
}

struct RequestJob {
    service: Arc<InvocationService>,
    ctx: Arc<RequestContext>,
    options: TaskOptions,
    task: Box<dyn Invocable>,
}

impl Job for RequestJob {
    fn priority(&self) -> SchedulingPriority {
        self.options.priority
    }

    fn execution_timeout(&self) -> Option<Duration> {
        self.options.execution_timeout()
    }

    fn description(&self) -> String {
        self.ctx.description()
    }

    fn start(&mut self) -> JobFuture {
        let run = spawn_task(self.task.as_mut());
        let service = self.service.clone();
        let ctx = self.ctx.clone();

        Box::pin(async move {
            let outcome = join_outcome(run.await);
            service.proceed(&ctx, outcome);
        })
    }

    fn run_canceled(&mut self, abandoned: bool) {
        let description = self.ctx.description();
        cancel_task(self.task.as_mut(), abandoned, &description);

        self.service.counters.tasks_canceled.fetch_add(1, Ordering::Relaxed);
        let message = format!(
            "{} {}; Service={}",
            if abandoned { "Abandoned" } else { "Canceled" },
            description,
            self.service.config.service_name
        );
        self.service.proceed(
            &self.ctx,
            Outcome::Exception(RemoteException::new(ExceptionKind::RequestTimeout, message)),
        );
    }
}

struct MessageJob {
    handler: String,
    options: TaskOptions,
    from: MemberId,
    task: Box<dyn Invocable>,
}

impl Job for MessageJob {
    fn priority(&self) -> SchedulingPriority {
        self.options.priority
    }

    fn execution_timeout(&self) -> Option<Duration> {
        self.options.execution_timeout()
    }

    fn description(&self) -> String {
        format!("InvocationMessage{{handler={}, from={}}}", self.handler, self.from)
    }

    fn start(&mut self) -> JobFuture {
        let run = spawn_task(self.task.as_mut());
        let description = self.description();

        Box::pin(async move {
            match run.await {
                Ok(Ok(_)) => tracing::trace!("Completed {}", description),
                Ok(Err(e)) => tracing::error!("Failure to execute {}: {:#}", description, e),
                Err(e) => tracing::error!("Failure to execute {}: {}", description, e),
            }
        })
    }

    fn run_canceled(&mut self, abandoned: bool) {
        let description = self.description();
        tracing::debug!("{} {}", if abandoned { "Abandoned" } else { "Canceled" }, description);
        cancel_task(self.task.as_mut(), abandoned, &description);
    }
}
