//! Executor Module Tests
//!
//! ## Test Scopes
//! - **Registry**: handler registration, lookup, instantiation and init failures.
//! - **Worker Pool**: priority ordering, queue-time cancellation, run-time abandonment.

#[cfg(test)]
mod tests {
    use crate::executor::pool::{Job, JobFuture, WorkerPool};
    use crate::executor::registry::TaskRegistry;
    use crate::invocation::task::{Invocable, SchedulingPriority, ServiceContext, Task, TaskFuture};
    use crate::membership::service::MembershipService;
    use crate::membership::types::{Member, MemberId};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn context() -> ServiceContext {
        let membership = MembershipService::new(Member::new(MemberId::from("local"), None));
        ServiceContext {
            service_name: "TestService".to_string(),
            local_member: MemberId::from("local"),
            membership,
        }
    }

    // ============================================================
    // TEST 1: TaskRegistry - Registration and Execution
    // ============================================================

    #[tokio::test]
    async fn test_registry_register_and_run() {
        // ARRANGE: Create registry and call counter
        let registry = TaskRegistry::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        // ACT: Register handler
        registry.register("test_handler", move |payload| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(payload)
            }
        });

        // ASSERT: Handler is registered
        assert!(registry.has_handler("test_handler"));
        assert_eq!(registry.handler_count(), 1);

        // ACT: Instantiate and run
        let task = Task::new("test_handler", serde_json::json!({"test": "data"}));
        let mut invocable = registry.instantiate(&task, &context()).unwrap();
        let result = invocable.run().await;

        // ASSERT: Handler was called with the payload
        assert_eq!(result.unwrap(), serde_json::json!({"test": "data"}));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registry_unknown_handler_returns_error() {
        // ARRANGE
        let registry = TaskRegistry::new();
        let task = Task::new("non_existent_handler", serde_json::json!({}));

        // ACT
        let result = registry.instantiate(&task, &context());

        // ASSERT: Should return an error
        let err = result.err().expect("unknown handler must fail");
        assert!(err.to_string().contains("Unknown task handler"));
    }

    #[tokio::test]
    async fn test_registry_handler_can_fail() {
        // ARRANGE
        let registry = TaskRegistry::new();
        registry.register("failing_handler", |_payload| async {
            Err(anyhow::anyhow!("Intentional error"))
        });

        // ACT
        let task = Task::new("failing_handler", serde_json::Value::Null);
        let mut invocable = registry.instantiate(&task, &context()).unwrap();
        let result = invocable.run().await;

        // ASSERT
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Intentional error"));
    }

    struct NeedsName {
        name: Option<String>,
    }

    impl Invocable for NeedsName {
        fn init(&mut self, ctx: &ServiceContext) -> anyhow::Result<()> {
            if ctx.service_name.is_empty() {
                anyhow::bail!("service name missing");
            }
            self.name = Some(ctx.service_name.clone());
            Ok(())
        }

        fn run(&mut self) -> TaskFuture {
            let name = self.name.clone();
            Box::pin(async move { Ok(serde_json::json!(name)) })
        }
    }

    #[tokio::test]
    async fn test_registry_factory_init_sees_context() {
        // ARRANGE
        let registry = TaskRegistry::new();
        registry.register_factory("named", |_payload| Ok(Box::new(NeedsName { name: None }) as Box<dyn Invocable>));

        // ACT
        let task = Task::new("named", serde_json::Value::Null);
        let mut invocable = registry.instantiate(&task, &context()).unwrap();

        // ASSERT
        assert_eq!(invocable.run().await.unwrap(), serde_json::json!("TestService"));
    }

    #[tokio::test]
    async fn test_registry_init_failure_is_reported() {
        // ARRANGE
        let registry = TaskRegistry::new();
        registry.register_factory("named", |_payload| Ok(Box::new(NeedsName { name: None }) as Box<dyn Invocable>));
        let mut ctx = context();
        ctx.service_name = String::new();

        // ACT
        let result = registry.instantiate(&Task::new("named", serde_json::Value::Null), &ctx);

        // ASSERT
        let err = result.err().expect("init failure must surface");
        assert!(err.to_string().contains("service name missing"));
    }

    #[test]
    fn test_registry_lists_handlers_sorted() {
        let registry = TaskRegistry::new();
        registry.register("zeta", |p| async move { Ok(p) });
        registry.register("alpha", |p| async move { Ok(p) });

        assert_eq!(registry.list_handlers(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    // ============================================================
    // TEST 2: WorkerPool - Scheduling
    // ============================================================

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingJob {
        name: String,
        priority: SchedulingPriority,
        timeout: Option<Duration>,
        work: Duration,
        log: Log,
        canceled: Arc<Mutex<Option<bool>>>,
    }

    impl RecordingJob {
        fn new(name: &str, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                priority: SchedulingPriority::Standard,
                timeout: None,
                work: Duration::ZERO,
                log: log.clone(),
                canceled: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl Job for RecordingJob {
        fn priority(&self) -> SchedulingPriority {
            self.priority
        }

        fn execution_timeout(&self) -> Option<Duration> {
            self.timeout
        }

        fn description(&self) -> String {
            self.name.clone()
        }

        fn start(&mut self) -> JobFuture {
            let name = self.name.clone();
            let log = self.log.clone();
            let work = self.work;
            Box::pin(async move {
                tokio::time::sleep(work).await;
                log.lock().push(name);
            })
        }

        fn run_canceled(&mut self, abandoned: bool) {
            *self.canceled.lock() = Some(abandoned);
        }
    }

    async fn wait_for(log: &Log, count: usize) {
        for _ in 0..200 {
            if log.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_pool_first_priority_jumps_queue() {
        // ARRANGE: Queue jobs before any worker runs
        let pool = WorkerPool::new(1);
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        pool.submit(Box::new(RecordingJob::new("a", &log)));
        pool.submit(Box::new(RecordingJob::new("b", &log)));
        let mut urgent = RecordingJob::new("c", &log);
        urgent.priority = SchedulingPriority::First;
        pool.submit(Box::new(urgent));

        // ACT
        pool.start();
        wait_for(&log, 3).await;

        // ASSERT
        assert_eq!(*log.lock(), vec!["c", "a", "b"]);
        assert_eq!(pool.stats().completed, 3);
    }

    #[tokio::test]
    async fn test_pool_immediate_bypasses_busy_workers() {
        // ARRANGE: Single worker kept busy
        let pool = WorkerPool::new(1);
        pool.start();
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let mut slow = RecordingJob::new("slow", &log);
        slow.work = Duration::from_millis(300);
        pool.submit(Box::new(slow));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // ACT
        let mut now = RecordingJob::new("now", &log);
        now.priority = SchedulingPriority::Immediate;
        pool.submit(Box::new(now));
        wait_for(&log, 1).await;

        // ASSERT: Immediate job finished while the slow one still runs
        assert_eq!(*log.lock(), vec!["now"]);
    }

    #[tokio::test]
    async fn test_pool_cancels_job_queued_past_timeout() {
        // ARRANGE
        let pool = WorkerPool::new(1);
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut job = RecordingJob::new("late", &log);
        job.timeout = Some(Duration::from_millis(10));
        let canceled = job.canceled.clone();
        pool.submit(Box::new(job));

        // ACT: Start only after the deadline has passed
        tokio::time::sleep(Duration::from_millis(40)).await;
        pool.start();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // ASSERT: Never ran, canceled rather than abandoned
        assert!(log.lock().is_empty());
        assert_eq!(*canceled.lock(), Some(false));
        assert_eq!(pool.stats().canceled, 1);
    }

    #[tokio::test]
    async fn test_pool_abandons_job_running_past_timeout() {
        // ARRANGE
        let pool = WorkerPool::new(1);
        pool.start();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut job = RecordingJob::new("stuck", &log);
        job.work = Duration::from_secs(5);
        job.timeout = Some(Duration::from_millis(50));
        let canceled = job.canceled.clone();

        // ACT
        pool.submit(Box::new(job));
        tokio::time::sleep(Duration::from_millis(200)).await;

        // ASSERT
        assert!(log.lock().is_empty());
        assert_eq!(*canceled.lock(), Some(true));
        let stats = pool.stats();
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_pool_shutdown_cancels_queued_jobs() {
        // ARRANGE
        let pool = WorkerPool::new(2);
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let job = RecordingJob::new("queued", &log);
        let canceled = job.canceled.clone();
        pool.submit(Box::new(job));

        // ACT
        pool.shutdown();

        // ASSERT
        assert_eq!(*canceled.lock(), Some(false));
        assert_eq!(pool.stats().queued, 0);
        assert!(!pool.is_started());
    }

    #[test]
    fn test_pool_with_zero_workers_never_starts() {
        let pool = WorkerPool::new(0);
        pool.start();
        assert!(!pool.is_started());
    }
}
