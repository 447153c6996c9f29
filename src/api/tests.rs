//! HTTP API Tests
//!
//! Handlers are called directly with their extractors against a two-member
//! in-process cluster.

#[cfg(test)]
mod tests {
    use crate::api::handlers::{handle_execute, handle_members, handle_query, handle_stats};
    use crate::api::protocol::InvokeRequest;
    use crate::config::ServiceConfig;
    use crate::executor::registry::TaskRegistry;
    use crate::invocation::service::InvocationService;
    use crate::invocation::task::Task;
    use crate::membership::service::MembershipService;
    use crate::membership::types::{Member, MemberId};
    use crate::transport::local::LocalCluster;
    use axum::{Extension, Json, http::StatusCode};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    fn two_members() -> (Arc<LocalCluster>, Arc<InvocationService>) {
        let network = LocalCluster::new();
        let ids = [MemberId::from("a"), MemberId::from("b")];
        let mut services = Vec::new();

        for member in &ids {
            let membership = MembershipService::new(Member::new(member.clone(), None));
            for other in ids.iter().filter(|other| *other != member) {
                membership.join(Member::new(other.clone(), None));
            }

            let registry = TaskRegistry::new();
            registry.register("echo", |payload| async move { Ok(payload) });

            let (transport, inbox) = network.connect(member.clone());
            let config = ServiceConfig {
                request_timeout_ms: 2_000,
                ..ServiceConfig::default()
            };
            let service = InvocationService::new(config, membership, transport, registry);
            service.start(inbox);
            services.push(service);
        }

        (network, services.remove(0))
    }

    // ============================================================
    // QUERY / EXECUTE
    // ============================================================

    #[tokio::test]
    async fn test_query_returns_results_keyed_by_member() {
        // ARRANGE
        let (_network, service) = two_members();
        let req = InvokeRequest {
            task: Task::new("echo", json!(7)),
            members: None,
        };

        // ACT
        let (status, Json(body)) = handle_query(Extension(service), Json(req)).await;

        // ASSERT
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.results.len(), 2);
        assert_eq!(body.results["a"].result(), Some(&json!(7)));
        assert_eq!(body.results["b"].result(), Some(&json!(7)));
        assert!(body.error.is_none());
    }

    #[tokio::test]
    async fn test_query_with_blank_task_is_bad_request() {
        let (_network, service) = two_members();
        let req = InvokeRequest {
            task: Task::new("", Value::Null),
            members: None,
        };

        let (status, Json(body)) = handle_query(Extension(service), Json(req)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.is_some());
    }

    #[tokio::test]
    async fn test_query_timeout_is_gateway_timeout_with_partial_results() {
        // ARRANGE: b never answers
        let (network, service) = two_members();
        network.isolate(&MemberId::from("b"));
        let req = InvokeRequest {
            task: Task::new("echo", json!("x")).with_request_timeout(Duration::from_millis(50)),
            members: None,
        };

        // ACT
        let (status, Json(body)) = handle_query(Extension(service), Json(req)).await;

        // ASSERT
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body.results.keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_execute_is_accepted() {
        let (_network, service) = two_members();
        let req = InvokeRequest {
            task: Task::new("echo", Value::Null),
            members: Some(vec![MemberId::from("b")]),
        };

        let (status, Json(body)) = handle_execute(Extension(service), Json(req)).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.accepted);
    }

    // ============================================================
    // MEMBERS / STATS
    // ============================================================

    #[tokio::test]
    async fn test_members_lists_local_and_peers() {
        let (_network, service) = two_members();

        let (status, Json(body)) = handle_members(Extension(service)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.local, MemberId::from("a"));
        assert_eq!(body.members, vec![MemberId::from("a"), MemberId::from("b")]);
    }

    #[tokio::test]
    async fn test_stats_reports_pool() {
        let (_network, service) = two_members();

        let (status, Json(stats)) = handle_stats(Extension(service)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats.service_name, "InvocationService");
        assert_eq!(stats.pool.map(|pool| pool.worker_count), Some(4));
    }

    #[test]
    fn test_invoke_request_members_default_to_all() {
        let req: InvokeRequest = serde_json::from_value(json!({"task": {"handler": "echo"}})).unwrap();

        assert!(req.members.is_none());
        assert_eq!(req.task.payload, Value::Null);
    }
}
