//! Transport Module Tests
//!
//! ## Test Scopes
//! - **Codec**: frame layout, undecodable tasks, corrupt frames and the frame limit.
//! - **Local Cluster**: routing, isolation and injected frames.
//! - **UDP**: loopback delivery between two bound transports.

#[cfg(test)]
mod tests {
    use crate::invocation::envelope::{
        Envelope, ExceptionKind, InvocationMessage, InvocationRequest, InvocationResponse, Outcome,
        RemoteException, TaskPayload,
    };
    use crate::invocation::task::Task;
    use crate::membership::service::MembershipService;
    use crate::membership::types::{Member, MemberId};
    use crate::transport::codec::{self, MAX_FRAME_LEN, WireFrame, WireOutcome};
    use crate::transport::local::LocalCluster;
    use crate::transport::udp::UdpTransport;
    use crate::transport::{Transport, TransportError};
    use std::time::Duration;

    fn request(task: Task) -> Envelope {
        Envelope::Request(InvocationRequest {
            poll_id: 7,
            respond_in_order: task.options.respond_in_order,
            task: TaskPayload::Decoded(task),
            is_query: true,
            has_observer: false,
        })
    }

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[test]
    fn test_request_keeps_header_and_task() {
        // ARRANGE
        let task = Task::new("echo", serde_json::json!({"n": 1})).in_order();

        // ACT
        let bytes = codec::encode(&request(task.clone())).unwrap();
        let decoded = codec::decode(&bytes).unwrap();

        // ASSERT
        let Envelope::Request(req) = decoded else {
            panic!("expected a request");
        };
        assert_eq!(req.poll_id, 7);
        assert!(req.is_query);
        assert!(req.respond_in_order);
        assert!(!req.has_observer);
        assert_eq!(req.task.task(), Some(&task));
    }

    #[test]
    fn test_response_exception_survives_the_wire() {
        let envelope = Envelope::Response(InvocationResponse {
            poll_id: 3,
            outcome: Outcome::Exception(RemoteException::new(ExceptionKind::TaskExecution, "boom")),
        });

        let decoded = codec::decode(&codec::encode(&envelope).unwrap()).unwrap();

        let Envelope::Response(resp) = decoded else {
            panic!("expected a response");
        };
        let exception = resp.outcome.exception().expect("exception outcome");
        assert_eq!(exception.kind, ExceptionKind::TaskExecution);
        assert_eq!(exception.message, "boom");
        assert!(resp.outcome.result().is_none());
    }

    #[test]
    fn test_unreadable_task_is_flagged_not_rejected() {
        // ARRANGE: Valid frame header around a task that is not JSON
        let frame = WireFrame::Request {
            poll_id: 11,
            is_query: true,
            respond_in_order: false,
            has_observer: false,
            task: b"{not json".to_vec(),
        };
        let bytes = codec::encode_frame(&frame).unwrap();

        // ACT
        let decoded = codec::decode(&bytes).unwrap();

        // ASSERT: The header is still readable so the sender can be answered
        let Envelope::Request(req) = decoded else {
            panic!("expected a request");
        };
        assert_eq!(req.poll_id, 11);
        assert!(matches!(req.task, TaskPayload::Undecodable(_)));
    }

    #[test]
    fn test_unreadable_result_becomes_deserialization_exception() {
        let frame = WireFrame::Response {
            poll_id: 5,
            outcome: WireOutcome::Result(vec![0xff, 0x00]),
        };
        let bytes = codec::encode_frame(&frame).unwrap();

        let Envelope::Response(resp) = codec::decode(&bytes).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(
            resp.outcome.exception().map(|e| e.kind),
            Some(ExceptionKind::Deserialization)
        );
    }

    #[test]
    fn test_garbage_frame_is_a_decode_error() {
        let result = codec::decode(&[0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(TransportError::Decode(_))));
    }

    #[test]
    fn test_oversized_frame_is_an_encode_error() {
        let big = "x".repeat(MAX_FRAME_LEN + 1);
        let envelope = Envelope::Response(InvocationResponse {
            poll_id: 1,
            outcome: Outcome::Result(serde_json::json!(big)),
        });

        assert!(matches!(codec::encode(&envelope), Err(TransportError::Encode(_))));
    }

    #[test]
    fn test_undecodable_task_cannot_be_forwarded() {
        let envelope = Envelope::Message(InvocationMessage {
            task: TaskPayload::Undecodable("bad".to_string()),
        });
        assert!(matches!(codec::encode(&envelope), Err(TransportError::Encode(_))));
    }

    // ============================================================
    // LOCAL CLUSTER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_local_cluster_routes_to_each_target() {
        // ARRANGE
        let cluster = LocalCluster::new();
        let (a, _inbox_a) = cluster.connect(MemberId::from("a"));
        let (_b, mut inbox_b) = cluster.connect(MemberId::from("b"));
        let (_c, mut inbox_c) = cluster.connect(MemberId::from("c"));
        let envelope = request(Task::new("echo", serde_json::Value::Null));

        // ACT
        a.send(&[MemberId::from("b"), MemberId::from("c")], &envelope).unwrap();

        // ASSERT
        let frame_b = inbox_b.recv().await.unwrap();
        let frame_c = inbox_c.recv().await.unwrap();
        assert_eq!(frame_b.from, MemberId::from("a"));
        assert_eq!(frame_c.from, MemberId::from("a"));
        assert!(matches!(codec::decode(&frame_b.bytes), Ok(Envelope::Request(_))));
        assert_eq!(cluster.delivered_count(), 2);
    }

    #[tokio::test]
    async fn test_isolated_member_receives_nothing() {
        // ARRANGE
        let cluster = LocalCluster::new();
        let (a, _inbox_a) = cluster.connect(MemberId::from("a"));
        let (_b, mut inbox_b) = cluster.connect(MemberId::from("b"));
        cluster.isolate(&MemberId::from("b"));

        // ACT
        a.send(&[MemberId::from("b")], &request(Task::new("echo", serde_json::Value::Null)))
            .unwrap();

        // ASSERT
        assert!(inbox_b.try_recv().is_err());
        assert_eq!(cluster.dropped_count(), 1);

        // ACT: Heal and resend
        cluster.heal(&MemberId::from("b"));
        a.send(&[MemberId::from("b")], &request(Task::new("echo", serde_json::Value::Null)))
            .unwrap();

        // ASSERT
        assert!(inbox_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_send_to_unknown_member_is_best_effort() {
        let cluster = LocalCluster::new();
        let (a, _inbox_a) = cluster.connect(MemberId::from("a"));

        let result = a.send(&[MemberId::from("ghost")], &request(Task::new("echo", serde_json::Value::Null)));

        assert!(result.is_ok());
        assert!(matches!(
            cluster.inject(&MemberId::from("a"), &MemberId::from("ghost"), vec![1]),
            Err(TransportError::UnknownMember(_))
        ));
    }

    // ============================================================
    // UDP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_udp_loopback_delivery() {
        // ARRANGE: Two members on ephemeral loopback ports
        let membership_a = MembershipService::new(Member::new(MemberId::from("a"), None));
        let membership_b = MembershipService::new(Member::new(MemberId::from("b"), None));
        let (a, _inbox_a) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), membership_a.clone())
            .await
            .unwrap();
        let (b, mut inbox_b) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), membership_b)
            .await
            .unwrap();
        membership_a.join(Member::new(MemberId::from("b"), Some(b.local_addr())));

        // ACT
        a.send(&[MemberId::from("b")], &request(Task::new("echo", serde_json::json!("hi"))))
            .unwrap();

        // ASSERT
        let frame = tokio::time::timeout(Duration::from_secs(2), inbox_b.recv())
            .await
            .expect("datagram should arrive")
            .unwrap();
        assert_eq!(frame.from, MemberId::from("a"));
        let Envelope::Request(req) = codec::decode(&frame.bytes).unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(req.task.task().map(|t| t.payload.clone()), Some(serde_json::json!("hi")));
    }

    #[tokio::test]
    async fn test_udp_member_without_address_is_skipped() {
        let membership = MembershipService::new(Member::new(MemberId::from("a"), None));
        membership.join(Member::new(MemberId::from("b"), None));
        let (a, _inbox) = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), membership)
            .await
            .unwrap();

        let result = a.send(&[MemberId::from("b")], &request(Task::new("echo", serde_json::Value::Null)));

        assert!(result.is_ok());
        assert_eq!(a.backlog(&MemberId::from("b")), 0);
    }
}
