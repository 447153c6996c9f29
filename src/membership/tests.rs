//! Membership Module Tests
//!
//! ## Test Scopes
//! - **Identity**: uniqueness, equality and ordering of member ids.
//! - **Registry**: join/leave bookkeeping and default member listing.
//! - **Events**: broadcast of `Joined` / `Left` notifications.

#[cfg(test)]
mod tests {
    use crate::membership::service::MembershipService;
    use crate::membership::types::{Member, MemberEvent, MemberId};
    use std::collections::HashSet;

    fn member(id: &str) -> Member {
        Member::new(MemberId::from(id), None)
    }

    // ============================================================
    // MEMBER ID TESTS
    // ============================================================

    #[test]
    fn test_member_id_is_unique() {
        let id1 = MemberId::new();
        let id2 = MemberId::new();

        assert_ne!(id1, id2, "Each MemberId should be unique");
    }

    #[test]
    fn test_member_id_hash_and_order() {
        let mut set = HashSet::new();
        set.insert(MemberId::from("node-1"));
        set.insert(MemberId::from("node-1"));
        set.insert(MemberId::from("node-2"));

        assert_eq!(set.len(), 2);
        assert!(MemberId::from("a") < MemberId::from("b"));
    }

    #[test]
    fn test_member_serialization_skips_join_time() {
        let original = Member::new(MemberId::from("node-1"), Some("127.0.0.1:7000".parse().unwrap()));

        let json = serde_json::to_string(&original).unwrap();
        let decoded: Member = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.addr, original.addr);
        assert!(decoded.joined_at.is_none());
    }

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[test]
    fn test_service_starts_with_local_member() {
        let service = MembershipService::new(member("local"));

        assert_eq!(service.len(), 1);
        assert_eq!(service.service_members(), vec![MemberId::from("local")]);
        assert!(service.contains(&MemberId::from("local")));
    }

    #[test]
    fn test_join_and_leave() {
        let service = MembershipService::new(member("local"));

        service.join(member("b"));
        service.join(member("a"));

        assert_eq!(
            service.service_members(),
            vec![MemberId::from("a"), MemberId::from("b"), MemberId::from("local")]
        );

        assert!(service.leave(&MemberId::from("a")));
        assert!(!service.leave(&MemberId::from("a")), "second leave is a no-op");
        assert_eq!(service.len(), 2);
    }

    #[test]
    fn test_local_member_cannot_leave() {
        let service = MembershipService::new(member("local"));

        assert!(!service.leave(&MemberId::from("local")));
        assert_eq!(service.len(), 1);
    }

    // ============================================================
    // EVENT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_events_are_broadcast_once() {
        let service = MembershipService::new(member("local"));
        let mut events = service.subscribe();

        service.join(member("b"));
        service.join(member("b"));
        service.leave(&MemberId::from("b"));

        match events.recv().await.unwrap() {
            MemberEvent::Joined(m) => assert_eq!(m.id, MemberId::from("b")),
            other => panic!("unexpected event {:?}", other),
        }
        match events.recv().await.unwrap() {
            MemberEvent::Left(id) => assert_eq!(id, MemberId::from("b")),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events.try_recv().is_err(), "duplicate join must not publish");
    }
}
