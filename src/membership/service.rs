use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::types::{Member, MemberEvent, MemberId};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Registry of the members running the service.
///
/// Failure detection is somebody else's job: whoever learns that a member
/// joined or died calls [`join`](Self::join) / [`leave`](Self::leave) and every
/// subscriber receives the corresponding [`MemberEvent`].
pub struct MembershipService {
    pub local_member: Member,
    members: DashMap<MemberId, Member>,
    events: broadcast::Sender<MemberEvent>,
}

impl MembershipService {
    pub fn new(local_member: Member) -> Arc<Self> {
        let members = DashMap::new();
        members.insert(local_member.id.clone(), local_member.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!("Membership started with local member {}", local_member.id);

        Arc::new(Self {
            local_member,
            members,
            events,
        })
    }

    /// Id of the member this process runs as.
    pub fn local_id(&self) -> &MemberId {
        &self.local_member.id
    }

    /// Adds a member. Re-joining an already known member only refreshes its
    /// address and does not publish a second event.
    pub fn join(&self, member: Member) {
        let previous = self.members.insert(member.id.clone(), member.clone());
        if previous.is_none() {
            info!("Member {} joined (cluster size now {})", member.id, self.members.len());
            let _ = self.events.send(MemberEvent::Joined(member));
        }
    }

    /// Removes a member and publishes [`MemberEvent::Left`]. Returns false if the
    /// member was not known.
    pub fn leave(&self, member_id: &MemberId) -> bool {
        if member_id == self.local_id() {
            tracing::warn!("Ignoring leave for the local member {}", member_id);
            return false;
        }

        match self.members.remove(member_id) {
            Some(_) => {
                info!("Member {} left (cluster size now {})", member_id, self.members.len());
                let _ = self.events.send(MemberEvent::Left(member_id.clone()));
                true
            }
            None => {
                tracing::debug!("Leave for unknown member {}", member_id);
                false
            }
        }
    }

    /// Receives every [`MemberEvent`] published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MemberEvent> {
        self.events.subscribe()
    }

    /// Looks up a member by id.
    ///
    /// # Returns
    /// * `Some(member)` with its current address, if it is part of the service.
    /// * `None` if it never joined or has left.
    pub fn get_member(&self, member_id: &MemberId) -> Option<Member> {
        self.members.get(member_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, member_id: &MemberId) -> bool {
        self.members.contains_key(member_id)
    }

    /// All service members including the local one, sorted by id.
    pub fn service_members(&self) -> Vec<MemberId> {
        let mut ids: Vec<MemberId> = self
            .members
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of members, the local one included.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
