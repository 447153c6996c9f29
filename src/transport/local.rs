//! In-process transport.
//!
//! A [`LocalCluster`] routes encoded frames between services living in the same
//! process through unbounded channels, one per member. Frames go through the
//! real codec, so decode failures and frame limits behave as on the network.
//! Members can be isolated to simulate a peer that never answers.

use super::{InboundFrame, Inbox, Transport, TransportError, codec};
use crate::invocation::envelope::Envelope;
use crate::membership::types::MemberId;

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct LocalCluster {
    nodes: DashMap<MemberId, mpsc::UnboundedSender<InboundFrame>>,
    isolated: DashSet<MemberId>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl LocalCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches a member and returns its transport and inbox.
    pub fn connect(self: &Arc<Self>, member: MemberId) -> (Arc<LocalTransport>, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.nodes.insert(member.clone(), tx);
        tracing::debug!("Member {} connected to local cluster", member);

        let transport = Arc::new(LocalTransport {
            local: member,
            cluster: self.clone(),
        });
        (transport, rx)
    }

    pub fn disconnect(&self, member: &MemberId) {
        self.nodes.remove(member);
    }

    /// Silently drops every frame to and from `member`.
    pub fn isolate(&self, member: &MemberId) {
        self.isolated.insert(member.clone());
    }

    pub fn heal(&self, member: &MemberId) {
        self.isolated.remove(member);
    }

    /// Injects raw bytes as if `from` had sent them to `to`.
    pub fn inject(&self, from: &MemberId, to: &MemberId, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.deliver(from, to, bytes)
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, from: &MemberId, to: &MemberId, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.isolated.contains(from) || self.isolated.contains(to) {
            tracing::trace!("Dropping frame {} -> {} (isolated)", from, to);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let Some(node) = self.nodes.get(to) else {
            return Err(TransportError::UnknownMember(to.clone()));
        };

        node.send(InboundFrame {
            from: from.clone(),
            bytes,
        })
        .map_err(|_| TransportError::Closed)?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub struct LocalTransport {
    local: MemberId,
    cluster: Arc<LocalCluster>,
}

impl LocalTransport {
    pub fn local_member(&self) -> &MemberId {
        &self.local
    }
}

impl Transport for LocalTransport {
    fn send(&self, to: &[MemberId], envelope: &Envelope) -> Result<(), TransportError> {
        let bytes = codec::encode(envelope)?;

        for member in to {
            // Best effort per member; departures are reported by membership.
            if let Err(e) = self.cluster.deliver(&self.local, member, bytes.clone()) {
                tracing::debug!("Failed to deliver {} to {}: {}", envelope.kind(), member, e);
            }
        }
        Ok(())
    }
}
