//! Datagram transport.
//!
//! Each frame travels as one UDP datagram wrapped in a [`Datagram`] that names
//! the sending member. `send` only encodes and queues; a background loop writes
//! the queue to the socket, and the queue depth per member is what
//! [`Transport::backlog`] reports.

use super::{InboundFrame, Inbox, Transport, TransportError, codec};
use crate::invocation::envelope::Envelope;
use crate::membership::service::MembershipService;
use crate::membership::types::MemberId;

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const RECEIVE_BUFFER_LEN: usize = 65536;

#[derive(Debug, Serialize, Deserialize)]
struct Datagram {
    from: MemberId,
    frame: Vec<u8>,
}

struct Outbound {
    to: MemberId,
    addr: SocketAddr,
    bytes: Vec<u8>,
}

pub struct UdpTransport {
    local: MemberId,
    membership: Arc<MembershipService>,
    outbound: mpsc::UnboundedSender<Outbound>,
    backlog: Arc<DashMap<MemberId, usize>>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds the socket and spawns the send and receive loops.
    pub async fn bind(
        bind_addr: SocketAddr,
        membership: Arc<MembershipService>,
    ) -> Result<(Arc<Self>, Inbox)> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, inbox) = mpsc::unbounded_channel();
        let backlog = Arc::new(DashMap::new());

        tracing::info!("UDP transport bound to {}", local_addr);

        tokio::spawn(send_loop(socket.clone(), outbound_rx, backlog.clone()));
        tokio::spawn(receive_loop(socket, inbound));

        let transport = Arc::new(Self {
            local: membership.local_id().clone(),
            membership,
            outbound,
            backlog,
            local_addr,
        });
        Ok((transport, inbox))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for UdpTransport {
    fn send(&self, to: &[MemberId], envelope: &Envelope) -> Result<(), TransportError> {
        let frame = codec::encode(envelope)?;
        let bytes = bincode::serialize(&Datagram {
            from: self.local.clone(),
            frame,
        })
        .map_err(|e| TransportError::Encode(e.to_string()))?;

        for member in to {
            let Some(addr) = self.membership.get_member(member).and_then(|m| m.addr) else {
                tracing::debug!("No address for member {}, dropping {}", member, envelope.kind());
                continue;
            };

            *self.backlog.entry(member.clone()).or_insert(0) += 1;
            self.outbound
                .send(Outbound {
                    to: member.clone(),
                    addr,
                    bytes: bytes.clone(),
                })
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    fn backlog(&self, member: &MemberId) -> usize {
        self.backlog.get(member).map(|depth| *depth).unwrap_or(0)
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    backlog: Arc<DashMap<MemberId, usize>>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = socket.send_to(&frame.bytes, frame.addr).await {
            tracing::warn!("Failed to send frame to {} at {}: {}", frame.to, frame.addr, e);
        }
        if let Some(mut depth) = backlog.get_mut(&frame.to) {
            *depth = depth.saturating_sub(1);
        }
    }
    tracing::debug!("UDP send loop stopped");
}

async fn receive_loop(socket: Arc<UdpSocket>, inbound: mpsc::UnboundedSender<InboundFrame>) {
    let mut buf = vec![0u8; RECEIVE_BUFFER_LEN];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => match bincode::deserialize::<Datagram>(&buf[..len]) {
                Ok(datagram) => {
                    let frame = InboundFrame {
                        from: datagram.from,
                        bytes: datagram.frame,
                    };
                    if inbound.send(frame).is_err() {
                        tracing::debug!("Inbox closed, stopping UDP receive loop");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to deserialize datagram from {}: {}", src, e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to receive UDP packet: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
