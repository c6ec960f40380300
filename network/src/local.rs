//! In-process transport connecting many nodes within one runtime.
//!
//! Every message is pushed through the wire codec on its way, so what a
//! receiver sees is exactly what survives encoding. Messages to or from a
//! node whose interface is down are dropped silently, like datagrams.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use flood_messages::OverlayMessage;
use flood_types::{Contact, NodeId};
use tokio::sync::{mpsc, oneshot};

use crate::transport::{Delivery, Inbox, RequestId, Transport, TransportBinder};
use crate::NetworkError;

/// Timed-out requests remembered so a late reply still finds its requester.
const MAX_EXPIRED_REQUESTS: usize = 4096;

struct PendingReply {
    requester: NodeId,
    tx: oneshot::Sender<OverlayMessage>,
}

#[derive(Default)]
struct Inner {
    endpoints: HashMap<NodeId, mpsc::UnboundedSender<Delivery>>,
    pending: HashMap<RequestId, PendingReply>,
    expired: BTreeMap<RequestId, NodeId>,
    offline: HashSet<NodeId>,
}

impl Inner {
    fn expire(&mut self, id: RequestId) {
        if let Some(pending) = self.pending.remove(&id) {
            self.expired.insert(id, pending.requester);
            while self.expired.len() > MAX_EXPIRED_REQUESTS {
                self.expired.pop_first();
            }
        }
    }
}

/// Shared hub all [`LocalTransport`]s send through.
#[derive(Default)]
pub struct LocalNetwork {
    inner: Mutex<Inner>,
    next_request: AtomicU64,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a node's network interface up or down.
    pub fn set_online(&self, id: NodeId, online: bool) {
        let mut inner = self.lock();
        if online {
            inner.offline.remove(&id);
        } else {
            inner.offline.insert(id);
        }
    }

    pub fn is_online(&self, id: &NodeId) -> bool {
        !self.lock().offline.contains(id)
    }

    pub fn is_bound(&self, id: &NodeId) -> bool {
        self.lock().endpoints.contains_key(id)
    }

    fn transcode(message: &OverlayMessage) -> Result<OverlayMessage, NetworkError> {
        let bytes = flood_protocol::encode(message)?;
        Ok(flood_protocol::decode(&bytes)?)
    }

    fn deliver(
        &self,
        from: NodeId,
        to: NodeId,
        request_id: Option<RequestId>,
        message: &OverlayMessage,
    ) -> Result<(), NetworkError> {
        let message = Self::transcode(message)?;
        Self::push(&self.lock(), to, Delivery {
            from,
            request_id,
            late_reply_to: None,
            message,
        })
    }

    fn push(inner: &Inner, to: NodeId, delivery: Delivery) -> Result<(), NetworkError> {
        let tx = inner
            .endpoints
            .get(&to)
            .ok_or(NetworkError::Unreachable(to))?;
        if inner.offline.contains(&delivery.from) || inner.offline.contains(&to) {
            tracing::trace!(from = %delivery.from, %to, kind = %delivery.message.kind(), "dropped: interface down");
            return Ok(());
        }
        tx.send(delivery).map_err(|_| NetworkError::Closed(to))
    }

    async fn request(
        self: Arc<Self>,
        from: NodeId,
        to: NodeId,
        message: OverlayMessage,
        timeout: Duration,
    ) -> Result<OverlayMessage, NetworkError> {
        let id = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.lock()
            .pending
            .insert(id, PendingReply { requester: from, tx });

        if let Err(e) = self.deliver(from, to, Some(id), &message) {
            self.lock().pending.remove(&id);
            return Err(e);
        }

        let timed_out = NetworkError::Timeout {
            after_ms: timeout.as_millis() as u64,
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(timed_out),
            Err(_) => {
                self.lock().expire(id);
                Err(timed_out)
            }
        }
    }

    fn reply(&self, from: NodeId, message: &OverlayMessage, request_id: RequestId) -> Result<(), NetworkError> {
        let message = Self::transcode(message)?;
        let mut inner = self.lock();
        let Some(pending) = inner.pending.remove(&request_id) else {
            let Some(requester) = inner.expired.remove(&request_id) else {
                tracing::debug!(%from, %request_id, "reply to unknown request dropped");
                return Ok(());
            };
            tracing::debug!(%from, to = %requester, %request_id, "late reply handed to inbox");
            return Self::push(&inner, requester, Delivery {
                from,
                request_id: None,
                late_reply_to: Some(request_id),
                message,
            });
        };
        if inner.offline.contains(&from) || inner.offline.contains(&pending.requester) {
            tracing::trace!(%from, to = %pending.requester, "reply dropped: interface down");
            return Ok(());
        }
        let _ = pending.tx.send(message);
        Ok(())
    }
}

impl TransportBinder for Arc<LocalNetwork> {
    type Transport = LocalTransport;

    fn bind(&self, contact: &Contact) -> Result<(LocalTransport, Inbox), NetworkError> {
        let id = contact.node_id();
        let mut inner = self.lock();
        if inner.endpoints.contains_key(&id) {
            return Err(NetworkError::AlreadyBound(id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.endpoints.insert(id, tx);
        tracing::trace!(node = %id, "endpoint bound");
        Ok((
            LocalTransport {
                id,
                hub: Arc::clone(self),
            },
            rx,
        ))
    }
}

/// A node's handle onto a [`LocalNetwork`].
#[derive(Clone)]
pub struct LocalTransport {
    id: NodeId,
    hub: Arc<LocalNetwork>,
}

impl LocalTransport {
    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.hub
    }
}

impl Transport for LocalTransport {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn send(&self, message: OverlayMessage, destination: &Contact) -> Result<(), NetworkError> {
        self.hub.deliver(self.id, destination.node_id(), None, &message)
    }

    fn request(
        &self,
        message: OverlayMessage,
        destination: &Contact,
        timeout: Duration,
    ) -> impl Future<Output = Result<OverlayMessage, NetworkError>> + Send {
        Arc::clone(&self.hub).request(self.id, destination.node_id(), message, timeout)
    }

    fn send_reply(&self, message: OverlayMessage, request_id: RequestId) -> Result<(), NetworkError> {
        self.hub.reply(self.id, &message, request_id)
    }

    fn set_online(&self, online: bool) {
        self.hub.set_online(self.id, online);
    }
}
