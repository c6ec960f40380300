//! Nullable transport: record messages without sending them.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use flood_messages::{MessageKind, OverlayMessage};
use flood_network::{NetworkError, RequestId, Transport};
use flood_types::{Contact, NodeId};

/// A message recorded by [`NullTransport`].
#[derive(Clone, Debug)]
pub struct SentMessage {
    pub destination: NodeId,
    pub message: OverlayMessage,
    /// `true` if it was sent through [`Transport::request`].
    pub awaited_reply: bool,
}

/// A test transport that records messages instead of sending them.
///
/// `request` answers with the next scripted reply, or times out when none
/// is queued.
pub struct NullTransport {
    local: NodeId,
    sent: Mutex<Vec<SentMessage>>,
    replies_sent: Mutex<Vec<(RequestId, OverlayMessage)>>,
    scripted_replies: Mutex<VecDeque<OverlayMessage>>,
    unreachable: Mutex<HashSet<NodeId>>,
    online: AtomicBool,
}

impl NullTransport {
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            sent: Mutex::new(Vec::new()),
            replies_sent: Mutex::new(Vec::new()),
            scripted_replies: Mutex::new(VecDeque::new()),
            unreachable: Mutex::new(HashSet::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Queue the reply the next `request` call will receive.
    pub fn enqueue_reply(&self, reply: OverlayMessage) {
        self.scripted_replies.lock().unwrap().push_back(reply);
    }

    /// Make sends to `id` fail with [`NetworkError::Unreachable`].
    pub fn mark_unreachable(&self, id: NodeId) {
        self.unreachable.lock().unwrap().insert(id);
    }

    /// Get all sent messages (for assertions).
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of sent messages of the given kind.
    pub fn sent_count(&self, kind: MessageKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.message.kind() == kind)
            .count()
    }

    /// Replies sent through `send_reply`.
    pub fn replies_sent(&self) -> Vec<(RequestId, OverlayMessage)> {
        self.replies_sent.lock().unwrap().clone()
    }

    /// Last state set through [`Transport::set_online`].
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn record(&self, message: OverlayMessage, destination: &Contact, awaited_reply: bool) -> Result<(), NetworkError> {
        let id = destination.node_id();
        if self.unreachable.lock().unwrap().contains(&id) {
            return Err(NetworkError::Unreachable(id));
        }
        self.sent.lock().unwrap().push(SentMessage {
            destination: id,
            message,
            awaited_reply,
        });
        Ok(())
    }
}

impl Transport for NullTransport {
    fn local_id(&self) -> NodeId {
        self.local
    }

    fn send(&self, message: OverlayMessage, destination: &Contact) -> Result<(), NetworkError> {
        self.record(message, destination, false)
    }

    fn request(
        &self,
        message: OverlayMessage,
        destination: &Contact,
        timeout: Duration,
    ) -> impl Future<Output = Result<OverlayMessage, NetworkError>> + Send {
        let result = self.record(message, destination, true).and_then(|()| {
            self.scripted_replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(NetworkError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                })
        });
        std::future::ready(result)
    }

    fn send_reply(&self, message: OverlayMessage, request_id: RequestId) -> Result<(), NetworkError> {
        self.replies_sent.lock().unwrap().push((request_id, message));
        Ok(())
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}
