//! Bootstrap of a peer through the tracker.
//!
//! `ABSENT --join--> TO_JOIN --reply--> PRESENT`, or back to `ABSENT` when
//! the exchange fails. After a failure the join is retried up to
//! `MAX_JOIN_RETRIES` times, waiting `JOIN_RETRY_BACKOFF` before the first
//! retry and twice as long before each further one.

use std::time::Duration;

use flood_messages::{JoinRequest, OverlayMessage};
use flood_network::{NetworkError, Transport};
use flood_types::PeerStatus;

use crate::peer::{OutboundRequest, OverlayNode};
use crate::tracing_spans;
use crate::NodeError;

/// What the caller should do after a join exchange finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The node is present; `candidates` new potential neighbors were
    /// learned. The maintenance operation should start now.
    Joined { candidates: usize },
    /// The node is absent again and should retry after the given delay.
    RetryAfter(Duration),
    /// The node is absent and out of retries.
    GaveUp,
    /// The node was not waiting for a join reply.
    Ignored,
}

/// Delay before retry number `failures` (1-based), or `None` once more than
/// `max_retries` attempts have failed.
pub fn retry_delay(max_retries: u32, backoff: Duration, failures: u32) -> Option<Duration> {
    if failures == 0 || failures > max_retries {
        return None;
    }
    let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
    Some(backoff.saturating_mul(factor))
}

impl<T: Transport> OverlayNode<T> {
    /// Start joining the overlay. Returns the request to send to the tracker,
    /// or `None` if the node is not `ABSENT`.
    pub fn begin_join(&mut self) -> Option<OutboundRequest> {
        if self.status() != PeerStatus::Absent {
            return None;
        }
        let _span = tracing_spans::join_span(self.id()).entered();
        self.set_status(PeerStatus::ToJoin);
        tracing::debug!(tracker = %self.tracker.node_id(), "sending join request");
        Some(OutboundRequest {
            destination: self.tracker.clone(),
            message: JoinRequest {
                sender: self.contact.clone(),
            }
            .into(),
        })
    }

    /// Feed back the outcome of the join exchange.
    pub fn complete_join(
        &mut self,
        result: Result<OverlayMessage, NetworkError>,
    ) -> Result<JoinOutcome, NodeError> {
        if self.status() != PeerStatus::ToJoin {
            return Ok(JoinOutcome::Ignored);
        }
        let _span = tracing_spans::join_span(self.id()).entered();

        match result {
            Ok(OverlayMessage::JoinReply(reply)) => {
                let candidates = self.neighbors.extend_potential(reply.neighbors);
                self.join_failures = 0;
                self.set_status(PeerStatus::Present);
                tracing::info!(
                    peer = %self.id(),
                    tracker = %reply.sender.node_id(),
                    candidates,
                    "joined overlay"
                );
                Ok(JoinOutcome::Joined { candidates })
            }
            Ok(other) => {
                self.set_status(PeerStatus::Absent);
                Err(NodeError::ProtocolViolation(format!(
                    "tracker answered a join request with {}",
                    other.kind()
                )))
            }
            Err(e) => {
                self.set_status(PeerStatus::Absent);
                self.join_failures += 1;
                let delay = retry_delay(
                    self.settings.max_join_retries(),
                    self.settings.join_retry_backoff(),
                    self.join_failures,
                );
                match delay {
                    Some(delay) => {
                        tracing::warn!(
                            peer = %self.id(),
                            error = %e,
                            retry = self.join_failures,
                            delay_ms = delay.as_millis() as u64,
                            "bootstrap failed, retrying"
                        );
                        Ok(JoinOutcome::RetryAfter(delay))
                    }
                    None => {
                        tracing::warn!(peer = %self.id(), error = %e, "bootstrap failed, giving up");
                        // a later manual join starts with a fresh retry budget
                        self.join_failures = 0;
                        Ok(JoinOutcome::GaveUp)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Param, Settings, TimeSetting};
    use flood_messages::{JoinReply, MessageKind};
    use flood_nullables::{NullRandom, NullTransport, RecordingListener};
    use flood_types::{Contact, Endpoint, NodeId};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn contact(id: u64) -> Contact {
        Contact::peer(
            NodeId::new(id),
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, id as u8)), 6666),
        )
    }

    fn tracker_contact() -> Contact {
        Contact::tracker(
            NodeId::new(0),
            Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6666),
        )
    }

    fn node(settings: Settings) -> (OverlayNode<NullTransport>, Arc<RecordingListener>) {
        let listener = Arc::new(RecordingListener::new());
        let mut node = OverlayNode::new(
            contact(1),
            tracker_contact(),
            settings,
            Arc::new(NullTransport::new(NodeId::new(1))),
            Box::new(NullRandom::zeros()),
        );
        node.add_presence_listener(listener.clone());
        (node, listener)
    }

    fn join_reply(neighbors: Vec<Contact>) -> Result<OverlayMessage, NetworkError> {
        Ok(JoinReply {
            sender: tracker_contact(),
            neighbors,
        }
        .into())
    }

    fn timeout() -> Result<OverlayMessage, NetworkError> {
        Err(NetworkError::Timeout { after_ms: 1000 })
    }

    #[test]
    fn retry_delay_doubles_up_to_the_limit() {
        let backoff = Duration::from_secs(2);
        assert_eq!(retry_delay(3, backoff, 1), Some(Duration::from_secs(2)));
        assert_eq!(retry_delay(3, backoff, 2), Some(Duration::from_secs(4)));
        assert_eq!(retry_delay(3, backoff, 3), Some(Duration::from_secs(8)));
        assert_eq!(retry_delay(3, backoff, 4), None);
        assert_eq!(retry_delay(0, backoff, 1), None);
    }

    #[test]
    fn begin_join_targets_the_tracker() {
        let (mut node, listener) = node(Settings::default());
        let request = node.begin_join().expect("absent node starts joining");
        assert_eq!(request.destination.node_id(), NodeId::new(0));
        assert_eq!(request.message.kind(), MessageKind::JoinRequest);
        assert_eq!(request.message.sender().node_id(), NodeId::new(1));
        assert_eq!(node.status(), PeerStatus::ToJoin);
        assert_eq!(listener.entered(), vec![PeerStatus::ToJoin]);
    }

    #[test]
    fn join_is_idempotent_while_not_absent() {
        let (mut node, listener) = node(Settings::default());
        assert!(node.begin_join().is_some());
        let before = node.snapshot();

        assert!(node.begin_join().is_none());
        assert_eq!(node.snapshot(), before);
        assert_eq!(listener.transitions().len(), 1);

        node.complete_join(join_reply(vec![])).unwrap();
        assert!(node.begin_join().is_none());
        assert_eq!(node.status(), PeerStatus::Present);
    }

    #[test]
    fn reply_populates_potential_neighbors() {
        let (mut node, listener) = node(Settings::default());
        node.begin_join();
        let outcome = node
            .complete_join(join_reply(vec![contact(2), contact(3), contact(1)]))
            .unwrap();
        // the node's own contact is never a candidate
        assert_eq!(outcome, JoinOutcome::Joined { candidates: 2 });
        assert_eq!(node.snapshot().potential, vec![NodeId::new(2), NodeId::new(3)]);
        assert_eq!(listener.entered(), vec![PeerStatus::ToJoin, PeerStatus::Present]);
    }

    #[test]
    fn empty_reply_still_joins() {
        let (mut node, _) = node(Settings::default());
        node.begin_join();
        let outcome = node.complete_join(join_reply(vec![])).unwrap();
        assert_eq!(outcome, JoinOutcome::Joined { candidates: 0 });
        assert_eq!(node.status(), PeerStatus::Present);
        assert_eq!(node.neighbors().potential_len(), 0);
    }

    #[test]
    fn timeout_returns_to_absent_and_schedules_retry() {
        let (mut node, listener) = node(Settings::default());
        node.begin_join();
        let outcome = node.complete_join(timeout()).unwrap();
        assert_eq!(outcome, JoinOutcome::RetryAfter(Duration::from_secs(2)));
        assert_eq!(node.status(), PeerStatus::Absent);
        assert_eq!(listener.entered(), vec![PeerStatus::ToJoin, PeerStatus::Absent]);

        node.begin_join();
        let outcome = node.complete_join(timeout()).unwrap();
        assert_eq!(outcome, JoinOutcome::RetryAfter(Duration::from_secs(4)));
    }

    #[test]
    fn zero_retries_is_one_shot() {
        let settings = Settings::default().with_param(Param::MaxJoinRetries, 0);
        let (mut node, _) = node(settings);
        node.begin_join();
        assert_eq!(node.complete_join(timeout()).unwrap(), JoinOutcome::GaveUp);
        assert_eq!(node.status(), PeerStatus::Absent);
    }

    #[test]
    fn retries_run_out() {
        let settings = Settings::default()
            .with_param(Param::MaxJoinRetries, 1)
            .with_time(TimeSetting::JoinRetryBackoff, Duration::from_millis(100));
        let (mut node, _) = node(settings);
        node.begin_join();
        assert_eq!(
            node.complete_join(timeout()).unwrap(),
            JoinOutcome::RetryAfter(Duration::from_millis(100))
        );
        node.begin_join();
        assert_eq!(node.complete_join(timeout()).unwrap(), JoinOutcome::GaveUp);
    }

    #[test]
    fn late_reply_is_ignored() {
        let (mut node, _) = node(Settings::default());
        assert_eq!(
            node.complete_join(join_reply(vec![contact(2)])).unwrap(),
            JoinOutcome::Ignored
        );
        assert_eq!(node.status(), PeerStatus::Absent);
        assert_eq!(node.neighbors().potential_len(), 0);
    }

    #[test]
    fn wrong_reply_kind_is_a_protocol_violation() {
        let (mut node, _) = node(Settings::default());
        node.begin_join();
        let wrong = flood_messages::ConnectPeersReply {
            sender: tracker_contact(),
            accepted: true,
        };
        let err = node.complete_join(Ok(wrong.into())).unwrap_err();
        assert!(matches!(err, NodeError::ProtocolViolation(_)));
    }
}
