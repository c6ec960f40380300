//! End-to-end tests of the actor runtime over the in-process network.
//!
//! Every message crosses the frame codec on its way through
//! [`flood_network::LocalNetwork`], so these tests also cover contacts
//! surviving a round trip through the wire format.

use std::sync::Arc;
use std::time::Duration;

use flood_node::{NodeError, NodeSnapshot, Overlay, Param, Settings, TimeSetting};
use flood_nullables::RecordingListener;
use flood_types::{NodeId, PeerStatus};

fn fast_settings(degree: u64) -> Settings {
    Settings::default()
        .with_param(Param::MaxNumConnections, degree)
        .with_time(TimeSetting::MsgTimeout, Duration::from_millis(200))
        .with_time(TimeSetting::MaintenanceInterval, Duration::from_millis(20))
        .with_time(TimeSetting::JoinRetryBackoff, Duration::from_millis(20))
}

/// Poll snapshots until `done` holds or `deadline` passes.
async fn wait_for<F>(overlay: &Overlay, deadline: Duration, done: F) -> Vec<NodeSnapshot>
where
    F: Fn(&[NodeSnapshot]) -> bool,
{
    let start = tokio::time::Instant::now();
    loop {
        let snapshots = overlay.snapshots().await.expect("peers running");
        if done(&snapshots) || start.elapsed() > deadline {
            return snapshots;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Add a peer, join it, and wait until its first maintenance cycle ran.
async fn join_one(overlay: &mut Overlay) -> NodeId {
    let peer = overlay.add_peer().unwrap();
    let id = peer.id();
    peer.join().unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = overlay.peer(id).unwrap().snapshot().await.unwrap();
        if snapshot.target_degree > 0 || tokio::time::Instant::now() > deadline {
            return id;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn peers_join_and_link_up() {
    let mut overlay = Overlay::new(fast_settings(4), 7);
    overlay.start_tracker().unwrap();
    for _ in 0..8 {
        join_one(&mut overlay).await;
    }

    let snapshots = wait_for(&overlay, Duration::from_secs(5), |s| {
        s.iter().all(|p| p.status == PeerStatus::Present && p.degree() > 0)
    })
    .await;

    for snapshot in &snapshots {
        assert_eq!(snapshot.status, PeerStatus::Present);
        assert!(snapshot.degree() > 0, "{} stayed isolated", snapshot.id);
        assert!(snapshot.degree() <= 4);
        assert!(!snapshot.connected.contains(&snapshot.id));
    }

    // links are only ever formed by mutual acceptance
    for snapshot in &snapshots {
        for neighbor in &snapshot.connected {
            let other = snapshots.iter().find(|s| s.id == *neighbor).unwrap();
            assert!(
                other.connected.contains(&snapshot.id),
                "{} -> {} is one-sided",
                snapshot.id,
                neighbor
            );
        }
    }

    overlay.shutdown().await.unwrap();
}

#[tokio::test]
async fn join_is_reported_to_listeners() {
    let mut overlay = Overlay::new(fast_settings(2), 1);
    overlay.start_tracker().unwrap();
    let listener = Arc::new(RecordingListener::new());
    let peer = overlay.add_peer_with_listener(listener.clone()).unwrap();
    peer.join().unwrap();
    // a second join while joining or present changes nothing
    peer.join().unwrap();

    wait_for(&overlay, Duration::from_secs(2), |s| s[0].status == PeerStatus::Present).await;
    assert_eq!(
        listener.entered(),
        vec![PeerStatus::ToJoin, PeerStatus::Present]
    );
    overlay.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_tracker_leaves_peer_absent() {
    let settings = fast_settings(2).with_param(Param::MaxJoinRetries, 1);
    let mut overlay = Overlay::new(settings, 1);
    let tracker = overlay.start_tracker().unwrap();
    overlay.network().set_online(tracker.node_id(), false);

    let listener = Arc::new(RecordingListener::new());
    overlay
        .add_peer_with_listener(listener.clone())
        .unwrap()
        .join()
        .unwrap();

    // one attempt plus one retry, each ending in a timeout
    wait_for(&overlay, Duration::from_secs(3), |_| listener.entered().len() >= 4).await;
    assert_eq!(
        listener.entered(),
        vec![
            PeerStatus::ToJoin,
            PeerStatus::Absent,
            PeerStatus::ToJoin,
            PeerStatus::Absent
        ]
    );
    let snapshot = overlay.peers()[0].snapshot().await.unwrap();
    assert_eq!(snapshot.status, PeerStatus::Absent);
    overlay.shutdown().await.unwrap();
}

#[tokio::test]
async fn tracker_comes_back_within_retries() {
    let mut overlay = Overlay::new(fast_settings(2), 3);
    let tracker = overlay.start_tracker().unwrap();
    overlay.network().set_online(tracker.node_id(), false);
    overlay.add_peer().unwrap().join().unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    overlay.network().set_online(tracker.node_id(), true);

    let snapshots =
        wait_for(&overlay, Duration::from_secs(3), |s| s[0].status == PeerStatus::Present).await;
    assert_eq!(snapshots[0].status, PeerStatus::Present);
    overlay.shutdown().await.unwrap();
}

#[tokio::test]
async fn neighbor_loss_frees_capacity() {
    let mut overlay = Overlay::new(fast_settings(2), 11);
    overlay.start_tracker().unwrap();
    for _ in 0..3 {
        join_one(&mut overlay).await;
    }
    let snapshots =
        wait_for(&overlay, Duration::from_secs(3), |s| s.iter().any(|p| p.degree() > 0)).await;
    let linked = snapshots
        .iter()
        .find(|p| p.degree() > 0)
        .expect("at least one link forms");
    let neighbor = linked.connected[0];

    let peer = overlay.peer(linked.id).unwrap();
    peer.interface_down().unwrap();
    peer.neighbor_lost(neighbor).unwrap();
    let after = peer.snapshot().await.unwrap();

    assert!(!after.connected.contains(&neighbor));
    assert!(!after.reachable);
    // every slot is free, in flight, or held by a link
    assert_eq!(
        after.inbound_available + after.outbound_available + after.in_flight + after.degree(),
        after.target_degree
    );
    overlay.shutdown().await.unwrap();
}

#[tokio::test]
async fn interface_down_takes_the_peer_off_the_network() {
    let mut overlay = Overlay::new(fast_settings(2), 5);
    overlay.start_tracker().unwrap();
    let id = join_one(&mut overlay).await;
    assert!(overlay.network().is_online(&id));

    let peer = overlay.peer(id).unwrap();
    peer.interface_down().unwrap();
    assert!(!peer.snapshot().await.unwrap().reachable);
    assert!(!overlay.network().is_online(&id));

    peer.interface_up().unwrap();
    assert!(peer.snapshot().await.unwrap().reachable);
    assert!(overlay.network().is_online(&id));
    overlay.shutdown().await.unwrap();
}

#[tokio::test]
async fn peer_without_tracker_cannot_start() {
    let mut overlay = Overlay::new(Settings::default(), 1);
    assert!(matches!(overlay.add_peer(), Err(NodeError::NoTracker)));
    overlay.start_tracker().unwrap();
    assert!(matches!(
        overlay.start_tracker(),
        Err(NodeError::DuplicateTracker(id)) if id == NodeId::new(0)
    ));
}

#[tokio::test]
async fn protocol_violation_stops_the_tracker() {
    use flood_messages::ConnectPeersReply;
    use flood_network::{Transport, TransportBinder};
    use flood_types::{Contact, ContactRole};

    let mut overlay = Overlay::new(fast_settings(2), 1);
    let tracker = overlay.start_tracker().unwrap();

    let rogue = Contact::new(NodeId::new(999), ContactRole::Peer);
    let (transport, _inbox) = overlay.network().bind(&rogue).unwrap();
    transport
        .send(
            ConnectPeersReply {
                sender: rogue.clone(),
                accepted: true,
            }
            .into(),
            &tracker,
        )
        .unwrap();

    let handle = overlay.tracker().unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !handle.is_finished() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(handle.is_finished());
    assert!(matches!(
        overlay.shutdown().await,
        Err(NodeError::ProtocolViolation(_))
    ));
}
