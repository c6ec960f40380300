//! Tokio runtime for overlay nodes.
//!
//! Every peer and the tracker run as one task each, so a node's budgets and
//! neighbor sets are only ever touched from that task. Requests that wait
//! for a reply run in short-lived helper tasks that post the outcome back to
//! the owning actor; a node therefore keeps serving inbound requests while
//! its own requests are in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use flood_messages::{MessageKind, OverlayMessage};
use flood_network::{
    Delivery, Inbox, LocalNetwork, NetworkError, PresenceListener, Transport, TransportBinder,
};
use flood_types::{Contact, NodeId};

use crate::context::NodeFactory;
use crate::join::JoinOutcome;
use crate::peer::{NodeSnapshot, OutboundRequest, OverlayNode};
use crate::settings::Settings;
use crate::shutdown::ShutdownController;
use crate::tracing_spans;
use crate::tracker::Tracker;
use crate::NodeError;

/// Commands accepted by a running peer.
#[derive(Debug)]
pub enum PeerCommand {
    Join,
    Snapshot(oneshot::Sender<NodeSnapshot>),
    NeighborLost(NodeId),
    InterfaceDown,
    InterfaceUp,
}

/// Outcomes posted back to a peer actor by its helper tasks.
enum PeerEvent {
    JoinResult(Result<OverlayMessage, NetworkError>),
    RetryJoin,
    ConnectResult {
        peer: NodeId,
        result: Result<OverlayMessage, NetworkError>,
    },
}

/// Handle onto a running peer.
pub struct PeerHandle {
    id: NodeId,
    commands: mpsc::UnboundedSender<PeerCommand>,
    task: JoinHandle<Result<(), NodeError>>,
}

impl PeerHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Ask the peer to join the overlay. A no-op unless it is absent.
    pub fn join(&self) -> Result<(), NodeError> {
        self.command(PeerCommand::Join)
    }

    pub async fn snapshot(&self) -> Result<NodeSnapshot, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.command(PeerCommand::Snapshot(tx))?;
        rx.await.map_err(|_| NodeError::Stopped(self.id))
    }

    /// Tell the peer a connected neighbor went away.
    pub fn neighbor_lost(&self, neighbor: NodeId) -> Result<(), NodeError> {
        self.command(PeerCommand::NeighborLost(neighbor))
    }

    pub fn interface_down(&self) -> Result<(), NodeError> {
        self.command(PeerCommand::InterfaceDown)
    }

    pub fn interface_up(&self) -> Result<(), NodeError> {
        self.command(PeerCommand::InterfaceUp)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the actor to stop and return how it ended.
    pub async fn stopped(self) -> Result<(), NodeError> {
        self.task.await.map_err(|_| NodeError::Stopped(self.id))?
    }

    fn command(&self, command: PeerCommand) -> Result<(), NodeError> {
        self.commands
            .send(command)
            .map_err(|_| NodeError::Stopped(self.id))
    }
}

/// Handle onto a running tracker.
pub struct TrackerHandle {
    contact: Contact,
    task: JoinHandle<Result<(), NodeError>>,
}

impl TrackerHandle {
    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn stopped(self) -> Result<(), NodeError> {
        let id = self.contact.node_id();
        self.task.await.map_err(|_| NodeError::Stopped(id))?
    }
}

// ── Peer actor ─────────────────────────────────────────────────────────

struct PeerActor<T> {
    node: OverlayNode<T>,
    commands: mpsc::UnboundedReceiver<PeerCommand>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events: mpsc::UnboundedReceiver<PeerEvent>,
    maintenance: Option<Interval>,
}

/// Run `node` as an actor until `shutdown` fires.
///
/// The actor stops with an error on a protocol violation.
pub fn spawn_peer<T: Transport + 'static>(
    node: OverlayNode<T>,
    inbox: Inbox,
    shutdown: &ShutdownController,
) -> PeerHandle {
    let id = node.id();
    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    let actor = PeerActor {
        node,
        commands,
        events_tx,
        events,
        maintenance: None,
    };
    let task = tokio::spawn(actor.run(inbox, shutdown.subscribe()));
    PeerHandle {
        id,
        commands: commands_tx,
        task,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl<T: Transport + 'static> PeerActor<T> {
    async fn run(
        mut self,
        mut inbox: Inbox,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), NodeError> {
        let id = self.node.id();
        tracing::debug!(peer = %id, "peer started");

        loop {
            let step = tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!(peer = %id, "peer shutting down");
                    return Ok(());
                }
                Some(command) = self.commands.recv() => self.on_command(command),
                Some(delivery) = inbox.recv() => self.on_delivery(delivery),
                Some(event) = self.events.recv() => self.on_event(event),
                _ = next_tick(&mut self.maintenance) => {
                    self.maintain();
                    Ok(())
                }
            };

            if let Err(e) = step {
                tracing::error!(peer = %id, error = %e, "peer stopped");
                return Err(e);
            }
        }
    }

    fn on_command(&mut self, command: PeerCommand) -> Result<(), NodeError> {
        match command {
            PeerCommand::Join => self.start_join(),
            PeerCommand::Snapshot(reply) => {
                let _ = reply.send(self.node.snapshot());
            }
            PeerCommand::NeighborLost(neighbor) => {
                self.node.on_neighbor_lost(neighbor);
            }
            PeerCommand::InterfaceDown => self.node.interface_down(),
            PeerCommand::InterfaceUp => self.node.interface_up(),
        }
        Ok(())
    }

    fn on_delivery(&mut self, delivery: Delivery) -> Result<(), NodeError> {
        if let Some(request) = self.node.handle_delivery(delivery)? {
            self.dispatch(request);
        }
        Ok(())
    }

    fn on_event(&mut self, event: PeerEvent) -> Result<(), NodeError> {
        match event {
            PeerEvent::JoinResult(result) => match self.node.complete_join(result)? {
                JoinOutcome::Joined { .. } => self.start_maintenance(),
                JoinOutcome::RetryAfter(delay) => self.schedule_join_retry(delay),
                JoinOutcome::GaveUp | JoinOutcome::Ignored => {}
            },
            PeerEvent::RetryJoin => self.start_join(),
            PeerEvent::ConnectResult { peer, result } => {
                if let Some(request) = self.node.on_connect_reply(peer, result)? {
                    self.dispatch(request);
                }
            }
        }
        Ok(())
    }

    fn start_join(&mut self) {
        if let Some(request) = self.node.begin_join() {
            self.dispatch(request);
        }
    }

    fn schedule_join_retry(&self, delay: Duration) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(PeerEvent::RetryJoin);
        });
    }

    fn start_maintenance(&mut self) {
        let period = self
            .node
            .settings()
            .maintenance_interval()
            .max(Duration::from_millis(1));
        // the first tick completes immediately
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.maintenance = Some(interval);
    }

    fn maintain(&mut self) {
        for request in self.node.run_maintenance() {
            self.dispatch(request);
        }
    }

    /// Send `request` from a helper task and post the outcome back.
    fn dispatch(&self, request: OutboundRequest) {
        let transport = Arc::clone(self.node.transport());
        let events = self.events_tx.clone();
        let timeout = self.node.settings().msg_timeout();
        tokio::spawn(async move {
            let OutboundRequest {
                destination,
                message,
            } = request;
            let kind = message.kind();
            let result = transport.request(message, &destination, timeout).await;
            let event = match kind {
                MessageKind::JoinRequest => PeerEvent::JoinResult(result),
                _ => PeerEvent::ConnectResult {
                    peer: destination.node_id(),
                    result,
                },
            };
            let _ = events.send(event);
        });
    }
}

// ── Tracker actor ──────────────────────────────────────────────────────

/// Bind `tracker` through `binder` and serve join requests until `shutdown`
/// fires.
pub fn spawn_tracker<B>(
    tracker: Tracker,
    binder: &B,
    shutdown: &ShutdownController,
) -> Result<TrackerHandle, NodeError>
where
    B: TransportBinder,
    B::Transport: 'static,
{
    let contact = tracker.contact().clone();
    let (transport, inbox) = binder.bind(&contact)?;
    let task = tokio::spawn(run_tracker(tracker, transport, inbox, shutdown.subscribe()));
    Ok(TrackerHandle { contact, task })
}

async fn run_tracker<T: Transport>(
    mut tracker: Tracker,
    transport: T,
    mut inbox: Inbox,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), NodeError> {
    let id = tracker.id();
    tracing::info!(tracker = %id, "tracker started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!(tracker = %id, "tracker shutting down");
                return Ok(());
            }
            Some(delivery) = inbox.recv() => {
                if let Err(e) = serve_join(&mut tracker, &transport, delivery) {
                    tracing::error!(tracker = %id, error = %e, "tracker stopped");
                    return Err(e);
                }
            }
        }
    }
}

fn serve_join<T: Transport>(
    tracker: &mut Tracker,
    transport: &T,
    delivery: Delivery,
) -> Result<(), NodeError> {
    let _span =
        tracing_spans::tracker_request_span(tracker.id(), delivery.from, delivery.message.kind())
            .entered();
    let requester = delivery.message.sender().clone();
    let reply: OverlayMessage = tracker.handle(delivery.message)?.into();
    let sent = match delivery.request_id {
        Some(request_id) => transport.send_reply(reply, request_id),
        None => transport.send(reply, &requester),
    };
    if let Err(e) = sent {
        tracing::warn!(to = %requester.node_id(), error = %e, "join reply not sent");
    }
    Ok(())
}

// ── In-process overlay ─────────────────────────────────────────────────

/// A tracker and any number of peers wired over one [`LocalNetwork`].
pub struct Overlay {
    network: Arc<LocalNetwork>,
    factory: NodeFactory,
    shutdown: ShutdownController,
    tracker: Option<TrackerHandle>,
    peers: Vec<PeerHandle>,
}

impl Overlay {
    pub fn new(settings: Settings, seed: u64) -> Self {
        Self {
            network: LocalNetwork::new(),
            factory: NodeFactory::new(settings, seed),
            shutdown: ShutdownController::new(),
            tracker: None,
            peers: Vec::new(),
        }
    }

    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }

    pub fn factory_mut(&mut self) -> &mut NodeFactory {
        &mut self.factory
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Create and start the tracker.
    pub fn start_tracker(&mut self) -> Result<Contact, NodeError> {
        let tracker = self.factory.create_tracker()?;
        let handle = spawn_tracker(tracker, &self.network, &self.shutdown)?;
        let contact = handle.contact().clone();
        self.tracker = Some(handle);
        Ok(contact)
    }

    /// Create and start a peer. It stays absent until told to join.
    pub fn add_peer(&mut self) -> Result<&PeerHandle, NodeError> {
        self.add_peer_with(None)
    }

    /// Like [`add_peer`](Overlay::add_peer), reporting presence changes to
    /// `listener`.
    pub fn add_peer_with_listener(
        &mut self,
        listener: Arc<dyn PresenceListener>,
    ) -> Result<&PeerHandle, NodeError> {
        self.add_peer_with(Some(listener))
    }

    fn add_peer_with(
        &mut self,
        listener: Option<Arc<dyn PresenceListener>>,
    ) -> Result<&PeerHandle, NodeError> {
        let (mut node, inbox) = self.factory.create_peer(&self.network)?;
        if let Some(listener) = listener {
            node.add_presence_listener(listener);
        }
        let index = self.peers.len();
        self.peers.push(spawn_peer(node, inbox, &self.shutdown));
        Ok(&self.peers[index])
    }

    pub fn peers(&self) -> &[PeerHandle] {
        &self.peers
    }

    pub fn peer(&self, id: NodeId) -> Option<&PeerHandle> {
        self.peers.iter().find(|p| p.id() == id)
    }

    pub fn tracker(&self) -> Option<&TrackerHandle> {
        self.tracker.as_ref()
    }

    /// Snapshots of every peer, in creation order.
    pub async fn snapshots(&self) -> Result<Vec<NodeSnapshot>, NodeError> {
        let mut snapshots = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            snapshots.push(peer.snapshot().await?);
        }
        Ok(snapshots)
    }

    /// Stop every actor and report the first failure, if any.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        self.shutdown.shutdown();
        let mut first_error = None;
        for peer in self.peers {
            if let Err(e) = peer.stopped().await {
                first_error.get_or_insert(e);
            }
        }
        if let Some(tracker) = self.tracker {
            if let Err(e) = tracker.stopped().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
