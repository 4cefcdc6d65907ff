//! Room hub for live notification fan-out.
//!
//! The registry of rooms and their clients is owned by one [`HubLoop`].
//! [`Hub`] handles post register, unregister and broadcast commands to that
//! loop over an unbounded channel, so callers never wait on the loop and
//! every command takes effect in submission order. A broadcast therefore
//! sees exactly the registrations posted before it.
//!
//! Delivery into a client's buffer uses `try_send`. When the buffer is full
//! the notification is dropped for that client only; other clients and the
//! caller are unaffected. Live delivery is best effort, the store is the
//! durable record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::model::Notification;
use crate::observability::metrics::{record_active_subscribers, record_broadcast_dropped};

/// Delivery buffer size for each stream client.
pub const CLIENT_BUFFER: usize = 16;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stream subscriber's registration record.
///
/// The hub holds the sending half of the client's buffer; the stream that
/// created the client owns the receiving half.
#[derive(Debug, Clone)]
pub struct Client {
    id: ClientId,
    room: String,
    sender: mpsc::Sender<Notification>,
}

impl Client {
    /// Create a client for `room` with the default buffer size.
    pub fn new(room: impl Into<String>) -> (Self, mpsc::Receiver<Notification>) {
        Self::with_capacity(room, CLIENT_BUFFER)
    }

    pub fn with_capacity(
        room: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let client = Self {
            id: ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)),
            room: room.into(),
            sender,
        };
        (client, receiver)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn room(&self) -> &str {
        &self.room
    }
}

/// Snapshot of registry size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub rooms: usize,
    pub clients: usize,
}

enum Command {
    Register(Client),
    Unregister { room: String, id: ClientId },
    Broadcast(Notification),
    Stats(oneshot::Sender<HubStats>),
}

/// Cloneable handle for posting commands to the hub loop.
#[derive(Debug, Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(client) => f.debug_tuple("Register").field(&client.id).finish(),
            Self::Unregister { room, id } => f
                .debug_struct("Unregister")
                .field("room", room)
                .field("id", id)
                .finish(),
            Self::Broadcast(n) => f.debug_tuple("Broadcast").field(&n.id).finish(),
            Self::Stats(_) => f.write_str("Stats"),
        }
    }
}

impl Hub {
    /// Create a hub handle and the loop that must be driven with
    /// [`HubLoop::run`] on exactly one task.
    pub fn new() -> (Self, HubLoop) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let hub_loop = HubLoop {
            commands: receiver,
            rooms: HashMap::new(),
            clients: 0,
        };
        (Self { commands }, hub_loop)
    }

    /// Add a client to its room. Later broadcasts to the room reach it.
    pub fn register(&self, client: Client) {
        self.post(Command::Register(client));
    }

    /// Remove a client from its room. Unknown clients are ignored.
    pub fn unregister(&self, client: &Client) {
        self.post(Command::Unregister {
            room: client.room.clone(),
            id: client.id,
        });
    }

    /// Deliver a notification to every client registered in its room.
    pub fn broadcast(&self, notification: Notification) {
        self.post(Command::Broadcast(notification));
    }

    /// Registry size as seen by the loop after every earlier command.
    ///
    /// Returns `None` once the loop has stopped.
    pub async fn stats(&self) -> Option<HubStats> {
        let (tx, rx) = oneshot::channel();
        self.post(Command::Stats(tx));
        rx.await.ok()
    }

    fn post(&self, command: Command) {
        if let Err(rejected) = self.commands.send(command) {
            tracing::trace!(command = ?rejected.0, "Hub loop stopped, command discarded");
        }
    }
}

/// The hub's control loop and the registry it owns.
#[derive(Debug)]
pub struct HubLoop {
    commands: mpsc::UnboundedReceiver<Command>,
    rooms: HashMap<String, HashMap<ClientId, Client>>,
    clients: usize,
}

impl HubLoop {
    /// Process commands in order until `cancel` fires or every [`Hub`]
    /// handle is dropped. Commands still queued at that point are discarded.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!("Hub loop started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            }
        }
        tracing::debug!(
            rooms = self.rooms.len(),
            clients = self.clients,
            "Hub loop stopped"
        );
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register(client) => self.add_client(client),
            Command::Unregister { room, id } => self.remove_client(&room, id),
            Command::Broadcast(notification) => self.broadcast_to_room(&notification),
            Command::Stats(reply) => {
                let _ = reply.send(HubStats {
                    rooms: self.rooms.len(),
                    clients: self.clients,
                });
            }
        }
    }

    fn add_client(&mut self, client: Client) {
        let room = self.rooms.entry(client.room.clone()).or_default();
        tracing::debug!(room = %client.room, client = %client.id, "Client registered");
        if room.insert(client.id, client).is_none() {
            self.clients += 1;
            record_active_subscribers(self.clients);
        }
    }

    fn remove_client(&mut self, room_name: &str, id: ClientId) {
        let Some(room) = self.rooms.get_mut(room_name) else {
            return;
        };
        if room.remove(&id).is_some() {
            self.clients -= 1;
            record_active_subscribers(self.clients);
            tracing::debug!(room = room_name, client = %id, "Client unregistered");
        }
        if room.is_empty() {
            self.rooms.remove(room_name);
        }
    }

    fn broadcast_to_room(&mut self, notification: &Notification) {
        let Some(room) = self.rooms.get(&notification.room) else {
            tracing::trace!(room = %notification.room, id = notification.id, "No clients in room");
            return;
        };

        let mut closed = Vec::new();
        for (id, client) in room.iter() {
            match client.sender.try_send(notification.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        room = %notification.room,
                        client = %id,
                        id = notification.id,
                        "Client buffer full, dropping notification"
                    );
                    record_broadcast_dropped(&notification.room);
                }
                // Stream went away without unregistering yet.
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            self.remove_client(&notification.room, id);
        }
    }
}
