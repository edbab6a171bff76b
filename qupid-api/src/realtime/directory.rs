use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::frames::ServerFrame;

pub type ConnectionId = Uuid;
pub type FrameSender = mpsc::UnboundedSender<ServerFrame>;

/// Maps users to their live socket connections.
pub trait ConnectionDirectory: Send + Sync {
    fn register(&self, user_id: Uuid, sender: FrameSender) -> ConnectionId;

    /// Returns how many connections the user still has.
    fn unregister(&self, user_id: Uuid, connection: ConnectionId) -> usize;

    /// Best-effort delivery to every connection of the user. Closed
    /// connections are pruned. Returns the number of deliveries.
    fn send_to_user(&self, user_id: Uuid, frame: &ServerFrame) -> usize;

    fn is_online(&self, user_id: Uuid) -> bool;

    fn connection_count(&self) -> usize;

    fn broadcast(&self, user_ids: &[Uuid], frame: &ServerFrame) -> usize {
        user_ids.iter().map(|id| self.send_to_user(*id, frame)).sum()
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    connections: DashMap<Uuid, Vec<(ConnectionId, FrameSender)>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionDirectory for InMemoryDirectory {
    fn register(&self, user_id: Uuid, sender: FrameSender) -> ConnectionId {
        let connection = Uuid::new_v4();
        self.connections.entry(user_id).or_default().push((connection, sender));
        metrics::gauge!("ws_connections_active").increment(1.0);
        connection
    }

    fn unregister(&self, user_id: Uuid, connection: ConnectionId) -> usize {
        let mut remaining = 0;
        let mut removed = false;
        if let Some(mut entry) = self.connections.get_mut(&user_id) {
            let before = entry.len();
            entry.retain(|(id, _)| *id != connection);
            removed = entry.len() < before;
            remaining = entry.len();
        }
        if removed {
            metrics::gauge!("ws_connections_active").decrement(1.0);
        }
        if remaining == 0 {
            self.connections.remove_if(&user_id, |_, conns| conns.is_empty());
        }
        remaining
    }

    fn send_to_user(&self, user_id: Uuid, frame: &ServerFrame) -> usize {
        let Some(mut entry) = self.connections.get_mut(&user_id) else {
            return 0;
        };
        let before = entry.len();
        entry.retain(|(_, sender)| sender.send(frame.clone()).is_ok());
        let delivered = entry.len();
        if delivered < before {
            tracing::debug!(user_id = %user_id, pruned = before - delivered, "pruned closed connections");
            metrics::gauge!("ws_connections_active").decrement((before - delivered) as f64);
        }
        delivered
    }

    fn is_online(&self, user_id: Uuid) -> bool {
        self.connections.get(&user_id).is_some_and(|c| !c.is_empty())
    }

    fn connection_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_devices_receive() {
        let dir = InMemoryDirectory::new();
        let user = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        dir.register(user, tx1);
        dir.register(user, tx2);

        assert_eq!(dir.send_to_user(user, &ServerFrame::Pong), 2);
        assert_eq!(rx1.try_recv().unwrap(), ServerFrame::Pong);
        assert_eq!(rx2.try_recv().unwrap(), ServerFrame::Pong);
    }

    #[test]
    fn unregister_tracks_remaining() {
        let dir = InMemoryDirectory::new();
        let user = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let c1 = dir.register(user, tx1);
        let c2 = dir.register(user, tx2);

        assert_eq!(dir.unregister(user, c1), 1);
        assert!(dir.is_online(user));
        assert_eq!(dir.unregister(user, c2), 0);
        assert!(!dir.is_online(user));
        assert_eq!(dir.connection_count(), 0);
    }

    #[test]
    fn dead_connections_pruned() {
        let dir = InMemoryDirectory::new();
        let user = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        dir.register(user, tx);
        drop(rx);

        assert_eq!(dir.send_to_user(user, &ServerFrame::Pong), 0);
        assert_eq!(dir.connection_count(), 0);
    }

    #[test]
    fn offline_user_is_noop() {
        let dir = InMemoryDirectory::new();
        assert_eq!(dir.send_to_user(Uuid::new_v4(), &ServerFrame::Pong), 0);
    }

    #[test]
    fn broadcast_counts_all() {
        let dir = InMemoryDirectory::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (ta, _ra) = mpsc::unbounded_channel();
        let (tb, _rb) = mpsc::unbounded_channel();
        dir.register(a, ta);
        dir.register(b, tb);
        assert_eq!(dir.broadcast(&[a, b, Uuid::new_v4()], &ServerFrame::Pong), 2);
    }
}
