use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound half of a connection. Frames pushed here are drained by the
/// connection's forwarder task.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Connections grouped by the form they joined. One connection can sit
/// in several rooms at once.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, HashMap<String, WsSender>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, form_id: &str, conn_id: &str, tx: WsSender) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(form_id.to_string())
            .or_default()
            .insert(conn_id.to_string(), tx);
        debug!("Connection {} joined room {}", conn_id, form_id);
    }

    /// Remove a connection from a room. Returns true when the room is
    /// now empty and was dropped.
    pub fn leave(&self, form_id: &str, conn_id: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(members) = rooms.get_mut(form_id) {
            members.remove(conn_id);
            if members.is_empty() {
                rooms.remove(form_id);
                debug!("Room {} is empty, dropping it", form_id);
                return true;
            }
        }
        false
    }

    pub fn send_to_room(&self, form_id: &str, payload: &str) {
        let rooms = self.rooms.lock().unwrap();
        if let Some(members) = rooms.get(form_id) {
            for tx in members.values() {
                // A failed send means the receiver is gone; the socket
                // task cleans the entry up on disconnect.
                let _ = tx.send(Message::Text(payload.to_string()));
            }
        }
    }

    pub fn send_to_others(&self, form_id: &str, except_conn_id: &str, payload: &str) {
        let rooms = self.rooms.lock().unwrap();
        if let Some(members) = rooms.get(form_id) {
            for (conn_id, tx) in members {
                if conn_id != except_conn_id {
                    let _ = tx.send(Message::Text(payload.to_string()));
                }
            }
        }
    }

    pub fn member_count(&self, form_id: &str) -> usize {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(form_id).map(|m| m.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    pub fn connection_count(&self) -> usize {
        let rooms = self.rooms.lock().unwrap();
        rooms.values().map(|m| m.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> (WsSender, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            out.push(text.to_string());
        }
        out
    }

    #[test]
    fn send_to_room_reaches_every_member() {
        let rooms = RoomRegistry::new();
        let (tx_a, mut rx_a) = member();
        let (tx_b, mut rx_b) = member();
        rooms.join("f1", "c1", tx_a);
        rooms.join("f1", "c2", tx_b);

        rooms.send_to_room("f1", "hello");
        assert_eq!(drain(&mut rx_a), vec!["hello"]);
        assert_eq!(drain(&mut rx_b), vec!["hello"]);
    }

    #[test]
    fn send_to_others_skips_the_sender() {
        let rooms = RoomRegistry::new();
        let (tx_a, mut rx_a) = member();
        let (tx_b, mut rx_b) = member();
        rooms.join("f1", "c1", tx_a);
        rooms.join("f1", "c2", tx_b);

        rooms.send_to_others("f1", "c1", "update");
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["update"]);
    }

    #[test]
    fn rooms_are_isolated() {
        let rooms = RoomRegistry::new();
        let (tx_a, mut rx_a) = member();
        let (tx_b, mut rx_b) = member();
        rooms.join("f1", "c1", tx_a);
        rooms.join("f2", "c2", tx_b);

        rooms.send_to_room("f1", "only-f1");
        assert_eq!(drain(&mut rx_a), vec!["only-f1"]);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn leave_reports_when_a_room_empties() {
        let rooms = RoomRegistry::new();
        let (tx_a, _rx_a) = member();
        let (tx_b, _rx_b) = member();
        rooms.join("f1", "c1", tx_a);
        rooms.join("f1", "c2", tx_b);

        assert!(!rooms.leave("f1", "c1"));
        assert_eq!(rooms.member_count("f1"), 1);
        assert!(rooms.leave("f1", "c2"));
        assert_eq!(rooms.room_count(), 0);
    }
}
