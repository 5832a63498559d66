use std::collections::HashSet;
use uuid::Uuid;

use crate::ws::room::WsSender;

/// State of one websocket connection. Owned by the socket task; the
/// engine only borrows it per message.
pub struct SessionCtx {
    /// Distinguishes connections from the same user in the same room.
    pub conn_id: String,
    pub user_id: String,
    /// Display name from the token, if the token carried one.
    pub name: Option<String>,
    /// Forms this connection has joined, for cleanup on disconnect.
    pub joined: HashSet<String>,
    pub tx: WsSender,
}

impl SessionCtx {
    pub fn new(user_id: String, name: Option<String>, tx: WsSender) -> Self {
        Self {
            conn_id: Uuid::new_v4().to_string(),
            user_id,
            name,
            joined: HashSet::new(),
            tx,
        }
    }
}
