use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::get_config;
use crate::models::{ReceivedMessage, SendMessage};
use crate::services::auth_service::{validate_jwt, AuthUser};
use crate::ws::session::SessionCtx;
use crate::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// WebSocket entry point for form collaboration. Browsers cannot set
/// headers on websocket requests, so the token usually arrives as a
/// query parameter; header and cookie auth still work for other
/// clients. Authentication is resolved before the upgrade but reported
/// over the socket, so clients get a readable error instead of a bare
/// handshake failure.
pub async fn formanswer_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New form collaboration connection attempt");
    let auth = authenticate(query.token, &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, auth, app_state))
}

fn authenticate(query_token: Option<String>, headers: &HeaderMap) -> Result<AuthUser, String> {
    let token = match query_token {
        Some(token) => token,
        None => crate::services::auth_service::get_auth_token(headers)?,
    };
    let secret = get_config()
        .jwt_secret
        .clone()
        .ok_or_else(|| "Authentication is not configured".to_string())?;
    match validate_jwt(&token, &secret) {
        Ok(data) => Ok(AuthUser::from(data.claims)),
        Err(e) => {
            warn!("Rejected websocket token: {}", e);
            Err("Invalid token".to_string())
        }
    }
}

async fn handle_socket(socket: WebSocket, auth: Result<AuthUser, String>, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // All outbound traffic funnels through one channel so room
    // broadcasts and direct replies cannot interleave mid-frame.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let user = match auth {
        Ok(user) => user,
        Err(reason) => {
            let payload = serde_json::to_string(&SendMessage::error(reason)).unwrap();
            let _ = tx.send(Message::Text(payload));
            let _ = tx.send(Message::Close(None));
            // Let the forwarder flush before tearing down.
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    let mut session = SessionCtx::new(user.user_id, user.name, tx.clone());
    info!(
        "WebSocket connection {} established for user {}",
        session.conn_id, session.user_id
    );

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let parsed: ReceivedMessage = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        error!(
                            "Failed to parse message on connection {}: {}",
                            session.conn_id, e
                        );
                        let payload =
                            serde_json::to_string(&SendMessage::error("Invalid message")).unwrap();
                        let _ = tx.send(Message::Text(payload));
                        continue;
                    }
                };
                let replies = app_state.collab.handle(&mut session, parsed).await;
                app_state.collab.dispatch(&session, replies);
            }
            Message::Close(_) => break,
            // Pings are answered by axum itself.
            _ => {}
        }
    }

    app_state.collab.disconnect(&session);
    send_task.abort();
}
