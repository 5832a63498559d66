//! Form collaboration engine.
//!
//! Pure message-in, messages-out core behind the `/formanswer` socket.
//! `handle` decides what happens; `dispatch` pushes the results onto
//! the room registry. Keeping the two apart lets the whole protocol be
//! exercised in tests without a network.

use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::ResponseStore;
use crate::models::{
    FieldLockedMessage, FormInitMessage, LockNoticeMessage, LogEntry, ReceivedMessage, SendMessage,
    Submission, SubmissionNotificationMessage, SubmissionSuccessMessage, UpdateAnswerMessage,
    UpdateNoticeMessage,
};
use crate::services::directory::Directory;
use crate::ws::lease::{LeaseStore, LockAttempt};
use crate::ws::room::RoomRegistry;
use crate::ws::session::SessionCtx;
use crate::ws::userctx;

const FALLBACK_NAME: &str = "Someone";

/// Where a reply goes. `ToRoom` includes the sender, `ToOthers` skips
/// it; the protocol needs both.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    ToSender(SendMessage),
    ToRoom { form_id: String, message: SendMessage },
    ToOthers { form_id: String, message: SendMessage },
}

pub struct Collab {
    leases: Arc<dyn LeaseStore>,
    store: Arc<dyn ResponseStore>,
    directory: Arc<dyn Directory>,
    pub rooms: Arc<RoomRegistry>,
    /// Latest answers per open form. Seeded from the store on first
    /// join, dropped when the room empties.
    working: Mutex<HashMap<String, HashMap<String, Value>>>,
    lease_ttl: Duration,
}

impl Collab {
    pub fn new(
        leases: Arc<dyn LeaseStore>,
        store: Arc<dyn ResponseStore>,
        directory: Arc<dyn Directory>,
        rooms: Arc<RoomRegistry>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            leases,
            store,
            directory,
            rooms,
            working: Mutex::new(HashMap::new()),
            lease_ttl,
        }
    }

    pub async fn handle(&self, session: &mut SessionCtx, msg: ReceivedMessage) -> Vec<Outbound> {
        match msg {
            ReceivedMessage::JoinForm(m) => self.join_form(session, &m.form_id).await,
            ReceivedMessage::LockField(m) => self.lock_field(session, &m.form_id, &m.field).await,
            ReceivedMessage::UpdateAnswer(m) => self.update_answer(session, m).await,
            ReceivedMessage::SubmitForm(m) => self.submit_form(session, &m.form_id).await,
        }
    }

    async fn join_form(&self, session: &mut SessionCtx, form_id: &str) -> Vec<Outbound> {
        match self.directory.has_access(form_id, &session.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("User {} denied access to form {}", session.user_id, form_id);
                return vec![Outbound::ToSender(SendMessage::error("Access denied"))];
            }
            Err(e) => {
                error!("Access check failed for form {}: {}", form_id, e);
                return vec![Outbound::ToSender(SendMessage::error("Access denied"))];
            }
        }

        let schema = match self.directory.form_schema(form_id).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                return vec![Outbound::ToSender(SendMessage::error("Form not found"))];
            }
            Err(e) => {
                error!("Schema lookup failed for form {}: {}", form_id, e);
                return vec![Outbound::ToSender(SendMessage::error("Form not found"))];
            }
        };

        // Create the response document on first join so later answer
        // writes always have a row to land on.
        let doc = match self.store.ensure_document(form_id, &session.user_id).await {
            Ok(doc) => doc,
            Err(e) => {
                error!("Failed to open document for form {}: {}", form_id, e);
                return vec![Outbound::ToSender(SendMessage::error("Form not found"))];
            }
        };

        let answers = {
            let mut working = self.working.lock().unwrap();
            working
                .entry(form_id.to_string())
                .or_insert_with(|| doc.answers.clone())
                .clone()
        };

        self.rooms
            .join(form_id, &session.conn_id, session.tx.clone());
        session.joined.insert(form_id.to_string());
        info!("User {} joined form {}", session.user_id, form_id);

        vec![Outbound::ToSender(SendMessage::FormInit(FormInitMessage {
            schema,
            answers,
            user_id: session.user_id.clone(),
        }))]
    }

    async fn lock_field(&self, session: &SessionCtx, form_id: &str, field: &str) -> Vec<Outbound> {
        match self
            .leases
            .try_acquire(form_id, field, &session.user_id, self.lease_ttl)
        {
            LockAttempt::Granted => {
                let name = match &session.name {
                    Some(name) => name.clone(),
                    None => userctx::display_name(self.directory.as_ref(), &session.user_id)
                        .await
                        .unwrap_or_else(|| FALLBACK_NAME.to_string()),
                };
                vec![Outbound::ToRoom {
                    form_id: form_id.to_string(),
                    message: SendMessage::LockField(LockNoticeMessage {
                        field: field.to_string(),
                        user_id: session.user_id.clone(),
                        name,
                    }),
                }]
            }
            LockAttempt::Denied { owner_id } => {
                let name = userctx::display_name(self.directory.as_ref(), &owner_id).await;
                vec![Outbound::ToSender(SendMessage::FieldLocked(
                    FieldLockedMessage {
                        field: field.to_string(),
                        by: Some(owner_id),
                        name,
                    },
                ))]
            }
        }
    }

    async fn update_answer(&self, session: &SessionCtx, msg: UpdateAnswerMessage) -> Vec<Outbound> {
        let holder = self.leases.holder(&msg.form_id, &msg.field);
        if holder.as_deref() != Some(session.user_id.as_str()) {
            return vec![Outbound::ToSender(SendMessage::FieldLocked(
                FieldLockedMessage {
                    field: msg.field.clone(),
                    by: holder,
                    name: None,
                },
            ))];
        }

        {
            let mut working = self.working.lock().unwrap();
            working
                .entry(msg.form_id.clone())
                .or_default()
                .insert(msg.field.clone(), msg.value.clone());
        }

        // Typing keeps the field held without fresh lock-field messages.
        self.leases
            .renew(&msg.form_id, &msg.field, &session.user_id, self.lease_ttl);

        // Persist off the hot path; peers see the update regardless of
        // how the write fares.
        let store = self.store.clone();
        let entry = LogEntry {
            field: msg.field.clone(),
            value: msg.value.clone(),
            user_id: session.user_id.clone(),
            updated_at: Utc::now(),
        };
        let form_id = msg.form_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.record_answer(&form_id, &entry).await {
                error!("Failed to persist answer for form {}: {}", form_id, e);
            }
        });

        vec![Outbound::ToOthers {
            form_id: msg.form_id,
            message: SendMessage::UpdateAnswer(UpdateNoticeMessage {
                field: msg.field,
                value: msg.value,
            }),
        }]
    }

    async fn submit_form(&self, session: &SessionCtx, form_id: &str) -> Vec<Outbound> {
        let doc = match self.store.get_document(form_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                return vec![Outbound::ToSender(SendMessage::error("Form not found"))];
            }
            Err(e) => {
                error!("Failed to load document for form {}: {}", form_id, e);
                return vec![Outbound::ToSender(SendMessage::error("Submission failed"))];
            }
        };

        // The working copy is the freshest view; answers persisted by
        // still-running writes may lag behind it.
        let answers = {
            let working = self.working.lock().unwrap();
            working
                .get(form_id)
                .cloned()
                .unwrap_or_else(|| doc.answers.clone())
        };
        let logs: Vec<LogEntry> = doc
            .logs
            .iter()
            .filter(|entry| entry.user_id == session.user_id)
            .cloned()
            .collect();

        let submission = Submission {
            submission_id: Uuid::new_v4().to_string(),
            submitted_by: session.user_id.clone(),
            submitted_at: Utc::now(),
            answers,
            logs,
        };

        if let Err(e) = self.store.record_submission(form_id, &submission).await {
            error!("Failed to record submission for form {}: {}", form_id, e);
            return vec![Outbound::ToSender(SendMessage::error("Submission failed"))];
        }
        info!(
            "User {} submitted form {} as {}",
            session.user_id, form_id, submission.submission_id
        );

        vec![
            Outbound::ToSender(SendMessage::SubmissionSuccess(SubmissionSuccessMessage {
                message: "Form submitted".to_string(),
            })),
            Outbound::ToOthers {
                form_id: form_id.to_string(),
                message: SendMessage::SubmissionNotification(SubmissionNotificationMessage {
                    user_id: session.user_id.clone(),
                }),
            },
        ]
    }

    /// Serialize and fan out a batch of replies.
    pub fn dispatch(&self, session: &SessionCtx, outbounds: Vec<Outbound>) {
        for outbound in outbounds {
            match outbound {
                Outbound::ToSender(message) => {
                    let payload = serde_json::to_string(&message).unwrap();
                    let _ = session
                        .tx
                        .send(axum::extract::ws::Message::Text(payload));
                }
                Outbound::ToRoom { form_id, message } => {
                    let payload = serde_json::to_string(&message).unwrap();
                    self.rooms.send_to_room(&form_id, &payload);
                }
                Outbound::ToOthers { form_id, message } => {
                    let payload = serde_json::to_string(&message).unwrap();
                    self.rooms
                        .send_to_others(&form_id, &session.conn_id, &payload);
                }
            }
        }
    }

    /// Tear down a closed connection. Leases are left to expire on
    /// their own.
    pub fn disconnect(&self, session: &SessionCtx) {
        for form_id in &session.joined {
            if self.rooms.leave(form_id, &session.conn_id) {
                let mut working = self.working.lock().unwrap();
                working.remove(form_id);
            }
        }
        info!("Connection {} closed", session.conn_id);
    }

    pub fn live_lease_count(&self) -> usize {
        self.leases.live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::FieldSchema;
    use crate::services::directory::FormCatalog;
    use crate::ws::lease::tests::ManualClock;
    use crate::ws::lease::InMemoryLeaseStore;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::task::yield_now;

    const TTL_SECS: i64 = 3;

    struct Fixture {
        collab: Collab,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> (Fixture, String) {
        crate::ws::userctx::init_user_name_cache();
        let store = Arc::new(MemoryStore::new());
        store.add_user("a", "ann@x.com", "Ann").await;
        store.add_user("b", "bob@x.com", "Bob").await;
        let form_id = store
            .create_form(
                "Survey",
                &[FieldSchema::text("name"), FieldSchema::text("age")],
                "a",
                &["bob@x.com".to_string()],
            )
            .await
            .unwrap();

        let clock = ManualClock::new();
        let leases = Arc::new(InMemoryLeaseStore::new(clock.clone()));
        let collab = Collab::new(
            leases,
            store.clone(),
            store.clone(),
            Arc::new(RoomRegistry::new()),
            Duration::seconds(TTL_SECS),
        );
        (
            Fixture {
                collab,
                store,
                clock,
            },
            form_id,
        )
    }

    fn session(user_id: &str, name: Option<&str>) -> SessionCtx {
        let (tx, _rx) = mpsc::unbounded_channel();
        SessionCtx::new(user_id.to_string(), name.map(|n| n.to_string()), tx)
    }

    async fn join(fx: &Fixture, session: &mut SessionCtx, form_id: &str) -> Vec<Outbound> {
        fx.collab
            .handle(
                session,
                ReceivedMessage::JoinForm(crate::models::JoinFormMessage {
                    form_id: form_id.to_string(),
                }),
            )
            .await
    }

    async fn lock(fx: &Fixture, session: &mut SessionCtx, form_id: &str, field: &str) -> Vec<Outbound> {
        fx.collab
            .handle(
                session,
                ReceivedMessage::LockField(crate::models::LockFieldMessage {
                    form_id: form_id.to_string(),
                    field: field.to_string(),
                }),
            )
            .await
    }

    async fn update(
        fx: &Fixture,
        session: &mut SessionCtx,
        form_id: &str,
        field: &str,
        value: Value,
    ) -> Vec<Outbound> {
        fx.collab
            .handle(
                session,
                ReceivedMessage::UpdateAnswer(UpdateAnswerMessage {
                    form_id: form_id.to_string(),
                    field: field.to_string(),
                    value,
                }),
            )
            .await
    }

    async fn submit(fx: &Fixture, session: &mut SessionCtx, form_id: &str) -> Vec<Outbound> {
        fx.collab
            .handle(
                session,
                ReceivedMessage::SubmitForm(crate::models::SubmitFormMessage {
                    form_id: form_id.to_string(),
                }),
            )
            .await
    }

    /// Give spawned persistence tasks a chance to run.
    async fn flush() {
        for _ in 0..8 {
            yield_now().await;
        }
    }

    fn sender_error(out: &[Outbound]) -> Option<&str> {
        match out.first() {
            Some(Outbound::ToSender(SendMessage::Error(e))) => Some(e.message.as_str()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn join_without_access_is_denied() {
        let (fx, form_id) = fixture().await;
        let mut stranger = session("z", None);
        let out = join(&fx, &mut stranger, &form_id).await;
        assert_eq!(sender_error(&out), Some("Access denied"));
        assert_eq!(fx.collab.rooms.member_count(&form_id), 0);
    }

    #[tokio::test]
    async fn join_unknown_form_reports_not_found() {
        let (fx, _) = fixture().await;
        fx.store.grant_access("ghost", "a").await;
        let mut ann = session("a", Some("Ann"));
        let out = join(&fx, &mut ann, "ghost").await;
        assert_eq!(sender_error(&out), Some("Form not found"));
    }

    #[tokio::test]
    async fn join_returns_schema_and_answers() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let out = join(&fx, &mut ann, &form_id).await;
        match &out[..] {
            [Outbound::ToSender(SendMessage::FormInit(init))] => {
                assert_eq!(init.schema.len(), 2);
                assert!(init.answers.is_empty());
                assert_eq!(init.user_id, "a");
            }
            other => panic!("unexpected replies: {other:?}"),
        }
        assert_eq!(fx.collab.rooms.member_count(&form_id), 1);
        assert!(ann.joined.contains(&form_id));
    }

    #[tokio::test]
    async fn lock_grant_is_announced_to_the_room() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        join(&fx, &mut ann, &form_id).await;

        let out = lock(&fx, &mut ann, &form_id, "name").await;
        match &out[..] {
            [Outbound::ToRoom { form_id: f, message: SendMessage::LockField(notice) }] => {
                assert_eq!(f, &form_id);
                assert_eq!(notice.field, "name");
                assert_eq!(notice.user_id, "a");
                assert_eq!(notice.name, "Ann");
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lock_denial_goes_to_requester_with_owner_name() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let mut bob = session("b", Some("Bob"));
        join(&fx, &mut ann, &form_id).await;
        join(&fx, &mut bob, &form_id).await;
        lock(&fx, &mut ann, &form_id, "name").await;

        let out = lock(&fx, &mut bob, &form_id, "name").await;
        match &out[..] {
            [Outbound::ToSender(SendMessage::FieldLocked(locked))] => {
                assert_eq!(locked.field, "name");
                assert_eq!(locked.by.as_deref(), Some("a"));
                assert_eq!(locked.name.as_deref(), Some("Ann"));
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_without_lease_is_rejected_and_changes_nothing() {
        let (fx, form_id) = fixture().await;
        let mut bob = session("b", Some("Bob"));
        join(&fx, &mut bob, &form_id).await;

        let out = update(&fx, &mut bob, &form_id, "name", json!("Bob")).await;
        match &out[..] {
            [Outbound::ToSender(SendMessage::FieldLocked(locked))] => {
                assert_eq!(locked.field, "name");
                assert_eq!(locked.by, None);
            }
            other => panic!("unexpected replies: {other:?}"),
        }
        flush().await;
        let doc = fx.store.get_document(&form_id).await.unwrap().unwrap();
        assert!(doc.answers.is_empty());
        assert!(doc.logs.is_empty());
    }

    #[tokio::test]
    async fn update_by_non_holder_is_rejected() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let mut bob = session("b", Some("Bob"));
        join(&fx, &mut ann, &form_id).await;
        join(&fx, &mut bob, &form_id).await;
        lock(&fx, &mut ann, &form_id, "name").await;

        let out = update(&fx, &mut bob, &form_id, "name", json!("Bob")).await;
        match &out[..] {
            [Outbound::ToSender(SendMessage::FieldLocked(locked))] => {
                assert_eq!(locked.by.as_deref(), Some("a"));
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepted_update_broadcasts_to_others_and_persists() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        join(&fx, &mut ann, &form_id).await;
        lock(&fx, &mut ann, &form_id, "name").await;

        let out = update(&fx, &mut ann, &form_id, "name", json!("Ann")).await;
        match &out[..] {
            [Outbound::ToOthers { form_id: f, message: SendMessage::UpdateAnswer(notice) }] => {
                assert_eq!(f, &form_id);
                assert_eq!(notice.field, "name");
                assert_eq!(notice.value, json!("Ann"));
            }
            other => panic!("unexpected replies: {other:?}"),
        }

        flush().await;
        let doc = fx.store.get_document(&form_id).await.unwrap().unwrap();
        assert_eq!(doc.answers["name"], json!("Ann"));
        assert_eq!(doc.logs.len(), 1);
        assert_eq!(doc.logs[0].user_id, "a");
    }

    #[tokio::test]
    async fn updates_keep_the_lease_alive_past_its_initial_ttl() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let mut bob = session("b", Some("Bob"));
        join(&fx, &mut ann, &form_id).await;
        join(&fx, &mut bob, &form_id).await;
        lock(&fx, &mut ann, &form_id, "name").await;

        // Keep typing just inside the timeout; total elapsed time goes
        // well past one TTL.
        for i in 0..3 {
            fx.clock.advance(Duration::seconds(2));
            let out = update(&fx, &mut ann, &form_id, "name", json!(format!("An{i}"))).await;
            assert!(matches!(out[0], Outbound::ToOthers { .. }));
        }

        let out = lock(&fx, &mut bob, &form_id, "name").await;
        assert!(matches!(
            out[0],
            Outbound::ToSender(SendMessage::FieldLocked(_))
        ));
    }

    #[tokio::test]
    async fn stale_lease_is_reacquirable_after_timeout() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let mut bob = session("b", Some("Bob"));
        join(&fx, &mut ann, &form_id).await;
        join(&fx, &mut bob, &form_id).await;
        lock(&fx, &mut ann, &form_id, "name").await;

        fx.clock.advance(Duration::seconds(TTL_SECS + 1));
        let out = lock(&fx, &mut bob, &form_id, "name").await;
        match &out[..] {
            [Outbound::ToRoom { message: SendMessage::LockField(notice), .. }] => {
                assert_eq!(notice.user_id, "b");
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn submission_snapshots_answers_and_scoped_log() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let mut bob = session("b", Some("Bob"));
        join(&fx, &mut ann, &form_id).await;
        join(&fx, &mut bob, &form_id).await;

        lock(&fx, &mut ann, &form_id, "name").await;
        update(&fx, &mut ann, &form_id, "name", json!("Ann")).await;
        lock(&fx, &mut ann, &form_id, "age").await;
        update(&fx, &mut ann, &form_id, "age", json!(30)).await;

        // Ann goes quiet; Bob takes over the age field and corrects it.
        fx.clock.advance(Duration::seconds(TTL_SECS + 1));
        lock(&fx, &mut bob, &form_id, "age").await;
        update(&fx, &mut bob, &form_id, "age", json!(31)).await;
        flush().await;

        let out = submit(&fx, &mut bob, &form_id).await;
        match &out[..] {
            [Outbound::ToSender(SendMessage::SubmissionSuccess(ok)), Outbound::ToOthers { message: SendMessage::SubmissionNotification(n), .. }] =>
            {
                assert_eq!(ok.message, "Form submitted");
                assert_eq!(n.user_id, "b");
            }
            other => panic!("unexpected replies: {other:?}"),
        }

        let doc = fx.store.get_document(&form_id).await.unwrap().unwrap();
        assert_eq!(doc.submissions.len(), 1);
        let submission = &doc.submissions[0];
        assert_eq!(submission.submitted_by, "b");
        // Snapshot carries the latest value for every answered field.
        assert_eq!(submission.answers["name"], json!("Ann"));
        assert_eq!(submission.answers["age"], json!(31));
        // The submission's log holds only the submitter's changes.
        assert!(submission.logs.iter().all(|e| e.user_id == "b"));
        assert_eq!(submission.logs.len(), 1);
        // Ann's pending entries survive the reset.
        assert_eq!(doc.logs.len(), 2);
        assert!(doc.logs.iter().all(|e| e.user_id == "a"));
    }

    #[tokio::test]
    async fn submit_unknown_form_reports_not_found() {
        let (fx, _) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let out = submit(&fx, &mut ann, "ghost").await;
        assert_eq!(sender_error(&out), Some("Form not found"));
    }

    #[tokio::test]
    async fn rejoin_after_everyone_left_shows_persisted_answers() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        join(&fx, &mut ann, &form_id).await;
        lock(&fx, &mut ann, &form_id, "name").await;
        update(&fx, &mut ann, &form_id, "name", json!("Ann")).await;
        flush().await;
        let out = submit(&fx, &mut ann, &form_id).await;
        assert!(matches!(
            out[0],
            Outbound::ToSender(SendMessage::SubmissionSuccess(_))
        ));

        fx.collab.disconnect(&ann);
        assert_eq!(fx.collab.rooms.room_count(), 0);

        let mut again = session("a", Some("Ann"));
        let out = join(&fx, &mut again, &form_id).await;
        match &out[..] {
            [Outbound::ToSender(SendMessage::FormInit(init))] => {
                assert_eq!(init.answers["name"], json!("Ann"));
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_leaves_leases_to_expire() {
        let (fx, form_id) = fixture().await;
        let mut ann = session("a", Some("Ann"));
        let mut bob = session("b", Some("Bob"));
        join(&fx, &mut ann, &form_id).await;
        join(&fx, &mut bob, &form_id).await;
        lock(&fx, &mut ann, &form_id, "name").await;

        fx.collab.disconnect(&ann);
        // Still held until the TTL runs out.
        let out = lock(&fx, &mut bob, &form_id, "name").await;
        assert!(matches!(
            out[0],
            Outbound::ToSender(SendMessage::FieldLocked(_))
        ));

        fx.clock.advance(Duration::seconds(TTL_SECS + 1));
        let out = lock(&fx, &mut bob, &form_id, "name").await;
        assert!(matches!(out[0], Outbound::ToRoom { .. }));
    }
}
