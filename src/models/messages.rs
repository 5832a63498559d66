
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::FieldSchema;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinFormMessage {
    pub form_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LockFieldMessage {
    pub form_id: String,
    pub field: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnswerMessage {
    pub form_id: String,
    pub field: String,
    pub value: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFormMessage {
    pub form_id: String,
}

/// Messages a client may send over the `/formanswer` socket.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "join-form")]
    JoinForm(JoinFormMessage),
    #[serde(rename = "lock-field")]
    LockField(LockFieldMessage),
    #[serde(rename = "update-answer")]
    UpdateAnswer(UpdateAnswerMessage),
    #[serde(rename = "submit-form")]
    SubmitForm(SubmitFormMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormInitMessage {
    pub schema: Vec<FieldSchema>,
    pub answers: HashMap<String, Value>,
    pub user_id: String,
}

/// Sent to the whole room when a field lock is granted, so every peer
/// (the acquirer included) can render "locked by X" from one message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockNoticeMessage {
    pub field: String,
    pub user_id: String,
    pub name: String,
}

/// Sent to the requesting connection only, on lock denial or update
/// rejection. `by` may be absent when no live lease exists at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldLockedMessage {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoticeMessage {
    pub field: String,
    pub value: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSuccessMessage {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionNotificationMessage {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

/// Messages the server sends to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "form-init")]
    FormInit(FormInitMessage),
    #[serde(rename = "lock-field")]
    LockField(LockNoticeMessage),
    #[serde(rename = "field-locked")]
    FieldLocked(FieldLockedMessage),
    #[serde(rename = "update-answer")]
    UpdateAnswer(UpdateNoticeMessage),
    #[serde(rename = "submission-success")]
    SubmissionSuccess(SubmissionSuccessMessage),
    #[serde(rename = "submission-notification")]
    SubmissionNotification(SubmissionNotificationMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl SendMessage {
    pub fn error(message: impl Into<String>) -> Self {
        SendMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }
}
