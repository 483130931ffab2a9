use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use super::event_family;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEventData {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<DateTime<Utc>>,
}

/// Published by the auth collaborator on `email.auth.events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserEvent {
    UserRegistered(UserEventData),
    PasswordResetRequested(UserEventData),
}

event_family!(UserEvent {
    UserRegistered => "USER_REGISTERED",
    PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
});

impl UserEvent {
    pub fn data(&self) -> &UserEventData {
        match self {
            UserEvent::UserRegistered(d) | UserEvent::PasswordResetRequested(d) => d,
        }
    }
}
