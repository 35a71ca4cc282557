//! In-memory chat storage.

use serde::Serialize;
use serde_json::Value;
use shapeql_runtime::{Broadcaster, ResolverError};
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub text: String,
    pub user: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(i64),

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ResolverError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Encode(error) => Self::Internal(error.to_string()),
            other => Self::custom(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Users, messages, and the live message feed.
pub struct ChatStore {
    users: Vec<User>,
    messages: RwLock<Vec<Message>>,
    next_id: AtomicI64,
    events: Broadcaster<Value>,
}

impl ChatStore {
    pub fn with_seed_data() -> Self {
        let users = [
            (1, "ann", Some("Keeps the lights on")),
            (2, "bob", None),
            (3, "cy", Some("Writes the docs")),
        ]
        .into_iter()
        .map(|(id, name, bio)| User {
            id,
            name: name.to_string(),
            bio: bio.map(String::from),
        })
        .collect();

        Self {
            users,
            messages: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            events: Broadcaster::new(),
        }
    }

    /// Channel every posted message is published on.
    pub fn events(&self) -> &Broadcaster<Value> {
        &self.events
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|user| user.name == name)
    }

    pub async fn messages(&self, user: Option<&str>, limit: usize) -> Vec<Message> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|message| user.map_or(true, |name| message.user == name))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn post(&self, text: &str, user: &str) -> StoreResult<Message> {
        if text.trim().is_empty() {
            return Err(StoreError::validation("message", "must not be empty"));
        }
        if self.user(user).is_none() {
            return Err(StoreError::UserNotFound(user.to_string()));
        }

        let message = Message {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            text: text.to_string(),
            user: user.to_string(),
        };
        self.messages.write().await.push(message.clone());
        debug!(id = message.id, user, "message stored");

        match self.events.publish(serde_json::to_value(&message)?) {
            Ok(delivered) => debug!(id = message.id, delivered, "message published"),
            Err(error) => warn!(id = message.id, %error, "message not published"),
        }
        Ok(message)
    }

    pub async fn edit(&self, id: i64, text: &str) -> StoreResult<Message> {
        if text.trim().is_empty() {
            return Err(StoreError::validation("text", "must not be empty"));
        }
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|message| message.id == id)
            .ok_or(StoreError::MessageNotFound(id))?;
        message.text = text.to_string();
        Ok(message.clone())
    }

    /// Ends the live feed. Subscribers see completion.
    pub fn close(&self) {
        if let Err(error) = self.events.complete() {
            warn!(%error, "feed already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_assigns_ids_and_publishes() {
        let store = ChatStore::with_seed_data();
        let mut feed = store.events().stream().unwrap();

        let first = store.post("hi", "ann").await.unwrap();
        let second = store.post("hey", "bob").await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let event = feed.next().await.unwrap().unwrap();
        assert_eq!(event["text"], "hi");
        assert_eq!(store.messages(Some("bob"), 10).await, vec![second]);
    }

    #[tokio::test]
    async fn test_post_rejects_unknown_user_and_empty_text() {
        let store = ChatStore::with_seed_data();
        assert!(matches!(
            store.post("hi", "zed").await,
            Err(StoreError::UserNotFound(name)) if name == "zed"
        ));
        assert!(matches!(
            store.post("  ", "ann").await,
            Err(StoreError::Validation { field: "message", .. })
        ));
        assert!(store.messages(None, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_edit() {
        let store = ChatStore::with_seed_data();
        store.post("draft", "cy").await.unwrap();
        assert_eq!(store.edit(1, "final").await.unwrap().text, "final");
        assert!(matches!(
            store.edit(9, "x").await,
            Err(StoreError::MessageNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_close_completes_feed() {
        let store = ChatStore::with_seed_data();
        let mut feed = store.events().stream().unwrap();
        store.close();
        assert_eq!(feed.next().await, None);
        assert!(store.events().is_terminated());
    }
}
