//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. The server falls
//! back to it when no `DATABASE_URL` is configured; the HTTP tests use it too.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use mindspark_core::domain::{Chat, Message, NewUser, Sender, User, UserCredentials};
use mindspark_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

struct StoredUser {
    user: User,
    hashed_password: String,
}

#[derive(Default)]
pub struct InMemoryDb {
    users: DashMap<Uuid, StoredUser>,
    /// email -> user id; the entry API makes registration race-free.
    emails: DashMap<String, Uuid>,
    chats: DashMap<Uuid, Chat>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

fn chat_not_found(chat_id: Uuid) -> PortError {
    PortError::NotFound(format!("Chat {} not found", chat_id))
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let user = User {
            id: Uuid::new_v4(),
            full_name: new_user.full_name,
            email: new_user.email.clone(),
            age: new_user.age,
            created_at: Utc::now(),
        };
        match self.emails.entry(new_user.email) {
            Entry::Occupied(entry) => {
                return Err(PortError::Conflict(format!("User {} already exists", entry.key())))
            }
            Entry::Vacant(entry) => {
                entry.insert(user.id);
            }
        }
        self.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                hashed_password: new_user.hashed_password,
            },
        );
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let not_found = || PortError::NotFound(format!("User {} not found", email));
        let user_id = *self.emails.get(email).ok_or_else(not_found)?;
        let stored = self.users.get(&user_id).ok_or_else(not_found)?;
        Ok(UserCredentials {
            user_id,
            full_name: stored.user.full_name.clone(),
            email: stored.user.email.clone(),
            hashed_password: stored.hashed_password.clone(),
        })
    }

    async fn list_chats_for_user(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let mut chats: Vec<Chat> = self
            .chats
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat> {
        self.chats
            .get(&chat_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| chat_not_found(chat_id))
    }

    async fn create_chat(
        &self,
        user_id: Uuid,
        patient_name: &str,
        patient_age: &str,
    ) -> PortResult<Chat> {
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4(),
            user_id,
            patient_name: patient_name.to_string(),
            patient_age: patient_age.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn append_exchange(
        &self,
        chat_id: Uuid,
        sender: Sender,
        text: &str,
        reply: &str,
    ) -> PortResult<Chat> {
        let mut chat = self.chats.get_mut(&chat_id).ok_or_else(|| chat_not_found(chat_id))?;
        let now = Utc::now();
        for (sender, text) in [(sender, text), (Sender::Ai, reply)] {
            chat.messages.push(Message {
                id: Uuid::new_v4(),
                sender,
                text: text.to_string(),
                timestamp: now,
            });
        }
        chat.updated_at = now;
        Ok(chat.clone())
    }

    async fn rename_chat(&self, chat_id: Uuid, new_name: &str) -> PortResult<Chat> {
        let mut chat = self.chats.get_mut(&chat_id).ok_or_else(|| chat_not_found(chat_id))?;
        chat.patient_name = new_name.to_string();
        chat.updated_at = Utc::now();
        Ok(chat.clone())
    }

    async fn delete_chat(&self, chat_id: Uuid) -> PortResult<()> {
        self.chats
            .remove(&chat_id)
            .map(|_| ())
            .ok_or_else(|| chat_not_found(chat_id))
    }
}
