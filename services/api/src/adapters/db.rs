//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mindspark_core::domain::{Chat, Message, NewUser, Sender, User, UserCredentials};
use mindspark_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads the messages of `chats` in one query and attaches them in `seq` order.
    async fn attach_messages(&self, records: Vec<ChatRecord>) -> PortResult<Vec<Chat>> {
        let ids: Vec<Uuid> = records.iter().map(|c| c.id).collect();
        let messages = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, chat_id, sender, text, created_at FROM messages WHERE chat_id = ANY($1) ORDER BY seq ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut by_chat: HashMap<Uuid, Vec<Message>> = HashMap::new();
        for record in messages {
            let chat_id = record.chat_id;
            by_chat.entry(chat_id).or_default().push(record.to_domain()?);
        }

        Ok(records
            .into_iter()
            .map(|record| {
                let messages = by_chat.remove(&record.id).unwrap_or_default();
                record.to_domain(messages)
            })
            .collect())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    full_name: String,
    email: String,
    age: i32,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            full_name: self.full_name,
            email: self.email,
            age: self.age,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    full_name: String,
    email: String,
    password_hash: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            full_name: self.full_name,
            email: self.email,
            hashed_password: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    user_id: Uuid,
    patient_name: String,
    patient_age: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self, messages: Vec<Message>) -> Chat {
        Chat {
            id: self.id,
            user_id: self.user_id,
            patient_name: self.patient_name,
            patient_age: self.patient_age,
            messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_id: Uuid,
    sender: String,
    text: String,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        let sender = Sender::parse(&self.sender).ok_or_else(|| {
            PortError::Unexpected(format!("Message {} has unknown sender '{}'", self.id, self.sender))
        })?;
        Ok(Message {
            id: self.id,
            sender,
            text: self.text,
            timestamp: self.created_at,
        })
    }
}

const CHAT_COLUMNS: &str = "id, user_id, patient_name, patient_age, created_at, updated_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, full_name, email, password_hash, age) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, full_name, email, age, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.full_name)
        .bind(&new_user.email)
        .bind(&new_user.hashed_password)
        .bind(new_user.age)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                PortError::Conflict(format!("User {} already exists", new_user.email))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, full_name, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn list_chats_for_user(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let records = sqlx::query_as::<_, ChatRecord>(&format!(
            "SELECT {} FROM chats WHERE user_id = $1 ORDER BY updated_at DESC",
            CHAT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        self.attach_messages(records).await
    }

    async fn get_chat(&self, chat_id: Uuid) -> PortResult<Chat> {
        let record = sqlx::query_as::<_, ChatRecord>(&format!(
            "SELECT {} FROM chats WHERE id = $1",
            CHAT_COLUMNS
        ))
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Chat {} not found", chat_id)))?;

        let mut chats = self.attach_messages(vec![record]).await?;
        chats
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))
    }

    async fn create_chat(
        &self,
        user_id: Uuid,
        patient_name: &str,
        patient_age: &str,
    ) -> PortResult<Chat> {
        let record = sqlx::query_as::<_, ChatRecord>(&format!(
            "INSERT INTO chats (id, user_id, patient_name, patient_age) VALUES ($1, $2, $3, $4) RETURNING {}",
            CHAT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(patient_name)
        .bind(patient_age)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain(Vec::new()))
    }

    async fn append_exchange(
        &self,
        chat_id: Uuid,
        sender: Sender,
        text: &str,
        reply: &str,
    ) -> PortResult<Chat> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let touched = sqlx::query("UPDATE chats SET updated_at = NOW() WHERE id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if touched.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chat {} not found", chat_id)));
        }

        // `seq` keeps the reply after the message it answers.
        for (sender, text) in [(sender, text), (Sender::Ai, reply)] {
            sqlx::query("INSERT INTO messages (id, chat_id, sender, text) VALUES ($1, $2, $3, $4)")
                .bind(Uuid::new_v4())
                .bind(chat_id)
                .bind(sender.as_str())
                .bind(text)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        self.get_chat(chat_id).await
    }

    async fn rename_chat(&self, chat_id: Uuid, new_name: &str) -> PortResult<Chat> {
        let record = sqlx::query_as::<_, ChatRecord>(&format!(
            "UPDATE chats SET patient_name = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            CHAT_COLUMNS
        ))
        .bind(chat_id)
        .bind(new_name)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Chat {} not found", chat_id)))?;

        let mut chats = self.attach_messages(vec![record]).await?;
        chats
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Chat {} not found", chat_id)))
    }

    async fn delete_chat(&self, chat_id: Uuid) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if deleted.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chat {} not found", chat_id)));
        }
        Ok(())
    }
}
