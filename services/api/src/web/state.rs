//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-chat write locks.

use crate::config::Config;
use crate::web::auth::TokenKeys;
use dashmap::DashMap;
use mindspark_core::ports::{
    ClinicalAnalysisService, DatabaseService, InterviewService, ReportRenderer, ReportStore,
    SpeechToTextService,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub tokens: TokenKeys,
    pub sst_adapter: Arc<dyn SpeechToTextService>,
    pub interview_adapter: Arc<dyn InterviewService>,
    pub analysis_adapter: Arc<dyn ClinicalAnalysisService>,
    pub report_renderer: Arc<dyn ReportRenderer>,
    pub report_store: Arc<dyn ReportStore>,
    pub chat_locks: ChatLocks,
}

//=========================================================================================
// ChatLocks (Per-Chat Serialization)
//=========================================================================================

/// One async mutex per chat id. Holding it makes "append user message, produce
/// reply, append reply" a single step for that chat, so concurrent posts to
/// the same chat cannot interleave.
#[derive(Clone, Default)]
pub struct ChatLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, chat_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops the entry of a deleted chat unless someone is still waiting on it.
    pub fn forget(&self, chat_id: Uuid) {
        self.locks
            .remove_if(&chat_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
