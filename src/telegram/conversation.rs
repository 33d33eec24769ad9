//! Per-user conversation state
//!
//! Each user has at most one conversation at a time. The store keeps one
//! `Arc<Mutex<Conversation>>` per user so a user's turns are serialized
//! while different users proceed concurrently. A background sweeper resets
//! conversations that sit idle past the configured window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};

use crate::core::config;
use crate::telegram::transport::Messenger;

/// Notice sent when a conversation expires. Deliberately distinct from the
/// cancellation confirmation.
pub const TIMEOUT_NOTICE: &str = "⏰ Session timed out due to inactivity. Use /start to begin again.";

/// States of the per-user conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    MainMenu,
    AwaitingAgentName,
    AwaitingAgentId,
    AwaitingSupplierName,
    AwaitingSupplierCategory,
    AwaitingPersonName,
    AwaitingReceiptDecision,
}

/// One user's conversation: current state plus partially-collected fields.
#[derive(Debug)]
pub struct Conversation {
    pub state: ConversationState,
    pub scratch: HashMap<String, String>,
    pub chat_id: i64,
    last_activity: Instant,
}

impl Conversation {
    fn new(chat_id: i64) -> Self {
        Self {
            state: ConversationState::Idle,
            scratch: HashMap::new(),
            chat_id,
            last_activity: Instant::now(),
        }
    }

    /// Resets to Idle and clears all collected data.
    pub fn reset(&mut self) {
        self.state = ConversationState::Idle;
        self.scratch.clear();
    }

    /// Marks activity, pushing the idle timeout forward.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Keyed store of per-user conversations.
pub struct ConversationStore {
    entries: Mutex<HashMap<i64, Arc<Mutex<Conversation>>>>,
    timeout: Duration,
}

impl ConversationStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Returns the user's conversation entry, creating an Idle one on first
    /// interaction. The map lock is released before the caller locks the
    /// entry, so one user's long turn never blocks other users.
    pub async fn entry(&self, user_id: i64, chat_id: i64) -> Arc<Mutex<Conversation>> {
        let mut entries = self.entries.lock().await;
        Arc::clone(
            entries
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(chat_id)))),
        )
    }

    /// Number of conversations currently in a non-Idle state.
    pub async fn active_count(&self) -> usize {
        let entries = self.entries.lock().await;
        let mut count = 0;
        for conv in entries.values() {
            if let Ok(guard) = conv.try_lock() {
                if guard.state != ConversationState::Idle {
                    count += 1;
                }
            } else {
                // A locked entry is mid-turn, which only happens off Idle
                count += 1;
            }
        }
        count
    }

    /// Resets conversations idle past the timeout window and returns the
    /// (user, chat) pairs that were expired so the caller can notify them.
    ///
    /// Entries locked by an in-flight turn are skipped; the turn itself
    /// refreshes their activity timestamp.
    pub async fn expire_idle(&self) -> Vec<(i64, i64)> {
        let snapshot: Vec<(i64, Arc<Mutex<Conversation>>)> = {
            let entries = self.entries.lock().await;
            entries.iter().map(|(id, conv)| (*id, Arc::clone(conv))).collect()
        };

        let mut expired = Vec::new();
        for (user_id, conv) in snapshot {
            if let Ok(mut guard) = conv.try_lock() {
                if guard.state != ConversationState::Idle && guard.idle_for() >= self.timeout {
                    log::info!(
                        "Conversation for user {} timed out in state {:?}",
                        user_id,
                        guard.state
                    );
                    guard.reset();
                    expired.push((user_id, guard.chat_id));
                }
            }
        }
        expired
    }
}

/// Spawns the background timer that unilaterally expires idle conversations,
/// independent of update arrival.
pub fn spawn_timeout_sweeper(store: Arc<ConversationStore>, messenger: Arc<dyn Messenger>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(config::conversation::sweep_interval());
        loop {
            ticker.tick().await;
            for (user_id, chat_id) in store.expire_idle().await {
                if let Err(e) = messenger.send_text(chat_id, TIMEOUT_NOTICE).await {
                    log::error!("Failed to send timeout notice to user {}: {}", user_id, e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entry_is_unique_per_user() {
        let store = ConversationStore::new(Duration::from_secs(60));
        let first = store.entry(1, 10).await;
        let second = store.entry(1, 10).await;

        // Both handles refer to the same conversation: one state per user
        assert!(Arc::ptr_eq(&first, &second));

        let other = store.entry(2, 20).await;
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn idle_conversations_expire_without_input() {
        let store = ConversationStore::new(Duration::from_millis(10));
        {
            let conv = store.entry(1, 10).await;
            let mut guard = conv.lock().await;
            guard.state = ConversationState::AwaitingAgentName;
            guard.scratch.insert("agent_name".to_string(), "Acme".to_string());
            guard.touch();
        }

        tokio::time::sleep(Duration::from_millis(30)).await;
        let expired = store.expire_idle().await;
        assert_eq!(expired, vec![(1, 10)]);

        let conv = store.entry(1, 10).await;
        let guard = conv.lock().await;
        assert_eq!(guard.state, ConversationState::Idle);
        assert!(guard.scratch.is_empty());
    }

    #[tokio::test]
    async fn active_turns_are_not_expired() {
        let store = ConversationStore::new(Duration::from_millis(10));
        let conv = store.entry(1, 10).await;
        let mut guard = conv.lock().await;
        guard.state = ConversationState::AwaitingAgentName;

        tokio::time::sleep(Duration::from_millis(30)).await;
        // Entry is locked by this "turn": sweep must skip it
        let expired = store.expire_idle().await;
        assert!(expired.is_empty());
        assert_eq!(guard.state, ConversationState::AwaitingAgentName);
    }

    #[tokio::test]
    async fn idle_state_never_expires() {
        let store = ConversationStore::new(Duration::from_millis(10));
        store.entry(1, 10).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.expire_idle().await.is_empty());
    }

    #[tokio::test]
    async fn active_count_tracks_non_idle_states() {
        let store = ConversationStore::new(Duration::from_secs(60));
        store.entry(1, 10).await;
        assert_eq!(store.active_count().await, 0);

        {
            let conv = store.entry(2, 20).await;
            conv.lock().await.state = ConversationState::MainMenu;
        }
        assert_eq!(store.active_count().await, 1);
    }
}
