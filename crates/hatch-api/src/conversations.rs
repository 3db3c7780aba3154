//! Server-held nurturing conversations, keyed by (user, idea).
//!
//! Each conversation sits behind its own async mutex which a running turn
//! holds from start to finish. The map lock is only taken for lookups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use hatch_nurture::ConversationState;

use crate::error::ApiError;

pub type SharedConversation = Arc<AsyncMutex<ConversationState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub user_id: Uuid,
    pub idea_id: Uuid,
}

impl ConversationKey {
    pub fn new(user_id: Uuid, idea_id: Uuid) -> Self {
        Self { user_id, idea_id }
    }
}

/// In-memory conversation map. Cloning shares the map.
#[derive(Clone, Default)]
pub struct ConversationStore {
    inner: Arc<Mutex<HashMap<ConversationKey, SharedConversation>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> Result<MutexGuard<'_, HashMap<ConversationKey, SharedConversation>>, ApiError> {
        self.inner
            .lock()
            .map_err(|e| ApiError::Internal(format!("conversation map poisoned: {}", e)))
    }

    pub fn get(&self, key: ConversationKey) -> Result<Option<SharedConversation>, ApiError> {
        Ok(self.map()?.get(&key).cloned())
    }

    pub fn get_or_create(&self, key: ConversationKey) -> Result<SharedConversation, ApiError> {
        let mut map = self.map()?;
        Ok(map.entry(key).or_default().clone())
    }

    /// Exclusive access for one turn. Fails fast if a turn is already running.
    pub fn begin_turn(&self, key: ConversationKey) -> Result<OwnedMutexGuard<ConversationState>, ApiError> {
        self.get_or_create(key)?
            .try_lock_owned()
            .map_err(|_| ApiError::Conflict("A message is already being processed for this idea".to_string()))
    }

    /// Discard a conversation. A turn still running on it finishes against
    /// the detached state.
    pub fn remove(&self, key: ConversationKey) -> Result<bool, ApiError> {
        Ok(self.map()?.remove(&key).is_some())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_shares_state() {
        let store = ConversationStore::new();
        let key = ConversationKey::new(Uuid::new_v4(), Uuid::new_v4());

        let a = store.get_or_create(key).unwrap();
        let b = store.get_or_create(key).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_begin_turn_conflicts_while_held() {
        let store = ConversationStore::new();
        let key = ConversationKey::new(Uuid::new_v4(), Uuid::new_v4());

        let guard = store.begin_turn(key).unwrap();
        assert!(matches!(store.begin_turn(key), Err(ApiError::Conflict(_))));
        drop(guard);
        assert!(store.begin_turn(key).is_ok());
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let store = ConversationStore::new();
        let user = Uuid::new_v4();
        let a = ConversationKey::new(user, Uuid::new_v4());
        let b = ConversationKey::new(user, Uuid::new_v4());

        let _held = store.begin_turn(a).unwrap();
        assert!(store.begin_turn(b).is_ok());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = ConversationStore::new();
        let key = ConversationKey::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(!store.remove(key).unwrap());
        store.get_or_create(key).unwrap();
        assert!(store.remove(key).unwrap());
        assert!(store.get(key).unwrap().is_none());
        assert!(store.is_empty());
    }
}
