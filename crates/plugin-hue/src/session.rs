use core::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Step of the selection dialogue a user is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowState {
    Resource,
    Light,
    Group,
    Scene,
    Command,
    Value,
}

/// Resource type a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Light,
    Group,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Group => "group",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub state: FlowState,
    pub resource: Option<ResourceKind>,
    pub resource_id: Option<String>,
    pub command: Option<String>,
    /// Instance ids listed on the last keyboard; only these are selectable.
    pub offered: Vec<String>,
}

impl Session {
    #[must_use]
    pub const fn new(state: FlowState) -> Self {
        Self {
            state,
            resource: None,
            resource_id: None,
            command: None,
            offered: Vec::new(),
        }
    }

    #[must_use]
    pub fn offers(&self, id: &str) -> bool {
        self.offered.iter().any(|o| o == id)
    }
}

/// Ephemeral per-user sessions.
///
/// Map access never spans an await point; callers that need a whole
/// interaction to be atomic hold the user's [`SessionStore::lock`] guard.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, user: &str) -> Option<Session> {
        self.sessions.get(user).map(|s| s.value().clone())
    }

    #[must_use]
    pub fn contains(&self, user: &str) -> bool {
        self.sessions.contains_key(user)
    }

    /// Applies `f` to the user's session, creating it in `state` first if
    /// the user has none.
    pub fn update(&self, user: &str, state: FlowState, f: impl FnOnce(&mut Session)) {
        let mut entry = self
            .sessions
            .entry(user.to_owned())
            .or_insert_with(|| Session::new(state));
        entry.state = state;
        f(&mut entry);
    }

    pub fn set_state(&self, user: &str, state: FlowState) {
        self.update(user, state, |_| {});
    }

    pub fn clear(&self, user: &str) {
        self.sessions.remove(user);
    }

    /// Serializes interactions of one user. The lock entry is dropped again
    /// once the last holder or waiter releases it.
    pub async fn lock(&self, user: &str) -> UserGuard<'_> {
        let lock = Arc::clone(
            self.locks
                .entry(user.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        UserGuard {
            store: self,
            user: user.to_owned(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Held for the length of one user's interaction.
#[derive(Debug)]
pub struct UserGuard<'a> {
    store: &'a SessionStore,
    user: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Cloning in `lock` happens under the same shard lock, so a count of
        // one means nobody else holds or awaits this mutex.
        self.store
            .locks
            .remove_if(&self.user, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_creates_then_overwrites() {
        let store = SessionStore::new();
        store.update("@a:x", FlowState::Light, |s| {
            s.resource = Some(ResourceKind::Light);
        });
        store.update("@a:x", FlowState::Command, |s| {
            s.resource_id = Some("1".to_owned());
        });

        let session = store.get("@a:x").unwrap();
        assert_eq!(session.state, FlowState::Command);
        assert_eq!(session.resource, Some(ResourceKind::Light));
        assert_eq!(session.resource_id.as_deref(), Some("1"));
        assert!(store.get("@b:x").is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = SessionStore::new();
        store.set_state("@a:x", FlowState::Resource);
        store.clear("@a:x");
        store.clear("@a:x");
        assert!(!store.contains("@a:x"));
    }

    #[tokio::test]
    async fn lock_is_per_user() {
        let store = Arc::new(SessionStore::new());
        let guard_a = store.lock("@a:x").await;
        // Another user is not blocked by @a's guard.
        let _guard_b = store.lock("@b:x").await;

        let contended = Arc::clone(&store);
        let waiter = tokio::spawn(async move {
            let _guard = contended.lock("@a:x").await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard_a);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn released_locks_are_forgotten() {
        let store = SessionStore::new();
        let first = store.lock("@a:x").await;
        assert_eq!(store.locks.len(), 1);
        drop(first);
        assert!(store.locks.is_empty());

        let store = Arc::new(store);
        let held = store.lock("@a:x").await;
        let contended = Arc::clone(&store);
        let waiter = tokio::spawn(async move {
            let _guard = contended.lock("@a:x").await;
        });
        tokio::task::yield_now().await;
        drop(held);
        // The waiter still holds a handle, so the entry survives the release.
        assert_eq!(store.locks.len(), 1);
        waiter.await.unwrap();
        assert!(store.locks.is_empty());
    }

    #[test]
    fn offered_ids_are_exact() {
        let mut session = Session::new(FlowState::Light);
        session.offered = vec!["1".to_owned(), "12".to_owned()];
        assert!(session.offers("12"));
        assert!(!session.offers("2"));
        assert!(!session.offers("../config"));
    }
}
