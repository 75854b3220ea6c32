use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{generate_access_token, hash_access_token};
use crate::models::UserProfile;
use crate::notify::ToastHub;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored session is corrupt: {0}")]
    Corrupt(String),
}

/// A logged-in portal user: the upstream bearer token plus the profile the
/// backend returned at login.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub token_hash: String,
    pub upstream_token: String,
    pub user: UserProfile,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    /// Live sessions only; expired or revoked ones resolve to `None`.
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, StoreError>;

    /// Returns whether a live session was revoked.
    async fn revoke(&self, session_id: Uuid) -> Result<bool, StoreError>;

    /// Delete expired and revoked sessions, returning their ids.
    async fn purge_expired(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Create and store a session, returning the opaque access token for the client.
pub async fn open(
    store: &dyn SessionStore,
    ttl_hours: i64,
    upstream_token: String,
    user: UserProfile,
) -> Result<(String, Session), StoreError> {
    let access_token = generate_access_token();
    let now = Utc::now();
    let session = Session {
        session_id: Uuid::new_v4(),
        token_hash: hash_access_token(&access_token),
        upstream_token,
        user,
        created_at: now,
        expires_at: now + Duration::hours(ttl_hours),
    };
    store.insert(&session).await?;
    Ok((access_token, session))
}

/// Purge dead sessions from the store and drop their toast queues.
pub async fn sweep_expired(store: &dyn SessionStore, toasts: &ToastHub) -> Result<usize, StoreError> {
    let purged = store.purge_expired().await?;
    for session_id in &purged {
        toasts.drop_session(*session_id);
    }
    if !purged.is_empty() {
        tracing::debug!(count = purged.len(), "expired sessions purged");
    }
    Ok(purged.len())
}

#[derive(Default)]
pub struct MemorySessionStore {
    by_hash: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.by_hash.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        self.by_hash
            .write()
            .await
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        let map = self.by_hash.read().await;
        Ok(map
            .get(token_hash)
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let mut map = self.by_hash.write().await;
        let now = Utc::now();
        let before = map.len();
        map.retain(|_, s| s.session_id != session_id || s.expires_at <= now);
        Ok(map.len() != before)
    }

    async fn purge_expired(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut map = self.by_hash.write().await;
        let now = Utc::now();
        let mut purged = Vec::new();
        map.retain(|_, s| {
            let live = s.expires_at > now;
            if !live {
                purged.push(s.session_id);
            }
            live
        });
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user() -> UserProfile {
        UserProfile {
            id: "u1".into(),
            name: "Ada".into(),
            email: "ada@clinic.test".into(),
            phone: None,
            role: Role::Patient,
        }
    }

    #[tokio::test]
    async fn test_open_and_find() {
        let store = MemorySessionStore::new();
        let (token, session) = open(&store, 24, "up-1".into(), user()).await.unwrap();

        let found = store
            .find_by_token_hash(&hash_access_token(&token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.session_id, session.session_id);
        assert_eq!(found.upstream_token, "up-1");
        assert_ne!(found.token_hash, token);

        assert!(store.find_by_token_hash("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let store = MemorySessionStore::new();
        let (token, mut session) = open(&store, 1, "up".into(), user()).await.unwrap();
        session.expires_at = Utc::now() - Duration::minutes(1);
        store.insert(&session).await.unwrap();

        assert!(store
            .find_by_token_hash(&hash_access_token(&token))
            .await
            .unwrap()
            .is_none());
        assert!(!store.revoke(session.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_drops_expired_sessions_and_toasts() {
        let store = MemorySessionStore::new();
        let toasts = ToastHub::new(std::time::Duration::from_secs(60));

        let mut expired = Vec::new();
        for _ in 0..50 {
            let (_, mut session) = open(&store, 1, "up".into(), user()).await.unwrap();
            session.expires_at = Utc::now() - Duration::minutes(1);
            store.insert(&session).await.unwrap();
            toasts.for_session(session.session_id).success("Welcome, Ada");
            expired.push(session.session_id);
        }
        let (token, live) = open(&store, 24, "up".into(), user()).await.unwrap();
        toasts.for_session(live.session_id).success("Welcome, Ada");
        assert_eq!(store.len().await, 51);
        assert_eq!(toasts.queue_count(), 51);

        assert_eq!(sweep_expired(&store, &toasts).await.unwrap(), 50);
        assert_eq!(store.len().await, 1);
        assert_eq!(toasts.queue_count(), 1);
        assert!(store
            .find_by_token_hash(&hash_access_token(&token))
            .await
            .unwrap()
            .is_some());
        assert_eq!(toasts.for_session(live.session_id).list().len(), 1);

        assert_eq!(sweep_expired(&store, &toasts).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revoke() {
        let store = MemorySessionStore::new();
        let (token, session) = open(&store, 24, "up".into(), user()).await.unwrap();

        assert!(store.revoke(session.session_id).await.unwrap());
        assert!(!store.revoke(session.session_id).await.unwrap());
        assert!(store
            .find_by_token_hash(&hash_access_token(&token))
            .await
            .unwrap()
            .is_none());
    }
}
