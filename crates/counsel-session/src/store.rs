//! Token Store
//!
//! Holds the one Session of the running client and persists it on every
//! mutation. Subscribers are notified synchronously, in mutation order.

use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use counsel_storage::Database;

use crate::error::SessionError;
use crate::session::Session;
use crate::token::Token;
use crate::user::User;
use crate::Result;

type Subscriber = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct TokenStore {
    /// Current snapshot
    session: Arc<RwLock<Session>>,
    /// Serializes mutations so subscribers observe them in program order
    mutation: Arc<Mutex<()>>,
    subscribers: Arc<RwLock<Vec<(SubscriptionId, Subscriber)>>>,
    next_subscription: Arc<AtomicU64>,
    /// Durable storage; `None` keeps the session in memory only
    db: Option<Database>,
}

impl TokenStore {
    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_session(Session::empty(), None)
    }

    /// Restore the persisted session.
    ///
    /// Absent, unreadable or tampered storage yields an empty Session; a bad
    /// row is removed so the next start is clean.
    pub fn load(db: Database) -> Self {
        let session = match read_persisted(&db) {
            Ok(Some(session)) => {
                tracing::info!(
                    user_id = session.user_id().unwrap_or("-"),
                    "Restored persisted session"
                );
                session
            }
            Ok(None) => Session::empty(),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted session");
                if let Err(e) = db.clear_auth_session() {
                    tracing::error!(error = %e, "Failed to remove unreadable session");
                }
                Session::empty()
            }
        };

        Self::with_session(session, Some(db))
    }

    fn with_session(session: Session, db: Option<Database>) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            mutation: Arc::new(Mutex::new(())),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscription: Arc::new(AtomicU64::new(1)),
            db,
        }
    }

    /// Snapshot of the current session
    pub fn get(&self) -> Session {
        self.session.read().clone()
    }

    /// Replace the whole session after a login or registration
    pub fn set(&self, access_token: Token, refresh_token: Token, user: User) {
        let session = Session::new(access_token, refresh_token, user);
        self.mutate(|current| {
            *current = session;
            true
        });
    }

    /// Install an access token obtained with `issued_for`, rotating the
    /// refresh token if the backend issued a new one.
    ///
    /// Returns `false` and changes nothing when the session was cleared or
    /// replaced in the meantime, so a late refresh never revives a logged-out
    /// session or overwrites a newer one.
    pub fn set_access_token(
        &self,
        issued_for: &Token,
        access_token: Token,
        refresh_token: Option<Token>,
    ) -> bool {
        self.mutate(|current| {
            if current.refresh_token.as_ref() != Some(issued_for) {
                return false;
            }
            current.access_token = Some(access_token);
            if let Some(rotated) = refresh_token {
                current.refresh_token = Some(rotated);
            }
            true
        })
    }

    /// Clear the session only if it still holds `refresh_token`.
    pub fn clear_if_refresh_token(&self, refresh_token: &Token) -> bool {
        self.mutate(|current| {
            if current.refresh_token.as_ref() != Some(refresh_token) {
                return false;
            }
            *current = Session::empty();
            true
        })
    }

    pub fn clear(&self) {
        self.mutate(|current| {
            *current = Session::empty();
            true
        });
    }

    /// Register a callback run after every mutation.
    ///
    /// Callbacks run on the mutating task while mutations are serialized and
    /// must not mutate the store themselves.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().retain(|(sid, _)| *sid != id);
    }

    fn mutate<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut Session) -> bool,
    {
        let _guard = self.mutation.lock();

        let snapshot = {
            let mut session = self.session.write();
            if !apply(&mut session) {
                return false;
            }
            session.clone()
        };

        if let Some(db) = &self.db {
            // Memory stays authoritative for the running client
            if let Err(e) = persist(db, &snapshot) {
                tracing::error!(error = %e, "Failed to persist session");
            }
        }

        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber(&snapshot);
        }

        true
    }
}

impl Clone for TokenStore {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            mutation: Arc::clone(&self.mutation),
            subscribers: Arc::clone(&self.subscribers),
            next_subscription: Arc::clone(&self.next_subscription),
            db: self.db.clone(),
        }
    }
}

fn read_persisted(db: &Database) -> Result<Option<Session>> {
    let Some(stored) = db.load_auth_session()? else {
        return Ok(None);
    };

    if integrity_hash(&stored.payload) != stored.integrity_hash {
        return Err(SessionError::IntegrityMismatch);
    }

    let session: Session = serde_json::from_str(&stored.payload)?;
    Ok(Some(session))
}

fn persist(db: &Database, session: &Session) -> Result<()> {
    if session.is_empty() {
        db.clear_auth_session()?;
        return Ok(());
    }

    let payload = serde_json::to_string(session)?;
    db.save_auth_session(&payload, &integrity_hash(&payload))?;
    Ok(())
}

fn integrity_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: "client".to_string(),
        }
    }

    #[test]
    fn test_set_get_clear() {
        let store = TokenStore::in_memory();
        assert!(store.get().is_empty());

        store.set(Token::new("access"), Token::new("refresh"), user());
        let session = store.get();
        assert_eq!(session.access_token.unwrap().as_str(), "access");
        assert_eq!(session.user.unwrap().id, "u-1");

        store.clear();
        assert!(store.get().is_empty());
    }

    #[test]
    fn test_set_access_token_requires_matching_session() {
        let store = TokenStore::in_memory();
        assert!(!store.set_access_token(&Token::new("r1"), Token::new("late"), None));
        assert!(store.get().is_empty());

        store.set(Token::new("a1"), Token::new("r1"), user());
        assert!(store.set_access_token(&Token::new("r1"), Token::new("a2"), Some(Token::new("r2"))));
        let session = store.get();
        assert_eq!(session.access_token.unwrap().as_str(), "a2");
        assert_eq!(session.refresh_token.unwrap().as_str(), "r2");

        // Issued for the rotated-away refresh token
        assert!(!store.set_access_token(&Token::new("r1"), Token::new("a3"), None));
        assert!(store.set_access_token(&Token::new("r2"), Token::new("a3"), None));
        assert_eq!(store.get().refresh_token.unwrap().as_str(), "r2");
    }

    #[test]
    fn test_clear_if_refresh_token() {
        let store = TokenStore::in_memory();
        store.set(Token::new("a1"), Token::new("r1"), user());

        assert!(!store.clear_if_refresh_token(&Token::new("other")));
        assert!(store.get().is_authenticated());

        assert!(store.clear_if_refresh_token(&Token::new("r1")));
        assert!(store.get().is_empty());
    }

    #[test]
    fn test_subscribers_see_mutations_in_order() {
        let store = TokenStore::in_memory();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = store.subscribe(move |session| {
            let label = session
                .access_token
                .as_ref()
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "<empty>".to_string());
            sink.lock().push(label);
        });

        store.set(Token::new("a1"), Token::new("r1"), user());
        store.set_access_token(&Token::new("r1"), Token::new("a2"), None);
        store.clear();
        // Rejected mutation does not notify
        store.set_access_token(&Token::new("r1"), Token::new("a3"), None);

        assert_eq!(*seen.lock(), vec!["a1", "a2", "<empty>"]);

        store.unsubscribe(id);
        store.set(Token::new("a4"), Token::new("r4"), user());
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_persisted_session_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counsel.db");

        {
            let store = TokenStore::load(Database::open(&path).unwrap());
            store.set(Token::new("access"), Token::new("refresh"), user());
        }

        let store = TokenStore::load(Database::open(&path).unwrap());
        let session = store.get();
        assert_eq!(session.refresh_token.unwrap().as_str(), "refresh");
        assert_eq!(session.user.unwrap().email, "ada@example.com");
    }

    #[test]
    fn test_clear_removes_persisted_row() {
        let db = Database::open_in_memory().unwrap();
        let store = TokenStore::load(db.clone());
        store.set(Token::new("access"), Token::new("refresh"), user());
        assert!(db.load_auth_session().unwrap().is_some());

        store.clear();
        assert!(db.load_auth_session().unwrap().is_none());
    }

    #[test]
    fn test_corrupted_payload_yields_empty_session() {
        let db = Database::open_in_memory().unwrap();
        let payload = "{not json";
        db.save_auth_session(payload, &integrity_hash(payload)).unwrap();

        let store = TokenStore::load(db.clone());
        assert!(store.get().is_empty());
        assert!(db.load_auth_session().unwrap().is_none());
    }

    #[test]
    fn test_tampered_payload_yields_empty_session() {
        let db = Database::open_in_memory().unwrap();
        let session = Session::new(Token::new("access"), Token::new("refresh"), user());
        let payload = serde_json::to_string(&session).unwrap();
        db.save_auth_session(&payload, "not-the-hash").unwrap();

        let store = TokenStore::load(db);
        assert!(store.get().is_empty());
    }
}
