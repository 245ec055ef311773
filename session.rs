use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One user's interactive state: the most recent uploaded image bytes and
/// the most recent successful prediction. Both slots only ever move forward;
/// neither is cleared for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct Session {
    pub image: Option<Vec<u8>>,
    pub last_prediction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            image: None,
            last_prediction: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Session-keyed state store, injected into the pipeline rather than held as
/// ambient global state. Sessions are created implicitly on first
/// interaction and live until the store is dropped by the hosting context.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.with_session(id, |_| {});
        id
    }

    /// Stores newly arrived image bytes. Last writer wins regardless of the
    /// input source; any previous bytes are discarded.
    pub fn put_image(&self, id: Uuid, bytes: Vec<u8>) {
        self.with_session(id, |session| {
            session.image = Some(bytes);
        });
    }

    /// Records the label of a successful inference. The slot is re-populated
    /// on every prediction and never reverts to empty.
    pub fn record_prediction(&self, id: Uuid, label: &str) {
        self.with_session(id, |session| {
            session.last_prediction = Some(label.to_string());
        });
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Session> {
        self.lock().get(&id).cloned()
    }

    fn with_session<F: FnOnce(&mut Session)>(&self, id: Uuid, apply: F) {
        let mut sessions = self.lock();
        let session = sessions.entry(id).or_insert_with(Session::new);
        apply(session);
        session.updated_at = Utc::now();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
