use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use shule_client::HttpBackend;
use shule_core::{BackendError, SchoolBackend, SessionHandle};

use crate::error::AppError;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_MAX_SESSIONS: usize = 500;
const DEFAULT_IDLE_TTL_SECS: i64 = 30 * 60;
/// Sessions one token may hold at once.
pub const MAX_SESSIONS_PER_TOKEN: usize = 8;

/// Builds a school API client acting on behalf of one bearer token.
pub trait BackendConnector: Send + Sync {
    fn connect(&self, token: &str) -> Result<Arc<dyn SchoolBackend>, BackendError>;
}

pub struct HttpConnector {
    api_url: String,
}

impl HttpConnector {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }
}

impl BackendConnector for HttpConnector {
    fn connect(&self, token: &str) -> Result<Arc<dyn SchoolBackend>, BackendError> {
        let backend = HttpBackend::new(&self.api_url, token)
            .map_err(|e| BackendError::Transport(format!("invalid school API url '{}': {e}", self.api_url)))?;
        Ok(Arc::new(backend))
    }
}

struct SessionEntry {
    handle: SessionHandle,
    token: String,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

/// Drop sessions idle for `idle_ttl` or longer. Returns how many went.
fn sweep_idle(sessions: &mut HashMap<Uuid, SessionEntry>, idle_ttl: Duration, now: DateTime<Utc>) -> usize {
    let before = sessions.len();
    sessions.retain(|id, entry| {
        let keep = now - entry.last_used < idle_ttl;
        if !keep {
            tracing::info!(session_id = %id, idle_secs = (now - entry.last_used).num_seconds(), "idle assistant session expired");
        }
        keep
    });
    before - sessions.len()
}

/// Live dialog sessions, each bound to the token that created it.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            idle_ttl: Duration::seconds(DEFAULT_IDLE_TTL_SECS),
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    pub async fn ensure_capacity(&self) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        sweep_idle(&mut sessions, self.idle_ttl, Utc::now());
        if sessions.len() >= self.max_sessions {
            return Err(AppError::CapacityExhausted {
                limit: self.max_sessions,
            });
        }
        Ok(())
    }

    /// Store a new session. Idle sessions are swept first, and a token already
    /// holding [`MAX_SESSIONS_PER_TOKEN`] loses its least recently used one.
    pub async fn insert(
        &self,
        handle: SessionHandle,
        token: &str,
    ) -> Result<(Uuid, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sweep_idle(&mut sessions, self.idle_ttl, now);

        let owned: Vec<(Uuid, DateTime<Utc>)> = sessions
            .iter()
            .filter(|(_, entry)| entry.token == token)
            .map(|(id, entry)| (*id, entry.last_used))
            .collect();
        if owned.len() >= MAX_SESSIONS_PER_TOKEN {
            if let Some((oldest, _)) = owned.iter().min_by_key(|(_, last_used)| *last_used) {
                sessions.remove(oldest);
                tracing::info!(session_id = %oldest, "assistant session evicted for a newer one on the same token");
            }
        }

        if sessions.len() >= self.max_sessions {
            return Err(AppError::CapacityExhausted {
                limit: self.max_sessions,
            });
        }
        let id = Uuid::now_v7();
        sessions.insert(
            id,
            SessionEntry {
                handle,
                token: token.to_string(),
                created_at: now,
                last_used: now,
            },
        );
        Ok((id, now))
    }

    /// The session, if it exists, is not idle-expired and belongs to `token`.
    /// A foreign session looks exactly like a missing one.
    pub async fn get(&self, id: Uuid, token: &str) -> Result<SessionHandle, AppError> {
        let not_found = || AppError::NotFound {
            resource: format!("session {id}"),
        };
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let live = match sessions.get(&id) {
            Some(entry) if entry.token == token => now - entry.last_used < self.idle_ttl,
            _ => return Err(not_found()),
        };
        if !live {
            sessions.remove(&id);
            tracing::info!(session_id = %id, "idle assistant session expired");
            return Err(not_found());
        }
        match sessions.get_mut(&id) {
            Some(entry) => {
                entry.last_used = now;
                Ok(entry.handle.clone())
            }
            None => Err(not_found()),
        }
    }

    pub async fn remove(&self, id: Uuid, token: &str) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&id) {
            Some(entry) if entry.token == token => {
                let age = Utc::now() - entry.created_at;
                sessions.remove(&id);
                tracing::info!(session_id = %id, age_secs = age.num_seconds(), "assistant session closed");
                Ok(())
            }
            _ => Err(AppError::NotFound {
                resource: format!("session {id}"),
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub connector: Arc<dyn BackendConnector>,
    /// Pick reply variants at random instead of always the first.
    pub varied_phrases: bool,
}

impl AppState {
    pub fn from_env() -> Self {
        let api_url =
            std::env::var("SHULE_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        let max_sessions = std::env::var("SHULE_MAX_SESSIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(DEFAULT_MAX_SESSIONS);
        let idle_ttl_secs = std::env::var("SHULE_SESSION_IDLE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &i64| n > 0)
            .unwrap_or(DEFAULT_IDLE_TTL_SECS);
        let varied_phrases = std::env::var("SHULE_PHRASING")
            .map(|v| v.eq_ignore_ascii_case("varied"))
            .unwrap_or(false);

        tracing::info!(%api_url, max_sessions, idle_ttl_secs, varied_phrases, "assistant gateway configured");

        Self {
            sessions: SessionStore::new(max_sessions).with_idle_ttl(Duration::seconds(idle_ttl_secs)),
            connector: Arc::new(HttpConnector::new(api_url)),
            varied_phrases,
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use shule_core::resource::ResourceKind;
    use shule_core::{ArrearsCampaign, Identity, Role};

    use super::*;

    /// School API double: signed in as a finance officer unless the token is "expired".
    pub struct StubBackend {
        pub token: String,
    }

    #[async_trait]
    impl SchoolBackend for StubBackend {
        async fn current_identity(&self) -> Result<Identity, BackendError> {
            if self.token == "expired" {
                return Err(BackendError::Http {
                    status: 401,
                    message: "Token expired".to_string(),
                });
            }
            Ok(Identity {
                id: 9,
                display_name: "Otieno Kamau".to_string(),
                role: Role::Finance,
                is_staff: true,
                is_superuser: false,
            })
        }

        async fn query(&self, _kind: ResourceKind, _search: Option<&str>) -> Result<Vec<Value>, BackendError> {
            Ok(vec![json!({"id": 3, "name": "Form 2B"})])
        }

        async fn create(&self, _kind: ResourceKind, body: &Value) -> Result<Value, BackendError> {
            Ok(body.clone())
        }

        async fn delete(&self, _kind: ResourceKind, _id: u64) -> Result<(), BackendError> {
            Ok(())
        }

        async fn publish_exam(&self, _id: u64) -> Result<(), BackendError> {
            Ok(())
        }

        async fn create_campaign(&self, _campaign: &ArrearsCampaign) -> Result<u64, BackendError> {
            Ok(1)
        }

        async fn send_campaign(&self, _id: u64) -> Result<Value, BackendError> {
            Ok(json!({"queued": true}))
        }
    }

    pub struct StubConnector;

    impl BackendConnector for StubConnector {
        fn connect(&self, token: &str) -> Result<Arc<dyn SchoolBackend>, BackendError> {
            Ok(Arc::new(StubBackend {
                token: token.to_string(),
            }))
        }
    }
}
