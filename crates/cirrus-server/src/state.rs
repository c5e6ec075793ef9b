//! Shared relay state: the driver and the live sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cirrus_core::{Driver, Session};
use cirrus_tools::{Catalog, DEFAULT_CATEGORY, ProviderLauncher, ToolManager};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

/// A session plus the lock that serializes its turns.
pub type SharedSession = Arc<Mutex<Session>>;

/// Sessions unused for this long are closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Upper bound on the time between idle sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

pub struct AppState {
    driver: Driver,
    catalog: Arc<Catalog>,
    launcher: Arc<dyn ProviderLauncher>,
    tools_enabled: bool,
    default_category: Option<String>,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl AppState {
    pub fn new(driver: Driver, catalog: Arc<Catalog>, launcher: Arc<dyn ProviderLauncher>) -> Self {
        Self {
            driver,
            catalog,
            launcher,
            tools_enabled: true,
            default_category: Some(DEFAULT_CATEGORY.to_string()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_default_category(mut self, category: Option<String>) -> Self {
        self.default_category = category;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tools_enabled(&self) -> bool {
        self.tools_enabled
    }

    /// The session for `id`, or a fresh one when `id` is absent or unknown.
    pub async fn session(&self, id: Option<Uuid>) -> (Uuid, SharedSession) {
        let mut sessions = self.sessions.lock().await;
        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_used = Instant::now();
                return (id, entry.session.clone());
            }
            tracing::debug!(%id, "Unknown session id, starting a new session");
        }

        let tools = ToolManager::new(Arc::clone(&self.catalog), Arc::clone(&self.launcher))
            .with_enabled(self.tools_enabled)
            .with_default_category(self.default_category.clone());
        let session = Session::new(tools);
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        sessions.insert(
            id,
            Entry {
                session: shared.clone(),
                last_used: Instant::now(),
            },
        );
        tracing::info!(%id, "Session created");
        (id, shared)
    }

    pub async fn find(&self, id: Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    /// Mark the session as used now, e.g. when a long turn ends.
    pub async fn touch(&self, id: Uuid) {
        if let Some(entry) = self.sessions.lock().await.get_mut(&id) {
            entry.last_used = Instant::now();
        }
    }

    /// Forget the session and stop its providers. Waits for a running turn
    /// to finish first.
    pub async fn close(&self, id: Uuid) -> bool {
        let Some(entry) = self.sessions.lock().await.remove(&id) else {
            return false;
        };
        entry.session.lock().await.shutdown().await;
        tracing::info!(%id, "Session closed");
        true
    }

    /// Close every session unused for longer than the idle timeout. A
    /// session with a turn in progress is kept. Returns how many were closed.
    pub async fn evict_idle(&self) -> usize {
        let expired: Vec<(Uuid, OwnedMutexGuard<Session>)> = {
            let mut sessions = self.sessions.lock().await;
            let idle: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_used.elapsed() >= self.idle_timeout)
                .map(|(id, _)| *id)
                .collect();
            idle.into_iter()
                .filter_map(|id| {
                    let guard = sessions.get(&id)?.session.clone().try_lock_owned().ok()?;
                    sessions.remove(&id);
                    Some((id, guard))
                })
                .collect()
        };

        let count = expired.len();
        for (id, mut session) in expired {
            session.shutdown().await;
            tracing::info!(%id, "Idle session closed");
        }
        count
    }

    /// Sweep idle sessions in the background until the task is aborted.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(self);
        let period = self.idle_timeout.min(MAX_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let closed = state.evict_idle().await;
                if closed > 0 {
                    tracing::debug!(closed, "Idle sweep finished");
                }
            }
        })
    }

    /// Stop the providers of every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<SharedSession> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, entry)| entry.session)
            .collect();
        for session in sessions {
            session.lock().await.shutdown().await;
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
