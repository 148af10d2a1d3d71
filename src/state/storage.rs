//! Session storage implementation
//!
//! This module persists one session per chat user with sliding expiry.
//! Three tiers share the [`SessionStore`] trait: Redis (durable), process
//! memory (volatile), and Redis with an explicit memory fallback for
//! public sessions.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use redis::AsyncCommands;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::{RedisConfig, SessionBackend, Settings};
use crate::utils::errors::{ClassChatError, Result};
use crate::utils::helpers::generate_uuid;
use crate::utils::logging::log_store_degraded;
use super::session::{Session, SessionPatch};

/// Deletes the lock only if it still holds our token
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const LOCK_BACKOFF_MS: u64 = 20;

/// How often the memory tier sweeps expired sessions
const CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// How well a store tier survives a process restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Durable,
    Volatile,
    /// Durable primary that may serve public sessions from memory while degraded
    DurableWithVolatileFallback,
}

/// Exclusive hold on one user's flow operations
///
/// Obtained from [`SessionStore::lock`] and released when dropped. Every
/// holder of the same store, in this process or another one sharing the
/// backing storage, waits for the previous holder to let go.
pub struct SessionLock {
    _held: Box<dyn Send>,
}

impl SessionLock {
    /// Wrap whatever keeps the lock held until it is dropped
    pub fn new(held: impl Send + 'static) -> Self {
        Self { _held: Box::new(held) }
    }
}

impl std::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLock").finish_non_exhaustive()
    }
}

/// Per-user session persistence
///
/// Implementations must never return an expired session from `get`, and must
/// serialize `get`/`update` for the same user so that concurrent
/// read-modify-write cycles never lose an update. A caller that reads a
/// session, decides, and writes back holds [`SessionStore::lock`] across
/// the whole sequence.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Wait for exclusive use of the user's session across a multi-call operation
    async fn lock(&self, user_id: &str) -> Result<SessionLock>;

    /// Return the live session, replacing an expired or missing one with a fresh idle session
    async fn get(&self, user_id: &str) -> Result<Session>;

    /// Merge a partial update into the user's session and slide its expiry
    async fn update(&self, user_id: &str, patch: &SessionPatch) -> Result<Session>;

    /// Remove the user's session immediately
    async fn delete(&self, user_id: &str) -> Result<()>;

    /// Sliding time-to-live applied on every read and write
    fn ttl(&self) -> Duration;

    fn durability(&self) -> Durability;

    /// Check connectivity of the backing storage
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

type UserLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// In-process session store
///
/// Per-key serialization comes from the map's shard locks: each operation
/// completes its read-modify-write while holding the entry. Operation locks
/// are async mutexes keyed by user, removed once nobody holds or awaits them.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<String, Session>>,
    locks: UserLocks,
    ttl: Duration,
}

struct MemoryLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: UserLocks,
    user_id: String,
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references the lock: no holder, no waiter
        self.locks.remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            locks: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Number of users whose operation lock is currently held or awaited
    pub fn held_locks(&self) -> usize {
        self.locks.len()
    }

    /// Store a session as-is, without sliding its expiry
    pub fn put(&self, session: Session) {
        self.sessions.insert(session.user_id.clone(), session);
    }

    /// Number of sessions currently held, expired ones included
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every expired session
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired());
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            info!("Purged {} expired sessions", purged);
        }
        purged
    }

    /// Start a background task purging expired sessions at a fixed interval
    pub fn spawn_cleanup(&self, interval: StdDuration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.purge_expired();
            }
        })
    }

    fn read_modify_write(&self, user_id: &str, patch: Option<&SessionPatch>) -> Session {
        let mut entry = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session::new(user_id, self.ttl));

        if entry.is_expired() {
            debug!(user_id = user_id, expires_at = %entry.expires_at, "Session expired, starting fresh");
            *entry = Session::new(user_id, self.ttl);
        }

        if let Some(patch) = patch {
            entry.apply(patch);
        }
        entry.touch(self.ttl);
        entry.clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn lock(&self, user_id: &str) -> Result<SessionLock> {
        let lock = self.locks.entry(user_id.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        Ok(SessionLock::new(MemoryLockGuard {
            guard: Some(guard),
            locks: self.locks.clone(),
            user_id: user_id.to_string(),
        }))
    }

    async fn get(&self, user_id: &str) -> Result<Session> {
        Ok(self.read_modify_write(user_id, None))
    }

    async fn update(&self, user_id: &str, patch: &SessionPatch) -> Result<Session> {
        Ok(self.read_modify_write(user_id, Some(patch)))
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        if self.sessions.remove(user_id).is_some() {
            debug!(user_id = user_id, "Deleted session");
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn durability(&self) -> Durability {
        Durability::Volatile
    }
}

/// Redis-backed session store
///
/// Sessions are stored as JSON with a Redis TTL matching the sliding expiry.
/// Each `get`/`update` runs under a short-lived `lock:session:` key. The
/// operation lock handed out by [`SessionStore::lock`] is a separate
/// `lock:flow:` key, so every process sharing the Redis instance waits on it.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection_manager: redis::aio::ConnectionManager,
    config: RedisConfig,
    ttl: Duration,
    lock_timeout_ms: u64,
    lock_retries: u32,
    flow_lock_timeout_ms: u64,
}

/// Operation lock held in Redis, released by compare-and-delete on drop
struct RedisLockGuard {
    connection_manager: redis::aio::ConnectionManager,
    key: String,
    token: String,
}

impl Drop for RedisLockGuard {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "No runtime to release flow lock, leaving it to expire");
            return;
        };

        let conn = self.connection_manager.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        runtime.spawn(async move {
            match release_lock(conn, &key, &token).await {
                Ok(true) => debug!(key = %key, "Flow lock released"),
                Ok(false) => warn!(key = %key, "Flow lock expired before release"),
                Err(e) => warn!(key = %key, error = %e, "Failed to release flow lock"),
            }
        });
    }
}

/// Delete a lock key if it still holds `token`; false when it already expired
async fn release_lock(mut conn: redis::aio::ConnectionManager, key: &str, token: &str) -> Result<bool> {
    let released: i64 = redis::Script::new(RELEASE_LOCK_SCRIPT)
        .key(key)
        .arg(token)
        .invoke_async(&mut conn)
        .await?;
    Ok(released != 0)
}

impl RedisSessionStore {
    /// Connect to Redis
    pub async fn new(
        config: RedisConfig,
        ttl: Duration,
        lock_timeout_ms: u64,
        lock_retries: u32,
        flow_lock_timeout_ms: u64,
    ) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection_manager = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            connection_manager,
            config,
            ttl,
            lock_timeout_ms,
            lock_retries,
            flow_lock_timeout_ms,
        })
    }

    fn session_key(&self, user_id: &str) -> String {
        format!("{}session:{}", self.config.prefix, user_id)
    }

    fn lock_key(&self, user_id: &str) -> String {
        format!("{}lock:session:{}", self.config.prefix, user_id)
    }

    fn flow_lock_key(&self, user_id: &str) -> String {
        format!("{}lock:flow:{}", self.config.prefix, user_id)
    }

    async fn try_lock(&self, key: &str, token: &str, expiry_ms: u64) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(expiry_ms)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    async fn acquire_lock(&self, user_id: &str) -> Result<String> {
        let key = self.lock_key(user_id);
        let token = generate_uuid();

        for attempt in 0..=self.lock_retries {
            if self.try_lock(&key, &token, self.lock_timeout_ms).await? {
                return Ok(token);
            }

            let backoff = LOCK_BACKOFF_MS * u64::from(attempt.min(4) + 1);
            tokio::time::sleep(StdDuration::from_millis(backoff)).await;
        }

        warn!(user_id = user_id, "Timed out waiting for session lock");
        Err(ClassChatError::SessionBusy {
            user_id: user_id.to_string(),
        })
    }

    /// Wait at most one lock expiry, so an abandoned lock is outlived
    async fn acquire_flow_lock(&self, user_id: &str) -> Result<RedisLockGuard> {
        let key = self.flow_lock_key(user_id);
        let token = generate_uuid();
        let deadline = tokio::time::Instant::now() + StdDuration::from_millis(self.flow_lock_timeout_ms);
        let mut attempt: u64 = 0;

        loop {
            if self.try_lock(&key, &token, self.flow_lock_timeout_ms).await? {
                return Ok(RedisLockGuard {
                    connection_manager: self.connection_manager.clone(),
                    key,
                    token,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(user_id = user_id, "Timed out waiting for flow lock");
                return Err(ClassChatError::SessionBusy {
                    user_id: user_id.to_string(),
                });
            }

            let backoff = LOCK_BACKOFF_MS * (attempt.min(4) + 1);
            tokio::time::sleep(StdDuration::from_millis(backoff)).await;
            attempt += 1;
        }
    }

    async fn load(&self, user_id: &str) -> Result<Option<Session>> {
        let key = self.session_key(user_id);
        let mut conn = self.connection_manager.clone();

        let serialized: Option<String> = conn.get(&key).await?;
        match serialized {
            Some(data) => {
                let session = serde_json::from_str::<Session>(&data).map_err(|e| {
                    error!(user_id = user_id, error = %e, "Failed to deserialize session");
                    e
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let key = self.session_key(&session.user_id);
        let serialized = serde_json::to_string(session)?;
        let ttl_seconds = std::cmp::max(self.ttl.num_seconds(), 1) as u64;

        let mut conn = self.connection_manager.clone();
        conn.set_ex::<_, _, ()>(&key, serialized, ttl_seconds).await?;

        debug!(user_id = %session.user_id, ttl_seconds = ttl_seconds, "Session saved to Redis");
        Ok(())
    }

    async fn read_modify_write(&self, user_id: &str, patch: Option<&SessionPatch>) -> Result<Session> {
        let mut session = match self.load(user_id).await? {
            Some(session) if !session.is_expired() => session,
            Some(session) => {
                debug!(user_id = user_id, expires_at = %session.expires_at, "Session expired, starting fresh");
                Session::new(user_id, self.ttl)
            }
            None => Session::new(user_id, self.ttl),
        };

        if let Some(patch) = patch {
            session.apply(patch);
        }
        session.touch(self.ttl);
        self.save(&session).await?;
        Ok(session)
    }

    async fn locked_read_modify_write(&self, user_id: &str, patch: Option<&SessionPatch>) -> Result<Session> {
        let token = self.acquire_lock(user_id).await?;
        let result = self.read_modify_write(user_id, patch).await;

        match release_lock(self.connection_manager.clone(), &self.lock_key(user_id), &token).await {
            Ok(true) => {}
            Ok(false) => warn!(user_id = user_id, "Session lock expired before release"),
            Err(e) => warn!(user_id = user_id, error = %e, "Failed to release session lock"),
        }
        result
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn lock(&self, user_id: &str) -> Result<SessionLock> {
        Ok(SessionLock::new(self.acquire_flow_lock(user_id).await?))
    }

    async fn get(&self, user_id: &str) -> Result<Session> {
        self.locked_read_modify_write(user_id, None).await
    }

    async fn update(&self, user_id: &str, patch: &SessionPatch) -> Result<Session> {
        self.locked_read_modify_write(user_id, Some(patch)).await
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let key = self.session_key(user_id);
        let mut conn = self.connection_manager.clone();

        let deleted: u32 = conn.del(&key).await?;
        if deleted > 0 {
            debug!(user_id = user_id, "Deleted session");
        } else {
            debug!(user_id = user_id, "No session to delete");
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn durability(&self) -> Durability {
        Durability::Durable
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("config", &self.config)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Durable store with an explicit, weaker in-memory tier
///
/// When the primary fails, public sessions are served from process memory
/// and every such operation is logged as degraded. Anything that would read
/// or produce an elevated session fails with a store error instead.
#[derive(Debug, Clone)]
pub struct FallbackSessionStore {
    primary: Arc<dyn SessionStore>,
    fallback: MemorySessionStore,
}

impl FallbackSessionStore {
    pub fn new(primary: Arc<dyn SessionStore>) -> Self {
        let fallback = MemorySessionStore::new(primary.ttl());
        Self { primary, fallback }
    }

    /// The volatile tier used while the primary is unavailable
    pub fn fallback(&self) -> &MemorySessionStore {
        &self.fallback
    }

    fn refuse_privileged(user_id: &str) -> ClassChatError {
        error!(user_id = user_id, "Refusing to serve an elevated session from the volatile tier");
        ClassChatError::Store("privileged sessions require the durable session store".to_string())
    }
}

#[async_trait]
impl SessionStore for FallbackSessionStore {
    async fn lock(&self, user_id: &str) -> Result<SessionLock> {
        match self.primary.lock(user_id).await {
            Ok(lock) => Ok(lock),
            Err(e) if e.is_store_failure() => {
                log_store_degraded(user_id, "lock", &e.to_string());
                self.fallback.lock(user_id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn get(&self, user_id: &str) -> Result<Session> {
        match self.primary.get(user_id).await {
            Ok(session) => Ok(session),
            Err(e) if e.is_store_failure() => {
                log_store_degraded(user_id, "get", &e.to_string());
                let session = self.fallback.get(user_id).await?;
                if session.is_admin {
                    return Err(Self::refuse_privileged(user_id));
                }
                Ok(session)
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, user_id: &str, patch: &SessionPatch) -> Result<Session> {
        match self.primary.update(user_id, patch).await {
            Ok(session) => Ok(session),
            Err(e) if e.is_store_failure() => {
                log_store_degraded(user_id, "update", &e.to_string());
                if patch.grants_admin() || self.fallback.get(user_id).await?.is_admin {
                    return Err(Self::refuse_privileged(user_id));
                }
                self.fallback.update(user_id, patch).await
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        self.fallback.delete(user_id).await?;
        self.primary.delete(user_id).await
    }

    fn ttl(&self) -> Duration {
        self.primary.ttl()
    }

    fn durability(&self) -> Durability {
        Durability::DurableWithVolatileFallback
    }

    async fn health_check(&self) -> Result<()> {
        self.primary.health_check().await
    }
}

/// Build the session store tier selected in the settings
pub async fn session_store_from_settings(settings: &Settings) -> Result<Arc<dyn SessionStore>> {
    let ttl = settings.session_ttl();

    match settings.session.backend {
        SessionBackend::Memory => {
            warn!("Using the in-memory session store: sessions will not survive a restart");
            let memory = MemorySessionStore::new(ttl);
            memory.spawn_cleanup(CLEANUP_INTERVAL);
            Ok(Arc::new(memory))
        }
        SessionBackend::Redis => {
            let redis = RedisSessionStore::new(
                settings.redis.clone(),
                ttl,
                settings.session.lock_timeout_ms,
                settings.session.lock_retries,
                settings.session.flow_lock_timeout_ms,
            )
            .await?;

            if settings.session.allow_memory_fallback {
                warn!("Memory fallback enabled: public sessions may be served from process memory while Redis is unavailable");
                let store = FallbackSessionStore::new(Arc::new(redis));
                store.fallback().spawn_cleanup(CLEANUP_INTERVAL);
                Ok(Arc::new(store))
            } else {
                Ok(Arc::new(redis))
            }
        }
    }
}
