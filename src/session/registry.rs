// Session registry — lazy creation, idle eviction, serialized teardown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::engine::traits::SwarmEngine;
use crate::error::StreamError;
use crate::session::session::ContentSession;

struct SessionSlot {
    session: Arc<ContentSession>,
    /// Cancels the pending idle-eviction task; replaced on every keep-alive.
    idle_timer: CancellationToken,
}

/// Maps content-ids to live sessions. Sole owner of engine handles and of
/// each session's working directory.
pub struct SessionRegistry {
    engine: Arc<dyn SwarmEngine>,
    cfg: StreamConfig,
    sessions: RwLock<HashMap<String, SessionSlot>>,
    /// Serializes session construction and teardown. Held across the engine
    /// await so two racing requests for one id build exactly one engine, and
    /// so a new session for an id cannot appear while the old one is still
    /// releasing resources.
    lifecycle_lock: Mutex<()>,
    failure_tx: mpsc::UnboundedSender<String>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn SwarmEngine>, cfg: StreamConfig) -> Arc<Self> {
        let (failure_tx, failure_rx) = mpsc::unbounded_channel::<String>();
        let registry = Arc::new(Self {
            engine,
            cfg,
            sessions: RwLock::new(HashMap::new()),
            lifecycle_lock: Mutex::new(()),
            failure_tx,
        });
        Self::spawn_failure_reaper(Arc::downgrade(&registry), failure_rx);
        registry
    }

    /// Removes sessions whose engine reported a terminal error, so the next
    /// request for that content builds a fresh one instead of retrying a
    /// broken handle.
    fn spawn_failure_reaper(
        registry: Weak<SessionRegistry>,
        mut failure_rx: mpsc::UnboundedReceiver<String>,
    ) {
        tokio::spawn(async move {
            while let Some(content_id) = failure_rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                warn!("tearing down failed session {}", content_id);
                registry.remove(&content_id).await;
            }
        });
    }

    /// Extract a content-id from a magnet URI or a bare hex info-hash.
    pub fn extract_content_id(locator: &str) -> Result<String, StreamError> {
        let candidate = if let Some(idx) = locator.find("btih:") {
            let rest = &locator[idx + "btih:".len()..];
            rest.chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
        } else if !locator.starts_with("magnet:") {
            locator.trim().to_string()
        } else {
            return Err(StreamError::InvalidLocator(locator.to_string()));
        };

        let is_hex40 = candidate.len() == 40 && candidate.chars().all(|c| c.is_ascii_hexdigit());
        let is_base32 = candidate.len() == 32
            && candidate
                .chars()
                .all(|c| c.is_ascii_alphabetic() || ('2'..='7').contains(&c));
        if is_hex40 || is_base32 {
            Ok(candidate.to_ascii_lowercase())
        } else {
            Err(StreamError::InvalidLocator(locator.to_string()))
        }
    }

    /// Return the live session for `locator`'s content-id, creating it (and
    /// its engine instance) if needed. Resets the idle-eviction timer either
    /// way — metadata lookups keep a session alive, stream progress does not.
    pub async fn get_or_create(
        self: &Arc<Self>,
        locator: &str,
    ) -> Result<Arc<ContentSession>, StreamError> {
        let content_id = Self::extract_content_id(locator)?;

        if let Some(session) = self.keep_alive(&content_id) {
            return Ok(session);
        }

        let _guard = self.lifecycle_lock.lock().await;
        // Another caller may have won the race while we waited.
        if let Some(session) = self.keep_alive(&content_id) {
            return Ok(session);
        }

        let workdir = self.workdir_for(&content_id);
        if let Err(e) = tokio::fs::create_dir_all(&workdir).await {
            return Err(StreamError::Engine(e.into()));
        }

        info!("creating session {} at {:?}", content_id, workdir);
        let handle = self
            .engine
            .add_content(locator, &workdir)
            .await
            .map_err(StreamError::Engine)?;

        let session = Arc::new(ContentSession::new(
            content_id.clone(),
            handle,
            workdir,
            self.failure_tx.clone(),
            self.cfg.clone(),
        ));

        let idle_timer = self.schedule_idle_eviction(&content_id);
        self.sessions.write().insert(
            content_id,
            SessionSlot {
                session: Arc::clone(&session),
                idle_timer,
            },
        );

        Ok(session)
    }

    /// Read-only lookup; never creates and never resets the idle timer.
    pub fn get(&self, content_id: &str) -> Option<Arc<ContentSession>> {
        self.sessions
            .read()
            .get(content_id)
            .map(|slot| Arc::clone(&slot.session))
    }

    /// Content-ids with a live session.
    pub fn live_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Tear down the session for `content_id`, if any. Idempotent. Only
    /// returns once engine teardown has completed, and blocks re-creation of
    /// the same id for that whole window.
    pub async fn remove(&self, content_id: &str) {
        let _guard = self.lifecycle_lock.lock().await;
        let slot = self.sessions.write().remove(content_id);
        let Some(slot) = slot else {
            return;
        };

        slot.idle_timer.cancel();
        info!("destroying session {}", content_id);
        if let Err(e) = slot.session.handle().destroy().await {
            warn!("engine teardown failed for {}: {}", content_id, e);
        }
    }

    pub fn workdir_for(&self, content_id: &str) -> PathBuf {
        PathBuf::from(&self.cfg.data_dir).join(content_id)
    }

    /// Refresh an existing session's idle timer and return it.
    fn keep_alive(self: &Arc<Self>, content_id: &str) -> Option<Arc<ContentSession>> {
        let mut sessions = self.sessions.write();
        let slot = sessions.get_mut(content_id)?;
        slot.idle_timer.cancel();
        slot.idle_timer = self.schedule_idle_eviction(content_id);
        Some(Arc::clone(&slot.session))
    }

    /// Arm a cancellable eviction task for `content_id`. The returned token
    /// cancels it; re-arming on each keep-alive replaces the fire-and-forget
    /// timeout the scheduling would otherwise race on.
    fn schedule_idle_eviction(self: &Arc<Self>, content_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let registry = Arc::downgrade(self);
        let content_id = content_id.to_string();
        let idle = self.cfg.session_idle_timeout();

        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(idle) => {
                    let Some(registry) = registry.upgrade() else {
                        return;
                    };
                    debug!("session {} idle for {:?}, evicting", content_id, idle);
                    registry.remove(&content_id).await;
                }
            }
        });

        token
    }
}
