// Disk janitor — background retention sweep of the on-disk artifact store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::session::SessionRegistry;

/// Sweeps artifact directories that no live session references and that
/// have sat idle past the retention threshold. Coordinates with the
/// registry only through read-only lookups.
pub struct DiskJanitor {
    root: PathBuf,
    registry: Arc<SessionRegistry>,
    retention: Duration,
}

impl DiskJanitor {
    pub fn new(registry: Arc<SessionRegistry>, cfg: &StreamConfig) -> Arc<Self> {
        Arc::new(Self {
            root: PathBuf::from(&cfg.data_dir),
            registry,
            retention: cfg.artifact_retention(),
        })
    }

    /// Run `sweep` on a fixed period until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) {
        let janitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The store was just opened; the first sweep can wait a period.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("janitor sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let removed = janitor.sweep().await;
                        if removed > 0 {
                            info!("janitor sweep removed {} artifact dirs", removed);
                        }
                    }
                }
            }
        });
    }

    /// Full sweep: delete every artifact directory that is not referenced by
    /// a live session and has been idle past the retention threshold.
    /// Per-directory failures are logged and never abort the sweep.
    pub async fn sweep(&self) -> usize {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) => {
                debug!("janitor cannot read {:?}: {}", self.root, e);
                return 0;
            }
        };

        let live = self.registry.live_ids();
        let mut removed = 0usize;

        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("janitor sweep aborted listing {:?}: {}", self.root, e);
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if live.iter().any(|id| *id == name) {
                continue;
            }

            let path = entry.path();
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => {
                    if !idle_past(&meta, self.retention) {
                        continue;
                    }
                    match tokio::fs::remove_dir_all(&path).await {
                        Ok(()) => {
                            info!("janitor removed idle artifact {:?}", path);
                            removed += 1;
                        }
                        Err(e) => {
                            // Best-effort: the directory may have gone live
                            // or locked since we looked. Next sweep retries.
                            warn!("janitor failed to remove {:?}: {}", path, e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("janitor cannot stat {:?}: {}", path, e);
                }
            }
        }

        removed
    }

    /// Explicit removal: tear the session down (awaiting engine teardown),
    /// then delete the artifact directory regardless of idle time. Returns
    /// whether the on-disk artifact is gone.
    pub async fn remove_content(&self, content_id: &str) -> bool {
        self.registry.remove(content_id).await;

        let path = self.root.join(content_id);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                info!("removed artifact {:?}", path);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("failed to remove artifact {:?}: {}", path, e);
                false
            }
        }
    }

    /// Explicit removal for every live content-id plus every orphan artifact
    /// directory. Runs to completion; returns whether everything came off.
    pub async fn remove_all(&self) -> bool {
        let mut ok = true;

        for id in self.registry.live_ids() {
            ok &= self.remove_content(&id).await;
        }

        if let Ok(mut read_dir) = tokio::fs::read_dir(&self.root).await {
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                // A session may have appeared while the pass above was still
                // tearing others down; its artifact stays.
                let name = entry.file_name().to_string_lossy().into_owned();
                if self.registry.get(&name).is_some() {
                    continue;
                }
                let path = entry.path();
                let is_dir = entry
                    .metadata()
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if !is_dir {
                    continue;
                }
                if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                    warn!("failed to remove artifact {:?}: {}", path, e);
                    ok = false;
                }
            }
        }

        ok
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Idle check against the directory's newest timestamp. mtime is the
/// reliable signal; atime is consulted when the filesystem provides it.
fn idle_past(meta: &std::fs::Metadata, retention: Duration) -> bool {
    let newest = match (meta.modified(), meta.accessed()) {
        (Ok(m), Ok(a)) => m.max(a),
        (Ok(m), Err(_)) => m,
        (Err(_), Ok(a)) => a,
        (Err(_), Err(_)) => return false,
    };
    SystemTime::now()
        .duration_since(newest)
        .map(|idle| idle > retention)
        .unwrap_or(false)
}
