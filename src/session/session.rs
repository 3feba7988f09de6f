// Content session — the live binding between a content-id and its engine handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use bytes::Bytes;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::engine::traits::{EngineHandle, SwarmProgress};
use crate::error::StreamError;
use crate::media::MediaKind;
use crate::stream::cache::{CacheKey, StreamCache};
use crate::stream::range::Window;
use crate::stream::scheduler;

/// One file inside a session's content. Immutable once metadata is ready.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub index: usize,
    pub name: String,
    pub path: String,
    pub length: u64,
    pub media_kind: MediaKind,
    /// Byte offset within the content's overall chunk address space.
    pub byte_offset: u64,
}

/// Owned exclusively by the registry; all concurrent requests for one
/// content-id share this session. Requests only read piece data and issue
/// priority hints — session identity is the registry's business.
pub struct ContentSession {
    content_id: String,
    handle: Arc<dyn EngineHandle>,
    workdir: PathBuf,
    created_at: Instant,
    files: OnceCell<Vec<FileDescriptor>>,
    /// Terminal engine errors are reported here; the registry reaper tears
    /// the session down so the next request starts fresh.
    failure_tx: mpsc::UnboundedSender<String>,
    cfg: StreamConfig,
}

impl std::fmt::Debug for ContentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSession")
            .field("content_id", &self.content_id)
            .field("workdir", &self.workdir)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl ContentSession {
    pub fn new(
        content_id: String,
        handle: Arc<dyn EngineHandle>,
        workdir: PathBuf,
        failure_tx: mpsc::UnboundedSender<String>,
        cfg: StreamConfig,
    ) -> Self {
        Self {
            content_id,
            handle,
            workdir,
            created_at: Instant::now(),
            files: OnceCell::new(),
            failure_tx,
            cfg,
        }
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn workdir(&self) -> &PathBuf {
        &self.workdir
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn handle(&self) -> &Arc<dyn EngineHandle> {
        &self.handle
    }

    fn report_failure(&self) {
        let _ = self.failure_tx.send(self.content_id.clone());
    }

    /// File descriptors, derived from engine metadata once it is ready.
    /// Waits up to the configured metadata deadline on first call.
    pub async fn files(&self) -> Result<&[FileDescriptor], StreamError> {
        let descriptors = self
            .files
            .get_or_try_init(|| async {
                let deadline = self.cfg.metadata_timeout();
                match tokio::time::timeout(deadline, self.handle.ready()).await {
                    Err(_) => Err(StreamError::MetadataTimeout(deadline)),
                    Ok(Err(e)) => {
                        self.report_failure();
                        Err(StreamError::Engine(e))
                    }
                    Ok(Ok(())) => {
                        let files: Vec<FileDescriptor> = self
                            .handle
                            .files()
                            .into_iter()
                            .enumerate()
                            .map(|(index, f)| FileDescriptor {
                                index,
                                media_kind: MediaKind::from_path(&f.path),
                                name: f.name,
                                path: f.path,
                                length: f.length,
                                byte_offset: f.byte_offset,
                            })
                            .collect();
                        debug!(
                            "session {} metadata ready: {} files",
                            self.content_id,
                            files.len()
                        );
                        Ok(files)
                    }
                }
            })
            .await?;
        Ok(descriptors)
    }

    /// Look up one file descriptor by index.
    pub async fn file(&self, file_index: usize) -> Result<FileDescriptor, StreamError> {
        let files = self.files().await?;
        files
            .get(file_index)
            .cloned()
            .ok_or(StreamError::FileNotFound(file_index))
    }

    /// Serve `window` of a file as a sequence of byte chunks.
    ///
    /// Cache hits return immediately. On a miss the engine byte stream is
    /// forwarded chunk by chunk as it arrives, and the accumulated window is
    /// inserted into the cache only once it has been read in full — a
    /// dropped client stops the engine read and caches nothing.
    pub async fn open_stream(
        self: &Arc<Self>,
        file_index: usize,
        window: Window,
        cache: &Arc<StreamCache>,
    ) -> Result<mpsc::Receiver<anyhow::Result<Bytes>>, StreamError> {
        let file = self.file(file_index).await?;
        if window.end >= file.length {
            return Err(StreamError::UnsatisfiableRange { total: file.length });
        }

        // Raise fetch priority for the window and its lookahead margins.
        // Advisory only; the stream below completes even if every hint is
        // ignored.
        scheduler::prioritize(self.handle.as_ref(), file.byte_offset, &window, &self.cfg);

        let key = CacheKey {
            content_id: self.content_id.clone(),
            file_index,
            start: window.start,
            end: window.end,
        };

        if let Some(data) = cache.get(&key) {
            debug!(
                "cache hit session={} file={} range=[{}, {}]",
                self.content_id, file_index, window.start, window.end
            );
            let (tx, rx) = mpsc::channel(1);
            let _ = tx.try_send(Ok(data));
            return Ok(rx);
        }

        let mut engine_rx = match self
            .handle
            .byte_stream(file_index, window.start, window.end)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                self.report_failure();
                return Err(StreamError::Engine(e));
            }
        };

        let (tx, rx) = mpsc::channel::<anyhow::Result<Bytes>>(8);
        let session = Arc::clone(self);
        let cache = Arc::clone(cache);
        let expected = window.len();
        // Windows that could never fit the cache stream straight through.
        let accumulate = expected <= cache.capacity();

        tokio::spawn(async move {
            let t0 = Instant::now();
            let mut buf: Vec<u8> = if accumulate {
                Vec::with_capacity(expected as usize)
            } else {
                Vec::new()
            };
            let mut sent = 0u64;

            while let Some(item) = engine_rx.recv().await {
                match item {
                    Ok(chunk) => {
                        sent += chunk.len() as u64;
                        if accumulate {
                            buf.extend_from_slice(&chunk);
                        }
                        if tx.send(Ok(chunk)).await.is_err() {
                            // Client disconnected; dropping engine_rx stops
                            // the engine-side read.
                            debug!(
                                "client dropped stream session={} after {} bytes",
                                session.content_id, sent
                            );
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "engine stream error session={} range=[{}, {}]: {}",
                            session.content_id, window.start, window.end, e
                        );
                        session.report_failure();
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            if sent != expected {
                warn!(
                    "engine stream ended short session={}: {} of {} bytes",
                    session.content_id, sent, expected
                );
                let _ = tx
                    .send(Err(anyhow!("stream ended after {} of {} bytes", sent, expected)))
                    .await;
                return;
            }

            // Full window read — now, and only now, the range is cacheable.
            if accumulate {
                cache.put(key, Bytes::from(buf));
            }

            debug!(
                "streamed session={} file={} range=[{}, {}] bytes={} elapsed_ms={}",
                session.content_id,
                file_index,
                window.start,
                window.end,
                sent,
                t0.elapsed().as_millis()
            );
        });

        Ok(rx)
    }

    /// Transfer progress snapshot for the status endpoint.
    pub fn progress(&self) -> SwarmProgress {
        self.handle.progress()
    }
}
