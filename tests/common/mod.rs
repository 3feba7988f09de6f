// Shared in-memory fake swarm engine for integration tests.
//
// Serves deterministic content from memory and records priority hints
// without acting on them, so tests also prove the stream layer works
// against an engine that ignores every hint.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use swarm_stream::engine::{ChunkPriority, EngineFile, EngineHandle, SwarmEngine, SwarmProgress};

pub const CHUNK_LEN: u64 = 1024;

pub struct MemoryEngine {
    files: Vec<(String, Vec<u8>)>,
    never_ready: bool,
    fail_streams: bool,
    short_streams: bool,
    create_delay_ms: u64,
    pub constructions: AtomicUsize,
    pub hints: Arc<Mutex<Vec<(usize, ChunkPriority)>>>,
}

impl MemoryEngine {
    pub fn new(files: Vec<(String, Vec<u8>)>) -> Arc<Self> {
        Arc::new(Self {
            files,
            never_ready: false,
            fail_streams: false,
            short_streams: false,
            create_delay_ms: 0,
            constructions: AtomicUsize::new(0),
            hints: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn single(name: &str, data: Vec<u8>) -> Arc<Self> {
        Self::new(vec![(name.to_string(), data)])
    }

    /// Engine whose metadata never becomes ready.
    pub fn never_ready(files: Vec<(String, Vec<u8>)>) -> Arc<Self> {
        Arc::new(Self {
            files,
            never_ready: true,
            fail_streams: false,
            short_streams: false,
            create_delay_ms: 0,
            constructions: AtomicUsize::new(0),
            hints: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Engine whose byte streams always fail, to exercise teardown-on-error.
    pub fn failing_streams(name: &str, data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            files: vec![(name.to_string(), data)],
            never_ready: false,
            fail_streams: true,
            short_streams: false,
            create_delay_ms: 0,
            constructions: AtomicUsize::new(0),
            hints: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Engine whose byte streams end after the first chunk, short of the
    /// requested window.
    pub fn short_streams(name: &str, data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            files: vec![(name.to_string(), data)],
            never_ready: false,
            fail_streams: false,
            short_streams: true,
            create_delay_ms: 0,
            constructions: AtomicUsize::new(0),
            hints: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Slow down add_content to widen creation race windows.
    pub fn with_create_delay(name: &str, data: Vec<u8>, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            files: vec![(name.to_string(), data)],
            never_ready: false,
            fail_streams: false,
            short_streams: false,
            create_delay_ms: delay_ms,
            constructions: AtomicUsize::new(0),
            hints: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SwarmEngine for MemoryEngine {
    async fn add_content(&self, _locator: &str, workdir: &Path) -> Result<Arc<dyn EngineHandle>> {
        if self.create_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.create_delay_ms)).await;
        }
        self.constructions.fetch_add(1, Ordering::SeqCst);

        // The real engine persists chunk data under the working directory.
        tokio::fs::write(workdir.join("artifact.bin"), b"chunk data").await?;

        Ok(Arc::new(MemoryHandle {
            files: self.files.clone(),
            never_ready: self.never_ready,
            fail_streams: self.fail_streams,
            short_streams: self.short_streams,
            hints: Arc::clone(&self.hints),
            destroyed: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryHandle {
    files: Vec<(String, Vec<u8>)>,
    never_ready: bool,
    fail_streams: bool,
    short_streams: bool,
    hints: Arc<Mutex<Vec<(usize, ChunkPriority)>>>,
    destroyed: AtomicBool,
}

impl MemoryHandle {
    fn total_len(&self) -> u64 {
        self.files.iter().map(|(_, d)| d.len() as u64).sum()
    }
}

#[async_trait]
impl EngineHandle for MemoryHandle {
    async fn ready(&self) -> Result<()> {
        if self.never_ready {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn files(&self) -> Vec<EngineFile> {
        let mut offset = 0u64;
        self.files
            .iter()
            .map(|(name, data)| {
                let f = EngineFile {
                    name: name.clone(),
                    path: name.clone(),
                    length: data.len() as u64,
                    byte_offset: offset,
                };
                offset += data.len() as u64;
                f
            })
            .collect()
    }

    fn chunk_len(&self) -> u64 {
        CHUNK_LEN
    }

    fn total_chunks(&self) -> usize {
        self.total_len().div_ceil(CHUNK_LEN) as usize
    }

    async fn byte_stream(
        &self,
        file_index: usize,
        start: u64,
        end: u64,
    ) -> Result<mpsc::Receiver<Result<Bytes>>> {
        if self.fail_streams {
            return Err(anyhow!("peer swarm unreachable"));
        }
        let (_, data) = self
            .files
            .get(file_index)
            .ok_or_else(|| anyhow!("no file {}", file_index))?;
        if end >= data.len() as u64 || start > end {
            return Err(anyhow!("range [{}, {}] out of bounds", start, end));
        }

        let slice = data[start as usize..=end as usize].to_vec();
        let short = self.short_streams;
        let (tx, rx) = mpsc::channel(2);
        tokio::spawn(async move {
            for piece in slice.chunks(CHUNK_LEN as usize) {
                if tx.send(Ok(Bytes::copy_from_slice(piece))).await.is_err() {
                    return;
                }
                if short {
                    return;
                }
            }
        });
        Ok(rx)
    }

    fn set_chunk_priority(&self, chunk_index: usize, priority: ChunkPriority) {
        // Recorded but never acted on.
        self.hints.lock().push((chunk_index, priority));
    }

    fn progress(&self) -> SwarmProgress {
        SwarmProgress {
            downloaded: self.total_len(),
            download_bps: 1_000,
            upload_bps: 100,
            peers: 3,
            progress: 1.0,
        }
    }

    async fn destroy(&self) -> Result<()> {
        // Teardown is asynchronous in the real engine.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Deterministic content: byte i is `i % 256`.
pub fn generate_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

pub const INFO_HASH: &str = "08ada5a7a6183aae1e09d831df6748d566095a10";

pub fn magnet_for(hash: &str) -> String {
    format!("magnet:?xt=urn:btih:{}&dn=Example", hash)
}
