use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Fetch-priority levels the scheduler may raise a chunk to.
///
/// `Immediate` outranks `High` outranks `Medium`; everything else stays on
/// the engine's own background schedule. Hints are advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChunkPriority {
    Medium,
    High,
    Immediate,
}

/// One file inside a content item, as reported by the engine.
#[derive(Debug, Clone)]
pub struct EngineFile {
    pub name: String,
    pub path: String,
    pub length: u64,
    /// Byte offset of this file within the content's overall chunk address space.
    pub byte_offset: u64,
}

/// Transfer progress snapshot for one content item.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwarmProgress {
    pub downloaded: u64,
    pub download_bps: u64,
    pub upload_bps: u64,
    pub peers: u32,
    /// Fraction of chunks verified present, 0.0–1.0.
    pub progress: f64,
}

/// Factory boundary to the wrapped swarm engine.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Start (or resume) a download for `locator`, scoped to `workdir`.
    async fn add_content(
        &self,
        locator: &str,
        workdir: &Path,
    ) -> Result<Arc<dyn EngineHandle>>;
}

/// Live handle to one in-progress swarm download.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Resolves once content metadata is available. `files`, `chunk_len` and
    /// `total_chunks` are only meaningful afterwards.
    async fn ready(&self) -> Result<()>;

    fn files(&self) -> Vec<EngineFile>;

    /// Content chunk length in bytes. Engine-reported, per-content.
    fn chunk_len(&self) -> u64;

    fn total_chunks(&self) -> usize;

    /// Read bytes `[start, end]` (inclusive) of a file as a sequence of
    /// chunks. The receiver side dropping must stop the read promptly.
    async fn byte_stream(
        &self,
        file_index: usize,
        start: u64,
        end: u64,
    ) -> Result<mpsc::Receiver<Result<Bytes>>>;

    /// Advisory fetch-priority hint. Out-of-range indices are ignored.
    fn set_chunk_priority(&self, chunk_index: usize, priority: ChunkPriority);

    fn progress(&self) -> SwarmProgress;

    /// Tear down the download, releasing peer connections and file handles.
    /// Resolves only once teardown is complete.
    async fn destroy(&self) -> Result<()>;
}
