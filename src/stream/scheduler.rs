// Piece prioritization — translates a request window into fetch-priority hints.

use tracing::debug;

use crate::config::StreamConfig;
use crate::engine::traits::{ChunkPriority, EngineHandle};
use crate::stream::range::Window;

/// Raise fetch priority for the chunks covering `window` of `file`, plus a
/// forward and backward lookahead margin.
///
/// Hints only: nothing outside the windows is deprioritized, and the call
/// tolerates being repeated on every request. If the computed start chunk
/// falls past the end of the content (stale metadata, teardown race) the
/// whole call is a silent no-op — prefetch efficiency is the only thing at
/// stake on this path.
pub fn prioritize(
    handle: &dyn EngineHandle,
    file_offset: u64,
    window: &Window,
    cfg: &StreamConfig,
) {
    let chunk_len = handle.chunk_len();
    let total_chunks = handle.total_chunks();
    if chunk_len == 0 || total_chunks == 0 {
        return;
    }

    let abs_start = file_offset + window.start;
    let abs_end = file_offset + window.end;

    let start_chunk = (abs_start / chunk_len) as usize;
    if start_chunk >= total_chunks {
        debug!(
            "priority no-op: start chunk {} past total {}",
            start_chunk, total_chunks
        );
        return;
    }

    // Immediate: the first chunks the client will actually read.
    let immediate_end = (start_chunk + cfg.immediate_chunks.max(1)).min(total_chunks);
    for i in start_chunk..immediate_end {
        handle.set_chunk_priority(i, ChunkPriority::Immediate);
    }

    // High: forward lookahead past the window end.
    let lookahead_end_byte = abs_end.saturating_add(cfg.lookahead_bytes);
    let forward_start = ((abs_end / chunk_len) as usize + 1).max(immediate_end);
    let forward_end = ((lookahead_end_byte / chunk_len) as usize + 1).min(total_chunks);
    for i in forward_start..forward_end {
        handle.set_chunk_priority(i, ChunkPriority::High);
    }

    // Medium: a smaller backward window, so scrubbing back doesn't start cold.
    if cfg.backward_lookahead_bytes > 0 && abs_start > 0 {
        let back_start_byte = abs_start.saturating_sub(cfg.backward_lookahead_bytes);
        let back_start = (back_start_byte / chunk_len) as usize;
        for i in back_start..start_chunk {
            handle.set_chunk_priority(i, ChunkPriority::Medium);
        }
    }

    debug!(
        "prioritized window [{}, {}] from chunk {} ({} immediate)",
        abs_start,
        abs_end,
        start_chunk,
        immediate_end - start_chunk
    );
}
