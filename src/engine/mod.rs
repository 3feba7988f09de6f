// Swarm engine boundary — collaborator traits consumed by the streaming layer.

pub mod traits;

pub use traits::{ChunkPriority, EngineFile, EngineHandle, SwarmEngine, SwarmProgress};
