pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod janitor;
pub mod media;
pub mod server;
pub mod session;
pub mod stream;

pub use api::init_tracing;
pub use config::StreamConfig;
pub use error::StreamError;
