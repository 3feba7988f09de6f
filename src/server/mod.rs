// HTTP surface — router, server handle, and request handlers.

pub mod handler;

pub use handler::{AppState, StreamServer};
