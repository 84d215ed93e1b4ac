//! Background Tasks Module
//!
//! # Tasks
//! - Worker pool: runs fan-out and notification jobs off the request path
//! - TTL Cleanup: sweeps expired entries out of the in-process cache

mod cleanup;
mod pool;

pub use cleanup::spawn_cleanup_task;
pub use pool::BackgroundPool;
