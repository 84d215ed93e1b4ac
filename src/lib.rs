//! Hotfeed - engagement ranking and feed distribution
//!
//! Maintains a hot score per post under concurrent likes and comments,
//! serves post details through a coalescing cache-aside read path, and
//! distributes posts to follower timelines with a push/pull hybrid.
//!
//! Durable state lives behind the `store` traits (PostgreSQL or in-memory);
//! the `cache` tier (Redis or in-memory) is disposable and rebuilt on demand.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod tasks;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{AppState, Backends};
pub use tasks::{spawn_cleanup_task, BackgroundPool};
pub use telemetry::init_tracing;
