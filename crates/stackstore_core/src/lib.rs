//! Core domain logic for the persisted LIFO stack.
//! This crate is the single source of truth for the linked-list invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StackConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entry::{Direction, EntryId, Neighbor, Side, StackConfiguration, StackEntry};
pub use repo::stack_repo::{
    ChainReport, ErrorKind, RepoError, RepoResult, SqliteStackRepository, StackRepository,
};
pub use service::stack_service::{StackService, StackStatus};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
