//! Stack use-case service.
//!
//! # Responsibility
//! - Serialize every stack operation through one owned exclusive lock.
//! - Load (or create) the configuration on construction and cache the
//!   current direction in memory.
//! - Pass repository results and error kinds through unchanged.
//!
//! # Invariants
//! - No two operations observe or mutate the list concurrently.
//! - The cached direction is written only after a committed mutation.
//! - Log events carry metadata only, never entry content.

use crate::db::{open_db, open_db_in_memory};
use crate::model::entry::{Direction, EntryId};
use crate::repo::stack_repo::{ChainReport, RepoResult, SqliteStackRepository, StackRepository};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Observable stack state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    Empty,
    NonEmpty,
}

struct StackState {
    conn: Connection,
    direction: Direction,
}

/// Lock-guarded façade over the SQLite stack repository.
///
/// The service owns its connection; share it across threads behind an `Arc`.
pub struct StackService {
    state: Mutex<StackState>,
}

impl StackService {
    /// Builds a service on a migrated connection.
    ///
    /// Creates the default configuration row when absent and caches its
    /// direction.
    pub fn new(conn: Connection) -> RepoResult<Self> {
        let (direction, entries) = {
            let repo = SqliteStackRepository::try_new(&conn)?;
            let config = repo.load_configuration()?;
            (config.direction, repo.entry_count()?)
        };

        info!(
            "event=service_init module=service status=ok direction={:?} entries={}",
            direction, entries
        );

        Ok(Self {
            state: Mutex::new(StackState { conn, direction }),
        })
    }

    /// Opens (and migrates) a database file and builds a service on it.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::new(open_db(path)?)
    }

    /// Builds a service on a fresh in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::new(open_db_in_memory()?)
    }

    /// Pushes `content` onto the stack top.
    ///
    /// # Errors
    /// - `InvalidInput` when `content` is `None`. Empty strings are accepted.
    pub fn push(&self, content: Option<&str>) -> RepoResult<EntryId> {
        self.run("stack_push", |repo, _| repo.push(content))
    }

    /// Returns the top content without removing it, or `None` when empty.
    pub fn pick(&self) -> RepoResult<Option<String>> {
        self.run("stack_pick", |repo, _| repo.pick())
    }

    /// Removes and returns the top content, or `None` when empty.
    pub fn pop(&self) -> RepoResult<Option<String>> {
        self.run("stack_pop", |repo, _| repo.pop())
    }

    /// Reverses the whole stack in O(1). Returns `false` when empty.
    ///
    /// The cache takes the direction the store persisted, which differs from
    /// a local flip when another handle reversed the same database.
    pub fn reverse(&self) -> RepoResult<bool> {
        self.run("stack_reverse", |repo, direction| match repo.reverse()? {
            Some(persisted) => {
                *direction = persisted;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Returns the cached direction.
    pub fn direction(&self) -> Direction {
        self.lock_state().direction
    }

    /// Derives the current state from whether any entry exists.
    pub fn state(&self) -> RepoResult<StackStatus> {
        self.run("stack_state", |repo, _| {
            Ok(if repo.entry_count()? == 0 {
                StackStatus::Empty
            } else {
                StackStatus::NonEmpty
            })
        })
    }

    /// Verifies the persisted link structure.
    pub fn verify(&self) -> RepoResult<ChainReport> {
        self.run("stack_verify", |repo, _| repo.verify_chain())
    }

    fn run<T>(
        &self,
        event: &'static str,
        op: impl FnOnce(&SqliteStackRepository<'_>, &mut Direction) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let started_at = Instant::now();
        let mut state = self.lock_state();
        let StackState { conn, direction } = &mut *state;

        let mut next_direction = *direction;
        let repo = SqliteStackRepository::from_ready(conn);
        match op(&repo, &mut next_direction) {
            Ok(value) => {
                *direction = next_direction;
                debug!(
                    "event={} module=service status=ok direction={:?} duration_ms={}",
                    event,
                    direction,
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(err) => {
                error!(
                    "event={} module=service status=error error_kind={:?} duration_ms={} error={}",
                    event,
                    err.kind(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StackState> {
        // A panicking holder cannot leave a half-applied mutation: its open
        // transaction is rolled back on drop and the cache was not touched.
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("event=lock_recovered module=service status=warn");
            poisoned.into_inner()
        })
    }
}
