//! CLI command definitions using Clap.

use crate::response::StackResponse;
use clap::{Parser, Subcommand};
use stackstore_core::{ConfigError, StackConfig, StackService, StackStatus};
use std::path::PathBuf;

/// Persistent LIFO stack backed by SQLite.
#[derive(Parser, Debug)]
#[command(name = "stackstore")]
#[command(version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database file. Overrides `STACKSTORE_DB_PATH`.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error). Overrides `STACKSTORE_LOG_LEVEL`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Absolute directory for rolling logs. Overrides `STACKSTORE_LOG_DIR`.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Push text onto the stack top.
    ///
    /// Omitting CONTENT is rejected; an empty string is a valid entry.
    Push {
        content: Option<String>,
    },

    /// Print the top entry without removing it.
    Pick,

    /// Remove and print the top entry.
    Pop,

    /// Reverse the whole stack.
    Reverse,

    /// Print whether the stack is empty and its current direction.
    Status,

    /// Walk the persisted links and check the list structure.
    Verify,
}

impl Cli {
    /// Applies command-line overrides on top of `base`.
    pub fn resolve_config(&self, base: StackConfig) -> Result<StackConfig, ConfigError> {
        let mut config = base;
        if let Some(db) = &self.db {
            config = config.with_db_path(db.clone());
        }
        if let Some(level) = &self.log_level {
            config = config.with_log_level(level)?;
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir.clone())?;
        }
        Ok(config)
    }
}

impl Commands {
    pub fn execute(&self, service: &StackService) -> StackResponse {
        match self {
            Self::Push { content } => StackResponse::from_push(service.push(content.as_deref())),
            Self::Pick => StackResponse::from_top(service.pick()),
            Self::Pop => StackResponse::from_top(service.pop()),
            Self::Reverse => StackResponse::from_reverse(service.reverse()),
            Self::Status => match service.state() {
                Ok(state) => {
                    let state = match state {
                        StackStatus::Empty => "empty",
                        StackStatus::NonEmpty => "non_empty",
                    };
                    StackResponse::ok(format!(
                        "state={state} direction={:?}",
                        service.direction()
                    ))
                }
                Err(err) => StackResponse::from_error(&err),
            },
            Self::Verify => match service.verify() {
                Ok(report) => StackResponse::ok(format!("chain intact: {} entries", report.len)),
                Err(err) => StackResponse::from_error(&err),
            },
        }
    }
}
