//! CLI entry point for the persisted stack.
//!
//! # Responsibility
//! - Resolve configuration from environment and flags.
//! - Run one stack operation and print its JSON response envelope.
//! - Exit with a status derived from the response code.

mod commands;
mod response;

use clap::Parser;
use commands::Cli;
use response::StackResponse;
use stackstore_core::{init_logging, StackConfig, StackService};
use std::process::ExitCode;

const CONFIG_ERROR_EXIT_CODE: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match StackConfig::from_env().and_then(|base| cli.resolve_config(base)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("stackstore: {err}");
            return ExitCode::from(CONFIG_ERROR_EXIT_CODE);
        }
    };

    if let Some(log_dir) = &config.log_dir {
        if let Err(err) = init_logging(config.log_level, log_dir) {
            eprintln!("stackstore: logging disabled: {err}");
        }
    }

    let response = match StackService::open(&config.db_path) {
        Ok(service) => cli.command.execute(&service),
        Err(err) => StackResponse::from_error(&err),
    };

    match serde_json::to_string(&response) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("stackstore: failed to encode response: {err}"),
    }
    ExitCode::from(response.exit_code())
}
