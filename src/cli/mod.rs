//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use console::style;

use crate::domain::errors::DomainError;

/// Report a command failure and exit non-zero.
///
/// Retryable failures (store unreachable) get a hint instead of just the
/// error chain.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let retryable = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<DomainError>())
        .is_some_and(DomainError::is_retryable);

    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
            "retryable": retryable,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
        if retryable {
            eprintln!("{}", style("The previous plan is unchanged; run the command again to retry.").dim());
        }
    }
    std::process::exit(1);
}
