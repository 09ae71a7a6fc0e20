//! Error handling and display for the CLI.

use colored::Colorize;
use raidboard_client::{ClientError, SaveAllError};
use raidboard_grid::{GridError, Violation};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The constraint engine refused a placement.
    #[error("Placement rejected: {}", .0.message())]
    Rejected(Violation),

    /// The edit did not apply (no such cell, slot or move).
    #[error("Nothing changed: {0}")]
    NoChange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<String> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Rejected(violation) => Some(format!(
                "Rule `{}`. Run `raidctl grid show` to see the current board.",
                violation.code()
            )),
            CliError::NoChange(_) => Some("Check the party and raid names with `raidctl grid show`.".into()),
            CliError::InvalidArgument(_) => None,
        };
    }

    if let Some(save_err) = err.downcast_ref::<SaveAllError>() {
        let saved = if save_err.completed.is_empty() {
            "Nothing was saved.".to_string()
        } else {
            let steps: Vec<&str> = save_err.completed.iter().map(|s| s.as_str()).collect();
            format!("Already saved: {}.", steps.join(", "))
        };
        return Some(format!("{saved} {}", client_hint(&save_err.source).unwrap_or_default())
            .trim()
            .to_string());
    }

    if let Some(client_err) = err.downcast_ref::<ClientError>() {
        return client_hint(client_err).map(str::to_string);
    }

    if err.downcast_ref::<GridError>().is_some() {
        return Some("Run `raidctl characters list` or `raidctl raids list` to check names.".into());
    }

    None
}

fn client_hint(err: &ClientError) -> Option<&'static str> {
    match err {
        ClientError::Network(_) => {
            Some("Check that the backend is running and `--api-url` points at it.")
        }
        ClientError::Api { status: 404, .. } => {
            Some("The backend does not know this item. It may have been deleted by another editor.")
        }
        ClientError::Api { status: 409, .. } => {
            Some("Another editor created it first. Reload with `raidctl grid show`.")
        }
        ClientError::Api { status, .. } if *status >= 500 => {
            Some("The backend failed. Retry in a moment.")
        }
        ClientError::PartialLoad(_) => Some("The backend is partly unavailable. Retry in a moment."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use raidboard_client::SaveStep;

    use super::*;

    #[test]
    fn test_rejection_hint_names_rule() {
        let err = anyhow::Error::new(CliError::Rejected(Violation::CellFull));
        assert_eq!(err.to_string(), "Placement rejected: cell already holds 4 characters");
        assert!(hint(&err).unwrap().contains("cell-full"));
    }

    #[test]
    fn test_save_hint_lists_completed_steps() {
        let err = anyhow::Error::new(SaveAllError {
            failed_step: SaveStep::RaidOrder,
            completed: vec![SaveStep::Characters, SaveStep::Raids],
            source: ClientError::api(503, "down"),
        });
        let hint = hint(&err).unwrap();
        assert!(hint.starts_with("Already saved: characters, raids."));
        assert!(hint.contains("Retry"));
    }

    #[test]
    fn test_plain_errors_have_no_hint() {
        assert!(hint(&anyhow::anyhow!("boom")).is_none());
    }
}
