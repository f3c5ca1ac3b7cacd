use anyhow::Result;
use inquire::{Confirm, Text};

use ticketrel_core::Relation;

/// Prompts the user for a new ticket summary
pub fn prompt_summary() -> Result<String> {
    let summary = Text::new("Summary:")
        .with_help_message("One line describing the ticket")
        .prompt()?;
    Ok(summary)
}

/// Asks before removing the listed relations
pub fn confirm_removal(relations: &[Relation]) -> Result<bool> {
    let message = if relations.len() == 1 {
        "Are you sure you want to delete this relation?".to_string()
    } else {
        format!(
            "Are you sure you want to delete these {} relations?",
            relations.len()
        )
    };
    let confirm = Confirm::new(&message).with_default(false).prompt()?;
    Ok(confirm)
}
