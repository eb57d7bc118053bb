//! Interactive cycle-break confirmation

use colored::*;
use dialoguer::Confirm;

use crate::planner::{CycleBroken, CycleConfirmation};

/// Asks on the terminal before each cycle break
pub struct TerminalConfirmation;

impl CycleConfirmation for TerminalConfirmation {
    fn confirm(&mut self, event: &CycleBroken) -> bool {
        eprintln!();
        eprintln!(
            "{} {}",
            "Circular dependency:".yellow().bold(),
            event.remaining.join(" <-> ")
        );
        if !event.fields.is_empty() {
            eprintln!(
                "  Loading {} first defers {}",
                event.entity.bold(),
                event.fields.join(", ").cyan()
            );
        }

        match Confirm::new()
            .with_prompt(format!("Break the cycle at {}?", event.entity))
            .default(true)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("Cycle prompt failed: {}", e);
                false
            }
        }
    }
}
