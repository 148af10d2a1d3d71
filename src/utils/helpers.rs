//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the application.

use uuid::Uuid;

/// Generate a new UUID v4
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Normalize user text for command and keyword matching
pub fn normalize_command(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Progress indicator shown with every step prompt, e.g. `(2/5)`
pub fn progress_indicator(current_step: usize, total_steps: usize) -> String {
    format!("({}/{})", current_step + 1, total_steps)
}

/// Interpret a yes/no style answer
pub fn parse_yes_no(text: &str) -> Option<bool> {
    match normalize_command(text).as_str() {
        "yes" | "y" | "confirm" | "ok" | "true" => Some(true),
        "no" | "n" | "false" => Some(false),
        _ => None,
    }
}
