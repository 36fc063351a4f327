//! Output formatting utilities for the CLI.

pub mod table;

pub use table::PlanTableFormatter;

use serde::Serialize;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to at most `max_len` characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer piece of text", 10), "a longe...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }
}
