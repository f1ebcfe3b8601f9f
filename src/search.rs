//! Filter and command mini-language.
//!
//! Both halves are total: any input string produces a result, and input that
//! means nothing simply has no effect.

use crate::model::FunctionSummary;

/// Case-insensitive substring matcher over a function's searchable fields.
///
/// The needle is lowercased and trimmed once at construction so matching a
/// whole registry does not redo that work per row.
pub struct Matcher {
    needle: String,
}

impl Matcher {
    pub fn new(query: &str) -> Self {
        Self {
            needle: query.trim().to_lowercase(),
        }
    }

    /// An empty query matches everything.
    pub const fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    /// Match against name, runtime, or description.
    pub fn matches(&self, function: &FunctionSummary) -> bool {
        self.is_empty()
            || [&function.name, &function.runtime, &function.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&self.needle))
    }
}

/// Indices of `functions` that match `query`, in registry order.
pub fn filter_indices(functions: &[FunctionSummary], query: &str) -> Vec<usize> {
    let matcher = Matcher::new(query);
    functions
        .iter()
        .enumerate()
        .filter(|(_, f)| matcher.matches(f))
        .map(|(i, _)| i)
        .collect()
}

/// Commands accepted in command-entry mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Refresh,
}

/// Parse a command buffer. The leading `:` is optional.
///
/// Anything outside the vocabulary yields `None`; callers ignore it silently.
pub fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    let input = input.strip_prefix(':').unwrap_or(input).trim();
    match input {
        "q" | "quit" => Some(Command::Quit),
        "r" | "refresh" => Some(Command::Refresh),
        _ => None,
    }
}
