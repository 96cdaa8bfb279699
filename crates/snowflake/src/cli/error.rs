//! Helpful error types for CLI commands
//!
//! Each error says what went wrong and, where possible, what to try next.

use std::fmt;
use std::path::Path;

/// An error with context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn store_not_found(path: &Path) -> Self {
        Self::new(format!("Store not found: {}", path.display()))
            .with_context("Read commands do not create a store")
            .with_suggestion("TRY: snowflake-config paths   # show the resolved store location")
            .with_suggestion("TRY: pass --store <path> or set SNOWFLAKE_STORE")
    }

    pub fn collection_not_found(id: impl fmt::Display) -> Self {
        Self::new(format!("Collection not found: {}", id))
            .with_suggestion("TRY: snowflake-config config list")
    }

    pub fn value_not_found(id: impl fmt::Display) -> Self {
        Self::new(format!("Value not found: {}", id))
            .with_context("Values are stored when an option is first read")
            .with_suggestion("TRY: snowflake-config config show <collection-id>")
    }

    pub fn invalid_json(input: &str, err: impl fmt::Display) -> Self {
        Self::new(format!("Invalid JSON: {}", err)).with_context(format!("Input: {}", input))
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\n\n{}", context)?;
        }
        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                write!(f, "\n  {}", suggestion)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_suggestions() {
        let rendered = HelpfulError::store_not_found(Path::new("/tmp/missing.sqlite3")).to_string();
        assert!(rendered.starts_with("ERROR: Store not found: /tmp/missing.sqlite3"));
        assert!(rendered.contains("SNOWFLAKE_STORE"));
    }

    #[test]
    fn test_display_without_extras() {
        assert_eq!(HelpfulError::new("boom").to_string(), "ERROR: boom");
    }
}
